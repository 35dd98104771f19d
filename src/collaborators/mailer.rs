//! Enqueue-only mail collaborator, invoked from the session completion
//! notification task (spec.md §9) and never awaited on the critical path —
//! a slow or unreachable mail backend must not delay session completion.

use async_trait::async_trait;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn enqueue(&self, to: &str, subject: &str, body: &str);
}

/// The only implementation shipped: logs and drops. A real deployment
/// swaps this for a queue-backed implementation without touching call
/// sites.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn enqueue(&self, to: &str, subject: &str, _body: &str) {
        tracing::debug!(%to, %subject, "mailer: enqueue is a no-op in this deployment");
    }
}
