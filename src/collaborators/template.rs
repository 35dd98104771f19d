//! Opaque collaborator interface for rendering outbound notification
//! templates (e.g. session-completion emails). Not implemented in this
//! core — named so a caller can be written against the trait without
//! coupling to a concrete templating engine.

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template_name: &str, context: &serde_json::Value) -> anyhow::Result<String>;
}
