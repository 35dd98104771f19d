//! C6 Index: a field-weighted full-text index backed by `tantivy`
//! (enrichment pulled from `cyrup-ai-kodegen-tools-citescrape`, the
//! closest in-pack precedent for a Tantivy-backed search schema). Four
//! text fields — `doc_id`, `title`, `content`, `url`, `domain` — each
//! stored for retrieval; `title`/`content` get distinct per-field boosts
//! applied at query time through the `QueryParser`'s field-boost map.

use std::path::Path;
use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::{doc, Index as TantivyIndex, IndexReader, IndexWriter, ReloadPolicy, Term};

use crate::core::error::IndexError;
use crate::core::types::{IndexFields, SearchHit};

const TITLE_BOOST: f32 = 2.0;
const CONTENT_BOOST: f32 = 1.0;

struct IndexedSchema {
    schema: Schema,
    doc_id: Field,
    title: Field,
    content: Field,
    url: Field,
    domain: Field,
}

fn build_schema() -> IndexedSchema {
    let mut builder = Schema::builder();
    let doc_id = builder.add_text_field("doc_id", STRING | STORED);

    let content_indexing = TextFieldIndexing::default()
        .set_tokenizer("default")
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let content_options = TextOptions::default()
        .set_stored()
        .set_indexing_options(content_indexing);

    let title = builder.add_text_field("title", content_options.clone());
    let content = builder.add_text_field("content", content_options);
    let url = builder.add_text_field("url", STRING | STORED);
    let domain = builder.add_text_field("domain", STRING | STORED);

    IndexedSchema {
        schema: builder.build(),
        doc_id,
        title,
        content,
        url,
        domain,
    }
}

pub struct Index {
    index: TantivyIndex,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: IndexedSchema,
}

impl Index {
    pub fn open(dir: &str) -> Result<Self, IndexError> {
        std::fs::create_dir_all(dir).map_err(|e| IndexError::Backend(e.to_string()))?;
        let schema_def = build_schema();
        let directory =
            MmapDirectory::open(Path::new(dir)).map_err(|e| IndexError::Backend(e.to_string()))?;

        let index = TantivyIndex::open_or_create(directory, schema_def.schema.clone())
            .map_err(|e| IndexError::Backend(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e: tantivy::TantivyError| IndexError::Backend(e.to_string()))?;

        let writer = index
            .writer(50_000_000)
            .map_err(|e| IndexError::Backend(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields: schema_def,
        })
    }

    /// Upserts `doc_id` → `fields`: deletes any prior document under the
    /// same `doc_id` term, adds the new one, and commits.
    pub fn upsert(&self, doc_id: &str, fields: &IndexFields) -> Result<(), IndexError> {
        let mut writer = self.writer.lock().map_err(|_| IndexError::Unknown)?;
        let term = Term::from_field_text(self.fields.doc_id, doc_id);
        writer.delete_term(term);
        writer
            .add_document(doc!(
                self.fields.doc_id => doc_id,
                self.fields.title => fields.title.clone(),
                self.fields.content => fields.content.clone(),
                self.fields.url => fields.url.clone(),
                self.fields.domain => fields.domain.clone(),
            ))
            .map_err(|e| IndexError::Backend(e.to_string()))?;
        writer.commit().map_err(|e| IndexError::Backend(e.to_string()))?;
        Ok(())
    }

    pub fn delete(&self, doc_id: &str) -> Result<(), IndexError> {
        let mut writer = self.writer.lock().map_err(|_| IndexError::Unknown)?;
        let term = Term::from_field_text(self.fields.doc_id, doc_id);
        writer.delete_term(term);
        writer.commit().map_err(|e| IndexError::Backend(e.to_string()))?;
        Ok(())
    }

    pub fn query(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.query_page(query, 0, limit).map(|(hits, _total)| hits)
    }

    /// Like [`Index::query`] but also returns the total number of matching
    /// documents (via tantivy's `Count` collector) so callers can paginate
    /// without re-running the query per page.
    pub fn query_page(
        &self,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<SearchHit>, u64), IndexError> {
        let searcher = self.reader.searcher();
        let mut parser = QueryParser::for_index(&self.index, vec![self.fields.title, self.fields.content]);
        parser.set_field_boost(self.fields.title, TITLE_BOOST);
        parser.set_field_boost(self.fields.content, CONTENT_BOOST);

        let parsed = parser.parse_query(query).map_err(|e| IndexError::Backend(e.to_string()))?;
        let (top_docs, count) = searcher
            .search(
                &parsed,
                &(TopDocs::with_limit(limit).and_offset(offset), tantivy::collector::Count),
            )
            .map_err(|e| IndexError::Backend(e.to_string()))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let retrieved = searcher
                .doc::<tantivy::TantivyDocument>(address)
                .map_err(|e| IndexError::Backend(e.to_string()))?;
            let title = field_text(&retrieved, &self.fields.schema, self.fields.title);
            let url = field_text(&retrieved, &self.fields.schema, self.fields.url);
            let content = field_text(&retrieved, &self.fields.schema, self.fields.content);
            hits.push(SearchHit {
                url,
                title,
                snippet: snippet_of(&content),
                score,
            });
        }
        Ok((hits, count as u64))
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

fn field_text(doc: &tantivy::TantivyDocument, _schema: &Schema, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn snippet_of(content: &str) -> String {
    const SNIPPET_CHARS: usize = 240;
    if content.chars().count() <= SNIPPET_CHARS {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(SNIPPET_CHARS).collect();
        format!("{truncated}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(url: &str, title: &str, content: &str) -> IndexFields {
        IndexFields {
            title: title.to_string(),
            content: content.to_string(),
            url: url.to_string(),
            domain: "example.com".to_string(),
        }
    }

    #[test]
    fn upsert_then_query_finds_document() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open(dir.path().to_str().unwrap()).unwrap();
        index
            .upsert("https://example.com/a", &sample("https://example.com/a", "Rust guide", "learn rust today"))
            .unwrap();
        let hits = index.query("rust", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://example.com/a");
    }

    #[test]
    fn upsert_replaces_prior_version_of_same_doc_id() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open(dir.path().to_str().unwrap()).unwrap();
        index
            .upsert("https://example.com/a", &sample("https://example.com/a", "old title", "old body"))
            .unwrap();
        index
            .upsert("https://example.com/a", &sample("https://example.com/a", "new title", "new body"))
            .unwrap();
        let hits = index.query("new", 10).unwrap();
        assert_eq!(hits.len(), 1);
        let stale = index.query("old", 10).unwrap();
        assert!(stale.is_empty());
    }

    #[test]
    fn delete_removes_document() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open(dir.path().to_str().unwrap()).unwrap();
        index
            .upsert("https://example.com/a", &sample("https://example.com/a", "Rust guide", "learn rust today"))
            .unwrap();
        index.delete("https://example.com/a").unwrap();
        let hits = index.query("rust", 10).unwrap();
        assert!(hits.is_empty());
    }
}
