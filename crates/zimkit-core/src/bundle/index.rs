//! In-memory full-text index over a bundle's text entries.

use crate::profiling::{ComponentTimings, OperationTimer, PerformanceMetrics};
use crate::types::IndexHit;
use crate::{Error, Result};
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, STORED, STRING, Schema, TEXT, Value};
use tantivy::{Index, IndexReader, TantivyDocument, doc};
use tracing::{Level, debug};

/// A document handed to [`FullTextIndex::build`].
pub(crate) struct IndexDocument<'a> {
    pub path: &'a str,
    pub title: &'a str,
    pub text: String,
}

pub(crate) struct FullTextIndex {
    index: Index,
    reader: IndexReader,
    path_field: Field,
    title_field: Field,
    content_field: Field,
}

impl FullTextIndex {
    pub fn build<'a>(
        documents: impl IntoIterator<Item = IndexDocument<'a>>,
        metrics: Option<&PerformanceMetrics>,
    ) -> Result<Self> {
        let timer = OperationTimer::with_metrics("bundle_index_build", metrics);
        let mut timings = ComponentTimings::new();

        let mut schema_builder = Schema::builder();
        let path_field = schema_builder.add_text_field("path", STRING | STORED);
        let title_field = schema_builder.add_text_field("title", TEXT | STORED);
        let content_field = schema_builder.add_text_field("content", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        let mut writer = timings.time("writer_creation", || {
            index
                .writer(50_000_000)
                .map_err(|e| Error::Index(format!("Failed to create writer: {e}")))
        })?;

        let mut added = 0usize;
        timings.time("document_creation", || {
            for document in documents {
                writer
                    .add_document(doc!(
                        path_field => document.path,
                        title_field => document.title,
                        content_field => document.text,
                    ))
                    .map_err(|e| Error::Index(format!("Failed to add document: {e}")))?;
                added += 1;
            }
            Ok::<(), Error>(())
        })?;

        timings.time("commit", || {
            writer
                .commit()
                .map_err(|e| Error::Index(format!("Failed to commit: {e}")))
        })?;

        let reader = index
            .reader_builder()
            .reload_policy(tantivy::ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| Error::Index(format!("Failed to create reader: {e}")))?;

        timer.finish_index(added);
        if tracing::enabled!(Level::DEBUG) {
            timings.log_breakdown();
        }

        Ok(Self {
            index,
            reader,
            path_field,
            title_field,
            content_field,
        })
    }

    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<IndexHit>> {
        let sanitized = sanitize_query(query_str);
        if sanitized.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let mut parser =
            QueryParser::for_index(&self.index, vec![self.title_field, self.content_field]);
        parser.set_field_boost(self.title_field, 2.0);

        let query = parser
            .parse_query(&sanitized)
            .map_err(|e| Error::Index(format!("Failed to parse query: {e}")))?;

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| Error::Index(format!("Search failed: {e}")))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| Error::Index(format!("Failed to retrieve doc: {e}")))?;
            hits.push(IndexHit {
                path: field_text(&doc, self.path_field)?,
                title: field_text(&doc, self.title_field)?,
                score,
            });
        }

        debug!("Found {} full-text hits for '{}'", hits.len(), query_str);
        Ok(hits)
    }
}

fn field_text(doc: &TantivyDocument, field: Field) -> Result<String> {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Index("Field not found in document".into()))
}

/// Reduce free text to plain terms the query parser cannot misread.
///
/// Punctuation becomes whitespace (the default tokenizer splits there
/// anyway) and the boolean operators are lowercased so they match as words.
fn sanitize_query(query: &str) -> String {
    let spaced: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    spaced
        .split_whitespace()
        .map(|term| match term {
            "AND" | "OR" | "NOT" | "IN" => term.to_lowercase(),
            _ => term.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
