use std::path::{Path, PathBuf};

use lopdf::Document;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read PDF '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse PDF: {0}")]
    Parse(#[from] lopdf::Error),

    #[error("extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Builds the model context from a staged PDF.
#[derive(Debug, Clone)]
pub struct TextExtractor {
    max_chars: usize,
}

impl TextExtractor {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    #[tracing::instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn extract_context(&self, path: &Path) -> Result<String, ExtractionError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ExtractionError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let pages = tokio::task::spawn_blocking(move || extract_pages(&bytes)).await??;

        let page_count = pages.len();
        let context = truncate_context(&join_pages(&pages), self.max_chars);

        if context.is_empty() {
            tracing::warn!(page_count, "PDF has no extractable text");
        } else {
            tracing::info!(
                page_count,
                context_chars = context.chars().count(),
                "PDF text extraction complete"
            );
        }

        Ok(context)
    }
}

/// Page texts in page-number order. Undecodable pages come back empty.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<String>, lopdf::Error> {
    let doc = Document::load_mem(bytes)?;

    let pages = doc
        .get_pages()
        .keys()
        .map(|page_number| {
            doc.extract_text(&[*page_number]).unwrap_or_else(|e| {
                tracing::debug!(page_number, "page text extraction failed: {}", e);
                String::new()
            })
        })
        .collect();

    Ok(pages)
}

pub fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .map(|p| p.trim())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hard cutoff at `max_chars` characters; may split a word.
pub fn truncate_context(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
