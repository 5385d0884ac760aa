use std::fs;

use tracing::info;

use crate::error::{NavigatorError, NavigatorResult};

use super::manifest::{DocumentDescriptor, DocumentFormat};

// Pre-processed corpus files separate entries with this sequence.
pub const CHUNK_DELIMITER: &str = ";\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceChunk {
    pub ordinal: usize,
    pub text: String,
}

pub fn ensure_supported(document: &DocumentDescriptor) -> NavigatorResult<()> {
    if document.format != DocumentFormat::Txt {
        return Err(NavigatorError::configuration(format!(
            "document format '{}' is not supported for indexing: {}",
            document.format,
            document.path.display()
        )));
    }

    if !document.path.is_file() {
        return Err(NavigatorError::configuration(format!(
            "corpus document not found: {}",
            document.path.display()
        )));
    }

    Ok(())
}

pub fn load_document_chunks(document: &DocumentDescriptor) -> NavigatorResult<Vec<SourceChunk>> {
    ensure_supported(document)?;

    let raw = fs::read_to_string(&document.path).map_err(|err| {
        NavigatorError::configuration(format!(
            "failed to read corpus document {}: {err}",
            document.path.display()
        ))
    })?;
    let chunks = split_chunks(&raw);

    info!(
        path = %document.path.display(),
        chunks = chunks.len(),
        "corpus document loaded"
    );

    Ok(chunks)
}

pub fn split_chunks(raw: &str) -> Vec<SourceChunk> {
    raw.split(CHUNK_DELIMITER)
        .filter(|piece| !piece.trim().is_empty())
        .enumerate()
        .map(|(ordinal, piece)| SourceChunk {
            ordinal,
            text: piece.to_string(),
        })
        .collect()
}
