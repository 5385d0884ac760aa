use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{NavigatorError, NavigatorResult};
use crate::generation::Embedder;
use crate::semantic::{
    cosine_similarity, decode_embedding_blob, encode_embedding_blob, normalize_whitespace,
};
use crate::util::{now_utc_string, sha256_file, sha256_text};

use super::chunking::load_document_chunks;
use super::manifest::CorpusManifest;

pub const INDEX_BUILDER: &str = "coras-navigator";
pub const INDEX_FORMAT_VERSION: &str = "1";

#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk_id: String,
    pub document: String,
    pub ordinal: usize,
    pub text: String,
    pub text_hash: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexedDocument {
    pub path: String,
    pub format: String,
    pub sha256: String,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexMetadata {
    pub builder: String,
    pub format_version: String,
    pub embedder: String,
    pub dimensions: usize,
    pub manifest: Vec<String>,
    pub chunk_count: usize,
    pub built_at: String,
    pub content_digest: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexHit {
    pub rank: usize,
    pub score: f64,
    pub chunk_id: String,
    pub document: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    metadata: IndexMetadata,
    documents: Vec<IndexedDocument>,
    chunks: Vec<IndexedChunk>,
}

impl SimilarityIndex {
    pub fn build(manifest: &CorpusManifest, embedder: &dyn Embedder) -> NavigatorResult<Self> {
        let started = Instant::now();
        let mut documents = Vec::<IndexedDocument>::with_capacity(manifest.documents().len());
        let mut chunks = Vec::<IndexedChunk>::new();

        for document in manifest.documents() {
            let source_chunks = load_document_chunks(document)?;
            let sha256 = sha256_file(&document.path)
                .map_err(|err| NavigatorError::configuration(format!("{err:#}")))?;
            let path_key = document.path_key();

            for source in &source_chunks {
                let embedding = embedder
                    .embed(&normalize_whitespace(&source.text))
                    .map_err(NavigatorError::Embedding)?;
                chunks.push(IndexedChunk {
                    chunk_id: format!("{}#{}", documents.len(), source.ordinal),
                    document: path_key.clone(),
                    ordinal: source.ordinal,
                    text_hash: sha256_text(&source.text),
                    text: source.text.clone(),
                    embedding,
                });
            }

            documents.push(IndexedDocument {
                path: path_key,
                format: document.format.as_str().to_string(),
                sha256,
                chunk_count: source_chunks.len(),
            });
        }

        let metadata = IndexMetadata {
            builder: INDEX_BUILDER.to_string(),
            format_version: INDEX_FORMAT_VERSION.to_string(),
            embedder: embedder.identity(),
            dimensions: embedder.dimensions(),
            manifest: manifest.path_keys(),
            chunk_count: chunks.len(),
            built_at: now_utc_string(),
            content_digest: content_digest(&chunks),
        };

        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            embedder = %metadata.embedder,
            duration_ms = started.elapsed().as_millis(),
            "similarity index built"
        );

        Ok(Self {
            metadata,
            documents,
            chunks,
        })
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    pub fn documents(&self) -> &[IndexedDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn nearest(&self, query_embedding: &[f32], k: usize) -> Vec<IndexHit> {
        let mut scored = self
            .chunks
            .iter()
            .enumerate()
            .map(|(position, chunk)| {
                (
                    position,
                    cosine_similarity(query_embedding, &chunk.embedding),
                )
            })
            .collect::<Vec<(usize, f64)>>();

        scored.sort_by(|left, right| right.1.total_cmp(&left.1).then(left.0.cmp(&right.0)));

        scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(rank, (position, score))| {
                let chunk = &self.chunks[position];
                IndexHit {
                    rank: rank + 1,
                    score,
                    chunk_id: chunk.chunk_id.clone(),
                    document: chunk.document.clone(),
                    text: chunk.text.clone(),
                }
            })
            .collect()
    }

    pub fn write_to(&self, path: &Path) -> NavigatorResult<()> {
        let mut connection = Connection::open(path)?;
        connection.pragma_update(None, "synchronous", "FULL")?;
        create_schema(&connection)?;

        let tx = connection.transaction()?;
        {
            let mut insert_meta =
                tx.prepare("INSERT INTO metadata(key, value) VALUES(?1, ?2)")?;
            let manifest_json = serde_json::to_string(&self.metadata.manifest)
                .map_err(|err| NavigatorError::configuration(err.to_string()))?;
            insert_meta.execute(params!["builder", self.metadata.builder])?;
            insert_meta.execute(params!["format_version", self.metadata.format_version])?;
            insert_meta.execute(params!["embedder", self.metadata.embedder])?;
            insert_meta.execute(params!["dimensions", self.metadata.dimensions.to_string()])?;
            insert_meta.execute(params!["manifest", manifest_json])?;
            insert_meta.execute(params!["chunk_count", self.metadata.chunk_count.to_string()])?;
            insert_meta.execute(params!["built_at", self.metadata.built_at])?;
            insert_meta.execute(params!["persisted_at", Utc::now()])?;
            insert_meta.execute(params!["content_digest", self.metadata.content_digest])?;

            let mut insert_document = tx.prepare(
                "INSERT INTO documents(doc_ordinal, path, format, sha256, chunk_count) VALUES(?1, ?2, ?3, ?4, ?5)",
            )?;
            for (ordinal, document) in self.documents.iter().enumerate() {
                insert_document.execute(params![
                    ordinal as i64,
                    document.path,
                    document.format,
                    document.sha256,
                    document.chunk_count as i64,
                ])?;
            }

            let mut insert_chunk = tx.prepare(
                "
                INSERT INTO chunks(position, chunk_id, document, ordinal, text, text_hash, embedding, embedding_dim)
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
            )?;
            for (position, chunk) in self.chunks.iter().enumerate() {
                insert_chunk.execute(params![
                    position as i64,
                    chunk.chunk_id,
                    chunk.document,
                    chunk.ordinal as i64,
                    chunk.text,
                    chunk.text_hash,
                    encode_embedding_blob(&chunk.embedding),
                    chunk.embedding.len() as i64,
                ])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    // Only indexes stamped by this builder are loaded unless `allow_foreign` is set.
    pub fn open_trusted(path: &Path, allow_foreign: bool) -> NavigatorResult<Self> {
        let corrupt = |reason: String| NavigatorError::corruption(path, reason);

        if !path.is_file() {
            return Err(corrupt("persisted index file is missing".to_string()));
        }

        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| corrupt(format!("failed to open index: {err}")))?;

        let builder = read_meta(&connection, "builder").map_err(&corrupt)?;
        if builder != INDEX_BUILDER && !allow_foreign {
            return Err(corrupt(format!(
                "refusing to load index produced by '{builder}'; only indexes built by {INDEX_BUILDER} are trusted"
            )));
        }

        let format_version = read_meta(&connection, "format_version").map_err(&corrupt)?;
        if format_version != INDEX_FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported index format version '{format_version}'"
            )));
        }

        let embedder = read_meta(&connection, "embedder").map_err(&corrupt)?;
        let dimensions = read_meta(&connection, "dimensions")
            .map_err(&corrupt)?
            .parse::<usize>()
            .map_err(|err| corrupt(format!("invalid dimensions: {err}")))?;
        let manifest: Vec<String> =
            serde_json::from_str(&read_meta(&connection, "manifest").map_err(&corrupt)?)
                .map_err(|err| corrupt(format!("invalid embedded manifest: {err}")))?;
        let chunk_count = read_meta(&connection, "chunk_count")
            .map_err(&corrupt)?
            .parse::<usize>()
            .map_err(|err| corrupt(format!("invalid chunk count: {err}")))?;
        let built_at = read_meta(&connection, "built_at").map_err(&corrupt)?;
        let stored_digest = read_meta(&connection, "content_digest").map_err(&corrupt)?;

        let documents = load_documents(&connection)
            .map_err(|err| corrupt(format!("failed to read documents: {err}")))?;
        let chunks = load_chunks(&connection, dimensions)
            .map_err(|err| corrupt(format!("failed to read chunks: {err}")))?
            .map_err(&corrupt)?;

        if chunks.len() != chunk_count {
            return Err(corrupt(format!(
                "index holds {} chunks but records {chunk_count}",
                chunks.len()
            )));
        }

        let digest = content_digest(&chunks);
        if digest != stored_digest {
            return Err(corrupt("content digest mismatch".to_string()));
        }

        Ok(Self {
            metadata: IndexMetadata {
                builder,
                format_version,
                embedder,
                dimensions,
                manifest,
                chunk_count,
                built_at,
                content_digest: digest,
            },
            documents,
            chunks,
        })
    }
}

fn create_schema(connection: &Connection) -> NavigatorResult<()> {
    connection.execute_batch(
        "
        CREATE TABLE metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE documents (
          doc_ordinal INTEGER PRIMARY KEY,
          path TEXT NOT NULL,
          format TEXT NOT NULL,
          sha256 TEXT NOT NULL,
          chunk_count INTEGER NOT NULL
        );

        CREATE TABLE chunks (
          position INTEGER PRIMARY KEY,
          chunk_id TEXT NOT NULL UNIQUE,
          document TEXT NOT NULL,
          ordinal INTEGER NOT NULL,
          text TEXT NOT NULL,
          text_hash TEXT NOT NULL,
          embedding BLOB NOT NULL,
          embedding_dim INTEGER NOT NULL
        );
        ",
    )?;
    Ok(())
}

fn read_meta(connection: &Connection, key: &str) -> Result<String, String> {
    connection
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1 LIMIT 1",
            [key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|err| format!("failed to read index metadata '{key}': {err}"))?
        .ok_or_else(|| format!("index metadata '{key}' is missing"))
}

fn load_documents(connection: &Connection) -> rusqlite::Result<Vec<IndexedDocument>> {
    let mut statement = connection.prepare(
        "SELECT path, format, sha256, chunk_count FROM documents ORDER BY doc_ordinal ASC",
    )?;
    let mut rows = statement.query([])?;
    let mut out = Vec::<IndexedDocument>::new();

    while let Some(row) = rows.next()? {
        out.push(IndexedDocument {
            path: row.get(0)?,
            format: row.get(1)?,
            sha256: row.get(2)?,
            chunk_count: row.get::<_, i64>(3)? as usize,
        });
    }

    Ok(out)
}

fn load_chunks(
    connection: &Connection,
    dimensions: usize,
) -> rusqlite::Result<Result<Vec<IndexedChunk>, String>> {
    let mut statement = connection.prepare(
        "
        SELECT chunk_id, document, ordinal, text, text_hash, embedding, embedding_dim
        FROM chunks
        ORDER BY position ASC
        ",
    )?;
    let mut rows = statement.query([])?;
    let mut out = Vec::<IndexedChunk>::new();

    while let Some(row) = rows.next()? {
        let chunk_id: String = row.get(0)?;
        let row_dim = row.get::<_, i64>(6)? as usize;
        if row_dim != dimensions {
            return Ok(Err(format!(
                "chunk {chunk_id} has {row_dim} dimensions, index records {dimensions}"
            )));
        }

        let blob = row.get::<_, Vec<u8>>(5)?;
        let Some(embedding) = decode_embedding_blob(&blob, dimensions) else {
            return Ok(Err(format!("chunk {chunk_id} has a malformed embedding")));
        };

        let text: String = row.get(3)?;
        let text_hash: String = row.get(4)?;
        if sha256_text(&text) != text_hash {
            return Ok(Err(format!("chunk {chunk_id} text does not match its recorded hash")));
        }

        out.push(IndexedChunk {
            chunk_id,
            document: row.get(1)?,
            ordinal: row.get::<_, i64>(2)? as usize,
            text,
            text_hash,
            embedding,
        });
    }

    Ok(Ok(out))
}

fn content_digest(chunks: &[IndexedChunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.chunk_id.as_bytes());
        hasher.update([0_u8]);
        hasher.update(chunk.document.as_bytes());
        hasher.update([0_u8]);
        hasher.update(chunk.text_hash.as_bytes());
        hasher.update([0_u8]);
        hasher.update(encode_embedding_blob(&chunk.embedding));
    }
    format!("{:x}", hasher.finalize())
}
