mod cache;
mod chunking;
mod index;
mod manifest;

pub use cache::{CacheOutcome, CacheStatus, CorpusIndexCache, LoadedIndex, RebuildReason};
pub use index::{IndexHit, IndexMetadata, IndexedDocument, SimilarityIndex};
pub use manifest::{CorpusManifest, DocumentDescriptor, DocumentFormat};
