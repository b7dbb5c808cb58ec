//! The catalog/embeddings layer (C5): loads the full backend catalog and the
//! enhanced index, caches both with a short TTL, and answers `search_mcps`
//! with a cosine-similarity primary path and a keyword-score fallback.

mod embeddings;
mod keyword;
mod search;

pub use embeddings::{EmbeddingsProvider, OpenAiEmbeddings};
pub use search::{default_limit, CatalogView, RegistryError, SearchResult, SearchSource};
