//! Configuration and on-disk schema handling for the MCP aggregating proxy.
//!
//! Three files are owned here:
//! - the active-set config (`config.json`), read/written by the Active Set
//!   Manager on admit/evict and watched for external edits;
//! - the catalog (`mcp-registry.json`), the full list of known backends;
//! - the enhanced index (`enhanced-index.json`), embeddings + summaries used
//!   by the semantic search path.

pub mod auth;
pub mod catalog;
pub mod embeddings;
pub mod paths;
pub mod store;
pub mod transport;
pub mod watcher;

pub use auth::{auth_store_path, AuthStoreFile};
pub use catalog::{ArgumentRequirement, AuthRequirement, CatalogEntry, LaunchTemplate, ToolMeta};
pub use embeddings::{load_enhanced_index, EnhancedIndexFile, EnhancedServerEntry, ToolDescription};
pub use paths::{config_path, registry_path, enhanced_index_path, listen_port};
pub use store::{ActiveSetFile, ConfigStore, ServerEntry};
pub use transport::TransportSpec;
pub use watcher::{watch_config_file, ConfigWatchHandle};
