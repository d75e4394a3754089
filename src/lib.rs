//! # Picta Core (library root)
//!
//! The search and recommendation engine behind a personal photo library:
//!
//! - A durable embedding store (`store`, `schema`, `models`) over SQLite.
//! - An in-memory approximate-nearest-neighbor index (`ann`) kept in sync
//!   with the store by explicit `rebuild()` calls.
//! - A natural-language query parser (`parser`, `query_plan`) that lowers a
//!   user utterance into a structured `QueryPlan`, with a geocoder
//!   (`geocoder`) for named places and a deterministic fallback when the
//!   LLM is unavailable.
//! - A hybrid metadata + semantic search engine (`filter`, `threshold`,
//!   `search`) and a visual recommender (`recommend`) for similar/same
//!   place/same day neighbor sets and K-means auto-albums.
//! - A batch indexer (`indexer`) that turns scraper output into stored,
//!   embedded, indexed photos.
//!
//! ## Embedding model
//! The vision-language model that turns images and text into vectors is
//! treated as an external collaborator (see [`embedder::Embedder`]). This
//! crate ships a text-side implementation built on `candle`/`hf-hub`
//! (`all-MiniLM-L6-v2`, downloaded from Hugging Face Hub on first use and
//! cached there); image encoding is left to the caller's vision model.
//!
//! ## Modules
//! - [`ann`], [`commands`], [`config`], [`embedder`], [`error`],
//!   [`filter`], [`geocoder`], [`indexer`], [`models`], [`parser`],
//!   [`query_plan`], [`recommend`], [`scraper`], [`schema`], [`search`],
//!   [`store`], [`threshold`]

use directories::ProjectDirs;

pub mod ann;
pub mod commands;
pub mod config;
pub mod embedder;
pub mod error;
pub mod filter;
pub mod geocoder;
pub mod indexer;
pub mod models;
pub mod parser;
pub mod query_plan;
pub mod recommend;
pub mod scraper;
pub mod schema;
pub mod search;
pub mod store;
pub mod threshold;

/// Return the per-platform configuration directory used by Picta.
///
/// Uses [`directories::ProjectDirs`] with the application triple
/// `("com", "picta", "picta")`. The directory is **not** created by this
/// function; callers that need it should create it with
/// `fs::create_dir_all`.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be
/// determined (rare, but possible in heavily sandboxed environments).
pub fn config_dir() -> Result<std::path::PathBuf, error::CoreError> {
    let proj_dirs = ProjectDirs::from("com", "picta", "picta")
        .ok_or_else(|| error::CoreError::InvalidQuery("unable to determine config directory".into()))?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
