//! Quay Usage Library
//!
//! Incremental ingestion of container-registry usage logs into a local
//! SQLite store, with statistics, growth summaries, and exports over the
//! persisted data.
//!
//! ## Core Pipeline
//!
//! For each configured repository, one ingestion run:
//!
//! 1. plans a fetch window from the newest timestamp already stored
//!    ([`window`]), falling back to a fixed lookback on the first run
//! 2. drains the paginated log endpoint via continuation tokens ([`api`])
//! 3. builds a best-effort tag/manifest cross-reference ([`tag_index`])
//! 4. flattens every raw entry into a normalized record ([`normalizer`])
//! 5. persists the batch, silently rejecting records whose
//!    `(timestamp, repository)` identity already exists ([`store`])
//!
//! The store doubles as the checkpoint, so overlapping re-runs are always
//! safe and no external bookkeeping exists.
//!
//! ## Modules
//!
//! - [`models`] - wire shapes and the normalized record entity
//! - [`api`] - registry client, error taxonomy, pagination
//! - [`tag_index`] - tag/manifest cross-reference index
//! - [`normalizer`] - raw entry flattening and datetime parsing
//! - [`window`] - incremental fetch-window planning
//! - [`store`] - deduplicating SQLite persistence
//! - [`pipeline`] - per-repository orchestration and failure isolation
//! - [`stats`] - statistics and monthly growth reporting
//! - [`export`] - CSV/JSON dumps of the store
//! - [`config`] - layered configuration
//! - [`logging`] - structured logging setup

pub mod api;
pub mod config;
pub mod export;
pub mod logging;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod stats;
pub mod store;
pub mod tag_index;
pub mod window;

pub use models::*;
pub use store::LogStore;
