//! # Plenary
//!
//! Ingestion of parliamentary plenary protocols (Bundestag
//! `dbtplenarprotokoll` XML) into a document store.
//!
//! Each transcript is parsed into speeches, agenda items and comments by a
//! streaming state machine. Many transcripts are parsed in parallel, their
//! records aggregated, and the result upserted by id in batches, so
//! re-ingesting the same files converges to the same stored state.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌───────────┐   ┌──────────┐
//! │ Discovery │──▶│ Parse (pool) │──▶│ Aggregate │──▶│ Persist  │
//! │  *.xml    │   │ quick-xml SM │   │  buffers  │   │ batched  │
//! └───────────┘   └──────────────┘   └───────────┘   └────┬─────┘
//!                                                         ▼
//!                                                   ┌──────────┐
//!                                                   │  SQLite  │
//!                                                   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Record types and collections |
//! | [`marker`] | Recognised transcript elements |
//! | [`transcript`] | Streaming transcript parser |
//! | [`discovery`] | Input file listing |
//! | [`buffer`] | Thread-safe aggregation buffers |
//! | [`persist`] | Batched upserts |
//! | [`ingest`] | Run orchestration and summary |
//! | [`store`] | Document store trait, SQLite and in-memory backends |
//! | [`progress`] | Progress reporting on stderr |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`stats`] | Collection statistics |
//! | [`get`] | Record retrieval |
//! | [`runtime`] | CLI runtime with bounded shutdown |

pub mod buffer;
pub mod config;
pub mod db;
pub mod discovery;
pub mod get;
pub mod ingest;
pub mod marker;
pub mod migrate;
pub mod models;
pub mod persist;
pub mod progress;
pub mod runtime;
pub mod stats;
pub mod store;
pub mod transcript;
