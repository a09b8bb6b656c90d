//! Social journal for VR sessions. Rebuilds "who was with whom, where, and for how
//! long" from raw presence logs, and groups the independently observed copies of one
//! occasion so every participant sees the same comments and likes.
//!
//! Each user's client records a presence log: location changes, player joins and
//! player leaves. A single real occasion is therefore observed several times, once
//! per participant who logged it. The journal core turns those logs into shared
//! events and clusters them:
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | **Parse** | [`journal::logparse`] | Logical records from pasted client text |
//! | **Store** | [`journal::ingest`] | Ordered per-observer presence entries |
//! | **Reconstruct** | [`journal::reconstruct`] | Co-presence intervals for one observer |
//! | **Merge** | [`journal::merge`] | Candidates with re-imported duplicates removed |
//! | **Group** | [`journal::grouping`] | Connected components of matching events |
//!
//! # Architecture
//!
//! - **Storage**: SQLite via rusqlite, schema bootstrapped once at startup
//! - **Execution**: every conversion or regroup pass runs inside one transaction
//! - **Transport**: JSON over HTTP (axum) plus a local CLI
//!
//! # Modules
//!
//! - [`api`]: HTTP routes and handlers over a shared connection
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite database initialization, schema, migrations, and health checks
//! - [`error`]: Error taxonomy for journal operations
//! - [`journal`]: Core engine. Parsing, reconstruction, merging and grouping live
//!   here, along with friend edges, event annotations ([`journal::events`]) and
//!   per-user statistics ([`journal::stats`])

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod journal;
