//! Ingestion and benchmarking library for Federal IDR payment-dispute
//! extracts.
//!
//! The pipeline runs extract → normalize → load → refresh → report:
//! [`extract`] reads one sheet of a quarterly spreadsheet extract,
//! [`normalize`] turns its raw cells into typed [`normalize::DisputeRecord`]s,
//! [`loader`] upserts them into SQLite in fixed-size batches with per-batch
//! failure isolation, [`store`] rebuilds the derived lookup and summary
//! tables, and [`report`] produces the operator-facing counts. [`benchmark`]
//! consumes the same normalized records (in memory or read back from the
//! store) for peer comparisons.

pub mod benchmark;
pub mod error;
pub mod extract;
pub mod loader;
pub mod normalize;
pub mod report;
pub mod store;
pub mod types;
