//! Batch loader: persist a normalized table in fixed-size batches.
//!
//! Per batch: `Pending → BulkAttempted → {Committed | RowFallback}`.
//! The bulk path is one transaction; if it fails, the batch degrades
//! to per-row mode (also one transaction) where each failing row is
//! logged and skipped. The bulk path is never retried.

use serde::Serialize;

use crate::error::IdrResult;
use crate::normalize::NormalizedTable;
use crate::store::DisputeStore;

/// Rows per write transaction. Bounds transaction size and memory
/// while amortizing round-trip overhead.
pub const BATCH_SIZE: usize = 1000;

/// Running totals for one load invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadSummary {
    /// Rows handed to the store (rejected rows are not attempted).
    pub rows_attempted: usize,
    /// Rows inserted or conflict-updated.
    pub rows_upserted: usize,
    /// Rows dropped inside per-row fallback.
    pub rows_skipped: usize,
    /// Rows excluded earlier by normalization.
    pub rows_rejected: usize,
    pub batches: usize,
    pub fallback_batches: usize,
}

/// Load one quarter's normalized table into the store.
///
/// Every record is stamped with `quarter` before the first write, so
/// repeated loads for different quarters coexist in one table and
/// re-running the same quarter is idempotent (upsert-on-conflict).
/// Batch- and row-scoped failures are recovered locally; only
/// non-batch errors (e.g. a lost connection) propagate.
pub fn load_quarter(
    store: &mut DisputeStore,
    table: NormalizedTable,
    quarter: &str,
) -> IdrResult<LoadSummary> {
    let NormalizedTable {
        mut records,
        rejects,
    } = table;

    for reject in &rejects {
        log::warn!(
            "row {} rejected ({}): {}",
            reject.row_index,
            reject
                .dispute_number
                .as_deref()
                .unwrap_or("dispute number unknown"),
            reject.reason
        );
    }

    for record in &mut records {
        record.data_quarter = quarter.to_string();
    }

    let mut summary = LoadSummary {
        rows_rejected: rejects.len(),
        ..LoadSummary::default()
    };

    for batch in records.chunks(BATCH_SIZE) {
        summary.batches += 1;
        summary.rows_attempted += batch.len();

        match store.upsert_batch(batch) {
            Ok(n) => summary.rows_upserted += n,
            Err(err) => {
                log::warn!(
                    "bulk upsert failed for batch {} ({} rows), degrading to per-row mode: {err}",
                    summary.batches,
                    batch.len()
                );
                summary.fallback_batches += 1;
                let (upserted, skipped) = store.upsert_rows_individually(batch)?;
                summary.rows_upserted += upserted;
                summary.rows_skipped += skipped;
            }
        }
    }

    log::info!(
        "quarter {quarter}: {} upserted, {} skipped, {} rejected across {} batches ({} fell back)",
        summary.rows_upserted,
        summary.rows_skipped,
        summary.rows_rejected,
        summary.batches,
        summary.fallback_batches
    );

    Ok(summary)
}
