//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! The loader, refresher, reporter and benchmark reader call store
//! methods — they never execute SQL directly.

use chrono::Utc;
use rusqlite::{params, Connection, Statement};

use crate::error::IdrResult;
use crate::normalize::DisputeRecord;
use crate::report::{MigrationStats, QuarterCount, SpecialtyCount};
use crate::types::PROVIDER_WIN_OUTCOME;

/// The embedded DDL script. The CLI may substitute an external file.
pub const SCHEMA_SQL: &str = include_str!("../../migrations/001_schema.sql");

const UPSERT_SQL: &str = "INSERT INTO idr_disputes (
        dispute_number, dli_number, payment_determination_outcome,
        default_decision, type_of_dispute, dispute_line_item_type,
        provider_facility_group_name, provider_facility_name,
        provider_email_domain, provider_facility_npi,
        practice_facility_size, practice_facility_specialty,
        health_plan_issuer_name, health_plan_email_domain, health_plan_type,
        length_determination_days, idre_compensation,
        type_of_service_code, service_code, place_of_service_code,
        item_service_description, location_of_service,
        provider_offer_pct_qpa, health_plan_offer_pct_qpa,
        offer_selected_from, prevailing_party_offer_pct_qpa,
        qpa_pct_median_qpa, provider_offer_pct_median,
        health_plan_offer_pct_median, prevailing_offer_pct_median,
        initiating_party, data_quarter, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
              ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26,
              ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34)
    ON CONFLICT(dispute_number) DO UPDATE SET
        updated_at = excluded.updated_at";

pub struct DisputeStore {
    conn: Connection,
}

impl DisputeStore {
    /// Open (or create) the dispute database at `path`.
    pub fn open(path: &str) -> IdrResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: better concurrent read performance for real files.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> IdrResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    // ── Schema provisioning ───────────────────────────────────

    /// Run the embedded DDL script. Safe to invoke repeatedly.
    pub fn provision(&mut self) -> IdrResult<()> {
        self.provision_sql(SCHEMA_SQL)
    }

    /// Run an arbitrary DDL script inside one all-or-nothing
    /// transaction: either every object exists afterwards or none of
    /// this invocation's work does.
    pub fn provision_sql(&mut self, sql: &str) -> IdrResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.commit()?;
        log::info!("schema provisioned");
        Ok(())
    }

    // ── Batch writes ──────────────────────────────────────────

    /// Upsert a whole batch in a single transaction.
    ///
    /// On key conflict only `updated_at` is refreshed; business columns
    /// keep their originally loaded values. Any row failure rolls the
    /// whole batch back and surfaces the error to the caller, which is
    /// expected to degrade to [`Self::upsert_rows_individually`].
    pub fn upsert_batch(&mut self, batch: &[DisputeRecord]) -> IdrResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
            for record in batch {
                execute_upsert(&mut stmt, record, &now)?;
            }
        }
        tx.commit()?;
        Ok(batch.len())
    }

    /// Per-row fallback for a batch whose bulk upsert failed.
    ///
    /// Still one transaction; a failing row is logged and skipped
    /// (SQLite rolls back only the offending statement) and every
    /// surviving row is committed. Returns (upserted, skipped).
    pub fn upsert_rows_individually(
        &mut self,
        batch: &[DisputeRecord],
    ) -> IdrResult<(usize, usize)> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut upserted = 0;
        let mut skipped = 0;
        {
            let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
            for record in batch {
                match execute_upsert(&mut stmt, record, &now) {
                    Ok(()) => upserted += 1,
                    Err(err) => {
                        skipped += 1;
                        log::warn!(
                            "skipping dispute {}: {err}",
                            record.dispute_number
                        );
                    }
                }
            }
        }
        tx.commit()?;
        Ok((upserted, skipped))
    }

    // ── Derived tables ────────────────────────────────────────

    /// Rebuild the lookup tables and the cached quarter summary from
    /// the base table. Re-run in full after every load; conflicting
    /// lookup keys are ignored, the summary is rebuilt from scratch.
    pub fn refresh_derived_tables(&mut self) -> IdrResult<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO specialties (name, standardized_name)
             SELECT DISTINCT practice_facility_specialty, practice_facility_specialty
             FROM idr_disputes
             WHERE practice_facility_specialty IS NOT NULL",
            [],
        )?;

        tx.execute(
            "INSERT OR IGNORE INTO service_codes (code, description)
             SELECT service_code, MIN(item_service_description)
             FROM idr_disputes
             WHERE service_code IS NOT NULL
             GROUP BY service_code",
            [],
        )?;

        tx.execute("DELETE FROM quarter_performance_summary", [])?;
        tx.execute(
            "INSERT INTO quarter_performance_summary (
                data_quarter, practice_facility_specialty, dispute_count,
                provider_wins, provider_win_rate,
                avg_provider_offer_pct, avg_prevailing_offer_pct
             )
             SELECT
                data_quarter,
                practice_facility_specialty,
                COUNT(*),
                SUM(CASE WHEN payment_determination_outcome = ?1 THEN 1 ELSE 0 END),
                ROUND(SUM(CASE WHEN payment_determination_outcome = ?1 THEN 1 ELSE 0 END)
                      * 100.0 / COUNT(*), 2),
                AVG(provider_offer_pct_qpa),
                AVG(prevailing_party_offer_pct_qpa)
             FROM idr_disputes
             GROUP BY data_quarter, practice_facility_specialty",
            params![PROVIDER_WIN_OUTCOME],
        )?;

        tx.commit()?;
        log::info!("derived tables refreshed");
        Ok(())
    }

    // ── Reporting queries (read-only) ─────────────────────────

    pub fn migration_stats(&self) -> IdrResult<MigrationStats> {
        let total_disputes: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM idr_disputes", [], |row| row.get(0))?;

        let mut stmt = self.conn.prepare(
            "SELECT data_quarter, COUNT(*) FROM idr_disputes
             GROUP BY data_quarter ORDER BY data_quarter",
        )?;
        let by_quarter = stmt
            .query_map([], |row| {
                Ok(QuarterCount {
                    data_quarter: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT practice_facility_specialty, COUNT(*) AS n
             FROM idr_disputes
             GROUP BY practice_facility_specialty
             ORDER BY n DESC, practice_facility_specialty ASC
             LIMIT 10",
        )?;
        let top_specialties = stmt
            .query_map([], |row| {
                Ok(SpecialtyCount {
                    specialty: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let provider_wins: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM idr_disputes
             WHERE payment_determination_outcome = ?1",
            params![PROVIDER_WIN_OUTCOME],
            |row| row.get(0),
        )?;

        let provider_win_rate = if total_disputes > 0 {
            let pct = provider_wins as f64 * 100.0 / total_disputes as f64;
            (pct * 100.0).round() / 100.0
        } else {
            0.0
        };

        Ok(MigrationStats {
            total_disputes,
            by_quarter,
            top_specialties,
            provider_wins,
            provider_win_rate,
        })
    }

    // ── Analytic read path ────────────────────────────────────

    /// Load every persisted dispute back into memory for benchmarking.
    pub fn fetch_all_disputes(&self) -> IdrResult<Vec<DisputeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                dispute_number, dli_number, payment_determination_outcome,
                default_decision, type_of_dispute, dispute_line_item_type,
                provider_facility_group_name, provider_facility_name,
                provider_email_domain, provider_facility_npi,
                practice_facility_size, practice_facility_specialty,
                health_plan_issuer_name, health_plan_email_domain, health_plan_type,
                length_determination_days, idre_compensation,
                type_of_service_code, service_code, place_of_service_code,
                item_service_description, location_of_service,
                provider_offer_pct_qpa, health_plan_offer_pct_qpa,
                offer_selected_from, prevailing_party_offer_pct_qpa,
                qpa_pct_median_qpa, provider_offer_pct_median,
                health_plan_offer_pct_median, prevailing_offer_pct_median,
                initiating_party, data_quarter
             FROM idr_disputes
             ORDER BY dispute_number",
        )?;
        let records = stmt
            .query_map([], |row| {
                Ok(DisputeRecord {
                    dispute_number: row.get(0)?,
                    dli_number: row.get(1)?,
                    payment_determination_outcome: row.get(2)?,
                    default_decision: row
                        .get::<_, Option<i32>>(3)?
                        .map(|v| v != 0),
                    type_of_dispute: row.get(4)?,
                    dispute_line_item_type: row.get(5)?,
                    provider_facility_group_name: row.get(6)?,
                    provider_facility_name: row.get(7)?,
                    provider_email_domain: row.get(8)?,
                    provider_facility_npi: row.get(9)?,
                    practice_facility_size: row.get(10)?,
                    practice_facility_specialty: row.get(11)?,
                    health_plan_issuer_name: row.get(12)?,
                    health_plan_email_domain: row.get(13)?,
                    health_plan_type: row.get(14)?,
                    length_determination_days: row.get(15)?,
                    idre_compensation: row.get(16)?,
                    type_of_service_code: row.get(17)?,
                    service_code: row.get(18)?,
                    place_of_service_code: row.get(19)?,
                    item_service_description: row.get(20)?,
                    location_of_service: row.get(21)?,
                    provider_offer_pct_qpa: row.get(22)?,
                    health_plan_offer_pct_qpa: row.get(23)?,
                    offer_selected_from: row.get(24)?,
                    prevailing_party_offer_pct_qpa: row.get(25)?,
                    qpa_pct_median_qpa: row.get(26)?,
                    provider_offer_pct_median: row.get(27)?,
                    health_plan_offer_pct_median: row.get(28)?,
                    prevailing_offer_pct_median: row.get(29)?,
                    initiating_party: row.get(30)?,
                    data_quarter: row.get(31)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ── Test / summary helpers ────────────────────────────────

    pub fn dispute_count(&self) -> IdrResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM idr_disputes", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn dispute_count_for_quarter(&self, quarter: &str) -> IdrResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM idr_disputes WHERE data_quarter = ?1",
                params![quarter],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    pub fn specialty_count(&self) -> IdrResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM specialties", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn service_code_count(&self) -> IdrResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM service_codes", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn quarter_summary_count(&self) -> IdrResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM quarter_performance_summary",
                [],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    pub fn updated_at(&self, dispute_number: &str) -> IdrResult<String> {
        self.conn
            .query_row(
                "SELECT updated_at FROM idr_disputes WHERE dispute_number = ?1",
                params![dispute_number],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}

fn execute_upsert(
    stmt: &mut Statement<'_>,
    record: &DisputeRecord,
    now: &str,
) -> rusqlite::Result<()> {
    stmt.execute(params![
        record.dispute_number,
        record.dli_number,
        record.payment_determination_outcome,
        record.default_decision.map(i32::from),
        record.type_of_dispute,
        record.dispute_line_item_type,
        record.provider_facility_group_name,
        record.provider_facility_name,
        record.provider_email_domain,
        record.provider_facility_npi,
        record.practice_facility_size,
        record.practice_facility_specialty,
        record.health_plan_issuer_name,
        record.health_plan_email_domain,
        record.health_plan_type,
        record.length_determination_days,
        record.idre_compensation,
        record.type_of_service_code,
        record.service_code,
        record.place_of_service_code,
        record.item_service_description,
        record.location_of_service,
        record.provider_offer_pct_qpa,
        record.health_plan_offer_pct_qpa,
        record.offer_selected_from,
        record.prevailing_party_offer_pct_qpa,
        record.qpa_pct_median_qpa,
        record.provider_offer_pct_median,
        record.health_plan_offer_pct_median,
        record.prevailing_offer_pct_median,
        record.initiating_party,
        record.data_quarter,
        now,
        now,
    ])?;
    Ok(())
}
