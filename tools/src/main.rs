//! idr-loader: load one quarterly federal IDR PUF extract into SQLite.
//!
//! Usage:
//!   idr-loader --db idr.db --input puf-2024-q1.xlsx --quarter 2024-Q1 --create-schema
//!   idr-loader --db idr.db --input puf-2024-q2.xlsx --quarter 2024-Q2 --json

use anyhow::{bail, Context, Result};
use idr_core::extract::{read_sheet, DEFAULT_SHEET};
use idr_core::loader::load_quarter;
use idr_core::normalize::normalize_table;
use idr_core::report;
use idr_core::store::DisputeStore;
use std::env;
use std::fs;
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let db = require_arg(&args, "--db")?;
    let input = require_arg(&args, "--input")?;
    let quarter = require_arg(&args, "--quarter")?;
    let sheet = optional_arg(&args, "--sheet").unwrap_or_else(|| DEFAULT_SHEET.to_string());
    let schema_file = optional_arg(&args, "--schema-file");
    let create_schema = args.iter().any(|a| a == "--create-schema");
    let json_output = args.iter().any(|a| a == "--json");

    log::debug!("db={db} input={input} quarter={quarter} sheet={sheet}");

    let input_path = Path::new(&input);
    if !input_path.is_file() {
        bail!("input file not found: {input}");
    }

    let mut store = DisputeStore::open(&db)?;

    if create_schema {
        match &schema_file {
            Some(path) => {
                let sql = fs::read_to_string(path)
                    .with_context(|| format!("schema script not found: {path}"))?;
                store.provision_sql(&sql)?;
            }
            None => store.provision()?,
        }
    }

    let raw = read_sheet(input_path, &sheet)?;
    let table = normalize_table(&raw)?;
    let summary = load_quarter(&mut store, table, &quarter)?;
    store.refresh_derived_tables()?;

    let stats = report::best_effort_stats(&store);

    if json_output {
        let out = serde_json::json!({
            "quarter": quarter,
            "load": summary,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("=== LOAD SUMMARY ({quarter}) ===");
        println!("  rows attempted: {}", summary.rows_attempted);
        println!("  rows upserted:  {}", summary.rows_upserted);
        println!("  rows skipped:   {}", summary.rows_skipped);
        println!("  rows rejected:  {}", summary.rows_rejected);
        println!(
            "  batches:        {} ({} fell back to per-row mode)",
            summary.batches, summary.fallback_batches
        );
        println!();
        match &stats {
            Some(stats) => {
                println!("=== DATABASE TOTALS ===");
                print!("{}", report::render(stats));
            }
            None => println!("(post-load reporting unavailable, see log)"),
        }
    }

    Ok(())
}

fn require_arg(args: &[String], flag: &str) -> Result<String> {
    optional_arg(args, flag).with_context(|| format!("missing required argument {flag}"))
}

fn optional_arg(args: &[String], flag: &str) -> Option<String> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
}

fn print_usage() {
    println!("idr-loader - quarterly IDR PUF extract loader");
    println!();
    println!("Required:");
    println!("  --db <path>           SQLite database to load into (created if absent)");
    println!("  --input <path>        source xlsx/xls extract");
    println!("  --quarter <tag>       quarter tag, e.g. 2024-Q1");
    println!();
    println!("Optional:");
    println!("  --sheet <name>        sheet to read (default: \"{DEFAULT_SHEET}\")");
    println!("  --create-schema       run schema provisioning before loading");
    println!("  --schema-file <path>  external DDL script instead of the embedded one");
    println!("  --json                machine-readable summary on stdout");
}
