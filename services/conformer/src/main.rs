//! Conformer Service - Builds the Silver layer from Bronze extracts
//!
//! Responsibilities:
//! - Read a Bronze snapshot (database or CSV extracts)
//! - Normalize locations, repair order timelines, deduplicate entities
//! - Generate the date dimension
//! - Replace every Silver table in one transaction
//! - Record the batch in silver.load_runs
//!
//! CRITICAL: This service must be DETERMINISTIC
//! Same Bronze snapshot + same city rules = same Silver tables

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use conformer::calendar::CalendarGenerator;
use conformer::location::LocationNormalizer;
use conformer::pipeline;
use conformer::rules::CityRuleSet;
use conformer::store::{BronzeSource, CsvBronze, MemorySink, PgWarehouse};
use conformer::timeline::TimelineRepairer;
use conformer::{Config, LoadError, LoadReport, Loader};

#[derive(Parser, Debug)]
#[command(name = "conformer", about = "Conforms Bronze Olist extracts into the Silver layer")]
struct Args {
    /// Read Bronze from a directory of Olist CSV extracts instead of the database
    #[arg(long)]
    bronze_dir: Option<PathBuf>,

    /// City exception table (JSON); defaults to CITY_RULES_PATH, then the built-in table
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Dry run - transform without writing to the database
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Verify mode - transform twice and compare fingerprints
    #[arg(long, default_value = "false")]
    verify: bool,

    /// Print the stage plan and exit
    #[arg(long, default_value = "false")]
    plan: bool,

    /// Commit each table separately instead of one batch transaction
    #[arg(long, default_value = "false")]
    non_atomic: bool,
}

fn print_plan() {
    println!("Stage plan:");
    for (i, stage) in pipeline::full_plan().iter().enumerate() {
        let deps: Vec<&str> = stage.dependencies().iter().map(|d| d.table()).collect();
        if deps.is_empty() {
            println!("  [{:2}] silver.{}", i + 1, stage);
        } else {
            println!("  [{:2}] silver.{} (after {})", i + 1, stage, deps.join(", "));
        }
    }
}

fn print_report(report: &LoadReport) {
    println!("\n{:<22} {:>10} {:>10} {:>10} {:>8}", "table", "in", "written", "rejected", "ms");
    for step in &report.steps {
        println!(
            "{:<22} {:>10} {:>10} {:>10} {:>8}",
            step.stage.table(),
            step.rows_in,
            step.rows_written,
            step.rows_rejected,
            step.elapsed_ms
        );
    }
    println!("Rows written: {}", report.rows_written());
    println!("Rows rejected: {}", report.rows_rejected());
    println!("Fingerprint: {}", report.fingerprint);
}

/// Final outcome of a live load; a load failure wins over a failure to
/// record the run in silver.load_runs
fn settle_load(result: Result<LoadReport, LoadError>, recorded: Result<()>) -> Result<LoadReport> {
    match (result, recorded) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(record_err)) => Err(record_err),
        (Err(load_err), Ok(())) => Err(load_err.into()),
        (Err(load_err), Err(record_err)) => {
            warn!(error = %format!("{:#}", record_err), "failed to record load run");
            Err(load_err.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("conformer=info".parse()?))
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    println!("=== Olist Silver Conformer ===");

    if args.plan {
        print_plan();
        return Ok(());
    }

    let mode = if args.verify {
        "verify"
    } else if args.dry_run {
        "dry-run"
    } else {
        "live"
    };
    println!("Mode: {}", mode);

    let rules = match args.rules.as_ref().or(config.city_rules_path.as_ref()) {
        Some(path) => CityRuleSet::load(path).await?,
        None => CityRuleSet::embedded()?,
    };
    println!("City rules: {} ({} rules)", rules.version, rules.len());
    println!(
        "Calendar: {} .. {} ({})",
        config.calendar_start, config.calendar_end, config.carnival_mode
    );

    let loader = Loader::new(
        LocationNormalizer::new(rules),
        TimelineRepairer::new(config.default_delivery_days),
        CalendarGenerator::new(config.calendar_start, config.calendar_end, config.carnival_mode),
    )
    .atomic(config.atomic && !args.non_atomic);

    // The database is needed as Bronze source or as Silver target
    let offline = args.dry_run || args.verify;
    let warehouse = if args.bronze_dir.is_none() || !offline {
        Some(PgWarehouse::connect(config.require_db_url()?, config.db_max_connections).await?)
    } else {
        None
    };

    let bronze = match (&args.bronze_dir, &warehouse) {
        (Some(dir), _) => {
            println!("Bronze: CSV extracts in {}", dir.display());
            CsvBronze::new(dir).read_snapshot().await?
        }
        (None, Some(wh)) => {
            println!("Bronze: database");
            wh.read_snapshot().await?
        }
        (None, None) => anyhow::bail!("No Bronze source: pass --bronze-dir or set DB_URL"),
    };
    println!("Bronze rows: {}", bronze.total_rows());

    if args.verify {
        let first = loader.run(&bronze, &mut MemorySink::new()).await?;
        let second = loader.run(&bronze, &mut MemorySink::new()).await?;
        print_report(&first);
        if first.fingerprint != second.fingerprint {
            anyhow::bail!(
                "NON-DETERMINISTIC output: {} != {}",
                first.fingerprint,
                second.fingerprint
            );
        }
        println!("\nVerified: both runs produced {}", first.fingerprint);
        return Ok(());
    }

    if args.dry_run {
        let report = loader.run(&bronze, &mut MemorySink::new()).await?;
        print_report(&report);
        println!("\nDry run - nothing written to the database");
        return Ok(());
    }

    let mut warehouse = warehouse.context("DB_URL env var missing")?;
    let run_id = warehouse
        .create_load_run(serde_json::json!({
            "source": if args.bronze_dir.is_some() { "csv" } else { "database" },
            "bronze_rows": bronze.total_rows(),
            "atomic": loader.is_atomic(),
        }))
        .await?;
    println!("Load run: {}", run_id);

    let result = loader.run(&bronze, &mut warehouse).await;

    let (status, error, sqlstate, detail) = match &result {
        Ok(report) => ("ok", None, None, serde_json::to_value(report)?),
        Err(e) => (
            "failed",
            Some(e.to_string()),
            e.sqlstate(),
            serde_json::json!({ "failed_stage": e.failed_stage() }),
        ),
    };
    let finished = warehouse
        .finish_load_run(run_id, status, error.as_deref(), sqlstate, detail)
        .await;

    let report = settle_load(result, finished)?;
    print_report(&report);
    println!("\n=== Load Complete ===");
    println!("Silver layer ready for Gold views");

    Ok(())
}
