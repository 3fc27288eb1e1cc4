//! Conformance Loader
//!
//! Responsibilities:
//! - Run every Silver stage in dependency order against one Bronze snapshot
//! - Replace each Silver table wholesale (truncate + insert)
//! - Time each stage and report rows in / written / rejected
//! - Halt the batch on the first failure, naming the stage and SQLSTATE
//! - Fingerprint the produced tables so reruns can be compared
//!
//! The same Bronze snapshot always yields the same Silver tables.

use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::bronze::BronzeSnapshot;
use crate::calendar::CalendarGenerator;
use crate::catalog;
use crate::dedup;
use crate::error::LoadError;
use crate::location::LocationNormalizer;
use crate::pipeline::{self, Stage};
use crate::silver::SilverTables;
use crate::store::SilverSink;
use crate::timeline::TimelineRepairer;

/// Outcome of one stage
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub stage: Stage,
    pub rows_in: usize,
    pub rows_written: u64,
    pub rows_rejected: usize,
    pub elapsed_ms: u128,
    /// Stage-specific quality counters
    pub quality: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub steps: Vec<StepReport>,
    pub atomic: bool,
    pub rules_version: String,
    pub fingerprint: String,
    pub elapsed_ms: u128,
}

impl LoadReport {
    pub fn rows_written(&self) -> u64 {
        self.steps.iter().map(|s| s.rows_written).sum()
    }

    pub fn rows_rejected(&self) -> usize {
        self.steps.iter().map(|s| s.rows_rejected).sum()
    }

    pub fn step(&self, stage: Stage) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.stage == stage)
    }
}

/// What a stage produced before it was written
struct StageOutcome {
    rows_in: usize,
    rows_rejected: usize,
    quality: serde_json::Value,
}

impl StageOutcome {
    fn new<Q: Serialize>(
        rows_in: usize,
        rows_rejected: usize,
        quality: &Q,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            rows_in,
            rows_rejected,
            quality: serde_json::to_value(quality)?,
        })
    }
}

pub struct Loader {
    normalizer: LocationNormalizer,
    repairer: TimelineRepairer,
    calendar: CalendarGenerator,
    atomic: bool,
    stages: Vec<Stage>,
}

impl Loader {
    pub fn new(
        normalizer: LocationNormalizer,
        repairer: TimelineRepairer,
        calendar: CalendarGenerator,
    ) -> Self {
        Self {
            normalizer,
            repairer,
            calendar,
            atomic: true,
            stages: pipeline::full_plan(),
        }
    }

    /// One transaction for the whole batch (default) or one per table
    pub fn atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    /// Restrict the run to `stages` (plus nothing else; dependencies must be listed)
    pub fn with_stages(mut self, stages: &[Stage]) -> Result<Self, LoadError> {
        self.stages = pipeline::plan(stages).map_err(LoadError::Plan)?;
        Ok(self)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    /// Conform `bronze` and write every planned stage to `sink`.
    pub async fn run<S: SilverSink>(
        &self,
        bronze: &BronzeSnapshot,
        sink: &mut S,
    ) -> Result<LoadReport, LoadError> {
        let started = Instant::now();
        info!(
            stages = self.stages.len(),
            bronze_rows = bronze.total_rows(),
            atomic = self.atomic,
            rules_version = %self.normalizer.rules().version,
            "starting silver load"
        );

        if self.atomic {
            sink.begin()
                .await
                .map_err(|e| LoadError::transaction("begin", &e))?;
        }

        let mut tables = SilverTables::default();
        let mut steps = Vec::with_capacity(self.stages.len());

        for &stage in &self.stages {
            match self.run_stage(stage, bronze, &mut tables, sink).await {
                Ok(step) => steps.push(step),
                Err(err) => {
                    let load_err = LoadError::stage(stage, &err);
                    error!(
                        stage = %stage,
                        sqlstate = load_err.sqlstate().unwrap_or("-"),
                        error = %format!("{:#}", err),
                        "stage failed, halting batch"
                    );
                    if self.atomic {
                        if let Err(rb) = sink.rollback().await {
                            warn!(error = %rb, "rollback failed");
                        }
                    }
                    return Err(load_err);
                }
            }
        }

        if self.atomic {
            sink.commit()
                .await
                .map_err(|e| LoadError::transaction("commit", &e))?;
        }

        let fingerprint = tables
            .fingerprint()
            .map_err(|e| LoadError::transaction("fingerprint", &e))?;
        let report = LoadReport {
            steps,
            atomic: self.atomic,
            rules_version: self.normalizer.rules().version.clone(),
            fingerprint,
            elapsed_ms: started.elapsed().as_millis(),
        };
        info!(
            rows_written = report.rows_written(),
            rows_rejected = report.rows_rejected(),
            fingerprint = %report.fingerprint,
            elapsed_ms = report.elapsed_ms as u64,
            "silver load complete"
        );
        Ok(report)
    }

    async fn run_stage<S: SilverSink>(
        &self,
        stage: Stage,
        bronze: &BronzeSnapshot,
        tables: &mut SilverTables,
        sink: &mut S,
    ) -> anyhow::Result<StepReport> {
        let started = Instant::now();
        let outcome = self.build(stage, bronze, tables)?;
        let rows_written = sink.replace(stage, tables).await?;
        let step = StepReport {
            stage,
            rows_in: outcome.rows_in,
            rows_written,
            rows_rejected: outcome.rows_rejected,
            elapsed_ms: started.elapsed().as_millis(),
            quality: outcome.quality,
        };
        info!(
            stage = %stage,
            rows_in = step.rows_in,
            rows_written = step.rows_written,
            rows_rejected = step.rows_rejected,
            elapsed_ms = step.elapsed_ms as u64,
            "stage loaded"
        );
        Ok(step)
    }

    /// Fill the stage's table in `tables` from Bronze and earlier stages
    fn build(
        &self,
        stage: Stage,
        bronze: &BronzeSnapshot,
        tables: &mut SilverTables,
    ) -> anyhow::Result<StageOutcome> {
        match stage {
            Stage::Geolocation => {
                let (rows, q) = self.normalizer.resolve_geolocation(&bronze.geolocation);
                warn_unknown_states(stage, q.unknown_state);
                tables.geolocation = rows;
                StageOutcome::new(q.rows_in, q.rejected_rows(), &q)
            }
            Stage::CategoryTranslation => {
                let (rows, s) = catalog::conform_translations(&bronze.category_translation);
                tables.category_translation = rows;
                StageOutcome::new(s.rows_in, s.rejected_rows(), &s)
            }
            Stage::Product => {
                let (rows, s) =
                    catalog::conform_products(&bronze.products, &tables.category_translation);
                tables.products = rows;
                StageOutcome::new(s.rows_in, s.rejected_rows(), &s)
            }
            Stage::Seller => {
                let (rows, q) = self.normalizer.resolve_sellers(&bronze.sellers);
                warn_unknown_states(stage, q.unknown_state);
                tables.sellers = rows;
                StageOutcome::new(q.rows_in, q.rejected_rows(), &q)
            }
            Stage::Customer => {
                let (rows, q) = self.normalizer.resolve_customers(&bronze.customers);
                warn_unknown_states(stage, q.unknown_state);
                tables.customers = rows;
                StageOutcome::new(q.rows_in, q.rejected_rows(), &q)
            }
            Stage::Order => {
                let (rows, s) = self.repairer.repair(&bronze.orders, &tables.customers);
                tables.orders = rows;
                StageOutcome::new(s.rows_in, s.rejected_rows(), &s)
            }
            Stage::DateDim => {
                let rows = self.calendar.generate()?;
                let n = rows.len();
                tables.date_dim = rows;
                StageOutcome::new(n, 0, &serde_json::json!({ "days": n }))
            }
            Stage::Payment => {
                let (rows, s) = {
                    let known = order_ids(tables);
                    dedup::renumber_payments(&bronze.payments, Some(&known))
                };
                tables.payments = rows;
                StageOutcome::new(s.rows_in, s.rejected_rows(), &s)
            }
            Stage::Review => {
                let (rows, s) = {
                    let known = order_ids(tables);
                    dedup::dedup_reviews(&bronze.reviews, Some(&known))
                };
                tables.reviews = rows;
                StageOutcome::new(s.rows_in, s.rejected_rows(), &s)
            }
            Stage::OrderItem => {
                let (rows, s) = {
                    let known = order_ids(tables);
                    dedup::renumber_order_items(&bronze.order_items, Some(&known))
                };
                tables.order_items = rows;
                StageOutcome::new(s.rows_in, s.rejected_rows(), &s)
            }
        }
    }
}

fn order_ids(tables: &SilverTables) -> HashSet<&str> {
    tables.orders.iter().map(|o| o.order_id.as_str()).collect()
}

fn warn_unknown_states(stage: Stage, count: usize) {
    if count > 0 {
        warn!(stage = %stage, rows = count, "rows carry a state outside the UF list");
    }
}

// =============================================================================
// TESTS
// =============================================================================
