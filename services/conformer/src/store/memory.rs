//! In-process sink used for dry runs, verification and tests.

use anyhow::Result;

use super::{stage_len, SilverSink};
use crate::pipeline::Stage;
use crate::silver::SilverTables;

#[derive(Debug, Default)]
pub struct MemorySink {
    committed: SilverTables,
    staged: Option<SilverTables>,
    /// Stages written, in call order
    pub writes: Vec<Stage>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables visible to readers (uncommitted work excluded)
    pub fn tables(&self) -> &SilverTables {
        &self.committed
    }

    pub fn into_tables(self) -> SilverTables {
        self.committed
    }
}

fn copy_stage(stage: Stage, from: &SilverTables, to: &mut SilverTables) {
    match stage {
        Stage::Geolocation => to.geolocation = from.geolocation.clone(),
        Stage::CategoryTranslation => to.category_translation = from.category_translation.clone(),
        Stage::Product => to.products = from.products.clone(),
        Stage::Seller => to.sellers = from.sellers.clone(),
        Stage::Customer => to.customers = from.customers.clone(),
        Stage::Order => to.orders = from.orders.clone(),
        Stage::DateDim => to.date_dim = from.date_dim.clone(),
        Stage::Payment => to.payments = from.payments.clone(),
        Stage::Review => to.reviews = from.reviews.clone(),
        Stage::OrderItem => to.order_items = from.order_items.clone(),
    }
}

impl SilverSink for MemorySink {
    async fn begin(&mut self) -> Result<()> {
        if self.staged.is_some() {
            anyhow::bail!("transaction already open");
        }
        self.staged = Some(self.committed.clone());
        Ok(())
    }

    async fn replace(&mut self, stage: Stage, tables: &SilverTables) -> Result<u64> {
        let target = match self.staged.as_mut() {
            Some(staged) => staged,
            None => &mut self.committed,
        };
        copy_stage(stage, tables, target);
        self.writes.push(stage);
        Ok(stage_len(stage, tables) as u64)
    }

    async fn commit(&mut self) -> Result<()> {
        match self.staged.take() {
            Some(staged) => {
                self.committed = staged;
                Ok(())
            }
            None => anyhow::bail!("no open transaction to commit"),
        }
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged = None;
        Ok(())
    }
}
