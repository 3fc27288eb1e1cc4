//! Bronze sources and Silver sinks.

pub mod csv;
pub mod memory;
pub mod postgres;

use anyhow::Result;

use crate::bronze::BronzeSnapshot;
use crate::pipeline::Stage;
use crate::silver::SilverTables;

pub use self::csv::CsvBronze;
pub use self::memory::MemorySink;
pub use self::postgres::PgWarehouse;

/// Somewhere a full Bronze snapshot can be read from
#[allow(async_fn_in_trait)]
pub trait BronzeSource {
    async fn read_snapshot(&self) -> Result<BronzeSnapshot>;
}

/// Destination of the conformed tables.
///
/// `replace` truncates the stage's table and writes the stage's rows from
/// `tables`. Between `begin` and `commit` every `replace` belongs to one
/// transaction; outside of them each `replace` commits on its own.
#[allow(async_fn_in_trait)]
pub trait SilverSink {
    async fn begin(&mut self) -> Result<()>;
    async fn replace(&mut self, stage: Stage, tables: &SilverTables) -> Result<u64>;
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;
}

/// Rows of `stage` held in `tables`
pub fn stage_len(stage: Stage, tables: &SilverTables) -> usize {
    match stage {
        Stage::Geolocation => tables.geolocation.len(),
        Stage::CategoryTranslation => tables.category_translation.len(),
        Stage::Product => tables.products.len(),
        Stage::Seller => tables.sellers.len(),
        Stage::Customer => tables.customers.len(),
        Stage::Order => tables.orders.len(),
        Stage::DateDim => tables.date_dim.len(),
        Stage::Payment => tables.payments.len(),
        Stage::Review => tables.reviews.len(),
        Stage::OrderItem => tables.order_items.len(),
    }
}
