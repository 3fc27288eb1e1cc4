//! Bronze snapshot from a directory of Olist CSV extracts.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use super::BronzeSource;
use crate::bronze::BronzeSnapshot;

pub const CUSTOMERS_FILE: &str = "olist_customers_dataset.csv";
pub const GEOLOCATION_FILE: &str = "olist_geolocation_dataset.csv";
pub const ORDERS_FILE: &str = "olist_orders_dataset.csv";
pub const ORDER_ITEMS_FILE: &str = "olist_order_items_dataset.csv";
pub const PAYMENTS_FILE: &str = "olist_order_payments_dataset.csv";
pub const REVIEWS_FILE: &str = "olist_order_reviews_dataset.csv";
pub const PRODUCTS_FILE: &str = "olist_products_dataset.csv";
pub const SELLERS_FILE: &str = "olist_sellers_dataset.csv";
pub const CATEGORY_TRANSLATION_FILE: &str = "product_category_name_translation.csv";

pub struct CsvBronze {
    dir: PathBuf,
}

impl CsvBronze {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.dir.join(file);
        let content = fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let rows = parse_rows(&content, file);
        info!(file, rows = rows.len(), "read bronze extract");
        Ok(rows)
    }
}

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Deserialize every record; malformed lines (including invalid UTF-8) are
/// skipped with a warning
pub fn parse_rows<T: DeserializeOwned>(content: &[u8], file: &str) -> Vec<T> {
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content);

    let mut rows = Vec::new();
    for (line_num, result) in reader.deserialize().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => warn!(file, line = line_num + 2, error = %e, "skipping malformed line"),
        }
    }
    rows
}

impl BronzeSource for CsvBronze {
    async fn read_snapshot(&self) -> Result<BronzeSnapshot> {
        Ok(BronzeSnapshot {
            customers: self.read(CUSTOMERS_FILE).await?,
            geolocation: self.read(GEOLOCATION_FILE).await?,
            orders: self.read(ORDERS_FILE).await?,
            order_items: self.read(ORDER_ITEMS_FILE).await?,
            payments: self.read(PAYMENTS_FILE).await?,
            reviews: self.read(REVIEWS_FILE).await?,
            products: self.read(PRODUCTS_FILE).await?,
            sellers: self.read(SELLERS_FILE).await?,
            category_translation: self.read(CATEGORY_TRANSLATION_FILE).await?,
        })
    }
}
