//! PostgreSQL warehouse: reads the `bronze` schema, rewrites the `silver`
//! schema and records each batch in `silver.load_runs`.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::query_builder::Separated;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::{BronzeSource, SilverSink};
use crate::bronze::{
    BronzeSnapshot, RawCategoryTranslation, RawCustomer, RawGeolocation, RawOrder, RawOrderItem,
    RawPayment, RawProduct, RawReview, RawSeller,
};
use crate::pipeline::Stage;
use crate::silver::SilverTables;

/// Postgres caps a statement at 65535 bind parameters
const BIND_LIMIT: usize = 65_535;

pub struct PgWarehouse {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgWarehouse {
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Record the start of a batch
    pub async fn create_load_run(&self, detail: serde_json::Value) -> Result<Uuid> {
        let run_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO silver.load_runs (run_id, status, detail)
            VALUES ($1, 'running', $2)
            "#,
        )
        .bind(run_id)
        .bind(detail)
        .execute(&self.pool)
        .await
        .context("Failed to create load run")?;
        Ok(run_id)
    }

    /// Close a batch record
    pub async fn finish_load_run(
        &self,
        run_id: Uuid,
        status: &str,
        error: Option<&str>,
        sqlstate: Option<&str>,
        detail: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE silver.load_runs
            SET finished_at = now(), status = $2, error = $3, sqlstate = $4, detail = detail || $5
            WHERE run_id = $1
            "#,
        )
        .bind(run_id)
        .bind(status)
        .bind(error)
        .bind(sqlstate)
        .bind(detail)
        .execute(&self.pool)
        .await
        .context("Failed to finish load run")?;
        Ok(())
    }

    async fn fetch<T>(&self, sql: &str, table: &str) -> Result<Vec<T>>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        sqlx::query_as::<_, T>(sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to read bronze.{}", table))
    }
}

impl BronzeSource for PgWarehouse {
    /// Rows come back in ingestion order so tie-breaks follow arrival
    async fn read_snapshot(&self) -> Result<BronzeSnapshot> {
        Ok(BronzeSnapshot {
            customers: self
                .fetch::<RawCustomer>(
                    r#"
                        SELECT
                            customer_id, customer_unique_id, customer_zip_code_prefix,
                            customer_city, customer_state
                        FROM bronze.customers ORDER BY ingest_seq
                    "#,
                    "customers",
                )
                .await?,
            geolocation: self
                .fetch::<RawGeolocation>(
                    r#"
                        SELECT
                            geolocation_zip_code_prefix, geolocation_lat, geolocation_lng,
                            geolocation_city, geolocation_state
                        FROM bronze.geolocation ORDER BY ingest_seq
                    "#,
                    "geolocation",
                )
                .await?,
            orders: self
                .fetch::<RawOrder>(
                    r#"
                        SELECT
                            order_id, customer_id, order_status, order_purchase_timestamp,
                            order_approved_at, order_delivered_carrier_date,
                            order_delivered_customer_date, order_estimated_delivery_date
                        FROM bronze.orders ORDER BY ingest_seq
                    "#,
                    "orders",
                )
                .await?,
            order_items: self
                .fetch::<RawOrderItem>(
                    r#"
                        SELECT
                            order_id, order_item_id, product_id, seller_id, shipping_limit_date,
                            price, freight_value
                        FROM bronze.order_items ORDER BY ingest_seq
                    "#,
                    "order_items",
                )
                .await?,
            payments: self
                .fetch::<RawPayment>(
                    r#"
                        SELECT
                            order_id, payment_sequential, payment_type, payment_installments,
                            payment_value
                        FROM bronze.order_payments ORDER BY ingest_seq
                    "#,
                    "order_payments",
                )
                .await?,
            reviews: self
                .fetch::<RawReview>(
                    r#"
                        SELECT
                            review_id, order_id, review_score, review_comment_title,
                            review_comment_message, review_creation_date,
                            review_answer_timestamp
                        FROM bronze.order_reviews ORDER BY ingest_seq
                    "#,
                    "order_reviews",
                )
                .await?,
            products: self
                .fetch::<RawProduct>(
                    r#"
                        SELECT
                            product_id, product_category_name,
                            product_name_lenght AS product_name_length,
                            product_description_lenght AS product_description_length,
                            product_photos_qty, product_weight_g, product_length_cm,
                            product_height_cm, product_width_cm
                        FROM bronze.products ORDER BY ingest_seq
                    "#,
                    "products",
                )
                .await?,
            sellers: self
                .fetch::<RawSeller>(
                    r#"
                        SELECT
                            seller_id, seller_zip_code_prefix, seller_city, seller_state
                        FROM bronze.sellers ORDER BY ingest_seq
                    "#,
                    "sellers",
                )
                .await?,
            category_translation: self
                .fetch::<RawCategoryTranslation>(
                    r#"
                        SELECT
                            product_category_name, product_category_name_english
                        FROM bronze.category_translation ORDER BY ingest_seq
                    "#,
                    "category_translation",
                )
                .await?,
        })
    }
}

impl SilverSink for PgWarehouse {
    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            anyhow::bail!("load transaction already open");
        }
        let tx = self.pool.begin().await.context("Failed to open load transaction")?;
        self.tx = Some(tx);
        Ok(())
    }

    async fn replace(&mut self, stage: Stage, tables: &SilverTables) -> Result<u64> {
        match self.tx.as_mut() {
            Some(tx) => replace_table(&mut **tx, stage, tables).await,
            None => {
                let mut tx = self.pool.begin().await.context("Failed to open table transaction")?;
                let written = replace_table(&mut *tx, stage, tables).await?;
                tx.commit()
                    .await
                    .with_context(|| format!("Failed to commit silver.{}", stage.table()))?;
                Ok(written)
            }
        }
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().context("No open load transaction")?;
        tx.commit().await.context("Failed to commit load transaction")?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.context("Failed to roll back load transaction")?;
        }
        Ok(())
    }
}

// =============================================================================
// TABLE WRITERS
// =============================================================================

/// Truncate the stage's table and insert its rows
async fn replace_table(
    conn: &mut PgConnection,
    stage: Stage,
    tables: &SilverTables,
) -> Result<u64> {
    sqlx::query(&format!("TRUNCATE TABLE silver.{}", stage.table()))
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to truncate silver.{}", stage.table()))?;

    let table = stage.table();
    let written = match stage {
        Stage::Geolocation => {
            insert_rows(
                conn,
                table,
                &["zip_code_prefix", "lat", "lng", "city", "state"],
                &tables.geolocation,
                |b, r| {
                    b.push_bind(r.zip_code_prefix)
                        .push_bind(r.lat)
                        .push_bind(r.lng)
                        .push_bind(&r.city)
                        .push_bind(&r.state);
                },
            )
            .await?
        }
        Stage::CategoryTranslation => {
            insert_rows(
                conn,
                table,
                &["category_name", "category_name_english"],
                &tables.category_translation,
                |b, r| {
                    b.push_bind(&r.category_name).push_bind(&r.category_name_english);
                },
            )
            .await?
        }
        Stage::Product => {
            insert_rows(
                conn,
                table,
                &[
                    "product_id",
                    "category_name",
                    "category_name_english",
                    "name_length",
                    "description_length",
                    "photos_qty",
                    "weight_g",
                    "length_cm",
                    "height_cm",
                    "width_cm",
                ],
                &tables.products,
                |b, r| {
                    b.push_bind(&r.product_id)
                        .push_bind(&r.category_name)
                        .push_bind(&r.category_name_english)
                        .push_bind(r.name_length)
                        .push_bind(r.description_length)
                        .push_bind(r.photos_qty)
                        .push_bind(r.weight_g)
                        .push_bind(r.length_cm)
                        .push_bind(r.height_cm)
                        .push_bind(r.width_cm);
                },
            )
            .await?
        }
        Stage::Seller => {
            insert_rows(
                conn,
                table,
                &["seller_id", "zip_code_prefix", "city", "state"],
                &tables.sellers,
                |b, r| {
                    b.push_bind(&r.seller_id)
                        .push_bind(r.zip_code_prefix)
                        .push_bind(&r.city)
                        .push_bind(&r.state);
                },
            )
            .await?
        }
        Stage::Customer => {
            insert_rows(
                conn,
                table,
                &["customer_id", "customer_unique_id", "zip_code_prefix", "city", "state"],
                &tables.customers,
                |b, r| {
                    b.push_bind(&r.customer_id)
                        .push_bind(&r.customer_unique_id)
                        .push_bind(r.zip_code_prefix)
                        .push_bind(&r.city)
                        .push_bind(&r.state);
                },
            )
            .await?
        }
        Stage::Order => {
            insert_rows(
                conn,
                table,
                &[
                    "order_id",
                    "customer_id",
                    "order_status",
                    "purchase_timestamp",
                    "approved_at",
                    "delivered_carrier_date",
                    "delivered_customer_date",
                    "estimated_delivery_date",
                ],
                &tables.orders,
                |b, r| {
                    b.push_bind(&r.order_id)
                        .push_bind(&r.customer_id)
                        .push_bind(r.order_status.as_str())
                        .push_bind(r.purchase_timestamp)
                        .push_bind(r.approved_at)
                        .push_bind(r.delivered_carrier_date)
                        .push_bind(r.delivered_customer_date)
                        .push_bind(r.estimated_delivery_date);
                },
            )
            .await?
        }
        Stage::DateDim => {
            insert_rows(
                conn,
                table,
                &[
                    "date_key",
                    "full_date",
                    "year",
                    "quarter",
                    "quarter_name",
                    "month",
                    "month_name",
                    "year_month",
                    "day_of_month",
                    "day_of_week",
                    "day_name",
                    "day_of_year",
                    "week_number_iso",
                    "is_weekend",
                    "is_holiday",
                    "holiday_name",
                    "is_black_friday",
                    "is_mothers_day",
                    "is_valentines_day",
                    "is_childrens_day",
                    "is_consumers_day",
                    "fiscal_year",
                    "fiscal_quarter",
                ],
                &tables.date_dim,
                |b, r| {
                    b.push_bind(r.date_key)
                        .push_bind(r.full_date)
                        .push_bind(r.year)
                        .push_bind(r.quarter)
                        .push_bind(&r.quarter_name)
                        .push_bind(r.month)
                        .push_bind(&r.month_name)
                        .push_bind(&r.year_month)
                        .push_bind(r.day_of_month)
                        .push_bind(r.day_of_week)
                        .push_bind(&r.day_name)
                        .push_bind(r.day_of_year)
                        .push_bind(r.week_number_iso)
                        .push_bind(r.is_weekend)
                        .push_bind(r.is_holiday)
                        .push_bind(&r.holiday_name)
                        .push_bind(r.is_black_friday)
                        .push_bind(r.is_mothers_day)
                        .push_bind(r.is_valentines_day)
                        .push_bind(r.is_childrens_day)
                        .push_bind(r.is_consumers_day)
                        .push_bind(r.fiscal_year)
                        .push_bind(&r.fiscal_quarter);
                },
            )
            .await?
        }
        Stage::Payment => {
            insert_rows(
                conn,
                table,
                &[
                    "order_id",
                    "payment_sequential",
                    "payment_type",
                    "payment_installments",
                    "payment_value",
                ],
                &tables.payments,
                |b, r| {
                    b.push_bind(&r.order_id)
                        .push_bind(r.payment_sequential)
                        .push_bind(r.payment_type.as_str())
                        .push_bind(r.payment_installments)
                        .push_bind(r.payment_value);
                },
            )
            .await?
        }
        Stage::Review => {
            insert_rows(
                conn,
                table,
                &[
                    "review_id",
                    "order_id",
                    "review_score",
                    "comment_title",
                    "comment_message",
                    "creation_date",
                    "answer_timestamp",
                ],
                &tables.reviews,
                |b, r| {
                    b.push_bind(&r.review_id)
                        .push_bind(&r.order_id)
                        .push_bind(r.review_score)
                        .push_bind(&r.comment_title)
                        .push_bind(&r.comment_message)
                        .push_bind(r.creation_date)
                        .push_bind(r.answer_timestamp);
                },
            )
            .await?
        }
        Stage::OrderItem => {
            insert_rows(
                conn,
                table,
                &[
                    "order_id",
                    "order_item_id",
                    "product_id",
                    "seller_id",
                    "shipping_limit_date",
                    "price",
                    "freight_value",
                ],
                &tables.order_items,
                |b, r| {
                    b.push_bind(&r.order_id)
                        .push_bind(r.order_item_id)
                        .push_bind(&r.product_id)
                        .push_bind(&r.seller_id)
                        .push_bind(r.shipping_limit_date)
                        .push_bind(r.price)
                        .push_bind(r.freight_value);
                },
            )
            .await?
        }
    };
    Ok(written)
}

/// Multi-row INSERT, chunked to stay under the bind parameter limit
async fn insert_rows<'a, T, F>(
    conn: &mut PgConnection,
    table: &str,
    columns: &[&str],
    rows: &'a [T],
    mut bind: F,
) -> Result<u64>
where
    F: FnMut(&mut Separated<'_, 'a, Postgres, &'static str>, &'a T),
{
    let per_statement = (BIND_LIMIT / columns.len()).max(1);
    let mut written = 0;

    for chunk in rows.chunks(per_statement) {
        let mut qb: QueryBuilder<'a, Postgres> =
            QueryBuilder::new(format!("INSERT INTO silver.{} ({}) ", table, columns.join(", ")));
        qb.push_values(chunk, |mut b, row| bind(&mut b, row));
        let result = qb
            .build()
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to insert into silver.{}", table))?;
        written += result.rows_affected();
    }
    Ok(written)
}
