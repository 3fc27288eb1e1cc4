//! Silver row types - the contract consumed by the Gold views.
//!
//! Column names here match the `silver` schema in `db/002_silver.sql`.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Geolocation {
    pub zip_code_prefix: i32,
    pub lat: f64,
    pub lng: f64,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTranslation {
    pub category_name: String,
    pub category_name_english: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub product_id: String,
    pub category_name: Option<String>,
    pub category_name_english: Option<String>,
    pub name_length: i32,
    pub description_length: i32,
    pub photos_qty: i32,
    /// NULL means "unknown"; a zero in Bronze is mapped here
    pub weight_g: Option<f64>,
    pub length_cm: Option<f64>,
    pub height_cm: Option<f64>,
    pub width_cm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Seller {
    pub seller_id: String,
    pub zip_code_prefix: i32,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Customer {
    pub customer_id: String,
    pub customer_unique_id: String,
    pub zip_code_prefix: i32,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Approved,
    Invoiced,
    Processing,
    Shipped,
    Delivered,
    Canceled,
    Unavailable,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Approved => "approved",
            OrderStatus::Invoiced => "invoiced",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Unavailable => "unavailable",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "created" => Ok(OrderStatus::Created),
            "approved" => Ok(OrderStatus::Approved),
            "invoiced" => Ok(OrderStatus::Invoiced),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "canceled" | "cancelled" => Ok(OrderStatus::Canceled),
            "unavailable" => Ok(OrderStatus::Unavailable),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    pub order_status: OrderStatus,
    pub purchase_timestamp: NaiveDateTime,
    pub approved_at: Option<NaiveDateTime>,
    pub delivered_carrier_date: Option<NaiveDateTime>,
    pub delivered_customer_date: Option<NaiveDateTime>,
    pub estimated_delivery_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    pub order_id: String,
    pub order_item_id: i32,
    pub product_id: String,
    pub seller_id: String,
    pub shipping_limit_date: Option<NaiveDateTime>,
    pub price: f64,
    pub freight_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    CreditCard,
    Boleto,
    Voucher,
    DebitCard,
    NotDefined,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::CreditCard => "credit_card",
            PaymentType::Boleto => "boleto",
            PaymentType::Voucher => "voucher",
            PaymentType::DebitCard => "debit_card",
            PaymentType::NotDefined => "not_defined",
        }
    }
}

impl FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "credit_card" => Ok(PaymentType::CreditCard),
            "boleto" => Ok(PaymentType::Boleto),
            "voucher" => Ok(PaymentType::Voucher),
            "debit_card" => Ok(PaymentType::DebitCard),
            "not_defined" => Ok(PaymentType::NotDefined),
            other => Err(format!("unknown payment type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub order_id: String,
    pub payment_sequential: i32,
    pub payment_type: PaymentType,
    pub payment_installments: i32,
    pub payment_value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Review {
    pub review_id: String,
    pub order_id: String,
    pub review_score: i16,
    pub comment_title: Option<String>,
    pub comment_message: Option<String>,
    pub creation_date: Option<NaiveDateTime>,
    pub answer_timestamp: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateDim {
    pub date_key: i32,
    pub full_date: NaiveDate,
    pub year: i32,
    pub quarter: i32,
    pub quarter_name: String,
    pub month: i32,
    pub month_name: String,
    pub year_month: String,
    pub day_of_month: i32,
    /// ISO numbering, Monday = 1
    pub day_of_week: i32,
    pub day_name: String,
    pub day_of_year: i32,
    pub week_number_iso: i32,
    pub is_weekend: bool,
    pub is_holiday: bool,
    pub holiday_name: Option<String>,
    pub is_black_friday: bool,
    pub is_mothers_day: bool,
    pub is_valentines_day: bool,
    pub is_childrens_day: bool,
    pub is_consumers_day: bool,
    pub fiscal_year: i32,
    pub fiscal_quarter: String,
}

/// Every Silver table produced by one load, in natural-key order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SilverTables {
    pub geolocation: Vec<Geolocation>,
    pub category_translation: Vec<CategoryTranslation>,
    pub products: Vec<Product>,
    pub sellers: Vec<Seller>,
    pub customers: Vec<Customer>,
    pub orders: Vec<Order>,
    pub date_dim: Vec<DateDim>,
    pub payments: Vec<Payment>,
    pub reviews: Vec<Review>,
    pub order_items: Vec<OrderItem>,
}

impl SilverTables {
    /// SHA-256 over every row in load order; equal tables give equal hashes
    pub fn fingerprint(&self) -> anyhow::Result<String> {
        let mut hasher = Sha256::new();
        hash_rows(&mut hasher, "geolocation", &self.geolocation)?;
        hash_rows(&mut hasher, "category_translation", &self.category_translation)?;
        hash_rows(&mut hasher, "products", &self.products)?;
        hash_rows(&mut hasher, "sellers", &self.sellers)?;
        hash_rows(&mut hasher, "customers", &self.customers)?;
        hash_rows(&mut hasher, "orders", &self.orders)?;
        hash_rows(&mut hasher, "date_dim", &self.date_dim)?;
        hash_rows(&mut hasher, "payments", &self.payments)?;
        hash_rows(&mut hasher, "reviews", &self.reviews)?;
        hash_rows(&mut hasher, "order_items", &self.order_items)?;
        Ok(format!("sha256:{:x}", hasher.finalize()))
    }
}

fn hash_rows<T: Serialize>(hasher: &mut Sha256, table: &str, rows: &[T]) -> anyhow::Result<()> {
    hasher.update(table.as_bytes());
    hasher.update((rows.len() as u64).to_le_bytes());
    for row in rows {
        hasher.update(serde_json::to_vec(row)?);
        hasher.update(b"\n");
    }
    Ok(())
}
