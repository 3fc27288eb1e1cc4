//! Bronze row shapes.
//!
//! Every column is nullable text, mirroring the raw extracts. The same structs
//! are read from the `bronze` schema (sqlx) and from CSV extracts (serde), so
//! field names follow the extract headers.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, sqlx::FromRow)]
pub struct RawCustomer {
    pub customer_id: Option<String>,
    pub customer_unique_id: Option<String>,
    pub customer_zip_code_prefix: Option<String>,
    pub customer_city: Option<String>,
    pub customer_state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, sqlx::FromRow)]
pub struct RawGeolocation {
    pub geolocation_zip_code_prefix: Option<String>,
    pub geolocation_lat: Option<String>,
    pub geolocation_lng: Option<String>,
    pub geolocation_city: Option<String>,
    pub geolocation_state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, sqlx::FromRow)]
pub struct RawOrder {
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
    pub order_status: Option<String>,
    pub order_purchase_timestamp: Option<String>,
    pub order_approved_at: Option<String>,
    pub order_delivered_carrier_date: Option<String>,
    pub order_delivered_customer_date: Option<String>,
    pub order_estimated_delivery_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, sqlx::FromRow)]
pub struct RawOrderItem {
    pub order_id: Option<String>,
    pub order_item_id: Option<String>,
    pub product_id: Option<String>,
    pub seller_id: Option<String>,
    pub shipping_limit_date: Option<String>,
    pub price: Option<String>,
    pub freight_value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, sqlx::FromRow)]
pub struct RawPayment {
    pub order_id: Option<String>,
    pub payment_sequential: Option<String>,
    pub payment_type: Option<String>,
    pub payment_installments: Option<String>,
    pub payment_value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, sqlx::FromRow)]
pub struct RawReview {
    pub review_id: Option<String>,
    pub order_id: Option<String>,
    pub review_score: Option<String>,
    pub review_comment_title: Option<String>,
    pub review_comment_message: Option<String>,
    pub review_creation_date: Option<String>,
    pub review_answer_timestamp: Option<String>,
}

/// The public extract misspells "length" in two headers
#[derive(Debug, Clone, Default, Deserialize, sqlx::FromRow)]
pub struct RawProduct {
    pub product_id: Option<String>,
    pub product_category_name: Option<String>,
    #[serde(alias = "product_name_lenght")]
    pub product_name_length: Option<String>,
    #[serde(alias = "product_description_lenght")]
    pub product_description_length: Option<String>,
    pub product_photos_qty: Option<String>,
    pub product_weight_g: Option<String>,
    pub product_length_cm: Option<String>,
    pub product_height_cm: Option<String>,
    pub product_width_cm: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, sqlx::FromRow)]
pub struct RawSeller {
    pub seller_id: Option<String>,
    pub seller_zip_code_prefix: Option<String>,
    pub seller_city: Option<String>,
    pub seller_state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, sqlx::FromRow)]
pub struct RawCategoryTranslation {
    pub product_category_name: Option<String>,
    pub product_category_name_english: Option<String>,
}

/// One full read of the Bronze layer. Vectors keep arrival order, which is
/// the secondary key for every deterministic tie-break downstream.
#[derive(Debug, Clone, Default)]
pub struct BronzeSnapshot {
    pub customers: Vec<RawCustomer>,
    pub geolocation: Vec<RawGeolocation>,
    pub orders: Vec<RawOrder>,
    pub order_items: Vec<RawOrderItem>,
    pub payments: Vec<RawPayment>,
    pub reviews: Vec<RawReview>,
    pub products: Vec<RawProduct>,
    pub sellers: Vec<RawSeller>,
    pub category_translation: Vec<RawCategoryTranslation>,
}

impl BronzeSnapshot {
    pub fn total_rows(&self) -> usize {
        self.customers.len()
            + self.geolocation.len()
            + self.orders.len()
            + self.order_items.len()
            + self.payments.len()
            + self.reviews.len()
            + self.products.len()
            + self.sellers.len()
            + self.category_translation.len()
    }
}
