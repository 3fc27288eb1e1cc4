//! Order Timeline Repairer
//!
//! Enforces purchase <= approved <= carrier <= customer by clamping each
//! timestamp forward to its repaired predecessor, then imputes the estimated
//! delivery date from the customer's average delivery duration when the raw
//! estimate is missing or earlier than the approval.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::bronze::RawOrder;
use crate::parse::{clean_text, parse_timestamp};
use crate::silver::{Customer, Order, OrderStatus};

pub const DEFAULT_DELIVERY_DAYS: i64 = 10;

/// Counters for one repair pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimelineStats {
    pub rows_in: usize,
    pub missing_key: usize,
    pub invalid_purchase: usize,
    pub invalid_status: usize,
    pub duplicate_order: usize,
    pub approved_clamped: usize,
    pub carrier_clamped: usize,
    pub customer_clamped: usize,
    pub estimate_imputed: usize,
    /// Imputed estimate fell outside the representable date range
    pub estimate_out_of_range: usize,
}

impl TimelineStats {
    pub fn rejected_rows(&self) -> usize {
        self.missing_key
            + self.invalid_purchase
            + self.invalid_status
            + self.duplicate_order
            + self.estimate_out_of_range
    }
}

/// The four lifecycle timestamps of one order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    pub purchase: NaiveDateTime,
    pub approved: Option<NaiveDateTime>,
    pub carrier: Option<NaiveDateTime>,
    pub customer: Option<NaiveDateTime>,
}

/// Which fields `clamp` moved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Clamped {
    pub approved: bool,
    pub carrier: bool,
    pub customer: bool,
}

/// Raise `value` to `floor` when it is earlier
fn clamp_to(value: Option<NaiveDateTime>, floor: NaiveDateTime) -> (Option<NaiveDateTime>, bool) {
    match value {
        Some(v) if v < floor => (Some(floor), true),
        other => (other, false),
    }
}

impl Lifecycle {
    /// Forward-clamp each timestamp to the latest populated predecessor.
    ///
    /// With every field present this is exactly "clamp to the repaired
    /// previous step"; a NULL step passes the previous floor through.
    pub fn clamp(self) -> (Lifecycle, Clamped) {
        let mut floor = self.purchase;

        let (approved, approved_moved) = clamp_to(self.approved, floor);
        if let Some(a) = approved {
            floor = a;
        }
        let (carrier, carrier_moved) = clamp_to(self.carrier, floor);
        if let Some(c) = carrier {
            floor = c;
        }
        let (customer, customer_moved) = clamp_to(self.customer, floor);

        (
            Lifecycle {
                purchase: self.purchase,
                approved,
                carrier,
                customer,
            },
            Clamped {
                approved: approved_moved,
                carrier: carrier_moved,
                customer: customer_moved,
            },
        )
    }

    /// Whole calendar days between approval and delivery to the customer
    pub fn delivery_days(&self) -> Option<i64> {
        let approved = self.approved?;
        let customer = self.customer?;
        Some((customer.date() - approved.date()).num_days())
    }
}

/// Keep the raw estimate unless it is missing or earlier than the approval.
///
/// Returns `None` when the imputed date cannot be represented.
pub fn impute_estimate(
    approved: Option<NaiveDateTime>,
    estimated: Option<NaiveDateTime>,
    avg_delivery_days: i64,
) -> Option<(Option<NaiveDateTime>, bool)> {
    let Some(approved) = approved else {
        return Some((estimated, false));
    };
    match estimated {
        Some(e) if e >= approved => Some((Some(e), false)),
        _ => {
            let imputed = Duration::try_days(avg_delivery_days)
                .and_then(|d| approved.checked_add_signed(d))?;
            Some((Some(imputed), true))
        }
    }
}

/// Integer average (truncating) of delivery days per key
pub fn average_delivery_days<K>(samples: impl IntoIterator<Item = (K, i64)>) -> HashMap<K, i64>
where
    K: std::hash::Hash + Eq,
{
    let mut acc: HashMap<K, (i64, i64)> = HashMap::new();
    for (key, days) in samples {
        let entry = acc.entry(key).or_insert((0, 0));
        entry.0 += days;
        entry.1 += 1;
    }
    acc.into_iter()
        .map(|(key, (sum, count))| (key, sum / count))
        .collect()
}

pub struct TimelineRepairer {
    default_delivery_days: i64,
}

impl Default for TimelineRepairer {
    fn default() -> Self {
        Self::new(DEFAULT_DELIVERY_DAYS)
    }
}

/// An order that passed row validation, before estimate imputation
struct ParsedOrder {
    order_id: String,
    customer_id: String,
    status: OrderStatus,
    lifecycle: Lifecycle,
    estimated: Option<NaiveDateTime>,
}

impl TimelineRepairer {
    pub fn new(default_delivery_days: i64) -> Self {
        Self {
            default_delivery_days,
        }
    }

    fn parse_row(&self, row: &RawOrder, stats: &mut TimelineStats) -> Option<ParsedOrder> {
        let (Some(order_id), Some(customer_id)) = (
            clean_text(row.order_id.as_deref()),
            clean_text(row.customer_id.as_deref()),
        ) else {
            stats.missing_key += 1;
            warn!(order_id = ?row.order_id, "order without order_id or customer_id excluded");
            return None;
        };

        let Some(purchase) = parse_timestamp(row.order_purchase_timestamp.as_deref()) else {
            stats.invalid_purchase += 1;
            warn!(%order_id, "order without a purchase timestamp excluded");
            return None;
        };

        let status = match row.order_status.as_deref().map(str::parse::<OrderStatus>) {
            Some(Ok(status)) => status,
            _ => {
                stats.invalid_status += 1;
                warn!(
                    %order_id,
                    status = ?row.order_status,
                    "order with unknown status excluded"
                );
                return None;
            }
        };

        Some(ParsedOrder {
            order_id,
            customer_id,
            status,
            lifecycle: Lifecycle {
                purchase,
                approved: parse_timestamp(row.order_approved_at.as_deref()),
                carrier: parse_timestamp(row.order_delivered_carrier_date.as_deref()),
                customer: parse_timestamp(row.order_delivered_customer_date.as_deref()),
            },
            estimated: parse_timestamp(row.order_estimated_delivery_date.as_deref()),
        })
    }

    /// Repair every order. `customers` must already be resolved; it maps
    /// `customer_id` to the person-level id used for the delivery average.
    pub fn repair(&self, rows: &[RawOrder], customers: &[Customer]) -> (Vec<Order>, TimelineStats) {
        let mut stats = TimelineStats {
            rows_in: rows.len(),
            ..Default::default()
        };

        // Steps 1-3: clamp, one row per order_id (first arrival wins)
        let mut parsed: BTreeMap<String, ParsedOrder> = BTreeMap::new();
        for row in rows {
            let Some(mut order) = self.parse_row(row, &mut stats) else {
                continue;
            };
            if parsed.contains_key(&order.order_id) {
                stats.duplicate_order += 1;
                continue;
            }
            let (lifecycle, clamped) = order.lifecycle.clamp();
            stats.approved_clamped += clamped.approved as usize;
            stats.carrier_clamped += clamped.carrier as usize;
            stats.customer_clamped += clamped.customer as usize;
            order.lifecycle = lifecycle;
            parsed.insert(order.order_id.clone(), order);
        }

        // Step 4: average delivery days per customer_unique_id over repaired values
        let unique_ids: HashMap<&str, &str> = customers
            .iter()
            .map(|c| (c.customer_id.as_str(), c.customer_unique_id.as_str()))
            .collect();
        let averages = average_delivery_days(parsed.values().filter_map(|o| {
            let unique_id = unique_ids.get(o.customer_id.as_str())?;
            Some((*unique_id, o.lifecycle.delivery_days()?))
        }));

        // Step 5: impute estimates
        let orders: Vec<Order> = parsed
            .into_values()
            .filter_map(|o| {
                let avg = unique_ids
                    .get(o.customer_id.as_str())
                    .and_then(|u| averages.get(u))
                    .copied()
                    .unwrap_or(self.default_delivery_days);
                let Some((estimated, imputed)) =
                    impute_estimate(o.lifecycle.approved, o.estimated, avg)
                else {
                    stats.estimate_out_of_range += 1;
                    warn!(
                        order_id = %o.order_id,
                        avg_delivery_days = avg,
                        "imputed estimate out of range, order excluded"
                    );
                    return None;
                };
                stats.estimate_imputed += imputed as usize;

                Some(Order {
                    order_id: o.order_id,
                    customer_id: o.customer_id,
                    order_status: o.status,
                    purchase_timestamp: o.lifecycle.purchase,
                    approved_at: o.lifecycle.approved,
                    delivered_carrier_date: o.lifecycle.carrier,
                    delivered_customer_date: o.lifecycle.customer,
                    estimated_delivery_date: estimated,
                })
            })
            .collect();

        if stats.rejected_rows() > 0 {
            info!(
                rows_in = stats.rows_in,
                rejected = stats.rejected_rows(),
                "orders excluded from silver"
            );
        }
        (orders, stats)
    }
}
