//! Entity Deduplicator
//!
//! - Reviews: one row per `review_id`, latest creation date wins, equal dates
//!   keep the earliest Bronze arrival
//! - Order items / payments: per order, sort by the source sequence (arrival
//!   order second) and renumber 1..N
//!
//! Rows that reference an order missing from Silver are dropped here, as are
//! rows that fail the business checks for their entity.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::bronze::{RawOrderItem, RawPayment, RawReview};
use crate::parse::{clean_text, parse_f64, parse_i32, parse_timestamp};
use crate::silver::{OrderItem, Payment, PaymentType, Review};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub rows_in: usize,
    pub missing_key: usize,
    pub invalid_value: usize,
    pub orphaned: usize,
    pub duplicates_collapsed: usize,
    pub renumbered: usize,
    pub coerced: usize,
}

impl DedupStats {
    pub fn rejected_rows(&self) -> usize {
        self.missing_key + self.invalid_value + self.orphaned + self.duplicates_collapsed
    }
}

/// Known order ids; `None` disables the reference check
pub type OrderFilter<'a> = Option<&'a HashSet<&'a str>>;

fn known_order(filter: OrderFilter<'_>, order_id: &str) -> bool {
    filter.map_or(true, |ids| ids.contains(order_id))
}

/// Sort each order's rows by (source sequence, arrival) and assign 1..N.
///
/// Rows without a parseable source sequence sort after the numbered ones.
/// Returns the rows in (order_id, new sequence) order together with how many
/// rows changed number.
pub fn renumber<T>(
    rows: Vec<(String, Option<i32>, T)>,
    mut assign: impl FnMut(&mut T, i32),
) -> (Vec<T>, usize) {
    let mut per_order: BTreeMap<String, Vec<(Option<i32>, usize, T)>> = BTreeMap::new();
    for (arrival, (order_id, sequence, row)) in rows.into_iter().enumerate() {
        per_order.entry(order_id).or_default().push((sequence, arrival, row));
    }

    let mut changed = 0;
    let mut out = Vec::new();
    for (_, mut group) in per_order {
        group.sort_by_key(|(sequence, arrival, _)| (sequence.is_none(), *sequence, *arrival));
        for (n, (sequence, _, mut row)) in group.into_iter().enumerate() {
            let new_sequence = n as i32 + 1;
            if sequence != Some(new_sequence) {
                changed += 1;
            }
            assign(&mut row, new_sequence);
            out.push(row);
        }
    }
    (out, changed)
}

pub fn dedup_reviews(rows: &[RawReview], orders: OrderFilter<'_>) -> (Vec<Review>, DedupStats) {
    let mut stats = DedupStats {
        rows_in: rows.len(),
        ..Default::default()
    };
    let mut latest: BTreeMap<String, Review> = BTreeMap::new();

    for row in rows {
        let (Some(review_id), Some(order_id)) = (
            clean_text(row.review_id.as_deref()),
            clean_text(row.order_id.as_deref()),
        ) else {
            stats.missing_key += 1;
            continue;
        };
        let score = parse_i32(row.review_score.as_deref()).filter(|s| (1..=5).contains(s));
        let Some(score) = score else {
            stats.invalid_value += 1;
            continue;
        };
        if !known_order(orders, &order_id) {
            stats.orphaned += 1;
            continue;
        }

        let review = Review {
            review_id: review_id.clone(),
            order_id,
            review_score: score as i16,
            comment_title: clean_text(row.review_comment_title.as_deref()),
            comment_message: clean_text(row.review_comment_message.as_deref()),
            creation_date: parse_timestamp(row.review_creation_date.as_deref()),
            answer_timestamp: parse_timestamp(row.review_answer_timestamp.as_deref()),
        };

        match latest.get_mut(&review_id) {
            Some(kept) => {
                stats.duplicates_collapsed += 1;
                // Strictly later only: on equal dates the earlier arrival stays
                if is_later(review.creation_date, kept.creation_date) {
                    *kept = review;
                }
            }
            None => {
                latest.insert(review_id, review);
            }
        }
    }

    (latest.into_values().collect(), stats)
}

/// A missing creation date never beats a populated one
fn is_later(candidate: Option<NaiveDateTime>, kept: Option<NaiveDateTime>) -> bool {
    match (candidate, kept) {
        (Some(c), Some(k)) => c > k,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

pub fn renumber_order_items(
    rows: &[RawOrderItem],
    orders: OrderFilter<'_>,
) -> (Vec<OrderItem>, DedupStats) {
    let mut stats = DedupStats {
        rows_in: rows.len(),
        ..Default::default()
    };
    let mut staged = Vec::with_capacity(rows.len());

    for row in rows {
        let (Some(order_id), Some(product_id), Some(seller_id)) = (
            clean_text(row.order_id.as_deref()),
            clean_text(row.product_id.as_deref()),
            clean_text(row.seller_id.as_deref()),
        ) else {
            stats.missing_key += 1;
            continue;
        };
        let price = parse_f64(row.price.as_deref()).filter(|p| *p > 0.0);
        let freight = parse_f64(row.freight_value.as_deref()).filter(|f| *f >= 0.0);
        let (Some(price), Some(freight_value)) = (price, freight) else {
            stats.invalid_value += 1;
            continue;
        };
        if !known_order(orders, &order_id) {
            stats.orphaned += 1;
            continue;
        }

        let sequence = parse_i32(row.order_item_id.as_deref());
        staged.push((
            order_id.clone(),
            sequence,
            OrderItem {
                order_id,
                order_item_id: 0,
                product_id,
                seller_id,
                shipping_limit_date: parse_timestamp(row.shipping_limit_date.as_deref()),
                price,
                freight_value,
            },
        ));
    }

    let (items, changed) = renumber(staged, |item, n| item.order_item_id = n);
    stats.renumbered = changed;
    (items, stats)
}

pub fn renumber_payments(
    rows: &[RawPayment],
    orders: OrderFilter<'_>,
) -> (Vec<Payment>, DedupStats) {
    let mut stats = DedupStats {
        rows_in: rows.len(),
        ..Default::default()
    };
    let mut staged = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(order_id) = clean_text(row.order_id.as_deref()) else {
            stats.missing_key += 1;
            continue;
        };
        let payment_type = row.payment_type.as_deref().map(str::parse::<PaymentType>);
        let value = parse_f64(row.payment_value.as_deref()).filter(|v| *v >= 0.0);
        let (Some(Ok(payment_type)), Some(payment_value)) = (payment_type, value) else {
            stats.invalid_value += 1;
            continue;
        };
        if !known_order(orders, &order_id) {
            stats.orphaned += 1;
            continue;
        }

        // Zero installments show up on card payments; every payment is at least one
        let installments = parse_i32(row.payment_installments.as_deref()).unwrap_or(1);
        let payment_installments = if installments < 1 {
            stats.coerced += 1;
            1
        } else {
            installments
        };

        let sequence = parse_i32(row.payment_sequential.as_deref());
        staged.push((
            order_id.clone(),
            sequence,
            Payment {
                order_id,
                payment_sequential: 0,
                payment_type,
                payment_installments,
                payment_value,
            },
        ));
    }

    let (payments, changed) = renumber(staged, |p, n| p.payment_sequential = n);
    stats.renumbered = changed;
    (payments, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn review(id: &str, order: &str, score: &str, created: &str, title: &str) -> RawReview {
        RawReview {
            review_id: Some(id.to_string()),
            order_id: Some(order.to_string()),
            review_score: Some(score.to_string()),
            review_comment_title: Some(title.to_string()),
            review_comment_message: None,
            review_creation_date: Some(created.to_string()),
            review_answer_timestamp: None,
        }
    }

    fn item(order: &str, seq: &str, price: &str, freight: &str) -> RawOrderItem {
        RawOrderItem {
            order_id: Some(order.to_string()),
            order_item_id: Some(seq.to_string()),
            product_id: Some(format!("p-{}", seq)),
            seller_id: Some("s1".to_string()),
            shipping_limit_date: Some("2018-01-01 10:00:00".to_string()),
            price: Some(price.to_string()),
            freight_value: Some(freight.to_string()),
        }
    }

    fn payment(order: &str, seq: &str, kind: &str, installments: &str) -> RawPayment {
        RawPayment {
            order_id: Some(order.to_string()),
            payment_sequential: Some(seq.to_string()),
            payment_type: Some(kind.to_string()),
            payment_installments: Some(installments.to_string()),
            payment_value: Some("10.0".to_string()),
        }
    }

    fn assert_contiguous<'a>(pairs: impl Iterator<Item = (&'a str, i32)>) {
        let mut per_order: BTreeMap<&str, Vec<i32>> = BTreeMap::new();
        for (order, seq) in pairs {
            per_order.entry(order).or_default().push(seq);
        }
        for (order, mut seqs) in per_order {
            seqs.sort();
            let expected: Vec<i32> = (1..=seqs.len() as i32).collect();
            assert_eq!(seqs, expected, "order {} not contiguous", order);
        }
    }

    // -------------------------------------------------------------------------
    // REVIEWS
    // -------------------------------------------------------------------------

    #[test]
    fn test_latest_review_wins() {
        let (rows, stats) = dedup_reviews(
            &[
                review("r1", "o1", "3", "2018-01-02 00:00:00", "newer"),
                review("r1", "o1", "1", "2018-01-01 00:00:00", "older"),
                review("r2", "o2", "5", "2018-01-01 00:00:00", "only"),
            ],
            None,
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].review_id, "r1");
        assert_eq!(rows[0].comment_title.as_deref(), Some("newer"));
        assert_eq!(rows[0].review_score, 3);
        assert_eq!(stats.duplicates_collapsed, 1);
    }

    #[test]
    fn test_equal_creation_dates_keep_first_arrival() {
        let (rows, _) = dedup_reviews(
            &[
                review("r1", "o1", "4", "2018-01-01 00:00:00", "first"),
                review("r1", "o1", "2", "2018-01-01 00:00:00", "second"),
            ],
            None,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].comment_title.as_deref(), Some("first"));
    }

    #[test]
    fn test_review_score_out_of_range_rejected() {
        let (rows, stats) = dedup_reviews(
            &[
                review("r1", "o1", "0", "2018-01-01", ""),
                review("r2", "o1", "6", "2018-01-01", ""),
                review("r3", "o1", "five", "2018-01-01", ""),
            ],
            None,
        );
        assert!(rows.is_empty());
        assert_eq!(stats.invalid_value, 3);
    }

    #[test]
    fn test_blank_comment_becomes_none() {
        let (rows, _) = dedup_reviews(&[review("r1", "o1", "5", "2018-01-01", "   ")], None);
        assert_eq!(rows[0].comment_title, None);
    }

    #[test]
    fn test_orphan_review_dropped() {
        let known: HashSet<&str> = ["o1"].into_iter().collect();
        let (rows, stats) = dedup_reviews(
            &[
                review("r1", "o1", "5", "2018-01-01", ""),
                review("r2", "o9", "5", "2018-01-01", ""),
            ],
            Some(&known),
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(stats.orphaned, 1);
    }

    #[test]
    fn test_review_ids_unique_after_dedup() {
        let raw: Vec<RawReview> = (0..50)
            .map(|i| {
                review(
                    &format!("r{}", i % 7),
                    "o1",
                    "4",
                    &format!("2018-01-{:02} 00:00:00", 1 + i % 28),
                    "",
                )
            })
            .collect();
        let (rows, _) = dedup_reviews(&raw, None);
        let ids: BTreeSet<&str> = rows.iter().map(|r| r.review_id.as_str()).collect();
        assert_eq!(ids.len(), rows.len());
        assert_eq!(rows.len(), 7);
    }

    // -------------------------------------------------------------------------
    // ORDER ITEMS
    // -------------------------------------------------------------------------

    #[test]
    fn test_order_items_renumbered_from_one() {
        let (rows, stats) = renumber_order_items(
            &[
                item("o1", "5", "10.0", "1.0"),
                item("o1", "2", "10.0", "1.0"),
                item("o1", "2", "11.0", "1.0"),
                item("o2", "1", "10.0", "0.0"),
            ],
            None,
        );
        let o1: Vec<(i32, &str)> = rows
            .iter()
            .filter(|r| r.order_id == "o1")
            .map(|r| (r.order_item_id, r.product_id.as_str()))
            .collect();
        // sequence 2 twice (arrival order kept), then 5
        assert_eq!(o1, vec![(1, "p-2"), (2, "p-2"), (3, "p-5")]);
        assert_eq!(rows.iter().find(|r| r.order_id == "o2").unwrap().order_item_id, 1);
        assert_eq!(stats.renumbered, 2);
    }

    #[test]
    fn test_order_items_invalid_prices_rejected() {
        let (rows, stats) = renumber_order_items(
            &[
                item("o1", "1", "0", "1.0"),
                item("o1", "2", "-3", "1.0"),
                item("o1", "3", "10", "-1"),
                item("o1", "4", "10", "0"),
            ],
            None,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].order_item_id, 1);
        assert_eq!(stats.invalid_value, 3);
    }

    #[test]
    fn test_unparseable_sequence_sorts_last() {
        let (rows, _) = renumber_order_items(
            &[item("o1", "x", "1", "0"), item("o1", "7", "1", "0")],
            None,
        );
        assert_eq!(rows[0].product_id, "p-7");
        assert_eq!(rows[1].product_id, "p-x");
        assert_eq!(rows[1].order_item_id, 2);
    }

    // -------------------------------------------------------------------------
    // PAYMENTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_payments_contiguous_per_order() {
        let (rows, _) = renumber_payments(
            &[
                payment("o1", "3", "credit_card", "2"),
                payment("o1", "1", "voucher", "1"),
                payment("o1", "3", "voucher", "1"),
                payment("o2", "4", "boleto", "1"),
            ],
            None,
        );
        assert_eq!(rows.len(), 4);
        assert_contiguous(rows.iter().map(|p| (p.order_id.as_str(), p.payment_sequential)));
        assert_eq!(rows[0].payment_type, PaymentType::Voucher);
    }

    #[test]
    fn test_zero_installments_coerced_to_one() {
        let (rows, stats) = renumber_payments(&[payment("o1", "1", "credit_card", "0")], None);
        assert_eq!(rows[0].payment_installments, 1);
        assert_eq!(stats.coerced, 1);
    }

    #[test]
    fn test_unknown_payment_type_rejected() {
        let (rows, stats) = renumber_payments(&[payment("o1", "1", "pix", "1")], None);
        assert!(rows.is_empty());
        assert_eq!(stats.invalid_value, 1);
    }

    #[test]
    fn test_renumber_is_stable_for_equal_sequences() {
        let (out, changed) = renumber(
            vec![
                ("o1".to_string(), Some(1), "a"),
                ("o1".to_string(), Some(1), "b"),
                ("o1".to_string(), Some(1), "c"),
            ],
            |_, _| {},
        );
        assert_eq!(out, vec!["a", "b", "c"]);
        assert_eq!(changed, 2);
    }
}
