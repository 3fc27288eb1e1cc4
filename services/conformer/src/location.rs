//! Location Normalizer - one canonical place per resolution key
//!
//! Responsibilities:
//! - Reject rows with invalid zip prefixes or coordinates
//! - Canonicalize city text through the exception table, then the generic
//!   "capitalize first letter" rule
//! - Upper-case states and count the ones outside the 27 UF codes
//! - Majority vote per key (count desc, city asc, state asc)
//! - Average coordinates per zip prefix for geolocation
//!
//! Resolution keys: zip prefix for geolocation and sellers,
//! `customer_unique_id` for customers. Keys with no votable row are dropped.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::bronze::{RawCustomer, RawGeolocation, RawSeller};
use crate::parse::{clean_text, parse_f64, parse_zip_prefix};
use crate::rules::CityRuleSet;
use crate::silver::{Customer, Geolocation, Seller};

/// The 26 states plus the federal district
pub const BRAZILIAN_STATES: [&str; 27] = [
    "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB", "PR",
    "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SP", "SE", "TO",
];

pub const ZIP_PREFIX_MIN: i32 = 1_000;
pub const ZIP_PREFIX_MAX: i32 = 99_999;

pub fn is_valid_zip_prefix(zip: i32) -> bool {
    (ZIP_PREFIX_MIN..=ZIP_PREFIX_MAX).contains(&zip)
}

pub fn is_valid_state(state: &str) -> bool {
    BRAZILIAN_STATES.contains(&state)
}

/// Round to 6 decimal places (about 0.1 m)
pub fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

/// Canonical (city, state) pair. Field order drives the tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Place {
    pub city: String,
    pub state: String,
}

/// Row-level quality counters for one resolution pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocationQuality {
    pub rows_in: usize,
    pub missing_key: usize,
    pub rejected_zip: usize,
    pub rejected_coordinates: usize,
    pub garbage_city: usize,
    pub missing_state: usize,
    /// Voted rows whose state is outside the UF set (flagged, not rejected)
    pub unknown_state: usize,
    pub keys_dropped: usize,
}

impl LocationQuality {
    pub fn rejected_rows(&self) -> usize {
        self.missing_key
            + self.rejected_zip
            + self.rejected_coordinates
            + self.garbage_city
            + self.missing_state
    }
}

/// Pick one candidate per key: highest count, then smallest candidate.
///
/// Ties are broken by the candidate's `Ord`, so the result never depends on
/// input order or hash iteration.
pub fn majority_vote<K, C>(ballots: impl IntoIterator<Item = (K, C)>) -> BTreeMap<K, C>
where
    K: Ord,
    C: Ord,
{
    let mut tallies: BTreeMap<K, BTreeMap<C, u64>> = BTreeMap::new();
    for (key, candidate) in ballots {
        *tallies.entry(key).or_default().entry(candidate).or_insert(0) += 1;
    }

    tallies
        .into_iter()
        .filter_map(|(key, counts)| {
            let mut ranked: Vec<(C, u64)> = counts.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            ranked.into_iter().next().map(|(candidate, _)| (key, candidate))
        })
        .collect()
}

/// Capitalize the first character, lowercase the rest
fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

pub struct LocationNormalizer {
    rules: CityRuleSet,
}

impl LocationNormalizer {
    pub fn new(rules: CityRuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &CityRuleSet {
        &self.rules
    }

    /// Canonical city text, or `None` for blank and garbage values
    pub fn canonical_city(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lowered = trimmed.to_lowercase();
        match self.rules.lookup(&lowered) {
            Some(rule) => rule.canonical.clone(),
            None => Some(capitalize_first(trimmed)),
        }
    }

    /// Trimmed, upper-cased state; blank values give `None`
    pub fn canonical_state(raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_uppercase())
        }
    }

    /// Shared city/state cleaning; updates the counters for rejected rows
    fn place(
        &self,
        city: Option<&str>,
        state: Option<&str>,
        quality: &mut LocationQuality,
    ) -> Option<Place> {
        let Some(city) = city.and_then(|c| self.canonical_city(c)) else {
            quality.garbage_city += 1;
            return None;
        };
        let Some(state) = state.and_then(Self::canonical_state) else {
            quality.missing_state += 1;
            return None;
        };
        if !is_valid_state(&state) {
            quality.unknown_state += 1;
        }
        Some(Place { city, state })
    }

    fn zip(raw: Option<&str>, quality: &mut LocationQuality) -> Option<i32> {
        match parse_zip_prefix(raw) {
            Some(zip) if is_valid_zip_prefix(zip) => Some(zip),
            _ => {
                quality.rejected_zip += 1;
                None
            }
        }
    }

    /// One row per zip prefix: voted place plus averaged coordinates
    pub fn resolve_geolocation(
        &self,
        rows: &[RawGeolocation],
    ) -> (Vec<Geolocation>, LocationQuality) {
        let mut quality = LocationQuality {
            rows_in: rows.len(),
            ..Default::default()
        };
        let mut ballots: Vec<(i32, Place)> = Vec::new();
        let mut coordinates: BTreeMap<i32, (f64, f64, u64)> = BTreeMap::new();

        for row in rows {
            let Some(zip) = Self::zip(row.geolocation_zip_code_prefix.as_deref(), &mut quality)
            else {
                continue;
            };

            let lat = parse_f64(row.geolocation_lat.as_deref())
                .filter(|v| (-90.0..=90.0).contains(v));
            let lng = parse_f64(row.geolocation_lng.as_deref())
                .filter(|v| (-180.0..=180.0).contains(v));
            let (Some(lat), Some(lng)) = (lat, lng) else {
                quality.rejected_coordinates += 1;
                continue;
            };

            // Coordinates average independently of the place vote
            let acc = coordinates.entry(zip).or_insert((0.0, 0.0, 0));
            acc.0 += lat;
            acc.1 += lng;
            acc.2 += 1;

            if let Some(place) = self.place(
                row.geolocation_city.as_deref(),
                row.geolocation_state.as_deref(),
                &mut quality,
            ) {
                ballots.push((zip, place));
            }
        }

        let winners = majority_vote(ballots);
        quality.keys_dropped = coordinates.keys().filter(|z| !winners.contains_key(z)).count();

        let resolved = winners
            .into_iter()
            .filter_map(|(zip, place)| {
                let (lat_sum, lng_sum, n) = coordinates.get(&zip)?;
                Some(Geolocation {
                    zip_code_prefix: zip,
                    lat: round6(lat_sum / *n as f64),
                    lng: round6(lng_sum / *n as f64),
                    city: place.city,
                    state: place.state,
                })
            })
            .collect();

        (resolved, quality)
    }

    /// One row per seller; the place is voted per zip prefix across all sellers
    pub fn resolve_sellers(&self, rows: &[RawSeller]) -> (Vec<Seller>, LocationQuality) {
        let mut quality = LocationQuality {
            rows_in: rows.len(),
            ..Default::default()
        };
        let mut ballots: Vec<(i32, Place)> = Vec::new();
        // First valid zip per seller, in arrival order
        let mut seller_zip: BTreeMap<String, i32> = BTreeMap::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();

        for row in rows {
            let Some(seller_id) = clean_text(row.seller_id.as_deref()) else {
                quality.missing_key += 1;
                continue;
            };
            seen.insert(seller_id.clone());
            let Some(zip) = Self::zip(row.seller_zip_code_prefix.as_deref(), &mut quality) else {
                continue;
            };
            seller_zip.entry(seller_id).or_insert(zip);

            if let Some(place) = self.place(
                row.seller_city.as_deref(),
                row.seller_state.as_deref(),
                &mut quality,
            ) {
                ballots.push((zip, place));
            }
        }

        let winners = majority_vote(ballots);
        let sellers: Vec<Seller> = seller_zip
            .into_iter()
            .filter_map(|(seller_id, zip)| {
                let place = winners.get(&zip)?;
                Some(Seller {
                    seller_id,
                    zip_code_prefix: zip,
                    city: place.city.clone(),
                    state: place.state.clone(),
                })
            })
            .collect();
        quality.keys_dropped = seen.len() - sellers.len();

        (sellers, quality)
    }

    /// One row per `customer_id`; (zip, city, state) is voted per `customer_unique_id`
    pub fn resolve_customers(&self, rows: &[RawCustomer]) -> (Vec<Customer>, LocationQuality) {
        let mut quality = LocationQuality {
            rows_in: rows.len(),
            ..Default::default()
        };
        let mut ballots: Vec<(String, (Place, i32))> = Vec::new();
        // customer_id -> customer_unique_id, first occurrence wins
        let mut identities: BTreeMap<String, String> = BTreeMap::new();

        for row in rows {
            let (Some(customer_id), Some(unique_id)) = (
                clean_text(row.customer_id.as_deref()),
                clean_text(row.customer_unique_id.as_deref()),
            ) else {
                quality.missing_key += 1;
                continue;
            };
            identities.entry(customer_id).or_insert_with(|| unique_id.clone());

            let Some(zip) = Self::zip(row.customer_zip_code_prefix.as_deref(), &mut quality) else {
                continue;
            };
            if let Some(place) = self.place(
                row.customer_city.as_deref(),
                row.customer_state.as_deref(),
                &mut quality,
            ) {
                ballots.push((unique_id, (place, zip)));
            }
        }

        let winners = majority_vote(ballots);
        let total = identities.len();
        let customers: Vec<Customer> = identities
            .into_iter()
            .filter_map(|(customer_id, unique_id)| {
                let (place, zip) = winners.get(&unique_id)?;
                Some(Customer {
                    customer_id,
                    customer_unique_id: unique_id,
                    zip_code_prefix: *zip,
                    city: place.city.clone(),
                    state: place.state.clone(),
                })
            })
            .collect();
        quality.keys_dropped = total - customers.len();

        (customers, quality)
    }
}
