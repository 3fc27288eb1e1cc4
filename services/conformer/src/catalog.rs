//! Product catalog conforming: category translation and products.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::bronze::{RawCategoryTranslation, RawProduct};
use crate::parse::{clean_text, parse_f64, parse_i32};
use crate::silver::{CategoryTranslation, Product};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub rows_in: usize,
    pub missing_key: usize,
    pub duplicates: usize,
    pub untranslated: usize,
    pub zero_dimensions: usize,
}

impl CatalogStats {
    pub fn rejected_rows(&self) -> usize {
        self.missing_key + self.duplicates
    }
}

/// Category names are identifiers; normalize case and surrounding space only
fn category_key(raw: Option<&str>) -> Option<String> {
    clean_text(raw).map(|s| s.to_lowercase())
}

/// One translation per Portuguese category name (first arrival wins)
pub fn conform_translations(
    rows: &[RawCategoryTranslation],
) -> (Vec<CategoryTranslation>, CatalogStats) {
    let mut stats = CatalogStats {
        rows_in: rows.len(),
        ..Default::default()
    };
    let mut out: BTreeMap<String, String> = BTreeMap::new();

    for row in rows {
        let (Some(name), Some(english)) = (
            category_key(row.product_category_name.as_deref()),
            category_key(row.product_category_name_english.as_deref()),
        ) else {
            stats.missing_key += 1;
            continue;
        };
        if out.contains_key(&name) {
            stats.duplicates += 1;
            continue;
        }
        out.insert(name, english);
    }

    let translations = out
        .into_iter()
        .map(|(category_name, category_name_english)| CategoryTranslation {
            category_name,
            category_name_english,
        })
        .collect();
    (translations, stats)
}

/// Zero or negative physical measures mean "unknown", not "zero-sized"
fn dimension(raw: Option<&str>, stats: &mut CatalogStats) -> Option<f64> {
    match parse_f64(raw) {
        Some(v) if v > 0.0 => Some(v),
        Some(_) => {
            stats.zero_dimensions += 1;
            None
        }
        None => None,
    }
}

/// Products with counters defaulted to 0 and the English category joined in.
///
/// Categories without a translation keep the Portuguese name as their
/// English label so the Gold dimension never shows an empty category.
pub fn conform_products(
    rows: &[RawProduct],
    translations: &[CategoryTranslation],
) -> (Vec<Product>, CatalogStats) {
    let mut stats = CatalogStats {
        rows_in: rows.len(),
        ..Default::default()
    };
    let english: HashMap<&str, &str> = translations
        .iter()
        .map(|t| (t.category_name.as_str(), t.category_name_english.as_str()))
        .collect();
    let mut out: BTreeMap<String, Product> = BTreeMap::new();

    for row in rows {
        let Some(product_id) = clean_text(row.product_id.as_deref()) else {
            stats.missing_key += 1;
            continue;
        };
        if out.contains_key(&product_id) {
            stats.duplicates += 1;
            continue;
        }

        let category_name = category_key(row.product_category_name.as_deref());
        let category_name_english = category_name.as_deref().map(|name| match english.get(name) {
            Some(en) => en.to_string(),
            None => {
                stats.untranslated += 1;
                name.to_string()
            }
        });

        let product = Product {
            product_id: product_id.clone(),
            category_name,
            category_name_english,
            name_length: parse_i32(row.product_name_length.as_deref()).unwrap_or(0),
            description_length: parse_i32(row.product_description_length.as_deref()).unwrap_or(0),
            photos_qty: parse_i32(row.product_photos_qty.as_deref()).unwrap_or(0),
            weight_g: dimension(row.product_weight_g.as_deref(), &mut stats),
            length_cm: dimension(row.product_length_cm.as_deref(), &mut stats),
            height_cm: dimension(row.product_height_cm.as_deref(), &mut stats),
            width_cm: dimension(row.product_width_cm.as_deref(), &mut stats),
        };
        out.insert(product_id, product);
    }

    (out.into_values().collect(), stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translation(pt: &str, en: &str) -> RawCategoryTranslation {
        RawCategoryTranslation {
            product_category_name: Some(pt.to_string()),
            product_category_name_english: Some(en.to_string()),
        }
    }

    fn product(id: &str, category: Option<&str>) -> RawProduct {
        RawProduct {
            product_id: Some(id.to_string()),
            product_category_name: category.map(str::to_string),
            product_name_length: Some("40".to_string()),
            product_description_length: Some("287".to_string()),
            product_photos_qty: Some("1".to_string()),
            product_weight_g: Some("225".to_string()),
            product_length_cm: Some("16".to_string()),
            product_height_cm: Some("10".to_string()),
            product_width_cm: Some("14".to_string()),
        }
    }

    #[test]
    fn test_translations_deduplicated_and_normalized() {
        let (rows, stats) = conform_translations(&[
            translation(" Beleza_Saude ", "health_beauty"),
            translation("beleza_saude", "beauty"),
            translation("", "orphan"),
        ]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category_name, "beleza_saude");
        assert_eq!(rows[0].category_name_english, "health_beauty");
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.missing_key, 1);
    }

    #[test]
    fn test_product_joins_english_category() {
        let (translations, _) = conform_translations(&[translation("perfumaria", "perfumery")]);
        let (rows, _) = conform_products(&[product("p1", Some("perfumaria"))], &translations);
        assert_eq!(rows[0].category_name_english.as_deref(), Some("perfumery"));
    }

    #[test]
    fn test_untranslated_category_falls_back_to_source_name() {
        let (rows, stats) = conform_products(&[product("p1", Some("pc_gamer"))], &[]);
        assert_eq!(rows[0].category_name_english.as_deref(), Some("pc_gamer"));
        assert_eq!(stats.untranslated, 1);
    }

    #[test]
    fn test_missing_counters_default_to_zero() {
        let mut raw = product("p1", None);
        raw.product_name_length = None;
        raw.product_description_length = Some("".to_string());
        raw.product_photos_qty = None;
        let (rows, _) = conform_products(&[raw], &[]);
        let p = &rows[0];
        assert_eq!((p.name_length, p.description_length, p.photos_qty), (0, 0, 0));
        assert_eq!(p.category_name, None);
        assert_eq!(p.category_name_english, None);
    }

    #[test]
    fn test_zero_dimensions_become_unknown() {
        let mut raw = product("p1", None);
        raw.product_weight_g = Some("0".to_string());
        raw.product_height_cm = Some("0.0".to_string());
        raw.product_width_cm = None;
        let (rows, stats) = conform_products(&[raw], &[]);
        let p = &rows[0];
        assert_eq!(p.weight_g, None);
        assert_eq!(p.height_cm, None);
        assert_eq!(p.width_cm, None);
        assert_eq!(p.length_cm, Some(16.0));
        assert_eq!(stats.zero_dimensions, 2);
    }

    #[test]
    fn test_duplicate_products_keep_first() {
        let mut second = product("p1", Some("perfumaria"));
        second.product_photos_qty = Some("9".to_string());
        let (rows, stats) = conform_products(&[product("p1", None), second], &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].photos_qty, 1);
        assert_eq!(stats.duplicates, 1);
    }
}
