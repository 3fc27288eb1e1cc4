//! Stage graph for the Silver load.
//!
//! Each Silver table is one stage. Dependencies are declared per stage and the
//! execution order is a topological sort that prefers declaration order among
//! ready stages, so the plan is stable across runs.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Geolocation,
    CategoryTranslation,
    Product,
    Seller,
    Customer,
    Order,
    DateDim,
    Payment,
    Review,
    OrderItem,
}

impl Stage {
    pub const ALL: [Stage; 10] = [
        Stage::Geolocation,
        Stage::CategoryTranslation,
        Stage::Product,
        Stage::Seller,
        Stage::Customer,
        Stage::Order,
        Stage::DateDim,
        Stage::Payment,
        Stage::Review,
        Stage::OrderItem,
    ];

    /// Stages whose Silver output this stage reads
    pub fn dependencies(&self) -> &'static [Stage] {
        match self {
            Stage::Product => &[Stage::CategoryTranslation],
            // Delivery averages are per customer_unique_id
            Stage::Order => &[Stage::Customer],
            Stage::Payment | Stage::Review | Stage::OrderItem => &[Stage::Order],
            Stage::Geolocation
            | Stage::CategoryTranslation
            | Stage::Seller
            | Stage::Customer
            | Stage::DateDim => &[],
        }
    }

    /// Target table in the `silver` schema
    pub fn table(&self) -> &'static str {
        match self {
            Stage::Geolocation => "geolocation",
            Stage::CategoryTranslation => "category_translation",
            Stage::Product => "products",
            Stage::Seller => "sellers",
            Stage::Customer => "customers",
            Stage::Order => "orders",
            Stage::DateDim => "date_dim",
            Stage::Payment => "payments",
            Stage::Review => "reviews",
            Stage::OrderItem => "order_items",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Topological order of `stages` (Kahn's algorithm).
///
/// Every dependency of a requested stage must itself be requested; a missing
/// dependency or a cycle is an error.
pub fn plan(stages: &[Stage]) -> Result<Vec<Stage>, String> {
    for stage in stages {
        for dep in stage.dependencies() {
            if !stages.contains(dep) {
                return Err(format!("stage {} depends on {}, which is not planned", stage, dep));
            }
        }
    }

    let mut pending: Vec<Stage> = stages.to_vec();
    pending.sort();
    pending.dedup();
    let mut order = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let ready = pending
            .iter()
            .position(|s| s.dependencies().iter().all(|d| order.contains(d)));
        match ready {
            Some(idx) => order.push(pending.remove(idx)),
            None => return Err(format!("dependency cycle among {:?}", pending)),
        }
    }
    Ok(order)
}

/// The full Silver plan
pub fn full_plan() -> Vec<Stage> {
    // Stage::ALL is closed under dependencies and acyclic
    plan(&Stage::ALL).unwrap_or_else(|_| Stage::ALL.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_plan_order() {
        assert_eq!(
            plan(&Stage::ALL).unwrap(),
            vec![
                Stage::Geolocation,
                Stage::CategoryTranslation,
                Stage::Product,
                Stage::Seller,
                Stage::Customer,
                Stage::Order,
                Stage::DateDim,
                Stage::Payment,
                Stage::Review,
                Stage::OrderItem,
            ]
        );
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let order = full_plan();
        for (i, stage) in order.iter().enumerate() {
            for dep in stage.dependencies() {
                let j = order.iter().position(|s| s == dep).unwrap();
                assert!(j < i, "{} must run before {}", dep, stage);
            }
        }
    }

    #[test]
    fn test_plan_is_independent_of_input_order() {
        let mut reversed = Stage::ALL.to_vec();
        reversed.reverse();
        assert_eq!(plan(&reversed).unwrap(), full_plan());
    }

    #[test]
    fn test_missing_dependency_rejected() {
        let err = plan(&[Stage::Order, Stage::Payment]).unwrap_err();
        assert!(err.contains("customers"));
    }

    #[test]
    fn test_partial_plan() {
        assert_eq!(
            plan(&[Stage::Payment, Stage::Order, Stage::Customer]).unwrap(),
            vec![Stage::Customer, Stage::Order, Stage::Payment]
        );
    }
}
