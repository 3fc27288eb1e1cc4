//! City exception table.
//!
//! An ordered list of pattern rules evaluated against the lower-cased,
//! trimmed city text. The first matching rule decides the canonical value;
//! a rule with `"canonical": null` marks the text as garbage. The table is a
//! versioned JSON document so it can grow without a code change; a default
//! copy is compiled in.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

const EMBEDDED_RULES: &str = include_str!("../rules/city_rules.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Prefix,
    Suffix,
    Contains,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CityRule {
    #[serde(rename = "match")]
    pub kind: MatchKind,
    pub pattern: String,
    /// `None` resolves the city to NULL
    pub canonical: Option<String>,
    #[serde(default)]
    pub note: String,
}

impl CityRule {
    fn matches(&self, lowered: &str) -> bool {
        match self.kind {
            MatchKind::Exact => lowered == self.pattern,
            MatchKind::Prefix => lowered.starts_with(&self.pattern),
            MatchKind::Suffix => lowered.ends_with(&self.pattern),
            MatchKind::Contains => lowered.contains(&self.pattern),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CityRuleSet {
    pub version: String,
    pub rules: Vec<CityRule>,
}

impl CityRuleSet {
    /// The rule table shipped with the binary
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_RULES).context("Embedded city rules are invalid")
    }

    /// Load an external rule file (same format as the embedded one)
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read city rules {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse city rules {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let mut set: CityRuleSet = serde_json::from_str(content)?;
        for (i, rule) in set.rules.iter_mut().enumerate() {
            // Matching runs on lower-cased text; trailing spaces are significant for suffixes
            let pattern = match rule.kind {
                MatchKind::Suffix | MatchKind::Contains => rule.pattern.to_lowercase(),
                MatchKind::Exact | MatchKind::Prefix => rule.pattern.trim().to_lowercase(),
            };
            if pattern.trim().is_empty() {
                anyhow::bail!("Rule {} has an empty pattern", i);
            }
            rule.pattern = pattern;
            if let Some(canonical) = &rule.canonical {
                if canonical.trim().is_empty() {
                    anyhow::bail!("Rule {} ('{}') has an empty canonical value", i, rule.pattern);
                }
            }
        }
        Ok(set)
    }

    /// First rule matching the already lower-cased text
    pub fn lookup(&self, lowered: &str) -> Option<&CityRule> {
        self.rules.iter().find(|rule| rule.matches(lowered))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
