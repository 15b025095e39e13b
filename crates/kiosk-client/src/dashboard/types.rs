//! Search log models and the views the dashboard derives from them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query terms that stand for "list everything" rather than a real search.
const GENERIC_TERMS: [&str; 2] = ["all", "advanced_search"];

/// Rows kept by [`group_by_type_and_term`].
pub const MAX_GROUPS: usize = 20;

/// Aggregated statistics over all search logs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogStats {
    /// Searches recorded.
    pub total_searches: u64,
    /// Searches that found something.
    pub successful_searches: u64,
    /// Searches that found nothing.
    pub failed_searches: u64,
    /// Count per search type.
    pub search_types: BTreeMap<String, u64>,
    /// Counts per `YYYY-MM-DD` date.
    pub daily_stats: BTreeMap<String, DailyStats>,
    /// Most searched product terms.
    pub top_products: Vec<TopProduct>,
    /// Most frequent terms with no result.
    pub top_not_found: Vec<NotFoundTerm>,
}

impl LogStats {
    /// Share of successful searches in percent, `None` when there were none.
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> Option<f64> {
        (self.total_searches > 0)
            .then(|| self.successful_searches as f64 / self.total_searches as f64 * 100.0)
    }

    /// Daily counts in date order.
    pub fn sorted_daily(&self) -> Vec<(&str, &DailyStats)> {
        self.daily_stats.iter().map(|(date, stats)| (date.as_str(), stats)).collect()
    }
}

/// Counts for one day.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyStats {
    /// Searches that day.
    pub total: u64,
    /// Successful searches that day.
    pub success: u64,
    /// Failed searches that day.
    pub failed: u64,
}

/// A frequently searched product term.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopProduct {
    /// The query term.
    pub term: String,
    /// Times searched.
    pub count: u64,
    /// Percentage of searches that found it.
    #[serde(default)]
    pub found_percent: f64,
}

/// A term that keeps coming back empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotFoundTerm {
    /// The query term.
    pub term: String,
    /// Times searched without result.
    pub count: u64,
}

/// One recorded search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchLog {
    /// Log id, when the backend sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Raw search type tag.
    pub search_type: String,
    /// What the shopper asked for.
    pub query_term: String,
    /// Whether anything was found.
    pub found: bool,
    /// ISO-8601 timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Backend-specific extras.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl SearchLog {
    /// Typed view of the search type.
    pub fn kind(&self) -> SearchType {
        SearchType::from_tag(&self.search_type)
    }
}

/// Kinds of search the backend records.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SearchType {
    /// Plain product lookup.
    Product,
    /// Product lookup with filters.
    ProductAdvanced,
    /// Plain recipe lookup.
    Recipe,
    /// Recipe lookup with filters.
    RecipeAdvanced,
    /// A tag this client doesn't know.
    Other(String),
}

impl SearchType {
    /// Parse a wire tag.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "product" => Self::Product,
            "product_advanced" => Self::ProductAdvanced,
            "recipe" => Self::Recipe,
            "recipe_advanced" => Self::RecipeAdvanced,
            other => Self::Other(other.to_string()),
        }
    }

    /// Human-readable label. Unknown tags are shown as-is.
    pub fn label(&self) -> &str {
        match self {
            Self::Product => "Product (basic)",
            Self::ProductAdvanced => "Product (advanced)",
            Self::Recipe => "Recipe (basic)",
            Self::RecipeAdvanced => "Recipe (advanced)",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Searches sharing a type and term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchGroup {
    /// Raw search type tag.
    pub search_type: String,
    /// The query term.
    pub query_term: String,
    /// Searches in the group.
    pub total: u64,
    /// Of those, how many found something.
    pub found: u64,
}

impl SearchGroup {
    /// Found share in percent.
    #[allow(clippy::cast_precision_loss)]
    pub fn found_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.found as f64 / self.total as f64 * 100.0
    }
}

/// Group logs by `(search_type, query_term)`, busiest first, at most [`MAX_GROUPS`].
///
/// Generic "list everything" queries are skipped. Groups with equal totals
/// keep the order in which they first appeared.
pub fn group_by_type_and_term(logs: &[SearchLog]) -> Vec<SearchGroup> {
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut groups: Vec<SearchGroup> = Vec::new();

    for log in logs {
        if GENERIC_TERMS.contains(&log.query_term.as_str()) {
            continue;
        }
        let key = (log.search_type.as_str(), log.query_term.as_str());
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(SearchGroup {
                search_type: log.search_type.clone(),
                query_term: log.query_term.clone(),
                total: 0,
                found: 0,
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];
        group.total += 1;
        if log.found {
            group.found += 1;
        }
    }

    groups.sort_by(|a, b| b.total.cmp(&a.total));
    groups.truncate(MAX_GROUPS);
    groups
}
