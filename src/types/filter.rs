use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sentinel value meaning "this filter dimension is unset".
pub const FILTER_UNSET: &str = "";

/// Caller-chosen filter values, keyed by [`FilterGroup`] name. Missing keys
/// are equivalent to [`FILTER_UNSET`].
pub type FilterSelection = HashMap<String, String>;

/// One selectable option inside a filter dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOption {
    pub label: String,
    pub value: String,
}

impl FilterOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Ordered filter dimension offered by an adapter endpoint.
///
/// The constructor guarantees the unset sentinel is always present as the
/// first option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub name: String,
    pub options: Vec<FilterOption>,
}

impl FilterGroup {
    pub fn new(name: impl Into<String>, options: Vec<FilterOption>) -> Self {
        let mut all = vec![FilterOption::new("All", FILTER_UNSET)];
        all.extend(options.into_iter().filter(|o| o.value != FILTER_UNSET));
        Self {
            name: name.into(),
            options: all,
        }
    }

    /// Resolve the selected value for this group, falling back to the unset
    /// sentinel.
    pub fn selected<'a>(&self, selection: &'a FilterSelection) -> &'a str {
        selection.get(&self.name).map_or(FILTER_UNSET, |v| v.as_str())
    }
}
