// 🔎 Filter Chain - ordered (field, comparator, literal) predicates
//
// Every table keeps one chain. A record passes when it satisfies ALL
// filters (AND semantics); an empty chain lets everything through.
// Which fields exist and which comparators they accept is table-specific,
// see the `Record` impls of each entity.

use crate::error::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// ============================================================================
// COMPARATOR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    /// Substring match (text fields only)
    Contains,
    Equals,
    LessThan,
    GreaterThan,
}

impl Comparator {
    /// Numeric codes used by collaborators: 1 contains, 2 equals, 3 <, 4 >
    pub fn from_code(code: i32) -> Option<Comparator> {
        match code {
            1 => Some(Comparator::Contains),
            2 => Some(Comparator::Equals),
            3 => Some(Comparator::LessThan),
            4 => Some(Comparator::GreaterThan),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Comparator::Contains => 1,
            Comparator::Equals => 2,
            Comparator::LessThan => 3,
            Comparator::GreaterThan => 4,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Contains => "contains",
            Comparator::Equals => "=",
            Comparator::LessThan => "<",
            Comparator::GreaterThan => ">",
        }
    }

    /// Apply to an already computed ordering of `record_value` vs `literal`.
    /// `Contains` has no ordering meaning and never matches here.
    pub fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Comparator::Equals => ordering == Ordering::Equal,
            Comparator::LessThan => ordering == Ordering::Less,
            Comparator::GreaterThan => ordering == Ordering::Greater,
            Comparator::Contains => false,
        }
    }

    /// Text comparison: substring for `Contains`, exact for `Equals`.
    pub fn matches_text(&self, record_value: &str, literal: &str) -> bool {
        match self {
            Comparator::Contains => record_value.contains(literal),
            Comparator::Equals => record_value == literal,
            _ => false,
        }
    }

    /// Numeric comparison. A literal that does not parse never matches.
    pub fn matches_number(&self, record_value: f64, literal: &str) -> bool {
        match literal.trim().parse::<f64>() {
            Ok(wanted) => record_value
                .partial_cmp(&wanted)
                .map(|ordering| self.accepts(ordering))
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ============================================================================
// FILTER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub comparator: Comparator,
    pub value: String,
}

impl Filter {
    pub fn new(field: impl Into<String>, comparator: Comparator, value: impl Into<String>) -> Self {
        Filter {
            field: field.into(),
            comparator,
            value: value.into(),
        }
    }
}

/// Field semantics a table plugs into its chain.
pub trait Filterable {
    /// Whether `field` exists on this record type and accepts `comparator`
    fn supports(field: &str, comparator: Comparator) -> bool;

    /// Human-readable form, e.g. `Population > 500000`
    fn describe(filter: &Filter) -> String;
}

// ============================================================================
// FILTER CHAIN
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn new() -> Self {
        FilterChain {
            filters: Vec::new(),
        }
    }

    /// Append a filter after checking the field/comparator pair against `T`.
    pub fn add<T: Filterable>(&mut self, filter: Filter) -> Result<()> {
        if !T::supports(&filter.field, filter.comparator) {
            return Err(DbError::validation(format!(
                "Unsupported filter: field {:?} with comparator {}",
                filter.field, filter.comparator
            )));
        }
        self.filters.push(filter);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    /// Remove the filter at `index`; out-of-range indices are ignored.
    pub fn remove_at(&mut self, index: usize) -> Option<Filter> {
        if index < self.filters.len() {
            Some(self.filters.remove(index))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Filter> {
        self.filters.get(index)
    }

    /// Description of the filter at `index`, empty when there is none.
    pub fn describe<T: Filterable>(&self, index: usize) -> String {
        self.filters.get(index).map(T::describe).unwrap_or_default()
    }

    /// Conjunction of `predicate` over every filter in order.
    pub fn matches_all<F>(&self, mut predicate: F) -> bool
    where
        F: FnMut(&Filter) -> bool,
    {
        self.filters.iter().all(|filter| predicate(filter))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Word;

    impl Filterable for Word {
        fn supports(field: &str, comparator: Comparator) -> bool {
            field == "text" && comparator != Comparator::LessThan
        }

        fn describe(filter: &Filter) -> String {
            format!("Text {} {:?}", filter.comparator, filter.value)
        }
    }

    #[test]
    fn test_comparator_codes() {
        for code in 1..=4 {
            let comparator = Comparator::from_code(code).unwrap();
            assert_eq!(comparator.code(), code);
        }
        assert_eq!(Comparator::from_code(0), None);
        assert_eq!(Comparator::from_code(5), None);
    }

    #[test]
    fn test_matches_number() {
        assert!(Comparator::GreaterThan.matches_number(1_000_000.0, "500000"));
        assert!(!Comparator::LessThan.matches_number(1_000_000.0, "500000"));
        assert!(Comparator::Equals.matches_number(250.0, " 250 "));
        assert!(!Comparator::Equals.matches_number(250.0, "abc"));
        assert!(!Comparator::Contains.matches_number(250.0, "250"));
    }

    #[test]
    fn test_matches_text() {
        assert!(Comparator::Contains.matches_text("Springfield", "field"));
        assert!(!Comparator::Equals.matches_text("Springfield", "field"));
        assert!(Comparator::Equals.matches_text("Springfield", "Springfield"));
        assert!(!Comparator::GreaterThan.matches_text("b", "a"));
    }

    #[test]
    fn test_chain_rejects_unsupported_filters() {
        let mut chain = FilterChain::new();
        assert!(chain.add::<Word>(Filter::new("text", Comparator::Equals, "a")).is_ok());

        let err = chain
            .add::<Word>(Filter::new("text", Comparator::LessThan, "a"))
            .unwrap_err();
        assert!(err.is_validation());

        assert!(chain.add::<Word>(Filter::new("other", Comparator::Equals, "a")).is_err());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_chain_remove_and_describe() {
        let mut chain = FilterChain::new();
        chain.add::<Word>(Filter::new("text", Comparator::Contains, "a")).unwrap();
        chain.add::<Word>(Filter::new("text", Comparator::Equals, "b")).unwrap();

        assert_eq!(chain.describe::<Word>(1), "Text = \"b\"");
        assert_eq!(chain.describe::<Word>(9), "");

        let removed = chain.remove_at(0).unwrap();
        assert_eq!(removed.value, "a");
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.get(0).unwrap().value, "b");

        assert!(chain.remove_at(5).is_none());
        chain.clear();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_matches_all_is_conjunction() {
        let mut chain = FilterChain::new();
        assert!(chain.matches_all(|_| false)); // empty chain passes everything

        chain.add::<Word>(Filter::new("text", Comparator::Contains, "a")).unwrap();
        chain.add::<Word>(Filter::new("text", Comparator::Contains, "b")).unwrap();

        assert!(chain.matches_all(|f| "abc".contains(f.value.as_str())));
        assert!(!chain.matches_all(|f| "axc".contains(f.value.as_str())));
    }
}
