// 💸 Fine Entity - catalogue of fine types and their amounts
//
// The fine type is the natural key: adding or renaming onto a type that
// already exists is rejected.

use crate::error::{DbError, Result};
use crate::filter::{Comparator, Filter, Filterable};
use crate::table::{Cursor, Matches, Record, Table};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    #[default]
    Light,
    Medium,
    Heavy,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Light => "Light",
            Severity::Medium => "Medium",
            Severity::Heavy => "Heavy",
        }
    }

    /// Unrecognized text falls back to `Light`.
    pub fn parse(text: &str) -> Self {
        Self::parse_strict(text).unwrap_or_default()
    }

    pub fn parse_strict(text: &str) -> Option<Self> {
        match text {
            "Light" => Some(Severity::Light),
            "Medium" => Some(Severity::Medium),
            "Heavy" => Some(Severity::Heavy),
            _ => None,
        }
    }

    /// 0 Light, 1 Medium, 2 Heavy
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Severity::Light),
            1 => Some(Severity::Medium),
            2 => Some(Severity::Heavy),
            _ => None,
        }
    }
}

impl From<String> for Severity {
    fn from(text: String) -> Self {
        Severity::parse(&text)
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        severity.as_str().to_string()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ============================================================================
// FINE RECORD
// ============================================================================

/// On disk: `id amount "type" "severity"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fine {
    pub id: i64,
    pub amount: f64,
    #[serde(rename = "type")]
    pub fine_type: String,
    pub severity: Severity,
}

impl Record for Fine {
    const ENTITY: &'static str = "Fine";

    fn id(&self) -> i64 {
        self.id
    }

    fn unique_key(&self) -> Option<&str> {
        Some(&self.fine_type)
    }
}

impl Filterable for Fine {
    fn supports(field: &str, comparator: Comparator) -> bool {
        match field {
            "type" => matches!(comparator, Comparator::Contains | Comparator::Equals),
            "amount" => comparator != Comparator::Contains,
            "severity" => comparator == Comparator::Equals,
            _ => false,
        }
    }

    fn describe(filter: &Filter) -> String {
        match (filter.field.as_str(), filter.comparator) {
            ("type", Comparator::Contains) => format!("Type contains \"{}\"", filter.value),
            ("type", _) => format!("Type equals \"{}\"", filter.value),
            ("amount", comparator) => format!("Amount {} {}", comparator, filter.value),
            ("severity", _) => format!("Severity equals \"{}\"", filter.value),
            _ => String::new(),
        }
    }
}

impl Matches for Fine {
    fn matches(&self, filter: &Filter) -> bool {
        match filter.field.as_str() {
            "type" => filter.comparator.matches_text(&self.fine_type, &filter.value),
            "amount" => filter.comparator.matches_number(self.amount, &filter.value),
            // Unknown severity names match nothing rather than defaulting
            "severity" => Severity::parse_strict(&filter.value) == Some(self.severity),
            _ => false,
        }
    }
}

// ============================================================================
// FINE TABLE
// ============================================================================

pub struct FineTable {
    table: Table<Fine>,
}

impl FineTable {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        FineTable {
            table: Table::new(path),
        }
    }

    pub fn load(&mut self) -> Result<usize> {
        self.table.load()
    }

    pub fn load_from_file(&mut self, path: &Path) -> Result<usize> {
        self.table.load_from_file(path)
    }

    pub fn save_to_file(&self) -> Result<usize> {
        self.table.save_to_file()
    }

    fn check_amount(amount: f64) -> Result<()> {
        if amount.is_finite() && amount >= 0.0 {
            Ok(())
        } else {
            Err(DbError::validation(format!("Fine amount must be non-negative, got {}", amount)))
        }
    }

    pub fn add_fine(&mut self, fine_type: &str, amount: f64, severity: Severity) -> Result<i64> {
        if fine_type.trim().is_empty() {
            return Err(DbError::validation("Fine type must not be empty"));
        }
        if self.table.has_key(fine_type) {
            return Err(DbError::validation("Fine with that type already exists"));
        }
        Self::check_amount(amount)?;

        let id = self.table.next_id();
        self.table.insert(Fine {
            id,
            amount,
            fine_type: fine_type.to_string(),
            severity,
        });
        tracing::debug!(id, fine_type, amount, "Added fine");
        Ok(id)
    }

    /// Delete by type. Violations pointing at the fine keep their fine id.
    pub fn delete_fine(&mut self, fine_type: &str) -> Option<Fine> {
        let id = self.table.id_by_key(fine_type)?;
        self.table.remove(id)
    }

    // ========================================================================
    // LOOKUPS
    // ========================================================================

    pub fn get(&self, id: i64) -> Option<&Fine> {
        self.table.get(id)
    }

    pub fn exists(&self, id: i64) -> bool {
        self.table.contains(id)
    }

    pub fn id_by_type(&self, fine_type: &str) -> i64 {
        self.table.id_by_key(fine_type).unwrap_or(-1)
    }

    pub fn type_by_id(&self, id: i64) -> String {
        self.table.get(id).map(|f| f.fine_type.clone()).unwrap_or_default()
    }

    /// 0.0 for an unknown id
    pub fn amount_by_id(&self, id: i64) -> f64 {
        self.table.get(id).map_or(0.0, |f| f.amount)
    }

    // ========================================================================
    // FIELD UPDATES
    // ========================================================================

    pub fn update_type(&mut self, id: i64, new_type: &str) -> bool {
        if new_type.trim().is_empty() || self.table.has_key(new_type) {
            return false;
        }
        let old_type = match self.table.get_mut(id) {
            Some(fine) => std::mem::replace(&mut fine.fine_type, new_type.to_string()),
            None => return false,
        };
        self.table.rekey(id, &old_type, new_type);
        true
    }

    pub fn update_amount(&mut self, id: i64, amount: f64) -> bool {
        if Self::check_amount(amount).is_err() {
            return false;
        }
        match self.table.get_mut(id) {
            Some(fine) => {
                fine.amount = amount;
                true
            }
            None => false,
        }
    }

    pub fn update_severity(&mut self, id: i64, severity: Severity) -> bool {
        match self.table.get_mut(id) {
            Some(fine) => {
                fine.severity = severity;
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // ITERATION & FILTERS
    // ========================================================================

    pub fn iter(&self) -> impl Iterator<Item = &Fine> + '_ {
        self.table.iter()
    }

    pub fn cursor(&self) -> Cursor<'_, Fine> {
        self.table.cursor()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn add_filter(&mut self, field: &str, comparator: Comparator, value: &str) -> Result<()> {
        self.table.add_filter(field, comparator, value)
    }

    pub fn add_filter_code(&mut self, field: &str, code: i32, value: &str) -> Result<()> {
        self.table.add_filter_code(field, code, value)
    }

    pub fn clear_filters(&mut self) {
        self.table.clear_filters()
    }

    pub fn remove_filter_at(&mut self, index: usize) -> Option<Filter> {
        self.table.remove_filter_at(index)
    }

    pub fn filter_count(&self) -> usize {
        self.table.filter_count()
    }

    pub fn filter_description(&self, index: usize) -> String {
        self.table.filter_description(index)
    }

    pub fn apply_filters(&self) -> Vec<Fine> {
        self.table.apply_filters()
    }
}

// ============================================================================
// TESTS
// ============================================================================
