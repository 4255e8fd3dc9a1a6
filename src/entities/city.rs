// 🏙️ City Entity - settlements drivers and violations point at
//
// A city is identified by its integer id and, for humans, by its name.
// The name index is kept unique: adding a name that already exists
// returns the existing id and changes nothing.

use crate::error::{DbError, Result};
use crate::filter::{Comparator, Filter, Filterable};
use crate::table::{Cursor, Matches, Record, Table};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// POPULATION GRADE / SETTLEMENT TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PopulationGrade {
    #[default]
    Small,
    Medium,
    Large,
}

impl PopulationGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            PopulationGrade::Small => "Small",
            PopulationGrade::Medium => "Medium",
            PopulationGrade::Large => "Large",
        }
    }

    /// Unrecognized text falls back to `Small`.
    pub fn parse(text: &str) -> Self {
        match text {
            "Medium" => PopulationGrade::Medium,
            "Large" => PopulationGrade::Large,
            _ => PopulationGrade::Small,
        }
    }

    /// Collaborators pick grades by number: 0 Small, 1 Medium, 2 Large
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PopulationGrade::Small),
            1 => Some(PopulationGrade::Medium),
            2 => Some(PopulationGrade::Large),
            _ => None,
        }
    }
}

impl From<String> for PopulationGrade {
    fn from(text: String) -> Self {
        PopulationGrade::parse(&text)
    }
}

impl From<PopulationGrade> for String {
    fn from(grade: PopulationGrade) -> Self {
        grade.as_str().to_string()
    }
}

impl fmt::Display for PopulationGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SettlementType {
    #[default]
    City,
    Town,
    Village,
}

impl SettlementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementType::City => "City",
            SettlementType::Town => "Town",
            SettlementType::Village => "Village",
        }
    }

    /// Unrecognized text falls back to `City`.
    pub fn parse(text: &str) -> Self {
        match text {
            "Town" => SettlementType::Town,
            "Village" => SettlementType::Village,
            _ => SettlementType::City,
        }
    }

    /// 0 City, 1 Town, 2 Village
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(SettlementType::City),
            1 => Some(SettlementType::Town),
            2 => Some(SettlementType::Village),
            _ => None,
        }
    }
}

impl From<String> for SettlementType {
    fn from(text: String) -> Self {
        SettlementType::parse(&text)
    }
}

impl From<SettlementType> for String {
    fn from(kind: SettlementType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for SettlementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ============================================================================
// CITY RECORD
// ============================================================================

/// Field order is the on-disk column order: `id "name" population "grade" "type"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: i64,
    pub name: String,
    pub population: u64,
    pub grade: PopulationGrade,
    pub settlement_type: SettlementType,
}

impl Record for City {
    const ENTITY: &'static str = "City";

    fn id(&self) -> i64 {
        self.id
    }

    fn unique_key(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl Filterable for City {
    fn supports(field: &str, comparator: Comparator) -> bool {
        match field {
            "name" => matches!(comparator, Comparator::Contains | Comparator::Equals),
            "population" => comparator != Comparator::Contains,
            "type" | "grade" => comparator == Comparator::Equals,
            _ => false,
        }
    }

    fn describe(filter: &Filter) -> String {
        match (filter.field.as_str(), filter.comparator) {
            ("name", Comparator::Contains) => format!("Name contains \"{}\"", filter.value),
            ("name", _) => format!("Name equals \"{}\"", filter.value),
            ("population", comparator) => format!("Population {} {}", comparator, filter.value),
            ("type", _) => format!("Type equals \"{}\"", filter.value),
            ("grade", _) => format!("Grade equals \"{}\"", filter.value),
            _ => String::new(),
        }
    }
}

impl Matches for City {
    fn matches(&self, filter: &Filter) -> bool {
        match filter.field.as_str() {
            "name" => filter.comparator.matches_text(&self.name, &filter.value),
            "population" => filter
                .comparator
                .matches_number(self.population as f64, &filter.value),
            "type" => filter
                .comparator
                .matches_text(self.settlement_type.as_str(), &filter.value),
            "grade" => filter.comparator.matches_text(self.grade.as_str(), &filter.value),
            _ => false,
        }
    }
}

// ============================================================================
// CITY TABLE
// ============================================================================

pub struct CityTable {
    table: Table<City>,
}

impl CityTable {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        CityTable {
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

    /// Add a city and return its id. A name that is already present is a
    /// no-op returning the existing id (first match wins).
    pub fn add_city(
        &mut self,
        name: &str,
        population: u64,
        grade: PopulationGrade,
        settlement_type: SettlementType,
    ) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(DbError::validation("City name must not be empty"));
        }
        if let Some(existing) = self.table.id_by_key(name) {
            tracing::debug!(name, id = existing, "City already exists, add ignored");
            return Ok(existing);
        }

        let id = self.table.next_id();
        self.table.insert(City {
            id,
            name: name.to_string(),
            population,
            grade,
            settlement_type,
        });
        tracing::debug!(id, name, "Added city");
        Ok(id)
    }

    /// Delete by name, returning the removed city.
    pub fn delete_city(&mut self, name: &str) -> Option<City> {
        let id = self.table.id_by_key(name)?;
        self.table.remove(id)
    }

    // ========================================================================
    // LOOKUPS
    // ========================================================================

    pub fn get(&self, id: i64) -> Option<&City> {
        self.table.get(id)
    }

    pub fn exists(&self, id: i64) -> bool {
        self.table.contains(id)
    }

    /// Empty string when the id is unknown (e.g. a dangling -1 reference)
    pub fn name_by_id(&self, id: i64) -> String {
        self.table.get(id).map(|c| c.name.clone()).unwrap_or_default()
    }

    /// -1 when no city has that name
    pub fn id_by_name(&self, name: &str) -> i64 {
        self.table.id_by_key(name).unwrap_or(-1)
    }

    // ========================================================================
    // FIELD UPDATES
    // ========================================================================

    /// Rename. Refused when the id is unknown, the name is empty, or another
    /// city already carries the new name.
    pub fn update_name(&mut self, id: i64, new_name: &str) -> bool {
        if new_name.trim().is_empty() {
            return false;
        }
        if let Some(owner) = self.table.id_by_key(new_name) {
            return owner == id;
        }
        let old_name = match self.table.get_mut(id) {
            Some(city) => std::mem::replace(&mut city.name, new_name.to_string()),
            None => return false,
        };
        self.table.rekey(id, &old_name, new_name);
        true
    }

    pub fn update_population(&mut self, id: i64, population: u64) -> bool {
        self.edit(id, |city| city.population = population)
    }

    pub fn update_grade(&mut self, id: i64, grade: PopulationGrade) -> bool {
        self.edit(id, |city| city.grade = grade)
    }

    pub fn update_type(&mut self, id: i64, settlement_type: SettlementType) -> bool {
        self.edit(id, |city| city.settlement_type = settlement_type)
    }

    fn edit<F: FnOnce(&mut City)>(&mut self, id: i64, change: F) -> bool {
        match self.table.get_mut(id) {
            Some(city) => {
                change(city);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // ITERATION & FILTERS
    // ========================================================================

    pub fn iter(&self) -> impl Iterator<Item = &City> + '_ {
        self.table.iter()
    }

    pub fn cursor(&self) -> Cursor<'_, City> {
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

    pub fn apply_filters(&self) -> Vec<City> {
        self.table.apply_filters()
    }
}

// ============================================================================
// TESTS
// ============================================================================
