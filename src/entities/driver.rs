// 🚗 Driver Entity - people who receive fines
//
// Names are NOT unique: two drivers may share a full name and are told
// apart by birth date and city. Lookups by name therefore scan the table
// instead of going through a natural-key index.

use crate::dates::{self, Clock};
use crate::error::{DbError, Result};
use crate::filter::{Comparator, Filter, Filterable};
use crate::table::{Cursor, Matches, Record, Table};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static NAME_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z\s]+$").expect("valid name regex"));

pub fn is_valid_name(name: &str) -> bool {
    NAME_SHAPE.is_match(name)
}

// ============================================================================
// DRIVER RECORD
// ============================================================================

/// On disk: `id "fullName" "birthDate" cityId`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: i64,
    pub full_name: String,
    /// DD.MM.YYYY
    pub birth_date: String,
    /// -1 when unset or when the city was deleted
    pub city_id: i64,
}

impl Driver {
    /// Age on `date` (DD.MM.YYYY); None when either date does not parse
    pub fn age_on(&self, date: &str) -> Option<i32> {
        let birth = dates::parse_date(&self.birth_date)?;
        let on = dates::parse_date(date)?;
        Some(dates::age_on(birth, on))
    }
}

impl Record for Driver {
    const ENTITY: &'static str = "Driver";

    fn id(&self) -> i64 {
        self.id
    }
}

impl Filterable for Driver {
    fn supports(field: &str, comparator: Comparator) -> bool {
        match field {
            "fullName" => matches!(comparator, Comparator::Contains | Comparator::Equals),
            "birthDate" => comparator != Comparator::Contains,
            _ => false,
        }
    }

    fn describe(filter: &Filter) -> String {
        match (filter.field.as_str(), filter.comparator) {
            ("fullName", Comparator::Contains) => format!("Full Name contains \"{}\"", filter.value),
            ("fullName", _) => format!("Full Name equals \"{}\"", filter.value),
            ("birthDate", Comparator::LessThan) => format!("Born before {}", filter.value),
            ("birthDate", Comparator::GreaterThan) => format!("Born after {}", filter.value),
            ("birthDate", _) => format!("Birth Date = \"{}\"", filter.value),
            _ => String::new(),
        }
    }
}

impl Matches for Driver {
    fn matches(&self, filter: &Filter) -> bool {
        match (filter.field.as_str(), filter.comparator) {
            ("fullName", comparator) => comparator.matches_text(&self.full_name, &filter.value),
            ("birthDate", Comparator::Equals) => self.birth_date == filter.value,
            ("birthDate", comparator) => {
                dates::parse_date(&filter.value).is_some()
                    && comparator.accepts(dates::compare_dates(&self.birth_date, &filter.value))
            }
            _ => false,
        }
    }
}

// ============================================================================
// DRIVER TABLE
// ============================================================================

pub struct DriverTable {
    table: Table<Driver>,
    min_age: i32,
    max_age: i32,
    today: Clock,
}

impl DriverTable {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        DriverTable {
            table: Table::new(path),
            min_age: 18,
            max_age: 100,
            today: dates::system_today,
        }
    }

    /// Inclusive age bounds enforced on add and on birth-date edits
    pub fn with_age_bounds(mut self, min_age: i32, max_age: i32) -> Self {
        self.min_age = min_age;
        self.max_age = max_age;
        self
    }

    pub fn with_clock(mut self, today: Clock) -> Self {
        self.today = today;
        self
    }

    pub fn min_age(&self) -> i32 {
        self.min_age
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

    // ========================================================================
    // VALIDATION
    // ========================================================================

    fn check_name(name: &str) -> Result<()> {
        if is_valid_name(name) {
            Ok(())
        } else {
            Err(DbError::validation("Invalid characters in name"))
        }
    }

    fn check_birth_date(&self, birth_date: &str) -> Result<()> {
        let birth = dates::parse_date(birth_date)
            .ok_or_else(|| DbError::validation("Incorrect date format"))?;
        let age = dates::age_on(birth, (self.today)());
        if age < self.min_age || age > self.max_age {
            return Err(DbError::validation(format!(
                "Driver must be between {} and {} years old",
                self.min_age, self.max_age
            )));
        }
        Ok(())
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    pub fn add_driver(&mut self, full_name: &str, birth_date: &str, city_id: i64) -> Result<i64> {
        Self::check_name(full_name)?;
        self.check_birth_date(birth_date)?;

        let id = self.table.next_id();
        self.table.insert(Driver {
            id,
            full_name: full_name.to_string(),
            birth_date: birth_date.to_string(),
            city_id,
        });
        tracing::debug!(id, full_name, city_id, "Added driver");
        Ok(id)
    }

    pub fn delete_driver_by_id(&mut self, id: i64) -> Option<Driver> {
        self.table.remove(id)
    }

    // ========================================================================
    // LOOKUPS
    // ========================================================================

    pub fn get(&self, id: i64) -> Option<&Driver> {
        self.table.get(id)
    }

    pub fn exists(&self, id: i64) -> bool {
        self.table.contains(id)
    }

    pub fn name_by_id(&self, id: i64) -> String {
        self.table.get(id).map(|d| d.full_name.clone()).unwrap_or_default()
    }

    /// Every driver with exactly this name, newest-first
    pub fn find_all_by_name(&self, full_name: &str) -> Vec<Driver> {
        self.table
            .iter()
            .filter(|d| d.full_name == full_name)
            .cloned()
            .collect()
    }

    /// Resolve a driver id from a name plus optional qualifiers.
    ///
    /// - no qualifiers: the single driver with that name, -1 if there are several
    /// - birth date and/or city given: the first driver matching all given qualifiers
    pub fn driver_id(&self, full_name: &str, birth_date: Option<&str>, city_id: Option<i64>) -> i64 {
        let candidates = self.find_all_by_name(full_name);

        match (birth_date, city_id) {
            (None, None) if candidates.len() == 1 => candidates[0].id,
            (None, None) => -1,
            (birth, city) => candidates
                .iter()
                .find(|d| {
                    birth.map_or(true, |b| d.birth_date == b) && city.map_or(true, |c| d.city_id == c)
                })
                .map_or(-1, |d| d.id),
        }
    }

    /// City of the driver called `full_name`, -1 if unknown or ambiguous
    pub fn city_id_for_driver(&self, full_name: &str) -> i64 {
        let id = self.driver_id(full_name, None, None);
        self.table.get(id).map_or(-1, |d| d.city_id)
    }

    // ========================================================================
    // FIELD UPDATES
    // ========================================================================

    pub fn update_name(&mut self, id: i64, new_name: &str) -> bool {
        if !is_valid_name(new_name) {
            return false;
        }
        self.edit(id, |d| d.full_name = new_name.to_string())
    }

    pub fn update_birth_date(&mut self, id: i64, new_birth_date: &str) -> bool {
        if self.check_birth_date(new_birth_date).is_err() {
            return false;
        }
        self.edit(id, |d| d.birth_date = new_birth_date.to_string())
    }

    pub fn update_city(&mut self, id: i64, new_city_id: i64) -> bool {
        self.edit(id, |d| d.city_id = new_city_id)
    }

    /// Null out (-1) every reference to a deleted city. Returns how many changed.
    pub fn update_city_references(&mut self, deleted_city_id: i64) -> usize {
        let mut changed = 0;
        self.table.for_each_mut(|d| {
            if d.city_id == deleted_city_id {
                d.city_id = -1;
                changed += 1;
            }
        });
        changed
    }

    fn edit<F: FnOnce(&mut Driver)>(&mut self, id: i64, change: F) -> bool {
        match self.table.get_mut(id) {
            Some(driver) => {
                change(driver);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // ITERATION & FILTERS
    // ========================================================================

    pub fn iter(&self) -> impl Iterator<Item = &Driver> + '_ {
        self.table.iter()
    }

    pub fn cursor(&self) -> Cursor<'_, Driver> {
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

    pub fn apply_filters(&self) -> Vec<Driver> {
        self.table.apply_filters()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixed_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn drivers() -> DriverTable {
        DriverTable::new("drivers.txt").with_clock(fixed_today)
    }

    #[test]
    fn test_add_driver_validates_name() {
        let mut table = drivers();
        let err = table.add_driver("R2-D2", "01.01.1990", 1).unwrap_err();
        assert!(err.to_string().contains("Invalid characters in name"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_add_driver_validates_date_format() {
        let mut table = drivers();
        assert!(table.add_driver("John Smith", "1990-01-01", 1).is_err());
        assert!(table.add_driver("John Smith", "1.1.1990", 1).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_age_bounds_are_inclusive() {
        let mut table = drivers();

        // Turns 18 exactly today
        assert!(table.add_driver("Just Eighteen", "15.06.2007", 1).is_ok());
        // Turns 18 tomorrow
        let err = table.add_driver("Almost Eighteen", "16.06.2007", 1).unwrap_err();
        assert!(err.to_string().contains("between 18 and 100"));

        // 100 today is fine, 101 is not
        assert!(table.add_driver("Very Old", "15.06.1925", 1).is_ok());
        assert!(table.add_driver("Too Old", "14.06.1924", 1).is_err());

        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_duplicate_names_disambiguated() {
        let mut table = drivers();
        let a = table.add_driver("John Smith", "01.01.1980", 1).unwrap();
        let b = table.add_driver("John Smith", "02.02.1990", 2).unwrap();

        assert_eq!(table.find_all_by_name("John Smith").len(), 2);
        assert_eq!(table.driver_id("John Smith", None, None), -1);
        assert_eq!(table.driver_id("John Smith", Some("01.01.1980"), None), a);
        assert_eq!(table.driver_id("John Smith", None, Some(2)), b);
        assert_eq!(table.driver_id("John Smith", Some("02.02.1990"), Some(2)), b);
        assert_eq!(table.driver_id("John Smith", Some("02.02.1990"), Some(1)), -1);
        assert_eq!(table.driver_id("Nobody", None, None), -1);
        assert_eq!(table.city_id_for_driver("John Smith"), -1);
    }

    #[test]
    fn test_single_driver_lookup() {
        let mut table = drivers();
        let id = table.add_driver("Ann Lee", "03.03.1993", 4).unwrap();
        assert_eq!(table.driver_id("Ann Lee", None, None), id);
        assert_eq!(table.city_id_for_driver("Ann Lee"), 4);
        assert_eq!(table.name_by_id(id), "Ann Lee");
        assert_eq!(table.name_by_id(-1), "");
    }

    #[test]
    fn test_delete_and_id_sequence() {
        let mut table = drivers();
        for name in ["A A", "B B", "C C"] {
            table.add_driver(name, "01.01.1990", 1).unwrap();
        }
        table.delete_driver_by_id(2).unwrap();
        assert!(!table.exists(2));
        assert_eq!(table.add_driver("D D", "01.01.1990", 1).unwrap(), 4);
        assert!(table.delete_driver_by_id(2).is_none());
    }

    #[test]
    fn test_city_references_cascade() {
        let mut table = drivers();
        table.add_driver("A A", "01.01.1990", 3).unwrap();
        table.add_driver("B B", "01.01.1990", 3).unwrap();
        table.add_driver("C C", "01.01.1990", 4).unwrap();

        assert_eq!(table.update_city_references(3), 2);
        assert_eq!(table.get(1).unwrap().city_id, -1);
        assert_eq!(table.get(2).unwrap().city_id, -1);
        assert_eq!(table.get(3).unwrap().city_id, 4);
    }

    #[test]
    fn test_updates_validate() {
        let mut table = drivers();
        let id = table.add_driver("Ann Lee", "03.03.1993", 4).unwrap();

        assert!(!table.update_name(id, "Ann_Lee"));
        assert!(table.update_name(id, "Ann Marie Lee"));
        assert!(!table.update_birth_date(id, "03.03.2015")); // too young
        assert!(!table.update_birth_date(id, "33.03.1990"));
        assert!(table.update_birth_date(id, "04.04.1994"));
        assert!(table.update_city(id, 9));
        assert!(!table.update_city(77, 9));

        let driver = table.get(id).unwrap();
        assert_eq!(driver.full_name, "Ann Marie Lee");
        assert_eq!(driver.birth_date, "04.04.1994");
        assert_eq!(driver.city_id, 9);
    }

    #[test]
    fn test_filters() {
        let mut table = drivers();
        table.add_driver("John Smith", "01.01.1980", 1).unwrap();
        table.add_driver("Jane Smith", "05.05.1995", 1).unwrap();
        table.add_driver("Bob Stone", "01.01.1980", 2).unwrap();

        table.add_filter_code("fullName", 1, "Smith").unwrap();
        assert_eq!(table.apply_filters().len(), 2);

        table.add_filter_code("birthDate", 2, "01.01.1980").unwrap();
        let hits = table.apply_filters();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].full_name, "John Smith");

        table.clear_filters();
        table.add_filter("birthDate", Comparator::GreaterThan, "31.12.1989").unwrap();
        let hits = table.apply_filters();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].full_name, "Jane Smith");
        assert_eq!(table.filter_description(0), "Born after 31.12.1989");

        assert!(table.add_filter("cityId", Comparator::Equals, "1").is_err());
    }

    #[test]
    fn test_age_on() {
        let driver = Driver {
            id: 1,
            full_name: "A".into(),
            birth_date: "10.10.2000".into(),
            city_id: 1,
        };
        assert_eq!(driver.age_on("09.10.2018"), Some(17));
        assert_eq!(driver.age_on("10.10.2018"), Some(18));
        assert_eq!(driver.age_on("bad"), None);
    }

    #[test]
    fn test_persisted_line_format() {
        let driver = Driver {
            id: 2,
            full_name: "John Smith".into(),
            birth_date: "01.01.1980".into(),
            city_id: -1,
        };
        let line = crate::codec::encode_line(&driver).unwrap();
        assert_eq!(line, "2 \"John Smith\" \"01.01.1980\" -1");
    }
}
