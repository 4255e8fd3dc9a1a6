// 📋 Violation Registry - who was fined, where, for what, and when
//
// A violation only stores foreign keys. Names and amounts are resolved
// against the other three tables every time a joined view is built, so
// edits there show up here without touching the registry.
//
// The registry itself does not validate references or ages; the manager
// checks those before calling in.

use crate::dates;
use crate::error::Result;
use crate::filter::{Comparator, Filter, Filterable};
use crate::table::{Cursor, Matches, Record, Table};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{CityTable, DriverTable, FineTable};

/// Persists the paid flag as `0` / `1`.
mod paid_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(paid: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*paid))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(i64::deserialize(deserializer)? != 0)
    }
}

// ============================================================================
// VIOLATION RECORD
// ============================================================================

/// On disk: `recordId driverId cityId fineId paid "date"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub record_id: i64,
    pub driver_id: i64,
    pub city_id: i64,
    pub fine_id: i64,
    #[serde(with = "paid_flag")]
    pub paid: bool,
    /// DD.MM.YYYY
    pub date: String,
}

impl Record for Violation {
    const ENTITY: &'static str = "Violation";

    fn id(&self) -> i64 {
        self.record_id
    }
}

impl Filterable for Violation {
    fn supports(field: &str, comparator: Comparator) -> bool {
        match field {
            "driver" | "city" | "fineType" | "paid" => comparator == Comparator::Equals,
            "amount" => comparator != Comparator::Contains,
            "date" => matches!(comparator, Comparator::LessThan | Comparator::GreaterThan),
            _ => false,
        }
    }

    fn describe(filter: &Filter) -> String {
        match filter.field.as_str() {
            "driver" => format!("Driver: {}", filter.value),
            "city" => format!("City: {}", filter.value),
            "fineType" => format!("Fine type: {}", filter.value),
            "paid" => format!("Paid: {}", filter.value),
            "amount" => format!("Amount {} {}", filter.comparator, filter.value),
            "date" => format!("Date {} {}", filter.comparator, filter.value),
            _ => String::new(),
        }
    }
}

// ============================================================================
// JOINED VIEW
// ============================================================================

/// A violation with driver, city and fine resolved. Dangling references
/// resolve to an empty name and a zero amount.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ViolationInfo {
    pub record_id: i64,
    pub driver_id: i64,
    pub city_id: i64,
    pub fine_id: i64,
    pub driver_name: String,
    pub city_name: String,
    pub fine_type: String,
    pub fine_amount: f64,
    pub paid: bool,
    pub date: String,
}

impl ViolationInfo {
    pub fn join(
        violation: &Violation,
        drivers: &DriverTable,
        cities: &CityTable,
        fines: &FineTable,
    ) -> Self {
        ViolationInfo {
            record_id: violation.record_id,
            driver_id: violation.driver_id,
            city_id: violation.city_id,
            fine_id: violation.fine_id,
            driver_name: drivers.name_by_id(violation.driver_id),
            city_name: cities.name_by_id(violation.city_id),
            fine_type: fines.type_by_id(violation.fine_id),
            fine_amount: fines.amount_by_id(violation.fine_id),
            paid: violation.paid,
            date: violation.date.clone(),
        }
    }
}

impl Matches for ViolationInfo {
    fn matches(&self, filter: &Filter) -> bool {
        match filter.field.as_str() {
            "driver" => self.driver_name == filter.value,
            "city" => self.city_name == filter.value,
            "fineType" => self.fine_type == filter.value,
            "paid" => self.paid == (filter.value.trim() == "1"),
            "amount" => filter.comparator.matches_number(self.fine_amount, &filter.value),
            "date" => {
                dates::parse_date(&filter.value).is_some()
                    && filter
                        .comparator
                        .accepts(dates::compare_dates(&self.date, &filter.value))
            }
            _ => false,
        }
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

pub struct ViolationRegistry {
    table: Table<Violation>,
}

impl ViolationRegistry {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        ViolationRegistry {
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

    /// Append a violation and return its record id (max + 1).
    /// References and the driver's age are not checked here.
    pub fn add_violation(&mut self, driver_id: i64, city_id: i64, fine_id: i64, date: &str) -> i64 {
        let record_id = self.table.next_id();
        self.table.insert(Violation {
            record_id,
            driver_id,
            city_id,
            fine_id,
            paid: false,
            date: date.to_string(),
        });
        tracing::debug!(record_id, driver_id, city_id, fine_id, date, "Added violation");
        record_id
    }

    pub fn get(&self, record_id: i64) -> Option<&Violation> {
        self.table.get(record_id)
    }

    pub fn exists(&self, record_id: i64) -> bool {
        self.table.contains(record_id)
    }

    /// Highest record id in use, 0 when the registry is empty
    pub fn max_record_id(&self) -> i64 {
        self.table.next_id() - 1
    }

    pub fn violation_by_id(
        &self,
        record_id: i64,
        drivers: &DriverTable,
        cities: &CityTable,
        fines: &FineTable,
    ) -> Option<ViolationInfo> {
        self.table
            .get(record_id)
            .map(|v| ViolationInfo::join(v, drivers, cities, fines))
    }

    /// Every violation, joined, newest-first
    pub fn all_joined(
        &self,
        drivers: &DriverTable,
        cities: &CityTable,
        fines: &FineTable,
    ) -> Vec<ViolationInfo> {
        self.table
            .iter()
            .map(|v| ViolationInfo::join(v, drivers, cities, fines))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> + '_ {
        self.table.iter()
    }

    pub fn cursor(&self) -> Cursor<'_, Violation> {
        self.table.cursor()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    // ========================================================================
    // FIELD UPDATES
    // ========================================================================

    pub fn mark_as_paid(&mut self, record_id: i64) -> bool {
        self.update_paid(record_id, true)
    }

    /// Reassign to another driver, moving the violation to `city_id` as well.
    pub fn update_driver(&mut self, record_id: i64, driver_id: i64, city_id: i64) -> bool {
        self.edit(record_id, |v| {
            v.driver_id = driver_id;
            v.city_id = city_id;
        })
    }

    pub fn update_fine(&mut self, record_id: i64, fine_id: i64) -> bool {
        self.edit(record_id, |v| v.fine_id = fine_id)
    }

    pub fn update_date(&mut self, record_id: i64, date: &str) -> bool {
        self.edit(record_id, |v| v.date = date.to_string())
    }

    pub fn update_paid(&mut self, record_id: i64, paid: bool) -> bool {
        self.edit(record_id, |v| v.paid = paid)
    }

    fn edit<F: FnOnce(&mut Violation)>(&mut self, record_id: i64, change: F) -> bool {
        match self.table.get_mut(record_id) {
            Some(violation) => {
                change(violation);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // REFERENCE MAINTENANCE
    // ========================================================================

    /// driver_id -> -1 on every violation of a deleted driver
    pub fn update_driver_references(&mut self, deleted_driver_id: i64) -> usize {
        self.rewrite(|v| v.driver_id == deleted_driver_id, |v| v.driver_id = -1)
    }

    /// city_id -> -1 on every violation in a deleted city
    pub fn update_city_references(&mut self, deleted_city_id: i64) -> usize {
        self.rewrite(|v| v.city_id == deleted_city_id, |v| v.city_id = -1)
    }

    /// Move every violation of `driver_id` to `new_city_id`
    pub fn update_violations_city(&mut self, driver_id: i64, new_city_id: i64) -> usize {
        self.rewrite(|v| v.driver_id == driver_id, |v| v.city_id = new_city_id)
    }

    fn rewrite<P, F>(&mut self, selects: P, mut change: F) -> usize
    where
        P: Fn(&Violation) -> bool,
        F: FnMut(&mut Violation),
    {
        let mut changed = 0;
        self.table.for_each_mut(|v| {
            if selects(v) {
                change(v);
                changed += 1;
            }
        });
        changed
    }

    // ========================================================================
    // FILTERS
    // ========================================================================

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

    /// Joined rows, newest-first, that pass every filter. Filters see the
    /// resolved names and amounts, not the raw ids.
    pub fn apply_filters(
        &self,
        drivers: &DriverTable,
        cities: &CityTable,
        fines: &FineTable,
    ) -> Vec<ViolationInfo> {
        let filters = self.table.filters();
        self.table
            .iter()
            .map(|v| ViolationInfo::join(v, drivers, cities, fines))
            .filter(|info| filters.matches_all(|filter| info.matches(filter)))
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{PopulationGrade, SettlementType, Severity};
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    struct Fixture {
        cities: CityTable,
        drivers: DriverTable,
        fines: FineTable,
        registry: ViolationRegistry,
    }

    fn fixture() -> Fixture {
        let mut cities = CityTable::new("cities.txt");
        let mut drivers = DriverTable::new("drivers.txt").with_clock(today);
        let mut fines = FineTable::new("fines.txt");
        let mut registry = ViolationRegistry::new("registry.txt");

        let springfield = cities
            .add_city("Springfield", 30_000, PopulationGrade::Small, SettlementType::Town)
            .unwrap();
        let shelbyville = cities
            .add_city("Shelbyville", 25_000, PopulationGrade::Small, SettlementType::Town)
            .unwrap();
        let homer = drivers.add_driver("Homer Simpson", "12.05.1980", springfield).unwrap();
        let ned = drivers.add_driver("Ned Flanders", "01.09.1975", shelbyville).unwrap();
        let speeding = fines.add_fine("Speeding", 150.0, Severity::Medium).unwrap();
        let parking = fines.add_fine("Parking", 40.0, Severity::Light).unwrap();

        registry.add_violation(homer, springfield, speeding, "10.01.2024");
        registry.add_violation(homer, springfield, parking, "03.03.2024");
        registry.add_violation(ned, shelbyville, parking, "20.12.2023");

        Fixture {
            cities,
            drivers,
            fines,
            registry,
        }
    }

    #[test]
    fn test_record_ids_sequential() {
        let f = fixture();
        let ids: Vec<i64> = f.registry.iter().map(|v| v.record_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(f.registry.max_record_id(), 3);
        assert_eq!(ViolationRegistry::new("x.txt").max_record_id(), 0);
    }

    #[test]
    fn test_joined_view() {
        let f = fixture();
        let info = f
            .registry
            .violation_by_id(1, &f.drivers, &f.cities, &f.fines)
            .unwrap();

        assert_eq!(info.driver_name, "Homer Simpson");
        assert_eq!(info.city_name, "Springfield");
        assert_eq!(info.fine_type, "Speeding");
        assert_eq!(info.fine_amount, 150.0);
        assert!(!info.paid);
        assert!(f.registry.violation_by_id(99, &f.drivers, &f.cities, &f.fines).is_none());
    }

    #[test]
    fn test_join_reflects_other_tables() {
        let mut f = fixture();
        f.fines.update_amount(1, 175.0);
        f.fines.delete_fine("Parking");

        let all = f.registry.all_joined(&f.drivers, &f.cities, &f.fines);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].fine_amount, 175.0);
        // Dangling fine id resolves to empty type and zero amount
        assert_eq!(all[0].fine_type, "");
        assert_eq!(all[0].fine_amount, 0.0);
        assert_eq!(all[0].fine_id, 2);
    }

    #[test]
    fn test_reference_maintenance() {
        let mut f = fixture();
        assert_eq!(f.registry.update_driver_references(1), 2);
        assert_eq!(f.registry.get(1).unwrap().driver_id, -1);
        assert_eq!(f.registry.get(3).unwrap().driver_id, 2);

        assert_eq!(f.registry.update_city_references(2), 1);
        assert_eq!(f.registry.get(3).unwrap().city_id, -1);

        assert_eq!(f.registry.update_violations_city(2, 1), 1);
        assert_eq!(f.registry.get(3).unwrap().city_id, 1);
    }

    #[test]
    fn test_field_updates() {
        let mut f = fixture();
        assert!(f.registry.mark_as_paid(2));
        assert!(f.registry.get(2).unwrap().paid);
        assert!(f.registry.update_paid(2, false));
        assert!(f.registry.update_driver(2, 2, 2));
        assert!(f.registry.update_fine(2, 1));
        assert!(f.registry.update_date(2, "04.03.2024"));

        let v = f.registry.get(2).unwrap();
        assert_eq!((v.driver_id, v.city_id, v.fine_id), (2, 2, 1));
        assert_eq!(v.date, "04.03.2024");
        assert!(!f.registry.mark_as_paid(42));
    }

    #[test]
    fn test_filters_on_joined_fields() {
        let mut f = fixture();
        f.registry.mark_as_paid(3);

        f.registry.add_filter_code("driver", 2, "Homer Simpson").unwrap();
        assert_eq!(f.registry.apply_filters(&f.drivers, &f.cities, &f.fines).len(), 2);

        f.registry.add_filter_code("amount", 4, "100").unwrap();
        let hits = f.registry.apply_filters(&f.drivers, &f.cities, &f.fines);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fine_type, "Speeding");

        // Removing the driver filter leaves only the amount filter
        f.registry.remove_filter_at(0);
        assert_eq!(f.registry.apply_filters(&f.drivers, &f.cities, &f.fines).len(), 1);

        f.registry.clear_filters();
        f.registry.add_filter_code("paid", 2, "1").unwrap();
        let paid = f.registry.apply_filters(&f.drivers, &f.cities, &f.fines);
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].city_name, "Shelbyville");

        f.registry.clear_filters();
        f.registry.add_filter_code("date", 3, "01.01.2024").unwrap();
        let early = f.registry.apply_filters(&f.drivers, &f.cities, &f.fines);
        assert_eq!(early.len(), 1);
        assert_eq!(early[0].record_id, 3);
    }

    #[test]
    fn test_removing_first_filter_keeps_second() {
        let mut f = fixture();
        f.registry.add_filter_code("fineType", 2, "Parking").unwrap();
        f.registry.add_filter_code("driver", 2, "Homer Simpson").unwrap();

        let ids = |hits: Vec<ViolationInfo>| hits.iter().map(|v| v.record_id).collect::<Vec<_>>();
        assert_eq!(ids(f.registry.apply_filters(&f.drivers, &f.cities, &f.fines)), vec![2]);

        // Only the driver filter remains: both of Homer's violations
        f.registry.remove_filter_at(0);
        assert_eq!(
            ids(f.registry.apply_filters(&f.drivers, &f.cities, &f.fines)),
            vec![2, 1]
        );
    }

    #[test]
    fn test_filter_validation_and_descriptions() {
        let mut f = fixture();
        assert!(f.registry.add_filter("driver", Comparator::Contains, "Homer").is_err());
        assert!(f.registry.add_filter("date", Comparator::Equals, "01.01.2024").is_err());
        assert!(f.registry.add_filter("plate", Comparator::Equals, "X").is_err());
        assert_eq!(f.registry.filter_count(), 0);

        f.registry.add_filter("city", Comparator::Equals, "Springfield").unwrap();
        f.registry.add_filter("amount", Comparator::LessThan, "100").unwrap();
        f.registry.add_filter("date", Comparator::GreaterThan, "01.02.2024").unwrap();
        assert_eq!(f.registry.filter_description(0), "City: Springfield");
        assert_eq!(f.registry.filter_description(1), "Amount < 100");
        assert_eq!(f.registry.filter_description(2), "Date > 01.02.2024");
        assert_eq!(f.registry.filter_description(3), "");
    }

    #[test]
    fn test_persisted_line_format() {
        let mut f = fixture();
        f.registry.mark_as_paid(1);
        let line = crate::codec::encode_line(f.registry.get(1).unwrap()).unwrap();
        assert_eq!(line, "1 1 1 1 1 \"10.01.2024\"");

        let back: Violation = crate::codec::decode_line("7 -1 2 3 0 \"01.01.2020\"").unwrap();
        assert_eq!(back.driver_id, -1);
        assert!(!back.paid);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.txt");

        let mut registry = ViolationRegistry::new(&path);
        registry.add_violation(1, 1, 1, "01.01.2024");
        registry.add_violation(2, -1, 1, "02.01.2024");
        registry.mark_as_paid(2);
        registry.save_to_file().unwrap();

        let mut loaded = ViolationRegistry::new(&path);
        assert_eq!(loaded.load().unwrap(), 2);
        let original: Vec<Violation> = registry.iter().cloned().collect();
        let reloaded: Vec<Violation> = loaded.iter().cloned().collect();
        assert_eq!(original, reloaded);
    }
}
