// 🗄️ Database Manager - owns the four tables and keeps them consistent
//
// Every mutating call persists the tables it touched before returning.
// There is no batching and no rollback across tables.
//
// Cascades:
//   delete city   -> drivers.city_id = -1, violations.city_id = -1
//   delete driver -> violations.driver_id = -1
//   delete fine   -> nothing (violations keep the dangling fine id)

use crate::config::{StoreConfig, TablePaths};
use crate::dates::{self, Clock};
use crate::entities::{
    CityTable, DriverTable, FineTable, PopulationGrade, SettlementType, Severity, ViolationInfo,
    ViolationRegistry,
};
use crate::error::{DbError, Result};
use crate::merge::{self, MergeReport};

// ============================================================================
// TABLE SET
// ============================================================================

/// One complete set of the four tables, bound to their files.
pub struct Tables {
    pub cities: CityTable,
    pub drivers: DriverTable,
    pub fines: FineTable,
    pub registry: ViolationRegistry,
}

impl Tables {
    pub fn open(paths: &TablePaths, config: &StoreConfig, today: Clock) -> Self {
        Tables {
            cities: CityTable::new(&paths.cities),
            drivers: DriverTable::new(&paths.drivers)
                .with_age_bounds(config.min_driver_age, config.max_driver_age)
                .with_clock(today),
            fines: FineTable::new(&paths.fines),
            registry: ViolationRegistry::new(&paths.registry),
        }
    }

    /// Load all four tables. A table whose file is missing is left as it is
    /// and reported in the log; any other failure aborts.
    pub fn load_all(&mut self) -> Result<()> {
        tolerate_missing(self.cities.load())?;
        tolerate_missing(self.drivers.load())?;
        tolerate_missing(self.fines.load())?;
        tolerate_missing(self.registry.load())?;
        Ok(())
    }

    /// Load all four tables, failing on the first file that cannot be read.
    pub fn load_all_strict(&mut self) -> Result<()> {
        self.cities.load()?;
        self.drivers.load()?;
        self.fines.load()?;
        self.registry.load()?;
        Ok(())
    }

    pub fn save_all(&self) -> Result<()> {
        self.cities.save_to_file()?;
        self.drivers.save_to_file()?;
        self.fines.save_to_file()?;
        self.registry.save_to_file()?;
        Ok(())
    }

    /// Joined view of every violation, newest-first
    pub fn all_violations(&self) -> Vec<ViolationInfo> {
        self.registry.all_joined(&self.drivers, &self.cities, &self.fines)
    }
}

fn tolerate_missing(result: Result<usize>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.is_missing_file() => {
            tracing::warn!(error = %err, "Table file missing, starting empty");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

// ============================================================================
// DATABASE MANAGER
// ============================================================================

pub struct DatabaseManager {
    config: StoreConfig,
    today: Clock,
    primary: Tables,
    external: Option<Tables>,
}

impl DatabaseManager {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, dates::system_today)
    }

    pub fn with_clock(config: StoreConfig, today: Clock) -> Self {
        let primary = Tables::open(&config.primary_paths(), &config, today);
        DatabaseManager {
            config,
            today,
            primary,
            external: None,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn load_all(&mut self) -> Result<()> {
        self.primary.load_all()?;
        tracing::info!(
            cities = self.primary.cities.len(),
            drivers = self.primary.drivers.len(),
            fines = self.primary.fines.len(),
            violations = self.primary.registry.len(),
            "Database loaded"
        );
        Ok(())
    }

    pub fn save_all(&self) -> Result<()> {
        self.primary.save_all()
    }

    // ========================================================================
    // TABLE ACCESS
    // ========================================================================
    //
    // The mutable accessors exist for filter-chain edits. Record changes made
    // through them bypass the cascades and are only persisted by `save_all`.

    pub fn cities(&self) -> &CityTable {
        &self.primary.cities
    }

    pub fn drivers(&self) -> &DriverTable {
        &self.primary.drivers
    }

    pub fn fines(&self) -> &FineTable {
        &self.primary.fines
    }

    pub fn registry(&self) -> &ViolationRegistry {
        &self.primary.registry
    }

    pub fn cities_mut(&mut self) -> &mut CityTable {
        &mut self.primary.cities
    }

    pub fn drivers_mut(&mut self) -> &mut DriverTable {
        &mut self.primary.drivers
    }

    pub fn fines_mut(&mut self) -> &mut FineTable {
        &mut self.primary.fines
    }

    pub fn registry_mut(&mut self) -> &mut ViolationRegistry {
        &mut self.primary.registry
    }

    // ========================================================================
    // CITIES
    // ========================================================================

    pub fn add_city(
        &mut self,
        name: &str,
        population: u64,
        grade: PopulationGrade,
        settlement_type: SettlementType,
    ) -> Result<i64> {
        let id = self.primary.cities.add_city(name, population, grade, settlement_type)?;
        self.primary.cities.save_to_file()?;
        Ok(id)
    }

    /// Delete a city by name and null out every reference to it.
    /// Ok(false) when no city has that name.
    pub fn delete_city(&mut self, name: &str) -> Result<bool> {
        let Some(city) = self.primary.cities.delete_city(name) else {
            return Ok(false);
        };
        let drivers = self.primary.drivers.update_city_references(city.id);
        let violations = self.primary.registry.update_city_references(city.id);
        tracing::info!(name, id = city.id, drivers, violations, "Deleted city");

        self.save_all()?;
        Ok(true)
    }

    pub fn update_city_name(&mut self, id: i64, name: &str) -> Result<bool> {
        let changed = self.primary.cities.update_name(id, name);
        self.save_cities_if(changed)
    }

    pub fn update_city_population(&mut self, id: i64, population: u64) -> Result<bool> {
        let changed = self.primary.cities.update_population(id, population);
        self.save_cities_if(changed)
    }

    pub fn update_city_grade(&mut self, id: i64, grade: PopulationGrade) -> Result<bool> {
        let changed = self.primary.cities.update_grade(id, grade);
        self.save_cities_if(changed)
    }

    pub fn update_city_type(&mut self, id: i64, settlement_type: SettlementType) -> Result<bool> {
        let changed = self.primary.cities.update_type(id, settlement_type);
        self.save_cities_if(changed)
    }

    fn save_cities_if(&self, changed: bool) -> Result<bool> {
        if changed {
            self.primary.cities.save_to_file()?;
        }
        Ok(changed)
    }

    // ========================================================================
    // DRIVERS
    // ========================================================================

    /// Add a driver living in the city called `city_name`, which must exist.
    pub fn add_driver(&mut self, full_name: &str, birth_date: &str, city_name: &str) -> Result<i64> {
        let city_id = self.primary.cities.id_by_name(city_name);
        if city_id == -1 {
            return Err(DbError::validation("City does not exist"));
        }
        let id = self.primary.drivers.add_driver(full_name, birth_date, city_id)?;
        self.primary.drivers.save_to_file()?;
        Ok(id)
    }

    /// Delete a driver and null out its violations' driver id.
    pub fn delete_driver_by_id(&mut self, id: i64) -> Result<bool> {
        if self.primary.drivers.delete_driver_by_id(id).is_none() {
            return Ok(false);
        }
        let violations = self.primary.registry.update_driver_references(id);
        tracing::info!(id, violations, "Deleted driver");

        self.save_all()?;
        Ok(true)
    }

    pub fn update_driver_name(&mut self, id: i64, full_name: &str) -> Result<bool> {
        let changed = self.primary.drivers.update_name(id, full_name);
        if changed {
            self.primary.drivers.save_to_file()?;
        }
        Ok(changed)
    }

    pub fn update_driver_birth_date(&mut self, id: i64, birth_date: &str) -> Result<bool> {
        let changed = self.primary.drivers.update_birth_date(id, birth_date);
        if changed {
            self.primary.drivers.save_to_file()?;
        }
        Ok(changed)
    }

    /// Move a driver to another existing city; the driver's violations follow.
    pub fn update_driver_city(&mut self, id: i64, city_id: i64) -> Result<bool> {
        if !self.primary.cities.exists(city_id) || !self.primary.drivers.update_city(id, city_id) {
            return Ok(false);
        }
        let moved = self.primary.registry.update_violations_city(id, city_id);
        tracing::debug!(id, city_id, moved, "Driver moved city");

        self.primary.drivers.save_to_file()?;
        self.primary.registry.save_to_file()?;
        Ok(true)
    }

    // ========================================================================
    // FINES
    // ========================================================================

    pub fn add_fine(&mut self, fine_type: &str, amount: f64, severity: Severity) -> Result<i64> {
        let id = self.primary.fines.add_fine(fine_type, amount, severity)?;
        self.primary.fines.save_to_file()?;
        Ok(id)
    }

    /// Delete a fine by type. Violations referencing it are left alone.
    pub fn delete_fine(&mut self, fine_type: &str) -> Result<bool> {
        if self.primary.fines.delete_fine(fine_type).is_none() {
            return Ok(false);
        }
        self.primary.fines.save_to_file()?;
        Ok(true)
    }

    pub fn update_fine_type(&mut self, id: i64, fine_type: &str) -> Result<bool> {
        let changed = self.primary.fines.update_type(id, fine_type);
        self.save_fines_if(changed)
    }

    pub fn update_fine_amount(&mut self, id: i64, amount: f64) -> Result<bool> {
        let changed = self.primary.fines.update_amount(id, amount);
        self.save_fines_if(changed)
    }

    pub fn update_fine_severity(&mut self, id: i64, severity: Severity) -> Result<bool> {
        let changed = self.primary.fines.update_severity(id, severity);
        self.save_fines_if(changed)
    }

    fn save_fines_if(&self, changed: bool) -> Result<bool> {
        if changed {
            self.primary.fines.save_to_file()?;
        }
        Ok(changed)
    }

    // ========================================================================
    // VIOLATIONS
    // ========================================================================

    /// The driver must have been at least the minimum age on `date`.
    fn check_age_at(&self, driver_id: i64, date: &str) -> Result<()> {
        if dates::parse_date(date).is_none() {
            return Err(DbError::validation("Incorrect date format"));
        }
        let driver = self
            .primary
            .drivers
            .get(driver_id)
            .ok_or_else(|| DbError::validation(format!("Driver {} does not exist", driver_id)))?;

        let min_age = self.primary.drivers.min_age();
        match driver.age_on(date) {
            Some(age) if age >= min_age => Ok(()),
            _ => Err(DbError::validation(format!(
                "Driver must be at least {} years old on the violation date",
                min_age
            ))),
        }
    }

    /// Record a violation after checking the date, the references, and the
    /// driver's age on that date. Nothing changes when a check fails.
    pub fn add_violation(&mut self, driver_id: i64, city_id: i64, fine_id: i64, date: &str) -> Result<i64> {
        self.check_age_at(driver_id, date)?;
        if !self.primary.fines.exists(fine_id) {
            return Err(DbError::validation(format!("Fine {} does not exist", fine_id)));
        }
        if city_id != -1 && !self.primary.cities.exists(city_id) {
            return Err(DbError::validation(format!("City {} does not exist", city_id)));
        }

        let record_id = self.primary.registry.add_violation(driver_id, city_id, fine_id, date);
        self.primary.registry.save_to_file()?;
        Ok(record_id)
    }

    /// Record a violation for the driver called `driver_name` in the driver's
    /// own city. The name must identify exactly one driver.
    pub fn add_violation_by_name(&mut self, driver_name: &str, fine_type: &str, date: &str) -> Result<i64> {
        let driver_id = self.primary.drivers.driver_id(driver_name, None, None);
        let city_id = self.primary.drivers.city_id_for_driver(driver_name);
        let fine_id = self.primary.fines.id_by_type(fine_type);
        if driver_id == -1 || city_id == -1 || fine_id == -1 {
            return Err(DbError::validation("Invalid data for violation"));
        }
        self.add_violation(driver_id, city_id, fine_id, date)
    }

    pub fn mark_fine_as_paid(&mut self, record_id: i64) -> Result<bool> {
        let changed = self.primary.registry.mark_as_paid(record_id);
        self.save_registry_if(changed)
    }

    pub fn update_violation_paid(&mut self, record_id: i64, paid: bool) -> Result<bool> {
        let changed = self.primary.registry.update_paid(record_id, paid);
        self.save_registry_if(changed)
    }

    /// Reassign a violation to another driver (and that driver's city).
    /// Refused when the new driver was under age on the violation date.
    pub fn update_violation_driver(&mut self, record_id: i64, driver_id: i64) -> Result<bool> {
        let Some(date) = self.primary.registry.get(record_id).map(|v| v.date.clone()) else {
            return Ok(false);
        };
        if let Err(err) = self.check_age_at(driver_id, &date) {
            tracing::debug!(record_id, driver_id, error = %err, "Violation driver change refused");
            return Ok(false);
        }
        let city_id = self.primary.drivers.get(driver_id).map_or(-1, |d| d.city_id);
        let changed = self.primary.registry.update_driver(record_id, driver_id, city_id);
        self.save_registry_if(changed)
    }

    pub fn update_violation_fine(&mut self, record_id: i64, fine_id: i64) -> Result<bool> {
        if !self.primary.fines.exists(fine_id) {
            return Ok(false);
        }
        let changed = self.primary.registry.update_fine(record_id, fine_id);
        self.save_registry_if(changed)
    }

    /// Move a violation to another date. Refused when the date is malformed
    /// or the violation's driver would have been under age on it.
    pub fn update_violation_date(&mut self, record_id: i64, date: &str) -> Result<bool> {
        let Some(driver_id) = self.primary.registry.get(record_id).map(|v| v.driver_id) else {
            return Ok(false);
        };
        if dates::parse_date(date).is_none() {
            return Ok(false);
        }
        // A violation whose driver was deleted has no age to check
        if driver_id != -1 && self.check_age_at(driver_id, date).is_err() {
            return Ok(false);
        }
        let changed = self.primary.registry.update_date(record_id, date);
        self.save_registry_if(changed)
    }

    fn save_registry_if(&self, changed: bool) -> Result<bool> {
        if changed {
            self.primary.registry.save_to_file()?;
        }
        Ok(changed)
    }

    pub fn get_all_violations(&self) -> Vec<ViolationInfo> {
        self.primary.all_violations()
    }

    /// Joined violations passing the registry's filter chain
    pub fn filtered_violations(&self) -> Vec<ViolationInfo> {
        let tables = &self.primary;
        tables
            .registry
            .apply_filters(&tables.drivers, &tables.cities, &tables.fines)
    }

    // ========================================================================
    // MERGE
    // ========================================================================

    /// Reload the primary tables, then load a second database from the
    /// `<stem><suffix>.txt` files. Every external file must be readable.
    pub fn load_external_tables(&mut self, suffix: &str) -> Result<()> {
        self.primary.load_all()?;

        let paths = self.config.external_paths(suffix);
        let mut external = Tables::open(&paths, &self.config, self.today);
        external.load_all_strict()?;

        tracing::info!(
            suffix,
            cities = external.cities.len(),
            drivers = external.drivers.len(),
            fines = external.fines.len(),
            violations = external.registry.len(),
            "External database loaded"
        );
        self.external = Some(external);
        Ok(())
    }

    /// Fold the loaded external database into the primary one and persist
    /// all four tables.
    pub fn merge_external_tables(&mut self) -> Result<MergeReport> {
        let external = self
            .external
            .as_ref()
            .ok_or_else(|| DbError::not_found("External database", "none loaded"))?;

        let report = merge::merge_tables(&mut self.primary, external);
        tracing::info!("{}", report.summary());

        self.save_all()?;
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================
