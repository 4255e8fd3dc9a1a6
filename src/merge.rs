// 🔀 Merge Engine - fold a second database into the primary one
//
// Records are matched by natural key, never by id, since the two databases
// assign ids independently:
//   city      -> name
//   driver    -> (full name, birth date, city)
//   fine      -> type
//   violation -> (driver name, city name, fine type, date)
// A match takes the external values for its mergeable fields; anything
// unmatched is inserted with a fresh primary id. Running the same merge
// twice leaves the primary tables as they were after the first run.

use crate::entities::{PopulationGrade, SettlementType, ViolationInfo};
use crate::manager::Tables;
use serde::{Deserialize, Serialize};

// ============================================================================
// MERGE REPORT
// ============================================================================

/// Added / updated / skipped counts for one entity type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeCounts {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl MergeCounts {
    pub fn total(&self) -> usize {
        self.added + self.updated + self.skipped
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub cities: MergeCounts,
    pub drivers: MergeCounts,
    pub fines: MergeCounts,
    pub violations: MergeCounts,

    /// Cities created only because an external driver lived there
    pub placeholder_cities: usize,

    /// Why each skipped record was skipped
    pub warnings: Vec<String>,
}

impl MergeReport {
    pub fn added(&self) -> usize {
        self.cities.added + self.drivers.added + self.fines.added + self.violations.added
    }

    pub fn skipped(&self) -> usize {
        self.cities.skipped + self.drivers.skipped + self.fines.skipped + self.violations.skipped
    }

    /// External records looked at, whatever happened to them
    pub fn processed(&self) -> usize {
        self.cities.total() + self.drivers.total() + self.fines.total() + self.violations.total()
    }

    pub fn summary(&self) -> String {
        format!(
            "Merge: cities +{} ~{}, drivers +{} ~{} !{}, fines +{} ~{} !{}, violations +{} ~{} !{} ({} placeholder cities)",
            self.cities.added,
            self.cities.updated,
            self.drivers.added,
            self.drivers.updated,
            self.drivers.skipped,
            self.fines.added,
            self.fines.updated,
            self.fines.skipped,
            self.violations.added,
            self.violations.updated,
            self.violations.skipped,
            self.placeholder_cities
        )
    }

    fn skip(&mut self, warning: String) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }
}

// ============================================================================
// MERGE
// ============================================================================

/// Merge `external` into `primary` in dependency order: cities, drivers,
/// fines, then violations. Nothing is saved here.
pub fn merge_tables(primary: &mut Tables, external: &Tables) -> MergeReport {
    let mut report = MergeReport::default();

    merge_cities(primary, external, &mut report);
    merge_drivers(primary, external, &mut report);
    merge_fines(primary, external, &mut report);
    merge_violations(primary, external, &mut report);

    tracing::info!(
        processed = report.processed(),
        added = report.added(),
        skipped = report.skipped(),
        "Merge finished"
    );
    report
}

fn merge_cities(primary: &mut Tables, external: &Tables, report: &mut MergeReport) {
    for ext in external.cities.iter() {
        let id = primary.cities.id_by_name(&ext.name);
        if id == -1 {
            match primary
                .cities
                .add_city(&ext.name, ext.population, ext.grade, ext.settlement_type)
            {
                Ok(_) => report.cities.added += 1,
                Err(err) => {
                    report.cities.skipped += 1;
                    report.skip(format!("City {:?} skipped: {}", ext.name, err));
                }
            }
        } else {
            primary.cities.update_population(id, ext.population);
            primary.cities.update_grade(id, ext.grade);
            primary.cities.update_type(id, ext.settlement_type);
            report.cities.updated += 1;
        }
    }
}

/// Primary id of the external city `external_city_id`. A city the driver
/// references but the primary side lacks is created with default attributes;
/// a dangling external reference stays -1.
fn resolve_city(primary: &mut Tables, external: &Tables, external_city_id: i64, report: &mut MergeReport) -> i64 {
    let name = external.cities.name_by_id(external_city_id);
    if name.is_empty() {
        return -1;
    }

    let id = primary.cities.id_by_name(&name);
    if id != -1 {
        return id;
    }

    match primary
        .cities
        .add_city(&name, 0, PopulationGrade::Small, SettlementType::City)
    {
        Ok(id) => {
            report.placeholder_cities += 1;
            id
        }
        Err(_) => -1,
    }
}

fn merge_drivers(primary: &mut Tables, external: &Tables, report: &mut MergeReport) {
    for ext in external.drivers.iter() {
        let city_id = resolve_city(primary, external, ext.city_id, report);
        let id = primary
            .drivers
            .driver_id(&ext.full_name, Some(&ext.birth_date), Some(city_id));

        if id == -1 {
            match primary.drivers.add_driver(&ext.full_name, &ext.birth_date, city_id) {
                Ok(_) => report.drivers.added += 1,
                Err(err) => {
                    report.drivers.skipped += 1;
                    report.skip(format!("Driver {:?} skipped: {}", ext.full_name, err));
                }
            }
        } else {
            primary.drivers.update_name(id, &ext.full_name);
            primary.drivers.update_birth_date(id, &ext.birth_date);
            primary.drivers.update_city(id, city_id);
            report.drivers.updated += 1;
        }
    }
}

fn merge_fines(primary: &mut Tables, external: &Tables, report: &mut MergeReport) {
    for ext in external.fines.iter() {
        let id = primary.fines.id_by_type(&ext.fine_type);
        if id == -1 {
            match primary.fines.add_fine(&ext.fine_type, ext.amount, ext.severity) {
                Ok(_) => report.fines.added += 1,
                Err(err) => {
                    report.fines.skipped += 1;
                    report.skip(format!("Fine {:?} skipped: {}", ext.fine_type, err));
                }
            }
        } else if primary.fines.update_amount(id, ext.amount) {
            primary.fines.update_severity(id, ext.severity);
            report.fines.updated += 1;
        } else {
            report.fines.skipped += 1;
            report.skip(format!("Fine {:?} not updated: invalid amount {}", ext.fine_type, ext.amount));
        }
    }
}

fn same_violation(a: &ViolationInfo, b: &ViolationInfo) -> bool {
    a.driver_name == b.driver_name
        && a.city_name == b.city_name
        && a.fine_type == b.fine_type
        && a.date == b.date
}

fn merge_violations(primary: &mut Tables, external: &Tables, report: &mut MergeReport) {
    for ext in external.all_violations() {
        let existing = primary
            .all_violations()
            .into_iter()
            .find(|mine| same_violation(mine, &ext));

        if let Some(mine) = existing {
            primary.registry.update_paid(mine.record_id, ext.paid);
            let fine_id = primary.fines.id_by_type(&ext.fine_type);
            if fine_id != -1 {
                primary.registry.update_fine(mine.record_id, fine_id);
            }
            report.violations.updated += 1;
            continue;
        }

        // Drivers were merged under their home city, which need not be the
        // city the violation happened in
        let ext_driver = external.drivers.get(ext.driver_id);
        let birth_date = ext_driver.map(|d| d.birth_date.clone());
        let home_city_id = ext_driver
            .map(|d| external.cities.name_by_id(d.city_id))
            .filter(|name| !name.is_empty())
            .map_or(-1, |name| primary.cities.id_by_name(&name));
        let driver_id = primary
            .drivers
            .driver_id(&ext.driver_name, birth_date.as_deref(), Some(home_city_id));
        let city_id = primary.cities.id_by_name(&ext.city_name);
        let fine_id = primary.fines.id_by_type(&ext.fine_type);

        // A named referent that cannot be found would be re-inserted on every
        // merge, since its joined name would never match again
        if (driver_id == -1 && !ext.driver_name.is_empty())
            || (fine_id == -1 && !ext.fine_type.is_empty())
        {
            report.violations.skipped += 1;
            report.skip(format!(
                "Violation {} ({} / {} / {}) skipped: unresolved driver or fine",
                ext.record_id, ext.driver_name, ext.fine_type, ext.date
            ));
            continue;
        }

        let record_id = primary.registry.add_violation(driver_id, city_id, fine_id, &ext.date);
        if ext.paid {
            primary.registry.mark_as_paid(record_id);
        }
        report.violations.added += 1;
    }
}

// ============================================================================
// TESTS
// ============================================================================
