// Entity Tables
//
// Each table owns its records, its indices and its filter chain:
// - City: unique name, population, grade, settlement type
// - Driver: name (not unique), birth date, city reference
// - Fine: unique type, amount, severity
// - Violation: driver / city / fine references, paid flag, date

pub mod city;
pub mod driver;
pub mod fine;
pub mod violation;

pub use city::{City, CityTable, PopulationGrade, SettlementType};
pub use driver::{Driver, DriverTable};
pub use fine::{Fine, FineTable, Severity};
pub use violation::{Violation, ViolationInfo, ViolationRegistry};
