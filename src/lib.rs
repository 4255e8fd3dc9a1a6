// Traffic Fines Database - Core Library
// Exposes the tables, the manager and the merge engine to the CLI and tests

pub mod error;
pub mod index;      // Open-addressing id index
pub mod filter;     // Filter chains shared by every table
pub mod codec;      // Space-separated, quoted record lines
pub mod dates;      // DD.MM.YYYY and age arithmetic
pub mod config;
pub mod table;      // Generic record table
pub mod entities;   // City, Driver, Fine, Violation
pub mod manager;    // Cross-table operations and cascades
pub mod merge;      // Two-database merge

// Re-export commonly used types
pub use error::{DbError, Result};
pub use index::KeyedIndex;
pub use filter::{Comparator, Filter, FilterChain, Filterable};
pub use config::{StoreConfig, TablePaths};
pub use table::{Cursor, Matches, Record, Table};
pub use entities::{
    City, CityTable, PopulationGrade, SettlementType,
    Driver, DriverTable,
    Fine, FineTable, Severity,
    Violation, ViolationInfo, ViolationRegistry,
};
pub use manager::{DatabaseManager, Tables};
pub use merge::{MergeCounts, MergeReport};
