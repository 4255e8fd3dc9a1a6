use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use traffic_fines::{DatabaseManager, PopulationGrade, SettlementType, Severity, StoreConfig};

/// Traffic fines database: cities, drivers, fines and recorded violations
#[derive(Parser, Debug)]
#[command(name = "traffic-fines")]
#[command(about = "Manage the traffic fines flat-file database")]
struct Args {
    /// JSON store configuration
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding the table files (overrides the config)
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TableName {
    Cities,
    Drivers,
    Fines,
    Violations,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every record of a table, newest first
    List { table: TableName },

    AddCity {
        name: String,
        population: u64,
        /// Small, Medium or Large
        #[arg(long, default_value = "Small")]
        grade: String,
        /// City, Town or Village
        #[arg(long = "type", default_value = "City")]
        settlement_type: String,
    },

    AddDriver {
        full_name: String,
        /// DD.MM.YYYY
        birth_date: String,
        city: String,
    },

    AddFine {
        fine_type: String,
        amount: f64,
        /// Light, Medium or Heavy
        #[arg(long, default_value = "Light")]
        severity: String,
    },

    /// Record a violation for the driver with this (unambiguous) name
    AddViolation {
        driver: String,
        fine_type: String,
        /// DD.MM.YYYY
        date: String,
    },

    /// Mark a violation as paid
    Pay { record_id: i64 },

    DeleteCity { name: String },

    DeleteDriver { id: i64 },

    DeleteFine { fine_type: String },

    /// Merge the database stored in the `<table><suffix>.txt` files
    Merge {
        #[arg(long)]
        suffix: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    setup_tracing(args.verbose);

    let mut config = match &args.config {
        Some(path) => StoreConfig::from_file(path)?,
        None => StoreConfig::default(),
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    let mut db = DatabaseManager::new(config);
    db.load_all().context("Failed to load database")?;

    run(&mut db, args.command)
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("traffic_fines=debug,info")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(db: &mut DatabaseManager, command: Command) -> Result<()> {
    match command {
        Command::List { table } => list(db, table),

        Command::AddCity {
            name,
            population,
            grade,
            settlement_type,
        } => {
            let id = db.add_city(
                &name,
                population,
                PopulationGrade::parse(&grade),
                SettlementType::parse(&settlement_type),
            )?;
            println!("✓ City {:?} has id {}", name, id);
            Ok(())
        }

        Command::AddDriver {
            full_name,
            birth_date,
            city,
        } => {
            let id = db.add_driver(&full_name, &birth_date, &city)?;
            println!("✓ Added driver {:?} with id {}", full_name, id);
            Ok(())
        }

        Command::AddFine {
            fine_type,
            amount,
            severity,
        } => {
            let id = db.add_fine(&fine_type, amount, Severity::parse(&severity))?;
            println!("✓ Added fine {:?} with id {}", fine_type, id);
            Ok(())
        }

        Command::AddViolation {
            driver,
            fine_type,
            date,
        } => {
            let id = db.add_violation_by_name(&driver, &fine_type, &date)?;
            println!("✓ Recorded violation {}", id);
            Ok(())
        }

        Command::Pay { record_id } => {
            report(db.mark_fine_as_paid(record_id)?, "Violation", record_id, "marked as paid")
        }

        Command::DeleteCity { name } => report(db.delete_city(&name)?, "City", name, "deleted"),

        Command::DeleteDriver { id } => report(db.delete_driver_by_id(id)?, "Driver", id, "deleted"),

        Command::DeleteFine { fine_type } => {
            report(db.delete_fine(&fine_type)?, "Fine", fine_type, "deleted")
        }

        Command::Merge { suffix } => {
            let suffix = suffix.unwrap_or_else(|| db.config().external_suffix.clone());
            println!("🔀 Merging external database (suffix {:?})...", suffix);

            db.load_external_tables(&suffix)
                .with_context(|| format!("Failed to load external tables with suffix {:?}", suffix))?;
            let merge = db.merge_external_tables()?;

            println!("✓ {}", merge.summary());
            for warning in &merge.warnings {
                println!("  ⚠️  {}", warning);
            }
            Ok(())
        }
    }
}

fn report(done: bool, entity: &str, key: impl std::fmt::Debug, action: &str) -> Result<()> {
    if done {
        println!("✓ {} {:?} {}", entity, key, action);
    } else {
        println!("❌ {} {:?} not found", entity, key);
    }
    Ok(())
}

fn list(db: &DatabaseManager, table: TableName) -> Result<()> {
    match table {
        TableName::Cities => {
            println!("🏙️  Cities ({})", db.cities().len());
            for c in db.cities().iter() {
                println!(
                    "  {:>4}  {:<24} {:>10}  {:<6}  {}",
                    c.id, c.name, c.population, c.grade, c.settlement_type
                );
            }
        }
        TableName::Drivers => {
            println!("🚗 Drivers ({})", db.drivers().len());
            for d in db.drivers().iter() {
                println!(
                    "  {:>4}  {:<28} {}  {}",
                    d.id,
                    d.full_name,
                    d.birth_date,
                    db.cities().name_by_id(d.city_id)
                );
            }
        }
        TableName::Fines => {
            println!("💸 Fines ({})", db.fines().len());
            for f in db.fines().iter() {
                println!("  {:>4}  {:<24} {:>10.2}  {}", f.id, f.fine_type, f.amount, f.severity);
            }
        }
        TableName::Violations => {
            let all = db.get_all_violations();
            println!("📋 Violations ({})", all.len());
            for v in all {
                println!(
                    "  {:>4}  {}  {:<24} {:<16} {:<20} {:>10.2}  {}",
                    v.record_id,
                    v.date,
                    v.driver_name,
                    v.city_name,
                    v.fine_type,
                    v.fine_amount,
                    if v.paid { "paid" } else { "unpaid" }
                );
            }
        }
    }
    Ok(())
}
