use dosage_core::config::DataConfig;
use dosage_core::*;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "dosage")]
#[command(about = "Insulin dosage calculator and log", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a reading and compute the suggested dosage
    Log {
        /// Entry type (meal, snack, correction, other)
        entry_type: String,

        /// Blood glucose reading, in the configured unit
        #[arg(long)]
        bg: f64,

        /// Carbohydrates in grams (meal and snack)
        #[arg(long)]
        carbs: Option<f64>,

        /// Print the logged entry as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show logged entries (day, week, 2weeks, month)
    View {
        range: String,
    },

    /// Show or change insulin settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the settings file
    Show,

    /// Change one setting (carb-ratio, isf, unit, target)
    Set { name: String, value: String },

    /// Create the settings file
    Init {
        #[arg(long)]
        carb_ratio: f64,

        #[arg(long)]
        isf: i32,

        /// mmol/L or mg/dL
        #[arg(long, default_value = "mmol/L")]
        unit: String,

        /// Target blood glucose, in `unit`
        #[arg(long)]
        target: f64,
    },
}

fn main() {
    // Logs go to stderr; keep them quiet unless RUST_LOG asks
    dosage_core::logging::init_with_level("warn");

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let mut data = config.data;
    if let Some(dir) = cli.data_dir {
        data.data_dir = dir;
    }

    match cli.command {
        Commands::Log {
            entry_type,
            bg,
            carbs,
            json,
        } => cmd_log(&data, &entry_type, bg, carbs, json),
        Commands::View { range } => cmd_view(&data, &range),
        Commands::Settings { action } => cmd_settings(&data, action),
    }
}

fn cmd_log(
    data: &DataConfig,
    entry_type: &str,
    bg: f64,
    carbs: Option<f64>,
    json: bool,
) -> Result<()> {
    let entry_type: EntryType = entry_type.parse()?;

    if !bg.is_finite() || bg < 0.0 {
        return Err(Error::InvalidInput(format!("blood glucose level {}", bg)));
    }
    let carbs = match (entry_type.takes_carbs(), carbs) {
        (true, None) => {
            return Err(Error::InvalidInput(format!(
                "--carbs is required for a {} entry",
                entry_type
            )));
        }
        (true, Some(c)) if !c.is_finite() || c < 0.0 => {
            return Err(Error::InvalidInput(format!("carbohydrate amount {}", c)));
        }
        (false, Some(_)) => {
            tracing::warn!("Ignoring --carbs for a {} entry", entry_type);
            None
        }
        (_, carbs) => carbs,
    };

    let settings = InsulinSettings::load(&data.config_store())?;
    let entry = prepare_entry(&settings, entry_type, bg, carbs);

    let mut store = data.log_store();
    let now = chrono::Local::now().naive_local();
    store.append(&entry, now)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    println!("✓ Logged {} entry", entry.entry_type);
    if let Some(dosage) = entry.suggested_dosage() {
        println!("\nSuggested Insulin Dosage: {:.2} units", dosage);
    }
    Ok(())
}

fn cmd_view(data: &DataConfig, range: &str) -> Result<()> {
    let filter: TimeFilter = range.parse()?;
    let store = data.log_store();

    if !store.path().exists() {
        println!("No log entries yet.");
        return Ok(());
    }

    let unit = settings::display_unit(&data.config_store()).or_else(|e| match e {
        // No settings file yet: show stored mmol/L values
        Error::Io(_) => Ok(GlucoseUnit::MmolPerL),
        other => Err(other),
    })?;

    for line in store.query(filter, unit)? {
        match line {
            Ok(line) => {
                if record::RecordLine::is_header(&line) {
                    println!();
                }
                println!("{}", line);
            }
            Err(Error::Parse { line, message }) => {
                eprintln!("Error parsing log line {}: {}", line, message);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn cmd_settings(data: &DataConfig, action: SettingsAction) -> Result<()> {
    let store = data.config_store();

    match action {
        SettingsAction::Show => {
            println!("Insulin Settings");
            print!("{}", store.list()?);
        }
        SettingsAction::Set { name, value } => {
            let setting: Setting = name.parse()?;
            let value = setting.validate(&value)?;
            store.update(setting.key(), &value)?;
            println!("✓ {} set to {}", setting, value);
        }
        SettingsAction::Init {
            carb_ratio,
            isf,
            unit,
            target,
        } => {
            let unit: GlucoseUnit = unit.parse()?;
            let settings = InsulinSettings::new(carb_ratio, isf, unit, target)?;

            store.initialize(&settings.to_pairs())?;
            println!("✓ Created {}", store.path().display());
        }
    }
    Ok(())
}
