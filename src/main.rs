use std::path::PathBuf;

use clap::{Parser, Subcommand};

use studyguard_lib::{config::EngineConfig, utils::logging};

#[derive(Parser)]
#[command(name = "studyguard", version, about = "Weekly timetable reminders with a focus guard")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reminder engine until Ctrl-C (default)
    Run,
    /// Import a timetable from a JSON file
    Import {
        file: PathBuf,
        /// Make the imported timetable the active one
        #[arg(long)]
        activate: bool,
    },
    /// Print timetables, armed alarms and job queue counts
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(2);
        }
    };
    logging::init(config.debug);

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => studyguard_lib::run(config).await,
        Commands::Import { file, activate } => {
            studyguard_lib::import(&config, &file, activate)
                .await
                .map(|timetable| {
                    println!("imported '{}' as timetable {}", timetable.name, timetable.id);
                })
        }
        Commands::Status => match studyguard_lib::status(&config).await {
            Ok(report) => serde_json::to_string_pretty(&report)
                .map(|json| println!("{json}"))
                .map_err(anyhow::Error::from),
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
