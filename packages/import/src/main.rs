#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the street import tool.

use std::path::PathBuf;
use std::time::Instant;

use canvass_map_import::{
    ImportOptions, format_profiles, format_regions, format_report, load_profile, migrate,
    parse_districts, run_import,
};
use canvass_map_street::profiles::DEFAULT_PROFILE_ID;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "canvass_map_import", about = "Paris street import tool")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import streets from `OpenStreetMap`
    Import {
        /// Import profile id (see `profiles`)
        #[arg(long, default_value = DEFAULT_PROFILE_ID)]
        profile: String,
        /// Read the profile from a TOML file instead of the built-in set
        #[arg(long)]
        profile_file: Option<PathBuf>,
        /// Comma-separated district numbers (e.g., "1,4,11"). All if omitted.
        #[arg(long)]
        districts: Option<String>,
        /// Fetch and normalize without writing to the database
        #[arg(long)]
        dry_run: bool,
        /// Keep existing streets even if the profile clears them
        #[arg(long)]
        keep_existing: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the built-in import profiles
    Profiles,
    /// Show the query region of every district under a profile
    Districts {
        /// Import profile id
        #[arg(long, default_value = DEFAULT_PROFILE_ID)]
        profile: String,
        /// Read the profile from a TOML file instead of the built-in set
        #[arg(long)]
        profile_file: Option<PathBuf>,
    },
    /// Run database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = canvass_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return canvass_map_import::interactive::run(&multi).await;
    };

    match command {
        Commands::Import {
            profile,
            profile_file,
            districts,
            dry_run,
            keep_existing,
            json,
        } => {
            let options = ImportOptions {
                profile: load_profile(&profile, profile_file.as_deref())?,
                districts: parse_districts(districts.as_deref())?,
                dry_run,
                keep_existing,
            };

            let start = Instant::now();
            let report = run_import(&options, &multi).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", format_report(&report));
            }
            log::info!("Import finished in {:.1}s", start.elapsed().as_secs_f64());
        }
        Commands::Profiles => print!("{}", format_profiles()),
        Commands::Districts {
            profile,
            profile_file,
        } => {
            let profile = load_profile(&profile, profile_file.as_deref())?;
            print!("{}", format_regions(&profile));
        }
        Commands::Migrate => migrate().await?,
    }

    Ok(())
}
