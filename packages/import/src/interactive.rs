//! Interactive mode for the street import tool.
//!
//! Provides a menu-driven interface using `dialoguer` for running imports
//! without memorizing CLI flags.

use canvass_map_cli_utils::MultiProgress;
use canvass_map_street::profiles::{DEFAULT_PROFILE_ID, all_profiles};
use canvass_map_street_models::DistrictId;
use canvass_map_street_models::profile::ImportProfile;
use dialoguer::{Confirm, MultiSelect, Select};

use crate::{ImportOptions, format_profiles, format_regions, format_report, migrate, run_import};

/// Top-level actions available in the import menu.
enum ImportAction {
    ImportStreets,
    ListProfiles,
    ShowDistricts,
    RunMigrations,
}

impl ImportAction {
    const ALL: &[Self] = &[
        Self::ImportStreets,
        Self::ListProfiles,
        Self::ShowDistricts,
        Self::RunMigrations,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::ImportStreets => "Import streets",
            Self::ListProfiles => "List import profiles",
            Self::ShowDistricts => "Show district query regions",
            Self::RunMigrations => "Run database migrations",
        }
    }
}

/// Prompts for an action and runs it.
///
/// # Errors
///
/// Returns an error if a prompt fails or the selected operation fails.
pub async fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Canvass Map Street Import");
    println!();

    let labels: Vec<&str> = ImportAction::ALL.iter().map(ImportAction::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match ImportAction::ALL[idx] {
        ImportAction::ImportStreets => import_streets(multi).await?,
        ImportAction::ListProfiles => print!("{}", format_profiles()),
        ImportAction::ShowDistricts => {
            let profile = select_profile()?;
            print!("{}", format_regions(&profile));
        }
        ImportAction::RunMigrations => migrate().await?,
    }

    Ok(())
}

async fn import_streets(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let profile = select_profile()?;

    let districts: Vec<DistrictId> = DistrictId::all().collect();
    let labels: Vec<String> = districts.iter().map(|d| d.label()).collect();
    let checked = vec![true; districts.len()];
    let selected = MultiSelect::new()
        .with_prompt("Districts to import (space=toggle, a=all, enter=confirm)")
        .items(&labels)
        .defaults(&checked)
        .max_length(20)
        .interact()?;

    if selected.is_empty() {
        println!("No districts selected.");
        return Ok(());
    }

    let dry_run = Confirm::new()
        .with_prompt("Dry run (do not write to the database)?")
        .default(false)
        .interact()?;

    let clear = profile.clear_existing
        && Confirm::new()
            .with_prompt("This profile deletes all existing streets and their statuses first. Continue clearing?")
            .default(true)
            .interact()?;

    let options = ImportOptions {
        profile,
        districts: selected.iter().map(|&i| districts[i]).collect(),
        dry_run,
        keep_existing: !clear,
    };

    let report = run_import(&options, multi).await?;
    print!("{}", format_report(&report));

    Ok(())
}

fn select_profile() -> Result<ImportProfile, dialoguer::Error> {
    let mut profiles = all_profiles();
    let labels: Vec<String> = profiles
        .iter()
        .map(|p| format!("{}: {}", p.id, p.name))
        .collect();
    let default = profiles
        .iter()
        .position(|p| p.id == DEFAULT_PROFILE_ID)
        .unwrap_or(0);

    let idx = Select::new()
        .with_prompt("Import profile")
        .items(&labels)
        .default(default)
        .interact()?;

    Ok(profiles.swap_remove(idx))
}
