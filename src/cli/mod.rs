//! `isolated` command line.
//!
//! Commands for encoding, checking and inspecting job declarations and
//! artifact bundles.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;

use crate::configuration::Configuration;
use crate::context::ContextManager;
use crate::driver::DriverCatalog;
use crate::library::{ArtifactManifest, ArtifactStager, LibraryManager, LocalStager, validate_artifact};
use crate::registry::{Location, Registries, Snapshot, SnapshotKeys};
use crate::settings::{DEFAULT_KEY_PREFIX, IsolationSettings};

#[derive(Parser, Debug)]
#[command(name = "isolated", version, about = "Inspect isolated driver job declarations")]
pub struct Cli {
    /// Prefix of the flat snapshot namespace
    #[arg(long, global = true, env = "ISOLATED_KEY_PREFIX", default_value = DEFAULT_KEY_PREFIX)]
    pub prefix: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Encode a declarative job description as flat key/value JSON
    Encode {
        /// Job description (JSON)
        file: PathBuf,
    },

    /// Check that every reference in a job resolves
    Validate {
        /// Job description (JSON)
        file: PathBuf,

        /// Read FILE as flat key/value JSON instead
        #[arg(long)]
        flat: bool,

        /// Also check every artifact's archive header and manifest
        #[arg(long)]
        artifacts: bool,
    },

    /// Print the merged configuration a spec's driver would receive
    Merged {
        /// Job description (JSON)
        file: PathBuf,

        /// Spec id
        spec: String,

        /// Read FILE as flat key/value JSON instead
        #[arg(long)]
        flat: bool,
    },

    /// Print an artifact bundle's class manifest
    Inspect {
        /// Path to the bundle
        path: PathBuf,
    },
}

/// A job as written by hand: declarations plus global configuration.
#[derive(Debug, Default, Deserialize)]
struct JobDescription {
    #[serde(default)]
    conf: Configuration,
    #[serde(flatten)]
    snapshot: Snapshot,
}

/// Run a CLI command.
pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let keys = SnapshotKeys::new(cli.prefix.clone());
    match cli.command {
        Command::Encode { file } => encode(&file, &keys),
        Command::Validate {
            file,
            flat,
            artifacts,
        } => validate(&file, flat, artifacts, &keys),
        Command::Merged { file, spec, flat } => merged(&file, &spec, flat, &cli.prefix, &keys),
        Command::Inspect { path } => inspect(&path),
    }
}

/// Load `file` as global configuration plus the declarations it carries.
fn load(file: &Path, flat: bool, keys: &SnapshotKeys) -> anyhow::Result<(Configuration, Snapshot)> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    if flat {
        let conf: Configuration = serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a flat key/value object", file.display()))?;
        let snapshot = keys.read(&conf)?;
        Ok((conf, snapshot))
    } else {
        let job: JobDescription = serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a job description", file.display()))?;
        Ok((job.conf, job.snapshot))
    }
}

fn encode(file: &Path, keys: &SnapshotKeys) -> anyhow::Result<()> {
    let (mut conf, snapshot) = load(file, false, keys)?;
    Registries::from_snapshot(snapshot.clone())?;
    keys.write(&snapshot, &mut conf);
    println!("{}", serde_json::to_string_pretty(&conf)?);
    Ok(())
}

fn validate(file: &Path, flat: bool, artifacts: bool, keys: &SnapshotKeys) -> anyhow::Result<()> {
    let (_, snapshot) = load(file, flat, keys)?;
    let registries = Registries::from_snapshot(snapshot)?;

    println!(
        "{} libraries, {} drivers, {} specs",
        registries.libraries().count(),
        registries.drivers().count(),
        registries.specs().count()
    );
    println!("  inputs: {}", registries.input_spec_ids().join(", "));
    println!("  output: {}", registries.output_spec_id().unwrap_or("-"));

    if artifacts {
        for library in registries.libraries() {
            for location in library.artifacts() {
                let manifest = check_artifact(location)?;
                println!(
                    "  {} {} ({} classes)",
                    library.id(),
                    location,
                    manifest.classes.len()
                );
            }
        }
    }

    println!("OK");
    Ok(())
}

fn check_artifact(location: &Location) -> anyhow::Result<ArtifactManifest> {
    let path = LocalStager.stage(location)?;
    validate_artifact(location, &path)?;
    Ok(ArtifactManifest::read(location, &path)?)
}

fn merged(file: &Path, spec: &str, flat: bool, prefix: &str, keys: &SnapshotKeys) -> anyhow::Result<()> {
    let (conf, snapshot) = load(file, flat, keys)?;
    let settings = IsolationSettings::from_env().with_key_prefix(prefix);
    let libraries = Arc::new(LibraryManager::new(settings, DriverCatalog::global()));
    let manager = ContextManager::from_snapshot(conf, snapshot, libraries)?;

    let merged = manager.merged_configuration(spec)?;
    let visible: Configuration = merged
        .iter()
        .filter(|(key, _)| !key.starts_with(&format!("{}.", prefix)))
        .collect();

    println!("{}", serde_json::to_string_pretty(&visible)?);
    Ok(())
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let location = Location::from(path.to_path_buf());
    let manifest = check_artifact(&location)?;

    if manifest.classes.is_empty() {
        println!("{} declares no classes", location);
        return Ok(());
    }

    let width = manifest.classes.keys().map(String::len).max().unwrap_or(0);
    for (class_name, symbol) in &manifest.classes {
        println!("  {:width$}  {}", class_name, symbol, width = width);
    }
    Ok(())
}
