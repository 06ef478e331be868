//! Schema Migration CLI
//!
//! Upgrades and downgrades JSON documents using migration manifests.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use schema_migrations::document::to_json_string;
use schema_migrations::{
    DocumentMigrator, MigrationConfig, MigrationManifest, SchemaRegistry, VersionTargets,
};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-migrate")]
#[command(about = "Upgrade and downgrade versioned schema documents")]
struct Cli {
    /// Config file (defaults to schema-migrate.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    /// Migration manifest to load (repeatable, added to configured manifests)
    #[arg(short, long)]
    manifest: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upgrade a document to the current schema versions
    Upgrade {
        /// Input JSON document
        input: PathBuf,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Downgrade a document for an older reader
    Downgrade {
        /// Input JSON document
        input: PathBuf,
        /// Target version as Name=N (repeatable)
        #[arg(short, long, value_parser = parse_target)]
        target: Vec<(String, u32)>,
        /// Use the version targets of a named release
        #[arg(short, long)]
        release: Option<String>,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the current version of every schema
    Versions,

    /// Show the named releases and their targets
    Releases,

    /// List the schema labels found in a document
    Inspect {
        /// Input JSON document
        input: PathBuf,
    },
}

fn parse_target(s: &str) -> Result<(String, u32), String> {
    let (name, version) = s
        .split_once('=')
        .ok_or_else(|| format!("expected Name=N, got '{}'", s))?;
    let version: u32 = version
        .parse()
        .map_err(|_| format!("invalid version in '{}'", s))?;
    if name.is_empty() || version == 0 {
        return Err(format!("invalid target '{}'", s));
    }
    Ok((name.to_string(), version))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = MigrationConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    let mut registry = SchemaRegistry::with_options(config.registry_options());
    for path in config.manifests.paths.iter().chain(cli.manifest.iter()) {
        MigrationManifest::load(path)
            .and_then(|manifest| manifest.apply(&mut registry))
            .with_context(|| format!("loading manifest {}", path.display()))?;
    }
    info!(schemas = registry.len(), "Registry ready");

    let docs = DocumentMigrator::new(&registry, config.document_options());

    match cli.command {
        Commands::Upgrade { input, output } => {
            let content = read_input(&input)?;
            let (value, report) = docs.read_str(&content)?;
            let rendered = to_json_string(&value, config.document.indent)?;
            write_output(output.as_deref(), &rendered)?;
            eprintln!(
                "✅ Upgraded {} of {} tagged objects",
                report.migrations.len(),
                report.objects_seen
            );
            for label in &report.unknown {
                eprintln!("  ⚠️  unknown schema {} passed through", label);
            }
            Ok(())
        }

        Commands::Downgrade { input, target, release, output } => {
            let mut targets = match &release {
                Some(release) => registry.release_targets(release)?.clone(),
                None => VersionTargets::new(),
            };
            targets.extend(target);
            if targets.is_empty() {
                bail!("no targets given; use --target Name=N or --release");
            }

            let content = read_input(&input)?;
            let value: Value = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", input.display()))?;
            let (value, report) = docs.downgrade_value(value, &targets)?;
            let rendered = to_json_string(&value, config.document.indent)?;
            write_output(output.as_deref(), &rendered)?;
            eprintln!(
                "✅ Downgraded {} of {} tagged objects",
                report.migrations.len(),
                report.objects_seen
            );
            Ok(())
        }

        Commands::Versions => {
            let versions = registry.type_version_map();
            if versions.is_empty() {
                println!("No schemas registered.");
            } else {
                println!("📚 Schema versions:");
                for (name, version) in versions {
                    println!("  {}.{}", name, version);
                }
            }
            Ok(())
        }

        Commands::Releases => {
            let releases = registry.releases();
            if releases.is_empty() {
                println!("No releases registered.");
            }
            for (label, targets) in releases {
                println!("📦 {}", label);
                for (name, version) in targets {
                    println!("  {}.{}", name, version);
                }
            }
            Ok(())
        }

        Commands::Inspect { input } => {
            let content = read_input(&input)?;
            let value: Value = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", input.display()))?;

            for label in docs.labels(&value)? {
                match registry.current_version(&label.name) {
                    Ok(current) if current > label.version => {
                        println!("  ⬆️  {} (current {})", label, current);
                    }
                    Ok(current) if current < label.version => {
                        println!("  ❌ {} (newer than current {})", label, current);
                    }
                    Ok(_) => println!("  ✅ {}", label),
                    Err(_) => println!("  ❓ {} (unknown schema)", label),
                }
            }
            Ok(())
        }
    }
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn write_output(path: Option<&Path>, content: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => fs::write(path, content).with_context(|| format!("writing {}", path.display())),
        None => {
            println!("{}", content);
            Ok(())
        }
    }
}
