use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facewatch_core::{BackendKind, Embedding};
use facewatch_engine::{AlertSink, Engine, EngineConfig, JsonLinesSink, LogSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facewatch", version, about = "Face identification against an enrollment store, with watchlist alerts")]
struct Cli {
    /// TOML configuration file (FACEWATCH_* environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log alerts instead of appending them to the data directory's outbox
    #[arg(long, global = true)]
    log_alerts: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an identity from one or more embedding files
    Enroll {
        /// Identity label (e.g., "jane_smith")
        #[arg(short, long)]
        label: String,
        /// Free-form metadata; watchlist keywords are matched against it too
        #[arg(short, long)]
        info: Option<String>,
        /// JSON files, each holding one embedding as an array of numbers
        #[arg(required = true)]
        embeddings: Vec<PathBuf>,
    },
    /// Identify a probe embedding
    Identify {
        /// JSON file holding the probe embedding
        probe: PathBuf,
        /// Detector confidence for the face the probe came from
        #[arg(short, long, default_value_t = 1.0)]
        detection_score: f32,
    },
    /// Remove an enrolled identity
    Remove { label: String },
    /// Remove one reference embedding from an identity
    RemoveEmbedding { label: String, index: usize },
    /// Set or clear (empty string) an identity's metadata
    Info { label: String, info: String },
    /// List enrolled identities
    List,
    /// Show store and alert statistics
    Stats,
    /// Rebuild the search index and save it
    Rebuild,
    /// Rebuild the store on another search backend and save it.
    ///
    /// The backend choice itself lives in the configuration: set `backend`
    /// in the config file (or FACEWATCH_BACKEND) to keep using it.
    Migrate {
        #[arg(long)]
        to: BackendKind,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = EngineConfig::load(cli.config.as_deref()).context("loading configuration")?;

    if let Commands::Config = cli.command {
        print!("{}", toml::to_string_pretty(&config).context("encoding configuration")?);
        return Ok(());
    }
    if let Commands::Migrate { to } = cli.command {
        config.backend = to;
    }

    let sink: Arc<dyn AlertSink> = if cli.log_alerts {
        Arc::new(LogSink)
    } else {
        Arc::new(JsonLinesSink::new(config.alert_outbox()))
    };
    let engine = Engine::open(&config, sink)
        .with_context(|| format!("opening store in {}", config.data_dir.display()))?;

    let result = run(&engine, cli.command);
    let alerts = engine.shutdown();
    tracing::debug!(?alerts, "alert worker stopped");
    result
}

fn run(engine: &Engine, command: Commands) -> Result<()> {
    match command {
        Commands::Enroll {
            label,
            info,
            embeddings,
        } => {
            let embeddings = embeddings
                .iter()
                .map(|path| read_embedding(path))
                .collect::<Result<Vec<_>>>()?;
            let count = embeddings.len();
            engine.enroll(&label, embeddings, info)?;
            engine.save()?;
            println!("Enrolled {label} ({count} embedding(s))");
        }
        Commands::Identify {
            probe,
            detection_score,
        } => {
            let probe = read_embedding(&probe)?;
            let decision = engine.identify(&probe, detection_score);
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Commands::Remove { label } => {
            if engine.remove(&label) {
                engine.save()?;
                println!("Removed {label}");
            } else {
                println!("No identity named {label}");
            }
        }
        Commands::RemoveEmbedding { label, index } => {
            let emptied = engine.remove_embedding(&label, index)?;
            engine.save()?;
            if emptied {
                println!("Removed last embedding of {label}; identity removed");
            } else {
                println!("Removed embedding {index} of {label}");
            }
        }
        Commands::Info { label, info } => {
            engine.set_info(&label, Some(info))?;
            engine.save()?;
        }
        Commands::List => {
            let identities = engine.identities();
            if identities.is_empty() {
                println!("No identities enrolled");
            }
            for identity in identities {
                println!(
                    "{}\t{} embedding(s)\t{}\t{}",
                    identity.label,
                    identity.embeddings,
                    identity.enrolled_at.to_rfc3339(),
                    identity.info.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&engine.stats())?);
        }
        Commands::Rebuild => {
            engine.rebuild_index();
            engine.save()?;
            print_store_summary(engine);
        }
        Commands::Migrate { to } => {
            engine.rebuild_index();
            engine.save()?;
            print_store_summary(engine);
            println!("Set this in the configuration file to keep the {to} backend:");
            println!("  {}", backend_setting(to));
            println!("(or export FACEWATCH_BACKEND={to})");
        }
        // Printed before the engine is opened.
        Commands::Config => {}
    }
    Ok(())
}

fn print_store_summary(engine: &Engine) {
    let stats = engine.stats();
    println!(
        "Store on {} backend: {} identities, {} index list(s)",
        stats.backend, stats.identities, stats.index_lists
    );
}

/// Config file line selecting `kind`.
fn backend_setting(kind: BackendKind) -> String {
    format!("backend = \"{kind}\"")
}

fn read_embedding(path: &Path) -> Result<Embedding> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let values: Vec<f32> = serde_json::from_str(&text)
        .with_context(|| format!("{}: expected a JSON array of numbers", path.display()))?;
    if values.is_empty() {
        bail!("{}: embedding is empty", path.display());
    }
    Ok(Embedding::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_setting_is_valid_config() {
        for kind in [BackendKind::Linear, BackendKind::Indexed] {
            let config: EngineConfig = toml::from_str(&backend_setting(kind)).unwrap();
            assert_eq!(config.backend, kind);
        }
    }

    #[test]
    fn test_backend_env_value_round_trips() {
        for kind in [BackendKind::Linear, BackendKind::Indexed] {
            let value = kind.to_string();
            let mut config = EngineConfig::default();
            config.apply_overrides(|key| (key == "FACEWATCH_BACKEND").then(|| value.clone()));
            assert_eq!(config.backend, kind);
        }
    }

    #[test]
    fn test_migrate_parses_backend() {
        let cli = Cli::try_parse_from(["facewatch", "migrate", "--to", "indexed"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Migrate {
                to: BackendKind::Indexed
            }
        ));
    }
}
