use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use vigil_core::{DistanceMatcher, Embedding, Strategy};

mod config;
mod replay;
mod store;

use config::{check_tolerance, Config};
use store::{EmbeddingStore, StoreError};

#[derive(Parser)]
#[command(name = "vigil", version, about = "Face liveness replay and enrollment")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recorded session through the liveness engine
    Replay {
        /// Directory of png/jpg frames, processed in file name order
        #[arg(long)]
        frames: PathBuf,
        /// JSONL landmark track, one line per frame
        #[arg(long)]
        landmarks: Option<PathBuf>,
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
    },
    /// Enroll a face embedding under a user id
    Enroll {
        #[arg(long)]
        user: String,
        /// JSON array of floats
        #[arg(long)]
        embedding: PathBuf,
    },
    /// Match an embedding against enrolled users
    Identify {
        #[arg(long)]
        embedding: PathBuf,
        #[arg(long)]
        tolerance: Option<f32>,
    },
    /// List enrolled users
    Users {
        /// Show embedding dimension and enrollment date
        #[arg(long, short)]
        verbose: bool,
    },
    /// Remove an enrolled user
    Remove {
        #[arg(long)]
        user: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Landmarks,
    DepthTexture,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Landmarks => Strategy::Landmarks,
            StrategyArg::DepthTexture => Strategy::DepthTexture,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.cmd {
        Commands::Replay {
            frames,
            landmarks,
            strategy,
        } => {
            let mut liveness = config.liveness;
            if let Some(strategy) = strategy {
                liveness.strategy = strategy.into();
            }
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            replay::run(liveness, &frames, landmarks.as_deref(), &mut out)?;
        }
        Commands::Enroll { user, embedding } => {
            let embedding = read_embedding(&embedding)?;
            let store = open_store(&config)?;
            match store.insert(&user, &embedding) {
                Ok(()) => {
                    tracing::info!(user = user.trim(), dim = embedding.dim(), "user enrolled");
                    println!("Enrolled {}", user.trim());
                }
                Err(StoreError::AlreadyEnrolled(id)) => {
                    bail!("user '{id}' already exists, remove it first to re-enroll")
                }
                Err(e) => return Err(e).context("enrollment failed"),
            }
        }
        Commands::Identify {
            embedding,
            tolerance,
        } => {
            let tolerance = tolerance.unwrap_or(config.match_tolerance);
            check_tolerance(tolerance)?;
            let probe = read_embedding(&embedding)?;
            let store = open_store(&config)?;
            let gallery = store.gallery().context("failed to load enrolled embeddings")?;
            let matcher = DistanceMatcher::new(tolerance);
            let result = matcher.best_match(
                &probe,
                gallery.iter().map(|(id, emb)| (id.as_str(), emb)),
            );
            tracing::debug!(
                gallery = gallery.len(),
                tolerance = matcher.tolerance,
                distance = ?result.distance,
                "identification complete"
            );
            println!("{}", serde_json::to_string(&result)?);
        }
        Commands::Users { verbose } => {
            let store = open_store(&config)?;
            let users = store.list().context("failed to list users")?;
            if users.is_empty() {
                println!("No users enrolled.");
            }
            for user in users {
                if verbose {
                    println!("{}\tdim={}\t{}", user.user_id, user.dim, user.created_at);
                } else {
                    println!("{}", user.user_id);
                }
            }
        }
        Commands::Remove { user } => {
            let store = open_store(&config)?;
            if store.remove(&user).context("failed to remove user")? {
                tracing::info!(user = %user, "user removed");
                println!("Removed {user}");
            } else {
                bail!("user '{user}' is not enrolled");
            }
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<EmbeddingStore> {
    EmbeddingStore::open(&config.db_path)
        .with_context(|| format!("failed to open store {}", config.db_path.display()))
}

fn read_embedding(path: &Path) -> Result<Embedding> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read embedding {}", path.display()))?;
    let embedding: Embedding = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse embedding {}", path.display()))?;
    if embedding.dim() == 0 {
        bail!("embedding {} is empty", path.display());
    }
    Ok(embedding)
}
