use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mimic::cli::{ingest, message, speak, stats};
use mimic::{Config, Core, MarkovStore, User};

#[derive(Parser)]
#[command(name = "mimic")]
#[command(about = "Per-author Markov chain text engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "mimic.yaml")]
    config: String,

    /// Database path (overrides the config file)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Bulk-load a JSON lines message export
    Ingest {
        /// File with one {id, content, author_id, author_name} object per line
        file: PathBuf,
    },

    /// Record a newly received message
    Add {
        #[command(flatten)]
        message: MessageArgs,
    },

    /// Record an edit to a message
    Edit {
        #[command(flatten)]
        message: MessageArgs,
    },

    /// Remove a message and its contribution
    Delete {
        /// Message ID
        id: u64,
    },

    /// Generate a sentence
    Speak {
        /// Start word (random if omitted)
        word: Option<String>,

        /// Only use this user's words
        #[arg(short, long)]
        user: Option<u64>,
    },

    /// Show the words that follow a word
    Links {
        word: String,

        #[arg(short, long)]
        user: Option<u64>,
    },

    /// Show how often a word was used, or a random word if none is given
    Word {
        word: Option<String>,

        #[arg(short, long)]
        user: Option<u64>,
    },

    /// Show statistics
    Stats {
        #[arg(short, long)]
        user: Option<u64>,
    },

    /// List stored messages containing some text
    Context {
        text: String,
    },

    /// Rebuild all word and link frequencies from the stored messages
    Retrain,
}

#[derive(clap::Args)]
struct MessageArgs {
    /// Message ID
    id: u64,

    /// Author user ID
    #[arg(short, long)]
    author: u64,

    /// Author display name
    #[arg(short, long, default_value = "")]
    name: String,

    /// Raw message text
    content: String,
}

impl MessageArgs {
    fn author(&self) -> User {
        User::new(self.author, self.name.clone())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("mimic={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load config
    let config = Config::load(&cli.config)?;

    // Initialize store and engine
    let db_path = cli.database.clone().unwrap_or_else(|| config.database_path());
    let store = MarkovStore::open(&db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?
        .with_normalizer(config.normalizer.build()?);
    let mut core = Core::new(store)?.with_settings(config.generation.clone());

    match cli.command {
        Commands::Ingest { file } => {
            ingest::run(&mut core, &file)?;
        }
        Commands::Add { message: args } => {
            message::add(&mut core, args.id, args.author(), args.content)?;
        }
        Commands::Edit { message: args } => {
            message::edit(&mut core, args.id, args.author(), args.content)?;
        }
        Commands::Delete { id } => {
            message::delete(&mut core, id)?;
        }
        Commands::Speak { word, user } => {
            speak::speak(&mut core, user, word)?;
        }
        Commands::Links { word, user } => {
            speak::links(&mut core, user, &word)?;
        }
        Commands::Word { word, user } => {
            speak::word(&mut core, user, word.as_deref())?;
        }
        Commands::Stats { user } => {
            stats::run(&mut core, user)?;
        }
        Commands::Context { text } => {
            stats::context(&core, &text)?;
        }
        Commands::Retrain => {
            let count = core.retrain()?;
            println!("Retrained from {} messages", count);
        }
    }

    Ok(())
}
