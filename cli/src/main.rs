mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use getllm_core::ModelSource;

#[derive(Parser)]
#[command(name = "getllm")]
#[command(author, version, about = "Browse, cache and install LLMs from Ollama and Hugging Face", long_about = None)]
struct Cli {
    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List models from the cached catalog
    #[command(alias = "ls")]
    List {
        /// Only show models from this source (ollama, huggingface)
        #[arg(short, long, value_parser = commands::parse_source)]
        source: Option<ModelSource>,

        /// Only show models installed in Ollama
        #[arg(short, long)]
        installed: bool,

        /// Maximum number of models to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Case-insensitive filter over id, name, description and tags
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Show details for one model
    Info {
        /// Model id (e.g., "ollama/llama3.1:8b", "TheBloke/Mistral-7B-GGUF")
        model: String,
    },

    /// Install a model through Ollama
    #[command(alias = "pull")]
    Install {
        /// Model id (defaults to the configured default model)
        model: Option<String>,

        /// Pull even if the model is already installed
        #[arg(short, long)]
        force: bool,
    },

    /// Remove an installed model
    #[command(alias = "rm")]
    Uninstall {
        /// Model id to remove
        model: String,
    },

    /// Refresh the cached catalog from the remote sources
    Update {
        /// Only refresh this source
        #[arg(short, long, value_parser = commands::parse_source)]
        source: Option<ModelSource>,

        /// Skip sources whose cache is still fresh
        #[arg(long)]
        if_stale: bool,
    },

    /// Search the catalog and optionally install a match
    Search {
        /// Search query
        query: String,

        /// Only search this source
        #[arg(short, long, value_parser = commands::parse_source)]
        source: Option<ModelSource>,

        /// Ask the remote sources first and add the results to the cache
        #[arg(short, long)]
        remote: bool,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// List models installed in Ollama
    Installed,

    /// Show Ollama and cache status
    Status,

    /// Show or set the default model
    Default {
        /// Model id to make the default
        model: Option<String>,
    },

    /// View or set configuration
    Config {
        /// Config key (e.g., "ollama.host", "sources.limit")
        key: Option<String>,

        /// Value to set (if omitted, shows current value)
        value: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::List {
            source,
            installed,
            limit,
            query,
        } => {
            commands::list::execute(source, installed, limit, query.as_deref()).await?;
        }
        Commands::Info { model } => {
            commands::info::execute(&model).await?;
        }
        Commands::Install { model, force } => {
            commands::install::execute(model.as_deref(), force).await?;
        }
        Commands::Uninstall { model } => {
            commands::uninstall::execute(&model).await?;
        }
        Commands::Update { source, if_stale } => {
            commands::update::execute(source, if_stale).await?;
        }
        Commands::Search {
            query,
            source,
            remote,
            limit,
        } => {
            commands::search::execute(&query, source, remote, limit).await?;
        }
        Commands::Installed => {
            commands::installed::execute().await?;
        }
        Commands::Status => {
            commands::status::execute().await?;
        }
        Commands::Default { model } => {
            commands::default::execute(model.as_deref()).await?;
        }
        Commands::Config { key, value } => {
            commands::config::execute(key.as_deref(), value.as_deref()).await?;
        }
    }

    Ok(())
}
