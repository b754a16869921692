//! Cardex CLI - versioned ML card registry

use cardex::cli::{self, CardInput};
use cardex::prelude::*;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "CARDEX_LOG";

#[derive(Parser)]
#[command(name = "cardex")]
#[command(author, version, about = "Versioned registry for ML cards", long_about = None)]
struct Cli {
    /// Registry path (default: $CARDEX_HOME or ~/.cardex)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Card registry operations
    Card {
        #[command(subcommand)]
        action: CardAction,
    },
    /// Show registry statistics
    Stats,
    /// Initialize a new registry
    Init,
}

/// Card selection by uid, or by name and repository.
#[derive(Args)]
struct Selector {
    /// Card uid
    #[arg(long, short)]
    uid: Option<String>,
    /// Card name
    #[arg(long, short)]
    name: Option<String>,
    /// Card repository
    #[arg(long, short)]
    repository: Option<String>,
    /// Version or version query (latest match is used)
    #[arg(long, short)]
    version: Option<String>,
}

/// Metadata and artifacts attached to a card.
#[derive(Args)]
struct CardFields {
    /// Contact for the card owner
    #[arg(long, short)]
    contact: Option<String>,
    /// Tag as key=value (repeatable)
    #[arg(long = "tag", short = 't')]
    tags: Vec<String>,
    /// Card-type-specific fields as a JSON object
    #[arg(long)]
    details: Option<String>,
    /// Artifact file as path or name=path (repeatable)
    #[arg(long = "artifact", short = 'a')]
    artifacts: Vec<String>,
}

impl From<CardFields> for CardInput {
    fn from(fields: CardFields) -> Self {
        Self {
            contact: fields.contact,
            tags: fields.tags,
            details: fields.details,
            artifacts: fields.artifacts,
        }
    }
}

#[derive(Subcommand)]
enum CardAction {
    /// Register a new card version
    Register {
        /// Card type (data, model, run, pipeline, audit, project)
        card_type: CardType,
        /// Card name
        name: String,
        /// Owning repository
        #[arg(long, short)]
        repository: String,
        /// Explicit version; partial versions (1, 1.2) select the line to bump
        #[arg(long, short)]
        version: Option<String>,
        /// Version increment (major, minor, patch, pre, build, pre_build)
        #[arg(long, short, default_value = "minor")]
        increment: String,
        /// Prerelease channel for pre and pre_build
        #[arg(long)]
        pre_tag: Option<String>,
        /// Build channel, or build metadata for numeric increments
        #[arg(long)]
        build_tag: Option<String>,
        #[command(flatten)]
        fields: CardFields,
    },
    /// Update a registered card in place
    Update {
        /// Card type
        card_type: CardType,
        /// Card uid
        uid: String,
        #[command(flatten)]
        fields: CardFields,
    },
    /// Show card details
    Get {
        /// Card type
        card_type: CardType,
        #[command(flatten)]
        selector: Selector,
        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },
    /// List cards
    List {
        /// Card type
        card_type: CardType,
        /// Filter by name
        #[arg(long, short)]
        name: Option<String>,
        /// Filter by repository
        #[arg(long, short)]
        repository: Option<String>,
        /// Filter by version query (1.2.0, 1, 1.*, ^1.2, ~1.2.3)
        #[arg(long, short)]
        version: Option<String>,
        /// Filter by tag key=value (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,
        /// Maximum number of cards
        #[arg(long, short)]
        limit: Option<usize>,
    },
    /// List versions of a card line
    Versions {
        /// Card type
        card_type: CardType,
        /// Card name
        name: String,
        /// Owning repository
        #[arg(long, short)]
        repository: String,
        /// Partial version prefix (1, 1.2)
        #[arg(long, short)]
        prefix: Option<String>,
    },
    /// Download card artifacts
    Download {
        /// Card type
        card_type: CardType,
        #[command(flatten)]
        selector: Selector,
        /// Artifact name (default: all)
        #[arg(long)]
        artifact: Option<String>,
        /// Output directory
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Delete a card and its artifacts
    Delete {
        /// Card type
        card_type: CardType,
        /// Card uid
        uid: String,
    },
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> cardex::Result<()> {
    let base_path = cli
        .registry
        .unwrap_or_else(RegistryConfig::default_base_path);
    let config = RegistryConfig::load(base_path)?;

    match cli.command {
        Commands::Init => {
            let registry = Registry::open(config)?;
            println!(
                "Registry initialized at: {}",
                registry.config().base_path.display()
            );
        }
        Commands::Stats => {
            let registry = Registry::open_existing(config)?;
            print!("{}", cli::format_stats(&registry.storage_stats()?));
        }
        Commands::Card { action } => handle_card(config, action)?,
    }

    Ok(())
}

fn handle_card(config: RegistryConfig, action: CardAction) -> cardex::Result<()> {
    let registry = Registry::open_existing(config)?;

    match action {
        CardAction::Register {
            card_type,
            name,
            repository,
            version,
            increment,
            pre_tag,
            build_tag,
            fields,
        } => {
            let request =
                cli::version_request(&increment, pre_tag.as_deref(), build_tag.as_deref())?;
            let record = cli::handle_register(
                &registry,
                card_type,
                &name,
                &repository,
                version.as_deref(),
                &fields.into(),
                &request,
            )?;
            println!("Registered {record} ({})", record.uid);
        }
        CardAction::Update {
            card_type,
            uid,
            fields,
        } => {
            let record = cli::handle_update(&registry, card_type, &uid, &fields.into())?;
            println!("Updated {record} ({})", record.uid);
        }
        CardAction::Get {
            card_type,
            selector,
            json,
        } => {
            let record = resolve(&registry, card_type, &selector)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print!("{}", cli::format_record(&record));
            }
        }
        CardAction::List {
            card_type,
            name,
            repository,
            version,
            tags,
            limit,
        } => {
            let mut filter = CardFilter::new();
            filter.name = name;
            filter.repository = repository;
            filter.tags = cli::parse_tags(&tags)?;
            filter.limit = limit;
            if let Some(query) = version {
                filter = filter.version(&query)?;
            }
            let records = registry.list_cards(card_type, &filter)?;
            print!("{}", cli::format_record_list(&records));
        }
        CardAction::Versions {
            card_type,
            name,
            repository,
            prefix,
        } => {
            let versions =
                registry.get_versions(card_type, &name, &repository, prefix.as_deref())?;
            print!("{}", cli::format_versions(&name, &repository, &versions));
        }
        CardAction::Download {
            card_type,
            selector,
            artifact,
            output,
        } => {
            let record = resolve(&registry, card_type, &selector)?;
            let files = cli::handle_download(&registry, &record, artifact.as_deref(), &output)?;
            for file in files {
                println!("Downloaded {}", file.display());
            }
        }
        CardAction::Delete { card_type, uid } => {
            let record = registry.delete_card(card_type, &uid)?;
            println!("Deleted {record} ({uid})");
        }
    }

    Ok(())
}

fn resolve(registry: &Registry, card_type: CardType, selector: &Selector) -> cardex::Result<CardRecord> {
    cli::resolve_record(
        registry,
        card_type,
        selector.uid.as_deref(),
        selector.name.as_deref(),
        selector.repository.as_deref(),
        selector.version.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from(["cardex", "stats"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_cli_card_register() {
        let cli = Cli::try_parse_from([
            "cardex",
            "card",
            "register",
            "model",
            "fraud-detector",
            "-r",
            "risk",
            "-c",
            "ml@example.com",
            "-i",
            "patch",
            "--build-tag",
            "git.abc123",
            "-a",
            "model.onnx",
        ]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_cli_rejects_unknown_card_type() {
        let cli = Cli::try_parse_from(["cardex", "card", "list", "notebook"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_cli_card_list() {
        let cli = Cli::try_parse_from(["cardex", "card", "list", "data", "-v", "^1.2"]);
        assert!(cli.is_ok());
    }
}
