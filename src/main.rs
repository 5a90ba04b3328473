//! # docingest CLI
//!
//! The `docingest` binary stores uploaded documents, runs them through the
//! ingestion pipeline, and inspects what landed in the vector store.
//!
//! ## Usage
//!
//! ```bash
//! docingest --config ./config/docingest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docingest init` | Create the vector store class if it is missing |
//! | `docingest upload <file>` | Store a document under an id |
//! | `docingest ingest <id>...` | Extract, chunk, embed and upsert stored documents |
//! | `docingest extract <file>` | Print the text extracted from a file |
//! | `docingest chunk <file>` | Print the chunks and record ids a file would produce |
//! | `docingest chunks <id>` | List the records stored for a document |
//! | `docingest search "<query>"` | Nearest stored chunks to a query |
//! | `docingest purge --document <id>` | Delete a document's records |
//!
//! ## Examples
//!
//! ```bash
//! docingest init
//! docingest upload ./handbook.pdf --id 42
//! docingest ingest 42
//! docingest chunks 42
//! docingest search "parental leave policy" --limit 5
//! docingest purge --document 42
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docingest::{commands, config, logging};

/// docingest: turn uploaded documents into searchable vector records.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without it, `./config/docingest.toml` is used when present and
/// built-in defaults otherwise.
#[derive(Parser)]
#[command(
    name = "docingest",
    about = "Document ingestion pipeline: extract, chunk, embed, and upsert into a vector store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure the vector store schema exists.
    ///
    /// Idempotent: running it against an initialized store changes nothing.
    Init,

    /// Store a file in the document source.
    Upload {
        /// File to upload (pdf, doc, docx, txt, html, htm).
        file: PathBuf,

        /// Document id; defaults to the first 12 hex chars of the file's SHA-256.
        #[arg(long)]
        id: Option<String>,
    },

    /// Run stored documents through the pipeline.
    ///
    /// Prints a summary per document. Exits non-zero if any document failed.
    Ingest {
        /// Document ids to ingest.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        ids: Vec<String>,

        /// Ingest every stored document.
        #[arg(long)]
        all: bool,
    },

    /// Print the text extracted from a local file. No network access.
    Extract {
        file: PathBuf,

        /// Content type; inferred from the extension when omitted.
        #[arg(long)]
        mime: Option<String>,
    },

    /// Print the chunks and record ids a local file would produce. No network access.
    Chunk {
        file: PathBuf,

        /// Document id used to derive record ids; defaults to the file name.
        #[arg(long)]
        document_id: Option<String>,
    },

    /// List the records stored for a document.
    Chunks {
        /// Document id.
        id: String,
    },

    /// Embed a query and list the nearest stored chunks.
    Search {
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Bulk delete records from the vector store.
    Purge {
        /// Delete the records of one document.
        #[arg(long, required_unless_present = "all", conflicts_with = "all")]
        document: Option<String>,

        /// Delete every record.
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_or_default(cli.config.as_deref())?;
    logging::init_tracing(&cfg.logging);

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Upload { file, id } => commands::run_upload(&cfg, &file, id).await?,
        Commands::Ingest { ids, all } => commands::run_ingest(&cfg, ids, all).await?,
        Commands::Extract { file, mime } => commands::run_extract(&file, mime.as_deref())?,
        Commands::Chunk { file, document_id } => commands::run_chunk(&cfg, &file, document_id)?,
        Commands::Chunks { id } => commands::run_chunks(&cfg, &id).await?,
        Commands::Search { query, limit } => commands::run_search(&cfg, &query, limit).await?,
        Commands::Purge { document, all } => commands::run_purge(&cfg, document, all).await?,
    }

    Ok(())
}
