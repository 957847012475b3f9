//! viewnav CLI tool
//!
//! Walks JSON index fixtures with the same cursors the library hands out.
//!
//! ## Commands
//!
//! - `walk <index.json>`: Traverse an index and print one JSON line per entry
//! - `position <tumbler>`: Parse and normalize a position string

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use viewnav_core::{
    config::{ConfigProvider, CursorConfig, TomlConfigProvider},
    cursor::{CursorBuilder, StartPoint},
    memory::MemoryIndex,
    navigate::Navigation,
    position::Position,
    properties::{NoteId, ReadMaskFlag},
    resolver::{ExpansionSpec, SelectionSpec},
    ViewNavError,
};

#[derive(Parser)]
#[command(name = "viewnav")]
#[command(author, version, about = "A tool for walking view index fixtures", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Traverse an index and print its entries as JSON lines
    Walk {
        /// Path to a JSON index definition
        index: PathBuf,

        /// Traversal direction, e.g. next-entry, prev-document, next-unread
        #[arg(short, long, default_value = "next-entry")]
        direction: Navigation,

        /// Only walk below this category (levels joined with '\')
        #[arg(long)]
        category: Option<String>,

        /// first, last, note:<id> or a position such as 1.2
        #[arg(long)]
        start: Option<String>,

        #[arg(long, default_value_t = 0)]
        skip: u32,

        #[arg(long)]
        limit: Option<u32>,

        /// Only yield these note IDs (comma separated)
        #[arg(long, value_delimiter = ',')]
        select: Vec<u32>,

        /// Collapse every entry
        #[arg(long)]
        collapse_all: bool,

        /// Print the total entry count before the entries
        #[arg(long)]
        total: bool,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Parse a position string and print it normalized
    Position {
        /// Tumbler such as 1.2.3, optionally with level bounds
        position: String,
    },
}

fn parse_start(start: &str) -> Result<StartPoint, ViewNavError> {
    match start {
        "first" => Ok(StartPoint::First),
        "last" => Ok(StartPoint::Last),
        _ => match start.strip_prefix("note:") {
            Some(id) => StartPoint::entry_id(NoteId(id.trim().parse()?)),
            None => StartPoint::position(start),
        },
    }
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e}");
        // bad input exits 2, engine failures 1
        std::process::exit(if e.is_caller_error() { 2 } else { 1 });
    }
}

fn run(command: Commands) -> Result<(), ViewNavError> {
    match command {
        Commands::Walk {
            index,
            direction,
            category,
            start,
            skip,
            limit,
            select,
            collapse_all,
            total,
            config,
        } => {
            let config = match config {
                Some(path) => TomlConfigProvider::new(path).get_config()?,
                None => CursorConfig::default(),
            };
            let source = MemoryIndex::load(&index)?;

            let mut builder = CursorBuilder::new(&source)
                .query_engine(&source)
                .config(config)
                .direction(direction)
                .read_mask(
                    ReadMaskFlag::NoteId
                        | ReadMaskFlag::IndexPosition
                        | ReadMaskFlag::IndentLevels
                        | ReadMaskFlag::Summary,
                )
                .skip(skip);
            if let Some(path) = category {
                builder = builder.restrict_to_category(&path);
            }
            if let Some(start) = start {
                builder = builder.start_at(parse_start(&start)?);
            }
            if let Some(limit) = limit {
                builder = builder.limit(limit);
            }
            if !select.is_empty() {
                builder = builder.select(SelectionSpec::additive().note_ids(select));
            }
            if collapse_all {
                builder = builder.expand(ExpansionSpec::collapse_all());
            }

            let mut cursor = builder.build()?;
            if total {
                println!("{}", serde_json::json!({ "total": cursor.total()? }));
            }
            for entry in cursor {
                println!("{}", serde_json::to_string(&entry?)?);
            }
            Ok(())
        }

        Commands::Position { position } => {
            let parsed: Position = position.parse()?;
            println!(
                "{} (level {}, bounds {}-{})",
                parsed,
                parsed.level(),
                parsed.min_level(),
                parsed.max_level()
            );
            Ok(())
        }
    }
}
