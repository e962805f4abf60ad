//! Command line definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Keep a reading list in sync across devices.
#[derive(Parser, Debug)]
#[command(name = "readlater")]
#[command(author, version, about)]
pub struct Args {
    /// Show debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Save a URL (or shared text containing one)
    Add {
        url: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Import a Pocket HTML export
    Import { file: PathBuf },
    /// List saved articles
    List {
        #[arg(long, conflicts_with = "favorites")]
        archived: bool,
        #[arg(long)]
        favorites: bool,
    },
    /// Full-text search over titles, excerpts and article text
    Search {
        query: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Print one article with its tags and text
    Show { id: String },
    /// Toggle the favorite flag
    Favorite {
        id: String,
        #[arg(long)]
        off: bool,
    },
    /// Mark an article read (or unread with --off)
    Read {
        id: String,
        #[arg(long)]
        off: bool,
    },
    /// Move an article to the archive (or back with --off)
    Archive {
        id: String,
        #[arg(long)]
        off: bool,
    },
    /// Delete an article
    Delete { id: String },
    /// Attach a tag
    Tag { id: String, tag: String },
    /// Remove a tag
    Untag { id: String, tag: String },
    /// Fetch and extract text for articles that have none
    Extract,
    /// Push local changes to the remote store
    Sync,
    /// Full two-way sync with the remote store
    FullSync,
    /// Sync periodically until interrupted
    Watch {
        /// Minutes between runs; defaults to the configured interval
        #[arg(long)]
        interval: Option<u64>,
    },
}
