//! Command-line interface for the reference `picta` binary.
//!
//! Exposes the three subcommands the core's design calls for: `index`,
//! `search`, `recommend`. The core itself is a library; this CLI is one
//! reference consumer of it.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Picta – a personal photo search and recommendation engine.",
    long_about = None,
    propagate_version = true,
    color = clap::ColorChoice::Always
)]
pub struct Cli {
    /// Path to the corpus's SQLite file. Overrides CORPUS_PATH.
    #[arg(short = 'c', long, global = true)]
    pub corpus: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index photos from a local directory into the corpus.
    Index {
        /// Directory to walk for image files.
        path: String,
    },

    /// Run a natural-language search against the corpus.
    Search {
        /// The search utterance.
        query: String,

        /// Max results to return.
        #[arg(short, long, default_value_t = 20)]
        k: usize,
    },

    /// Recommend similar/same-place/same-day neighbors of a photo.
    Recommend {
        /// PhotoId to recommend neighbors for.
        id: i32,

        /// Max results per neighbor set.
        #[arg(short, long, default_value_t = 10)]
        k: usize,
    },
}
