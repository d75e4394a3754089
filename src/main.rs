//! # Picta CLI
//!
//! Reference binary for the photo search and recommendation core. Wires
//! together configuration, the embedding store, the ANN index, and the
//! search/recommend/index entry points behind three subcommands:
//!
//! - **`index <path>`**: walk a local directory and ingest its images.
//! - **`search <query>`**: run a natural-language search.
//! - **`recommend <id>`**: print the three neighbor sets for a photo.

use clap::Parser;
use once_cell::sync::OnceCell;
use picta_core::ann::AnnIndex;
use picta_core::commands::{Cli, Commands};
use picta_core::config::{load_config, PictaConfig};
use picta_core::embedder::{Embedder, TextEmbedder};
use picta_core::indexer::Indexer;
use picta_core::parser::QueryParser;
use picta_core::recommend::Recommender;
use picta_core::scraper::DirScraper;
use picta_core::search::SearchEngine;
use picta_core::store::Store;
use std::error::Error;
use std::path::Path;
use tracing::info;

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    initialize_tracing();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

fn initialize_tracing() {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
}

/// An embedder that can actually encode images requires a vision model
/// plugged in by the deployment; this CLI ships only the text encoder
/// and refuses `index`/image-backed search paths if that image model
/// isn't wired in, surfacing a clear `ModelUnavailable` instead of
/// silently indexing garbage vectors.
struct CliEmbedder {
    text: TextEmbedder,
}

impl Embedder for CliEmbedder {
    fn encode_image(&self, bytes: &[u8]) -> picta_core::error::CoreResult<Vec<f32>> {
        self.text.encode_image(bytes)
    }

    fn encode_text(&self, text: &str) -> picta_core::error::CoreResult<Vec<f32>> {
        self.text.encode_text(text)
    }

    fn dimension(&self) -> usize {
        self.text.dimension()
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = load_config(None);
    if let Some(corpus) = &cli.corpus {
        config.corpus_path = corpus.clone();
    }

    let store = Store::open(&config.corpus_path)?;
    let ann = AnnIndex::new();
    if config.ann_rebuild_on_start {
        ann.rebuild(&store)?;
    }

    match cli.command {
        // The Indexer rebuilds the index itself once the batch lands, so
        // an eager rebuild beforehand would only be thrown away.
        Commands::Index { path } => run_index(&store, &ann, &config, &path)?,
        Commands::Search { query, k } => {
            ensure_built(&ann, &store)?;
            run_search(&store, &ann, &config, &query, k).await?
        }
        Commands::Recommend { id, k } => {
            ensure_built(&ann, &store)?;
            run_recommend(&store, &ann, id, k)?
        }
    }

    Ok(())
}

/// Lazily build the index if `ann_rebuild_on_start` skipped the eager
/// rebuild — `search`/`recommend` need a populated snapshot to return
/// anything, while `index` does not.
fn ensure_built(ann: &AnnIndex, store: &Store) -> Result<(), Box<dyn Error>> {
    if ann.size() == 0 {
        ann.rebuild(store)?;
    }
    Ok(())
}

fn run_index(store: &Store, ann: &AnnIndex, config: &PictaConfig, path: &str) -> Result<(), Box<dyn Error>> {
    let embedder = CliEmbedder {
        text: TextEmbedder::load(&config.embed_model_id)?,
    };
    let indexer = Indexer::new(store, ann, &embedder, config.indexer_workers);
    let mut scraper = DirScraper::new(Path::new(path))?;
    let uploaded_at = chrono::Utc::now().to_rfc3339();

    let report = indexer.run(&mut scraper, &uploaded_at)?;
    info!(indexed = report.indexed, skipped = report.skipped, "index complete");
    println!("indexed {} photos ({} skipped)", report.indexed, report.skipped);
    Ok(())
}

async fn run_search(store: &Store, ann: &AnnIndex, config: &PictaConfig, query: &str, k: usize) -> Result<(), Box<dyn Error>> {
    let embedder = CliEmbedder {
        text: TextEmbedder::load(&config.embed_model_id)?,
    };
    let parser = QueryParser::new(
        &config.llm_api_key,
        &config.llm_api_base,
        &config.llm_model,
        &config.geocoder_url,
        config.deadline,
    );
    let engine = SearchEngine::new(store, ann, &parser, &embedder);

    let ts = chrono::Utc::now().to_rfc3339();
    let results = engine.search_text(query, k, &ts).await?;

    for result in results {
        println!(
            "{:>6}  {:.3}  {}  {}",
            result.id,
            result.similarity,
            result.taken_at.as_deref().unwrap_or("-"),
            result.source_ref
        );
    }
    Ok(())
}

fn run_recommend(store: &Store, ann: &AnnIndex, id: i32, k: usize) -> Result<(), Box<dyn Error>> {
    let recommender = Recommender::new(store, ann);
    let recs = recommender.recommendations(id, k)?;

    println!("similar visual:");
    for n in &recs.similar_visual {
        println!("  {:>6}  {:.3}  {}", n.id, n.similarity, n.source_ref);
    }
    println!("same location:");
    for n in &recs.same_location {
        println!("  {:>6}  {}", n.id, n.source_ref);
    }
    println!("same day:");
    for n in &recs.same_day {
        println!("  {:>6}  {}", n.id, n.source_ref);
    }
    Ok(())
}
