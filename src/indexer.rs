//! Indexer: consumes a scraper stream, invokes `encode_image`, writes to
//! the Embedding Store, and triggers an ANN rebuild at completion.
//!
//! `encode_image` is fanned out across a bounded rayon thread pool sized
//! by `indexer_workers`; writes themselves stay serial through the
//! store's single-writer mutex. A single bad item is logged and skipped,
//! never aborting the batch.

use crate::ann::AnnIndex;
use crate::embedder::Embedder;
use crate::error::CoreResult;
use crate::scraper::{ScrapedItem, Scraper};
use crate::store::Store;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{info, warn};

pub struct Indexer<'a> {
    store: &'a Store,
    ann: &'a AnnIndex,
    embedder: &'a dyn Embedder,
    pool: ThreadPool,
}

/// Outcome of a single batch run.
#[derive(Debug, Default, PartialEq)]
pub struct IndexReport {
    pub indexed: usize,
    pub skipped: usize,
}

impl<'a> Indexer<'a> {
    pub fn new(store: &'a Store, ann: &'a AnnIndex, embedder: &'a dyn Embedder, workers: usize) -> Self {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .build()
            .expect("thread pool builds with a fixed worker count");
        Indexer {
            store,
            ann,
            embedder,
            pool,
        }
    }

    /// Drain `scraper` to completion, writing each successfully embedded
    /// item to the store, then rebuild the ANN index once.
    pub fn run(&self, scraper: &mut dyn Scraper, uploaded_at: &str) -> CoreResult<IndexReport> {
        let mut batch = Vec::new();
        while let Some(item) = scraper.next_item() {
            batch.push(item);
        }

        let embedder = self.embedder;
        let embedded: Vec<(ScrapedItem, Option<Vec<f32>>)> = self.pool.install(|| {
            use rayon::prelude::*;
            batch
                .into_par_iter()
                .map(|item| {
                    let result = embedder.encode_image(&item.bytes);
                    match result {
                        Ok(vector) => (item, Some(vector)),
                        Err(e) => {
                            warn!(source_ref = %item.source_ref, error = %e, "encode_image failed, skipping item");
                            (item, None)
                        }
                    }
                })
                .collect()
        });

        let mut report = IndexReport::default();
        for (item, vector) in embedded {
            let Some(vector) = vector else {
                report.skipped += 1;
                continue;
            };

            match self.store.put(
                &item.source_ref,
                uploaded_at,
                item.taken_at.as_deref(),
                item.gps,
                item.location_name.as_deref(),
                &vector,
                &item.metadata,
            ) {
                Ok(_) => {
                    report.indexed += 1;
                    if let Some(path) = &item.delete_after {
                        if let Err(e) = std::fs::remove_file(path) {
                            warn!(path = %path.display(), error = %e, "failed to remove scratch file after indexing");
                        }
                    }
                }
                Err(e) => {
                    warn!(source_ref = %item.source_ref, error = %e, "store write failed, skipping item");
                    report.skipped += 1;
                }
            }
        }

        self.ann.rebuild(self.store)?;
        info!(indexed = report.indexed, skipped = report.skipped, "indexing batch complete");
        Ok(report)
    }
}
