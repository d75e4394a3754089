//! Search Engine: orchestrates Parser → Filter → ANN → Threshold →
//! enrichment, implementing the branch decision between metadata-only
//! and hybrid semantic retrieval.

use crate::ann::AnnIndex;
use crate::embedder::Embedder;
use crate::filter;
use crate::parser::{meaningful_keywords, QueryParser};
use crate::query_plan::QueryPlan;
use crate::store::{Photo, Store};
use crate::threshold::threshold_for;
use std::collections::HashSet;

const SEMANTIC_CANDIDATE_POOL: usize = 100;
const TOP1_FALLBACK_SCORE: f32 = 0.20;

/// A single ranked result returned from `search`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: i32,
    pub source_ref: String,
    pub taken_at: Option<String>,
    pub location_name: Option<String>,
    pub gps: Option<(f64, f64)>,
    pub similarity: f32,
    pub metadata: String,
}

pub struct SearchEngine<'a> {
    store: &'a Store,
    ann: &'a AnnIndex,
    parser: &'a QueryParser,
    embedder: &'a dyn Embedder,
}

impl<'a> SearchEngine<'a> {
    pub fn new(store: &'a Store, ann: &'a AnnIndex, parser: &'a QueryParser, embedder: &'a dyn Embedder) -> Self {
        SearchEngine {
            store,
            ann,
            parser,
            embedder,
        }
    }

    /// Parse `utterance`, run the full search pipeline, and record the
    /// query in `search_history`.
    pub async fn search_text(&self, utterance: &str, k: usize, ts: &str) -> crate::error::CoreResult<Vec<SearchResult>> {
        let plan = self.parser.parse(utterance).await;
        let results = self.search(&plan, k)?;

        let results_json = serde_json::to_string(&results.iter().map(|r| r.id).collect::<Vec<_>>())
            .unwrap_or_else(|_| "[]".to_string());
        let _ = self.store.record_search(utterance, &results_json, ts);

        Ok(results)
    }

    /// The core branch decision over an already-parsed plan.
    pub fn search(&self, plan: &QueryPlan, k: usize) -> crate::error::CoreResult<Vec<SearchResult>> {
        let all_photos = self.store.scan()?;
        let date_set = filter::filter_by_time(&all_photos, plan);

        let has_location = plan.has_location();
        let loc_set = if has_location {
            let location = plan.location.as_ref().unwrap();
            Some(filter::filter_by_location(&date_set, &location.names, location.coords))
        } else {
            None
        };

        let meaningful = meaningful_keywords(plan);
        let has_keywords = !meaningful.is_empty();

        let mut results = if has_location && !has_keywords {
            self.branch_location_only(loc_set.as_ref().unwrap(), k)
        } else if !plan.search_text.trim().is_empty() {
            let candidates = loc_set.as_ref().unwrap_or(&date_set);
            self.branch_semantic(plan, candidates, k)?
        } else {
            self.branch_no_semantic(&date_set, k)
        };

        if !plan.people.is_empty() {
            results = self.apply_people_filter(results, &plan.people);
        }

        Ok(results)
    }

    /// Branch A: location-only. Return the `k` most recent photos in
    /// `loc_set`, all at `similarity = 1.0`.
    fn branch_location_only(&self, loc_set: &[&Photo], k: usize) -> Vec<SearchResult> {
        let mut sorted: Vec<&&Photo> = loc_set.iter().collect();
        sorted.sort_by(|a, b| b.taken_at.cmp(&a.taken_at).then(a.id.cmp(&b.id)));
        sorted
            .into_iter()
            .take(k)
            .map(|p| to_result(p, 1.0))
            .collect()
    }

    /// Branch B: semantic. Query the ANN index restricted to `candidates`
    /// with `encode_text(search_text)`, then apply the threshold policy.
    fn branch_semantic(&self, plan: &QueryPlan, candidates: &[&Photo], k: usize) -> crate::error::CoreResult<Vec<SearchResult>> {
        let query_vector = self.embedder.encode_text(&plan.search_text)?;
        let candidate_ids: HashSet<i32> = candidates.iter().map(|p| p.id).collect();

        let hits = self.ann.search_within(&query_vector, SEMANTIC_CANDIDATE_POOL, &candidate_ids)?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let tau = threshold_for(&plan.search_text);
        let passing: Vec<(i32, f32)> = hits.iter().cloned().filter(|(_, score)| *score > tau).collect();

        let selected: Vec<(i32, f32)> = if !passing.is_empty() {
            passing
        } else if hits[0].1 >= TOP1_FALLBACK_SCORE {
            vec![hits[0]]
        } else {
            Vec::new()
        };

        let by_id: std::collections::HashMap<i32, &Photo> = candidates.iter().map(|p| (p.id, *p)).collect();
        let mut results: Vec<SearchResult> = selected
            .into_iter()
            .filter_map(|(id, score)| by_id.get(&id).map(|p| to_result(p, score)))
            .collect();

        results.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap().then(a.id.cmp(&b.id)));
        results.truncate(k);
        Ok(results)
    }

    /// Branch C: no semantic content at all. First `k` of `date_set` at
    /// `similarity = 0`.
    fn branch_no_semantic(&self, date_set: &[&Photo], k: usize) -> Vec<SearchResult> {
        date_set.iter().take(k).map(|p| to_result(p, 0.0)).collect()
    }

    fn apply_people_filter(&self, results: Vec<SearchResult>, people: &[String]) -> Vec<SearchResult> {
        let wanted: HashSet<&str> = people.iter().map(|s| s.as_str()).collect();
        results
            .into_iter()
            .filter(|r| {
                self.store
                    .persons_for(r.id)
                    .map(|persons| persons.iter().any(|name| wanted.contains(name.as_str())))
                    .unwrap_or(false)
            })
            .collect()
    }
}

fn to_result(p: &Photo, similarity: f32) -> SearchResult {
    SearchResult {
        id: p.id,
        source_ref: p.source_ref.clone(),
        taken_at: p.taken_at.clone(),
        location_name: p.location_name.clone(),
        gps: p.gps,
        similarity,
        metadata: p.metadata.clone(),
    }
}
