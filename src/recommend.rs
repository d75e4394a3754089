//! Visual Recommender: the three neighbor-set queries per reference
//! photo, plus K-means auto-album clustering over the vector population.

use crate::ann::AnnIndex;
use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use std::collections::HashMap;

const EARTH_DEG_KM: f64 = 111.0;

/// A single recommended neighbor, independent of which query produced
/// it: visually similar, same place, or same day share this shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: i32,
    pub source_ref: String,
    pub taken_at: Option<String>,
    pub location_name: Option<String>,
    pub gps: Option<(f64, f64)>,
    pub similarity: f32,
}

/// The three neighbor sets bundled for one reference photo.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Recommendations {
    pub similar_visual: Vec<Neighbor>,
    pub same_location: Vec<Neighbor>,
    pub same_day: Vec<Neighbor>,
}

pub struct Recommender<'a> {
    store: &'a Store,
    ann: &'a AnnIndex,
}

impl<'a> Recommender<'a> {
    pub fn new(store: &'a Store, ann: &'a AnnIndex) -> Self {
        Recommender { store, ann }
    }

    /// Visually similar photos to `id`, ranked by cosine similarity,
    /// excluding `id` itself.
    pub fn find_similar_visual(&self, id: i32, k: usize) -> CoreResult<Vec<Neighbor>> {
        let query = self
            .ann
            .vector_for(id)
            .ok_or_else(|| CoreError::NotFound(format!("photo {id}")))?;

        let hits = self.ann.search(&query, k + 1)?;
        let mut out = Vec::with_capacity(k);
        for (hit_id, score) in hits {
            if hit_id == id {
                continue;
            }
            if out.len() == k {
                break;
            }
            out.push(self.to_neighbor(hit_id, score)?);
        }
        Ok(out)
    }

    /// Photos taken near `id`'s location: a lat/lon bounding box if it
    /// has GPS, else a substring match on its primary location segment,
    /// else empty.
    pub fn find_same_location(&self, id: i32, k: usize, radius_km: f64) -> CoreResult<Vec<Neighbor>> {
        let reference = self.store.get(id)?;

        let photos = self.store.scan()?;
        let mut candidates: Vec<_> = if let Some((lat, lon)) = reference.gps {
            let lat_range = radius_km / EARTH_DEG_KM;
            let lon_range = radius_km / (EARTH_DEG_KM * lat.to_radians().cos().abs().max(1e-9));

            photos
                .into_iter()
                .filter(|p| p.id != id)
                .filter_map(|p| {
                    let (plat, plon) = p.gps?;
                    if (plat - lat).abs() <= lat_range && (plon - lon).abs() <= lon_range {
                        Some(p)
                    } else {
                        None
                    }
                })
                .collect()
        } else if let Some(location_name) = &reference.location_name {
            let primary = location_name.split(',').next().unwrap_or(location_name).trim().to_lowercase();
            if primary.is_empty() {
                Vec::new()
            } else {
                photos
                    .into_iter()
                    .filter(|p| p.id != id)
                    .filter(|p| {
                        p.location_name
                            .as_ref()
                            .map(|n| n.to_lowercase().contains(&primary))
                            .unwrap_or(false)
                    })
                    .collect()
            }
        } else {
            Vec::new()
        };

        candidates.truncate(k);
        candidates
            .into_iter()
            .map(|p| self.to_neighbor(p.id, 0.0))
            .collect()
    }

    /// Photos taken within `[ref - d, ref + d + 1)` days of `id`'s
    /// `taken_at`, ordered ascending.
    pub fn find_same_day(&self, id: i32, k: usize, d_days: i64) -> CoreResult<Vec<Neighbor>> {
        let reference = self.store.get(id)?;
        let Some(taken_at) = &reference.taken_at else {
            return Ok(Vec::new());
        };

        let base_date = parse_date_prefix(taken_at)?;
        let start = base_date - chrono::Duration::days(d_days);
        let end = base_date + chrono::Duration::days(d_days + 1);

        let mut photos = self.store.scan()?;
        photos.retain(|p| p.id != id);
        photos.retain(|p| {
            p.taken_at
                .as_ref()
                .and_then(|t| parse_date_prefix(t).ok())
                .map(|d| d >= start && d < end)
                .unwrap_or(false)
        });
        photos.sort_by(|a, b| a.taken_at.cmp(&b.taken_at));
        photos.truncate(k);

        photos.into_iter().map(|p| self.to_neighbor(p.id, 0.0)).collect()
    }

    /// The triple of all three neighbor sets for `id`.
    pub fn recommendations(&self, id: i32, k: usize) -> CoreResult<Recommendations> {
        Ok(Recommendations {
            similar_visual: self.find_similar_visual(id, k)?,
            same_location: self.find_same_location(id, k, 1.0)?,
            same_day: self.find_same_day(id, k, 0)?,
        })
    }

    /// K-means (50 iterations) over all unit-norm embeddings currently
    /// published in the ANN index; returns `cluster_id -> [PhotoId]`.
    pub fn cluster(&self, n_clusters: usize) -> HashMap<usize, Vec<i32>> {
        let data = self.ann.all_vectors();
        if data.is_empty() || n_clusters == 0 || data.len() < n_clusters {
            return HashMap::new();
        }

        let dim = data[0].1.len();
        let ids: Vec<i32> = data.iter().map(|(id, _)| *id).collect();
        let vectors: Vec<&[f32]> = data.iter().map(|(_, v)| v.as_slice()).collect();

        let mut centroids: Vec<Vec<f32>> = vectors.iter().step_by((vectors.len() / n_clusters).max(1)).take(n_clusters).map(|v| v.to_vec()).collect();
        while centroids.len() < n_clusters {
            centroids.push(vectors[centroids.len() % vectors.len()].to_vec());
        }

        let mut assignments = vec![0usize; vectors.len()];
        for _ in 0..50 {
            for (i, v) in vectors.iter().enumerate() {
                assignments[i] = nearest_centroid(v, &centroids);
            }

            let mut sums = vec![vec![0f32; dim]; n_clusters];
            let mut counts = vec![0usize; n_clusters];
            for (i, v) in vectors.iter().enumerate() {
                let c = assignments[i];
                counts[c] += 1;
                for (s, x) in sums[c].iter_mut().zip(v.iter()) {
                    *s += x;
                }
            }
            for c in 0..n_clusters {
                if counts[c] == 0 {
                    continue;
                }
                for (centroid_val, sum_val) in centroids[c].iter_mut().zip(sums[c].iter()) {
                    *centroid_val = sum_val / counts[c] as f32;
                }
            }
        }

        let mut clusters: HashMap<usize, Vec<i32>> = HashMap::new();
        for (i, &id) in ids.iter().enumerate() {
            clusters.entry(assignments[i]).or_default().push(id);
        }
        clusters
    }

    fn to_neighbor(&self, id: i32, similarity: f32) -> CoreResult<Neighbor> {
        let photo = self.store.get(id)?;
        Ok(Neighbor {
            id: photo.id,
            source_ref: photo.source_ref,
            taken_at: photo.taken_at,
            location_name: photo.location_name,
            gps: photo.gps,
            similarity,
        })
    }
}

fn nearest_centroid(v: &[f32], centroids: &[Vec<f32>]) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, euclidean_sq(v, c)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn euclidean_sq(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn parse_date_prefix(taken_at: &str) -> CoreResult<chrono::NaiveDate> {
    let prefix = &taken_at[..taken_at.len().min(10)];
    chrono::NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .map_err(|e| CoreError::InvalidQuery(format!("unparseable taken_at {taken_at}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn unit(seed: f32, dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dim];
        v[0] = seed;
        v[1] = (1.0 - seed * seed).max(0.0).sqrt();
        v
    }

    fn seeded_store(n: usize) -> (Store, tempfile::NamedTempFile) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = Store::open(file.path().to_str().unwrap()).unwrap();
        for i in 0..n {
            let seed = (i as f32) / (n as f32 + 1.0);
            store
                .put(
                    &format!("file:///{i}.jpg"),
                    "2024-01-01T00:00:00Z",
                    Some(&format!("2024-07-{:02}T10:00:00Z", (i % 28) + 1)),
                    Some((37.5 + i as f64 * 0.001, 127.0)),
                    Some("Seoul, South Korea"),
                    &unit(seed, 8),
                    "{}",
                )
                .unwrap();
        }
        (store, file)
    }

    #[test]
    fn test_find_similar_visual_excludes_self() {
        let (store, _file) = seeded_store(1000);
        let ann = AnnIndex::new();
        ann.rebuild(&store).unwrap();
        let recommender = Recommender::new(&store, &ann);

        let results = recommender.find_similar_visual(42, 5).unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|n| n.id != 42));
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
        for n in &results {
            assert!(n.similarity >= -1.0 && n.similarity <= 1.0);
        }
    }

    #[test]
    fn test_find_same_day_ascending_within_window() {
        let (store, _file) = seeded_store(40);
        let ann = AnnIndex::new();
        ann.rebuild(&store).unwrap();
        let recommender = Recommender::new(&store, &ann);

        // row index i=14 (id=15, ids are 1-based) has taken_at 2024-07-15 (i % 28 + 1 = 15).
        let results = recommender.find_same_day(15, 20, 0).unwrap();
        for n in &results {
            let date = &n.taken_at.as_ref().unwrap()[..10];
            assert_eq!(date, "2024-07-15");
        }
        for pair in results.windows(2) {
            assert!(pair[0].taken_at <= pair[1].taken_at);
        }
    }

    #[test]
    fn test_cluster_assigns_all_points() {
        let (store, _file) = seeded_store(30);
        let ann = AnnIndex::new();
        ann.rebuild(&store).unwrap();
        let recommender = Recommender::new(&store, &ann);

        let clusters = recommender.cluster(5);
        let total: usize = clusters.values().map(|v| v.len()).sum();
        assert_eq!(total, 30);
        assert!(clusters.len() <= 5);
    }
}
