use crate::features::FeatureIndex;
use crate::pool::CandidatePool;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Query vector has {found} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Search backend error: {0}")]
    Backend(String),
}

/// One entry returned by a similarity search.
///
/// Backends differ in what they hand back: bare identifiers,
/// `(identifier, distance)` pairs, or records with a `"path"` field.
/// Deserializes from any of those JSON shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchHit {
    Path(String),
    Scored(String, f64),
    Record(serde_json::Value),
}

impl SearchHit {
    /// The segment identifier carried by this hit, if it has one.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Path(p) | Self::Scored(p, _) => Some(p.as_str()),
            Self::Record(v) => v.get("path").and_then(|p| p.as_str()),
        }
    }

    /// The same hit pointing at `path` instead.
    fn with_path(self, path: String) -> Self {
        match self {
            Self::Path(_) => Self::Path(path),
            Self::Scored(_, distance) => Self::Scored(path, distance),
            Self::Record(mut v) => {
                if let Some(record) = v.as_object_mut() {
                    record.insert("path".to_string(), serde_json::Value::String(path));
                }
                Self::Record(v)
            }
        }
    }
}

/// Nearest-neighbour lookup over segment feature vectors.
pub trait SimilaritySearch {
    /// Up to `k` hits ordered from most to least similar.
    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, SearchError>;
}

impl<T: SimilaritySearch + ?Sized> SimilaritySearch for Box<T> {
    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, SearchError> {
        (**self).search(vector, k)
    }
}

/// Maps hits from a search built over another identifier space (a feature
/// table cut under a different root, say) onto the pool's own identifiers.
///
/// Each hit is resolved by exact identifier, then base name, then stem. Hits
/// with no segment in the pool are dropped.
pub struct PoolResolvedSearch<S> {
    inner: S,
    pool: CandidatePool,
}

impl<S: SimilaritySearch> PoolResolvedSearch<S> {
    pub fn new(inner: S, pool: CandidatePool) -> Self {
        Self { inner, pool }
    }
}

impl<S: SimilaritySearch> SimilaritySearch for PoolResolvedSearch<S> {
    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, SearchError> {
        let hits = self.inner.search(vector, k)?;
        let returned = hits.len();

        let resolved: Vec<SearchHit> = hits
            .into_iter()
            .filter_map(|hit| {
                let path = self.pool.resolve(hit.path()?)?.file_path.clone();
                Some(hit.with_path(path))
            })
            .collect();

        if resolved.len() < returned {
            log::debug!(
                "{} of {} search hits have no segment in the pool",
                returned - resolved.len(),
                returned
            );
        }
        Ok(resolved)
    }
}

/// Exact k-NN by cosine distance over z-score normalized feature vectors.
pub struct CosineSearch {
    mapping: Vec<String>,
    vectors: Vec<Vec<f64>>,
    means: Vec<f64>,
    stds: Vec<f64>,
    pool: rayon::ThreadPool,
}

impl CosineSearch {
    pub fn new(index: &FeatureIndex, workers: usize) -> Result<Self, SearchError> {
        let (vectors, means, stds) = normalize_features(index.rows(), index.dim());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        log::debug!(
            "Cosine search over {} vectors ({}-dim), {} workers",
            vectors.len(),
            means.len(),
            pool.current_num_threads()
        );

        Ok(Self {
            mapping: index.mapping().to_vec(),
            vectors,
            means,
            stds,
            pool,
        })
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

impl SimilaritySearch for CosineSearch {
    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, SearchError> {
        if vector.len() != self.means.len() {
            return Err(SearchError::DimensionMismatch {
                expected: self.means.len(),
                found: vector.len(),
            });
        }
        let k = k.min(self.vectors.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let query: Vec<f64> = vector
            .iter()
            .enumerate()
            .map(|(d, &v)| (v as f64 - self.means[d]) / self.stds[d])
            .collect();

        // Cosine distance = 1 - similarity (0 = identical, 2 = opposite)
        let mut distances: Vec<(usize, f64)> = self.pool.install(|| {
            self.vectors
                .par_iter()
                .enumerate()
                .map(|(j, v)| (j, 1.0 - cosine_similarity(&query, v)))
                .collect()
        });

        // Row order breaks ties so results are stable across runs
        let by_distance = |a: &(usize, f64), b: &(usize, f64)| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        };
        distances.select_nth_unstable_by(k - 1, by_distance);
        distances.truncate(k);
        distances.sort_by(by_distance);

        Ok(distances
            .into_iter()
            .map(|(j, dist)| SearchHit::Scored(self.mapping[j].clone(), dist))
            .collect())
    }
}

/// Z-score normalize each dimension: subtract mean, divide by std.
/// Returns the normalized vectors plus the per-dimension means and stds.
fn normalize_features(raw: &[Vec<f32>], dim: usize) -> (Vec<Vec<f64>>, Vec<f64>, Vec<f64>) {
    let n = raw.len().max(1) as f64;

    let mut means = vec![0.0_f64; dim];
    let mut vars = vec![0.0_f64; dim];

    for vec in raw {
        for (d, &val) in vec.iter().enumerate() {
            means[d] += val as f64;
        }
    }
    for m in &mut means {
        *m /= n;
    }

    for vec in raw {
        for (d, &val) in vec.iter().enumerate() {
            let diff = val as f64 - means[d];
            vars[d] += diff * diff;
        }
    }
    let stds: Vec<f64> = vars.iter().map(|v| (v / n).sqrt().max(1e-10)).collect();

    let normalized = raw
        .iter()
        .map(|vec| {
            vec.iter()
                .enumerate()
                .map(|(d, &val)| (val as f64 - means[d]) / stds[d])
                .collect()
        })
        .collect();

    (normalized, means, stds)
}

/// Cosine similarity between two vectors.
fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 { 0.0 } else { dot / denom }
}
