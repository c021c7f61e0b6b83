//! Segment identifier → feature-vector lookup.
//!
//! The feature table is produced offline alongside the similarity model, so
//! the identifiers it was built with don't always match the ones discovered
//! for a given run (absolute vs relative paths, a moved segments directory).
//! Lookups therefore fall back from exact match to base name to stem.

use crate::lookup::TieredLookup;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error(
        "{identifier:?} not found in mapping; tried exact, basename, and stem matching \
         (mapping size={pool_size})"
    )]
    NotFound { identifier: String, pool_size: usize },
    #[error("Feature table misaligned: {mapping} identifiers but {rows} feature rows")]
    Misaligned { mapping: usize, rows: usize },
    #[error("Feature row {row} has {found} values, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Feature row {row} has a non-finite value in column {column}")]
    NonFinite { row: usize, column: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid feature table: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk feature table: identifiers and their vectors, positionally aligned.
#[derive(Debug, Deserialize)]
struct FeatureTableFile {
    mapping: Vec<String>,
    features: Vec<Vec<f32>>,
}

#[derive(Debug)]
pub struct FeatureIndex {
    lookup: TieredLookup,
    features: Vec<Vec<f32>>,
}

impl FeatureIndex {
    /// Build an index over `mapping`, where `features[i]` belongs to `mapping[i]`.
    pub fn new(mapping: Vec<String>, features: Vec<Vec<f32>>) -> Result<Self, FeatureError> {
        if mapping.len() != features.len() {
            return Err(FeatureError::Misaligned {
                mapping: mapping.len(),
                rows: features.len(),
            });
        }
        if let Some(first) = features.first() {
            let expected = first.len();
            if let Some((row, r)) = features.iter().enumerate().find(|(_, r)| r.len() != expected)
            {
                return Err(FeatureError::Ragged {
                    row,
                    expected,
                    found: r.len(),
                });
            }
        }
        // One inf or NaN poisons the column statistics of every search
        for (row, r) in features.iter().enumerate() {
            if let Some(column) = r.iter().position(|v| !v.is_finite()) {
                return Err(FeatureError::NonFinite { row, column });
            }
        }

        Ok(Self {
            lookup: TieredLookup::new(mapping),
            features,
        })
    }

    /// Load a JSON feature table: `{"mapping": [...], "features": [[...], ...]}`.
    pub fn load(path: &Path) -> Result<Self, FeatureError> {
        let contents = std::fs::read_to_string(path)?;
        let table: FeatureTableFile = serde_json::from_str(&contents)?;
        let index = Self::new(table.mapping, table.features)?;
        log::info!(
            "Loaded {} feature vectors ({}-dim) from {}",
            index.len(),
            index.dim(),
            path.display()
        );
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// Vector dimension (0 for an empty table).
    pub fn dim(&self) -> usize {
        self.features.first().map_or(0, Vec::len)
    }

    pub fn mapping(&self) -> &[String] {
        self.lookup.ids()
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.features
    }

    /// Build the base-name and stem fallback maps. Runs at most once; later
    /// calls are no-ops.
    pub fn build_auxiliary_indexes(&self) {
        self.lookup.build_auxiliary_indexes();
    }

    /// Row index for `identifier`: exact match, then base name, then stem.
    pub fn lookup(&self, identifier: &str) -> Result<usize, FeatureError> {
        self.lookup
            .find(identifier)
            .ok_or_else(|| FeatureError::NotFound {
                identifier: identifier.to_string(),
                pool_size: self.lookup.len(),
            })
    }

    pub fn vector(&self, identifier: &str) -> Result<&[f32], FeatureError> {
        let i = self.lookup(identifier)?;
        Ok(&self.features[i])
    }
}
