//! Tolerant identifier matching shared by the feature table and the pool.
//!
//! Identifiers from different sources often disagree on root directory or
//! extension for the same segment, so a miss on the exact identifier falls
//! back to base name, then stem. First occurrence wins in every tier.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

/// Base-name and stem maps, built once on the first exact-match miss.
#[derive(Debug, Default, Clone)]
struct AuxiliaryIndexes {
    by_base_name: HashMap<String, usize>,
    by_stem: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct TieredLookup {
    ids: Vec<String>,
    exact: HashMap<String, usize>,
    auxiliary: OnceLock<AuxiliaryIndexes>,
}

fn base_name(identifier: &str) -> &str {
    Path::new(identifier)
        .file_name()
        .and_then(|b| b.to_str())
        .unwrap_or(identifier)
}

fn stem(identifier: &str) -> &str {
    Path::new(identifier)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_else(|| base_name(identifier))
}

impl TieredLookup {
    pub fn new(ids: Vec<String>) -> Self {
        let mut exact = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            exact.entry(id.clone()).or_insert(i);
        }
        Self {
            ids,
            exact,
            auxiliary: OnceLock::new(),
        }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Position of `identifier` under exact matching only.
    pub fn exact(&self, identifier: &str) -> Option<usize> {
        self.exact.get(identifier).copied()
    }

    /// Build the fallback maps. Runs at most once; later calls are no-ops.
    pub fn build_auxiliary_indexes(&self) {
        self.auxiliary();
    }

    fn auxiliary(&self) -> &AuxiliaryIndexes {
        self.auxiliary.get_or_init(|| {
            log::debug!("Building basename/stem indexes over {} identifiers", self.ids.len());
            let mut aux = AuxiliaryIndexes::default();
            for (i, id) in self.ids.iter().enumerate() {
                aux.by_base_name.entry(base_name(id).to_string()).or_insert(i);
                aux.by_stem.entry(stem(id).to_string()).or_insert(i);
            }
            aux
        })
    }

    /// Position of `identifier`: exact match, then base name, then stem.
    pub fn find(&self, identifier: &str) -> Option<usize> {
        if let Some(i) = self.exact(identifier) {
            return Some(i);
        }
        let aux = self.auxiliary();
        aux.by_base_name
            .get(base_name(identifier))
            .or_else(|| aux.by_stem.get(stem(identifier)))
            .copied()
    }
}
