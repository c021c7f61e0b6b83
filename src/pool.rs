use crate::beat::{Beat, BeatError};
use crate::lookup::TieredLookup;
use crate::SUPPORTED_EXTENSIONS;
use rand::Rng;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("No audio segments found in {}", .dir.display())]
    Empty { dir: PathBuf },
    #[error("Candidate pool is empty")]
    NoCandidates,
    #[error("{0}")]
    Malformed(#[from] BeatError),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Every segment eligible for selection, indexed by identifier.
///
/// Never empty. Membership and identifier → beat resolution are hash lookups;
/// insertion order is kept so random draws are reproducible under a seeded RNG.
#[derive(Debug, Clone)]
pub struct CandidatePool {
    beats: Vec<Beat>,
    by_path: TieredLookup,
}

impl CandidatePool {
    /// Build a pool from segment identifiers. Duplicates collapse to one entry.
    pub fn from_identifiers<I, S>(identifiers: I) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut beats = Vec::new();
        let mut seen = HashSet::new();

        for id in identifiers {
            let id = id.as_ref();
            if !seen.insert(id.to_string()) {
                continue;
            }
            beats.push(Beat::parse(id)?);
        }

        if beats.is_empty() {
            return Err(PoolError::NoCandidates);
        }

        let by_path = TieredLookup::new(beats.iter().map(|b| b.file_path.clone()).collect());
        Ok(Self { beats, by_path })
    }

    /// List segment files under `dir` with a supported audio extension.
    ///
    /// Files whose names don't follow `<track>_<n>.<ext>` are skipped with a
    /// warning. Paths are sorted so the pool order doesn't depend on the
    /// filesystem.
    pub fn discover(dir: &Path, recursive: bool) -> Result<Self, PoolError> {
        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut paths: Vec<String> = Vec::new();

        for entry in WalkDir::new(dir).follow_links(true).max_depth(max_depth) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let ext = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();
            if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
                paths.push(entry.path().to_string_lossy().to_string());
            }
        }
        paths.sort();

        let mut skipped = 0usize;
        let valid: Vec<String> = paths
            .into_iter()
            .filter(|p| match Beat::parse(p) {
                Ok(_) => true,
                Err(e) => {
                    log::warn!("Skipping segment: {}", e);
                    skipped += 1;
                    false
                }
            })
            .collect();

        if valid.is_empty() {
            return Err(PoolError::Empty {
                dir: dir.to_path_buf(),
            });
        }

        log::info!(
            "Discovered {} segments in {} ({} skipped)",
            valid.len(),
            dir.display(),
            skipped
        );
        Self::from_identifiers(valid)
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.by_path.exact(identifier).is_some()
    }

    pub fn get(&self, identifier: &str) -> Option<&Beat> {
        self.by_path.exact(identifier).map(|i| &self.beats[i])
    }

    /// The pool's beat for an identifier from another source, matched by
    /// exact identifier, then base name, then stem.
    pub fn resolve(&self, identifier: &str) -> Option<&Beat> {
        self.by_path.find(identifier).map(|i| &self.beats[i])
    }

    /// Uniformly random beat.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &Beat {
        &self.beats[rng.gen_range(0..self.beats.len())]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Beat> {
        self.beats.iter()
    }

    /// Number of distinct source tracks in the pool.
    pub fn track_count(&self) -> usize {
        self.beats
            .iter()
            .map(|b| b.track.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}
