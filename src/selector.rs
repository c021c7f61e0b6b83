//! Next-beat selection.
//!
//! Each step either continues the current track with its next segment, or
//! "jumps" to an acoustically similar segment of another track. The longer the
//! current track streak, the likelier a jump:
//!
//! `p = jump_rate × log10(run)`, jump when a uniform draw `r ∈ [0, 1)` has `r <= p`.
//!
//! `p` is intentionally unclamped: `jump_rate × log10(run) > 1` means every
//! step jumps. A streak of one beat gives `p = 0`, so a fresh track always gets
//! at least a second beat unless its continuation is missing.

use crate::beat::{Beat, BeatError};
use crate::features::{FeatureError, FeatureIndex};
use crate::pool::CandidatePool;
use crate::remix::Remix;
use crate::search::{SearchError, SearchHit, SimilaritySearch};
use rand::Rng;
use thiserror::Error;

/// Candidates requested from the similarity search per jump.
pub const DEFAULT_SEARCH_K: usize = 500;

#[derive(Error, Debug)]
pub enum SelectError {
    #[error("{0}")]
    MalformedIdentifier(#[from] BeatError),
    #[error("No feature vector for {identifier}: {source}")]
    FeatureNotFound {
        identifier: String,
        #[source]
        source: FeatureError,
    },
    #[error(
        "Similarity search returned no usable identifiers \
         (got {returned} candidates; none were paths)"
    )]
    NoValidCandidates { returned: usize },
    #[error("Similarity search failed: {0}")]
    Search(#[from] SearchError),
}

/// How a beat was picked.
#[derive(Debug, Clone, PartialEq)]
pub enum Choice {
    /// Opening beat, drawn at random.
    First,
    /// Next segment of the current track.
    Continue,
    /// Continuation missing from the pool; drawn at random.
    Random,
    /// Similarity jump. `candidates` is the search result the beat came from.
    Jump { candidates: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub beat: Beat,
    pub choice: Choice,
}

pub struct BeatSelector<S> {
    jump_rate: f64,
    search_k: usize,
    pool: CandidatePool,
    features: FeatureIndex,
    search: S,
}

impl<S: SimilaritySearch> BeatSelector<S> {
    pub fn new(jump_rate: f64, pool: CandidatePool, features: FeatureIndex, search: S) -> Self {
        Self {
            jump_rate,
            search_k: DEFAULT_SEARCH_K,
            pool,
            features,
            search,
        }
    }

    pub fn with_search_k(mut self, k: usize) -> Self {
        self.search_k = k;
        self
    }

    pub fn jump_rate(&self) -> f64 {
        self.jump_rate
    }

    pub fn pool(&self) -> &CandidatePool {
        &self.pool
    }

    /// Jump probability for a track streak of `run` beats. Not clamped to `[0, 1]`.
    pub fn jump_threshold(&self, run: usize) -> f64 {
        if run > 0 {
            self.jump_rate * (run as f64).log10()
        } else {
            0.0
        }
    }

    /// Pick the beat that follows `remix`.
    pub fn choose_next<R: Rng + ?Sized>(
        &self,
        remix: &Remix,
        rng: &mut R,
    ) -> Result<Selection, SelectError> {
        let Some(last) = remix.last_beat() else {
            return Ok(Selection {
                beat: self.pool.choose(rng).clone(),
                choice: Choice::First,
            });
        };

        let run = remix.trailing_same_track_count();
        let threshold = self.jump_threshold(run);
        let r: f64 = rng.gen_range(0.0..1.0);

        if r <= threshold {
            log::trace!("Jump from {} (run={}, r={:.3}, p={:.3})", last, run, r, threshold);
            self.jump_from(last)
        } else {
            self.continue_or_random(last, rng)
        }
    }

    fn jump_from(&self, last: &Beat) -> Result<Selection, SelectError> {
        let vector = self
            .features
            .vector(&last.file_path)
            .map_err(|source| SelectError::FeatureNotFound {
                identifier: last.file_path.clone(),
                source,
            })?;

        let hits = self.search.search(vector, self.search_k)?;
        let candidates = candidate_paths(&hits)?;
        let beat = closest_of_other_track(&candidates, last)?;

        Ok(Selection {
            beat,
            choice: Choice::Jump { candidates },
        })
    }

    fn continue_or_random<R: Rng + ?Sized>(
        &self,
        last: &Beat,
        rng: &mut R,
    ) -> Result<Selection, SelectError> {
        let next = last.next_identifier()?;
        if let Some(beat) = self.pool.get(&next) {
            return Ok(Selection {
                beat: beat.clone(),
                choice: Choice::Continue,
            });
        }

        log::trace!("{} has no successor in pool; drawing at random", last);
        Ok(Selection {
            beat: self.pool.choose(rng).clone(),
            choice: Choice::Random,
        })
    }
}

/// Identifiers carried by a search result, in result order. Hits without one
/// are dropped.
fn candidate_paths(hits: &[SearchHit]) -> Result<Vec<String>, SelectError> {
    let paths: Vec<String> = hits
        .iter()
        .filter_map(|h| h.path().map(str::to_string))
        .collect();

    if paths.is_empty() {
        return Err(SelectError::NoValidCandidates {
            returned: hits.len(),
        });
    }
    if paths.len() < hits.len() {
        log::warn!(
            "Dropped {} of {} search hits without an identifier",
            hits.len() - paths.len(),
            hits.len()
        );
    }
    Ok(paths)
}

/// First candidate whose track differs from `last`'s; the first candidate if
/// none does.
///
/// Candidates are parsed in order and a malformed one fails the jump, but only
/// if it is reached before a candidate from another track.
fn closest_of_other_track(candidates: &[String], last: &Beat) -> Result<Beat, SelectError> {
    let mut first: Option<Beat> = None;

    for id in candidates {
        let beat = Beat::parse(id)?;
        if beat.track != last.track {
            return Ok(beat);
        }
        if first.is_none() {
            first = Some(beat);
        }
    }

    log::debug!("All {} jump candidates share track {}", candidates.len(), last.track);
    first.ok_or(SelectError::NoValidCandidates { returned: 0 })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    /// Search backend that ignores the query and returns a fixed result list.
    pub(crate) struct FixedSearch(pub Vec<SearchHit>);

    impl SimilaritySearch for FixedSearch {
        fn search(&self, _vector: &[f32], k: usize) -> Result<Vec<SearchHit>, SearchError> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    pub(crate) fn paths(ids: &[&str]) -> FixedSearch {
        FixedSearch(ids.iter().map(|id| SearchHit::Path(id.to_string())).collect())
    }

    pub(crate) fn features_for(ids: &[&str]) -> FeatureIndex {
        FeatureIndex::new(
            ids.iter().map(|s| s.to_string()).collect(),
            ids.iter().enumerate().map(|(i, _)| vec![i as f32, 1.0]).collect(),
        )
        .unwrap()
    }

    fn remix_of(ids: &[&str]) -> Remix {
        ids.iter().map(|id| Beat::parse(id).unwrap()).collect()
    }

    fn selector(jump_rate: f64, pool: &[&str], search: FixedSearch) -> BeatSelector<FixedSearch> {
        BeatSelector::new(
            jump_rate,
            CandidatePool::from_identifiers(pool).unwrap(),
            features_for(pool),
            search,
        )
    }

    #[test]
    fn test_first_beat_from_pool() {
        let sel = selector(0.5, &["a_0.wav", "b_0.wav"], paths(&[]));
        let mut rng = Pcg32::seed_from_u64(1);
        let s = sel.choose_next(&Remix::new(), &mut rng).unwrap();
        assert_eq!(s.choice, Choice::First);
        assert!(sel.pool().contains(&s.beat.file_path));
    }

    #[test]
    fn test_jump_threshold_unclamped() {
        let sel = selector(0.5, &["a_0.wav"], paths(&[]));
        assert_eq!(sel.jump_threshold(0), 0.0);
        assert_eq!(sel.jump_threshold(1), 0.0);
        assert!((sel.jump_threshold(10) - 0.5).abs() < 1e-12);
        assert!((sel.jump_threshold(10_000) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_continues_in_track() {
        let sel = selector(0.5, &["a_0.wav", "a_1.wav", "b_0.wav"], paths(&[]));
        let remix = remix_of(&["a_0.wav"]);
        for seed in 0..20 {
            let mut rng = Pcg32::seed_from_u64(seed);
            let s = sel.choose_next(&remix, &mut rng).unwrap();
            assert_eq!(s.choice, Choice::Continue);
            assert_eq!(s.beat.track, "a");
            assert_eq!(s.beat.number, 1);
            assert_eq!(s.beat.file_path, "a_1.wav");
        }
    }

    #[test]
    fn test_random_fallback_when_track_exhausted() {
        let sel = selector(0.5, &["a_0.wav", "b_0.wav"], paths(&[]));
        let remix = remix_of(&["a_0.wav"]);
        let mut rng = Pcg32::seed_from_u64(3);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let s = sel.choose_next(&remix, &mut rng).unwrap();
            assert_eq!(s.choice, Choice::Random);
            seen.insert(s.beat.file_path);
        }
        let expected: std::collections::HashSet<String> =
            ["a_0.wav".to_string(), "b_0.wav".to_string()].into();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_zero_jump_rate_never_jumps() {
        let pool: Vec<String> = (0..50).map(|i| format!("a_{i}.wav")).collect();
        let pool: Vec<&str> = pool.iter().map(String::as_str).collect();
        let sel = selector(0.0, &pool, paths(&["b_0.wav"]));
        let remix = remix_of(&pool[..40]);
        let mut rng = Pcg32::seed_from_u64(11);
        for _ in 0..1000 {
            let s = sel.choose_next(&remix, &mut rng).unwrap();
            assert!(!matches!(s.choice, Choice::Jump { .. }));
        }
    }

    #[test]
    fn test_jump_picks_other_track() {
        let sel = selector(
            10.0,
            &["a_0.wav", "a_1.wav", "a_2.wav"],
            paths(&["a_3.wav", "b_7.wav"]),
        );
        let remix = remix_of(&["a_0.wav", "a_1.wav"]);
        let mut rng = Pcg32::seed_from_u64(5);
        let s = sel.choose_next(&remix, &mut rng).unwrap();
        assert_eq!(s.beat.track, "b");
        assert_eq!(s.beat.number, 7);
        assert_eq!(
            s.choice,
            Choice::Jump {
                candidates: vec!["a_3.wav".into(), "b_7.wav".into()]
            }
        );
    }

    #[test]
    fn test_forced_jump_never_continues() {
        // p = 10 × log10(2) ≈ 3 > 1, even though a_2 is available
        let sel = selector(10.0, &["a_0.wav", "a_1.wav", "a_2.wav"], paths(&["c_1.wav"]));
        let remix = remix_of(&["a_0.wav", "a_1.wav"]);
        let mut rng = Pcg32::seed_from_u64(9);
        for _ in 0..200 {
            let s = sel.choose_next(&remix, &mut rng).unwrap();
            assert!(matches!(s.choice, Choice::Jump { .. }));
            assert_eq!(s.beat.file_path, "c_1.wav");
        }
    }

    #[test]
    fn test_jump_falls_back_to_first_candidate() {
        let sel = selector(10.0, &["a_0.wav", "a_1.wav"], paths(&["a_3.wav", "a_5.wav"]));
        let remix = remix_of(&["a_0.wav", "a_1.wav"]);
        let mut rng = Pcg32::seed_from_u64(2);
        let s = sel.choose_next(&remix, &mut rng).unwrap();
        assert_eq!(s.beat.file_path, "a_3.wav");
        assert!(matches!(s.choice, Choice::Jump { .. }));
    }

    #[test]
    fn test_jump_extracts_every_hit_shape() {
        let search = FixedSearch(vec![
            SearchHit::Record(serde_json::json!({"dist": 0.0})),
            SearchHit::Scored("a_4.wav".into(), 0.05),
            SearchHit::Record(serde_json::json!({"path": "b_2.wav", "dist": 0.1})),
        ]);
        let sel = selector(10.0, &["a_0.wav", "a_1.wav"], search);
        let remix = remix_of(&["a_0.wav", "a_1.wav"]);
        let mut rng = Pcg32::seed_from_u64(2);
        let s = sel.choose_next(&remix, &mut rng).unwrap();
        assert_eq!(s.beat.file_path, "b_2.wav");
        assert_eq!(
            s.choice,
            Choice::Jump {
                candidates: vec!["a_4.wav".into(), "b_2.wav".into()]
            }
        );
    }

    #[test]
    fn test_jump_without_usable_hits() {
        let search = FixedSearch(vec![
            SearchHit::Record(serde_json::json!(1.5)),
            SearchHit::Record(serde_json::json!({"id": 3})),
        ]);
        let sel = selector(10.0, &["a_0.wav", "a_1.wav"], search);
        let remix = remix_of(&["a_0.wav", "a_1.wav"]);
        let mut rng = Pcg32::seed_from_u64(2);
        let err = sel.choose_next(&remix, &mut rng).unwrap_err();
        assert!(matches!(err, SelectError::NoValidCandidates { returned: 2 }));
    }

    #[test]
    fn test_jump_with_empty_search_result() {
        let sel = selector(10.0, &["a_0.wav", "a_1.wav"], paths(&[]));
        let remix = remix_of(&["a_0.wav", "a_1.wav"]);
        let mut rng = Pcg32::seed_from_u64(2);
        assert!(matches!(
            sel.choose_next(&remix, &mut rng),
            Err(SelectError::NoValidCandidates { returned: 0 })
        ));
    }

    #[test]
    fn test_jump_missing_features() {
        let sel = BeatSelector::new(
            10.0,
            CandidatePool::from_identifiers(["a_0.wav", "a_1.wav"]).unwrap(),
            features_for(&["z_0.wav"]),
            paths(&["b_0.wav"]),
        );
        let remix = remix_of(&["a_0.wav", "a_1.wav"]);
        let mut rng = Pcg32::seed_from_u64(2);
        let err = sel.choose_next(&remix, &mut rng).unwrap_err();
        match err {
            SelectError::FeatureNotFound { identifier, source } => {
                assert_eq!(identifier, "a_1.wav");
                assert!(matches!(source, FeatureError::NotFound { pool_size: 1, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_candidate_is_strict() {
        let sel = selector(
            10.0,
            &["a_0.wav", "a_1.wav"],
            paths(&["a_2.wav", "bogus.wav", "b_1.wav"]),
        );
        let remix = remix_of(&["a_0.wav", "a_1.wav"]);
        let mut rng = Pcg32::seed_from_u64(2);
        assert!(matches!(
            sel.choose_next(&remix, &mut rng),
            Err(SelectError::MalformedIdentifier(_))
        ));
    }

    #[test]
    fn test_malformed_candidate_after_match_is_not_reached() {
        let sel = selector(10.0, &["a_0.wav", "a_1.wav"], paths(&["b_1.wav", "bogus.wav"]));
        let remix = remix_of(&["a_0.wav", "a_1.wav"]);
        let mut rng = Pcg32::seed_from_u64(2);
        assert_eq!(sel.choose_next(&remix, &mut rng).unwrap().beat.file_path, "b_1.wav");
    }

    #[test]
    fn test_jump_respects_search_k() {
        let sel = selector(10.0, &["a_0.wav", "a_1.wav"], paths(&["a_2.wav", "b_1.wav"]))
            .with_search_k(1);
        let remix = remix_of(&["a_0.wav", "a_1.wav"]);
        let mut rng = Pcg32::seed_from_u64(2);
        let s = sel.choose_next(&remix, &mut rng).unwrap();
        // b_1 is beyond k, so the same-track fallback applies
        assert_eq!(s.beat.file_path, "a_2.wav");
    }

    #[test]
    fn test_jump_does_not_touch_pool() {
        let sel = selector(10.0, &["a_0.wav", "a_1.wav"], paths(&["x_0.wav", "y_0.wav"]));
        let remix = remix_of(&["a_0.wav", "a_1.wav"]);
        let mut rng = Pcg32::seed_from_u64(2);
        sel.choose_next(&remix, &mut rng).unwrap();
        assert_eq!(sel.pool().len(), 2);
        assert!(!sel.pool().contains("x_0.wav"));
    }
}
