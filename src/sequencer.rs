use crate::remix::Remix;
use crate::search::SimilaritySearch;
use crate::selector::{BeatSelector, Choice, SelectError, Selection};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use std::fmt;

/// RNG for a run: fixed seed for reproducible remixes, entropy otherwise.
pub fn create_rng(seed: Option<u64>) -> Pcg32 {
    match seed {
        Some(seed) => Pcg32::seed_from_u64(seed),
        None => Pcg32::from_entropy(),
    }
}

/// Tally of how each beat of a remix was chosen.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemixStats {
    pub first: usize,
    pub continued: usize,
    pub random: usize,
    pub jumps: usize,
}

impl RemixStats {
    pub fn record(&mut self, selection: &Selection) {
        match selection.choice {
            Choice::First => self.first += 1,
            Choice::Continue => self.continued += 1,
            Choice::Random => self.random += 1,
            Choice::Jump { .. } => self.jumps += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.first + self.continued + self.random + self.jumps
    }
}

impl fmt::Display for RemixStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} beats: {} continued, {} jumps, {} random",
            self.total(),
            self.continued,
            self.jumps,
            self.random + self.first
        )
    }
}

/// Drives a `BeatSelector` until a remix reaches the requested length.
pub struct RemixSequencer<S, R = Pcg32> {
    selector: BeatSelector<S>,
    rng: R,
    show_progress: bool,
}

impl<S: SimilaritySearch, R: Rng> RemixSequencer<S, R> {
    pub fn new(selector: BeatSelector<S>, rng: R) -> Self {
        Self {
            selector,
            rng,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn selector(&self) -> &BeatSelector<S> {
        &self.selector
    }

    /// Generate a remix of exactly `length` beats. Any selection failure
    /// aborts the run; no partial remix is returned.
    pub fn generate(&mut self, length: usize) -> Result<Remix, SelectError> {
        self.generate_with(length, |_| {})
    }

    /// Like [`generate`](Self::generate), reporting every selection as it is made.
    pub fn generate_with<F>(
        &mut self,
        length: usize,
        mut on_select: F,
    ) -> Result<Remix, SelectError>
    where
        F: FnMut(&Selection),
    {
        let pb = if self.show_progress {
            ProgressBar::new(length as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} beats ({eta}) {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
        );

        let mut remix = Remix::with_capacity(length);
        let mut stats = RemixStats::default();

        while remix.len() < length {
            let selection = match self.selector.choose_next(&remix, &mut self.rng) {
                Ok(s) => s,
                Err(e) => {
                    pb.abandon_with_message("failed");
                    return Err(e);
                }
            };
            log::debug!(
                "beat {}: {} ({:?})",
                remix.len(),
                selection.beat,
                ChoiceKind(&selection.choice)
            );
            stats.record(&selection);
            on_select(&selection);
            remix.push(selection.beat);
            pb.inc(1);
        }

        pb.finish_with_message("done");
        log::info!("Generated remix: {}", stats);
        Ok(remix)
    }
}

/// Debug view of a `Choice` without the jump's full candidate list.
struct ChoiceKind<'a>(&'a Choice);

impl fmt::Debug for ChoiceKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Choice::First => f.write_str("first"),
            Choice::Continue => f.write_str("continue"),
            Choice::Random => f.write_str("random"),
            Choice::Jump { candidates } => write!(f, "jump over {} candidates", candidates.len()),
        }
    }
}
