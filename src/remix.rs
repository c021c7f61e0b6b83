use crate::beat::Beat;
use std::collections::HashSet;

/// The ordered beats of a remix. Append-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Remix {
    beats: Vec<Beat>,
}

impl Remix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            beats: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, beat: Beat) {
        self.beats.push(beat);
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    pub fn last_beat(&self) -> Option<&Beat> {
        self.beats.last()
    }

    /// Length of the current track streak: how many beats at the end of the
    /// remix share the last beat's track, the last beat included. 0 if empty.
    pub fn trailing_same_track_count(&self) -> usize {
        let Some(last) = self.beats.last() else {
            return 0;
        };
        self.beats
            .iter()
            .rev()
            .take_while(|b| b.track == last.track)
            .count()
    }

    pub fn beats(&self) -> &[Beat] {
        &self.beats
    }

    /// Number of distinct source tracks used.
    pub fn track_count(&self) -> usize {
        self.beats
            .iter()
            .map(|b| b.track.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Segment identifiers in playback order.
    pub fn file_paths(&self) -> Vec<&str> {
        self.beats.iter().map(|b| b.file_path.as_str()).collect()
    }
}

impl FromIterator<Beat> for Remix {
    fn from_iter<I: IntoIterator<Item = Beat>>(iter: I) -> Self {
        Self {
            beats: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remix_of(ids: &[&str]) -> Remix {
        ids.iter().map(|id| Beat::parse(id).unwrap()).collect()
    }

    #[test]
    fn test_empty_remix() {
        let remix = Remix::new();
        assert!(remix.is_empty());
        assert_eq!(remix.trailing_same_track_count(), 0);
        assert!(remix.last_beat().is_none());
    }

    #[test]
    fn test_track_count() {
        assert_eq!(Remix::new().track_count(), 0);
        assert_eq!(
            remix_of(&["a_0.wav", "b_4.wav", "a_1.wav", "c_2.flac"]).track_count(),
            3
        );
    }

    #[test]
    fn test_trailing_same_track_count() {
        assert_eq!(remix_of(&["a_0.wav"]).trailing_same_track_count(), 1);
        assert_eq!(
            remix_of(&["a_0.wav", "a_1.wav", "a_2.wav"]).trailing_same_track_count(),
            3
        );
        assert_eq!(
            remix_of(&["a_0.wav", "b_4.wav", "b_5.wav"]).trailing_same_track_count(),
            2
        );
        // Only the trailing streak counts, not earlier beats of the same track
        assert_eq!(
            remix_of(&["b_0.wav", "a_0.wav", "b_1.wav"]).trailing_same_track_count(),
            1
        );
    }

    #[test]
    fn test_last_beat_and_paths() {
        let mut remix = remix_of(&["a_0.wav", "b_3.wav"]);
        assert_eq!(remix.last_beat().unwrap().track, "b");
        remix.push(Beat::parse("c_1.wav").unwrap());
        assert_eq!(remix.len(), 3);
        assert_eq!(remix.file_paths(), vec!["a_0.wav", "b_3.wav", "c_1.wav"]);
    }
}
