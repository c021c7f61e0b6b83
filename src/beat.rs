use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BeatError {
    #[error("Malformed segment identifier {identifier:?}: {reason}")]
    MalformedIdentifier { identifier: String, reason: String },
}

/// One beat-length segment on disk, named `<track>_<number><ext>`.
///
/// The track is everything before the *last* underscore of the file stem, so
/// track names may themselves contain underscores (`my_song_12.wav` → track
/// `my_song`, number 12).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Beat {
    pub file_path: String,
    pub track: String,
    pub number: u32,
}

/// Split an identifier's base name into (stem, extension). The extension keeps
/// its leading dot and may be empty.
fn split_base_name(identifier: &str) -> (&str, &str) {
    let path = Path::new(identifier);
    let base = path.file_name().and_then(|b| b.to_str()).unwrap_or("");
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(base);
    (stem, &base[stem.len()..])
}

fn malformed(identifier: &str, reason: impl Into<String>) -> BeatError {
    BeatError::MalformedIdentifier {
        identifier: identifier.to_string(),
        reason: reason.into(),
    }
}

/// Split a stem into its track part and raw number part at the last underscore.
fn split_stem<'a>(identifier: &str, stem: &'a str) -> Result<(&'a str, &'a str), BeatError> {
    stem.rsplit_once('_')
        .ok_or_else(|| {
            malformed(
                identifier,
                format!("expected '<track>_<index>.ext' but got '{stem}'"),
            )
        })
}

impl Beat {
    /// Parse a segment identifier (a path or bare file name).
    pub fn parse(identifier: &str) -> Result<Self, BeatError> {
        let (stem, _) = split_base_name(identifier);
        let (track, number) = split_stem(identifier, stem)?;
        let number = number
            .parse::<u32>()
            .map_err(|e| malformed(identifier, format!("segment number '{number}': {e}")))?;

        Ok(Self {
            file_path: identifier.to_string(),
            track: track.to_string(),
            number,
        })
    }

    /// Identifier of the segment that directly follows this one in its track.
    pub fn next_identifier(&self) -> Result<String, BeatError> {
        let next = self
            .number
            .checked_add(1)
            .ok_or_else(|| malformed(&self.file_path, "segment number overflows"))?;
        with_number(&self.file_path, next)
    }
}

impl fmt::Display for Beat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.track, self.number)
    }
}

/// Rewrite the trailing `_<number>` of an identifier's base name, keeping the
/// directory and extension untouched.
pub fn with_number(identifier: &str, number: u32) -> Result<String, BeatError> {
    let (stem, ext) = split_base_name(identifier);
    let (track, _) = split_stem(identifier, stem)?;
    let renamed = Path::new(identifier).with_file_name(format!("{track}_{number}{ext}"));
    Ok(renamed.to_string_lossy().into_owned())
}
