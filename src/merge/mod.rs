pub mod decode;

use decode::{DecodeError, Segment};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Failed to decode {identifier}: {source}")]
    Decode {
        identifier: String,
        #[source]
        source: DecodeError,
    },
    #[error("{identifier} is {found} Hz, expected {expected} Hz")]
    SampleRateMismatch {
        identifier: String,
        expected: u32,
        found: u32,
    },
    #[error("Nothing to merge and no sample rate configured")]
    NoSegments,
    #[error("WAV write error: {0}")]
    Wav(#[from] hound::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mono audio assembled from a sequence of segments.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Write as a mono 32-bit float WAV.
    pub fn write_wav(&self, path: &Path) -> Result<(), MergeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &s in &self.samples {
            writer.write_sample(s)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

/// Concatenates decoded segments end to end. No crossfading or resampling:
/// every segment must already share one sample rate.
#[derive(Debug, Default)]
pub struct ChunkMerger {
    sample_rate: Option<u32>,
    show_progress: bool,
}

impl ChunkMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require this sample rate instead of taking it from the first segment.
    pub fn with_sample_rate(mut self, sample_rate: Option<u32>) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Decode `identifiers` in order and join their samples.
    ///
    /// Repeated identifiers are decoded once.
    pub fn concatenate<S: AsRef<str>>(
        &self,
        identifiers: &[S],
    ) -> Result<AudioBuffer, MergeError> {
        let pb = if self.show_progress {
            ProgressBar::new(identifiers.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} segments ({eta}) {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
        );

        let mut cache: HashMap<&str, Segment> = HashMap::new();
        let mut sample_rate = self.sample_rate;
        let mut samples: Vec<f32> = Vec::new();

        for id in identifiers {
            let id = id.as_ref();
            if !cache.contains_key(id) {
                let segment =
                    decode::load_segment(Path::new(id)).map_err(|source| MergeError::Decode {
                        identifier: id.to_string(),
                        source,
                    })?;
                cache.insert(id, segment);
            }
            let segment = &cache[id];

            match sample_rate {
                None => sample_rate = Some(segment.sample_rate),
                Some(expected) if expected != segment.sample_rate => {
                    return Err(MergeError::SampleRateMismatch {
                        identifier: id.to_string(),
                        expected,
                        found: segment.sample_rate,
                    });
                }
                Some(_) => {}
            }

            samples.extend_from_slice(&segment.samples);
            pb.inc(1);
        }

        pb.finish_with_message("merged");

        let sample_rate = sample_rate.ok_or(MergeError::NoSegments)?;
        log::info!(
            "Merged {} segments ({} distinct) into {:.1}s of audio",
            identifiers.len(),
            cache.len(),
            samples.len() as f64 / sample_rate as f64
        );
        Ok(AudioBuffer {
            samples,
            sample_rate,
        })
    }
}
