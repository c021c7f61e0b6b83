pub mod beat;
pub mod config;
pub mod features;
pub mod lookup;
pub mod merge;
pub mod pool;
pub mod remix;
pub mod search;
pub mod selector;
pub mod sequencer;

/// Segment file extensions picked up by pool discovery
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "wav", "flac", "ogg",
    // AIFF under both spellings
    "aif", "aiff",
];

/// Application name for XDG paths
pub const APP_NAME: &str = "beatremix";
