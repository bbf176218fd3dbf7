//! Audio poisoning: MP3 packet streams and chunk recombination

pub mod mp3;
pub mod recombine;

pub use mp3::{Mp3Track, StreamFormat};
pub use recombine::AudioRecombinationEngine;
