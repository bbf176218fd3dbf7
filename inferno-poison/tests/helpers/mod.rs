//! Test helper modules for inferno-poison integration tests
//!
//! - media_generator: synthetic MP3, JPEG and PNG payloads
//! - test_state: AppState over temporary pool directories

#![allow(dead_code)]

pub mod media_generator;
pub mod test_state;

pub use media_generator::{
    jpeg_bytes, mp3_of_duration, png_bytes, silent_frames, silent_frames_44k, FRAME_MS,
};
pub use test_state::{multipart_body, TestState};
