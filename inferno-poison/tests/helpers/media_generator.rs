//! Synthetic media payloads
//!
//! MP3 fixtures are MPEG-1 Layer III frames (128 kbps, stereo) with silent payloads.
//! At 48 kHz a frame is 384 bytes and 24 ms; at 44.1 kHz it is 417 bytes.

/// Duration of one generated frame
pub const FRAME_MS: u64 = 24;

const FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x94, 0x00];
const FRAME_LEN: usize = 384;

/// `count` silent frames back to back
pub fn silent_frames(count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(count * FRAME_LEN);
    for _ in 0..count {
        out.extend_from_slice(&FRAME_HEADER);
        out.resize(out.len() + FRAME_LEN - FRAME_HEADER.len(), 0);
    }
    out
}

const FRAME_HEADER_44K: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];
const FRAME_LEN_44K: usize = 417;

/// `count` silent 44.1 kHz frames back to back
pub fn silent_frames_44k(count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(count * FRAME_LEN_44K);
    for _ in 0..count {
        out.extend_from_slice(&FRAME_HEADER_44K);
        out.resize(out.len() + FRAME_LEN_44K - FRAME_HEADER_44K.len(), 0);
    }
    out
}

/// Smallest whole-frame MP3 lasting at least `duration_ms`
///
/// 3500 ms rounds up to 146 frames (3504 ms).
pub fn mp3_of_duration(duration_ms: u64) -> Vec<u8> {
    let frames = (duration_ms + FRAME_MS - 1) / FRAME_MS;
    silent_frames(frames as usize)
}

/// Minimal JFIF-signed payload
pub fn jpeg_bytes() -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
    out.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// Minimal PNG-signed payload
pub fn png_bytes() -> Vec<u8> {
    let mut out = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    out.extend_from_slice(&[0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R']);
    out.extend_from_slice(&[0u8; 17]);
    out
}
