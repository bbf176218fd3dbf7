//! MP3 packet streams
//!
//! Uploads are demuxed with symphonia but never decoded to PCM. Each packet the MPEG
//! audio reader yields is one whole frame, header included, so a run of packets
//! written back to back is itself a playable MP3 file.

use crate::error::{Error, Result};
use std::fmt;
use std::io::Cursor;
use symphonia::core::codecs::{CodecType, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Stream parameters that must agree for packets to share one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub codec: CodecType,
    pub sample_rate: u32,
    pub channels: usize,
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz, {} ch, codec {}", self.sample_rate, self.channels, self.codec)
    }
}

/// One demuxed frame
#[derive(Debug, Clone, PartialEq, Eq)]
struct Mp3Packet {
    /// Timestamp in samples from the start of the source stream
    ts: u64,
    /// Samples per channel
    dur: u64,
    data: Box<[u8]>,
}

/// A sequence of MP3 packets sharing one format
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mp3Track {
    format: Option<StreamFormat>,
    packets: Vec<Mp3Packet>,
}

impl Mp3Track {
    /// Demux every audio packet in `bytes`
    ///
    /// Tags, a leading Xing/Info frame and a truncated final frame are dropped by the
    /// reader. A stream with no packets at all is a decode error.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

        let mut hint = Hint::new();
        hint.with_extension("mp3");

        let detected = symphonia::default::get_probe()
            .format(&hint, source, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Not an MPEG audio stream: {}", e)))?;
        let mut reader = detected.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;
        let track_id = track.id;
        let format = StreamFormat {
            codec: track.codec_params.codec,
            sample_rate: track
                .codec_params
                .sample_rate
                .ok_or_else(|| Error::Decode("Sample rate unknown".to_string()))?,
            channels: track
                .codec_params
                .channels
                .map(|c| c.count())
                .ok_or_else(|| Error::Decode("Channels unknown".to_string()))?,
        };

        let mut packets = Vec::new();
        loop {
            let packet = match reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(Error::Decode(format!("Error reading packet: {}", e))),
            };
            if packet.track_id() != track_id {
                continue;
            }
            packets.push(Mp3Packet {
                ts: packet.ts(),
                dur: packet.dur(),
                data: packet.data,
            });
        }

        if packets.is_empty() {
            return Err(Error::Decode("No MPEG audio frames found".to_string()));
        }
        debug!(frames = packets.len(), format = %format, "Demuxed MP3 stream");

        Ok(Self {
            format: Some(format),
            packets,
        })
    }

    /// Format shared by every packet, `None` for an empty track
    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    pub fn frame_count(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.format.map(|f| f.sample_rate)
    }

    /// Total samples per channel
    pub fn total_samples(&self) -> u64 {
        self.packets.iter().map(|p| p.dur).sum()
    }

    /// Playing time in whole milliseconds
    pub fn duration_ms(&self) -> u64 {
        match self.sample_rate() {
            Some(rate) => self.total_samples() * 1000 / u64::from(rate),
            None => 0,
        }
    }

    /// Whether `other` could be appended to this track
    pub fn accepts(&self, other: &Mp3Track) -> bool {
        match (self.format, other.format) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => true,
        }
    }

    /// Append `other` after this track
    pub fn append(&mut self, other: Mp3Track) -> Result<()> {
        if !self.accepts(&other) {
            return Err(Error::Decode(format!(
                "Cannot join {} audio with {} audio",
                self.format.map_or_else(String::new, |f| f.to_string()),
                other.format.map_or_else(String::new, |f| f.to_string())
            )));
        }
        if self.format.is_none() {
            self.format = other.format;
        }
        self.packets.extend(other.packets);
        Ok(())
    }

    /// Cut into consecutive pieces of `chunk_ms` milliseconds
    ///
    /// A packet belongs to the piece its timestamp falls in, so the last piece may be
    /// shorter.
    pub fn split(self, chunk_ms: u64) -> Vec<Mp3Track> {
        let (Some(rate), Some(first)) = (self.sample_rate(), self.packets.first()) else {
            return Vec::new();
        };
        let origin = first.ts;
        let span = u64::from(rate) * chunk_ms.max(1);

        let mut chunks: Vec<Mp3Track> = Vec::new();
        let mut current_index = None;
        for packet in self.packets {
            let index = packet.ts.saturating_sub(origin) * 1000 / span;
            if current_index != Some(index) {
                chunks.push(Mp3Track {
                    format: self.format,
                    packets: Vec::new(),
                });
                current_index = Some(index);
            }
            if let Some(chunk) = chunks.last_mut() {
                chunk.packets.push(packet);
            }
        }

        chunks
    }

    /// Packet bytes back to back
    pub fn encode(&self) -> Vec<u8> {
        self.packets.iter().flat_map(|p| p.data.iter().copied()).collect()
    }
}
