//! Codec descriptors attached to every produced buffer.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::structs::time::Rational;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Subtitle,
    Other,
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Subtitle => write!(f, "subtitle"),
            MediaKind::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioCodec {
    pub name: String,
    pub channels: u32,
    pub sample_rate: u32,
    pub stream_id: usize,
    pub bit_rate: u32,
}

impl AudioCodec {
    pub fn is_pcm_s16(&self) -> bool {
        matches!(self.name.as_str(), "pcm_s16le" | "pcm_s16be")
    }

    /// The same stream reinterpreted as carrying DTS frames.
    pub fn as_dts(&self) -> Self {
        Self {
            name: "dts".to_string(),
            bit_rate: 0,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoCodec {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f32,
    /// Frames per second.
    pub frame_rate: Rational,
    pub stream_id: usize,
    pub bit_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataCodec {
    pub name: String,
    pub stream_id: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CodecDescriptor {
    Audio(AudioCodec),
    Video(VideoCodec),
    Subtitle(DataCodec),
    Other { name: String },
}

impl CodecDescriptor {
    pub fn kind(&self) -> MediaKind {
        match self {
            CodecDescriptor::Audio(_) => MediaKind::Audio,
            CodecDescriptor::Video(_) => MediaKind::Video,
            CodecDescriptor::Subtitle(_) => MediaKind::Subtitle,
            CodecDescriptor::Other { .. } => MediaKind::Other,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CodecDescriptor::Audio(codec) => &codec.name,
            CodecDescriptor::Video(codec) => &codec.name,
            CodecDescriptor::Subtitle(codec) => &codec.name,
            CodecDescriptor::Other { name } => name,
        }
    }
}

impl Display for CodecDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecDescriptor::Audio(codec) => write!(
                f,
                "{} {} Hz, {} ch",
                codec.name, codec.sample_rate, codec.channels
            ),
            CodecDescriptor::Video(codec) => write!(
                f,
                "{} {}x{} @ {:.3} fps",
                codec.name,
                codec.width,
                codec.height,
                codec.frame_rate.to_f64()
            ),
            CodecDescriptor::Subtitle(codec) => write!(f, "{}", codec.name),
            CodecDescriptor::Other { name } => write!(f, "{name}"),
        }
    }
}
