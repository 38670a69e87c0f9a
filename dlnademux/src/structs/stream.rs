//! Stream declarations, selectors and query results.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::structs::codec::{AudioCodec, CodecDescriptor, DataCodec, MediaKind, VideoCodec};
use crate::structs::time::{Rational, Time};

/// A stream as declared by the codec engine after probing the container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    #[serde(default)]
    pub index: usize,
    /// Persistent id assigned by the container (e.g. an MPEG-TS PID).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_id: Option<i32>,
    pub codec: String,
    pub time_base: Rational,
    #[serde(flatten)]
    pub params: StreamParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StreamParams {
    Audio {
        sample_rate: u32,
        channels: u32,
        #[serde(default)]
        bit_rate: u32,
    },
    Video {
        width: u32,
        height: u32,
        #[serde(default = "default_aspect_ratio")]
        aspect_ratio: f32,
        /// Frame rate declared by the container, in frames per second.
        frame_rate: Rational,
        #[serde(default)]
        bit_rate: u32,
    },
    Subtitle,
    Other,
}

fn default_aspect_ratio() -> f32 {
    1.0
}

impl StreamDescriptor {
    pub fn kind(&self) -> MediaKind {
        match self.params {
            StreamParams::Audio { .. } => MediaKind::Audio,
            StreamParams::Video { .. } => MediaKind::Video,
            StreamParams::Subtitle => MediaKind::Subtitle,
            StreamParams::Other => MediaKind::Other,
        }
    }

    /// The native id, if the container assigns a meaningful one.
    pub fn native(&self) -> Option<i32> {
        self.native_id.filter(|&id| id > 0)
    }

    /// Builds the codec descriptor reported for this stream.
    pub fn codec_descriptor(&self) -> CodecDescriptor {
        match self.params {
            StreamParams::Audio {
                sample_rate,
                channels,
                bit_rate,
            } => CodecDescriptor::Audio(AudioCodec {
                name: self.codec.clone(),
                channels,
                sample_rate,
                stream_id: self.index,
                bit_rate,
            }),
            StreamParams::Video {
                width,
                height,
                aspect_ratio,
                frame_rate,
                bit_rate,
            } => CodecDescriptor::Video(VideoCodec {
                name: self.codec.clone(),
                width,
                height,
                aspect_ratio,
                frame_rate,
                stream_id: self.index,
                bit_rate,
            }),
            StreamParams::Subtitle => CodecDescriptor::Subtitle(DataCodec {
                name: if self.codec == "text" {
                    "sub_rawutf8".to_string()
                } else {
                    self.codec.clone()
                },
                stream_id: self.index,
            }),
            StreamParams::Other => CodecDescriptor::Other {
                name: self.codec.clone(),
            },
        }
    }
}

/// Selects a stream either by its position in the container or by its
/// native id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId {
    pub kind: MediaKind,
    #[serde(default)]
    pub native: bool,
    pub id: i32,
}

impl StreamId {
    pub fn index(kind: MediaKind, index: usize) -> Self {
        Self {
            kind,
            native: false,
            id: index as i32,
        }
    }

    pub fn native(kind: MediaKind, id: i32) -> Self {
        Self {
            kind,
            native: true,
            id,
        }
    }

    /// The id a query reports for `stream`: native when the container has one.
    pub fn for_stream(stream: &StreamDescriptor) -> Self {
        match stream.native() {
            Some(id) => Self::native(stream.kind(), id),
            None => Self::index(stream.kind(), stream.index),
        }
    }

    pub fn matches(&self, stream: &StreamDescriptor) -> bool {
        if self.native {
            stream.native_id == Some(self.id)
        } else {
            self.id >= 0 && self.id as usize == stream.index
        }
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.native {
            write!(f, "{}#0x{:x}", self.kind, self.id)
        } else {
            write!(f, "{}:{}", self.kind, self.id)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamInfo {
    pub id: StreamId,
    pub language: Option<String>,
    pub title: Option<String>,
    pub codec: CodecDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(default)]
    pub title: Option<String>,
    pub begin: Time,
    pub end: Time,
}

#[cfg(test)]
pub(crate) fn audio_stream(index: usize, codec: &str) -> StreamDescriptor {
    StreamDescriptor {
        index,
        native_id: None,
        codec: codec.to_string(),
        time_base: Rational::new(1, 48_000),
        params: StreamParams::Audio {
            sample_rate: 48_000,
            channels: 2,
            bit_rate: 1_536_000,
        },
        language: None,
        title: None,
    }
}

#[cfg(test)]
pub(crate) fn video_stream(index: usize, frame_rate: Rational) -> StreamDescriptor {
    StreamDescriptor {
        index,
        native_id: None,
        codec: "mpeg2video".to_string(),
        time_base: Rational::new(1, 90_000),
        params: StreamParams::Video {
            width: 720,
            height: 576,
            aspect_ratio: 1.0,
            frame_rate,
            bit_rate: 0,
        },
        language: None,
        title: None,
    }
}

#[test]
fn selector_addressing() {
    let mut first = audio_stream(0, "ac3");
    first.native_id = Some(0x1c1);
    let second = audio_stream(1, "mp2");

    let by_index = StreamId::index(MediaKind::Audio, 1);
    assert!(!by_index.matches(&first));
    assert!(by_index.matches(&second));

    let by_native = StreamId::native(MediaKind::Audio, 0x1c1);
    assert!(by_native.matches(&first));
    assert!(!by_native.matches(&second));

    assert_eq!(StreamId::for_stream(&first), by_native);
    assert_eq!(StreamId::for_stream(&second), by_index);
}

#[test]
fn text_subtitles_are_raw_utf8() {
    let stream = StreamDescriptor {
        index: 3,
        native_id: None,
        codec: "text".to_string(),
        time_base: Rational::new(1, 1000),
        params: StreamParams::Subtitle,
        language: Some("eng".to_string()),
        title: None,
    };

    assert_eq!(stream.codec_descriptor().name(), "sub_rawutf8");
    assert_eq!(stream.kind(), MediaKind::Subtitle);
}
