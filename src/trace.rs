use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Result, bail};
use dlnademux::engine::memory::MemoryEngine;
use dlnademux::engine::{ContextId, SharesContextWith};
use dlnademux::structs::buffer::Produced;
use dlnademux::structs::codec::CodecDescriptor;
use dlnademux::structs::packet::{Packet, PacketFlags};
use dlnademux::structs::stream::{Chapter, StreamDescriptor, StreamParams};
use dlnademux::structs::time::{Rational, Time};
use serde::{Deserialize, Serialize};

use crate::input::InputReader;

/// Time base of traces written from corrected buffers.
pub const MICROSECONDS: Rational = Rational::new(1, 1_000_000);

/// A container described as YAML: declared streams and packets in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Trace {
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_us: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chapters: Vec<Chapter>,
    pub streams: Vec<StreamDescriptor>,
    #[serde(default)]
    pub packets: Vec<TracePacket>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TracePacket {
    pub stream: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dts: Option<i64>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub duration: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub convergence_duration: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub key: bool,
    /// Payload bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    /// Payload of this many zero bytes, when `data` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<usize>,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl TracePacket {
    fn into_packet(self) -> Result<Packet> {
        let data = match (self.data, self.fill) {
            (Some(data), None) => data,
            (None, Some(fill)) => vec![0u8; fill],
            (None, None) => Vec::new(),
            (Some(_), Some(_)) => bail!("Trace packet has both data and fill"),
        };

        let mut packet = Packet::new(self.stream, data);
        packet.pts = self.pts;
        packet.dts = self.dts;
        packet.duration = self.duration;
        packet.convergence_duration = self.convergence_duration;
        if self.key {
            packet.flags.insert(PacketFlags::KEY);
        }

        Ok(packet)
    }
}

impl Trace {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    pub fn into_engine(self) -> Result<MemoryEngine> {
        let mut engine = MemoryEngine::new(self.format);

        for stream in self.streams {
            engine = engine.with_stream(stream);
        }

        for chapter in self.chapters {
            engine = engine.with_chapter(chapter);
        }

        if let Some(duration) = self.duration_us {
            engine = engine.with_duration(Time::from_micros(duration));
        }

        let packets = self
            .packets
            .into_iter()
            .map(TracePacket::into_packet)
            .collect::<Result<Vec<_>>>()?;

        Ok(engine.with_packets(packets))
    }
}

pub fn looks_like_trace(header: &[u8]) -> bool {
    let text = String::from_utf8_lossy(header);
    let text = text.trim_start_matches("---").trim_start();
    text.starts_with("format:") || text.starts_with("streams:")
}

pub fn open(input_path: &Path) -> Result<MemoryEngine> {
    let mut reader = InputReader::new(input_path)?;
    let text = String::from_utf8(reader.read_all()?)?;
    Trace::from_yaml(&text)?.into_engine()
}

/// Records produced buffers as a trace on the microsecond clock.
///
/// A writer opened on an engine's codec context copies the engine's stream
/// declarations verbatim. Otherwise declarations are rebuilt from the codec
/// descriptors carried by the buffers.
pub struct TraceWriter {
    context: ContextId,
    format: String,
    duration: Option<Time>,
    chapters: Vec<Chapter>,
    codecs: BTreeMap<usize, CodecDescriptor>,
    packets: Vec<TracePacket>,
}

impl SharesContextWith for TraceWriter {
    fn context_id(&self) -> ContextId {
        self.context
    }
}

impl TraceWriter {
    pub fn new(format: impl Into<String>, source: Option<&dyn SharesContextWith>) -> Self {
        Self {
            context: source.map_or_else(ContextId::next, |source| source.context_id()),
            format: format.into(),
            duration: None,
            chapters: Vec::new(),
            codecs: BTreeMap::new(),
            packets: Vec::new(),
        }
    }

    pub fn set_duration(&mut self, duration: Option<Time>) {
        self.duration = duration;
    }

    pub fn set_chapters(&mut self, chapters: Vec<Chapter>) {
        self.chapters = chapters;
    }

    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    pub fn push(&mut self, produced: &Produced) {
        match produced {
            Produced::Audio(buffers) => {
                for b in buffers {
                    let packet = entry(b.stream_index, b.pts, b.dts, b.duration, b.data.len());
                    self.record(&b.codec, TracePacket { key: true, ..packet });
                }
            }
            Produced::Video(b) => {
                let packet = entry(b.stream_index, b.pts, b.dts, b.duration, b.data.len());
                self.record(&b.codec, TracePacket { key: b.key_frame, ..packet });
            }
            Produced::Subtitle(b) => {
                let packet = entry(b.stream_index, b.pts, b.dts, b.duration, b.data.len());
                self.record(&b.codec, TracePacket { key: true, ..packet });
            }
            Produced::Dropped => {}
        }
    }

    fn record(&mut self, codec: &CodecDescriptor, packet: TracePacket) {
        // DTS reframing replaces the codec mid-stream; the latest one wins
        self.codecs.insert(packet.stream as usize, codec.clone());
        self.packets.push(packet);
    }

    /// Builds the trace. `declared` are the source's stream declarations,
    /// used when `source` shares this writer's codec context.
    pub fn finish(
        self,
        source: Option<&dyn SharesContextWith>,
        declared: &[StreamDescriptor],
    ) -> Trace {
        let shared = source.is_some_and(|source| self.shares_context_with(source));
        let mut positions = BTreeMap::new();
        let mut streams = Vec::new();

        for (&index, codec) in &self.codecs {
            let stream = match declared.get(index) {
                Some(stream) if shared => rebased(stream, codec),
                _ => describe(index, codec),
            };
            positions.insert(index, streams.len() as i32);
            streams.push(stream);
        }

        log::debug!(
            "Trace of {} packets, {} streams ({})",
            self.packets.len(),
            streams.len(),
            if shared { "declared" } else { "derived" }
        );

        // Indices are compacted to the streams that produced buffers
        let packets = self
            .packets
            .into_iter()
            .map(|mut packet| {
                packet.stream = positions
                    .get(&(packet.stream as usize))
                    .copied()
                    .unwrap_or(packet.stream);
                packet
            })
            .collect();

        Trace {
            format: self.format,
            duration_us: self.duration.map(Time::as_micros),
            chapters: self.chapters,
            streams,
            packets,
        }
    }

    pub fn write(
        self,
        path: &Path,
        source: Option<&dyn SharesContextWith>,
        declared: &[StreamDescriptor],
    ) -> Result<()> {
        let trace = self.finish(source, declared);
        let mut writer = BufWriter::new(File::create(path)?);
        serde_yaml_ng::to_writer(&mut writer, &trace)?;
        writer.flush()?;
        Ok(())
    }
}

fn entry(
    stream_index: usize,
    pts: Option<Time>,
    dts: Option<Time>,
    duration: Time,
    len: usize,
) -> TracePacket {
    TracePacket {
        stream: stream_index as i32,
        pts: pts.map(Time::as_micros),
        dts: dts.map(Time::as_micros),
        duration: duration.as_micros(),
        fill: Some(len),
        ..Default::default()
    }
}

/// The declared stream moved onto the microsecond clock, with the codec
/// actually produced.
fn rebased(stream: &StreamDescriptor, codec: &CodecDescriptor) -> StreamDescriptor {
    let mut stream = stream.clone();
    stream.time_base = MICROSECONDS;
    stream.codec = codec.name().to_string();
    if let (StreamParams::Video { frame_rate, .. }, CodecDescriptor::Video(video)) =
        (&mut stream.params, codec)
    {
        *frame_rate = video.frame_rate;
    }
    stream
}

fn describe(index: usize, codec: &CodecDescriptor) -> StreamDescriptor {
    let params = match codec {
        CodecDescriptor::Audio(audio) => StreamParams::Audio {
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            bit_rate: audio.bit_rate,
        },
        CodecDescriptor::Video(video) => StreamParams::Video {
            width: video.width,
            height: video.height,
            aspect_ratio: video.aspect_ratio,
            frame_rate: video.frame_rate,
            bit_rate: video.bit_rate,
        },
        CodecDescriptor::Subtitle(_) => StreamParams::Subtitle,
        CodecDescriptor::Other { .. } => StreamParams::Other,
    };

    StreamDescriptor {
        index,
        native_id: None,
        codec: codec.name().to_string(),
        time_base: MICROSECONDS,
        params,
        language: None,
        title: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlnademux::engine::CodecEngine;
    use dlnademux::process::demux::Demuxer;
    use dlnademux::utils::config::DemuxConfig;

    const TRACE: &str = r#"
format: MPEG-TS (MPEG-2 Transport Stream)
chapters:
  - { title: Two, begin: 2000000, end: 4000000 }
  - { title: One, begin: 0, end: 2000000 }
streams:
  - kind: video
    native_id: 480
    codec: mpeg2video
    time_base: [1, 90000]
    width: 720
    height: 576
    frame_rate: [25, 1]
  - kind: audio
    native_id: 448
    codec: mp2
    time_base: [1, 90000]
    sample_rate: 48000
    channels: 2
    language: fra
  - kind: subtitle
    codec: text
    time_base: [1, 1000]
packets:
  - { stream: 0, dts: 900000, pts: 903600, key: true, fill: 12 }
  - { stream: 1, pts: 900000, data: [255, 253, 0, 0] }
  - { stream: 0, dts: 903600, pts: 907200, fill: 8 }
  - { stream: 2, pts: 10500, duration: 2000, data: [104, 105] }
  - { stream: 1, pts: 902160, fill: 4 }
"#;

    #[test]
    fn trace_opens_as_engine() -> Result<()> {
        let mut engine = Trace::from_yaml(TRACE)?.into_engine()?;
        engine.find_stream_info(false)?;

        assert_eq!(engine.streams().len(), 3);
        assert_eq!(engine.streams()[1].language.as_deref(), Some("fra"));
        assert_eq!(engine.packets().len(), 5);
        assert!(engine.packets()[0].is_key_frame());
        assert_eq!(engine.packets()[0].len(), 12);
        assert_eq!(&engine.packets()[1].data[..2], &[255, 253]);
        assert_eq!(engine.chapters().len(), 2);
        Ok(())
    }

    #[test]
    fn reject_data_and_fill() -> Result<()> {
        let trace = Trace::from_yaml(
            "format: x\nstreams: []\npackets:\n  - { stream: 0, data: [1], fill: 2 }\n",
        )?;
        assert!(trace.into_engine().is_err());
        Ok(())
    }

    #[test]
    fn writer_keeps_declarations_of_shared_context() -> Result<()> {
        let engine = Trace::from_yaml(TRACE)?.into_engine()?;
        let mut demuxer = Demuxer::new(DemuxConfig::default())?;
        demuxer.start(Box::new(engine), false)?;

        let source = demuxer.engine().and_then(|engine| engine.shared_context());
        let mut shared = TraceWriter::new("trace", source);
        let mut detached = TraceWriter::new("trace", None);

        for produced in demuxer.by_ref() {
            shared.push(&produced);
            detached.push(&produced);
        }

        let source = demuxer.engine().and_then(|engine| engine.shared_context());
        let declared = demuxer.declared_streams();

        let trace = shared.finish(source, declared);
        assert_eq!(trace.streams.len(), 3);
        assert_eq!(trace.streams[1].language.as_deref(), Some("fra"));
        assert_eq!(trace.streams[0].native_id, Some(0x1e0));
        assert_eq!(trace.streams[0].time_base, MICROSECONDS);

        let video: Vec<_> = trace.packets.iter().filter(|p| p.stream == 0).collect();
        assert_eq!(video[0].dts, Some(0));
        assert_eq!(video[1].dts, Some(40_000));

        let trace = detached.finish(source, declared);
        assert_eq!(trace.streams[1].language, None);
        assert_eq!(trace.streams[2].codec, "sub_rawutf8");
        Ok(())
    }
}
