use std::path::Path;

use anyhow::Result;
use dlnademux::engine::{CodecEngine, SeekFlags};
use dlnademux::structs::packet::Packet;
use dlnademux::structs::stream::{StreamDescriptor, StreamParams};
use dlnademux::structs::time::{Rational, Time};
use dlnademux::utils::errors::EngineError;

use crate::input::InputReader;

/// Sample frames carried by one packet.
pub const SAMPLES_PER_PACKET: usize = 1536;

/// Layout of interleaved 16-bit PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u32,
    pub big_endian: bool,
}

impl Default for PcmFormat {
    /// CD audio, the usual carrier of DTS.
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            big_endian: false,
        }
    }
}

impl PcmFormat {
    pub fn block_align(&self) -> usize {
        self.channels as usize * 2
    }

    pub fn codec_name(&self) -> &'static str {
        if self.big_endian {
            "pcm_s16be"
        } else {
            "pcm_s16le"
        }
    }

    pub fn stream(&self) -> StreamDescriptor {
        StreamDescriptor {
            index: 0,
            native_id: None,
            codec: self.codec_name().to_string(),
            time_base: Rational::new(1, self.sample_rate as i64),
            params: StreamParams::Audio {
                sample_rate: self.sample_rate,
                channels: self.channels,
                bit_rate: self.sample_rate * self.channels * 16,
            },
            language: None,
            title: None,
        }
    }
}

/// Headerless 16-bit PCM as a one-stream container.
///
/// Packets are read on demand so that pipes stream through. Timestamps count
/// sample frames from the start of the data.
pub struct PcmEngine {
    reader: InputReader,
    format_name: String,
    format: PcmFormat,
    streams: Vec<StreamDescriptor>,
    data_len: Option<u64>,
    samples_read: i64,
    closed: bool,
}

impl PcmEngine {
    pub fn open(input_path: &Path) -> Result<Self> {
        let reader = InputReader::new(input_path)?;
        let data_len = reader.size();
        Ok(Self::new(reader, "raw PCM", PcmFormat::default(), data_len))
    }

    /// Engine over `reader`, positioned at the first sample.
    pub fn new(
        reader: InputReader,
        format_name: impl Into<String>,
        format: PcmFormat,
        data_len: Option<u64>,
    ) -> Self {
        Self {
            reader,
            format_name: format_name.into(),
            format,
            streams: vec![format.stream()],
            data_len,
            samples_read: 0,
            closed: false,
        }
    }
}

impl CodecEngine for PcmEngine {
    fn format_name(&self) -> &str {
        &self.format_name
    }

    fn find_stream_info(&mut self, _fast: bool) -> Result<(), EngineError> {
        if self.format.channels == 0 || self.format.sample_rate == 0 {
            return Err(EngineError::Malformed(format!(
                "{} Hz, {} channels",
                self.format.sample_rate, self.format.channels
            )));
        }
        Ok(())
    }

    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, EngineError> {
        if self.closed {
            return Ok(None);
        }

        let block_align = self.format.block_align();
        let mut data = vec![0u8; SAMPLES_PER_PACKET * block_align];
        let filled = self.reader.read_full(&mut data)?;

        // Trailing partial sample frames are dropped
        let samples = filled / block_align;
        if samples == 0 {
            return Ok(None);
        }
        data.truncate(samples * block_align);

        let packet = Packet::new(0, data)
            .with_pts(self.samples_read)
            .with_duration(samples as i64)
            .with_key_frame();
        self.samples_read += samples as i64;

        Ok(Some(packet))
    }

    fn seek(&mut self, _target: Time, _flags: SeekFlags) -> Result<(), EngineError> {
        Err(EngineError::SeekUnsupported)
    }

    fn duration(&self) -> Option<Time> {
        let samples = self.data_len? / self.format.block_align() as u64;
        Some(Time::from_clock(
            samples as i64,
            Rational::new(1, self.format.sample_rate as i64),
        ))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[test]
fn packets_count_sample_frames() -> Result<()> {
    let bytes = vec![0u8; (SAMPLES_PER_PACKET + 100) * 4 + 3];
    let len = Some(bytes.len() as u64);
    let reader = InputReader::from_bytes(bytes);
    let mut engine = PcmEngine::new(reader, "raw PCM", PcmFormat::default(), len);
    engine.find_stream_info(false)?;

    let first = engine.read_packet()?.ok_or_else(|| anyhow::anyhow!("no packet"))?;
    assert_eq!(first.pts, Some(0));
    assert_eq!(first.len(), SAMPLES_PER_PACKET * 4);

    let second = engine.read_packet()?.ok_or_else(|| anyhow::anyhow!("no packet"))?;
    assert_eq!(second.pts, Some(SAMPLES_PER_PACKET as i64));
    assert_eq!(second.duration, 100);
    assert!(engine.read_packet()?.is_none());

    assert_eq!(
        engine.duration(),
        Some(Time::from_clock(1636, Rational::new(1, 44_100)))
    );
    assert!(matches!(
        engine.seek(Time::ZERO, SeekFlags::empty()),
        Err(EngineError::SeekUnsupported)
    ));
    Ok(())
}
