use log::debug;

use crate::engine::{CodecEngine, ContextId, SeekFlags, SharesContextWith};
use crate::structs::codec::MediaKind;
use crate::structs::packet::Packet;
use crate::structs::stream::{Chapter, StreamDescriptor};
use crate::structs::time::Time;
use crate::utils::errors::EngineError;

/// A container held entirely in memory: declared streams plus packets in
/// container order.
#[derive(Debug)]
pub struct MemoryEngine {
    format_name: String,
    streams: Vec<StreamDescriptor>,
    packets: Vec<Packet>,
    duration: Option<Time>,
    chapters: Vec<Chapter>,
    cursor: usize,
    closed: bool,
    context: ContextId,
}

impl MemoryEngine {
    pub fn new(format_name: impl Into<String>) -> Self {
        Self {
            format_name: format_name.into(),
            streams: Vec::new(),
            packets: Vec::new(),
            duration: None,
            chapters: Vec::new(),
            cursor: 0,
            closed: false,
            context: ContextId::next(),
        }
    }

    pub fn with_stream(mut self, mut stream: StreamDescriptor) -> Self {
        stream.index = self.streams.len();
        self.streams.push(stream);
        self
    }

    pub fn with_packets(mut self, packets: impl IntoIterator<Item = Packet>) -> Self {
        self.packets.extend(packets);
        self
    }

    pub fn with_duration(mut self, duration: Time) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_chapter(mut self, chapter: Chapter) -> Self {
        self.chapters.push(chapter);
        self
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Span between the earliest and latest packet timestamp.
    pub fn measure_duration(&self) -> Option<Time> {
        let times = self.packets.iter().filter_map(|packet| self.time_stamp(packet));
        let (first, last) = times.fold(None, |range, time| match range {
            None => Some((time, time)),
            Some((first, last)) => Some((first.min(time), last.max(time))),
        })?;

        Some(last - first)
    }

    fn time_stamp(&self, packet: &Packet) -> Option<Time> {
        let stream = self.streams.get(usize::try_from(packet.stream_index).ok()?)?;
        packet.time_stamp(stream.time_base)
    }

    /// Key frames of video streams when there is video, any packet otherwise.
    fn is_seek_candidate(&self, packet: &Packet, flags: SeekFlags) -> bool {
        if flags.contains(SeekFlags::ANY) {
            return true;
        }

        let has_video = self.streams.iter().any(|s| s.kind() == MediaKind::Video);
        if !has_video {
            return true;
        }

        packet.is_key_frame()
            && usize::try_from(packet.stream_index)
                .ok()
                .and_then(|index| self.streams.get(index))
                .is_some_and(|stream| stream.kind() == MediaKind::Video)
    }
}

impl CodecEngine for MemoryEngine {
    fn format_name(&self) -> &str {
        &self.format_name
    }

    fn find_stream_info(&mut self, fast: bool) -> Result<(), EngineError> {
        if self.streams.is_empty() {
            return Err(EngineError::NoStreams);
        }

        if self.duration.is_none() && !fast {
            self.duration = self.measure_duration();
        }

        debug!(
            "{}: {} streams, {} packets",
            self.format_name,
            self.streams.len(),
            self.packets.len()
        );
        Ok(())
    }

    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, EngineError> {
        if self.closed {
            return Ok(None);
        }

        let packet = self.packets.get(self.cursor).cloned();
        if packet.is_some() {
            self.cursor += 1;
        }

        Ok(packet)
    }

    fn seek(&mut self, target: Time, flags: SeekFlags) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::SeekUnsupported);
        }

        let end = self.packets.iter().filter_map(|p| self.time_stamp(p)).max();
        if end.is_none_or(|end| target > end) {
            return Err(EngineError::SeekOutOfRange(target));
        }

        let mut candidates = self.packets.iter().enumerate().filter_map(|(i, packet)| {
            let time = self.time_stamp(packet)?;
            self.is_seek_candidate(packet, flags).then_some((i, time))
        });

        let found = if flags.contains(SeekFlags::BACKWARD) {
            candidates.filter(|&(_, time)| time <= target).last()
        } else {
            candidates.find(|&(_, time)| time >= target)
        };

        let (cursor, time) = found.ok_or(EngineError::SeekOutOfRange(target))?;
        debug!("Seek to {target} landed on packet {cursor} at {time}");
        self.cursor = cursor;

        Ok(())
    }

    fn duration(&self) -> Option<Time> {
        self.duration
    }

    fn chapters(&self) -> Vec<Chapter> {
        self.chapters.clone()
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn shared_context(&self) -> Option<&dyn SharesContextWith> {
        Some(self)
    }
}

impl SharesContextWith for MemoryEngine {
    fn context_id(&self) -> ContextId {
        self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::stream::{audio_stream, video_stream};
    use crate::structs::time::Rational;

    fn engine() -> MemoryEngine {
        let packets = (0..50).map(|i| {
            let packet = Packet::new(0, vec![0u8; 4]).with_pts(i * 3_600);
            if i % 10 == 0 { packet.with_key_frame() } else { packet }
        });

        MemoryEngine::new("memory")
            .with_stream(video_stream(7, Rational::new(25, 1)))
            .with_stream(audio_stream(7, "ac3"))
            .with_packets(packets)
    }

    #[test]
    fn streams_are_reindexed() {
        let engine = engine();
        let indices: Vec<_> = engine.streams().iter().map(|s| s.index).collect();
        assert_eq!(indices, [0, 1]);
    }

    #[test]
    fn probe_measures_duration() -> Result<(), EngineError> {
        let mut fast = engine();
        fast.find_stream_info(true)?;
        assert_eq!(fast.duration(), None);

        let mut full = engine();
        full.find_stream_info(false)?;
        assert_eq!(full.duration(), Some(Time::from_millis(49 * 40)));

        let mut empty = MemoryEngine::new("empty");
        assert!(matches!(
            empty.find_stream_info(false),
            Err(EngineError::NoStreams)
        ));
        Ok(())
    }

    #[test]
    fn seek_lands_on_key_frames() -> Result<(), EngineError> {
        let mut engine = engine();

        engine.seek(Time::from_millis(500), SeekFlags::empty())?;
        assert_eq!(engine.read_packet()?.and_then(|p| p.pts), Some(20 * 3_600));

        engine.seek(Time::from_millis(500), SeekFlags::BACKWARD)?;
        assert_eq!(engine.read_packet()?.and_then(|p| p.pts), Some(10 * 3_600));

        engine.seek(
            Time::from_millis(500),
            SeekFlags::BACKWARD.union(SeekFlags::ANY),
        )?;
        assert_eq!(engine.read_packet()?.and_then(|p| p.pts), Some(12 * 3_600));

        assert!(matches!(
            engine.seek(Time::from_secs(60), SeekFlags::empty()),
            Err(EngineError::SeekOutOfRange(_))
        ));
        Ok(())
    }

    #[test]
    fn closed_engine_reads_nothing() -> Result<(), EngineError> {
        let mut engine = engine();
        engine.close();
        assert!(engine.read_packet()?.is_none());
        Ok(())
    }
}
