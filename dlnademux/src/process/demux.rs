use crate::engine::{CodecEngine, SeekFlags};
use crate::log_or_err;
use crate::process::correct::Corrector;
use crate::process::dts;
use crate::structs::buffer::{AudioBuffer, DataBuffer, Produced, VideoBuffer};
use crate::structs::codec::{CodecDescriptor, MediaKind};
use crate::structs::context::{Clock, StreamContext, StreamTable};
use crate::structs::packet::Packet;
use crate::structs::stream::{Chapter, StreamDescriptor, StreamId, StreamInfo};
use crate::structs::time::Time;
use crate::utils::config::DemuxConfig;
use crate::utils::errors::DemuxError;
use log::{debug, info, trace, warn};
use std::collections::VecDeque;

/// Packets inspected at each end of the read-ahead queue to find its span.
const BUFFER_DURATION_PROBE: usize = 16;

/// Splits container packets into typed, timestamp-corrected buffers.
///
/// After [`Demuxer::start`] the demuxer owns the engine. Packets are pulled
/// with [`Demuxer::read`] and turned into buffers with [`Demuxer::demux`], or
/// both at once by iterating.
///
/// # Example
///
/// ```rust
/// use dlnademux::engine::memory::MemoryEngine;
/// use dlnademux::process::demux::Demuxer;
/// use dlnademux::structs::packet::Packet;
/// use dlnademux::structs::stream::{StreamDescriptor, StreamParams};
/// use dlnademux::structs::time::{Rational, Time};
/// use dlnademux::utils::config::DemuxConfig;
///
/// let stream = StreamDescriptor {
///     index: 0,
///     native_id: None,
///     codec: "ac3".to_string(),
///     time_base: Rational::new(1, 1000),
///     params: StreamParams::Audio { sample_rate: 48_000, channels: 2, bit_rate: 0 },
///     language: None,
///     title: None,
/// };
/// let packets = (0..10).map(|i| Packet::new(0, vec![0u8; 8]).with_pts(5_000 + i * 32));
/// let engine = MemoryEngine::new("memory").with_stream(stream).with_packets(packets);
///
/// let mut demuxer = Demuxer::new(DemuxConfig::default())?;
/// demuxer.start(Box::new(engine), false)?;
///
/// assert_eq!(demuxer.by_ref().count(), 10);
/// assert_eq!(demuxer.position(), Some(Time::from_millis(9 * 32)));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Demuxer {
    engine: Option<Box<dyn CodecEngine + Send>>,
    config: DemuxConfig,
    corrector: Corrector,
    contexts: StreamTable,
    selected: Vec<StreamId>,
    read_ahead: VecDeque<Packet>,
    packets_read: u64,
    fail_level: log::Level,
}

impl Demuxer {
    pub fn new(config: DemuxConfig) -> Result<Self, DemuxError> {
        config.validate()?;

        Ok(Self {
            engine: None,
            corrector: Corrector::from_config(&config),
            config,
            contexts: StreamTable::default(),
            selected: Vec::new(),
            read_ahead: VecDeque::new(),
            packets_read: 0,
            fail_level: log::Level::Error,
        })
    }

    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }

    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.engine.is_some()
    }

    /// Takes ownership of `engine`, sets up one context per stream and runs
    /// the start-up probe.
    ///
    /// The first stream of each media kind is selected. The probe reads up to
    /// `measurement_window × 8` packets ahead to measure video frame rates;
    /// those packets are replayed by later reads.
    pub fn start(
        &mut self,
        mut engine: Box<dyn CodecEngine + Send>,
        fast: bool,
    ) -> Result<(), DemuxError> {
        self.stop();

        engine
            .find_stream_info(fast)
            .map_err(DemuxError::StreamInfo)?;

        let mut default_kinds = Vec::new();
        for stream in engine.streams() {
            self.contexts
                .insert(StreamContext::new(stream, self.config.measurement_window));

            let kind = stream.kind();
            if kind != MediaKind::Other && !default_kinds.contains(&kind) {
                default_kinds.push(kind);
                self.selected.push(StreamId::index(kind, stream.index));
            }

            debug!(
                "Stream {}: {} ({})",
                stream.index,
                stream.codec,
                stream.kind()
            );
        }

        info!(
            "Opened {} with {} streams",
            engine.format_name(),
            engine.streams().len()
        );
        self.engine = Some(engine);

        self.probe();

        Ok(())
    }

    fn probe(&mut self) {
        let has_video = self.contexts.has_video();
        let corrector = self.corrector;
        let mut queue = VecDeque::new();

        for _ in 0..self.config.max_buffer_count() {
            let Some(packet) = self.read_engine() else {
                break;
            };

            let mut prepend = false;
            let mut finished = false;

            if let Ok(index) = usize::try_from(packet.stream_index) {
                let Some(context) = self.contexts.get_mut(index) else {
                    warn!("Probe stopped at packet for undeclared stream {index}");
                    break;
                };

                corrector.correct(context, packet.pts, packet.dts);

                if has_video {
                    if let Some(measurement) = context.measurement.as_mut() {
                        if measurement.is_full() {
                            finished = true;
                        } else if let Some(time) = packet.time_stamp(context.time_base) {
                            prepend = measurement.push(time);
                        }
                    }
                } else {
                    finished = self
                        .contexts
                        .iter()
                        .all(|context| context.clock.is_established());
                }
            }

            // A video packet opening a measurement goes first so that video
            // anchors the clock before any other stream is aligned to it.
            if prepend {
                queue.push_front(packet);
            } else {
                queue.push_back(packet);
            }

            if finished {
                break;
            }
        }

        debug!("Probe buffered {} packets", queue.len());

        let policy = self.config.snap_policy;
        for context in self.contexts.iter_mut() {
            let Some(measurement) = context.measurement.take() else {
                continue;
            };

            let CodecDescriptor::Video(codec) = context.codec.as_ref() else {
                continue;
            };

            let declared = codec.frame_rate;
            if let Some(rate) = measurement.estimate(declared, policy) {
                info!(
                    "Stream {}: frame rate {:.3} fps (declared {:.3} fps)",
                    context.index(),
                    rate.to_f64(),
                    declared.to_f64()
                );
                context.set_frame_rate(rate);
            }
        }

        for context in self.contexts.iter_mut() {
            if context.clock.is_established() {
                context.clock = Clock::Resume;
            }
        }

        self.read_ahead = queue;
    }

    /// Releases the engine, the read-ahead queue and all stream state.
    pub fn stop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.close();
        }

        self.contexts.clear();
        self.selected.clear();
        self.read_ahead.clear();
        self.packets_read = 0;
    }

    fn read_engine(&mut self) -> Option<Packet> {
        let engine = self.engine.as_mut()?;

        match engine.read_packet() {
            Ok(packet) => packet,
            Err(err) => {
                warn!("Read failed, treating as end of stream: {err}");
                None
            }
        }
    }

    /// Next packet, from the read-ahead queue first.
    pub fn read(&mut self) -> Option<Packet> {
        let packet = match self.read_ahead.pop_front() {
            Some(packet) => Some(packet),
            None => self.read_engine(),
        };

        if packet.is_some() {
            self.packets_read += 1;
        }

        packet
    }

    /// Reads one more packet into the read-ahead queue.
    pub fn buffer(&mut self) -> bool {
        match self.read_engine() {
            Some(packet) => {
                self.read_ahead.push_back(packet);
                true
            }
            None => false,
        }
    }

    /// Time span covered by the read-ahead queue.
    pub fn buffer_duration(&self) -> Option<Time> {
        let count = self.read_ahead.len();
        let time = |i: usize| self.time_stamp(&self.read_ahead[i]);

        let mut first = time(0);
        let mut last = time(count.checked_sub(1)?);
        for i in 1..BUFFER_DURATION_PROBE.min(count) {
            first = min_time(first, time(i));
            last = max_time(last, time(count - i - 1));
        }

        Some(last? - first?)
    }

    /// Raw timestamp of a packet in its stream's time base.
    pub fn time_stamp(&self, packet: &Packet) -> Option<Time> {
        let index = usize::try_from(packet.stream_index).ok()?;
        let stream = self.engine.as_ref()?.streams().get(index)?;

        packet.time_stamp(stream.time_base)
    }

    /// Demultiplexes one packet, absorbing anomalies.
    ///
    /// Returns `None` for packets that belong to no media stream. Packets of
    /// unselected, undeclared or unsupported streams yield
    /// [`Produced::Dropped`].
    pub fn demux(&mut self, packet: &Packet) -> Option<Produced> {
        match self.try_demux(packet) {
            Ok(produced) => produced,
            Err(err) => {
                warn!("{err}");
                Some(Produced::Dropped)
            }
        }
    }

    /// Like [`Demuxer::demux`], but anomalies at or above the fail level are
    /// returned as errors.
    pub fn try_demux(&mut self, packet: &Packet) -> Result<Option<Produced>, DemuxError> {
        let Ok(index) = usize::try_from(packet.stream_index) else {
            return Ok(None);
        };

        let Some(engine) = self.engine.as_ref() else {
            return Err(DemuxError::NotStarted);
        };

        let streams = engine.streams();
        let Some(descriptor) = streams.get(index) else {
            log_or_err!(
                self,
                log::Level::Warn,
                DemuxError::StreamOutOfRange {
                    index: packet.stream_index,
                    streams: streams.len(),
                }
            );
            return Ok(Some(Produced::Dropped));
        };

        let selected = is_selected(&self.selected, descriptor);
        let video_gap = self.contexts.video_gap();
        let corrector = self.corrector;
        let fail_level = self.fail_level;
        let dts_detection = self.config.dts_detection;
        let window = self.config.measurement_window;

        let context = self
            .contexts
            .get_or_insert_with(index, || StreamContext::new(descriptor, window));

        if !selected {
            trace!("Dropped packet of unselected stream {index}");
            return Ok(Some(Produced::Dropped));
        }

        let produced = match context.kind() {
            MediaKind::Audio => {
                let is_pcm = matches!(
                    context.codec.as_ref(),
                    CodecDescriptor::Audio(codec) if codec.is_pcm_s16()
                );
                if dts_detection && is_pcm && !context.dts_checked {
                    context.dts_checked = true;

                    if dts::is_dts(&packet.data) {
                        info!("Stream {index}: DTS frames found in PCM, reframing");
                        context.enable_dts_framing(fail_level);
                    }
                }

                let duration = context.duration(packet.duration);

                let buffers = match context.dts.as_mut() {
                    Some(framer) => {
                        let frames = framer.parse_frames(&packet.data)?;
                        if frames.is_empty() {
                            Vec::new()
                        } else {
                            let corrected = corrector.correct_to_video(
                                context, video_gap, packet.pts, packet.dts,
                            );

                            frames
                                .into_iter()
                                .map(|frame| AudioBuffer {
                                    stream_index: index,
                                    codec: context.codec.clone(),
                                    data: frame.data,
                                    pts: corrected.pts,
                                    dts: corrected.dts,
                                    duration,
                                })
                                .collect()
                        }
                    }
                    None => {
                        let corrected =
                            corrector.correct_to_video(context, video_gap, packet.pts, packet.dts);

                        vec![AudioBuffer {
                            stream_index: index,
                            codec: context.codec.clone(),
                            data: packet.data.clone(),
                            pts: corrected.pts,
                            dts: corrected.dts,
                            duration,
                        }]
                    }
                };

                Produced::Audio(buffers)
            }
            MediaKind::Video => {
                let corrected = corrector.correct(context, packet.pts, packet.dts);

                Produced::Video(VideoBuffer {
                    stream_index: index,
                    codec: context.codec.clone(),
                    data: packet.data.clone(),
                    pts: corrected.pts,
                    dts: corrected.dts,
                    duration: context.duration(packet.duration),
                    key_frame: packet.is_key_frame(),
                })
            }
            MediaKind::Subtitle => {
                let corrected =
                    corrector.correct_to_video_only(context, video_gap, packet.pts, packet.dts);
                let duration = if packet.convergence_duration > 0 {
                    packet.convergence_duration
                } else {
                    packet.duration
                };

                Produced::Subtitle(DataBuffer {
                    stream_index: index,
                    codec: context.codec.clone(),
                    data: packet.data.clone(),
                    pts: corrected.pts,
                    dts: corrected.dts,
                    duration: context.duration(duration),
                })
            }
            MediaKind::Other => Produced::Dropped,
        };

        Ok(Some(produced))
    }

    /// Replaces the selected streams.
    pub fn select_streams(&mut self, ids: impl IntoIterator<Item = StreamId>) {
        self.selected = ids.into_iter().collect();
        debug!(
            "Selected streams: {}",
            self.selected
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    pub fn selected_streams(&self) -> &[StreamId] {
        &self.selected
    }

    /// Seeks the engine to `position`.
    ///
    /// On success every stream clock is reset, so the next sample of each
    /// stream re-baselines it, and the read-ahead queue is dropped. Seeking to
    /// the start before anything was read keeps the probed packets. On
    /// failure nothing changes.
    pub fn set_position(&mut self, position: Time) -> Result<(), DemuxError> {
        let Some(engine) = self.engine.as_mut() else {
            return Err(DemuxError::NotStarted);
        };

        if position.is_zero() && self.packets_read == 0 && !self.read_ahead.is_empty() {
            debug!("Seek to start before reading, keeping read-ahead queue");
            return Ok(());
        }

        engine
            .seek(position, SeekFlags::BACKWARD)
            .map_err(|source| DemuxError::Seek {
                target: position,
                source,
            })?;

        self.read_ahead.clear();
        for context in self.contexts.iter_mut() {
            context.clock = Clock::Unset;
        }

        debug!("Seeked to {position}");
        Ok(())
    }

    /// Corrected time of the most recent sample of the first stream that has
    /// one.
    pub fn position(&self) -> Option<Time> {
        self.contexts.iter().find_map(|context| context.clock.time())
    }

    pub fn duration(&self) -> Option<Time> {
        self.engine.as_ref()?.duration()
    }

    pub fn format_name(&self) -> Option<&str> {
        self.engine.as_ref().map(|engine| engine.format_name())
    }

    /// Chapters ordered by start time.
    pub fn chapters(&self) -> Vec<Chapter> {
        let mut chapters = self
            .engine
            .as_ref()
            .map(|engine| engine.chapters())
            .unwrap_or_default();

        chapters.sort_by_key(|chapter| chapter.begin);
        chapters
    }

    pub fn audio_streams(&self) -> Vec<StreamInfo> {
        self.streams_of(MediaKind::Audio)
    }

    /// Video streams, reporting the measured frame rate where one was found.
    pub fn video_streams(&self) -> Vec<StreamInfo> {
        self.streams_of(MediaKind::Video)
    }

    pub fn data_streams(&self) -> Vec<StreamInfo> {
        self.streams_of(MediaKind::Subtitle)
    }

    fn streams_of(&self, kind: MediaKind) -> Vec<StreamInfo> {
        self.contexts
            .iter()
            .filter(|context| context.kind() == kind)
            .map(|context| StreamInfo {
                id: StreamId::for_stream(&context.descriptor),
                language: context.descriptor.language.clone(),
                title: context.descriptor.title.clone(),
                codec: context.codec.as_ref().clone(),
            })
            .collect()
    }

    /// Streams as declared by the engine.
    pub fn declared_streams(&self) -> &[StreamDescriptor] {
        self.engine
            .as_ref()
            .map(|engine| engine.streams())
            .unwrap_or_default()
    }

    pub fn engine(&self) -> Option<&(dyn CodecEngine + Send)> {
        self.engine.as_deref()
    }
}

impl Iterator for Demuxer {
    type Item = Produced;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let packet = self.read()?;
            if let Some(produced) = self.demux(&packet) {
                return Some(produced);
            }
        }
    }
}

fn is_selected(selected: &[StreamId], stream: &StreamDescriptor) -> bool {
    selected.iter().any(|id| id.matches(stream))
}

fn min_time(a: Option<Time>, b: Option<Time>) -> Option<Time> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_time(a: Option<Time>, b: Option<Time>) -> Option<Time> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryEngine;
    use crate::process::dts::tests::raw_frame;
    use crate::structs::stream::{StreamParams, audio_stream, video_stream};
    use crate::structs::time::Rational;
    use crate::utils::errors::EngineError;
    use anyhow::Result;

    const VIDEO_FRAME: i64 = 3_600; // 1/25 s at 90 kHz
    const AUDIO_BLOCK: i64 = 1_536; // 32 ms at 48 kHz

    fn demuxer() -> Result<Demuxer> {
        Ok(Demuxer::new(DemuxConfig::default())?)
    }

    /// A 25 fps video stream declared as 30 fps, interleaved with audio
    /// packets of 32 ms starting at the same raw time.
    fn av_engine(seconds: i64, audio: StreamDescriptor, audio_payload: &[Vec<u8>]) -> MemoryEngine {
        let start = 10 * 90_000;
        let audio_start = 10 * 48_000;
        let frames = seconds * 25;
        let blocks = seconds * 1_000 / 32;

        let mut packets = Vec::new();
        let mut block = 0;
        for frame in 0..frames {
            let video_time = frame * 40_000;
            while block < blocks && block * 32_000 <= video_time {
                let payload = audio_payload[block as usize % audio_payload.len()].clone();
                packets.push(
                    Packet::new(1, payload)
                        .with_pts(audio_start + block * AUDIO_BLOCK)
                        .with_duration(AUDIO_BLOCK),
                );
                block += 1;
            }

            let mut packet = Packet::new(0, vec![frame as u8; 64])
                .with_dts(start + frame * VIDEO_FRAME)
                .with_pts(start + (frame + 1) * VIDEO_FRAME)
                .with_duration(VIDEO_FRAME);
            if frame % 12 == 0 {
                packet = packet.with_key_frame();
            }
            packets.push(packet);
        }

        MemoryEngine::new("synthetic")
            .with_stream(video_stream(0, Rational::new(30, 1)))
            .with_stream(audio)
            .with_packets(packets)
    }

    fn ac3_payload() -> Vec<Vec<u8>> {
        vec![vec![0x0B, 0x77, 0, 0, 0, 0, 0, 0]]
    }

    #[test]
    fn start_fails_without_streams() -> Result<()> {
        let mut demuxer = demuxer()?;
        let result = demuxer.start(Box::new(MemoryEngine::new("empty")), false);

        assert!(matches!(
            result,
            Err(DemuxError::StreamInfo(EngineError::NoStreams))
        ));
        assert!(!demuxer.is_started());
        Ok(())
    }

    #[test]
    fn start_selects_first_of_each_kind() -> Result<()> {
        let engine = MemoryEngine::new("synthetic")
            .with_stream(audio_stream(0, "ac3"))
            .with_stream(video_stream(0, Rational::new(25, 1)))
            .with_stream(audio_stream(0, "mp2"))
            .with_stream(video_stream(0, Rational::new(25, 1)));

        let mut demuxer = demuxer()?;
        demuxer.start(Box::new(engine), true)?;

        assert_eq!(
            demuxer.selected_streams(),
            [
                StreamId::index(MediaKind::Audio, 0),
                StreamId::index(MediaKind::Video, 1),
            ]
        );
        Ok(())
    }

    #[test]
    fn probe_measures_frame_rate() -> Result<()> {
        let mut demuxer = demuxer()?;
        demuxer.start(Box::new(av_engine(8, audio_stream(0, "ac3"), &ac3_payload())), false)?;

        let video = demuxer.video_streams();
        assert_eq!(video.len(), 1);
        match &video[0].codec {
            CodecDescriptor::Video(codec) => assert_eq!(codec.frame_rate, Rational::new(25, 1)),
            other => panic!("unexpected codec {other}"),
        }

        // The first video packet is moved ahead of the audio read with it.
        let first = demuxer.read().map(|packet| packet.stream_index);
        assert_eq!(first, Some(0));
        Ok(())
    }

    #[test]
    fn selection_by_index_and_native_id() -> Result<()> {
        let mut first = audio_stream(0, "ac3");
        first.native_id = Some(0x1c0);
        let mut second = audio_stream(0, "mp2");
        second.native_id = Some(0x1c1);

        let packets = (0..4).map(|i| Packet::new(i % 2, vec![0u8; 4]).with_pts(i as i64 * 480));
        let engine = MemoryEngine::new("synthetic")
            .with_stream(first)
            .with_stream(second)
            .with_packets(packets);

        let mut demuxer = demuxer()?;
        demuxer.start(Box::new(engine), true)?;

        demuxer.select_streams([StreamId::index(MediaKind::Audio, 1)]);
        let by_index: Vec<_> = demuxer.by_ref().map(|p| p.stream_index()).collect();
        assert_eq!(by_index, [None, Some(1), None, Some(1)]);

        demuxer.set_position(Time::ZERO)?;
        demuxer.select_streams([StreamId::native(MediaKind::Audio, 0x1c0)]);
        let by_native: Vec<_> = demuxer.by_ref().map(|p| p.stream_index()).collect();
        assert_eq!(by_native, [Some(0), None, Some(0), None]);

        let unknown = Packet::new(7, vec![0u8; 4]).with_pts(0);
        assert!(matches!(demuxer.demux(&unknown), Some(Produced::Dropped)));

        let data = Packet::new(-1, vec![0u8; 4]);
        assert!(demuxer.demux(&data).is_none());
        Ok(())
    }

    #[test]
    fn strict_mode_rejects_undeclared_stream() -> Result<()> {
        let engine = MemoryEngine::new("synthetic").with_stream(audio_stream(0, "ac3"));
        let mut demuxer = demuxer()?;
        demuxer.start(Box::new(engine), true)?;
        demuxer.set_fail_level(log::Level::Warn);

        let packet = Packet::new(3, vec![0u8; 4]).with_pts(0);
        assert!(matches!(
            demuxer.try_demux(&packet),
            Err(DemuxError::StreamOutOfRange { index: 3, .. })
        ));
        Ok(())
    }

    #[test]
    fn seek_resets_clocks() -> Result<()> {
        let mut demuxer = demuxer()?;
        demuxer.start(Box::new(av_engine(20, audio_stream(0, "ac3"), &ac3_payload())), false)?;

        let before: Vec<_> = demuxer.by_ref().take(200).collect();
        assert!(before.iter().any(|p| matches!(p, Produced::Video(_))));
        assert!(demuxer.position().is_some_and(|t| t > Time::from_secs(2)));

        demuxer.set_position(Time::from_secs(15))?;
        assert_eq!(demuxer.position(), None);

        let video = demuxer.find_map(|produced| match produced {
            Produced::Video(buffer) => Some(buffer),
            _ => None,
        });
        let video = video.ok_or_else(|| anyhow::anyhow!("no video after seek"))?;
        assert_eq!(video.dts, Some(Time::ZERO));
        assert!(video.key_frame);

        let audio = demuxer.find_map(|produced| match produced {
            Produced::Audio(buffers) => buffers.into_iter().next(),
            _ => None,
        });
        let audio = audio.ok_or_else(|| anyhow::anyhow!("no audio after seek"))?;
        let pts = audio.pts.ok_or_else(|| anyhow::anyhow!("audio without pts"))?;
        assert!(pts >= Time::ZERO && pts < Time::from_secs(1));
        Ok(())
    }

    #[test]
    fn audio_ahead_of_video_after_seek_starts_fresh() -> Result<()> {
        let mut demuxer = demuxer()?;
        demuxer.start(Box::new(av_engine(20, audio_stream(0, "ac3"), &ac3_payload())), false)?;
        demuxer.by_ref().take(200).for_each(drop);

        demuxer.set_position(Time::from_secs(15))?;

        // 14.96 s into the stream, ahead of any video sample.
        let early = Packet::new(1, ac3_payload()[0].clone())
            .with_pts(10 * 48_000 + 14_960 * 48)
            .with_duration(AUDIO_BLOCK);
        let Some(Produced::Audio(buffers)) = demuxer.demux(&early) else {
            anyhow::bail!("audio packet was not produced");
        };
        assert_eq!(buffers[0].pts, Some(Time::ZERO));

        let video = demuxer.find_map(|produced| match produced {
            Produced::Video(buffer) => Some(buffer),
            _ => None,
        });
        let video = video.ok_or_else(|| anyhow::anyhow!("no video after seek"))?;
        assert_eq!(video.dts, Some(Time::ZERO));

        // Once video has re-baselined, audio is expressed in video time again.
        let audio = demuxer.find_map(|produced| match produced {
            Produced::Audio(buffers) => buffers.into_iter().next(),
            _ => None,
        });
        let audio = audio.ok_or_else(|| anyhow::anyhow!("no audio after video"))?;
        let pts = audio.pts.ok_or_else(|| anyhow::anyhow!("audio without pts"))?;
        assert!(pts >= Time::ZERO && pts < Time::from_secs(1));
        Ok(())
    }

    #[test]
    fn failed_seek_keeps_state() -> Result<()> {
        let mut demuxer = demuxer()?;
        demuxer.start(Box::new(av_engine(4, audio_stream(0, "ac3"), &ac3_payload())), false)?;
        let queued = demuxer.read_ahead.len();
        let position = demuxer.position();

        assert!(matches!(
            demuxer.set_position(Time::from_secs(3_600)),
            Err(DemuxError::Seek { .. })
        ));
        assert_eq!(demuxer.read_ahead.len(), queued);
        assert_eq!(demuxer.position(), position);
        Ok(())
    }

    #[test]
    fn seek_to_start_before_reading_is_a_no_op() -> Result<()> {
        let mut demuxer = demuxer()?;
        demuxer.start(Box::new(av_engine(4, audio_stream(0, "ac3"), &ac3_payload())), false)?;
        let queued = demuxer.read_ahead.len();
        assert!(queued > 0);

        demuxer.set_position(Time::ZERO)?;
        assert_eq!(demuxer.read_ahead.len(), queued);
        Ok(())
    }

    #[test]
    fn buffer_duration_spans_queue() -> Result<()> {
        let packets = (0..40).map(|i| Packet::new(0, vec![0u8; 4]).with_pts(i * 10));
        let mut stream = audio_stream(0, "ac3");
        stream.time_base = Rational::new(1, 1000);
        let engine = MemoryEngine::new("synthetic")
            .with_stream(stream)
            .with_packets(packets);

        let mut demuxer = demuxer()?;
        demuxer.start(Box::new(engine), true)?;

        // Without video the probe stops once every stream has a clock.
        assert_eq!(demuxer.read_ahead.len(), 1);
        assert_eq!(demuxer.buffer_duration(), Some(Time::ZERO));

        while demuxer.buffer() {}
        assert_eq!(demuxer.read_ahead.len(), 40);
        assert_eq!(demuxer.buffer_duration(), Some(Time::from_millis(390)));
        Ok(())
    }

    #[test]
    fn subtitles_follow_video_gap() -> Result<()> {
        let subtitle = StreamDescriptor {
            index: 0,
            native_id: None,
            codec: "text".to_string(),
            time_base: Rational::new(1, 1000),
            params: StreamParams::Subtitle,
            language: Some("nld".to_string()),
            title: None,
        };

        let mut packets: Vec<Packet> = (0..30)
            .map(|i| Packet::new(0, vec![0u8; 4]).with_pts(90_000 * 5 + i * VIDEO_FRAME).with_key_frame())
            .collect();
        let mut cue = Packet::new(1, b"hello".to_vec()).with_pts(5_500).with_duration(100);
        cue.convergence_duration = 2_000;
        packets.push(cue);

        let engine = MemoryEngine::new("synthetic")
            .with_stream(video_stream(0, Rational::new(25, 1)))
            .with_stream(subtitle)
            .with_packets(packets);

        let mut demuxer = demuxer()?;
        demuxer.start(Box::new(engine), true)?;

        let info = demuxer.data_streams();
        assert_eq!(info[0].codec.name(), "sub_rawutf8");
        assert_eq!(info[0].language.as_deref(), Some("nld"));

        let cue = demuxer.find_map(|produced| match produced {
            Produced::Subtitle(buffer) => Some(buffer),
            _ => None,
        });
        let cue = cue.ok_or_else(|| anyhow::anyhow!("no subtitle produced"))?;
        assert_eq!(cue.pts, Some(Time::from_millis(500)));
        assert_eq!(cue.duration, Time::from_secs(2));
        Ok(())
    }

    #[test]
    fn chapters_are_sorted() -> Result<()> {
        let chapter = |title: &str, begin: i64| Chapter {
            title: Some(title.to_string()),
            begin: Time::from_secs(begin),
            end: Time::from_secs(begin + 60),
        };
        let engine = MemoryEngine::new("synthetic")
            .with_stream(audio_stream(0, "ac3"))
            .with_chapter(chapter("two", 60))
            .with_chapter(chapter("one", 0));

        let mut demuxer = demuxer()?;
        demuxer.start(Box::new(engine), true)?;

        let titles: Vec<_> = demuxer
            .chapters()
            .into_iter()
            .filter_map(|chapter| chapter.title)
            .collect();
        assert_eq!(titles, ["one", "two"]);
        Ok(())
    }

    #[test]
    fn stop_releases_everything() -> Result<()> {
        let mut demuxer = demuxer()?;
        demuxer.start(Box::new(av_engine(2, audio_stream(0, "ac3"), &ac3_payload())), false)?;
        demuxer.stop();

        assert!(!demuxer.is_started());
        assert!(demuxer.read().is_none());
        assert!(demuxer.audio_streams().is_empty());
        assert!(matches!(
            demuxer.set_position(Time::ZERO),
            Err(DemuxError::NotStarted)
        ));
        Ok(())
    }

    #[test]
    fn dts_detection_runs_on_pcm_only() -> Result<()> {
        let mut ac3 = demuxer()?;
        ac3.start(Box::new(av_engine(2, audio_stream(0, "ac3"), &ac3_payload())), false)?;
        ac3.by_ref().for_each(drop);
        assert!(ac3.contexts.get(1).is_some_and(|c| !c.dts_checked));

        let payload = vec![vec![0x10u8; 1_536]];
        let mut pcm = demuxer()?;
        pcm.start(Box::new(av_engine(2, audio_stream(0, "pcm_s16le"), &payload)), false)?;
        pcm.by_ref().for_each(drop);
        let context = pcm.contexts.get(1);
        assert!(context.is_some_and(|c| c.dts_checked && !c.needs_dts_framing()));
        Ok(())
    }

    #[test]
    fn hidden_dts_is_reframed_against_video() -> Result<()> {
        let frames: Vec<Vec<u8>> = (0..6).map(|i| raw_frame(2_048, i)).collect();
        let stream: Vec<u8> = frames.concat();
        let payload: Vec<Vec<u8>> = stream.chunks(1_500).map(<[u8]>::to_vec).collect();

        let mut pcm = audio_stream(0, "pcm_s16le");
        pcm.native_id = Some(1);

        let mut demuxer = demuxer()?;
        demuxer.start(Box::new(av_engine(12, pcm, &payload)), false)?;

        match &demuxer.video_streams()[0].codec {
            CodecDescriptor::Video(codec) => assert_eq!(codec.frame_rate, Rational::new(25, 1)),
            other => panic!("unexpected codec {other}"),
        }

        let mut audio = Vec::new();
        let mut video = Vec::new();
        for produced in demuxer.by_ref() {
            match produced {
                Produced::Audio(buffers) => audio.extend(buffers),
                Produced::Video(buffer) => video.push(buffer),
                _ => {}
            }
        }

        assert_eq!(demuxer.audio_streams()[0].codec.name(), "dts");
        assert_eq!(
            demuxer.audio_streams()[0].id,
            StreamId::native(MediaKind::Audio, 1)
        );

        assert!(audio.len() > 30);
        for (buffer, expected) in audio.iter().zip(frames.iter().cycle()) {
            assert_eq!(buffer.data.as_ref(), &expected[..]);
        }

        let threshold = demuxer.config().jump_threshold();
        for pair in video.windows(2) {
            let (Some(a), Some(b)) = (pair[0].dts, pair[1].dts) else {
                panic!("video without dts");
            };
            assert!(b - a > -threshold);
        }

        // Audio rides the video clock: both started at the same raw time.
        for buffer in &audio {
            let pts = buffer.pts.ok_or_else(|| anyhow::anyhow!("audio without pts"))?;
            assert!(pts >= Time::ZERO && pts < Time::from_secs(12));
        }
        Ok(())
    }
}
