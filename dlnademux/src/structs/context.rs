//! Per-stream demuxing state.

use std::sync::Arc;

use crate::process::dts::DtsFramer;
use crate::process::framerate::Measurement;
use crate::structs::codec::{CodecDescriptor, MediaKind};
use crate::structs::stream::StreamDescriptor;
use crate::structs::time::{Rational, Time};

/// The last corrected base timestamp of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    /// No sample seen since start or the last seek. The next sample
    /// re-baselines the stream to zero.
    #[default]
    Unset,
    /// Established, but the next sample is taken as continuous whatever its
    /// distance. Used when replaying the start-up probe.
    Resume,
    At(Time),
}

impl Clock {
    pub fn time(self) -> Option<Time> {
        match self {
            Clock::At(time) => Some(time),
            Clock::Unset | Clock::Resume => None,
        }
    }

    pub fn is_established(self) -> bool {
        !matches!(self, Clock::Unset)
    }
}

#[derive(Debug)]
pub struct StreamContext {
    pub descriptor: StreamDescriptor,
    pub codec: Arc<CodecDescriptor>,
    pub time_base: Rational,
    /// DTS detection runs once per stream.
    pub dts_checked: bool,
    /// Present while the stream is being reframed as DTS.
    pub dts: Option<DtsFramer>,
    pub clock: Clock,
    /// Offset subtracted from raw timestamps, `None` until the first sample.
    pub time_stamp_gap: Option<Time>,
    /// Frame-rate samples, only kept for video until the probe completes.
    pub measurement: Option<Measurement>,
}

impl StreamContext {
    pub fn new(descriptor: &StreamDescriptor, measurement_window: usize) -> Self {
        let measurement =
            (descriptor.kind() == MediaKind::Video).then(|| Measurement::new(measurement_window));

        Self {
            descriptor: descriptor.clone(),
            codec: Arc::new(descriptor.codec_descriptor()),
            time_base: descriptor.time_base,
            dts_checked: false,
            dts: None,
            clock: Clock::Unset,
            time_stamp_gap: None,
            measurement,
        }
    }

    pub fn index(&self) -> usize {
        self.descriptor.index
    }

    pub fn kind(&self) -> MediaKind {
        self.descriptor.kind()
    }

    pub fn needs_dts_framing(&self) -> bool {
        self.dts.is_some()
    }

    /// Switches the stream to DTS reframing and reports it as DTS audio.
    pub fn enable_dts_framing(&mut self, fail_level: log::Level) {
        let mut framer = DtsFramer::default();
        framer.fail_level = fail_level;
        self.dts = Some(framer);

        if let CodecDescriptor::Audio(codec) = self.codec.as_ref() {
            self.codec = Arc::new(CodecDescriptor::Audio(codec.as_dts()));
        }
    }

    pub fn set_frame_rate(&mut self, frame_rate: Rational) {
        if let CodecDescriptor::Video(codec) = Arc::make_mut(&mut self.codec) {
            codec.frame_rate = frame_rate;
        }
    }

    /// Converts a duration in ticks to the microsecond clock.
    pub fn duration(&self, ticks: i64) -> Time {
        Time::from_clock(ticks, self.time_base)
    }
}

/// Stream contexts indexed by container stream index.
///
/// Slots for indices not yet seen stay empty.
#[derive(Debug, Default)]
pub struct StreamTable {
    contexts: Vec<Option<StreamContext>>,
}

impl StreamTable {
    pub fn get(&self, index: usize) -> Option<&StreamContext> {
        self.contexts.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut StreamContext> {
        self.contexts.get_mut(index).and_then(Option::as_mut)
    }

    pub fn get_or_insert_with(
        &mut self,
        index: usize,
        create: impl FnOnce() -> StreamContext,
    ) -> &mut StreamContext {
        if index >= self.contexts.len() {
            self.contexts.resize_with(index + 1, || None);
        }

        self.contexts[index].get_or_insert_with(create)
    }

    pub fn insert(&mut self, context: StreamContext) {
        let index = context.index();
        if index >= self.contexts.len() {
            self.contexts.resize_with(index + 1, || None);
        }

        self.contexts[index] = Some(context);
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamContext> {
        self.contexts.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StreamContext> {
        self.contexts.iter_mut().flatten()
    }

    /// Gap of the first video stream, the anchor for every other stream.
    ///
    /// Stale while the video clock is unset, as after a seek, until the next
    /// video sample re-baselines it.
    pub fn video_gap(&self) -> Option<Time> {
        self.iter()
            .find(|context| context.kind() == MediaKind::Video)
            .filter(|context| context.clock.is_established())
            .and_then(|context| context.time_stamp_gap)
    }

    pub fn has_video(&self) -> bool {
        self.iter().any(|context| context.kind() == MediaKind::Video)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.contexts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::stream::{audio_stream, video_stream};

    #[test]
    fn sparse_indices_leave_holes() {
        let mut table = StreamTable::default();
        table.insert(StreamContext::new(&audio_stream(3, "ac3"), 96));

        assert_eq!(table.len(), 1);
        assert!(table.get(0).is_none());
        assert!(table.get(3).is_some());

        let video = video_stream(1, Rational::new(25, 1));
        let context = table.get_or_insert_with(1, || StreamContext::new(&video, 96));
        assert!(context.measurement.is_some());
        assert_eq!(table.iter().map(StreamContext::index).collect::<Vec<_>>(), [1, 3]);
    }

    #[test]
    fn video_gap_follows_first_video() {
        let mut table = StreamTable::default();
        table.insert(StreamContext::new(&audio_stream(0, "ac3"), 96));
        table.insert(StreamContext::new(&video_stream(1, Rational::new(25, 1)), 96));
        table.insert(StreamContext::new(&video_stream(2, Rational::new(25, 1)), 96));
        assert!(table.has_video());
        assert_eq!(table.video_gap(), None);

        if let Some(context) = table.get_mut(2) {
            context.time_stamp_gap = Some(Time::from_secs(9));
        }
        assert_eq!(table.video_gap(), None);

        if let Some(context) = table.get_mut(1) {
            context.time_stamp_gap = Some(Time::from_secs(4));
        }
        assert_eq!(table.video_gap(), None);

        if let Some(context) = table.get_mut(1) {
            context.clock = Clock::At(Time::ZERO);
        }
        assert_eq!(table.video_gap(), Some(Time::from_secs(4)));

        if let Some(context) = table.get_mut(1) {
            context.clock = Clock::Unset;
        }
        assert_eq!(table.video_gap(), None);
    }

    #[test]
    fn dts_framing_renames_codec() {
        let mut context = StreamContext::new(&audio_stream(0, "pcm_s16le"), 96);
        assert!(!context.needs_dts_framing());

        context.enable_dts_framing(log::Level::Error);
        assert!(context.needs_dts_framing());
        match context.codec.as_ref() {
            CodecDescriptor::Audio(codec) => {
                assert_eq!(codec.name, "dts");
                assert_eq!(codec.sample_rate, 48_000);
                assert_eq!(codec.channels, 2);
            }
            other => panic!("unexpected codec {other}"),
        }
    }
}
