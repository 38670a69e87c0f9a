use crate::structs::context::{Clock, StreamContext};
use crate::structs::time::Time;
use crate::utils::config::DemuxConfig;
use log::{debug, trace};

/// Corrected presentation and decoding timestamps of one packet.
///
/// A `None` presentation timestamp with a known decoding timestamp means it
/// is to be recovered after decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Corrected {
    pub pts: Option<Time>,
    pub dts: Option<Time>,
}

/// Maps raw container timestamps onto one continuous clock anchored to video.
#[derive(Debug, Clone, Copy)]
pub struct Corrector {
    pub jump_threshold: Time,
    pub video_sync_threshold: Time,
}

impl Default for Corrector {
    fn default() -> Self {
        Self::from_config(&DemuxConfig::default())
    }
}

impl Corrector {
    pub fn from_config(config: &DemuxConfig) -> Self {
        Self {
            jump_threshold: config.jump_threshold(),
            video_sync_threshold: config.video_sync_threshold(),
        }
    }

    /// Corrects a packet against its own stream clock.
    ///
    /// The first sample of a stream, or the first after a seek, becomes zero.
    /// Steps larger than the jump threshold are folded into the stream gap so
    /// that the corrected clock stays continuous.
    pub fn correct(
        &self,
        context: &mut StreamContext,
        pts: Option<i64>,
        dts: Option<i64>,
    ) -> Corrected {
        let gap = context.time_stamp_gap.unwrap_or(Time::ZERO);
        let time_base = context.time_base;
        let to_time = |ticks: i64| Time::from_clock(ticks, time_base) - gap;

        let (mut base, mut pts, mut dts) = match (pts.map(to_time), dts.map(to_time)) {
            (Some(pts), Some(dts)) if (pts - dts).abs() <= self.jump_threshold => {
                (pts.min(dts), Some(pts), Some(dts))
            }
            (Some(pts), Some(dts)) => {
                trace!(
                    "Stream {}: pts {pts} and dts {dts} disagree, pts deferred",
                    context.index()
                );
                (dts, None, Some(dts))
            }
            (Some(time), None) | (None, Some(time)) => (time, Some(time), Some(time)),
            (None, None) => return Corrected::default(),
        };

        let shift = match context.clock {
            Clock::Unset => {
                debug!(
                    "Stream {}: clock baselined at {}",
                    context.index(),
                    base + gap
                );
                Some(base)
            }
            Clock::Resume => None,
            Clock::At(last) => {
                let delta = base - last;
                if delta.abs() > self.jump_threshold {
                    debug!(
                        "Stream {}: absorbed timestamp jump of {delta} at {last}",
                        context.index()
                    );
                    Some(delta)
                } else {
                    None
                }
            }
        };

        if let Some(shift) = shift {
            context.time_stamp_gap = Some(gap + shift);
            base -= shift;
            pts = pts.map(|t| t - shift);
            dts = dts.map(|t| t - shift);
        }

        context.clock = Clock::At(base);

        Corrected { pts, dts }
    }

    /// Corrects an audio packet against the video clock.
    ///
    /// When both stream gaps are known and agree within the video sync
    /// threshold, the packet is expressed directly in video time and the
    /// stream's own clock is left alone. Otherwise the stream runs on its own
    /// corrected clock.
    pub fn correct_to_video(
        &self,
        context: &mut StreamContext,
        video_gap: Option<Time>,
        pts: Option<i64>,
        dts: Option<i64>,
    ) -> Corrected {
        if let (Some(video_gap), Some(gap)) = (video_gap, context.time_stamp_gap) {
            if (gap - video_gap).abs() < self.video_sync_threshold {
                return relative(context, video_gap, pts, dts);
            }
        }

        self.correct(context, pts, dts)
    }

    /// Corrects a subtitle packet against the video clock only.
    ///
    /// Subtitles are best-effort: no fallback and no monotonic clamp, so the
    /// result may step backwards.
    pub fn correct_to_video_only(
        &self,
        context: &StreamContext,
        video_gap: Option<Time>,
        pts: Option<i64>,
        dts: Option<i64>,
    ) -> Corrected {
        relative(context, video_gap.unwrap_or(Time::ZERO), pts, dts)
    }
}

fn relative(context: &StreamContext, gap: Time, pts: Option<i64>, dts: Option<i64>) -> Corrected {
    let to_time = |ticks: i64| Time::from_clock(ticks, context.time_base) - gap;

    Corrected {
        pts: pts.map(to_time),
        dts: dts.map(to_time),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::stream::{audio_stream, video_stream};
    use crate::structs::time::Rational;

    const FRAME: i64 = 3_600; // 1/25 s at 90 kHz

    fn video() -> StreamContext {
        StreamContext::new(&video_stream(0, Rational::new(25, 1)), 96)
    }

    fn audio() -> StreamContext {
        StreamContext::new(&audio_stream(1, "ac3"), 96)
    }

    fn secs(s: i64) -> i64 {
        s * 90_000
    }

    #[test]
    fn first_sample_starts_at_zero() {
        let corrector = Corrector::default();
        let mut context = video();

        let first = corrector.correct(&mut context, Some(secs(7) + FRAME), Some(secs(7)));
        assert_eq!(first.dts, Some(Time::ZERO));
        assert_eq!(first.pts, Some(Time::from_millis(40)));
        assert_eq!(context.time_stamp_gap, Some(Time::from_secs(7)));
        assert_eq!(context.clock, Clock::At(Time::ZERO));

        let second = corrector.correct(&mut context, Some(secs(7) + 2 * FRAME), None);
        assert_eq!(second.pts, Some(Time::from_millis(80)));
        assert_eq!(second.dts, Some(Time::from_millis(80)));
    }

    #[test]
    fn monotonic_across_resets() {
        let corrector = Corrector::default();
        let mut context = video();

        // Two forward jumps and one backward reset of the source clock.
        let offsets = [(0, secs(100)), (50, secs(3_700)), (120, secs(5)), (200, secs(86_000))];
        let raw: Vec<i64> = (0..300)
            .map(|i| {
                let offset = offsets.iter().rev().find(|(at, _)| i >= *at).map_or(0, |o| o.1);
                offset + (i as i64) * FRAME
            })
            .collect();

        let corrected: Vec<Time> = raw
            .iter()
            .filter_map(|&ts| corrector.correct(&mut context, None, Some(ts)).dts)
            .collect();

        assert_eq!(corrected.len(), raw.len());
        for (pair, raw) in corrected.windows(2).zip(raw.windows(2)) {
            let step = pair[1] - pair[0];
            let raw_step = Time::from_clock(raw[1] - raw[0], context.time_base);
            if raw_step.abs() > corrector.jump_threshold {
                assert!(step.abs() < corrector.jump_threshold);
            } else {
                assert!(step >= Time::ZERO);
            }
        }
    }

    #[test]
    fn jump_accumulates_into_gap() {
        let corrector = Corrector::default();
        let mut context = video();
        let jump = secs(42);

        for i in 0..10 {
            corrector.correct(&mut context, Some(secs(1) + i * FRAME), None);
        }
        let gap_before = context.time_stamp_gap.unwrap_or_default();
        let last = context.clock.time().unwrap_or_default();

        let after = corrector.correct(&mut context, Some(secs(1) + 10 * FRAME + jump), None);
        let gap_after = context.time_stamp_gap.unwrap_or_default();

        let absorbed = Time::from_clock(jump + FRAME, context.time_base);
        assert_eq!(gap_after - gap_before, absorbed);
        assert!(after.pts.is_some_and(|pts| (pts - last).abs() < corrector.jump_threshold));

        let next = corrector.correct(&mut context, Some(secs(1) + 11 * FRAME + jump), None);
        assert_eq!(next.pts.zip(after.pts).map(|(n, a)| n - a), Some(Time::from_millis(40)));
    }

    #[test]
    fn disagreeing_pts_is_deferred() {
        let corrector = Corrector::default();
        let mut context = video();
        corrector.correct(&mut context, Some(secs(2)), Some(secs(2)));

        let corrected = corrector.correct(&mut context, Some(secs(40)), Some(secs(2) + FRAME));
        assert_eq!(corrected.pts, None);
        assert_eq!(corrected.dts, Some(Time::from_millis(40)));
    }

    #[test]
    fn missing_timestamps_keep_clock() {
        let corrector = Corrector::default();
        let mut context = video();
        corrector.correct(&mut context, Some(secs(3)), None);
        let clock = context.clock;

        assert_eq!(corrector.correct(&mut context, None, None), Corrected::default());
        assert_eq!(context.clock, clock);
    }

    #[test]
    fn resumed_clock_skips_jump_check() {
        let corrector = Corrector::default();
        let mut context = video();
        corrector.correct(&mut context, Some(secs(3)), None);
        context.clock = Clock::Resume;

        let corrected = corrector.correct(&mut context, Some(secs(30)), None);
        assert_eq!(corrected.pts, Some(Time::from_secs(27)));
        assert_eq!(context.time_stamp_gap, Some(Time::from_secs(3)));
    }

    #[test]
    fn audio_follows_video_clock() {
        let corrector = Corrector::default();
        let mut video = video();
        let mut audio = audio();

        corrector.correct(&mut video, Some(secs(10)), Some(secs(10)));
        let video_gap = video.time_stamp_gap;

        // Own gap unknown: the stream baselines itself.
        let first = corrector.correct_to_video(&mut audio, video_gap, Some(10 * 48_000 + 480), None);
        assert_eq!(first.pts, Some(Time::ZERO));

        let next = corrector.correct_to_video(&mut audio, video_gap, Some(10 * 48_000 + 960), None);
        assert_eq!(next.pts, Some(Time::from_millis(20)));
        assert_eq!(next.dts, None);
        assert_eq!(audio.clock, Clock::At(Time::ZERO));
    }

    #[test]
    fn distant_audio_runs_free() {
        let corrector = Corrector::default();
        let mut video = video();
        let mut audio = audio();

        corrector.correct(&mut video, Some(secs(10)), None);
        corrector.correct(&mut audio, Some(60 * 48_000), None);

        let corrected =
            corrector.correct_to_video(&mut audio, video.time_stamp_gap, Some(60 * 48_000 + 960), None);
        assert_eq!(corrected.pts, Some(Time::from_millis(20)));
        assert_eq!(audio.clock, Clock::At(Time::from_millis(20)));
    }

    #[test]
    fn subtitles_are_not_clamped() {
        let corrector = Corrector::default();
        let subtitle = audio();

        let free = corrector.correct_to_video_only(&subtitle, None, Some(48_000), None);
        assert_eq!(free.pts, Some(Time::from_secs(1)));

        let early = corrector.correct_to_video_only(
            &subtitle,
            Some(Time::from_secs(5)),
            Some(48_000),
            Some(48_000),
        );
        assert_eq!(early.pts, Some(Time::from_secs(-4)));
        assert_eq!(early.dts, Some(Time::from_secs(-4)));
    }
}
