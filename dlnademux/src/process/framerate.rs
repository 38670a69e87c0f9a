use crate::structs::time::{Rational, Time};
use crate::utils::config::SnapPolicy;
use log::{debug, trace};
use std::collections::BTreeMap;

pub const STANDARD_FRAME_RATES: [f64; 8] = [10.0, 12.5, 15.0, 24.0, 25.0, 30.0, 50.0, 60.0];

/// Leading samples whose intervals are not trusted.
const WARM_UP_SAMPLES: usize = 5;

/// Plausible frame interval bounds, exclusive, in microseconds.
const MIN_INTERVAL_US: i64 = 10_000;
const MAX_INTERVAL_US: i64 = 100_000;

/// Video timestamps collected during the start-up probe.
#[derive(Debug, Clone)]
pub struct Measurement {
    samples: Vec<Time>,
    window: usize,
}

impl Measurement {
    pub fn new(window: usize) -> Self {
        Self {
            samples: Vec::with_capacity(window),
            window,
        }
    }

    /// Adds a sample and returns `true` if it starts a new set.
    ///
    /// A sample further than `window + 4` seconds from any collected one is
    /// taken as a clock reset: the set is discarded and collection restarts.
    pub fn push(&mut self, time: Time) -> bool {
        if self.is_full() {
            return false;
        }

        let starts_set = self.samples.is_empty();
        let span = Time::from_secs(self.window as i64 + 4);

        if self.samples.iter().any(|&t| (t - time).abs() > span) {
            debug!(
                "Measurement reset at {time}, {} samples discarded",
                self.samples.len()
            );
            self.samples.clear();
        }

        self.samples.push(time);
        starts_set
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.window
    }

    /// Fits a frame rate to the collected samples.
    ///
    /// Returns `None` when the window is not full or no interval is
    /// plausible, in which case the declared rate stands.
    pub fn estimate(&self, declared: Rational, policy: SnapPolicy) -> Option<Rational> {
        if !self.is_full() {
            debug!(
                "Frame rate measurement incomplete ({} of {} samples)",
                self.samples.len(),
                self.window
            );
            return None;
        }

        let mut samples = self.samples.clone();
        samples.sort_unstable();

        let mut intervals = BTreeMap::<i64, u32>::new();
        for pair in samples.get(WARM_UP_SAMPLES - 1..)?.windows(2) {
            *intervals.entry((pair[1] - pair[0]).as_micros()).or_default() += 1;
        }

        let (sum, weight) = weigh_intervals(&intervals);
        if weight <= 0.0 || sum <= 0.0 {
            debug!("No plausible frame interval among {} buckets", intervals.len());
            return None;
        }

        let measured = Rational::new((weight * 1_000_000.0) as i64, sum as i64);
        debug!(
            "Measured frame rate {:.3} fps, declared {:.3} fps",
            measured.to_f64(),
            declared.to_f64()
        );

        Some(snap(measured, declared, policy).simplified())
    }
}

/// Weighted interval sum and total weight of the recurring intervals.
///
/// Weights are tiered by how often an interval recurs relative to the most
/// frequent one. A narrow low band is kept at a small weight to follow
/// pulldown cadences.
fn weigh_intervals(intervals: &BTreeMap<i64, u32>) -> (f64, f64) {
    let max = intervals.values().copied().max().unwrap_or(0);

    let mut sum = 0.0;
    let mut weight = 0.0;
    for (&interval, &count) in intervals {
        if interval <= MIN_INTERVAL_US || interval >= MAX_INTERVAL_US {
            continue;
        }

        let w = if count > max / 2 + max / 4 {
            max as f64
        } else if count > max / 3 + max / 9 {
            max as f64 / 2.0
        } else if count > max / 4 + max / 16 {
            max as f64 / 3.0
        } else if count > (max + 1) / 16 && count < (max + 1) / 8 {
            (max + 1) as f64 / 12.0
        } else {
            continue;
        };

        trace!("Interval {interval} us seen {count} times, weight {w:.2}");
        sum += interval as f64 * w;
        weight += w;
    }

    (sum, weight)
}

fn snap(measured: Rational, declared: Rational, policy: SnapPolicy) -> Rational {
    let (standard, tolerance) = match policy {
        SnapPolicy::Standard => (&STANDARD_FRAME_RATES[..], 0.8),
        SnapPolicy::DeclaredOnly => (&[][..], 1.0),
    };

    let mut rate = measured;
    for &candidate in standard {
        if (candidate - rate.to_f64()).abs() < 0.2 {
            rate = Rational::from_f64(candidate);
        }
    }

    if declared.to_f64() > 0.0 {
        for divisor in 1..=4 {
            if (declared.to_f64() / divisor as f64 - rate.to_f64()).abs() < tolerance {
                rate = Rational::new(declared.num, declared.den * divisor);
            }
        }
    }

    rate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measure(times: impl IntoIterator<Item = Time>, window: usize) -> Measurement {
        let mut measurement = Measurement::new(window);
        for time in times {
            measurement.push(time);
        }
        measurement
    }

    #[test]
    fn jittered_pal_snaps_to_standard() {
        let jitter = [0, 1_000, 2_000, 1_000, 0, -1_000, -2_000, -1_000];
        let samples = (0..96).map(|i| {
            Time::from_secs(3) + Time::from_micros(i * 40_000 + jitter[i as usize % jitter.len()])
        });

        let rate = measure(samples, 96).estimate(Rational::new(30, 1), SnapPolicy::Standard);
        assert_eq!(rate, Some(Rational::new(25, 1)));
    }

    #[test]
    fn film_rate_follows_declared_ratio() {
        let ntsc = Rational::new(1001, 24_000);
        let samples = (0..96).map(|i| Time::from_clock(i, ntsc));
        let measurement = measure(samples, 96);

        let declared = Rational::new(24_000, 1001);
        assert_eq!(
            measurement.estimate(declared, SnapPolicy::Standard),
            Some(declared)
        );

        let unknown = measurement
            .estimate(Rational::default(), SnapPolicy::DeclaredOnly)
            .map(|rate| rate.to_f64());
        assert!(unknown.is_some_and(|fps| (fps - 23.976).abs() < 0.05));
    }

    #[test]
    fn field_rate_declared_as_double() {
        let samples = (0..96).map(|i| Time::from_micros(i * 40_000));
        let rate = measure(samples, 96).estimate(Rational::new(50, 1), SnapPolicy::DeclaredOnly);
        assert_eq!(rate, Some(Rational::new(25, 1)));
    }

    #[test]
    fn incomplete_window_keeps_declared() {
        let samples = (0..40).map(|i| Time::from_micros(i * 40_000));
        let measurement = measure(samples, 96);
        assert!(!measurement.is_full());
        assert_eq!(
            measurement.estimate(Rational::new(25, 1), SnapPolicy::Standard),
            None
        );
    }

    #[test]
    fn clock_reset_restarts_measurement() {
        let mut measurement = Measurement::new(16);
        assert!(measurement.push(Time::from_secs(1)));
        assert!(!measurement.push(Time::from_secs(2)));

        assert!(!measurement.push(Time::from_secs(60)));
        assert_eq!(measurement.len(), 1);
    }

    #[test]
    fn implausible_intervals_are_ignored() {
        let samples = (0..96).map(|i| Time::from_secs(i));
        let rate = measure(samples, 96).estimate(Rational::new(25, 1), SnapPolicy::Standard);
        assert_eq!(rate, None);
    }
}
