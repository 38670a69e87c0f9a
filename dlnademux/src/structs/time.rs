//! Clock types shared by every stage of the demuxer.
//!
//! Container timestamps are integer ticks of a per-stream [`Rational`] time
//! base. Once converted they are carried as [`Time`], a signed count of
//! microseconds, so that streams with different time bases can be compared.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// A signed point or span on the microsecond clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(i64);

impl Time {
    pub const ZERO: Time = Time(0);

    pub const fn from_micros(us: i64) -> Self {
        Self(us)
    }

    pub const fn from_millis(ms: i64) -> Self {
        Self(ms * 1_000)
    }

    pub const fn from_secs(sec: i64) -> Self {
        Self(sec * 1_000_000)
    }

    pub fn from_secs_f64(sec: f64) -> Self {
        Self((sec * 1_000_000.0).round() as i64)
    }

    /// Converts `ticks` of `time_base` to microseconds, rounding to nearest.
    pub fn from_clock(ticks: i64, time_base: Rational) -> Self {
        if time_base.den == 0 {
            return Self::ZERO;
        }

        Self(div_round(
            ticks as i128 * time_base.num as i128 * 1_000_000,
            time_base.den as i128,
        ) as i64)
    }

    /// Converts back into ticks of `time_base`, rounding to nearest.
    pub fn to_clock(self, time_base: Rational) -> i64 {
        if time_base.num == 0 {
            return 0;
        }

        div_round(
            self.0 as i128 * time_base.den as i128,
            time_base.num as i128 * 1_000_000,
        ) as i64
    }

    pub const fn as_micros(self) -> i64 {
        self.0
    }

    pub const fn as_millis(self) -> i64 {
        self.0 / 1_000
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        Time(self.0 + rhs.0)
    }
}

impl AddAssign for Time {
    fn add_assign(&mut self, rhs: Time) {
        self.0 += rhs.0;
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(self, rhs: Time) -> Time {
        Time(self.0 - rhs.0)
    }
}

impl SubAssign for Time {
    fn sub_assign(&mut self, rhs: Time) {
        self.0 -= rhs.0;
    }
}

impl Neg for Time {
    type Output = Time;

    fn neg(self) -> Time {
        Time(-self.0)
    }
}

impl Display for Time {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let us = self.0.unsigned_abs();
        let hours = us / 3_600_000_000;
        let minutes = (us / 60_000_000) % 60;
        let seconds = (us / 1_000_000) % 60;
        let millis = (us / 1_000) % 1_000;

        write!(f, "{sign}{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
    }
}

/// A rational number, used for time bases (seconds per tick) and
/// frame rates (frames per second).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "[i64; 2]", into = "[i64; 2]")]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    pub const fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    pub fn is_valid(&self) -> bool {
        self.num != 0 && self.den != 0
    }

    pub fn to_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }

        self.num as f64 / self.den as f64
    }

    /// Approximates `value` with a millesimal denominator, then reduces.
    pub fn from_f64(value: f64) -> Self {
        Self::new((value * 1000.0).round() as i64, 1000).simplified()
    }

    pub fn simplified(&self) -> Self {
        let divisor = gcd(self.num, self.den);
        if divisor == 0 {
            return *self;
        }

        let sign = if self.den < 0 { -1 } else { 1 };
        Self::new(sign * self.num / divisor, sign * self.den / divisor)
    }

    pub fn inverse(&self) -> Self {
        Self::new(self.den, self.num)
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

impl PartialEq for Rational {
    fn eq(&self, other: &Self) -> bool {
        self.num as i128 * other.den as i128 == other.num as i128 * self.den as i128
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.to_f64().partial_cmp(&other.to_f64())
    }
}

impl From<[i64; 2]> for Rational {
    fn from(value: [i64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<Rational> for [i64; 2] {
    fn from(value: Rational) -> Self {
        [value.num, value.den]
    }
}

impl Display for Rational {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

fn div_round(num: i128, den: i128) -> i128 {
    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
    let half = den / 2;

    if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[test]
fn clock_conversion() {
    let mpeg = Rational::new(1, 90_000);
    assert_eq!(Time::from_clock(90_000, mpeg), Time::from_secs(1));
    assert_eq!(Time::from_clock(3_003, mpeg).as_micros(), 33_367);
    assert_eq!(Time::from_clock(-3_003, mpeg).as_micros(), -33_367);
    assert_eq!(Time::from_secs(2).to_clock(mpeg), 180_000);

    let ntsc = Rational::new(1001, 24_000);
    assert_eq!(Time::from_clock(1, ntsc).as_micros(), 41_708);
}

#[test]
fn rational_reduction() {
    assert_eq!(Rational::new(50, 2).simplified(), Rational::new(25, 1));
    assert_eq!(Rational::new(25, 1), Rational::new(50, 2));
    assert_eq!(Rational::new(3, -6).simplified().den, 2);
    assert_eq!(Rational::from_f64(12.5), Rational::new(25, 2));
    assert!(!Rational::new(0, 1).is_valid());
}

#[test]
fn display_time() {
    assert_eq!(format!("{}", Time::from_millis(3_723_456)), "01:02:03.456");
    assert_eq!(format!("{}", Time::from_millis(-1_500)), "-00:00:01.500");
}
