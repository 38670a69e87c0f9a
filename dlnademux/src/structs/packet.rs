//! Packets as delivered by a codec engine.

use std::sync::Arc;

use crate::structs::time::{Rational, Time};

/// Packet flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFlags(u32);

impl PacketFlags {
    pub const KEY: PacketFlags = PacketFlags(0x0001);
    pub const CORRUPT: PacketFlags = PacketFlags(0x0002);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: PacketFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: PacketFlags) {
        self.0 |= other.0;
    }
}

/// One unit of compressed data read from a container.
///
/// Timestamps and durations are in ticks of the owning stream's time base.
/// A negative `stream_index` marks data that belongs to no media stream.
#[derive(Debug, Clone)]
pub struct Packet {
    pub data: Arc<[u8]>,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub stream_index: i32,
    pub flags: PacketFlags,
    pub duration: i64,
    pub convergence_duration: i64,
    pub position: Option<u64>,
}

impl Default for Packet {
    fn default() -> Self {
        Self {
            data: Arc::from(Vec::new()),
            pts: None,
            dts: None,
            stream_index: -1,
            flags: PacketFlags::empty(),
            duration: 0,
            convergence_duration: 0,
            position: None,
        }
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Packet {
    pub fn new(stream_index: i32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            stream_index,
            ..Default::default()
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_key_frame(mut self) -> Self {
        self.flags.insert(PacketFlags::KEY);
        self
    }

    pub fn is_key_frame(&self) -> bool {
        self.flags.contains(PacketFlags::KEY)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Presentation time if known, decoding time otherwise.
    pub fn time_stamp(&self, time_base: Rational) -> Option<Time> {
        self.pts
            .or(self.dts)
            .map(|ticks| Time::from_clock(ticks, time_base))
    }
}

#[test]
fn packet_builder() {
    let packet = Packet::new(2, vec![1u8, 2, 3])
        .with_pts(3_600)
        .with_duration(3_600)
        .with_key_frame();

    assert_eq!(packet.len(), 3);
    assert!(packet.is_key_frame());
    assert_eq!(
        packet.time_stamp(Rational::new(1, 90_000)),
        Some(Time::from_millis(40))
    );
    assert!(Packet::default().stream_index < 0);
}
