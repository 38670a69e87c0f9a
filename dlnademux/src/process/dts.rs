use crate::log_or_err;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::DtsError;
use log::{debug, trace};
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Largest DTS core frame.
pub const DTS_MAX_FRAME_SIZE: usize = 16_384;

/// Largest block of decoded audio a single packet may expand to.
pub const MAX_AUDIO_BLOCK_SIZE: usize = 192_000;

pub const DTS_ACCUMULATOR_CAPACITY: usize = DTS_MAX_FRAME_SIZE + MAX_AUDIO_BLOCK_SIZE;

/// Bytes needed to read the frame size field of any sync variant.
pub const DTS_HEADER_SIZE: usize = 10;

/// The four ways a DTS sync word appears inside a 16-bit PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtsSync {
    RawBigEndian,
    RawLittleEndian,
    Packed14BigEndian,
    Packed14LittleEndian,
}

impl DtsSync {
    /// Identifies the sync word at the start of `data`.
    pub fn at(data: &[u8]) -> Option<Self> {
        match data.get(..4)? {
            [0x7F, 0xFE, 0x80, 0x01] => Some(Self::RawBigEndian),
            [0xFE, 0x7F, 0x01, 0x80] => Some(Self::RawLittleEndian),
            [0x1F, 0xFF, 0xE8, 0x00] => Some(Self::Packed14BigEndian),
            [0xFF, 0x1F, 0x00, 0xE8] => Some(Self::Packed14LittleEndian),
            _ => None,
        }
    }

    pub fn is_packed(self) -> bool {
        matches!(self, Self::Packed14BigEndian | Self::Packed14LittleEndian)
    }

    pub fn is_little_endian(self) -> bool {
        matches!(self, Self::RawLittleEndian | Self::Packed14LittleEndian)
    }

    /// Reads the frame length, in bytes of this variant, from a frame header.
    ///
    /// The 14-bit FSIZE field sits at bits 46..60 of the unpacked bitstream.
    /// Packed variants carry 14 payload bits per 16-bit word, so the length
    /// is expanded by 16/14 and rounded up to a whole word.
    pub fn frame_size(self, header: &[u8]) -> Result<usize, DtsError> {
        let Some(header) = header.get(..DTS_HEADER_SIZE) else {
            return Err(DtsError::InsufficientHeader(header.len()));
        };

        let mut words = [0u8; DTS_HEADER_SIZE];
        for (dst, src) in words.chunks_exact_mut(2).zip(header.chunks_exact(2)) {
            if self.is_little_endian() {
                dst.copy_from_slice(&[src[1], src[0]]);
            } else {
                dst.copy_from_slice(src);
            }
        }

        let reader = &mut BsIoSliceReader::from_slice(&words);
        let header_error = |_| DtsError::InsufficientHeader(header.len());

        if !self.is_packed() {
            reader.skip_n(46).map_err(header_error)?;
            let fsize = reader.get_n::<u32>(14).map_err(header_error)? as usize;

            return Ok(fsize + 1);
        }

        let mut bits = 0u128;
        for _ in 0..DTS_HEADER_SIZE / 2 {
            reader.skip_n(2).map_err(header_error)?;
            bits = (bits << 14) | reader.get_n::<u32>(14).map_err(header_error)? as u128;
        }

        // 5 words give 70 payload bits; bit 59 is the last bit of FSIZE.
        let fsize = ((bits >> 10) & 0x3FFF) as usize + 1;

        Ok(((fsize * 16 / 14) + 1) & !1)
    }
}

impl Display for DtsSync {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DtsSync::RawBigEndian => write!(f, "16-bit big-endian"),
            DtsSync::RawLittleEndian => write!(f, "16-bit little-endian"),
            DtsSync::Packed14BigEndian => write!(f, "14-bit big-endian"),
            DtsSync::Packed14LittleEndian => write!(f, "14-bit little-endian"),
        }
    }
}

/// Offset of the first DTS sync word that leaves room for a full header.
pub fn find_sync(data: &[u8]) -> Option<usize> {
    (0..data.len().saturating_sub(DTS_HEADER_SIZE)).find(|&i| DtsSync::at(&data[i..]).is_some())
}

/// Detects DTS frames carried in a 16-bit PCM packet.
///
/// Raw sync words are accepted as-is. For 14-bit packed sync words every
/// following sample must stay within the 14-bit signed range, otherwise
/// the match is treated as a coincidence in ordinary PCM.
pub fn detect(data: &[u8]) -> Option<DtsSync> {
    let offset = find_sync(data)?;
    let sync = DtsSync::at(&data[offset..])?;

    if sync.is_packed() {
        let in_range = data[offset..].chunks_exact(2).all(|pair| {
            let sample = if sync.is_little_endian() {
                i16::from_le_bytes([pair[0], pair[1]])
            } else {
                i16::from_be_bytes([pair[0], pair[1]])
            };
            (-16384..=16383).contains(&sample)
        });

        if !in_range {
            trace!("14-bit DTS sync at offset {offset} rejected, samples exceed 14 bits");
            return None;
        }
    }

    debug!("Detected {sync} DTS sync at offset {offset}");
    Some(sync)
}

pub fn is_dts(data: &[u8]) -> bool {
    detect(data).is_some()
}

/// A complete DTS frame cut from the accumulated stream.
#[derive(Debug, Clone)]
pub struct DtsFrame {
    pub sync: DtsSync,
    pub data: Arc<[u8]>,
}

impl AsRef<[u8]> for DtsFrame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Re-frames a PCM byte stream into discrete DTS frames.
///
/// Bytes are accumulated across packets in a bounded buffer. Frames are
/// yielded as soon as they are complete; junk between frames is skipped by
/// searching for the next sync word.
///
/// # Example
///
/// ```rust
/// use dlnademux::process::dts::DtsFramer;
///
/// let mut frame = vec![0u8; 32];
/// frame[..4].copy_from_slice(&[0x7F, 0xFE, 0x80, 0x01]);
/// frame[6] = 0x01; // FSIZE = 31, so the frame is 32 bytes long
/// frame[7] = 0xF0;
///
/// let mut framer = DtsFramer::default();
/// assert!(framer.parse_frames(&frame[..20])?.is_empty());
///
/// let frames = framer.parse_frames(&frame[20..])?;
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].as_ref(), &frame[..]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct DtsFramer {
    buffer: VecDeque<u8>,
    capacity: usize,
    stalled: bool,
    frames_emitted: usize,
    resync_count: usize,
    pub fail_level: log::Level,
}

impl Default for DtsFramer {
    fn default() -> Self {
        Self::with_capacity(DTS_ACCUMULATOR_CAPACITY)
    }
}

impl DtsFramer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            stalled: false,
            frames_emitted: 0,
            resync_count: 0,
            fail_level: log::Level::Error,
        }
    }

    /// Appends packet bytes to the accumulator.
    ///
    /// If the accumulator cannot take the packet, the stale bytes are
    /// dropped and accumulation restarts from this packet. Bytes beyond the
    /// capacity are dropped as well.
    pub fn push_bytes(&mut self, data: &[u8]) -> Result<(), DtsError> {
        self.stalled = false;

        if self.buffer.len() + data.len() > self.capacity {
            let dropped = self.buffer.len();
            self.buffer.clear();
            log_or_err!(
                self,
                log::Level::Warn,
                DtsError::AccumulatorOverflow { dropped }
            );
        }

        let take = data.len().min(self.capacity);
        self.buffer.extend(&data[..take]);

        Ok(())
    }

    /// Appends `data` and returns every frame that became complete.
    pub fn parse_frames(&mut self, data: &[u8]) -> Result<Vec<DtsFrame>, DtsError> {
        self.push_bytes(data)?;

        let mut frames = Vec::new();
        while let Some(result) = self.next() {
            match result {
                Ok(frame) => frames.push(frame),
                Err(error) => log_or_err!(self, log::Level::Warn, error),
            }
        }

        Ok(frames)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn frames_emitted(&self) -> usize {
        self.frames_emitted
    }

    pub fn resync_count(&self) -> usize {
        self.resync_count
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.stalled = false;
    }

    fn header(&self) -> Option<[u8; DTS_HEADER_SIZE]> {
        if self.buffer.len() < DTS_HEADER_SIZE {
            return None;
        }

        let mut header = [0u8; DTS_HEADER_SIZE];
        for (dst, src) in header.iter_mut().zip(self.buffer.iter()) {
            *dst = *src;
        }

        Some(header)
    }
}

impl Iterator for DtsFramer {
    type Item = Result<DtsFrame, DtsError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let header = self.header()?;

            let frame = DtsSync::at(&header).and_then(|sync| {
                sync.frame_size(&header)
                    .ok()
                    .filter(|&size| size > 0)
                    .map(|size| (sync, size))
            });

            let Some((sync, size)) = frame else {
                let data = self.buffer.make_contiguous();
                match find_sync(&data[1..]) {
                    Some(offset) => {
                        self.buffer.drain(..offset + 1);
                        self.resync_count += 1;
                        trace!("DTS resync, skipped {} bytes", offset + 1);
                        continue;
                    }
                    None if self.stalled => return None,
                    None => {
                        self.stalled = true;
                        return Some(Err(DtsError::SyncLost(self.buffer.len())));
                    }
                }
            };

            if self.buffer.len() < size {
                return None;
            }

            let data: Arc<[u8]> = self.buffer.drain(..size).collect::<Vec<_>>().into();
            self.frames_emitted += 1;

            return Some(Ok(DtsFrame { sync, data }));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a raw big-endian frame of `len` bytes with a matching FSIZE.
    pub(crate) fn raw_frame(len: usize, seed: u8) -> Vec<u8> {
        assert!((DTS_HEADER_SIZE..=DTS_MAX_FRAME_SIZE).contains(&len));

        let mut frame: Vec<u8> = (0..len)
            .map(|i| ((i + seed as usize) % 100) as u8 + 2)
            .collect();
        frame[..4].copy_from_slice(&[0x7F, 0xFE, 0x80, 0x01]);

        let fsize = (len - 1) as u32;
        frame[5] = (frame[5] & 0xFC) | ((fsize >> 12) & 0x03) as u8;
        frame[6] = (fsize >> 4) as u8;
        frame[7] = (frame[7] & 0x0F) | ((fsize & 0x0F) << 4) as u8;
        frame
    }

    fn swap_pairs(data: &[u8]) -> Vec<u8> {
        data.chunks_exact(2).flat_map(|p| [p[1], p[0]]).collect()
    }

    /// Full-range 16-bit samples that never form a sync word.
    fn pcm_noise(samples: usize) -> Vec<u8> {
        let mut state = 0x1234_5678u32;
        (0..samples)
            .flat_map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                ((state >> 16) as i16).to_le_bytes()
            })
            .collect()
    }

    #[test]
    fn frame_size_variants() -> Result<(), DtsError> {
        let frame = raw_frame(2_013, 0);
        assert_eq!(DtsSync::at(&frame), Some(DtsSync::RawBigEndian));
        assert_eq!(DtsSync::RawBigEndian.frame_size(&frame)?, 2_013);

        let swapped = swap_pairs(&frame[..DTS_HEADER_SIZE]);
        assert_eq!(DtsSync::at(&swapped), Some(DtsSync::RawLittleEndian));
        assert_eq!(DtsSync::RawLittleEndian.frame_size(&swapped)?, 2_013);

        // 14-bit words: sync 0x1FFF 0xE800 0x07F?, FSIZE field = 1023.
        let packed = [0x1F, 0xFF, 0xE8, 0x00, 0x07, 0xF0, 0x00, 0x3F, 0x3F, 0x00];
        assert_eq!(DtsSync::at(&packed), Some(DtsSync::Packed14BigEndian));
        assert_eq!(DtsSync::Packed14BigEndian.frame_size(&packed)?, 1_170);

        let packed_le = swap_pairs(&packed);
        assert_eq!(DtsSync::at(&packed_le), Some(DtsSync::Packed14LittleEndian));
        assert_eq!(DtsSync::Packed14LittleEndian.frame_size(&packed_le)?, 1_170);

        assert!(DtsSync::RawBigEndian.frame_size(&frame[..8]).is_err());
        Ok(())
    }

    #[test]
    fn detect_raw_dts_in_pcm() {
        let mut packet = pcm_noise(64);
        packet.extend(raw_frame(512, 7));
        assert!(is_dts(&packet));
        assert_eq!(detect(&packet), Some(DtsSync::RawBigEndian));
    }

    #[test]
    fn reject_pcm_noise() {
        let noise = pcm_noise(8_192);
        assert!(find_sync(&noise).is_none());
        assert!(!is_dts(&noise));
    }

    #[test]
    fn reject_packed_sync_followed_by_wide_samples() {
        let mut packet = vec![0x1F, 0xFF, 0xE8, 0x00, 0x07, 0xF0, 0x00, 0x3F, 0x3F, 0x00];
        packet.extend_from_slice(&[0x10, 0x00, 0x20, 0x00]);
        assert_eq!(detect(&packet), Some(DtsSync::Packed14BigEndian));

        packet.extend_from_slice(&0x7F00i16.to_be_bytes());
        assert_eq!(detect(&packet), None);
    }

    #[test]
    fn reframe_across_packet_boundaries() -> Result<(), DtsError> {
        let frames: Vec<Vec<u8>> = [1_024, 2_013, 96, 4_096, 777]
            .iter()
            .enumerate()
            .map(|(i, &len)| raw_frame(len, i as u8))
            .collect();
        let stream: Vec<u8> = frames.concat();

        let mut framer = DtsFramer::default();
        let mut output = Vec::new();
        for chunk in stream.chunks(1_500) {
            output.extend(framer.parse_frames(chunk)?);
        }

        assert_eq!(output.len(), frames.len());
        for (frame, expected) in output.iter().zip(&frames) {
            assert_eq!(frame.as_ref(), &expected[..]);
        }
        assert_eq!(framer.buffered(), 0);
        assert_eq!(framer.frames_emitted(), frames.len());
        Ok(())
    }

    #[test]
    fn resync_after_junk() -> Result<(), DtsError> {
        let first = raw_frame(300, 1);
        let second = raw_frame(400, 2);

        let mut stream = vec![0xAA; 37];
        stream.extend(&first);
        stream.extend([0x55; 13]);
        stream.extend(&second);

        let mut framer = DtsFramer::default();
        let frames = framer.parse_frames(&stream)?;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref(), &first[..]);
        assert_eq!(frames[1].as_ref(), &second[..]);
        assert_eq!(framer.resync_count(), 2);
        Ok(())
    }

    #[test]
    fn keep_bytes_until_sync_appears() -> Result<(), DtsError> {
        let frame = raw_frame(200, 3);
        let mut framer = DtsFramer::default();

        assert!(framer.parse_frames(&[0x11; 64])?.is_empty());
        assert_eq!(framer.buffered(), 64);

        let frames = framer.parse_frames(&frame)?;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), &frame[..]);
        Ok(())
    }

    #[test]
    fn whole_frames_leave_nothing_buffered() -> Result<(), DtsError> {
        let mut framer = DtsFramer::default();

        let frames = framer.parse_frames(&raw_frame(512, 1))?;
        assert_eq!(frames.len(), 1);
        assert_eq!(framer.buffered(), 0);

        assert!(framer.parse_frames(&[])?.is_empty());
        assert_eq!(framer.frames_emitted(), 1);
        Ok(())
    }

    #[test]
    fn short_tail_waits_for_more_bytes() -> Result<(), DtsError> {
        let first = raw_frame(256, 4);
        let second = raw_frame(320, 5);
        let mut framer = DtsFramer::default();

        for tail in 1..DTS_HEADER_SIZE {
            let mut packet = first.clone();
            packet.extend(&second[..tail]);
            framer.clear();

            let frames = framer.parse_frames(&packet)?;
            assert_eq!(frames.len(), 1);
            assert_eq!(framer.buffered(), tail);

            let frames = framer.parse_frames(&second[tail..])?;
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].as_ref(), &second[..]);
            assert_eq!(framer.buffered(), 0);
        }
        Ok(())
    }

    #[test]
    fn strict_framer_reports_sync_loss() {
        let mut framer = DtsFramer::default();
        framer.fail_level = log::Level::Warn;

        assert!(matches!(
            framer.parse_frames(&[0x11; 64]),
            Err(DtsError::SyncLost(64))
        ));
    }

    #[test]
    fn bounded_accumulator() -> Result<(), DtsError> {
        let mut framer = DtsFramer::with_capacity(256);
        framer.parse_frames(&[0x11; 200])?;
        assert_eq!(framer.buffered(), 200);

        framer.parse_frames(&[0x22; 100])?;
        assert_eq!(framer.buffered(), 100);

        framer.parse_frames(&[0x33; 1_000])?;
        assert_eq!(framer.buffered(), 256);
        Ok(())
    }
}
