use std::path::Path;

use anyhow::{Result, bail};

use crate::input::InputReader;
use crate::pcm::{PcmEngine, PcmFormat};

pub const RIFF_ID: [u8; 4] = *b"RIFF";
pub const WAVE_ID: [u8; 4] = *b"WAVE";
pub const FMT_ID: [u8; 4] = *b"fmt ";
pub const DATA_ID: [u8; 4] = *b"data";

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Largest fmt chunk read, the size of a WAVE_FORMAT_EXTENSIBLE header.
const FMT_MAX_SIZE: usize = 40;

/// Placeholder size written by streaming encoders that cannot seek back.
const UNKNOWN_SIZE: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavHeader {
    pub format: PcmFormat,
    /// Size of the data chunk, unknown for streamed files.
    pub data_len: Option<u64>,
}

pub fn is_wav(header: &[u8]) -> bool {
    header.len() >= 12 && header[..4] == RIFF_ID && header[8..12] == WAVE_ID
}

/// Reads chunks up to the start of the sample data.
pub fn read_header(reader: &mut InputReader) -> Result<WavHeader> {
    let mut riff = [0u8; 12];
    if reader.read_full(&mut riff)? < riff.len() || !is_wav(&riff) {
        bail!("Not a RIFF/WAVE file");
    }

    let mut format = None;
    loop {
        let mut chunk = [0u8; 8];
        if reader.read_full(&mut chunk)? < chunk.len() {
            bail!("WAVE file has no data chunk");
        }

        let id = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let size = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);

        match id {
            FMT_ID => {
                if size < 16 {
                    bail!("Truncated fmt chunk ({size} bytes)");
                }

                let mut fmt = [0u8; FMT_MAX_SIZE];
                let len = (size as usize).min(FMT_MAX_SIZE);
                if reader.read_full(&mut fmt[..len])? < len {
                    bail!("Truncated fmt chunk");
                }
                format = Some(parse_fmt(&fmt[..len])?);

                let extra = size as u64 - len as u64;
                if reader.skip(extra)? < extra {
                    bail!("Truncated fmt chunk");
                }
                skip_padding(reader, size)?;
            }
            DATA_ID => {
                let Some(format) = format else {
                    bail!("WAVE data chunk precedes its fmt chunk");
                };
                let data_len = (size != UNKNOWN_SIZE && size != 0).then_some(size as u64);
                return Ok(WavHeader { format, data_len });
            }
            _ => {
                log::debug!(
                    "Skipping WAVE chunk {:?} ({size} bytes)",
                    String::from_utf8_lossy(&id)
                );
                reader.skip(size as u64)?;
                skip_padding(reader, size)?;
            }
        }
    }
}

fn skip_padding(reader: &mut InputReader, size: u32) -> Result<()> {
    if size % 2 == 1 {
        reader.skip(1)?;
    }
    Ok(())
}

fn parse_fmt(fmt: &[u8]) -> Result<PcmFormat> {
    let le16 = |at: usize| u16::from_le_bytes([fmt[at], fmt[at + 1]]);
    let le32 = |at: usize| u32::from_le_bytes([fmt[at], fmt[at + 1], fmt[at + 2], fmt[at + 3]]);

    let tag = le16(0);
    let channels = le16(2) as u32;
    let sample_rate = le32(4);
    let bits_per_sample = le16(14);

    if tag != WAVE_FORMAT_PCM && tag != WAVE_FORMAT_EXTENSIBLE {
        bail!("Unsupported WAVE format tag 0x{tag:04x}");
    }

    if bits_per_sample != 16 {
        bail!("Only 16-bit PCM is supported, got {bits_per_sample}-bit");
    }

    if channels == 0 || sample_rate == 0 {
        bail!("Invalid WAVE format: {sample_rate} Hz, {channels} channels");
    }

    Ok(PcmFormat {
        sample_rate,
        channels,
        big_endian: false,
    })
}

/// Opens a WAVE file as a one-stream PCM container.
pub fn open(input_path: &Path) -> Result<PcmEngine> {
    let mut reader = InputReader::new(input_path)?;
    let header = read_header(&mut reader)?;

    log::debug!(
        "WAVE: {} Hz, {} channels, {} data bytes",
        header.format.sample_rate,
        header.format.channels,
        header
            .data_len
            .map_or_else(|| "unknown".to_string(), |len| len.to_string())
    );

    Ok(PcmEngine::new(
        reader,
        "WAV / WAVE (Waveform Audio)",
        header.format,
        header.data_len,
    ))
}

#[cfg(test)]
pub(crate) fn wav_bytes(format: PcmFormat, samples: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&RIFF_ID);
    out.extend_from_slice(&(4 + 8 + 16 + 8 + 8 + 2 + samples.len() as u32).to_le_bytes());
    out.extend_from_slice(&WAVE_ID);

    out.extend_from_slice(&FMT_ID);
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&(format.channels as u16).to_le_bytes());
    out.extend_from_slice(&format.sample_rate.to_le_bytes());
    out.extend_from_slice(&(format.sample_rate * format.block_align() as u32).to_le_bytes());
    out.extend_from_slice(&(format.block_align() as u16).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());

    // Odd-sized chunk ahead of the data, padded to even
    out.extend_from_slice(b"LIST");
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&[0, 0]);

    out.extend_from_slice(&DATA_ID);
    out.extend_from_slice(&(samples.len() as u32).to_le_bytes());
    out.extend_from_slice(samples);
    out
}

#[test]
fn header_skips_unknown_chunks() -> Result<()> {
    let format = PcmFormat {
        sample_rate: 48_000,
        channels: 2,
        big_endian: false,
    };
    let bytes = wav_bytes(format, &[1, 2, 3, 4, 5, 6, 7, 8]);
    let mut reader = InputReader::from_bytes(bytes);

    let header = read_header(&mut reader)?;
    assert_eq!(header.format, format);
    assert_eq!(header.data_len, Some(8));

    let mut first = [0u8; 4];
    reader.read_full(&mut first)?;
    assert_eq!(first, [1, 2, 3, 4]);
    Ok(())
}

#[test]
fn reject_24_bit() {
    let mut bytes = wav_bytes(PcmFormat::default(), &[0; 12]);
    // bits_per_sample of the fmt chunk
    bytes[34] = 24;
    let mut reader = InputReader::from_bytes(bytes);
    assert!(read_header(&mut reader).is_err());
}

#[test]
fn oversized_fmt_chunk_is_skipped_not_buffered() {
    let mut bytes = wav_bytes(PcmFormat::default(), &[0; 4]);
    // fmt chunk size claiming almost 4 GiB
    bytes[16..20].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
    let mut reader = InputReader::from_bytes(bytes);
    assert!(read_header(&mut reader).is_err());

    let mut bytes = wav_bytes(PcmFormat::default(), &[0; 4]);
    bytes[16..20].copy_from_slice(&8u32.to_le_bytes());
    let mut reader = InputReader::from_bytes(bytes);
    assert!(read_header(&mut reader).is_err());
}

#[test]
fn fmt_extension_bytes_are_skipped() -> Result<()> {
    let format = PcmFormat {
        sample_rate: 44_100,
        channels: 6,
        big_endian: false,
    };
    let plain = wav_bytes(format, &[9; 12]);

    // Grow the fmt chunk past the bytes that are parsed
    let extension = [0xEEu8; 64];
    let mut bytes = plain[..20].to_vec();
    bytes[16..20].copy_from_slice(&(16 + extension.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&plain[20..36]);
    bytes.extend_from_slice(&extension);
    bytes.extend_from_slice(&plain[36..]);

    let mut reader = InputReader::from_bytes(bytes);
    let header = read_header(&mut reader)?;
    assert_eq!(header.format, format);
    assert_eq!(header.data_len, Some(12));
    Ok(())
}
