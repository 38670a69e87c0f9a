//! Demultiplexing and timestamp correction for media streaming.
//!
//! ## Technical Overview
//!
//! Sits between a container reader and the decoders of a media pipeline.
//! Packets read from a [`CodecEngine`](engine::CodecEngine) are assigned to
//! their stream, re-framed where needed and stamped with timestamps on one
//! continuous clock.
//!
//! ### Timestamp Correction
//!
//! Container clocks are often discontinuous. Each stream starts at zero and
//! any step larger than the jump threshold is absorbed into a per-stream gap.
//! Audio follows the video clock whenever the two gaps agree within the video
//! sync threshold.
//!
//! ### Frame Rate Measurement
//!
//! During start-up the demuxer reads ahead to sample video timestamps and fits
//! the real frame rate, snapped to a standard rate or to a ratio of the
//! declared one.
//!
//! ### DTS in PCM
//!
//! 16-bit PCM streams are checked once for raw or 14-bit packed DTS and, when
//! found, are re-framed into whole DTS frames.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dlnademux::engine::memory::MemoryEngine;
//! use dlnademux::process::demux::Demuxer;
//! use dlnademux::structs::buffer::Produced;
//! use dlnademux::utils::config::DemuxConfig;
//!
//! let engine = MemoryEngine::new("memory"); // Any CodecEngine
//!
//! let mut demuxer = Demuxer::new(DemuxConfig::default())?;
//! demuxer.start(Box::new(engine), false)?;
//!
//! for info in demuxer.video_streams() {
//!     println!("{}: {}", info.id, info.codec);
//! }
//!
//! for produced in demuxer.by_ref() {
//!     match produced {
//!         Produced::Audio(buffers) => { /* zero or more encoded audio buffers */ }
//!         Produced::Video(buffer) => { /* one encoded video buffer */ }
//!         Produced::Subtitle(buffer) => { /* one subtitle buffer */ }
//!         Produced::Dropped => {}
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Container backends.
///
/// Defines the [`CodecEngine`](engine::CodecEngine) trait the demuxer reads
/// from, and [`MemoryEngine`](engine::memory::MemoryEngine), an engine over
/// in-memory packets.
pub mod engine;

/// Processing stages.
///
/// 1. **DTS Framing** ([`process::dts`]): Detects DTS hidden in PCM and
///    re-frames it.
///
/// 2. **Timestamp Correction** ([`process::correct`]): Maps container
///    timestamps onto one continuous clock.
///
/// 3. **Frame Rate** ([`process::framerate`]): Fits the real video frame rate.
///
/// 4. **Demultiplexing** ([`process::demux`]): Drives the other stages.
pub mod process;

/// Data structures shared by the stages.
///
/// - **Time** ([`structs::time`]): Microsecond clock and rationals
/// - **Packets** ([`structs::packet`]): Container packets
/// - **Codecs** ([`structs::codec`]): Codec descriptors
/// - **Streams** ([`structs::stream`]): Declarations and selectors
/// - **Contexts** ([`structs::context`]): Per-stream state
/// - **Buffers** ([`structs::buffer`]): Produced output
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading
/// - **Configuration** ([`utils::config`]): Demuxer settings
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;
