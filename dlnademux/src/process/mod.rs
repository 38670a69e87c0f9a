/// DTS detection and re-framing.
///
/// Provides [`detect`](dts::detect) for finding DTS in a PCM packet and the
/// [`DtsFramer`](dts::DtsFramer) for cutting an accumulated byte stream into
/// [`DtsFrame`](dts::DtsFrame)s.
pub mod dts;

/// Timestamp correction.
///
/// Provides the [`Corrector`](correct::Corrector) with its stream, audio and
/// subtitle variants.
pub mod correct;

/// Video frame rate measurement.
pub mod framerate;

/// Packet demultiplexing.
///
/// Provides the [`Demuxer`](demux::Demuxer), which reads packets from an
/// engine and produces [`Produced`](crate::structs::buffer::Produced) buffers.
pub mod demux;
