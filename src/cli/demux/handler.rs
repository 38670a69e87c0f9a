use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use dlnademux::log_or_err;
use dlnademux::structs::buffer::Produced;
use dlnademux::structs::codec::MediaKind;
use dlnademux::structs::time::Time;
use log::Level;

use super::output::{ElementaryWriter, create_stream_path};
use crate::timestamp::time_opt_str;
use crate::trace::TraceWriter;

/// Per-stream accounting of what the demuxer produced.
#[derive(Debug, Clone)]
pub struct StreamStats {
    pub kind: MediaKind,
    pub codec: String,
    pub buffers: u64,
    pub bytes: u64,
    pub first: Option<Time>,
    pub last: Option<Time>,
    /// Steps where the decoding clock went backwards.
    pub backwards: u64,
}

impl StreamStats {
    fn new(kind: MediaKind, codec: &str) -> Self {
        Self {
            kind,
            codec: codec.to_string(),
            buffers: 0,
            bytes: 0,
            first: None,
            last: None,
            backwards: 0,
        }
    }

    /// Records one buffer, returning the previous time when `time` steps back.
    fn record(&mut self, time: Option<Time>, len: usize) -> Option<Time> {
        self.buffers += 1;
        self.bytes += len as u64;

        let time = time?;
        self.first.get_or_insert(time);

        let previous = self.last.replace(time);
        match previous {
            Some(previous) if time < previous => {
                self.backwards += 1;
                Some(previous)
            }
            _ => None,
        }
    }
}

pub struct BufferHandler {
    pub fail_level: Level,
    base_path: Option<PathBuf>,
    writers: BTreeMap<usize, ElementaryWriter>,
    pub stats: BTreeMap<usize, StreamStats>,
    pub report: Option<TraceWriter>,
}

impl BufferHandler {
    pub fn new(base_path: Option<PathBuf>, report: Option<TraceWriter>, fail_level: Level) -> Self {
        Self {
            fail_level,
            base_path,
            writers: BTreeMap::new(),
            stats: BTreeMap::new(),
            report,
        }
    }

    pub fn handle(&mut self, produced: &Produced) -> Result<()> {
        if let Some(report) = self.report.as_mut() {
            report.push(produced);
        }

        match produced {
            Produced::Audio(buffers) => {
                for b in buffers {
                    let time = b.dts.or(b.pts);
                    self.write(b.stream_index, MediaKind::Audio, b.codec.name(), time, &b.data)?;
                }
            }
            Produced::Video(b) => {
                let time = b.dts.or(b.pts);
                self.write(b.stream_index, MediaKind::Video, b.codec.name(), time, &b.data)?;
            }
            Produced::Subtitle(b) => {
                self.write(b.stream_index, MediaKind::Subtitle, b.codec.name(), b.pts, &b.data)?;
            }
            Produced::Dropped => {}
        }

        Ok(())
    }

    fn write(
        &mut self,
        stream_index: usize,
        kind: MediaKind,
        codec: &str,
        time: Option<Time>,
        data: &[u8],
    ) -> Result<()> {
        let stats = self
            .stats
            .entry(stream_index)
            .or_insert_with(|| StreamStats::new(kind, codec));

        // A stream detected as DTS changes codec after its first packet
        if stats.codec != codec {
            log::info!(
                "Stream {stream_index}: codec changed from {} to {codec}",
                stats.codec
            );
            stats.codec = codec.to_string();
            if let Some(writer) = self.writers.remove(&stream_index) {
                writer.finish()?;
            }
        }

        let stepped_back = stats.record(time, data.len());

        // Subtitles are timed against video only and may legitimately step back
        if let (Some(previous), Some(time)) = (stepped_back, time) {
            if kind != MediaKind::Subtitle {
                log_or_err!(
                    self,
                    Level::Warn,
                    anyhow!("Stream {stream_index}: timestamp went back from {previous} to {time}")
                );
            }
        }

        if let Some(base_path) = &self.base_path {
            let writer = match self.writers.entry(stream_index) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let path = create_stream_path(base_path, stream_index, codec);
                    entry.insert(ElementaryWriter::create(path)?)
                }
            };
            writer.write(data)?;
        }

        Ok(())
    }

    pub fn finalize(&mut self) -> Result<()> {
        for (_, writer) in std::mem::take(&mut self.writers) {
            let (path, written) = writer.finish()?;
            log::debug!("Wrote {written} bytes to {}", path.display());
        }
        Ok(())
    }

    pub fn print_summary(&self) {
        println!("Stream Statistics:");
        for (index, stats) in &self.stats {
            println!(
                "  {index}: {} {} | {} buffers, {} bytes | {} - {}{}",
                stats.kind,
                stats.codec,
                stats.buffers,
                stats.bytes,
                time_opt_str(stats.first),
                time_opt_str(stats.last),
                if stats.backwards > 0 {
                    format!(" | {} backward steps", stats.backwards)
                } else {
                    String::new()
                }
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlnademux::structs::buffer::{DataBuffer, VideoBuffer};
    use dlnademux::structs::codec::{CodecDescriptor, DataCodec};
    use std::sync::Arc;

    fn video(pts: i64) -> Produced {
        Produced::Video(VideoBuffer {
            stream_index: 0,
            codec: Arc::new(CodecDescriptor::Other {
                name: "mpeg2video".to_string(),
            }),
            data: Arc::from(vec![0u8; 10]),
            pts: Some(Time::from_millis(pts)),
            dts: None,
            duration: Time::from_millis(40),
            key_frame: false,
        })
    }

    fn subtitle(pts: i64) -> Produced {
        Produced::Subtitle(DataBuffer {
            stream_index: 2,
            codec: Arc::new(CodecDescriptor::Subtitle(DataCodec {
                name: "sub_rawutf8".to_string(),
                stream_id: 2,
            })),
            data: Arc::from(b"hi".to_vec()),
            pts: Some(Time::from_millis(pts)),
            dts: None,
            duration: Time::ZERO,
        })
    }

    #[test]
    fn statistics_per_stream() -> Result<()> {
        let mut handler = BufferHandler::new(None, None, Level::Error);
        for pts in [0, 40, 80, 60] {
            handler.handle(&video(pts))?;
        }
        handler.handle(&subtitle(500))?;
        handler.handle(&subtitle(100))?;

        let video = &handler.stats[&0];
        assert_eq!(video.buffers, 4);
        assert_eq!(video.bytes, 40);
        assert_eq!(video.first, Some(Time::ZERO));
        assert_eq!(video.backwards, 1);

        assert_eq!(handler.stats[&2].backwards, 1);
        Ok(())
    }

    #[test]
    fn strict_rejects_backward_video_only() -> Result<()> {
        let mut handler = BufferHandler::new(None, None, Level::Warn);
        handler.handle(&subtitle(500))?;
        handler.handle(&subtitle(100))?;

        handler.handle(&video(40))?;
        assert!(handler.handle(&video(0)).is_err());
        Ok(())
    }
}
