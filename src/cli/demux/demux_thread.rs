use std::sync::mpsc::SyncSender;
use std::thread;
use std::time::Instant;

use anyhow::Result;
use dlnademux::process::demux::Demuxer;
use dlnademux::structs::buffer::Produced;
use indicatif::ProgressBar;

use super::progress::update_progress;

pub struct DemuxThreadConfig {
    pub demuxer: Demuxer,
    /// Bounded: at most `max_in_flight` buffers wait for the writer.
    pub tx: SyncSender<Produced>,
    pub pb_clone: Option<ProgressBar>,
}

/// Runs the demux loop until end of stream or until the writer hangs up.
/// The demuxer is handed back, still started, for the final queries.
pub fn spawn_demux_thread(config: DemuxThreadConfig) -> thread::JoinHandle<Result<Demuxer>> {
    thread::spawn(move || -> Result<Demuxer> {
        let DemuxThreadConfig {
            mut demuxer,
            tx,
            pb_clone,
        } = config;

        let start_time = Instant::now();
        let mut packets = 0u64;
        let mut produced_count = 0u64;

        while let Some(packet) = demuxer.read() {
            packets += 1;

            let Some(produced) = demuxer.try_demux(&packet)? else {
                continue;
            };

            if produced.is_dropped() {
                continue;
            }
            produced_count += 1;

            if tx.send(produced).is_err() {
                log::debug!("Writer closed, stopping after {packets} packets");
                break;
            }

            if let Some(ref pb) = pb_clone {
                if produced_count.is_multiple_of(25) {
                    let elapsed = start_time.elapsed().as_secs_f64();
                    update_progress(pb, demuxer.position(), produced_count, elapsed);
                }
            }
        }

        log::info!("Demux complete: {packets} packets, {produced_count} buffers");
        Ok(demuxer)
    })
}
