use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Result, bail};
use dlnademux::process::dts::{self, DtsFramer};
use dlnademux::utils::config::DemuxConfig;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::command::{Cli, DtsArgs};
use super::demux::output::create_path_with_extension;
use crate::registry::EngineRegistry;

/// Packets scanned for a sync word before giving up.
const DETECTION_PACKETS: usize = 16;

pub fn cmd_dts(
    args: &DtsArgs,
    cli: &Cli,
    config: &DemuxConfig,
    registry: &EngineRegistry,
    multi: Option<&MultiProgress>,
) -> Result<()> {
    log::info!("Scanning for DTS: {}", args.input.display());

    let mut engine = registry.open(&args.input, cli.engine.as_deref())?;
    engine.find_stream_info(config.fast_probe)?;

    let Some(stream) = engine.streams().first() else {
        bail!("Input has no streams");
    };
    if !matches!(stream.codec.as_str(), "pcm_s16le" | "pcm_s16be") {
        bail!("DTS extraction needs 16-bit PCM input, found {}", stream.codec);
    }
    let stream_index = stream.index as i32;

    let mut framer = DtsFramer::default();
    framer.fail_level = cli.fail_level();

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template(
                "{spinner:.green} {pos} frames\n{msg} | elapsed: {elapsed_precise}",
            )?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("searching for DTS sync");
            Some(pb)
        }
        None => None,
    };

    let mut writer: Option<BufWriter<File>> = None;
    let mut scanned = 0usize;
    let mut detected = None;
    let mut bytes_written = 0u64;

    while let Some(packet) = engine.read_packet()? {
        if packet.stream_index != stream_index {
            continue;
        }

        if detected.is_none() {
            scanned += 1;
            detected = dts::detect(&packet.data);

            match detected {
                Some(sync) => {
                    log::info!("Found {sync} DTS after {scanned} packets");
                    let path = output_path(args);
                    log::info!("Creating DTS file: {}", path.display());
                    writer = Some(BufWriter::new(File::create(path)?));
                    if let Some(ref pb) = pb {
                        pb.set_message(format!("extracting {sync} DTS"));
                    }
                }
                None if scanned >= DETECTION_PACKETS => break,
                None => continue,
            }
        }

        for frame in framer.parse_frames(&packet.data)? {
            if let Some(w) = writer.as_mut() {
                w.write_all(&frame.data)?;
                bytes_written += frame.data.len() as u64;
            }
        }

        if let Some(ref pb) = pb {
            pb.set_position(framer.frames_emitted() as u64);
        }
    }

    engine.close();

    let Some(mut writer) = writer else {
        if let Some(ref pb) = pb {
            pb.finish_with_message("no DTS found");
        }
        println!("No DTS sync found in the first {scanned} packets.");
        println!("This doesn't appear to be DTS carried in PCM.");
        return Ok(());
    };
    writer.flush()?;

    if let Some(ref pb) = pb {
        pb.finish_with_message(format!("{} frames", framer.frames_emitted()));
    }

    println!("DTS Extraction:");
    println!("  Frames: {}", framer.frames_emitted());
    println!("  Bytes: {bytes_written}");
    println!("  Resyncs: {}", framer.resync_count());
    if framer.buffered() > 0 {
        println!("  Trailing bytes dropped: {}", framer.buffered());
    }

    Ok(())
}

fn output_path(args: &DtsArgs) -> PathBuf {
    match &args.output_path {
        Some(path) => create_path_with_extension(path, "dts"),
        None if crate::input::is_pipe(&args.input) => PathBuf::from("stdin.dts"),
        None => args.input.with_extension("dts"),
    }
}

#[test]
fn default_output_replaces_extension() {
    let args = DtsArgs {
        input: PathBuf::from("/music/track01.wav"),
        output_path: None,
    };
    assert_eq!(output_path(&args), PathBuf::from("/music/track01.dts"));

    let args = DtsArgs {
        input: PathBuf::from("-"),
        output_path: Some(PathBuf::from("out")),
    };
    assert_eq!(output_path(&args), PathBuf::from("out.dts"));
}
