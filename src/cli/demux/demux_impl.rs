use std::sync::mpsc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use dlnademux::process::demux::Demuxer;
use dlnademux::structs::codec::MediaKind;
use dlnademux::structs::stream::StreamId;
use dlnademux::structs::time::Time;
use dlnademux::utils::config::DemuxConfig;
use indicatif::MultiProgress;

use super::demux_thread::{DemuxThreadConfig, spawn_demux_thread};
use super::handler::BufferHandler;
use super::output::create_path_with_extension;
use super::progress::{create_progress_bar, finalize_progress_bar};
use crate::cli::command::{Cli, DemuxArgs};
use crate::registry::EngineRegistry;
use crate::trace::TraceWriter;

pub fn cmd_demux(
    args: &DemuxArgs,
    cli: &Cli,
    config: &DemuxConfig,
    registry: &EngineRegistry,
    multi: Option<&MultiProgress>,
) -> Result<()> {
    log::info!(
        "Demultiplexing: {} (strict mode: {})",
        args.input.display(),
        cli.strict
    );

    let engine = registry.open(&args.input, cli.engine.as_deref())?;

    let mut demuxer = Demuxer::new(config.clone())?;
    demuxer.set_fail_level(cli.fail_level());
    demuxer.start(engine, config.fast_probe)?;

    apply_selection(&mut demuxer, args)?;

    if let Some(start) = args.start {
        let position = Time::from_secs_f64(start);
        match demuxer.set_position(position) {
            Ok(()) => log::info!("Starting at {position}"),
            Err(e) if cli.strict => return Err(e.into()),
            Err(e) => log::warn!("{e}, starting from the beginning"),
        }
    }

    let report = args.report.as_ref().map(|_| {
        let source = demuxer.engine().and_then(|engine| engine.shared_context());
        let mut report = TraceWriter::new(demuxer.format_name().unwrap_or("unknown"), source);
        report.set_duration(demuxer.duration());
        report.set_chapters(demuxer.chapters());
        report
    });

    let pb = match multi {
        Some(multi) => Some(create_progress_bar(multi, demuxer.duration())?),
        None => None,
    };

    let (tx, rx) = mpsc::sync_channel(config.max_in_flight);
    let demux_thread = spawn_demux_thread(DemuxThreadConfig {
        demuxer,
        tx,
        pb_clone: pb.clone(),
    });

    let mut handler = BufferHandler::new(args.output_path.clone(), report, cli.fail_level());
    let start_time = Instant::now();

    while let Ok(produced) = rx.recv() {
        if let Err(e) = handler.handle(&produced) {
            if let Some(ref pb) = pb {
                pb.finish_with_message("demux failed");
            }
            // Hanging up stops the worker at its next send
            drop(rx);
            let _ = demux_thread.join();
            return Err(e);
        }
    }

    handler.finalize()?;

    let mut demuxer = match demux_thread.join() {
        Ok(Ok(demuxer)) => demuxer,
        Ok(Err(e)) => {
            if let Some(ref pb) = pb {
                pb.finish_with_message("demux failed");
            }
            return Err(e);
        }
        Err(_) => {
            if let Some(ref pb) = pb {
                pb.finish_with_message("demux thread panicked");
            }
            return Err(anyhow!("Demux thread panicked"));
        }
    };

    let elapsed = start_time.elapsed().as_secs_f64();
    finalize_progress_bar(&pb, demuxer.position(), elapsed);

    if let (Some(path), Some(report)) = (&args.report, handler.report.take()) {
        let path = create_path_with_extension(path, "yaml");
        log::info!(
            "Writing timestamp report ({} buffers): {}",
            report.packet_count(),
            path.display()
        );
        let source = demuxer.engine().and_then(|engine| engine.shared_context());
        report.write(&path, source, demuxer.declared_streams())?;
    }

    handler.print_summary();
    demuxer.stop();

    log::info!("Demultiplexing completed successfully");
    Ok(())
}

/// Replaces the default selection of each kind given on the command line.
fn apply_selection(demuxer: &mut Demuxer, args: &DemuxArgs) -> Result<()> {
    let requested = [
        (MediaKind::Audio, &args.audio),
        (MediaKind::Video, &args.video),
        (MediaKind::Subtitle, &args.subtitle),
    ];

    let mut selected = demuxer.selected_streams().to_vec();
    for (kind, value) in requested {
        let Some(value) = value else {
            continue;
        };

        let id = parse_stream_id(kind, value)?;
        if !demuxer.declared_streams().iter().any(|s| id.matches(s)) {
            log::warn!("No {kind} stream matches {value}");
        }

        selected.retain(|s| s.kind != kind);
        selected.push(id);
    }

    demuxer.select_streams(selected);
    Ok(())
}

/// `3` selects by position, `0x1c0` by native id.
pub fn parse_stream_id(kind: MediaKind, value: &str) -> Result<StreamId> {
    let value = value.trim();

    if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        let id = i32::from_str_radix(hex, 16)
            .with_context(|| format!("Invalid native stream id: {value}"))?;
        return Ok(StreamId::native(kind, id));
    }

    let index = value
        .parse::<usize>()
        .with_context(|| format!("Invalid stream index: {value}"))?;
    Ok(StreamId::index(kind, index))
}

#[test]
fn stream_ids_from_arguments() -> Result<()> {
    assert_eq!(
        parse_stream_id(MediaKind::Audio, "2")?,
        StreamId::index(MediaKind::Audio, 2)
    );
    assert_eq!(
        parse_stream_id(MediaKind::Audio, "0x1C0")?,
        StreamId::native(MediaKind::Audio, 0x1c0)
    );
    assert!(parse_stream_id(MediaKind::Video, "-1").is_err());
    assert!(parse_stream_id(MediaKind::Video, "0xZZ").is_err());
    Ok(())
}

#[test]
fn demux_trace_writes_streams_and_report() -> Result<()> {
    use crate::cli::command::Commands;
    use crate::trace::Trace;
    use clap::Parser as ClapParser;

    let dir = std::env::temp_dir().join(format!("dlnademuxd-demux-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;

    let input = dir.join("capture.yaml");
    let mut text = String::from(
        "format: MPEG-PS\nstreams:\n  - { kind: video, codec: mpeg2video, time_base: [1, 90000], width: 720, height: 576, frame_rate: [25, 1] }\n  - { kind: audio, codec: ac3, time_base: [1, 90000], sample_rate: 48000, channels: 2 }\npackets:\n",
    );
    for i in 0..50i64 {
        let key = if i % 12 == 0 { ", key: true" } else { "" };
        text.push_str(&format!(
            "  - {{ stream: 0, dts: {}, pts: {}, fill: 100{key} }}\n",
            900_000 + i * 3_600,
            903_600 + i * 3_600
        ));
        text.push_str(&format!(
            "  - {{ stream: 1, pts: {}, fill: 10 }}\n",
            900_000 + i * 3_600
        ));
    }
    std::fs::write(&input, text)?;

    let base = dir.join("out");
    let report = dir.join("report.yaml");
    let arg = std::ffi::OsStr::new;
    let cli = Cli::try_parse_from([
        arg("dlnademuxd"),
        arg("demux"),
        input.as_os_str(),
        arg("--output-path"),
        base.as_os_str(),
        arg("--report"),
        report.as_os_str(),
    ])?;
    let Commands::Demux(ref args) = cli.command else {
        anyhow::bail!("parsed the wrong command");
    };

    let registry = EngineRegistry::with_defaults();
    cmd_demux(args, &cli, &DemuxConfig::default(), &registry, None)?;

    assert_eq!(std::fs::metadata(dir.join("out.0.m2v"))?.len(), 5_000);
    assert_eq!(std::fs::metadata(dir.join("out.1.ac3"))?.len(), 500);

    let trace = Trace::from_yaml(&std::fs::read_to_string(&report)?)?;
    assert_eq!(trace.format, "MPEG-PS");
    assert_eq!(trace.streams.len(), 2);
    assert_eq!(trace.packets.len(), 100);

    let video: Vec<_> = trace.packets.iter().filter(|p| p.stream == 0).collect();
    assert_eq!(video[0].dts, Some(0));
    assert_eq!(video[49].dts, Some(49 * 40_000));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
