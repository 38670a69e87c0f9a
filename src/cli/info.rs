use anyhow::Result;
use dlnademux::process::demux::Demuxer;
use dlnademux::structs::stream::StreamInfo;
use dlnademux::utils::config::DemuxConfig;

use super::command::{Cli, InfoArgs};
use crate::registry::EngineRegistry;
use crate::timestamp::{time_opt_str, time_str};

pub fn cmd_info(
    args: &InfoArgs,
    cli: &Cli,
    config: &DemuxConfig,
    registry: &EngineRegistry,
) -> Result<()> {
    log::info!("Analyzing container: {}", args.input.display());

    let engine = registry.open(&args.input, cli.engine.as_deref())?;

    let mut demuxer = Demuxer::new(config.clone())?;
    demuxer.set_fail_level(cli.fail_level());
    demuxer.start(engine, config.fast_probe)?;

    println!("Container Information:");
    println!("  Format: {}", demuxer.format_name().unwrap_or("unknown"));
    println!("  Duration: {}", time_opt_str(demuxer.duration()));

    let chapters = demuxer.chapters();
    if !chapters.is_empty() {
        println!();
        println!("Chapters:");
        for (i, chapter) in chapters.iter().enumerate() {
            println!(
                "  {:2}: {} - {}  {}",
                i + 1,
                time_str(chapter.begin.as_secs_f64()),
                time_str(chapter.end.as_secs_f64()),
                chapter.title.as_deref().unwrap_or("")
            );
        }
    }

    print_streams("Video Streams", &demuxer.video_streams());
    print_streams("Audio Streams", &demuxer.audio_streams());
    print_streams("Subtitle Streams", &demuxer.data_streams());

    let selected: Vec<String> = demuxer
        .selected_streams()
        .iter()
        .map(|id| id.to_string())
        .collect();
    println!();
    println!("Selected: {}", selected.join(", "));

    demuxer.stop();

    Ok(())
}

fn print_streams(title: &str, streams: &[StreamInfo]) {
    if streams.is_empty() {
        return;
    }

    println!();
    println!("{title}:");
    for stream in streams {
        let mut line = format!("  {}: {}", stream.id, stream.codec);

        if let Some(language) = &stream.language {
            line.push_str(&format!(" [{language}]"));
        }

        if let Some(title) = &stream.title {
            line.push_str(&format!(" \"{title}\""));
        }

        println!("{line}");
    }
}
