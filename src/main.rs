use anyhow::Result;
use clap::Parser as ClapParser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

use cli::command::{Cli, Commands, LogFormat};
use cli::demux::cmd_demux;
use cli::dts::cmd_dts;
use cli::info::cmd_info;
use registry::EngineRegistry;

mod cli;
mod config;
mod input;
mod pcm;
mod registry;
pub(crate) mod timestamp;
mod trace;
mod wav;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let base_level = cli.loglevel.to_level_filter();

    let multi = MultiProgress::new();

    let mut env_builder = env_logger::Builder::from_default_env();
    env_builder.filter_level(base_level);
    match cli.log_format {
        LogFormat::Plain => {
            env_builder.format_timestamp_secs();
        }
        LogFormat::Json => {
            env_builder.format(|buf, record| {
                use std::io::Write;
                writeln!(
                    buf,
                    "{{\"ts\":{},\"lvl\":\"{}\",\"target\":\"{}\",\"msg\":\"{}\"}}",
                    buf.timestamp(),
                    record.level(),
                    record.target(),
                    record.args().to_string().escape_default()
                )
            });
        }
    }

    let pb = if cli.progress {
        let logger = env_builder.build();
        LogWrapper::new(multi.clone(), logger).try_init()?;
        Some(&multi)
    } else {
        env_builder.try_init()?;
        None
    };

    log::debug!(
        "{} {} (dlnademux {}, built {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("DLNADEMUX_VERSION"),
        env!("BUILD_TIMESTAMP")
    );

    let registry = EngineRegistry::with_defaults();
    let config = config::load(&cli)?;

    match cli.command {
        Commands::Info(ref args) => cmd_info(args, &cli, &config, &registry)?,
        Commands::Demux(ref args) => cmd_demux(args, &cli, &config, &registry, pb)?,
        Commands::Dts(ref args) => cmd_dts(args, &cli, &config, &registry, pb)?,
    }

    Ok(())
}
