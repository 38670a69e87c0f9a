use std::fs;

use anyhow::{Context, Result};
use dlnademux::utils::config::DemuxConfig;

use crate::cli::command::Cli;

/// Demuxer configuration from `--config`, with command-line overrides.
pub fn load(cli: &Cli) -> Result<DemuxConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            parse(&text).with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => DemuxConfig::default(),
    };

    if let Some(window) = cli.window {
        config.measurement_window = window;
    }

    if cli.fast {
        config.fast_probe = true;
    }

    if let Some(policy) = cli.snap_policy {
        config.snap_policy = policy.into();
    }

    config.validate()?;
    log::debug!("Demuxer configuration: {config:?}");

    Ok(config)
}

fn parse(text: &str) -> Result<DemuxConfig> {
    if text.trim().is_empty() {
        return Ok(DemuxConfig::default());
    }

    Ok(serde_yaml_ng::from_str(text)?)
}

#[test]
fn partial_config_keeps_defaults() -> Result<()> {
    use dlnademux::utils::config::SnapPolicy;

    let config = parse("measurement_window: 48\nsnap_policy: declared-only\n")?;
    assert_eq!(config.measurement_window, 48);
    assert_eq!(config.snap_policy, SnapPolicy::DeclaredOnly);
    assert_eq!(config.jump_threshold_ms, 10_000);
    assert!(config.dts_detection);
    assert!(!config.fast_probe);

    assert_eq!(parse("")?.measurement_window, 96);
    assert!(parse("fast_probe: true\n")?.fast_probe);
    Ok(())
}

#[test]
fn unknown_keys_are_rejected() {
    assert!(parse("measurement_windw: 48\n").is_err());
}

#[test]
fn flags_override_file_values() -> Result<()> {
    use clap::Parser as ClapParser;

    let path = std::env::temp_dir().join(format!("dlnademuxd-config-{}.yaml", std::process::id()));
    fs::write(&path, "measurement_window: 48\nfast_probe: false\n")?;

    let arg = std::ffi::OsStr::new;
    let cli = Cli::try_parse_from([
        arg("dlnademuxd"),
        arg("--config"),
        path.as_os_str(),
        arg("--fast"),
        arg("--window"),
        arg("64"),
        arg("info"),
        arg("in.yaml"),
    ])?;
    let config = load(&cli)?;
    assert!(config.fast_probe);
    assert_eq!(config.measurement_window, 64);

    let cli = Cli::try_parse_from([
        arg("dlnademuxd"),
        arg("--config"),
        path.as_os_str(),
        arg("info"),
        arg("in.yaml"),
    ])?;
    let config = load(&cli)?;
    assert!(!config.fast_probe);
    assert_eq!(config.measurement_window, 48);

    fs::remove_file(&path)?;
    Ok(())
}
