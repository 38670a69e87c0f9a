use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Result, anyhow};
use dlnademux::engine::CodecEngine;

use crate::input::is_pipe;
use crate::{pcm, trace, wav};

pub type BoxedEngine = Box<dyn CodecEngine + Send>;

/// Bytes read from the head of a file to recognize its format.
const PROBE_SIZE: usize = 64;

/// One container backend the CLI can open.
pub struct EngineEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub extensions: &'static [&'static str],
    /// Recognizes the format from the first bytes of a file.
    pub probe: fn(&[u8]) -> bool,
    pub open: fn(&Path) -> Result<BoxedEngine>,
}

/// The backends available to commands, built once at start-up.
#[derive(Default)]
pub struct EngineRegistry {
    entries: Vec<EngineEntry>,
}

impl EngineRegistry {
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();

        registry.register(EngineEntry {
            name: "trace",
            description: "YAML packet trace",
            extensions: &["yaml", "yml"],
            probe: trace::looks_like_trace,
            open: |path| Ok(Box::new(trace::open(path)?)),
        });

        registry.register(EngineEntry {
            name: "wav",
            description: "RIFF/WAVE 16-bit PCM",
            extensions: &["wav"],
            probe: wav::is_wav,
            open: |path| Ok(Box::new(wav::open(path)?)),
        });

        // Headerless PCM accepts anything and goes last
        registry.register(EngineEntry {
            name: "pcm",
            description: "Raw 16-bit little-endian stereo PCM at 44.1 kHz",
            extensions: &["pcm", "raw"],
            probe: |_| false,
            open: |path| Ok(Box::new(pcm::PcmEngine::open(path)?)),
        });

        registry
    }

    pub fn register(&mut self, entry: EngineEntry) {
        self.entries.push(entry);
    }

    pub fn get(&self, name: &str) -> Option<&EngineEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Picks the backend for `input`: by name when forced, then by content,
    /// then by extension. Pipes cannot be probed and default to the last
    /// registered backend.
    pub fn resolve(&self, input: &Path, forced: Option<&str>) -> Result<&EngineEntry> {
        if let Some(name) = forced {
            return self.get(name).ok_or_else(|| {
                let known: Vec<_> = self.entries.iter().map(|entry| entry.name).collect();
                anyhow!("Unknown engine '{name}', available: {}", known.join(", "))
            });
        }

        if !is_pipe(input) {
            let head = read_head(input)?;
            if let Some(entry) = self.entries.iter().find(|entry| (entry.probe)(&head)) {
                return Ok(entry);
            }

            let extension = input
                .extension()
                .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
            if let Some(extension) = extension {
                let by_extension = self
                    .entries
                    .iter()
                    .find(|entry| entry.extensions.contains(&extension.as_str()));
                if let Some(entry) = by_extension {
                    return Ok(entry);
                }
            }
        }

        self.entries
            .last()
            .ok_or_else(|| anyhow!("No engines registered"))
    }

    pub fn open(&self, input: &Path, forced: Option<&str>) -> Result<BoxedEngine> {
        let entry = self.resolve(input, forced)?;
        log::debug!(
            "Opening {} with the {} engine ({})",
            input.display(),
            entry.name,
            entry.description
        );
        (entry.open)(input)
    }
}

fn read_head(input: &Path) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(PROBE_SIZE);
    File::open(input)?
        .take(PROBE_SIZE as u64)
        .read_to_end(&mut head)?;
    Ok(head)
}

#[test]
fn resolve_by_name_content_and_extension() -> Result<()> {
    let registry = EngineRegistry::with_defaults();
    let dir = std::env::temp_dir().join(format!("dlnademuxd-registry-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;

    let trace = dir.join("capture.txt");
    std::fs::write(&trace, "---\nformat: MPEG-PS\nstreams: []\n")?;
    assert_eq!(registry.resolve(&trace, None)?.name, "trace");

    let raw = dir.join("audio.raw");
    std::fs::write(&raw, [0u8; 16])?;
    assert_eq!(registry.resolve(&raw, None)?.name, "pcm");
    assert_eq!(registry.resolve(&raw, Some("wav"))?.name, "wav");
    assert!(registry.resolve(&raw, Some("mkv")).is_err());

    assert_eq!(registry.resolve(Path::new("-"), None)?.name, "pcm");

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
