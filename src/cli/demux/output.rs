use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;

/// `<base>.<suffix>`, keeping any extension of `base`.
pub fn create_path_with_suffix(base_path: &Path, suffix: &str) -> PathBuf {
    let file_name = base_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    base_path.with_file_name(format!("{file_name}.{suffix}"))
}

pub fn create_path_with_extension(base_path: &Path, expected_ext: &str) -> PathBuf {
    match base_path.extension() {
        Some(existing_ext) if existing_ext == expected_ext => base_path.to_path_buf(),
        Some(_) => create_path_with_suffix(base_path, expected_ext),
        None => base_path.with_extension(expected_ext),
    }
}

/// File extension for an elementary stream of `codec`.
pub fn extension_for_codec(codec: &str) -> &'static str {
    match codec {
        "ac3" => "ac3",
        "eac3" => "eac3",
        "dts" => "dts",
        "mp2" | "mp3" => "mpa",
        "aac" => "aac",
        "pcm_s16le" | "pcm_s16be" => "pcm",
        "mpeg1video" | "mpeg2video" => "m2v",
        "h264" => "h264",
        "hevc" => "hevc",
        "sub_rawutf8" | "srt" => "txt",
        "dvd_subtitle" => "sub",
        _ => "bin",
    }
}

/// `<base>.<index>.<ext>` for one demultiplexed stream.
pub fn create_stream_path(base_path: &Path, stream_index: usize, codec: &str) -> PathBuf {
    let indexed = create_path_with_suffix(base_path, &stream_index.to_string());
    create_path_with_suffix(&indexed, extension_for_codec(codec))
}

/// Sink for the payload of one stream.
pub struct ElementaryWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl ElementaryWriter {
    pub fn create(path: PathBuf) -> Result<Self> {
        log::info!("Creating stream file: {}", path.display());
        let writer = BufWriter::new(File::create(&path)?);
        Ok(Self {
            path,
            writer,
            written: 0,
        })
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    pub fn finish(mut self) -> Result<(PathBuf, u64)> {
        self.writer.flush()?;
        Ok((self.path, self.written))
    }
}

#[test]
fn stream_paths() {
    let base = Path::new("/tmp/movie");
    assert_eq!(
        create_stream_path(base, 1, "ac3"),
        PathBuf::from("/tmp/movie.1.ac3")
    );
    assert_eq!(
        create_stream_path(Path::new("out.ts"), 0, "mpeg2video"),
        PathBuf::from("out.ts.0.m2v")
    );
    assert_eq!(
        create_path_with_extension(Path::new("report"), "yaml"),
        PathBuf::from("report.yaml")
    );
    assert_eq!(
        create_path_with_extension(Path::new("report.yaml"), "yaml"),
        PathBuf::from("report.yaml")
    );
}
