#![allow(dead_code)]

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use modsync::{ClientConfig, ModError, Progress};
use parking_lot::Mutex;
use std::fs::File;
use std::path::Path;

/// Config suitable for tests: no retries, tiny intervals.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        download_retries: 0,
        retry_interval_ms: 10,
        max_redirects: 3,
        ..ClientConfig::default()
    }
}

/// Builds a `.tar.gz` in memory from `(path, contents)` pairs.
pub fn make_tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Stands in for 7z: `.gz` unpacks to the inner file, `.tar` unpacks its members.
#[derive(Default)]
pub struct TarExtractor {
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl modsync::Extractor for TarExtractor {
    async fn extract(
        &self,
        archive: &Path,
        outdir: &Path,
        _overwrite: bool,
        _files: &[String],
    ) -> Result<(), ModError> {
        let name = archive.file_name().unwrap().to_string_lossy().to_string();
        self.calls.lock().push(name.clone());
        std::fs::create_dir_all(outdir)?;

        if name.ends_with(".gz") {
            let inner = outdir.join(archive.file_stem().unwrap());
            let mut decoder = GzDecoder::new(File::open(archive)?);
            let mut out = File::create(inner)?;
            std::io::copy(&mut decoder, &mut out)?;
            Ok(())
        } else if name.ends_with(".tar") {
            tar::Archive::new(File::open(archive)?).unpack(outdir)?;
            Ok(())
        } else {
            Err(ModError::Archive(format!("unsupported archive {}", name)))
        }
    }

    async fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start(f64, f64, String),
    Update(f64, String),
    Finish,
}

/// Records every progress call.
#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<Event>>,
}

impl Progress for RecordingProgress {
    fn start_task(&self, start: f64, span: f64, template: &str) {
        self.events
            .lock()
            .push(Event::Start(start, span, template.to_string()));
    }

    fn update(&self, fraction: f64, label: &str) {
        self.events
            .lock()
            .push(Event::Update(fraction, label.to_string()));
    }

    fn finish_task(&self) {
        self.events.lock().push(Event::Finish);
    }
}
