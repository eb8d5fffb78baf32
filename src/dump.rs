//! Gzipped archive of raw messages, one file per message.

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct MailDumper {
    folder: PathBuf,
}

impl MailDumper {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Writes `raw` to `<folder>/<yyyy>/<MM>/<dd>/<millis>.eml.gz`.
    pub fn dump(&self, raw: &[u8]) -> io::Result<PathBuf> {
        self.dump_at(raw, Utc::now())
    }

    pub fn dump_at(&self, raw: &[u8], now: DateTime<Utc>) -> io::Result<PathBuf> {
        let dir = self
            .folder
            .join(now.format("%Y").to_string())
            .join(now.format("%m").to_string())
            .join(now.format("%d").to_string());
        fs::create_dir_all(&dir)?;

        let (path, file) = create_unique(&dir, now.timestamp_millis())?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(raw)?;
        encoder.finish()?;

        log::debug!("Dumped {} bytes to {}", raw.len(), path.display());
        Ok(path)
    }
}

/// Messages arriving within the same millisecond get a numeric suffix.
fn create_unique(dir: &Path, millis: i64) -> io::Result<(PathBuf, File)> {
    let mut attempt = 0;
    loop {
        let name = if attempt == 0 {
            format!("{}.eml.gz", millis)
        } else {
            format!("{}-{}.eml.gz", millis, attempt)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn read_back(path: &Path) -> Vec<u8> {
        let mut decoder = GzDecoder::new(File::open(path).unwrap());
        let mut raw = Vec::new();
        decoder.read_to_end(&mut raw).unwrap();
        raw
    }

    #[test]
    fn test_dump_layout() {
        let dir = TempDir::new().unwrap();
        let dumper = MailDumper::new(dir.path());
        let now = Utc.with_ymd_and_hms(2016, 12, 2, 10, 20, 30).unwrap();

        let path = dumper.dump_at(b"Subject: hi\r\n\r\nbody", now).unwrap();

        let expected = dir
            .path()
            .join("2016")
            .join("12")
            .join("02")
            .join(format!("{}.eml.gz", now.timestamp_millis()));
        assert_eq!(path, expected);
        assert_eq!(read_back(&path), b"Subject: hi\r\n\r\nbody");
    }

    #[test]
    fn test_same_millisecond_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let dumper = MailDumper::new(dir.path());
        let now = Utc.with_ymd_and_hms(2016, 12, 2, 10, 20, 30).unwrap();

        let first = dumper.dump_at(b"first", now).unwrap();
        let second = dumper.dump_at(b"second", now).unwrap();

        assert_ne!(first, second);
        assert_eq!(read_back(&first), b"first");
        assert_eq!(read_back(&second), b"second");
    }
}
