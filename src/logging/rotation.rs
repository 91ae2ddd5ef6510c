use crate::config::types::RotationPolicy;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";
const GZIP_SUFFIX: &str = ".gz";

/// Size-rotated log file.
///
/// When a write would push the active file past `max_size`, the file is
/// renamed to `<stem>-<UTC timestamp>.<ext>` and a fresh one is opened.
/// Backups beyond `max_backups`, or older than `max_age`, are deleted on
/// every rotation. With compression on, backups are gzipped to
/// `<stem>-<UTC timestamp>.<ext>.gz`.
pub struct RotatingFile {
    path: PathBuf,
    max_size: u64,
    max_backups: usize,
    max_age: Duration,
    compress: bool,
    file: File,
    size: u64,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, policy: &RotationPolicy) -> io::Result<Self> {
        let file = Self::with_limits(path, policy.max_size_bytes(), policy.max_backups, policy.max_age())?;
        Ok(file.with_compression(policy.compress))
    }

    pub fn with_limits(
        path: impl Into<PathBuf>,
        max_size: u64,
        max_backups: usize,
        max_age: Duration,
    ) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = open_append(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path,
            max_size: max_size.max(1),
            max_backups,
            max_age,
            compress: false,
            file,
            size,
        })
    }

    /// Gzip backups after rotation.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Rotated files, oldest first.
    pub fn backups(&self) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .list_backups()?
            .into_iter()
            .map(|(_, path)| path)
            .collect())
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        // Backup names must sort in rotation order, even for several
        // rotations within one millisecond
        let mut stamp = Utc::now();
        if let Some((newest, _)) = self.list_backups()?.pop() {
            if stamp.timestamp_millis() <= newest.timestamp_millis() {
                stamp = newest + ChronoDuration::milliseconds(1);
            }
        }
        let backup = self.backup_path(stamp);

        fs::rename(&self.path, &backup)?;
        self.file = open_append(&self.path)?;
        self.size = 0;

        if self.compress {
            if let Err(e) = compress_file(&backup) {
                // tracing cannot be used from inside its own writer
                eprintln!(
                    "logpusher: failed to compress {}, keeping it uncompressed: {}",
                    backup.display(),
                    e
                );
            }
        }

        self.prune(Utc::now())
    }

    fn prune(&self, now: DateTime<Utc>) -> io::Result<()> {
        let backups = self.list_backups()?;
        let excess = backups.len().saturating_sub(self.max_backups);

        for (index, (stamp, path)) in backups.iter().enumerate() {
            let expired = now
                .signed_duration_since(*stamp)
                .to_std()
                .is_ok_and(|age| age > self.max_age);
            if index < excess || expired {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Backups with their rotation time, oldest first.
    fn list_backups(&self) -> io::Result<Vec<(DateTime<Utc>, PathBuf)>> {
        let (stem, ext) = self.name_parts();
        let prefix = format!("{}-", stem);
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut backups = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            let rest = rest.strip_suffix(GZIP_SUFFIX).unwrap_or(rest);
            let stamp_text = match &ext {
                Some(ext) => match rest.strip_suffix(&format!(".{}", ext)) {
                    Some(stamp) => stamp,
                    None => continue,
                },
                None => rest,
            };
            if let Ok(stamp) = NaiveDateTime::parse_from_str(stamp_text, BACKUP_TIME_FORMAT) {
                backups.push((stamp.and_utc(), entry.path()));
            }
        }

        backups.sort();
        Ok(backups)
    }

    fn backup_path(&self, stamp: DateTime<Utc>) -> PathBuf {
        let (stem, ext) = self.name_parts();
        let stamp = stamp.format(BACKUP_TIME_FORMAT);
        let name = match ext {
            Some(ext) => format!("{}-{}.{}", stem, stamp, ext),
            None => format!("{}-{}", stem, stamp),
        };
        self.path.with_file_name(name)
    }

    fn name_parts(&self) -> (String, Option<String>) {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "logpusher".to_string());
        let ext = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned());
        (stem, ext)
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.size > 0 && self.size + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let written = self.file.write(buf)?;
        self.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Replace `path` with a gzipped `<path>.gz`.
fn compress_file(path: &Path) -> io::Result<()> {
    let mut gz_name = path.as_os_str().to_owned();
    gz_name.push(GZIP_SUFFIX);
    let gz_path = PathBuf::from(gz_name);

    match write_gzip(path, &gz_path) {
        Ok(()) => fs::remove_file(path),
        Err(e) => {
            let _ = fs::remove_file(&gz_path);
            Err(e)
        }
    }
}

fn write_gzip(source: &Path, target: &Path) -> io::Result<()> {
    let mut input = File::open(source)?;
    let mut encoder = GzEncoder::new(File::create(target)?, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

    #[test]
    fn test_rotates_when_size_exceeded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RotatingFile::with_limits(&path, 16, 5, WEEK).unwrap();

        file.write_all(b"0123456789\n").unwrap();
        assert!(file.backups().unwrap().is_empty());

        file.write_all(b"abcdefghij\n").unwrap();
        file.flush().unwrap();

        let backups = file.backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "0123456789\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "abcdefghij\n");

        let name = backups[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("app-"));
        assert!(name.ends_with(".log"));
    }

    #[test]
    fn test_oversize_single_write_goes_to_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RotatingFile::with_limits(&path, 4, 5, WEEK).unwrap();

        file.write_all(b"longer than the limit").unwrap();

        assert!(file.backups().unwrap().is_empty());
    }

    #[test]
    fn test_keeps_at_most_max_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RotatingFile::with_limits(&path, 8, 2, WEEK).unwrap();

        for i in 0..5 {
            file.write_all(format!("line {}\n", i).as_bytes()).unwrap();
        }

        let backups = file.backups().unwrap();
        assert_eq!(backups.len(), 2);
        // The newest backups survive
        assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "line 2\n");
        assert_eq!(fs::read_to_string(&backups[1]).unwrap(), "line 3\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "line 4\n");
    }

    #[test]
    fn test_prunes_backups_older_than_max_age() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let stale = dir.path().join("app-2020-01-01T00-00-00.000.log");
        let unrelated = dir.path().join("other-2020-01-01T00-00-00.000.log");
        fs::write(&stale, "old").unwrap();
        fs::write(&unrelated, "keep").unwrap();

        let mut file = RotatingFile::with_limits(&path, 8, 5, WEEK).unwrap();
        file.write_all(b"first..\n").unwrap();
        file.write_all(b"second.\n").unwrap();

        assert!(!stale.exists());
        assert!(unrelated.exists());
        assert_eq!(file.backups().unwrap().len(), 1);
    }

    #[test]
    fn test_appends_to_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("app.log");

        {
            let mut file = RotatingFile::with_limits(&path, 1024, 5, WEEK).unwrap();
            file.write_all(b"one\n").unwrap();
        }
        let mut file = RotatingFile::with_limits(&path, 1024, 5, WEEK).unwrap();
        file.write_all(b"two\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_compressed_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RotatingFile::with_limits(&path, 8, 2, WEEK)
            .unwrap()
            .with_compression(true);

        for i in 0..4 {
            file.write_all(format!("line {}\n", i).as_bytes()).unwrap();
        }

        let backups = file.backups().unwrap();
        assert_eq!(backups.len(), 2);
        for backup in &backups {
            let name = backup.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.ends_with(".log.gz"), "{}", name);
        }

        let mut content = String::new();
        GzDecoder::new(File::open(&backups[1]).unwrap())
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "line 2\n");

        // No uncompressed copies left behind
        let plain = fs::read_dir(dir.path())
            .unwrap()
            .filter(|entry| {
                let name = entry.as_ref().unwrap().file_name().to_string_lossy().into_owned();
                name.starts_with("app-") && name.ends_with(".log")
            })
            .count();
        assert_eq!(plain, 0);
    }
}
