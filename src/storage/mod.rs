//! Lux log persistence.
//!
//! One CSV file per lux session, one `timestamp,value` record per sample, no
//! header.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use log::{info, warn};
use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::{camera::timestamped_name, models::LuxSample};

#[async_trait]
pub trait LuxStore: Send + Sync {
    /// File a session stopping at `stopped_at` is written to.
    fn target_for(&self, stopped_at: DateTime<Local>) -> PathBuf;

    /// Opens `path` in append mode (creating it), then appends each sample
    /// as its own record. A failure part-way through can leave a partial file
    /// behind. Returns the number of records written.
    async fn flush(&self, path: &Path, samples: &[LuxSample]) -> Result<usize>;

    /// Truncates `path` and writes every sample again. Replaces whatever a
    /// failed flush left there.
    async fn rewrite(&self, path: &Path, samples: &[LuxSample]) -> Result<usize>;
}

#[derive(Debug, Clone)]
pub struct CsvLuxStore {
    dir: PathBuf,
}

impl CsvLuxStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    async fn write(&self, path: &Path, samples: &[LuxSample], truncate: bool) -> Result<usize> {
        let path = path.to_path_buf();
        let samples = samples.to_vec();

        tokio::task::spawn_blocking(move || {
            let file = open_log(&path, truncate)?;
            write_records(file, &path, &samples)
        })
        .await
        .context("lux flush worker join failed")?
    }
}

#[async_trait]
impl LuxStore for CsvLuxStore {
    fn target_for(&self, stopped_at: DateTime<Local>) -> PathBuf {
        self.dir.join(timestamped_name(stopped_at, "csv"))
    }

    async fn flush(&self, path: &Path, samples: &[LuxSample]) -> Result<usize> {
        self.write(path, samples, false).await
    }

    async fn rewrite(&self, path: &Path, samples: &[LuxSample]) -> Result<usize> {
        self.write(path, samples, true).await
    }
}

fn open_log(path: &Path, truncate: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    options
        .open(path)
        .with_context(|| format!("failed to open lux log {}", path.display()))
}

/// Writes one `timestamp,value` record per sample to `out`, flushing after
/// each. `path` only labels errors.
pub(crate) fn write_records<W: Write>(out: W, path: &Path, samples: &[LuxSample]) -> Result<usize> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);

    for (written, sample) in samples.iter().enumerate() {
        writer
            .serialize((sample.timestamp_ns, sample.lux))
            .and_then(|_| writer.flush().map_err(csv::Error::from))
            .with_context(|| {
                format!(
                    "failed to append record {} of {} to {}",
                    written + 1,
                    samples.len(),
                    path.display()
                )
            })?;
    }

    Ok(samples.len())
}

/// Picks the first external media directory (under an `app_name`
/// subdirectory) that can be created, else `fallback`.
pub fn resolve_output_dir(media_dirs: &[PathBuf], app_name: &str, fallback: &Path) -> PathBuf {
    if let Some(media_dir) = media_dirs.first() {
        let candidate = media_dir.join(app_name);
        match fs::create_dir_all(&candidate) {
            Ok(()) if candidate.is_dir() => return candidate,
            Ok(()) => {}
            Err(err) => warn!(
                "Media directory {} unavailable ({err}); falling back to {}",
                candidate.display(),
                fallback.display()
            ),
        }
    }

    if let Err(err) = fs::create_dir_all(fallback) {
        warn!("Failed to create {}: {err}", fallback.display());
    }
    info!("Writing output to {}", fallback.display());
    fallback.to_path_buf()
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::{io, sync::Mutex};

    /// Passes the first `remaining` writes through, then fails every write.
    pub struct FailAfter<W> {
        pub inner: W,
        pub remaining: usize,
    }

    impl<W: Write> Write for FailAfter<W> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.remaining -= 1;
            self.inner.write_all(buf)?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    /// CSV store whose target path can be pinned and whose next flush can be
    /// made to fail after a number of records.
    pub struct ScriptedStore {
        pub inner: CsvLuxStore,
        pub target: Option<PathBuf>,
        pub fail_next_after: Mutex<Option<usize>>,
    }

    impl ScriptedStore {
        pub fn new(dir: PathBuf) -> Self {
            Self {
                inner: CsvLuxStore::new(dir),
                target: None,
                fail_next_after: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LuxStore for ScriptedStore {
        fn target_for(&self, stopped_at: DateTime<Local>) -> PathBuf {
            self.target
                .clone()
                .unwrap_or_else(|| self.inner.target_for(stopped_at))
        }

        async fn flush(&self, path: &Path, samples: &[LuxSample]) -> Result<usize> {
            let fail_after = self.fail_next_after.lock().unwrap().take();
            match fail_after {
                Some(remaining) => {
                    let file = open_log(path, false)?;
                    write_records(FailAfter { inner: file, remaining }, path, samples)
                }
                None => self.inner.flush(path, samples).await,
            }
        }

        async fn rewrite(&self, path: &Path, samples: &[LuxSample]) -> Result<usize> {
            self.inner.rewrite(path, samples).await
        }
    }
}
