//! Size-rotating file logging.
//!
//! The `[logger]` config section bounds each log file at `max_file_size`
//! bytes and keeps `max_file_count` rotated files: `courierd.log` is the
//! live file, `courierd.log.1` the most recent rotation, and so on.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::EnvFilter;

use courier_config::LoggerSection;

struct RollingFile {
    path: PathBuf,
    max_size: u64,
    max_count: usize,
    file: File,
    written: u64,
}

impl RollingFile {
    fn open(path: &Path, max_size: u64, max_count: usize) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            max_size,
            max_count,
            file,
            written,
        })
    }

    fn rotated_name(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        if self.max_count > 0 {
            for index in (1..self.max_count).rev() {
                let _ = std::fs::rename(self.rotated_name(index), self.rotated_name(index + 1));
            }
            let _ = std::fs::rename(&self.path, self.rotated_name(1));
        }
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.max_size > 0 && self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Cloneable handle over the shared rotating file, pluggable into
/// `tracing_subscriber` as a writer.
#[derive(Clone)]
pub struct RollingWriter {
    inner: Arc<Mutex<RollingFile>>,
}

impl RollingWriter {
    /// Opens (appending) the log file at `path`.
    pub fn open(path: &Path, max_size: u64, max_count: usize) -> io::Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(RollingFile::open(path, max_size, max_count)?)),
        })
    }
}

impl Write for RollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .flush()
    }
}

impl<'a> MakeWriter<'a> for RollingWriter {
    type Writer = RollingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Initializes the global subscriber over the configured rotating file.
pub fn init(config: &LoggerSection) -> anyhow::Result<()> {
    let writer = RollingWriter::open(
        &config.log_file,
        config.max_file_size,
        config.max_file_count,
    )?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(())
}
