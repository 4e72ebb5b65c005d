//! Process-wide diagnostic logger
//!
//! Two `env_logger` sinks behind one `log::Log`: a console sink at INFO
//! and a file sink at DEBUG that rotates by size. The logger is
//! registered at most once per process; every later call to
//! [`init_logging`] hands back the same [`LogHandle`].

use anyhow::{Context, Result};
use env_logger::{Builder, Env, Logger, Target};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::utils::config::RunConfiguration;

/// Rotate the log file once it would grow past this size.
pub const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;
/// Rotated files kept next to the live one (`app.log.1` .. `app.log.3`).
pub const LOG_BACKUPS: usize = 3;
/// Overrides the console level, e.g. `LUMI_LOG=debug`.
pub const CONSOLE_LEVEL_ENV: &str = "LUMI_LOG";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Shared handle to the registered logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogHandle {
    pub log_file: PathBuf,
    /// False when another logger already owned the `log` facade.
    pub registered: bool,
}

static LOGGER: Mutex<Option<LogHandle>> = Mutex::new(None);

/// Initialize logging for the run. Idempotent.
pub fn init_logging(config: &RunConfiguration) -> Result<LogHandle> {
    let mut slot = LOGGER.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(handle) = slot.as_ref() {
        return Ok(handle.clone());
    }

    let log_file = config.paths().log_file();
    let writer = RotatingFile::open(&log_file, MAX_LOG_BYTES, LOG_BACKUPS)?;

    let logger = DualLogger {
        console: console_logger(),
        file: file_logger(writer),
    };
    let max_level = logger.max_level();
    let registered = log::set_boxed_logger(Box::new(logger)).is_ok();
    if registered {
        log::set_max_level(max_level);
    }

    let handle = LogHandle {
        log_file,
        registered,
    };
    *slot = Some(handle.clone());
    drop(slot);

    log::info!("Logging to {}", handle.log_file.display());
    for line in config.summary() {
        log::info!("{}", line);
    }

    Ok(handle)
}

fn console_logger() -> Logger {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_env(Env::new().filter(CONSOLE_LEVEL_ENV))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} [{}] {}",
                chrono::Local::now().format(TIMESTAMP_FORMAT),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(Target::Stderr)
        .build()
}

fn file_logger(writer: RotatingFile) -> Logger {
    Builder::new()
        .filter_level(LevelFilter::Debug)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} [{}] {}",
                chrono::Local::now().format(TIMESTAMP_FORMAT),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(writer)))
        .build()
}

struct DualLogger {
    console: Logger,
    file: Logger,
}

impl DualLogger {
    fn max_level(&self) -> LevelFilter {
        self.console.filter().max(self.file.filter())
    }
}

impl Log for DualLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata) || self.file.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.console.matches(record) {
            self.console.log(record);
        }
        if self.file.matches(record) {
            self.file.log(record);
        }
    }

    fn flush(&self) {
        self.console.flush();
        self.file.flush();
    }
}

/// Append-only file that rolls over to numbered backups by size.
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: File,
    written: u64,
}

impl RotatingFile {
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log dir {}", parent.display()))?;
        }
        let file = Self::open_append(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            path: path.to_path_buf(),
            max_bytes,
            backups,
            file,
            written,
        })
    }

    fn open_append(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.backups == 0 {
            self.file = File::create(&self.path)?;
            self.written = 0;
            return Ok(());
        }

        let oldest = self.backup_path(self.backups);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.backups).rev() {
            let from = self.backup_path(index);
            if from.exists() {
                fs::rename(&from, self.backup_path(index + 1))?;
            }
        }
        fs::rename(&self.path, self.backup_path(1))?;

        self.file = Self::open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
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
