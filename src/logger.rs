//! Engine session log.
//!
//! One plain-text file per run, truncated when the run opens it:
//!   Windows:  `%APPDATA%\RasterFE\rasterfe.log`
//!   Linux:    `$XDG_DATA_HOME/RasterFE/rasterfe.log` (or `~/.local/share/...`)
//!   macOS:    `~/Library/Application Support/RasterFE/rasterfe.log`
//!
//! Logging is opt-in.  Until [`init`] or [`init_at`] opens a file the
//! `log_info!` / `log_warn!` / `log_err!` macros format nothing and touch no
//! file, so embedding the engine as a library stays silent.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

pub const APP_DIR: &str = "RasterFE";
const LOG_FILE_NAME: &str = "rasterfe.log";

/// Open session log.
struct SessionLog {
    path: PathBuf,
    file: Mutex<File>,
}

static SESSION: OnceLock<SessionLog> = OnceLock::new();

/// Severity tag written in front of every entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl Level {
    pub fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        }
    }
}

/// Path of the open log file, if logging was enabled.
pub fn log_path() -> Option<&'static Path> {
    SESSION.get().map(|s| s.path.as_path())
}

pub fn is_enabled() -> bool {
    SESSION.get().is_some()
}

fn append(line: &str) {
    // I/O failures are dropped; a log write never fails an engine call.
    if let Some(session) = SESSION.get()
        && let Ok(mut file) = session.file.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

fn format_entry(clock: &str, level: Level, msg: &str) -> String {
    format!("{} {:<5} {}", clock, level.tag(), msg)
}

/// Append one entry.  Used by the logging macros.
pub fn write(level: Level, msg: &str) {
    if is_enabled() {
        append(&format_entry(&clock(), level, msg));
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if $crate::logger::is_enabled() {
            $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if $crate::logger::is_enabled() {
            $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        if $crate::logger::is_enabled() {
            $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*));
        }
    };
}

/// Enable logging to `<data dir>/RasterFE/rasterfe.log`.
pub fn init() {
    init_at(&default_log_path());
}

/// Enable logging to `path`.  The first successful call wins; later calls
/// are ignored.  A panic hook mirrors panic messages into the file and then
/// defers to the previous hook.
pub fn init_at(path: &Path) {
    if is_enabled() {
        return;
    }
    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }
    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("RasterFE: cannot open log file {}: {}", path.display(), e);
            return;
        }
    };
    if SESSION.set(SessionLog { path: path.to_path_buf(), file: Mutex::new(file) }).is_err() {
        return;
    }

    append(&format!("# RasterFE {} log, unix time {}", env!("CARGO_PKG_VERSION"), unix_seconds()));

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Panic, &info.to_string());
        previous(info);
    }));
}

fn default_log_path() -> PathBuf {
    data_dir().join(APP_DIR).join(LOG_FILE_NAME)
}

/// Per-user data directory, without the app folder.
pub(crate) fn data_dir() -> PathBuf {
    let env_dir = |key: &str| std::env::var_os(key).map(PathBuf::from);

    #[cfg(target_os = "windows")]
    {
        if let Some(dir) = env_dir("APPDATA") {
            return dir;
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = env_dir("HOME") {
            return home.join("Library/Application Support");
        }
    }

    env_dir("XDG_DATA_HOME")
        .or_else(|| env_dir("HOME").map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn unix_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// UTC wall clock as `HH:MM:SS.mmm`.
fn clock() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() % 86_400_000)
        .unwrap_or(0);
    let secs = millis / 1000;
    format!("{:02}:{:02}:{:02}.{:03}", secs / 3600, secs / 60 % 60, secs % 60, millis % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_has_millisecond_shape() {
        let c = clock();
        assert_eq!(c.len(), 12);
        assert_eq!(&c[2..3], ":");
        assert_eq!(&c[5..6], ":");
        assert_eq!(&c[8..9], ".");
    }

    #[test]
    fn entries_carry_a_padded_level_tag() {
        assert_eq!(format_entry("01:02:03.004", Level::Warn, "x"), "01:02:03.004 WARN  x");
        assert_eq!(format_entry("t", Level::Error, "boom"), "t ERROR boom");
    }

    #[test]
    fn default_path_lives_under_the_app_dir() {
        assert!(default_log_path().ends_with(Path::new(APP_DIR).join(LOG_FILE_NAME)));
    }
}
