use parking_lot::Mutex;
/// Debug logging for panegrid
///
/// Routes the `log` facade into a file so hook invocations and the watch
/// loop never write into the panes they manage.
///
/// The level comes from, in order:
/// - `--log-level` on the command line
/// - `RUST_LOG` (output is mirrored to stderr as well)
/// - `DEBUG_LEVEL`: 0 or unset off, 1 errors, 2 info, 3 debug, 4 trace
///
/// All output goes to /tmp/panegrid_debug.log on Unix/macOS,
/// or %TEMP%\panegrid_debug.log on Windows.
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Debug level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugLevel {
    Off = 0,
    Error = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl DebugLevel {
    fn from_env() -> Self {
        match std::env::var("DEBUG_LEVEL") {
            Ok(val) => Self::from_number(&val),
            Err(_) => DebugLevel::Off,
        }
    }

    fn from_number(value: &str) -> Self {
        match value.trim().parse::<u8>() {
            Ok(1) => DebugLevel::Error,
            Ok(2) => DebugLevel::Info,
            Ok(3) => DebugLevel::Debug,
            Ok(4) => DebugLevel::Trace,
            _ => DebugLevel::Off,
        }
    }

    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            DebugLevel::Off => log::LevelFilter::Off,
            DebugLevel::Error => log::LevelFilter::Error,
            DebugLevel::Info => log::LevelFilter::Info,
            DebugLevel::Debug => log::LevelFilter::Debug,
            DebugLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Where the debug log lives
pub fn log_path() -> PathBuf {
    #[cfg(unix)]
    let path = PathBuf::from("/tmp/panegrid_debug.log");
    #[cfg(not(unix))]
    let path = std::env::temp_dir().join("panegrid_debug.log");
    path
}

/// Level named by `RUST_LOG`, if it is a plain level name
fn rust_log_level() -> Option<log::LevelFilter> {
    let value = std::env::var("RUST_LOG").ok()?;
    // Only the global part of a directive list such as "debug,foo=trace"
    value
        .split(',')
        .find(|part| !part.contains('='))
        .and_then(|part| part.trim().parse().ok())
}

struct FileLogger {
    file: Option<std::fs::File>,
    mirror_stderr: bool,
}

impl FileLogger {
    fn open(level: log::LevelFilter, mirror_stderr: bool) -> Self {
        let file = if level != log::LevelFilter::Off {
            // Hooks spawn many short-lived processes, so append rather than truncate
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(log_path())
                .ok()
        } else {
            None
        };
        let mut logger = FileLogger {
            file,
            mirror_stderr,
        };
        if logger.file.is_some() {
            logger.write_raw(&format!(
                "{}\npanegrid {} debug session started at {} (pid={}, level={})\n",
                "=".repeat(80),
                crate::VERSION,
                get_timestamp(),
                std::process::id(),
                level
            ));
        }
        logger
    }

    fn write_raw(&mut self, msg: &str) {
        if let Some(ref mut file) = self.file {
            let _ = file.write_all(msg.as_bytes());
            let _ = file.flush();
        }
        if self.mirror_stderr {
            eprint!("{}", msg);
        }
    }
}

/// `log::Log` implementation writing through the shared file logger
struct LogBridge {
    level: log::LevelFilter,
    inner: Mutex<FileLogger>,
}

impl log::Log for LogBridge {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "[{}] [{:<5}] [{}] {}\n",
            get_timestamp(),
            record.level(),
            record.target(),
            record.args()
        );
        self.inner.lock().write_raw(&line);
    }

    fn flush(&self) {
        if let Some(ref mut file) = self.inner.lock().file {
            let _ = file.flush();
        }
    }
}

static BRIDGE: OnceLock<LogBridge> = OnceLock::new();

fn get_timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:06}", now.as_secs(), now.subsec_micros())
}

/// Pick the effective level: CLI, then `RUST_LOG`, then `DEBUG_LEVEL`.
///
/// Returns the level and whether to mirror to stderr.
fn effective_level(cli_level: Option<log::LevelFilter>) -> (log::LevelFilter, bool) {
    if let Some(level) = cli_level {
        return (level, false);
    }
    if let Some(level) = rust_log_level() {
        return (level, true);
    }
    (DebugLevel::from_env().to_level_filter(), false)
}

/// Install the file logger as the `log` backend. Safe to call twice; only
/// the first call has an effect.
pub fn init_log_bridge(cli_level: Option<log::LevelFilter>) {
    let (level, mirror_stderr) = effective_level(cli_level);
    let bridge = BRIDGE.get_or_init(|| LogBridge {
        level,
        inner: Mutex::new(FileLogger::open(level, mirror_stderr)),
    });
    if log::set_logger(bridge).is_ok() {
        log::set_max_level(bridge.level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_level_numbers() {
        assert_eq!(DebugLevel::from_number("0"), DebugLevel::Off);
        assert_eq!(DebugLevel::from_number(" 3 "), DebugLevel::Debug);
        assert_eq!(DebugLevel::from_number("verbose"), DebugLevel::Off);
        assert_eq!(DebugLevel::Trace.to_level_filter(), log::LevelFilter::Trace);
    }

    #[test]
    fn test_cli_level_wins() {
        assert_eq!(
            effective_level(Some(log::LevelFilter::Warn)),
            (log::LevelFilter::Warn, false)
        );
    }
}
