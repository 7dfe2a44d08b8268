use crate::shared::constants;
use lazy_static::lazy_static;
use std::backtrace::Backtrace;
use std::fs::OpenOptions;
use std::io::Write;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Clone)]
struct LoggerPaths {
    error_path: String,
    debug_path: String,
}

lazy_static! {
    static ref LOGGER: Mutex<Option<LoggerPaths>> = Mutex::new(None);
}

fn paths() -> MutexGuard<'static, Option<LoggerPaths>> {
    match LOGGER.lock() {
        Ok(l) => l,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn append_line(path: &str, line: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{}", line);
    }
}

fn start_file(path: &Path, title: &str) {
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
    {
        let _ = writeln!(file, "=== {} Started: {} ===", title, chrono::Local::now());
    }
}

/// Start logging into `dir` (current directory when `None`).
///
/// Until this is called every log function is a no-op.
pub fn init(dir: Option<&Path>) {
    let base = match dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().unwrap_or_default(),
    };
    let _ = std::fs::create_dir_all(&base);

    let error_path: PathBuf = base.join(constants::ERROR_LOG_FILE);
    let debug_path: PathBuf = base.join(constants::DEBUG_LOG_FILE);
    start_file(&error_path, "Error Log");
    start_file(&debug_path, "Debug Log");

    let paths_now = LoggerPaths {
        error_path: error_path.to_string_lossy().to_string(),
        debug_path: debug_path.to_string_lossy().to_string(),
    };
    *paths() = Some(paths_now.clone());

    panic::set_hook(Box::new(move |info| {
        let backtrace = Backtrace::capture();
        let msg = match info.payload().downcast_ref::<&str>() {
            Some(s) => *s,
            None => match info.payload().downcast_ref::<String>() {
                Some(s) => &s[..],
                None => "Box<Any>",
            },
        };

        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown".to_string());

        let thread = std::thread::current();
        let error_msg = format!(
            "\nCRITICAL PANIC in thread '{}' at {}:\nMessage: {}\nBacktrace:\n{:?}\n",
            thread.name().unwrap_or("<unnamed>"),
            location,
            msg,
            backtrace
        );

        append_line(&paths_now.error_path, &error_msg);
        append_line(&paths_now.debug_path, &error_msg);
        eprintln!("{} crashed. See {} for details.", constants::APP_NAME, paths_now.error_path);
    }));
}

pub fn log(level: &str, msg: &str) {
    if let Some(paths) = paths().as_ref() {
        let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
        let line = format!("[{}][{}] {}", timestamp, level, msg);
        append_line(&paths.debug_path, &line);

        if level == "ERROR" || level == "WARN" {
            append_line(&paths.error_path, &line);
        }
    }
}

pub fn info(msg: &str) {
    log("INFO", msg);
}

pub fn warn(msg: &str) {
    log("WARN", msg);
}

pub fn error(msg: &str) {
    log("ERROR", msg);
}

pub fn debug(msg: &str) {
    log("DEBUG", msg);
}
