//! Structured, column-aligned console logging.
//!
//! Builds on `env_logger` with a custom formatter: level names are padded
//! and ANSI-colored (disabled when `NO_COLOR` is set, per
//! <https://no-color.org/>), and the `file:line` field is padded so log
//! lines stay aligned in a terminal.

use std::io::Write;

use log::{Level, LevelFilter};

const LEVEL_FIELD_WIDTH: usize = 8;
const FILE_LINE_FIELD_WIDTH: usize = 22;

fn color_code(level: Level) -> &'static str {
    match level {
        Level::Error => "\x1b[31m",
        Level::Warn => "\x1b[33m",
        Level::Info => "\x1b[32m",
        Level::Debug => "\x1b[36m",
        Level::Trace => "\x1b[90m",
    }
}

const RESET: &str = "\x1b[0m";

fn colors_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

/// Length of `s` ignoring ANSI escape sequences, for column padding.
fn visible_len(s: &str) -> usize {
    let mut len = 0;
    let mut in_escape = false;
    for c in s.chars() {
        if in_escape {
            if c == 'm' {
                in_escape = false;
            }
            continue;
        }
        if c == '\x1b' {
            in_escape = true;
            continue;
        }
        len += 1;
    }
    len
}

fn pad_visible(s: &str, width: usize) -> String {
    let visible = visible_len(s);
    if visible >= width {
        s.to_string()
    } else {
        format!("{s}{}", " ".repeat(width - visible))
    }
}

/// Installs the gateway's `env_logger` instance as the global logger.
///
/// Mirrors the teacher's `configure_logger`: filters at `Debug` by default
/// (overridable via `RUST_LOG`), but raises the global max level to `Trace`
/// so `log::trace!` call sites compile and can be enabled per-module via
/// `RUST_LOG` without rebuilding.
pub fn configure_logger() {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Debug);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    let use_color = colors_enabled();
    builder.format(move |buf, record| {
        let level = record.level();
        let level_str = if use_color {
            format!("{}{:<5}{}", color_code(level), level, RESET)
        } else {
            format!("{level:<5}")
        };
        let level_field = pad_visible(&level_str, LEVEL_FIELD_WIDTH);

        let file_line = match (record.file(), record.line()) {
            (Some(file), Some(line)) => format!("{file}:{line}"),
            (Some(file), None) => file.to_string(),
            _ => "unknown".to_string(),
        };
        let file_line_field = pad_visible(&file_line, FILE_LINE_FIELD_WIDTH);

        writeln!(
            buf,
            "[{} {level_field} {file_line_field}] {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            record.args(),
        )
    });
    builder.init();
    log::set_max_level(LevelFilter::Trace);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_len_ignores_ansi_escapes() {
        assert_eq!(visible_len("\x1b[31mERROR\x1b[0m"), 5);
        assert_eq!(visible_len("plain"), 5);
    }

    #[test]
    fn pad_visible_pads_by_visible_length() {
        let padded = pad_visible("\x1b[31mWARN\x1b[0m", 8);
        assert_eq!(visible_len(&padded), 8);
    }
}
