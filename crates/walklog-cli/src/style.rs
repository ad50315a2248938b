//! Visual styling utilities for the CLI.
//!
//! Spinners, progress bars, status prefixes and size formatting shared by
//! every command.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

/// Braille dots animation.
const SPINNER_TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

const SPINNER_TICK_MS: u64 = 80;

const PROGRESS_CHARS: &str = "###";

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(SPINNER_TICK_CHARS)
}

fn progress_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(PROGRESS_CHARS)
}

/// Spinner for operations without a known length. Hidden when `quiet`.
pub fn operation_spinner(message: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    pb
}

/// Progress bar for photo transfers. Hidden when `quiet`.
pub fn transfer_progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    pb.set_style(progress_bar_style());
    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    pb
}

/// Print to stderr without tearing an active spinner.
pub fn print_suspended(spinner: &ProgressBar, message: &str) {
    spinner.suspend(|| eprintln!("{}", message));
}

/// Human-readable data size.
///
/// Above 10 MB the size is shown in MB, otherwise in KB, rounded to four
/// significant digits.
pub fn format_data_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;

    let bytes = bytes as f64;
    if bytes > 10.0 * MB {
        format!("{} MB", significant(bytes / MB, 4))
    } else {
        format!("{} KB", significant(bytes / KB, 4))
    }
}

fn significant(value: f64, digits: i32) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs().log10().floor() as i32 + 1;
    let decimals = (digits - magnitude).max(0) as usize;
    let formatted = format!("{:.*}", decimals, value);
    if formatted.contains('.') {
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        formatted
    }
}

/// Format a success message.
pub fn format_success(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[OK] {}", message)
    } else {
        format!("{} {}", "[OK]".green(), message)
    }
}

/// Format an info message.
pub fn format_info(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[--] {}", message)
    } else {
        format!("{} {}", "[--]".cyan(), message)
    }
}

/// Format a warning message.
pub fn format_warning(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[!!] {}", message)
    } else {
        format!("{} {}", "[!!]".yellow(), message)
    }
}

pub fn format_title(title: &str, no_color: bool) -> String {
    if no_color {
        title.to_string()
    } else {
        title.bold().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_data_size_kb() {
        assert_eq!(format_data_size(0), "0 KB");
        assert_eq!(format_data_size(512), "0.5 KB");
        assert_eq!(format_data_size(1536), "1.5 KB");
        assert_eq!(format_data_size(1000), "0.9766 KB");
    }

    #[test]
    fn test_format_data_size_switches_above_10_mb() {
        assert_eq!(format_data_size(10 * 1024 * 1024), "10240 KB");
        assert_eq!(format_data_size(10 * 1024 * 1024 + 1), "10 MB");
        assert_eq!(format_data_size(25 * 1024 * 1024 + 512 * 1024), "25.5 MB");
    }

    #[test]
    fn test_significant_rounds() {
        assert_eq!(significant(123.456, 4), "123.5");
        assert_eq!(significant(12345.6, 4), "12346");
        assert_eq!(significant(0.0625, 4), "0.0625");
    }

    #[test]
    fn test_status_prefixes_without_color() {
        assert_eq!(format_success("done", true), "[OK] done");
        assert_eq!(format_info("note", true), "[--] note");
        assert_eq!(format_warning("careful", true), "[!!] careful");
    }

    #[test]
    fn test_status_prefixes_with_color_keep_message() {
        let s = format_success("done", false);
        assert!(s.contains("[OK]"));
        assert!(s.ends_with("done"));
    }
}
