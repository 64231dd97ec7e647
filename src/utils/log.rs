// src/utils/log.rs

//! Progress and summary formatting on top of the `log` facade.
//!
//! Counters use the `[phase] N/M` shape so runs can be followed with grep.

use std::fmt::Display;

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(60);
    ::log::info!("{}", border);
    ::log::info!("  {}", title);
    ::log::info!("{}", border);
}

/// Log a step in a batch run
pub fn step(step_num: usize, total: usize, message: &str) {
    ::log::info!("[STEP {}/{}] {}", step_num, total, message);
}

/// Log a `[phase] N/M` progress counter
pub fn progress(phase: impl Display, done: usize, total: usize, detail: &str) {
    ::log::info!("{}", format_progress(phase, done, total, detail));
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    ::log::info!("    {}", message);
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    ::log::info!("[SUMMARY] {}", title);
    for (key, value) in items {
        ::log::info!("    {}: {}", key, value);
    }
}

fn format_progress(phase: impl Display, done: usize, total: usize, detail: &str) -> String {
    if detail.is_empty() {
        format!("[{phase}] {done}/{total}")
    } else {
        format!("[{phase}] {done}/{total} {detail}")
    }
}
