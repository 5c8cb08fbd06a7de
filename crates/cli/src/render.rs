// crates/cli/src/render.rs
//! Plain-text rendering of job views and profiles.

use std::fmt::Write;

use indicatif::{ProgressBar, ProgressStyle};
use stemsmith_types::{HealthStatus, JobView, ModelProfile};

/// Multi-line summary of one job.
pub fn describe(view: &JobView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Job {}", view.id);
    let _ = writeln!(out, "  state:    {}", view.state.label());
    let _ = writeln!(out, "  progress: {}", view.progress_label());
    if let Some(dir) = view.snapshot.as_ref().and_then(|s| s.output_location.as_deref()) {
        let _ = writeln!(out, "  output:   {dir}");
    }
    if let Some(err) = view.status_error() {
        let _ = writeln!(out, "  error:    {err}");
    }
    if let Some(err) = &view.last_error {
        let _ = writeln!(out, "  warning:  {err}");
    }
    out
}

/// One line per profile: key, label and stems.
pub fn profiles() -> String {
    let mut out = String::new();
    for profile in ModelProfile::ALL {
        let default = if profile == ModelProfile::default() { " (default)" } else { "" };
        let _ = writeln!(
            out,
            "{:<20} {}{}\n{:<20} stems: {}",
            profile.key(),
            profile.label(),
            default,
            "",
            profile.stems().join(", ")
        );
    }
    out
}

pub fn health_line(endpoint: &str, status: HealthStatus) -> String {
    let mark = match status {
        HealthStatus::Ok => "reachable",
        HealthStatus::Fail => "unreachable",
        HealthStatus::Unknown => "checking",
    };
    format!("{endpoint}: {mark}")
}

/// Progress bar for watching one job.
pub fn job_bar(job_id: &str) -> ProgressBar {
    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("  {spinner} {prefix} [{bar:30}] {msg}")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_prefix(job_id.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    bar
}

/// Push a view into the bar.
pub fn update_bar(bar: &ProgressBar, view: &JobView) {
    if let Some(p) = view.state.progress() {
        bar.set_position((p * 100.0).round() as u64);
    }
    let mut msg = format!("{} {}", view.state.label(), view.progress_label());
    if let Some(err) = &view.last_error {
        msg.push_str(&format!(" ({err})"));
    }
    bar.set_message(msg);
}
