// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use serde::Serialize;
use std::time::Instant;

use crate::pipeline::RunReport;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
#[derive(Debug, Clone)]
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => {
                // Print only the essential result
                println!("{message}");
            }
            OutputMode::Json => self.emit_stdout("success", message),
        }
    }

    /// Print a non-fatal warning (suppressed in quiet mode).
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("Warning: {message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit_stderr("warning", message),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => self.emit_stderr("error", message),
        }
    }

    /// Print the final run report: the full summary, one line, or one JSON object.
    pub fn report(&self, report: &RunReport) {
        match self.mode {
            OutputMode::Normal => print!("{report}"),
            OutputMode::Quiet => {
                let verdict = if report.is_success() { "succeeded" } else { "failed" };
                match report.first_error {
                    Some(ref err) if !report.is_success() => {
                        println!("run {} {verdict}: {err}", report.trigger.run_id)
                    }
                    _ => println!("run {} {verdict}", report.trigger.run_id),
                }
            }
            OutputMode::Json => {
                let event = JsonReport {
                    event: "report",
                    success: report.is_success(),
                    exit_code: report.exit_code(),
                    report,
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    println!("{json}");
                }
            }
        }
    }

    fn emit_stdout(&self, event: &str, message: &str) {
        if let Some(json) = self.json_event(event, message) {
            println!("{json}");
        }
    }

    fn emit_stderr(&self, event: &str, message: &str) {
        if let Some(json) = self.json_event(event, message) {
            eprintln!("{json}");
        }
    }

    fn json_event(&self, event: &str, message: &str) -> Option<String> {
        let event = JsonEvent {
            event,
            message,
            duration_secs: self.duration(),
        };
        serde_json::to_string(&event).ok()
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    event: &'a str,
    success: bool,
    exit_code: i32,
    report: &'a RunReport,
}
