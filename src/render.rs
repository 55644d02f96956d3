//! Terminal renderer for CLI messages.
//!
//! Implements [`GlobalHandlers`] so the executor's loading and message events
//! surface on stderr, colored by severity unless color is disabled.

use crossterm::style::{Color, Stylize};
use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::RequestFailure;
use crate::request::{GlobalHandlers, Severity};

const LABEL_SUCCESS: &str = "ok:";
const LABEL_INFO: &str = "info:";
const LABEL_WARNING: &str = "warning:";
const LABEL_ERROR: &str = "error:";
const LOADING_TEXT: &str = "requesting…";
const CLEAR_LINE: &str = "\r\x1b[2K";

const COLOR_SUCCESS: Color = Color::Green;
const COLOR_INFO: Color = Color::Cyan;
const COLOR_WARNING: Color = Color::Yellow;
const COLOR_ERROR: Color = Color::Red;
const COLOR_DETAIL: Color = Color::DarkGrey;

/// Stderr renderer used by the `courier` binary.
#[derive(Debug)]
pub struct Renderer {
    color: bool,
    loading_visible: AtomicBool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self {
            color,
            loading_visible: AtomicBool::new(false),
        }
    }

    pub fn message(&self, severity: Severity, text: &str) {
        eprintln!("{}", self.format_message(severity, text));
    }

    pub fn error(&self, msg: &str) {
        self.message(Severity::Error, msg);
    }

    /// Dim secondary line under a message.
    pub fn detail(&self, text: &str) {
        if self.color {
            eprintln!("  {}", text.with(COLOR_DETAIL));
        } else {
            eprintln!("  {text}");
        }
    }

    fn format_message(&self, severity: Severity, text: &str) -> String {
        let (label, color) = match severity {
            Severity::Success => (LABEL_SUCCESS, COLOR_SUCCESS),
            Severity::Info => (LABEL_INFO, COLOR_INFO),
            Severity::Warning => (LABEL_WARNING, COLOR_WARNING),
            Severity::Error => (LABEL_ERROR, COLOR_ERROR),
        };
        if self.color {
            format!("{} {text}", label.with(color).bold())
        } else {
            format!("{label} {text}")
        }
    }
}

impl GlobalHandlers for Renderer {
    fn show_loading(&self) {
        // Only draw the transient line on an interactive terminal.
        if !io::stderr().is_terminal() {
            return;
        }
        self.loading_visible.store(true, Ordering::SeqCst);
        let mut stderr = io::stderr();
        let text = if self.color {
            LOADING_TEXT.with(COLOR_DETAIL).to_string()
        } else {
            LOADING_TEXT.to_string()
        };
        let _ = write!(stderr, "{text}");
        let _ = stderr.flush();
    }

    fn hide_loading(&self) {
        if self.loading_visible.swap(false, Ordering::SeqCst) {
            let mut stderr = io::stderr();
            let _ = write!(stderr, "{CLEAR_LINE}");
            let _ = stderr.flush();
        }
    }

    fn show_message(&self, text: &str, severity: Severity) {
        self.message(severity, text);
    }

    fn logout(&self) {
        self.message(
            Severity::Warning,
            "session is no longer authorized; set a fresh token (COURIER_TOKEN or [auth].token)",
        );
    }

    fn resolve_error(&self, failure: &RequestFailure) {
        let context = &failure.context;
        if context.params.is_empty() {
            self.detail(&format!("{} {}", context.method, context.url));
        } else {
            self.detail(&format!(
                "{} {} (params: {})",
                context.method, context.url, context.params
            ));
        }
    }
}
