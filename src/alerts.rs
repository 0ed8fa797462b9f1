//! Leveled alert stream shared by the schedulers.
//!
//! Events land in a bounded in-memory ring and are forwarded to every
//! registered emitter. Emission is best-effort and must never block the
//! trading path; the default emitter writes one line to stdout.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const HISTORY_CAP: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Trade,
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    fn glyph(&self) -> &'static str {
        match self {
            AlertLevel::Info => "ℹ️ ",
            AlertLevel::Trade => "💰",
            AlertLevel::Warning => "⚠️ ",
            AlertLevel::Error => "❌",
            AlertLevel::Critical => "🚨",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
}

/// Something that delivers alerts somewhere (stdout, webhook, ...).
pub trait AlertEmitter: Send + Sync {
    fn emit(&self, alert: &Alert);
}

/// Default emitter: one stdout line per alert with a level glyph.
pub struct StdoutEmitter;

impl AlertEmitter for StdoutEmitter {
    fn emit(&self, alert: &Alert) {
        println!(
            "{} [{}] {}: {}",
            alert.level.glyph(),
            alert.timestamp.format("%H:%M:%S"),
            alert.title,
            alert.message
        );
    }
}

pub struct AlertSink {
    history: Mutex<VecDeque<Alert>>,
    emitters: Vec<Box<dyn AlertEmitter>>,
}

impl Default for AlertSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertSink {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAP)),
            emitters: vec![Box::new(StdoutEmitter)],
        }
    }

    /// Sink with no emitters (tests, or callers wiring their own).
    pub fn silent() -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAP)),
            emitters: Vec::new(),
        }
    }

    pub fn add_emitter(&mut self, emitter: Box<dyn AlertEmitter>) {
        self.emitters.push(emitter);
    }

    pub fn send(&self, level: AlertLevel, title: &str, message: &str) {
        let alert = Alert {
            timestamp: Utc::now(),
            level,
            title: title.to_string(),
            message: message.to_string(),
        };

        {
            let mut history = self.history.lock().expect("alert history poisoned");
            if history.len() >= HISTORY_CAP {
                history.pop_front();
            }
            history.push_back(alert.clone());
        }

        for emitter in &self.emitters {
            emitter.emit(&alert);
        }
    }

    pub fn info(&self, title: &str, message: &str) {
        self.send(AlertLevel::Info, title, message);
    }

    pub fn trade(&self, title: &str, message: &str) {
        self.send(AlertLevel::Trade, title, message);
    }

    pub fn warning(&self, title: &str, message: &str) {
        self.send(AlertLevel::Warning, title, message);
    }

    pub fn error(&self, title: &str, message: &str) {
        self.send(AlertLevel::Error, title, message);
    }

    pub fn critical(&self, title: &str, message: &str) {
        self.send(AlertLevel::Critical, title, message);
    }

    /// Copy of the retained history, oldest first.
    pub fn history(&self) -> Vec<Alert> {
        self.history
            .lock()
            .expect("alert history poisoned")
            .iter()
            .cloned()
            .collect()
    }
}
