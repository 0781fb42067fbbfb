//! Process-wide diagnostic rendering configuration.
//!
//! # Lifecycle
//! The toggles live in one static [`DiagnosticConfig`] and are read only when
//! a container is rendered to text: every render call takes a
//! [`RenderSettings`] snapshot at its start and uses that snapshot for the
//! whole traversal. Nothing here influences parse, build or sizeof.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Default number of bytes shown before a byte string is truncated.
pub const DEFAULT_BYTES_CAP: usize = 16;
/// Default number of characters shown before a text string is truncated.
pub const DEFAULT_STR_CAP:   usize = 32;

// ── RenderSettings ───────────────────────────────────────────────────────────

/// Snapshot of the rendering toggles used for one render traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Render byte and text strings in full instead of truncating them.
    pub full_strings:    bool,
    /// Show false-valued entries of containers produced by `FlagsEnum`.
    pub false_flags:     bool,
    /// Show `_`-prefixed entries in expanded renders.
    pub private_entries: bool,
    pub bytes_cap:       usize,
    pub str_cap:         usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            full_strings:    false,
            false_flags:     false,
            private_entries: false,
            bytes_cap:       DEFAULT_BYTES_CAP,
            str_cap:         DEFAULT_STR_CAP,
        }
    }
}

impl RenderSettings {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

// ── DiagnosticConfig ─────────────────────────────────────────────────────────

pub struct DiagnosticConfig {
    full_strings:    AtomicBool,
    false_flags:     AtomicBool,
    private_entries: AtomicBool,
    bytes_cap:       AtomicUsize,
    str_cap:         AtomicUsize,
}

static GLOBAL: DiagnosticConfig = DiagnosticConfig::new();

/// The process-wide configuration object.
pub fn global() -> &'static DiagnosticConfig {
    &GLOBAL
}

impl DiagnosticConfig {
    const fn new() -> Self {
        Self {
            full_strings:    AtomicBool::new(false),
            false_flags:     AtomicBool::new(false),
            private_entries: AtomicBool::new(false),
            bytes_cap:       AtomicUsize::new(DEFAULT_BYTES_CAP),
            str_cap:         AtomicUsize::new(DEFAULT_STR_CAP),
        }
    }

    pub fn set_print_full_strings(&self, enabled: bool) {
        self.full_strings.store(enabled, Ordering::Relaxed);
    }

    pub fn set_print_false_flags(&self, enabled: bool) {
        self.false_flags.store(enabled, Ordering::Relaxed);
    }

    pub fn set_print_private_entries(&self, enabled: bool) {
        self.private_entries.store(enabled, Ordering::Relaxed);
    }

    pub fn set_caps(&self, bytes_cap: usize, str_cap: usize) {
        self.bytes_cap.store(bytes_cap, Ordering::Relaxed);
        self.str_cap.store(str_cap, Ordering::Relaxed);
    }

    /// Replace every toggle at once.
    pub fn apply(&self, settings: &RenderSettings) {
        self.set_print_full_strings(settings.full_strings);
        self.set_print_false_flags(settings.false_flags);
        self.set_print_private_entries(settings.private_entries);
        self.set_caps(settings.bytes_cap, settings.str_cap);
    }

    /// Restore the defaults.
    pub fn reset(&self) {
        self.apply(&RenderSettings::default());
    }

    pub fn settings(&self) -> RenderSettings {
        RenderSettings {
            full_strings:    self.full_strings.load(Ordering::Relaxed),
            false_flags:     self.false_flags.load(Ordering::Relaxed),
            private_entries: self.private_entries.load(Ordering::Relaxed),
            bytes_cap:       self.bytes_cap.load(Ordering::Relaxed),
            str_cap:         self.str_cap.load(Ordering::Relaxed),
        }
    }
}
