//! Single-shot synchronisation pulse scheduled relative to Go.

use tracing::info;

/// A pulse that has just fired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseEvent {
    pub offset_ms: f32,
    pub planned_s: f64,
    pub fired_s: f64,
}

/// Receives fired pulses: a TTL line, a marker stream, or just the log.
pub trait PulseSink {
    fn emit(&mut self, event: &PulseEvent);
}

/// Sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPulseSink;

impl PulseSink for LogPulseSink {
    fn emit(&mut self, event: &PulseEvent) {
        info!(
            offset_ms = event.offset_ms,
            planned_s = event.planned_s,
            fired_s = event.fired_s,
            "sync pulse fired"
        );
    }
}

/// Pulse state for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PulseStatus {
    Disabled,
    Pending { offset_ms: f32 },
    Fired { from_go_ms: Option<f64> },
    Waiting,
}

impl std::fmt::Display for PulseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "TTL: disabled"),
            Self::Pending { offset_ms } => write!(f, "TTL: pending (offset {offset_ms} ms)"),
            Self::Fired {
                from_go_ms: Some(ms),
            } => write!(f, "TTL: fired ({ms:.1} ms from Go)"),
            Self::Fired { from_go_ms: None } => write!(f, "TTL: fired (before Go)"),
            Self::Waiting => write!(f, "TTL: waiting"),
        }
    }
}

/// Fires at most once per arming, never before the planned time and late
/// rather than never when a tick is delayed.
#[derive(Debug, Clone)]
pub struct PulseScheduler {
    offset_ms: f32,
    enabled: bool,
    pending: bool,
    fired: bool,
    planned_s: f64,
    fired_s: Option<f64>,
    lamp_on_s: f64,
    lamp_remaining_s: f64,
}

impl PulseScheduler {
    pub fn new(lamp_on_s: f64) -> Self {
        Self {
            offset_ms: 0.0,
            enabled: false,
            pending: false,
            fired: false,
            planned_s: 0.0,
            fired_s: None,
            lamp_on_s,
            lamp_remaining_s: 0.0,
        }
    }

    /// Resets for a new trial.
    pub fn configure(&mut self, offset_ms: f32) {
        self.offset_ms = offset_ms;
        self.enabled = offset_ms.is_finite();
        self.pending = false;
        self.fired = false;
        self.planned_s = 0.0;
        self.fired_s = None;
    }

    fn planned_from(&self, reference_s: f64) -> f64 {
        reference_s + f64::from(self.offset_ms) / 1000.0
    }

    /// Schedules a fresh pulse relative to `reference_s`, forgetting any
    /// earlier firing.
    pub fn arm(&mut self, reference_s: f64) {
        if !self.enabled {
            return;
        }
        self.planned_s = self.planned_from(reference_s);
        self.pending = true;
        self.fired = false;
        self.fired_s = None;
    }

    /// Moves a not-yet-fired pulse to `reference_s + offset`. Returns false
    /// when the pulse already fired and is left alone.
    pub fn retarget(&mut self, reference_s: f64) -> bool {
        if !self.enabled || self.fired {
            return false;
        }
        self.planned_s = self.planned_from(reference_s);
        self.pending = true;
        true
    }

    pub fn cancel(&mut self) {
        self.pending = false;
    }

    pub fn poll(&mut self, now_s: f64) -> Option<PulseEvent> {
        if !self.enabled || !self.pending || self.fired || now_s < self.planned_s {
            return None;
        }
        self.fired = true;
        self.pending = false;
        self.fired_s = Some(now_s);
        self.lamp_remaining_s = self.lamp_on_s;
        Some(PulseEvent {
            offset_ms: self.offset_ms,
            planned_s: self.planned_s,
            fired_s: now_s,
        })
    }

    /// Counts the indicator lamp down.
    pub fn update_lamp(&mut self, dt_s: f64) {
        if self.lamp_remaining_s > 0.0 {
            self.lamp_remaining_s = (self.lamp_remaining_s - dt_s).max(0.0);
        }
    }

    pub fn lamp_on(&self) -> bool {
        self.lamp_remaining_s > 0.0
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_fired(&self) -> bool {
        self.fired
    }

    pub fn offset_ms(&self) -> f32 {
        self.offset_ms
    }

    pub fn planned_s(&self) -> Option<f64> {
        (self.pending || self.fired).then_some(self.planned_s)
    }

    pub fn fired_s(&self) -> Option<f64> {
        self.fired_s
    }

    pub fn status(&self, go_s: Option<f64>) -> PulseStatus {
        if !self.enabled {
            PulseStatus::Disabled
        } else if self.fired {
            PulseStatus::Fired {
                from_go_ms: go_s
                    .zip(self.fired_s)
                    .map(|(go, fired)| (fired - go) * 1000.0),
            }
        } else if self.pending {
            PulseStatus::Pending {
                offset_ms: self.offset_ms,
            }
        } else {
            PulseStatus::Waiting
        }
    }
}
