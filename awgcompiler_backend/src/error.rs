//! Error type shared by the compiler and the device-control crates.
//!
//! Compilation never writes partial output: every variant below is raised
//! before the first byte of a waveform or sequence file leaves the renderer,
//! except [`SeqError::Io`] which wraps transport failures from the device
//! adapter unmodified.

use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::PyErr;
use thiserror::Error;

/// Errors raised while building, resolving or serializing a pulse sequence.
#[derive(Debug, Error)]
pub enum SeqError {
    // ---- reference resolution ----
    #[error("element '{element}': pulse '{pulse}' references unknown pulse '{reference}'")]
    UnresolvedReference {
        element: String,
        pulse: String,
        reference: String,
    },
    #[error("element '{element}': pulse name '{name}' already in use")]
    DuplicatePulse { element: String, name: String },
    #[error("element '{element}': cyclic reference chain involving pulse '{pulse}'")]
    CyclicReference { element: String, pulse: String },
    #[error("element '{element}': pulse '{pulse}' resolves to start time {t0:.3e} s before the element origin")]
    NegativeStart {
        element: String,
        pulse: String,
        t0: f64,
    },

    // ---- sampling ----
    #[error("{shape} produced {produced} samples but the window holds {expected} (time-resolution mismatch)")]
    TimeResolution {
        shape: &'static str,
        produced: usize,
        expected: usize,
    },
    #[error("{context}: got {got} samples, expected {expected}")]
    LengthMismatch {
        context: String,
        got: usize,
        expected: usize,
    },
    #[error("marker channel '{channel}' holds non-binary sample {value} at index {index}")]
    MarkerValue {
        channel: String,
        index: usize,
        value: f64,
    },

    // ---- channel configuration ----
    #[error("unknown channel '{name}'")]
    UnknownChannel { name: String },
    #[error("channel name '{name}' already defined")]
    DuplicateChannel { name: String },
    #[error("channel '{name}': voltage window high={high} must exceed low={low}")]
    ChannelRange { name: String, high: f64, low: f64 },
    #[error("channel id '{id}' does not match the expected format '{expected}'")]
    BadChannelId { id: String, expected: String },
    #[error("expected channel kind 'analog' or 'marker', got '{value}'")]
    BadChannelKind { value: String },

    // ---- pulse construction ----
    #[error("pulse shape {shape} has no '{field}' parameter to override")]
    InvalidOverride {
        shape: &'static str,
        field: &'static str,
    },
    #[error("expected reference point 'start' or 'end', got '{value}'")]
    BadRefPoint { value: String },

    // ---- hardware limits ----
    #[error("step '{step}' (element '{element}'): repetition count {repetitions} outside the valid range 1 to 65536")]
    RepetitionRange {
        step: String,
        element: String,
        repetitions: u32,
    },
    #[error("sequence '{sequence}' holds {count} steps, more than the 8000 the hardware accepts")]
    TooManySteps { sequence: String, count: usize },
    #[error("sequence '{sequence}' carries a dynamic jump table but the device does not support table jump")]
    DynamicJumpUnsupported { sequence: String },
    #[error("sequence '{sequence}': enable dynamic jump before adding jump addresses")]
    DynamicJumpDisabled { sequence: String },
    #[error("dynamic jump pattern {pattern} outside the 4-bit address range 0..16")]
    BadPattern { pattern: u8 },

    // ---- sequence table ----
    #[error("sequence '{sequence}': step name '{name}' already in use")]
    DuplicateStep { sequence: String, name: String },
    #[error("sequence '{sequence}': no step named '{name}'")]
    UnknownStep { sequence: String, name: String },
    #[error("sequence '{sequence}': step references element '{element}' but no such element was provided")]
    UnknownElement { sequence: String, element: String },

    // ---- codec ----
    #[error("malformed waveform file: {reason}")]
    MalformedFile { reason: String },

    // ---- device boundary ----
    #[error("device not ready after {seconds:.1} s")]
    ReadyTimeout { seconds: f64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<SeqError> for PyErr {
    fn from(err: SeqError) -> Self {
        match err {
            SeqError::Io(e) => PyIOError::new_err(e.to_string()),
            other => PyValueError::new_err(other.to_string()),
        }
    }
}
