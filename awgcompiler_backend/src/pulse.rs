//! Provides definitions and implementations for the pulse variant library.
//!
//! ## Main Structures and Enumerations:
//!
//! - [`PulseShape`]: a tagged union with one variant per supported pulse shape
//!   (`Square`, `Cosine`, `Linear`, `ClockTrain`, `MarkerTrain`, `IqModulated`,
//!   `SsbDrag`). Each variant wraps its own parameter struct with public
//!   fields, so overrides are explicit field assignments rather than dynamic
//!   attribute merging.
//!
//! - [`Pulse`]: the user-facing template type wrapping a [`PulseShape`].
//!   Templates are created once with the convenience constructors
//!   ([`Pulse::square`], [`Pulse::ssb_drag`], ...), never mutated, and copied
//!   into elements with [`Pulse::cp`] plus `with_*` overrides.
//!
//! ## Sampling contract
//!
//! Given the local time vector of its window (`t = 0` at the resolved start of
//! the placed pulse) and the sample clock, a shape fills one sample array per
//! bound channel. Shapes bound to an I/Q channel pair (`IqModulated`,
//! `SsbDrag`) run both envelopes through the single-sideband modulation and
//! mixer-predistortion transform in [`apply_modulation`].
//!
//! Train shapes define their unit cells in integer sample counts; sampling
//! them at a clock whose window disagrees with the produced cell count is a
//! fatal time-resolution error rather than a silently stretched waveform.
//!
//! # Examples
//!
//! Copying a template and overriding a field leaves the template untouched:
//!
//! ```
//! use awgcompiler_backend::pulse::Pulse;
//!
//! let template = Pulse::square("MW_gate", 0.1, 0.5e-6);
//! let stronger = template.cp().with_amplitude(1.0).unwrap();
//! assert_eq!(template.length(), 0.5e-6);
//! assert_ne!(template, stronger);
//! ```

use std::f64::consts::PI;

use ndarray::{Array1, ArrayView1};
use pyo3::prelude::*;

use crate::error::SeqError;

/// Unit-cell sample period of the train shapes, 1 ns.
///
/// The AWG's full sample rate is 1 GS/s; clock and marker trains specify
/// their cells in whole samples on that grid.
pub const TRAIN_SAMPLE_PERIOD: f64 = 1e-9;

/// Constant amplitude over `length`, zero outside the active window.
#[derive(Clone, Debug, PartialEq)]
pub struct SquarePulse {
    pub channel: String,
    pub amplitude: f64,
    pub length: f64,
}

/// `amplitude * cos(2π(frequency·t + phase/360))`, phase in degrees.
#[derive(Clone, Debug, PartialEq)]
pub struct CosinePulse {
    pub channel: String,
    pub frequency: f64,
    pub amplitude: f64,
    pub length: f64,
    pub phase: f64,
}

/// Linear interpolation between two setpoints across `length`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearPulse {
    pub channel: String,
    pub start_value: f64,
    pub end_value: f64,
    pub length: f64,
}

/// Periodic cell of `up_samples` at `amplitude` followed by `down_samples`
/// at zero, repeated `cycles` times on the 1 ns train grid.
#[derive(Clone, Debug, PartialEq)]
pub struct ClockTrain {
    pub channel: String,
    pub amplitude: f64,
    pub cycles: usize,
    pub up_samples: usize,
    pub down_samples: usize,
}

/// `markers` unit-high windows of `marker_length` spaced `marker_separation`
/// apart; cell sample counts are rounded at the actual sample clock.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerTrain {
    pub channel: String,
    pub markers: usize,
    pub marker_length: f64,
    pub marker_separation: f64,
}

/// Flat envelope on the I channel, zero on Q, then IQ modulation.
#[derive(Clone, Debug, PartialEq)]
pub struct IqModPulse {
    pub i_channel: String,
    pub q_channel: String,
    pub amplitude: f64,
    pub length: f64,
    pub mod_frequency: f64,
    pub phase: f64,
    pub alpha: f64,
    pub phi_skew: f64,
}

/// Gaussian envelope on I, `motzoi`-weighted Gaussian derivative on Q,
/// offset-subtracted and single-sideband modulated.
///
/// Reduces to a plain Gaussian pulse for `motzoi = 0` and to an unmodulated
/// envelope pair for `mod_frequency = 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct SsbDragPulse {
    pub i_channel: String,
    pub q_channel: String,
    pub amplitude: f64,
    pub sigma: f64,
    pub nr_sigma: f64,
    pub motzoi: f64,
    pub mod_frequency: f64,
    pub phase: f64,
    pub alpha: f64,
    pub phi_skew: f64,
}

/// Enum type for the supported pulse shapes.
#[derive(Clone, Debug, PartialEq)]
pub enum PulseShape {
    Square(SquarePulse),
    Cosine(CosinePulse),
    Linear(LinearPulse),
    ClockTrain(ClockTrain),
    MarkerTrain(MarkerTrain),
    IqModulated(IqModPulse),
    SsbDrag(SsbDragPulse),
}

impl PulseShape {
    /// Shape name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            PulseShape::Square(_) => "Square",
            PulseShape::Cosine(_) => "Cosine",
            PulseShape::Linear(_) => "Linear",
            PulseShape::ClockTrain(_) => "ClockTrain",
            PulseShape::MarkerTrain(_) => "MarkerTrain",
            PulseShape::IqModulated(_) => "IqModulated",
            PulseShape::SsbDrag(_) => "SsbDrag",
        }
    }

    /// Logical channel names this shape writes to (one, or an I/Q pair).
    pub fn channels(&self) -> Vec<&str> {
        match self {
            PulseShape::Square(p) => vec![&p.channel],
            PulseShape::Cosine(p) => vec![&p.channel],
            PulseShape::Linear(p) => vec![&p.channel],
            PulseShape::ClockTrain(p) => vec![&p.channel],
            PulseShape::MarkerTrain(p) => vec![&p.channel],
            PulseShape::IqModulated(p) => vec![&p.i_channel, &p.q_channel],
            PulseShape::SsbDrag(p) => vec![&p.i_channel, &p.q_channel],
        }
    }

    /// Pulse duration in seconds.
    ///
    /// Train durations derive from their cell counts, the DRAG duration from
    /// `sigma * nr_sigma`; the other shapes carry an explicit `length`.
    pub fn length(&self) -> f64 {
        match self {
            PulseShape::Square(p) => p.length,
            PulseShape::Cosine(p) => p.length,
            PulseShape::Linear(p) => p.length,
            PulseShape::ClockTrain(p) => {
                (p.cycles * (p.up_samples + p.down_samples)) as f64 * TRAIN_SAMPLE_PERIOD
            }
            PulseShape::MarkerTrain(p) => p.markers as f64 * p.marker_separation,
            PulseShape::IqModulated(p) => p.length,
            PulseShape::SsbDrag(p) => p.sigma * p.nr_sigma,
        }
    }

    /// Evaluates the shape on one of its bound channels over the local time
    /// window `tvals` (seconds, starting at 0) sampled at `clock` Hz.
    ///
    /// # Panics
    ///
    /// Panics if `channel` is not among [`PulseShape::channels`]; callers
    /// iterate over the bound channels, so a mismatch is a library bug.
    pub fn sample_channel(
        &self,
        channel: &str,
        tvals: ArrayView1<f64>,
        clock: f64,
    ) -> Result<Array1<f64>, SeqError> {
        let n = tvals.len();
        match self {
            PulseShape::Square(p) => Ok(Array1::from_elem(n, p.amplitude)),
            PulseShape::Cosine(p) => {
                Ok(tvals.mapv(|t| p.amplitude * (2.0 * PI * (p.frequency * t + p.phase / 360.0)).cos()))
            }
            PulseShape::Linear(p) => Ok(Array1::linspace(p.start_value, p.end_value, n)),
            PulseShape::ClockTrain(p) => {
                let produced = p.cycles * (p.up_samples + p.down_samples);
                if produced != n {
                    return Err(SeqError::TimeResolution {
                        shape: self.name(),
                        produced,
                        expected: n,
                    });
                }
                let mut wf = Array1::zeros(n);
                for cycle in 0..p.cycles {
                    let base = cycle * (p.up_samples + p.down_samples);
                    for i in 0..p.up_samples {
                        wf[base + i] = p.amplitude;
                    }
                }
                Ok(wf)
            }
            PulseShape::MarkerTrain(p) => {
                let up = (p.marker_length * clock).round() as usize;
                let down = ((p.marker_separation - p.marker_length) * clock).round() as usize;
                let produced = p.markers * (up + down);
                if produced != n {
                    return Err(SeqError::TimeResolution {
                        shape: self.name(),
                        produced,
                        expected: n,
                    });
                }
                let mut wf = Array1::zeros(n);
                for marker in 0..p.markers {
                    let base = marker * (up + down);
                    for i in 0..up {
                        wf[base + i] = 1.0;
                    }
                }
                Ok(wf)
            }
            PulseShape::IqModulated(p) => {
                let i_env = Array1::from_elem(n, p.amplitude);
                let q_env = Array1::zeros(n);
                let (i_mod, q_mod) = apply_modulation(
                    &i_env,
                    &q_env,
                    tvals,
                    p.mod_frequency,
                    p.phase,
                    p.phi_skew,
                    p.alpha,
                );
                if channel == p.i_channel {
                    Ok(i_mod)
                } else if channel == p.q_channel {
                    Ok(q_mod)
                } else {
                    panic!("IqModulated pulse is not bound to channel {}", channel)
                }
            }
            PulseShape::SsbDrag(p) => {
                if n == 0 {
                    return Ok(Array1::zeros(0));
                }
                let mu = self.length() / 2.0;
                let mut gauss =
                    tvals.mapv(|t| p.amplitude * (-0.5 * (t - mu).powi(2) / p.sigma.powi(2)).exp());
                let mut deriv = Array1::zeros(n);
                for i in 0..n {
                    deriv[i] = p.motzoi * -(tvals[i] - mu) / p.sigma * gauss[i];
                }
                // Remove the DC pedestal so the pulse starts and ends at zero
                let gauss_ped = (gauss[0] + gauss[n - 1]) / 2.0;
                let deriv_ped = (deriv[0] + deriv[n - 1]) / 2.0;
                gauss -= gauss_ped;
                deriv -= deriv_ped;
                let (i_mod, q_mod) = apply_modulation(
                    &gauss,
                    &deriv,
                    tvals,
                    p.mod_frequency,
                    p.phase,
                    p.phi_skew,
                    p.alpha,
                );
                if channel == p.i_channel {
                    Ok(i_mod)
                } else if channel == p.q_channel {
                    Ok(q_mod)
                } else {
                    panic!("SsbDrag pulse is not bound to channel {}", channel)
                }
            }
        }
    }
}

/// Applies single-sideband modulation plus mixer predistortion to an I/Q
/// envelope pair over the time window `tvals`.
///
/// With `x = 2π(mod_frequency·t + phase/360)`, `phase` and `phi_skew` in
/// degrees and `alpha` the I/Q amplitude-ratio correction:
///
/// ```text
/// [I_mod] = [1        tan(phi_skew)] [ cos(x)  sin(x)] [I_env]
/// [Q_mod]   [0  sec(phi_skew)/alpha] [-sin(x)  cos(x)] [Q_env]
/// ```
///
/// The predistortion and modulation matrices are folded into a single step.
pub fn apply_modulation(
    i_env: &Array1<f64>,
    q_env: &Array1<f64>,
    tvals: ArrayView1<f64>,
    mod_frequency: f64,
    phase: f64,
    phi_skew: f64,
    alpha: f64,
) -> (Array1<f64>, Array1<f64>) {
    let n = tvals.len();
    assert!(
        i_env.len() == n && q_env.len() == n,
        "envelope arrays must match the time window ({} samples)",
        n
    );
    let tan_skew = (2.0 * PI * phi_skew / 360.0).tan();
    let sec_alpha = 1.0 / ((2.0 * PI * phi_skew / 360.0).cos() * alpha);

    let mut i_mod = Array1::zeros(n);
    let mut q_mod = Array1::zeros(n);
    for i in 0..n {
        let x = 2.0 * PI * (mod_frequency * tvals[i] + phase / 360.0);
        i_mod[i] = i_env[i] * (x.cos() - tan_skew * x.sin()) + q_env[i] * (x.sin() + tan_skew * x.cos());
        q_mod[i] = -i_env[i] * sec_alpha * x.sin() + q_env[i] * sec_alpha * x.cos();
    }
    (i_mod, q_mod)
}

/// A pulse template: a [`PulseShape`] with concrete parameters, bound to one
/// or two logical channels.
///
/// Templates are immutable by convention. Place one into an element with
/// [`crate::element::Element::add`], or derive a configured copy first with
/// [`Pulse::cp`] and the `with_*` overrides. Overriding a parameter the shape
/// does not carry is an [`SeqError::InvalidOverride`] error, never a silent
/// no-op.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct Pulse {
    shape: PulseShape,
}

impl Pulse {
    /// Borrows the underlying shape.
    pub fn shape(&self) -> &PulseShape {
        &self.shape
    }

    /// Wraps a shape into a template.
    pub fn from_shape(shape: PulseShape) -> Self {
        Self { shape }
    }
}

#[pymethods]
impl Pulse {
    /// Constant-amplitude pulse on a single channel.
    #[staticmethod]
    #[pyo3(signature = (channel, amplitude=0.0, length=0.0))]
    pub fn square(channel: &str, amplitude: f64, length: f64) -> Pulse {
        Pulse::from_shape(PulseShape::Square(SquarePulse {
            channel: channel.to_string(),
            amplitude,
            length,
        }))
    }

    /// Cosine pulse; `phase` in degrees.
    #[staticmethod]
    #[pyo3(signature = (channel, frequency=1e6, amplitude=0.0, length=0.0, phase=0.0))]
    pub fn cosine(channel: &str, frequency: f64, amplitude: f64, length: f64, phase: f64) -> Pulse {
        Pulse::from_shape(PulseShape::Cosine(CosinePulse {
            channel: channel.to_string(),
            frequency,
            amplitude,
            length,
            phase,
        }))
    }

    /// Linear interpolation between two setpoints.
    #[staticmethod]
    #[pyo3(signature = (channel, start_value=0.0, end_value=0.0, length=0.0))]
    pub fn linear(channel: &str, start_value: f64, end_value: f64, length: f64) -> Pulse {
        Pulse::from_shape(PulseShape::Linear(LinearPulse {
            channel: channel.to_string(),
            start_value,
            end_value,
            length,
        }))
    }

    /// Periodic clock train of `cycles` cells, `up_samples` high and
    /// `down_samples` low per cell on the 1 ns train grid.
    #[staticmethod]
    #[pyo3(signature = (channel, amplitude=0.1, cycles=100, up_samples=2, down_samples=2))]
    pub fn clock_train(
        channel: &str,
        amplitude: f64,
        cycles: usize,
        up_samples: usize,
        down_samples: usize,
    ) -> Pulse {
        Pulse::from_shape(PulseShape::ClockTrain(ClockTrain {
            channel: channel.to_string(),
            amplitude,
            cycles,
            up_samples,
            down_samples,
        }))
    }

    /// Periodic train of unit-high marker windows.
    #[staticmethod]
    #[pyo3(signature = (channel, markers=100, marker_length=15e-9, marker_separation=100e-9))]
    pub fn marker_train(
        channel: &str,
        markers: usize,
        marker_length: f64,
        marker_separation: f64,
    ) -> Pulse {
        Pulse::from_shape(PulseShape::MarkerTrain(MarkerTrain {
            channel: channel.to_string(),
            markers,
            marker_length,
            marker_separation,
        }))
    }

    /// Block pulse on the I channel, IQ modulated onto an I/Q pair.
    #[staticmethod]
    #[pyo3(signature = (i_channel, q_channel, amplitude=0.1, length=1e-6, mod_frequency=1e6, phase=0.0, alpha=1.0, phi_skew=0.0))]
    #[allow(clippy::too_many_arguments)]
    pub fn iq_mod(
        i_channel: &str,
        q_channel: &str,
        amplitude: f64,
        length: f64,
        mod_frequency: f64,
        phase: f64,
        alpha: f64,
        phi_skew: f64,
    ) -> Pulse {
        Pulse::from_shape(PulseShape::IqModulated(IqModPulse {
            i_channel: i_channel.to_string(),
            q_channel: q_channel.to_string(),
            amplitude,
            length,
            mod_frequency,
            phase,
            alpha,
            phi_skew,
        }))
    }

    /// Gaussian on I, `motzoi`-weighted derivative on Q, single-sideband
    /// modulated onto an I/Q pair. Duration is `sigma * nr_sigma`.
    #[staticmethod]
    #[pyo3(signature = (i_channel, q_channel, amplitude=0.1, sigma=0.25e-6, nr_sigma=4.0, motzoi=0.0, mod_frequency=1e6, phase=0.0, alpha=1.0, phi_skew=0.0))]
    #[allow(clippy::too_many_arguments)]
    pub fn ssb_drag(
        i_channel: &str,
        q_channel: &str,
        amplitude: f64,
        sigma: f64,
        nr_sigma: f64,
        motzoi: f64,
        mod_frequency: f64,
        phase: f64,
        alpha: f64,
        phi_skew: f64,
    ) -> Pulse {
        Pulse::from_shape(PulseShape::SsbDrag(SsbDragPulse {
            i_channel: i_channel.to_string(),
            q_channel: q_channel.to_string(),
            amplitude,
            sigma,
            nr_sigma,
            motzoi,
            mod_frequency,
            phase,
            alpha,
            phi_skew,
        }))
    }

    /// Returns a deep, independent copy of the template.
    ///
    /// Mutating the copy (via the `with_*` overrides) never affects the
    /// template.
    pub fn cp(&self) -> Pulse {
        self.clone()
    }

    /// Overrides the single bound channel.
    pub fn with_channel(&self, channel: &str) -> Result<Pulse, SeqError> {
        let mut copy = self.clone();
        match &mut copy.shape {
            PulseShape::Square(p) => p.channel = channel.to_string(),
            PulseShape::Cosine(p) => p.channel = channel.to_string(),
            PulseShape::Linear(p) => p.channel = channel.to_string(),
            PulseShape::ClockTrain(p) => p.channel = channel.to_string(),
            PulseShape::MarkerTrain(p) => p.channel = channel.to_string(),
            PulseShape::IqModulated(_) | PulseShape::SsbDrag(_) => {
                return Err(SeqError::InvalidOverride {
                    shape: self.shape.name(),
                    field: "channel",
                })
            }
        }
        Ok(copy)
    }

    /// Overrides the amplitude.
    pub fn with_amplitude(&self, amplitude: f64) -> Result<Pulse, SeqError> {
        let mut copy = self.clone();
        match &mut copy.shape {
            PulseShape::Square(p) => p.amplitude = amplitude,
            PulseShape::Cosine(p) => p.amplitude = amplitude,
            PulseShape::ClockTrain(p) => p.amplitude = amplitude,
            PulseShape::IqModulated(p) => p.amplitude = amplitude,
            PulseShape::SsbDrag(p) => p.amplitude = amplitude,
            PulseShape::Linear(_) | PulseShape::MarkerTrain(_) => {
                return Err(SeqError::InvalidOverride {
                    shape: self.shape.name(),
                    field: "amplitude",
                })
            }
        }
        Ok(copy)
    }

    /// Overrides the duration. Train and DRAG durations are derived from
    /// their cell and sigma parameters and cannot be overridden directly.
    pub fn with_length(&self, length: f64) -> Result<Pulse, SeqError> {
        let mut copy = self.clone();
        match &mut copy.shape {
            PulseShape::Square(p) => p.length = length,
            PulseShape::Cosine(p) => p.length = length,
            PulseShape::Linear(p) => p.length = length,
            PulseShape::IqModulated(p) => p.length = length,
            PulseShape::ClockTrain(_) | PulseShape::MarkerTrain(_) | PulseShape::SsbDrag(_) => {
                return Err(SeqError::InvalidOverride {
                    shape: self.shape.name(),
                    field: "length",
                })
            }
        }
        Ok(copy)
    }

    /// Overrides the cosine carrier frequency.
    pub fn with_frequency(&self, frequency: f64) -> Result<Pulse, SeqError> {
        let mut copy = self.clone();
        match &mut copy.shape {
            PulseShape::Cosine(p) => p.frequency = frequency,
            _ => {
                return Err(SeqError::InvalidOverride {
                    shape: self.shape.name(),
                    field: "frequency",
                })
            }
        }
        Ok(copy)
    }

    /// Overrides the phase (degrees) of a cosine or modulated pulse.
    pub fn with_phase(&self, phase: f64) -> Result<Pulse, SeqError> {
        let mut copy = self.clone();
        match &mut copy.shape {
            PulseShape::Cosine(p) => p.phase = phase,
            PulseShape::IqModulated(p) => p.phase = phase,
            PulseShape::SsbDrag(p) => p.phase = phase,
            _ => {
                return Err(SeqError::InvalidOverride {
                    shape: self.shape.name(),
                    field: "phase",
                })
            }
        }
        Ok(copy)
    }

    /// Overrides the modulation frequency of an I/Q pulse.
    pub fn with_mod_frequency(&self, mod_frequency: f64) -> Result<Pulse, SeqError> {
        let mut copy = self.clone();
        match &mut copy.shape {
            PulseShape::IqModulated(p) => p.mod_frequency = mod_frequency,
            PulseShape::SsbDrag(p) => p.mod_frequency = mod_frequency,
            _ => {
                return Err(SeqError::InvalidOverride {
                    shape: self.shape.name(),
                    field: "mod_frequency",
                })
            }
        }
        Ok(copy)
    }

    /// Overrides the DRAG derivative weight.
    pub fn with_motzoi(&self, motzoi: f64) -> Result<Pulse, SeqError> {
        let mut copy = self.clone();
        match &mut copy.shape {
            PulseShape::SsbDrag(p) => p.motzoi = motzoi,
            _ => {
                return Err(SeqError::InvalidOverride {
                    shape: self.shape.name(),
                    field: "motzoi",
                })
            }
        }
        Ok(copy)
    }

    /// Overrides the Gaussian width.
    pub fn with_sigma(&self, sigma: f64) -> Result<Pulse, SeqError> {
        let mut copy = self.clone();
        match &mut copy.shape {
            PulseShape::SsbDrag(p) => p.sigma = sigma,
            _ => {
                return Err(SeqError::InvalidOverride {
                    shape: self.shape.name(),
                    field: "sigma",
                })
            }
        }
        Ok(copy)
    }

    /// Pulse duration in seconds.
    pub fn length(&self) -> f64 {
        self.shape.length()
    }

    /// Logical channel names this pulse writes to.
    pub fn channels(&self) -> Vec<String> {
        self.shape.channels().iter().map(|c| c.to_string()).collect()
    }

    fn __repr__(&self) -> String {
        format!("{:?}", self.shape)
    }
}
