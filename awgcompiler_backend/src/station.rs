//! The station module provides the channel-configuration surface and the
//! file-rendering pipeline, and the single place by which they are exposed
//! to Python.
//!
//! ## Overview
//!
//! The behavior lives in the [`BaseStation`] trait: a station owns a
//! [`ChannelMap`] and a sample clock, and the default trait methods turn
//! elements and sequences into the device's file set: one waveform file per
//! element and physical group (`<element>_<id>.wfm`) plus one sequence file
//! (`<name>_FILE.seq`). Everything is validated and assembled in memory;
//! nothing is ever written here, so a hard-limit failure can never leave
//! partial output behind.
//!
//! Two implementors exist:
//!
//! 1. [`Station`]: the pure compiler-side station in this crate, with no
//!    device attached.
//! 2. `awgctrl_backend::AwgStation`: adds the device adapter and the upload
//!    flow on top of the same trait.
//!
//! The [`impl_station_boilerplate`] macro generates the Python bindings for
//! any implementor, bridging Rust's trait system and Python's class system
//! the same way for both crates.

use indexmap::IndexMap;
use pyo3::prelude::*;

use crate::channel::{ChannelDef, ChannelKind, ChannelMap};
use crate::codec::{encode_sequence, encode_waveform, SequenceRow};
use crate::element::Element;
use crate::error::SeqError;
use crate::sequence::Sequence;
use crate::waveform::pack_channels;

/// Default sample clock of the target AWG, 1 GS/s.
pub const AWG_CLOCK: f64 = 1e9;

/// Waveform file name for one element on one physical group.
pub fn waveform_file_name(element: &str, id: &str) -> String {
    format!("{element}_{id}.wfm")
}

/// Sequence file name for a named sequence.
pub fn sequence_file_name(sequence: &str) -> String {
    format!("{sequence}_FILE.seq")
}

/// The full in-memory file set of one program call.
#[derive(Debug)]
pub struct ProgramFiles {
    /// Waveform files keyed by file name, in render order.
    pub waveforms: IndexMap<String, Vec<u8>>,
    /// Sequence file name and contents.
    pub sequence: (String, Vec<u8>),
}

/// Defines the channel-configuration and rendering behavior of a station
/// through default trait implementations.
///
/// Implementors supply the field accessors; everything else comes for free.
/// See [`Station`] for the pure concrete type and the
/// [`impl_station_boilerplate`] macro for the Python-facing wrappers.
pub trait BaseStation {
    // Field methods
    fn channels(&self) -> &ChannelMap;
    fn channels_(&mut self) -> &mut ChannelMap;
    fn clock(&self) -> f64;

    /// Registers a channel definition; `kind` is `"analog"` or `"marker"`.
    ///
    /// Re-using a physical id overwrites the previous definition with a
    /// logged warning; re-using a logical name is an error.
    #[allow(clippy::too_many_arguments)]
    fn define_channel(
        &mut self,
        id: &str,
        name: &str,
        kind: &str,
        high: f64,
        low: f64,
        offset: f64,
        delay: f64,
        active: bool,
    ) -> Result<(), SeqError> {
        self.channels_().define(ChannelDef {
            id: id.to_string(),
            name: name.to_string(),
            kind: ChannelKind::parse(kind)?,
            high,
            low,
            offset,
            delay,
            active,
        })
    }

    /// Renders one element into its per-group waveform files.
    fn render_element(&self, element: &Element) -> Result<IndexMap<String, Vec<u8>>, SeqError> {
        let resolved = element.resolve(self.channels())?;
        let packed = pack_channels(&resolved, self.channels())?;
        let mut files = IndexMap::new();
        for (id, wf) in &packed {
            files.insert(
                waveform_file_name(element.name(), id),
                encode_waveform(wf.analog.view(), wf.markers.view(), element.clock())?,
            );
        }
        Ok(files)
    }

    /// Renders the sequence table into its file, translating step-name
    /// targets into the 1-based indices of the file format.
    ///
    /// With `loop_last` the final step's goto is forced back to step 1,
    /// turning single-pass playback into an endless loop.
    fn render_sequence(
        &self,
        sequence: &Sequence,
        loop_last: bool,
    ) -> Result<(String, Vec<u8>), SeqError> {
        sequence.validate()?;
        let count = sequence.steps().len();
        let mut rows = Vec::with_capacity(count);
        for (i, step) in sequence.steps().iter().enumerate() {
            let goto_index = if loop_last && i + 1 == count {
                1
            } else {
                match &step.goto_target {
                    Some(target) => sequence.step_index(target)?,
                    None => 0,
                }
            };
            let jump_index = match &step.jump_target {
                Some(target) => sequence.step_index(target)?,
                None => 0,
            };
            rows.push(SequenceRow {
                wf_ch1: waveform_file_name(&step.element, "ch1"),
                wf_ch2: waveform_file_name(&step.element, "ch2"),
                repetitions: step.repetitions,
                wait: step.trigger_wait,
                goto_index,
                jump_index,
            });
        }
        Ok((sequence_file_name(sequence.name()), encode_sequence(&rows)))
    }

    /// Validates and renders a whole program (every element's waveform
    /// files plus the sequence file) entirely in memory.
    ///
    /// Identical inputs produce identical bytes; callers upload the result
    /// only after this returns, so no partial file set can ever reach the
    /// device.
    fn render_program(
        &self,
        sequence: &Sequence,
        elements: &[Element],
        loop_last: bool,
    ) -> Result<ProgramFiles, SeqError> {
        sequence.validate()?;
        for step in sequence.steps() {
            if !elements.iter().any(|e| e.name() == step.element) {
                return Err(SeqError::UnknownElement {
                    sequence: sequence.name().to_string(),
                    element: step.element.clone(),
                });
            }
        }
        let mut waveforms = IndexMap::new();
        for element in elements {
            waveforms.extend(self.render_element(element)?);
        }
        let sequence_file = self.render_sequence(sequence, loop_last)?;
        Ok(ProgramFiles {
            waveforms,
            sequence: sequence_file,
        })
    }
}

/// A concrete station with no device attached: channel configuration plus
/// in-memory rendering.
///
/// **Refer to the [`BaseStation`] trait for method behavior.**
#[pyclass]
pub struct Station {
    channels: ChannelMap,
    clock: f64,
}

/// A macro to generate boilerplate implementations for structs representing
/// stations.
///
/// PyO3 does not expose trait methods to Python directly, so this macro
/// wraps the [`BaseStation`] surface in a `#[pymethods]` block for the given
/// type, and supplies the trait implementation from the type's `channels`
/// and `clock` fields. Python-facing signatures use strings for channel
/// kinds, mirroring the measurement scripts this backend serves.
///
/// Usage:
/// ```rust
/// use awgcompiler_backend::channel::ChannelMap;
/// use awgcompiler_backend::station::BaseStation;
/// use awgcompiler_backend::*;
/// use pyo3::prelude::*;
///
/// #[pyclass]
/// struct CustomStation {
///     channels: ChannelMap,
///     clock: f64,
/// }
/// impl_station_boilerplate!(CustomStation);
///
/// // Implement additional methods which can be exposed to python
/// #[pymethods]
/// impl CustomStation {
///     #[new]
///     pub fn new() -> Self {
///         Self {
///             channels: ChannelMap::new(),
///             clock: 1e9,
///         }
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_station_boilerplate {
    ($station_type: ty) => {
        impl $crate::station::BaseStation for $station_type {
            fn channels(&self) -> &$crate::channel::ChannelMap {
                &self.channels
            }
            fn channels_(&mut self) -> &mut $crate::channel::ChannelMap {
                &mut self.channels
            }
            fn clock(&self) -> f64 {
                self.clock
            }
        }

        #[pymethods]
        impl $station_type {
            #[pyo3(signature = (id, name, kind, high=1.0, low=0.0, offset=0.0, delay=0.0, active=true))]
            #[allow(clippy::too_many_arguments)]
            fn define_channel(
                &mut self,
                id: &str,
                name: &str,
                kind: &str,
                high: f64,
                low: f64,
                offset: f64,
                delay: f64,
                active: bool,
            ) -> pyo3::PyResult<()> {
                $crate::station::BaseStation::define_channel(
                    self, id, name, kind, high, low, offset, delay, active,
                )?;
                Ok(())
            }

            /// Physical group ids with at least one active channel.
            fn used_channel_ids(&self) -> Vec<String> {
                $crate::station::BaseStation::channels(self).used_ids()
            }

            /// Logical names of every defined channel.
            fn channel_names(&self) -> Vec<String> {
                $crate::station::BaseStation::channels(self)
                    .channels()
                    .keys()
                    .cloned()
                    .collect()
            }

            /// Station sample clock in Hz.
            fn clock(&self) -> f64 {
                $crate::station::BaseStation::clock(self)
            }

            /// Resolves an element and returns one channel's samples.
            fn element_samples<'py>(
                &self,
                py: pyo3::Python<'py>,
                element: &$crate::element::Element,
                channel: &str,
            ) -> pyo3::PyResult<pyo3::Bound<'py, numpy::PyArray1<f64>>> {
                let resolved =
                    element.resolve($crate::station::BaseStation::channels(self))?;
                let samples = resolved.channel_samples(channel).cloned().ok_or_else(|| {
                    $crate::error::SeqError::UnknownChannel {
                        name: channel.to_string(),
                    }
                })?;
                Ok(numpy::IntoPyArray::into_pyarray(samples, py))
            }

            /// Resolves an element and returns its sample count on the grid.
            fn element_total_samples(
                &self,
                element: &$crate::element::Element,
            ) -> pyo3::PyResult<usize> {
                let resolved =
                    element.resolve($crate::station::BaseStation::channels(self))?;
                Ok(resolved.total_samples())
            }
        }
    };
}

#[pymethods]
impl Station {
    /// Creates a station with an empty channel map.
    #[new]
    #[pyo3(signature = (clock=AWG_CLOCK))]
    pub fn new(clock: f64) -> Self {
        Self {
            channels: ChannelMap::new(),
            clock,
        }
    }
}

impl_station_boilerplate!(Station);

#[cfg(test)]
mod test {
    use super::*;
    use crate::element::RefPoint;
    use crate::pulse::Pulse;

    fn test_station() -> Station {
        let mut station = Station::new(1e9);
        for (id, name, kind, high, low) in [
            ("ch1", "RF1", "analog", 0.541, -0.541),
            ("ch2", "RF2", "analog", 0.541, -0.541),
            ("ch1_marker1", "MW_pulsemod", "marker", 1.0, 0.0),
            ("ch2_marker1", "trigger", "marker", 1.0, 0.0),
        ] {
            BaseStation::define_channel(&mut station, id, name, kind, high, low, 0.0, 0.0, true)
                .unwrap();
        }
        station
    }

    fn test_element(name: &str) -> Element {
        let mut elem = Element::new(name, 1e9);
        elem.add(
            Pulse::square("trigger", 1.0, 100e-9),
            "trig",
            0.0,
            None,
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        elem.add(
            Pulse::cosine("RF1", 50e6, 0.3, 200e-9, 0.0),
            "drive",
            0.0,
            Some("trig"),
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        elem
    }

    #[test]
    fn render_element_produces_both_groups() {
        let station = test_station();
        let files = station.render_element(&test_element("shot")).unwrap();
        assert_eq!(
            files.keys().cloned().collect::<Vec<_>>(),
            vec!["shot_ch1.wfm".to_string(), "shot_ch2.wfm".to_string()]
        );
        // 100 ns trigger + 200 ns drive = 300 samples, 5 bytes each + wrapping
        let header_len = 12;
        let trailer_len = "CLOCK 1.0000000000e+09\r\n".len();
        assert_eq!(
            files["shot_ch1.wfm"].len(),
            header_len + 5 * 300 + trailer_len
        );
    }

    #[test]
    fn render_sequence_translates_targets() {
        let station = test_station();
        let mut seq = Sequence::new("scan");
        seq.append("a", "shot", 1, true, None, None).unwrap();
        seq.append("b", "shot", 5, false, Some("a"), None).unwrap();
        let (name, bytes) = station.render_sequence(&seq, false).unwrap();
        assert_eq!(name, "scan_FILE.seq");
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("MAGIC 3002\r\nLINES 2\r\n"));
        assert!(text.contains("\"shot_ch1.wfm\",\"shot_ch2.wfm\",1,1,0,0\r\n"));
        assert!(text.contains("\"shot_ch1.wfm\",\"shot_ch2.wfm\",5,0,1,0\r\n"));
    }

    #[test]
    fn loop_last_forces_goto_to_first_step() {
        let station = test_station();
        let mut seq = Sequence::new("looped");
        seq.append("a", "shot", 1, false, None, None).unwrap();
        seq.append("b", "shot", 1, false, None, None).unwrap();
        let (_, bytes) = station.render_sequence(&seq, true).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.ends_with("\"shot_ch1.wfm\",\"shot_ch2.wfm\",1,0,1,0\r\n"));
    }

    #[test]
    fn program_requires_all_elements() {
        let station = test_station();
        let mut seq = Sequence::new("scan");
        seq.append("a", "shot", 1, false, None, None).unwrap();
        seq.append("b", "missing", 1, false, None, None).unwrap();
        let err = station
            .render_program(&seq, &[test_element("shot")], false)
            .unwrap_err();
        assert!(matches!(
            err,
            SeqError::UnknownElement { ref element, .. } if element == "missing"
        ));
    }

    #[test]
    fn compilation_is_deterministic() {
        let station = test_station();
        let mut seq = Sequence::new("scan");
        seq.append("a", "shot", 2, true, None, None).unwrap();
        let once = station
            .render_program(&seq, &[test_element("shot")], false)
            .unwrap();
        let twice = station
            .render_program(&seq, &[test_element("shot")], false)
            .unwrap();
        assert_eq!(once.sequence, twice.sequence);
        assert_eq!(
            once.waveforms.keys().collect::<Vec<_>>(),
            twice.waveforms.keys().collect::<Vec<_>>()
        );
        for (name, bytes) in &once.waveforms {
            assert_eq!(bytes, &twice.waveforms[name], "file {name} must be byte-identical");
        }
    }
}
