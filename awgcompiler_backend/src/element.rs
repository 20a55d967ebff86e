//! The element module turns a set of relatively-placed pulse instances into
//! one absolute, discretized timeline per hardware shot.
//!
//! ## Overview
//!
//! An [`Element`] is one playable hardware shot: a named collection of
//! [`PulseInstance`]s, each placing a [`Pulse`] template either at the
//! element time origin or relative to another instance by name. Placement
//! works with *reference points*: an instance anchors one of its own points
//! (`start` or `end`) to the chosen point of the referenced instance, shifted
//! by a signed offset.
//!
//! Instances may be declared in any order. [`Element::resolve`] walks the
//! name-keyed reference graph in one topological fixpoint pass and fails
//! fast on unknown names and cyclic chains; a reference never falls back to
//! a silent default.
//!
//! ## Discretization
//!
//! Pulses are specified on short time scales but the time unit is seconds,
//! so a suitably chosen digit must be rounded on before converting to sample
//! indices. 11 digits is 10 ps, beyond any sample clock this backend will
//! meet, and absorbs the float noise that would otherwise shift a pulse by
//! one sample. The element length is the latest pulse end, rounded up to the
//! sample-clock grid; every active channel gets a zero-filled array of that
//! length and each instance adds its local window into it.
//!
//! # Examples
//!
//! A trigger pulse at 100 ns followed back-to-back by a readout pulse:
//!
//! ```
//! use awgcompiler_backend::element::{Element, RefPoint};
//! use awgcompiler_backend::pulse::Pulse;
//!
//! let mut elem = Element::new("readout", 1e9);
//! elem.add(
//!     Pulse::square("trigger", 1.0, 500e-9),
//!     "trigger", 100e-9, None, RefPoint::End, RefPoint::Start,
//! )
//! .unwrap();
//! elem.add(
//!     Pulse::square("RF1", 0.1, 200e-9),
//!     "pulse", 0.0, Some("trigger"), RefPoint::End, RefPoint::Start,
//! )
//! .unwrap();
//!
//! let times = elem.resolve_times().unwrap();
//! assert_eq!(times["pulse"], 600e-9);
//! ```

use indexmap::IndexMap;
use ndarray::{s, Array1};
use pyo3::prelude::*;

use crate::channel::ChannelMap;
use crate::error::SeqError;
use crate::pulse::Pulse;

/// Times are rounded to this precision (seconds) before discretization: 10 ps.
pub const TIME_PRECISION: f64 = 1e-11;

/// Rounds a time in seconds onto the 10 ps bookkeeping grid.
pub fn round_time(t: f64) -> f64 {
    (t / TIME_PRECISION).round() * TIME_PRECISION
}

/// Converts a time in seconds to a sample index at `clock` Hz.
pub fn time_to_samples(t: f64, clock: f64) -> usize {
    (round_time(t) * clock).round() as usize
}

/// The anchor point of a pulse used for referencing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefPoint {
    Start,
    End,
}

impl RefPoint {
    /// Parses the textual form used at the Python boundary.
    pub fn parse(value: &str) -> Result<Self, SeqError> {
        match value {
            "start" => Ok(RefPoint::Start),
            "end" => Ok(RefPoint::End),
            other => Err(SeqError::BadRefPoint {
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for RefPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                RefPoint::Start => "start",
                RefPoint::End => "end",
            }
        )
    }
}

/// A named, placed copy of a pulse template within an element.
///
/// `refpoint` selects the anchor point on the referenced instance (ignored
/// when `refpulse` is `None`, where the element origin anchors), while
/// `refpoint_new` selects which point of this instance lands on the anchor.
/// `start` is the signed offset between the two.
#[derive(Clone, Debug)]
pub struct PulseInstance {
    pub name: String,
    pub pulse: Pulse,
    pub refpulse: Option<String>,
    pub refpoint: RefPoint,
    pub refpoint_new: RefPoint,
    pub start: f64,
}

/// A named bundle of placed pulses forming one playable waveform per channel.
#[pyclass]
#[derive(Clone, Debug)]
pub struct Element {
    name: String,
    clock: f64,
    pulses: IndexMap<String, PulseInstance>,
}

impl Element {
    /// Creates an empty element sampled at `clock` Hz.
    pub fn new(name: &str, clock: f64) -> Self {
        Self {
            name: name.to_string(),
            clock,
            pulses: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// The placed instances, in declaration order.
    pub fn pulses(&self) -> &IndexMap<String, PulseInstance> {
        &self.pulses
    }

    /// Places a pulse into the element.
    ///
    /// # Arguments
    ///
    /// - `pulse`: the template copy to place (the caller keeps the template).
    /// - `name`: instance name, unique within this element.
    /// - `start`: signed time offset between anchor and own reference point.
    /// - `refpulse`: name of the referenced instance, or `None` to anchor at
    ///   the element time origin. The referenced name may be declared later;
    ///   it is checked at resolution time.
    /// - `refpoint`: anchor point on the referenced instance.
    /// - `refpoint_new`: the point of *this* pulse placed on the anchor.
    ///
    /// # Errors
    ///
    /// [`SeqError::DuplicatePulse`] if `name` is already used; reusing a name
    /// never silently replaces the earlier instance.
    pub fn add(
        &mut self,
        pulse: Pulse,
        name: &str,
        start: f64,
        refpulse: Option<&str>,
        refpoint: RefPoint,
        refpoint_new: RefPoint,
    ) -> Result<(), SeqError> {
        if self.pulses.contains_key(name) {
            return Err(SeqError::DuplicatePulse {
                element: self.name.clone(),
                name: name.to_string(),
            });
        }
        self.pulses.insert(
            name.to_string(),
            PulseInstance {
                name: name.to_string(),
                pulse,
                refpulse: refpulse.map(|s| s.to_string()),
                refpoint,
                refpoint_new,
                start,
            },
        );
        Ok(())
    }

    /// Resolves every instance to an absolute start time (seconds).
    ///
    /// One fixpoint pass over the reference graph: instances anchored at the
    /// origin resolve immediately, the rest resolve once their referenced
    /// instance has. A pass without progress means the remaining instances
    /// form a cycle.
    pub fn resolve_times(&self) -> Result<IndexMap<String, f64>, SeqError> {
        for inst in self.pulses.values() {
            if let Some(r) = &inst.refpulse {
                if !self.pulses.contains_key(r) {
                    return Err(SeqError::UnresolvedReference {
                        element: self.name.clone(),
                        pulse: inst.name.clone(),
                        reference: r.clone(),
                    });
                }
            }
        }

        let mut times: IndexMap<String, f64> = IndexMap::new();
        let mut pending: Vec<&PulseInstance> = self.pulses.values().collect();
        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|inst| {
                let anchor = match &inst.refpulse {
                    None => Some(0.0),
                    Some(r) => times.get(r).map(|&t0| {
                        t0 + match inst.refpoint {
                            RefPoint::Start => 0.0,
                            RefPoint::End => self.pulses[r].pulse.length(),
                        }
                    }),
                };
                match anchor {
                    Some(anchor) => {
                        let mut t0 = anchor + inst.start;
                        if inst.refpoint_new == RefPoint::End {
                            t0 -= inst.pulse.length();
                        }
                        times.insert(inst.name.clone(), round_time(t0));
                        false
                    }
                    None => true,
                }
            });
            if pending.len() == before {
                return Err(SeqError::CyclicReference {
                    element: self.name.clone(),
                    pulse: pending[0].name.clone(),
                });
            }
        }

        for (name, &t0) in &times {
            if t0 < 0.0 {
                return Err(SeqError::NegativeStart {
                    element: self.name.clone(),
                    pulse: name.clone(),
                    t0,
                });
            }
        }

        // Re-key in declaration order
        let mut ordered = IndexMap::new();
        for name in self.pulses.keys() {
            ordered.insert(name.clone(), times[name]);
        }
        Ok(ordered)
    }

    /// Resolves the timeline and samples every active channel.
    ///
    /// Each active channel in `channels` gets a zero-filled array spanning
    /// the element length on the sample-clock grid; every instance adds its
    /// local sample window at its resolved index range. Channels with no
    /// contributing instance stay all-zero, so all arrays come out with
    /// identical length.
    ///
    /// # Errors
    ///
    /// Resolution errors from [`Element::resolve_times`];
    /// [`SeqError::UnknownChannel`] if a pulse is bound to a logical name
    /// the channel map does not know (pulses on *inactive* channels are
    /// skipped); sampling errors from the pulse shapes.
    pub fn resolve(&self, channels: &ChannelMap) -> Result<ResolvedElement, SeqError> {
        let times = self.resolve_times()?;

        let mut total: usize = 0;
        let mut latest_end: f64 = 0.0;
        for inst in self.pulses.values() {
            let start_idx = time_to_samples(times[&inst.name], self.clock);
            let n = time_to_samples(inst.pulse.length(), self.clock);
            total = total.max(start_idx + n);
            latest_end = latest_end.max(round_time(times[&inst.name] + inst.pulse.length()));
        }
        // Element length is the latest pulse end rounded up to the clock grid
        let grid_samples = (round_time(latest_end) * self.clock).ceil() as usize;
        let total = total.max(grid_samples);

        let mut samples: IndexMap<String, Array1<f64>> = IndexMap::new();
        for chan in channels.active() {
            samples.insert(chan.name.clone(), Array1::zeros(total));
        }

        for inst in self.pulses.values() {
            let start_idx = time_to_samples(times[&inst.name], self.clock);
            let n = time_to_samples(inst.pulse.length(), self.clock);
            if n == 0 {
                continue;
            }
            let tvals = Array1::from_iter((0..n).map(|i| i as f64 / self.clock));
            for chan_name in inst.pulse.shape().channels() {
                let def = channels
                    .get(chan_name)
                    .ok_or_else(|| SeqError::UnknownChannel {
                        name: chan_name.to_string(),
                    })?;
                if !def.active {
                    continue;
                }
                let wf = inst
                    .pulse
                    .shape()
                    .sample_channel(chan_name, tvals.view(), self.clock)?;
                let arr = samples.get_mut(chan_name).unwrap();
                let mut window = arr.slice_mut(s![start_idx..start_idx + n]);
                window += &wf;
            }
        }

        Ok(ResolvedElement {
            name: self.name.clone(),
            clock: self.clock,
            start_times: times,
            total_samples: total,
            samples,
        })
    }
}

#[pymethods]
impl Element {
    #[new]
    #[pyo3(signature = (name, clock=1e9))]
    fn py_new(name: &str, clock: f64) -> Self {
        Element::new(name, clock)
    }

    /// Places a pulse; `refpoint`/`refpoint_new` take `"start"` or `"end"`.
    #[pyo3(
        name = "add",
        signature = (pulse, name, start=0.0, refpulse=None, refpoint="end", refpoint_new="start")
    )]
    fn add_py(
        &mut self,
        pulse: Pulse,
        name: &str,
        start: f64,
        refpulse: Option<&str>,
        refpoint: &str,
        refpoint_new: &str,
    ) -> Result<(), SeqError> {
        self.add(
            pulse,
            name,
            start,
            refpulse,
            RefPoint::parse(refpoint)?,
            RefPoint::parse(refpoint_new)?,
        )
    }

    /// Number of placed pulse instances.
    pub fn pulse_count(&self) -> usize {
        self.pulses.len()
    }

    /// Instance names in declaration order.
    pub fn pulse_names(&self) -> Vec<String> {
        self.pulses.keys().cloned().collect()
    }

    fn __repr__(&self) -> String {
        format!(
            "Element('{}', clock={:e}, {} pulses)",
            self.name,
            self.clock,
            self.pulses.len()
        )
    }
}

/// The timeline of one element after reference resolution and sampling.
pub struct ResolvedElement {
    name: String,
    clock: f64,
    start_times: IndexMap<String, f64>,
    total_samples: usize,
    samples: IndexMap<String, Array1<f64>>,
}

impl ResolvedElement {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Common sample count of every channel array.
    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    /// Element duration in seconds on the sample-clock grid.
    pub fn length(&self) -> f64 {
        self.total_samples as f64 / self.clock
    }

    /// Resolved absolute start time of one instance.
    pub fn start_time(&self, pulse: &str) -> Option<f64> {
        self.start_times.get(pulse).copied()
    }

    /// Sample array of one active logical channel.
    pub fn channel_samples(&self, channel: &str) -> Option<&Array1<f64>> {
        self.samples.get(channel)
    }

    /// All per-channel sample arrays, keyed by logical name.
    pub fn samples(&self) -> &IndexMap<String, Array1<f64>> {
        &self.samples
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::{ChannelDef, ChannelKind, ChannelMap};

    fn test_channels() -> ChannelMap {
        let mut chmap = ChannelMap::new();
        for (id, name, kind, high, low) in [
            ("ch1", "RF1", ChannelKind::Analog, 0.541, -0.541),
            ("ch2", "RF2", ChannelKind::Analog, 0.541, -0.541),
            ("ch1_marker1", "MW_pulsemod", ChannelKind::Marker, 1.0, 0.0),
            ("ch2_marker1", "trigger", ChannelKind::Marker, 1.0, 0.0),
        ] {
            chmap
                .define(ChannelDef {
                    id: id.to_string(),
                    name: name.to_string(),
                    kind,
                    high,
                    low,
                    offset: 0.0,
                    delay: 0.0,
                    active: true,
                })
                .unwrap();
        }
        chmap
    }

    #[test]
    fn reference_to_end_resolves() {
        let mut elem = Element::new("shot", 1e9);
        elem.add(
            Pulse::square("trigger", 1.0, 500e-9),
            "trigger",
            100e-9,
            None,
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        elem.add(
            Pulse::square("RF1", 0.1, 200e-9),
            "pulse",
            0.0,
            Some("trigger"),
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();

        let times = elem.resolve_times().unwrap();
        assert_eq!(times["trigger"], 100e-9);
        assert_eq!(times["pulse"], 600e-9);
    }

    #[test]
    fn declaration_order_is_free() {
        let mut elem = Element::new("shot", 1e9);
        // forward reference: "late" is declared before its anchor
        elem.add(
            Pulse::square("RF1", 0.1, 100e-9),
            "late",
            50e-9,
            Some("early"),
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        elem.add(
            Pulse::square("RF2", 0.1, 200e-9),
            "early",
            0.0,
            None,
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        let times = elem.resolve_times().unwrap();
        assert_eq!(times["late"], 250e-9);
    }

    #[test]
    fn refpoint_new_end_places_own_end_on_anchor() {
        let mut elem = Element::new("shot", 1e9);
        elem.add(
            Pulse::square("RF1", 0.1, 400e-9),
            "readout",
            1000e-9,
            None,
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        // trigger ends exactly where the readout begins
        elem.add(
            Pulse::square("trigger", 1.0, 100e-9),
            "pretrigger",
            0.0,
            Some("readout"),
            RefPoint::Start,
            RefPoint::End,
        )
        .unwrap();
        let times = elem.resolve_times().unwrap();
        assert_eq!(times["pretrigger"], 900e-9);
    }

    #[test]
    fn chained_references_are_monotonic() {
        let mut elem = Element::new("chain", 1e9);
        elem.add(
            Pulse::square("RF1", 0.1, 100e-9),
            "p0",
            0.0,
            None,
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        for i in 1..6 {
            elem.add(
                Pulse::square("RF1", 0.1, 100e-9),
                &format!("p{i}"),
                (i % 2) as f64 * 30e-9,
                Some(&format!("p{}", i - 1)),
                RefPoint::End,
                RefPoint::Start,
            )
            .unwrap();
        }
        let times = elem.resolve_times().unwrap();
        let mut prev = -1.0;
        for i in 0..6 {
            let t = times[&format!("p{i}")];
            assert!(t >= prev, "start times must be non-decreasing along a chain");
            prev = t;
        }
    }

    #[test]
    fn duplicate_instance_name_rejected() {
        let mut elem = Element::new("shot", 1e9);
        elem.add(
            Pulse::square("RF1", 0.1, 100e-9),
            "pulse",
            0.0,
            None,
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        let err = elem
            .add(
                Pulse::square("RF1", 0.2, 100e-9),
                "pulse",
                0.0,
                None,
                RefPoint::End,
                RefPoint::Start,
            )
            .unwrap_err();
        assert!(matches!(err, SeqError::DuplicatePulse { .. }));
        // the first definition survives
        assert_eq!(elem.pulse_count(), 1);
    }

    #[test]
    fn unknown_reference_rejected() {
        let mut elem = Element::new("shot", 1e9);
        elem.add(
            Pulse::square("RF1", 0.1, 100e-9),
            "pulse",
            0.0,
            Some("ghost"),
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        let err = elem.resolve_times().unwrap_err();
        assert!(matches!(
            err,
            SeqError::UnresolvedReference { ref reference, .. } if reference == "ghost"
        ));
    }

    #[test]
    fn cyclic_reference_rejected() {
        let mut elem = Element::new("shot", 1e9);
        elem.add(
            Pulse::square("RF1", 0.1, 100e-9),
            "a",
            0.0,
            Some("b"),
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        elem.add(
            Pulse::square("RF2", 0.1, 100e-9),
            "b",
            0.0,
            Some("a"),
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        assert!(matches!(
            elem.resolve_times(),
            Err(SeqError::CyclicReference { .. })
        ));
    }

    #[test]
    fn rounding_absorbs_float_noise() {
        // 0.57 + 0.03 microseconds does not equal 0.6 in binary floats,
        // but must land on the same sample as 600 ns
        let t = 0.57e-6 + 0.03e-6;
        assert_ne!(t, 0.6e-6);
        assert_eq!(time_to_samples(t, 1e9), time_to_samples(0.6e-6, 1e9));
        assert_eq!(time_to_samples(t, 1e9), 600);
    }

    #[test]
    fn all_channel_arrays_equal_length() {
        let chmap = test_channels();
        let mut elem = Element::new("shot", 1e9);
        elem.add(
            Pulse::cosine("RF1", 100e6, 0.3, 0.3e-6, 0.0),
            "first pulse",
            0.0,
            None,
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        elem.add(
            Pulse::square("MW_pulsemod", 1.0, 0.5e-6),
            "second pulse",
            0.2e-6,
            Some("first pulse"),
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();

        let resolved = elem.resolve(&chmap).unwrap();
        // 0.3 us + 0.2 us gap + 0.5 us = 1 us
        assert_eq!(resolved.total_samples(), 1000);
        assert_eq!(resolved.length(), 1e-6);
        assert_eq!(resolved.start_time("second pulse"), Some(0.5e-6));
        for (_, arr) in resolved.samples() {
            assert_eq!(arr.len(), 1000);
        }
        // untouched channels stay all-zero
        let rf2 = resolved.channel_samples("RF2").unwrap();
        assert!(rf2.iter().all(|&v| v == 0.0));
        // the marker window sits at its resolved index range
        let pmod = resolved.channel_samples("MW_pulsemod").unwrap();
        assert_eq!(pmod[499], 0.0);
        assert_eq!(pmod[500], 1.0);
        assert_eq!(pmod[999], 1.0);
    }

    #[test]
    fn pulse_on_unknown_channel_rejected() {
        let chmap = test_channels();
        let mut elem = Element::new("shot", 1e9);
        elem.add(
            Pulse::square("nonexistent", 0.1, 100e-9),
            "pulse",
            0.0,
            None,
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        assert!(matches!(
            elem.resolve(&chmap),
            Err(SeqError::UnknownChannel { .. })
        ));
    }

    #[test]
    fn pulse_on_inactive_channel_skipped() {
        let mut chmap = test_channels();
        chmap
            .define(ChannelDef {
                id: "ch2_marker2".to_string(),
                name: "spare".to_string(),
                kind: ChannelKind::Marker,
                high: 1.0,
                low: 0.0,
                offset: 0.0,
                delay: 0.0,
                active: false,
            })
            .unwrap();
        let mut elem = Element::new("shot", 1e9);
        elem.add(
            Pulse::square("spare", 1.0, 100e-9),
            "pulse",
            0.0,
            None,
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        let resolved = elem.resolve(&chmap).unwrap();
        assert!(resolved.channel_samples("spare").is_none());
        assert_eq!(resolved.total_samples(), 100);
    }

    #[test]
    fn negative_start_rejected() {
        let mut elem = Element::new("shot", 1e9);
        elem.add(
            Pulse::square("RF1", 0.1, 100e-9),
            "early",
            -50e-9,
            None,
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        assert!(matches!(
            elem.resolve_times(),
            Err(SeqError::NegativeStart { .. })
        ));
    }
}
