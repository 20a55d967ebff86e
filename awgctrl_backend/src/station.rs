//! # AWG Upload and Playback Control with the `station` Module
//!
//! This module builds on the pure rendering pipeline of
//! [`awgcompiler_backend::station::BaseStation`] and adds the device half:
//! an [`AwgStation`] owns a channel map, a sample clock and a boxed
//! [`DeviceAdapter`], and drives the whole program flow:
//! render everything in memory, clear the device, upload the waveform and
//! sequence files, then poll the device until it reports ready.
//!
//! ## Relationship with `awgcompiler_backend`
//!
//! Channel configuration and file rendering come from the
//! [`BaseStation`] trait implementation generated by
//! [`awgcompiler_backend::impl_station_boilerplate`]; this module only adds
//! what needs a device: uploads, ready/idle polling and playback control.
//! Compilation stays pure and deterministic: a hard-limit or resolution
//! error aborts before the first adapter call, so no partial file set ever
//! reaches the device.
//!
//! ## Blocking model
//!
//! All device interaction is synchronous. Ready and idle waits poll with a
//! bounded, doubling sleep ([`AwgStation::set_ready_timeout`] caps the total
//! wait); there are no async primitives and no cancellation of an in-flight
//! upload. Overlapping uploads to one device are not supported; callers
//! serialize, waiting for [`AwgState::Idle`] before reprogramming.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use pyo3::prelude::*;

use awgcompiler_backend::channel::ChannelMap;
use awgcompiler_backend::element::Element;
use awgcompiler_backend::sequence::Sequence;
use awgcompiler_backend::station::{BaseStation, AWG_CLOCK};
use awgcompiler_backend::{impl_station_boilerplate, SeqError};

use crate::adapter::{AwgState, DeviceAdapter, LocalFileAdapter};

const POLL_INITIAL: Duration = Duration::from_millis(10);
const POLL_CAP: Duration = Duration::from_millis(500);

/// A station bound to one AWG device through a [`DeviceAdapter`].
///
/// The `channels` map and `clock` drive compilation exactly as on the pure
/// [`awgcompiler_backend::station::Station`]; the adapter carries the result
/// to the hardware.
#[pyclass]
pub struct AwgStation {
    channels: ChannelMap,
    clock: f64,
    adapter: Box<dyn DeviceAdapter + Send + Sync>,
    ready_timeout: Duration,
}

impl AwgStation {
    /// Wraps an adapter into a station with an empty channel map.
    pub fn new(adapter: Box<dyn DeviceAdapter + Send + Sync>, clock: f64) -> Self {
        Self {
            channels: ChannelMap::new(),
            clock,
            adapter,
            ready_timeout: Duration::from_secs(30),
        }
    }

    /// Caps the total time the ready/idle polls may wait.
    pub fn set_ready_timeout(&mut self, timeout: Duration) {
        self.ready_timeout = timeout;
    }

    /// Compiles and uploads a whole program: every element's waveform files
    /// plus the sequence file.
    ///
    /// The full file set is validated and rendered in memory first; only
    /// then does the device see `clear_waveforms`, the waveform files, the
    /// sequence file and (if used) the dynamic-jump table, in that order.
    /// With `loop_last` the final step loops back to step 1 instead of
    /// ending playback.
    ///
    /// # Errors
    ///
    /// Everything [`BaseStation::render_program`] raises;
    /// [`SeqError::DynamicJumpUnsupported`] when the sequence carries a
    /// dynamic-jump table but the adapter lacks the capability; transport
    /// errors from the adapter, unmodified and unretried.
    pub fn program_awg(
        &mut self,
        sequence: &Sequence,
        elements: &[Element],
        loop_last: bool,
    ) -> Result<(), SeqError> {
        if sequence.has_dynamic_jump() && !self.adapter.supports_dynamic_jump() {
            return Err(SeqError::DynamicJumpUnsupported {
                sequence: sequence.name().to_string(),
            });
        }
        let files = self.render_program(sequence, elements, loop_last)?;
        let jump_table = sequence.djump_entries()?;

        self.adapter.clear_waveforms()?;
        for (name, bytes) in &files.waveforms {
            self.adapter.write_waveform_file(name, bytes)?;
        }
        self.adapter
            .write_sequence_file(&files.sequence.0, &files.sequence.1)?;
        if sequence.has_dynamic_jump() {
            self.adapter.load_jump_table(&jump_table)?;
        }
        self.wait_until_ready()
    }

    /// Polls the adapter until it reports ready, with doubling backoff.
    pub fn wait_until_ready(&self) -> Result<(), SeqError> {
        self.poll(|station| station.adapter.is_ready())
    }

    /// Polls the device state until playback has returned to idle, the
    /// precondition for reprogramming.
    pub fn wait_until_idle(&self) -> Result<(), SeqError> {
        self.poll(|station| Ok(station.adapter.get_state()? == AwgState::Idle))
    }

    fn poll<F>(&self, mut done: F) -> Result<(), SeqError>
    where
        F: FnMut(&Self) -> Result<bool, SeqError>,
    {
        let deadline = Instant::now() + self.ready_timeout;
        let mut pause = POLL_INITIAL;
        loop {
            if done(self)? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SeqError::ReadyTimeout {
                    seconds: self.ready_timeout.as_secs_f64(),
                });
            }
            thread::sleep(pause);
            pause = (pause * 2).min(POLL_CAP);
        }
    }

    /// Current playback state of the device.
    pub fn state(&self) -> Result<AwgState, SeqError> {
        self.adapter.get_state()
    }
}

impl_station_boilerplate!(AwgStation);

#[pymethods]
impl AwgStation {
    /// Creates a station whose adapter materializes files under `outdir`.
    ///
    /// `options` lists the installed hardware options; `"09"` enables the
    /// dynamic-jump table.
    #[new]
    #[pyo3(signature = (outdir, clock=AWG_CLOCK, options=Vec::new()))]
    fn py_new(outdir: &str, clock: f64, options: Vec<String>) -> PyResult<Self> {
        let adapter = LocalFileAdapter::new(Path::new(outdir))?.with_options(options);
        Ok(AwgStation::new(Box::new(adapter), clock))
    }

    #[pyo3(name = "program_awg", signature = (sequence, elements, loop_last=false))]
    fn program_awg_py(
        &mut self,
        sequence: Sequence,
        elements: Vec<Element>,
        loop_last: bool,
    ) -> Result<(), SeqError> {
        self.program_awg(&sequence, &elements, loop_last)
    }

    /// Starts playback.
    pub fn start(&mut self) -> Result<(), SeqError> {
        self.adapter.start()
    }

    /// Stops playback.
    pub fn stop(&mut self) -> Result<(), SeqError> {
        self.adapter.stop()
    }

    #[pyo3(name = "get_state")]
    fn get_state_py(&self) -> Result<String, SeqError> {
        Ok(self.state()?.to_string())
    }

    /// Whether the device reports ready for the next command.
    pub fn is_ready(&self) -> Result<bool, SeqError> {
        self.adapter.is_ready()
    }

    /// Drops every waveform known to the device.
    pub fn clear_waveforms(&mut self) -> Result<(), SeqError> {
        self.adapter.clear_waveforms()
    }

    #[pyo3(name = "wait_until_idle")]
    fn wait_until_idle_py(&self) -> Result<(), SeqError> {
        self.wait_until_idle()
    }

    #[pyo3(name = "set_ready_timeout")]
    fn set_ready_timeout_py(&mut self, seconds: f64) {
        self.ready_timeout = Duration::from_secs_f64(seconds);
    }
}
