//! The device-adapter boundary: the synchronous contract between the
//! compiled file set and a physical AWG.
//!
//! Everything behind [`DeviceAdapter`] blocks: file writes, the ready poll,
//! playback start/stop and the state query. There is no cancellation of an
//! in-flight upload and at most one outstanding upload per device; callers
//! poll [`DeviceAdapter::get_state`] until [`AwgState::Idle`] before
//! reprogramming. Transport failures surface to the caller unmodified; the
//! station never retries.
//!
//! [`LocalFileAdapter`] materializes the generated files in a directory and
//! models the playback state locally. Shipping that directory to the
//! instrument (FTP or otherwise) is a separate concern outside this crate.

use std::fs;
use std::path::{Path, PathBuf};

use awgcompiler_backend::sequence::DJUMP_TABLE_SIZE;
use awgcompiler_backend::SeqError;
use log::debug;

/// Playback state machine of the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AwgState {
    Idle,
    WaitingForTrigger,
    Running,
    Error,
}

impl std::fmt::Display for AwgState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AwgState::Idle => "Idle",
                AwgState::WaitingForTrigger => "WaitingForTrigger",
                AwgState::Running => "Running",
                AwgState::Error => "Error",
            }
        )
    }
}

/// Synchronous device contract consumed by the station.
///
/// Implementors wrap whatever talks to the hardware; the station only ever
/// calls these methods, in upload order, and propagates every error as-is.
pub trait DeviceAdapter {
    fn write_waveform_file(&mut self, name: &str, contents: &[u8]) -> Result<(), SeqError>;
    fn write_sequence_file(&mut self, name: &str, contents: &[u8]) -> Result<(), SeqError>;
    /// Drops every waveform known to the device before a fresh upload.
    fn clear_waveforms(&mut self) -> Result<(), SeqError>;
    fn is_ready(&self) -> Result<bool, SeqError>;
    fn start(&mut self) -> Result<(), SeqError>;
    fn stop(&mut self) -> Result<(), SeqError>;
    fn get_state(&self) -> Result<AwgState, SeqError>;
    /// Whether the installed hardware options include table jump.
    fn supports_dynamic_jump(&self) -> bool {
        false
    }
    /// Loads the 16-entry dynamic-jump table (1-based step indices, 0 =
    /// unused). Only called after [`DeviceAdapter::supports_dynamic_jump`]
    /// returned `true`.
    fn load_jump_table(&mut self, table: &[usize; DJUMP_TABLE_SIZE]) -> Result<(), SeqError> {
        let _ = table;
        Ok(())
    }
}

/// Adapter that writes the generated file set into a local directory.
///
/// The playback state is modeled locally so the full program/start/stop flow
/// can run without hardware. The dynamic-jump capability is negotiated from
/// the installed-option list: option `"09"` is the table-jump option.
pub struct LocalFileAdapter {
    dir: PathBuf,
    state: AwgState,
    options: Vec<String>,
}

impl LocalFileAdapter {
    /// Creates the output directory (and parents) if missing.
    pub fn new(dir: &Path) -> Result<Self, SeqError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            state: AwgState::Idle,
            options: Vec::new(),
        })
    }

    /// Declares the installed hardware options, e.g. `["09"]`.
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }
}

impl DeviceAdapter for LocalFileAdapter {
    fn write_waveform_file(&mut self, name: &str, contents: &[u8]) -> Result<(), SeqError> {
        debug!("writing waveform file {} ({} bytes)", name, contents.len());
        fs::write(self.dir.join(name), contents)?;
        Ok(())
    }

    fn write_sequence_file(&mut self, name: &str, contents: &[u8]) -> Result<(), SeqError> {
        debug!("writing sequence file {} ({} bytes)", name, contents.len());
        fs::write(self.dir.join(name), contents)?;
        Ok(())
    }

    fn clear_waveforms(&mut self) -> Result<(), SeqError> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let generated = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("wfm") | Some("seq")
            );
            if generated {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn is_ready(&self) -> Result<bool, SeqError> {
        Ok(true)
    }

    fn start(&mut self) -> Result<(), SeqError> {
        self.state = AwgState::Running;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SeqError> {
        self.state = AwgState::Idle;
        Ok(())
    }

    fn get_state(&self) -> Result<AwgState, SeqError> {
        Ok(self.state)
    }

    fn supports_dynamic_jump(&self) -> bool {
        self.options.iter().any(|opt| opt == "09")
    }
}
