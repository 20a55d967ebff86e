//! The sequence table: the hardware playback state machine.
//!
//! A [`Sequence`] is an ordered list of [`SequenceStep`]s. Each step plays
//! one element a number of times, optionally waits for an external trigger
//! before playing, and names where control goes next: the following step in
//! table order, a `goto` target, or (on hardware with the table-jump option)
//! an event-driven dynamic jump target. Reaching the end of the table with no
//! `goto` ends playback; a loop is an explicit `goto` back to an earlier
//! step.
//!
//! Elements are referred to by name only; making them available is the
//! station's job, so a sequence holds names and metadata, never waveform
//! data.
//!
//! Hardware limits (repetition counts, step count) are enforced by
//! [`Sequence::validate`] before anything is serialized.

use indexmap::IndexMap;
use pyo3::prelude::*;

use crate::error::SeqError;

/// Hardware ceiling on the number of sequence steps.
pub const MAX_SEQ_STEPS: usize = 8000;
/// Smallest accepted per-step repetition count.
pub const MIN_REPETITIONS: u32 = 1;
/// Largest accepted per-step repetition count.
pub const MAX_REPETITIONS: u32 = 65536;
/// Number of entries in the hardware dynamic-jump table (4-bit patterns).
pub const DJUMP_TABLE_SIZE: usize = 16;

/// One row of the playback table.
#[derive(Clone, Debug)]
pub struct SequenceStep {
    pub name: String,
    pub element: String,
    pub repetitions: u32,
    pub trigger_wait: bool,
    pub goto_target: Option<String>,
    pub jump_target: Option<String>,
}

/// Ordered list of steps plus the optional dynamic-jump table.
#[pyclass]
#[derive(Clone, Debug)]
pub struct Sequence {
    name: String,
    steps: Vec<SequenceStep>,
    djump_table: Option<IndexMap<u8, String>>,
}

impl Sequence {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Vec::new(),
            djump_table: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    /// Inserts a step at `pos` (clamped to the current length).
    ///
    /// # Errors
    ///
    /// [`SeqError::DuplicateStep`] if the step name is already used; a reused
    /// name never silently replaces the earlier step.
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        pos: usize,
        name: &str,
        element: &str,
        repetitions: u32,
        trigger_wait: bool,
        goto_target: Option<&str>,
        jump_target: Option<&str>,
    ) -> Result<(), SeqError> {
        if self.steps.iter().any(|s| s.name == name) {
            return Err(SeqError::DuplicateStep {
                sequence: self.name.clone(),
                name: name.to_string(),
            });
        }
        let step = SequenceStep {
            name: name.to_string(),
            element: element.to_string(),
            repetitions,
            trigger_wait,
            goto_target: goto_target.map(|s| s.to_string()),
            jump_target: jump_target.map(|s| s.to_string()),
        };
        self.steps.insert(pos.min(self.steps.len()), step);
        Ok(())
    }

    /// Appends a step at the end of the table.
    pub fn append(
        &mut self,
        name: &str,
        element: &str,
        repetitions: u32,
        trigger_wait: bool,
        goto_target: Option<&str>,
        jump_target: Option<&str>,
    ) -> Result<(), SeqError> {
        self.insert(
            self.steps.len(),
            name,
            element,
            repetitions,
            trigger_wait,
            goto_target,
            jump_target,
        )
    }

    /// 1-based position of a step, the index space of the sequence file.
    pub fn step_index(&self, name: &str) -> Result<usize, SeqError> {
        self.steps
            .iter()
            .position(|s| s.name == name)
            .map(|i| i + 1)
            .ok_or_else(|| SeqError::UnknownStep {
                sequence: self.name.clone(),
                name: name.to_string(),
            })
    }

    /// Enables or disables the dynamic-jump table. Disabling drops any
    /// registered jump addresses.
    pub fn set_dynamic_jump(&mut self, on: bool) {
        self.djump_table = if on { Some(IndexMap::new()) } else { None };
    }

    pub fn has_dynamic_jump(&self) -> bool {
        self.djump_table.is_some()
    }

    /// Registers a dynamic-jump address: when the hardware sees the 4-bit
    /// `pattern` it jumps to the named step.
    pub fn add_djump_address(&mut self, pattern: u8, step: &str) -> Result<(), SeqError> {
        if pattern as usize >= DJUMP_TABLE_SIZE {
            return Err(SeqError::BadPattern { pattern });
        }
        match &mut self.djump_table {
            Some(table) => {
                table.insert(pattern, step.to_string());
                Ok(())
            }
            None => Err(SeqError::DynamicJumpDisabled {
                sequence: self.name.clone(),
            }),
        }
    }

    /// The 16-entry hardware jump table as 1-based step indices (0 = unused).
    pub fn djump_entries(&self) -> Result<[usize; DJUMP_TABLE_SIZE], SeqError> {
        let mut entries = [0usize; DJUMP_TABLE_SIZE];
        if let Some(table) = &self.djump_table {
            for (&pattern, step) in table {
                entries[pattern as usize] = self.step_index(step)?;
            }
        }
        Ok(entries)
    }

    /// Checks every hardware limit and target reference.
    ///
    /// Errors name the offending step and element so a failure in a long
    /// table is attributable. Nothing may be serialized if this fails.
    pub fn validate(&self) -> Result<(), SeqError> {
        if self.steps.len() > MAX_SEQ_STEPS {
            return Err(SeqError::TooManySteps {
                sequence: self.name.clone(),
                count: self.steps.len(),
            });
        }
        for step in &self.steps {
            if step.repetitions < MIN_REPETITIONS || step.repetitions > MAX_REPETITIONS {
                return Err(SeqError::RepetitionRange {
                    step: step.name.clone(),
                    element: step.element.clone(),
                    repetitions: step.repetitions,
                });
            }
            if let Some(target) = &step.goto_target {
                self.step_index(target)?;
            }
            if let Some(target) = &step.jump_target {
                self.step_index(target)?;
            }
        }
        if let Some(table) = &self.djump_table {
            for step in table.values() {
                self.step_index(step)?;
            }
        }
        Ok(())
    }
}

#[pymethods]
impl Sequence {
    #[new]
    fn py_new(name: &str) -> Self {
        Sequence::new(name)
    }

    /// Appends a step; elements are referred to by name.
    #[pyo3(
        name = "append",
        signature = (name, element, repetitions=1, trigger_wait=false, goto_target=None, jump_target=None)
    )]
    fn append_py(
        &mut self,
        name: &str,
        element: &str,
        repetitions: u32,
        trigger_wait: bool,
        goto_target: Option<&str>,
        jump_target: Option<&str>,
    ) -> Result<(), SeqError> {
        self.append(
            name,
            element,
            repetitions,
            trigger_wait,
            goto_target,
            jump_target,
        )
    }

    #[pyo3(
        name = "insert",
        signature = (pos, name, element, repetitions=1, trigger_wait=false, goto_target=None, jump_target=None)
    )]
    #[allow(clippy::too_many_arguments)]
    fn insert_py(
        &mut self,
        pos: usize,
        name: &str,
        element: &str,
        repetitions: u32,
        trigger_wait: bool,
        goto_target: Option<&str>,
        jump_target: Option<&str>,
    ) -> Result<(), SeqError> {
        self.insert(
            pos,
            name,
            element,
            repetitions,
            trigger_wait,
            goto_target,
            jump_target,
        )
    }

    /// Number of steps in the table.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    #[pyo3(name = "step_index")]
    fn step_index_py(&self, name: &str) -> Result<usize, SeqError> {
        self.step_index(name)
    }

    #[pyo3(name = "set_dynamic_jump")]
    fn set_dynamic_jump_py(&mut self, on: bool) {
        self.set_dynamic_jump(on)
    }

    #[pyo3(name = "add_djump_address")]
    fn add_djump_address_py(&mut self, pattern: u8, step: &str) -> Result<(), SeqError> {
        self.add_djump_address(pattern, step)
    }

    fn __repr__(&self) -> String {
        format!("Sequence('{}', {} steps)", self.name, self.steps.len())
    }
}
