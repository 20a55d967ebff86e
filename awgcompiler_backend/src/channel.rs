//! Channel map: binds logical channel names to the physical identities the
//! AWG exposes and carries their voltage/delay metadata.
//!
//! The device has two physical groups, each one analog line plus two binary
//! marker lines: `ch1`, `ch1_marker1`, `ch1_marker2` and the same for `ch2`.
//! Callers work with logical names ("RF1", "readout_trigger", ...); the map
//! translates those into physical groupings at compile time.
//!
//! The map is an explicit configuration object owned per station instance;
//! there is no process-wide channel table.

use indexmap::IndexMap;
use log::warn;
use regex::Regex;

use crate::error::SeqError;

/// The analog group ids of the two-channel AWG, in sequence-file column order.
pub const ANALOG_IDS: [&str; 2] = ["ch1", "ch2"];

/// Distinguishes analog lines from binary marker lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    Analog,
    Marker,
}

impl ChannelKind {
    /// Parses the textual form used at the Python boundary.
    pub fn parse(value: &str) -> Result<Self, SeqError> {
        match value {
            "analog" => Ok(ChannelKind::Analog),
            "marker" => Ok(ChannelKind::Marker),
            other => Err(SeqError::BadChannelKind {
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ChannelKind::Analog => "analog",
                ChannelKind::Marker => "marker",
            }
        )
    }
}

/// One channel definition: logical name, physical id and output metadata.
#[derive(Clone, Debug)]
pub struct ChannelDef {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub high: f64,
    pub low: f64,
    pub offset: f64,
    pub delay: f64,
    pub active: bool,
}

/// The active sub-channels of one physical group.
pub struct ChannelGroup<'a> {
    pub analog: Option<&'a ChannelDef>,
    pub marker1: Option<&'a ChannelDef>,
    pub marker2: Option<&'a ChannelDef>,
}

/// Logical-name-keyed channel table, insertion ordered.
#[derive(Clone, Debug, Default)]
pub struct ChannelMap {
    channels: IndexMap<String, ChannelDef>,
}

/// Strips the marker suffix off a physical id: `ch1_marker2` groups under `ch1`.
pub fn base_id(id: &str) -> &str {
    id.split('_').next().unwrap()
}

impl ChannelMap {
    pub fn new() -> Self {
        Self {
            channels: IndexMap::new(),
        }
    }

    /// Registers a channel definition.
    ///
    /// The physical id must match the device's naming convention for the
    /// channel kind: `ch(number)` for analog lines, `ch(number)_marker(1|2)`
    /// for marker lines, and the voltage window must satisfy `high > low`.
    ///
    /// Re-defining an id already in use overwrites the previous definition
    /// and logs a warning. A second definition under an existing logical
    /// name (with a different id) is rejected.
    ///
    /// # Example
    ///
    /// ```
    /// use awgcompiler_backend::channel::{ChannelDef, ChannelKind, ChannelMap};
    ///
    /// let mut chmap = ChannelMap::new();
    /// chmap
    ///     .define(ChannelDef {
    ///         id: "ch1".to_string(),
    ///         name: "RF1".to_string(),
    ///         kind: ChannelKind::Analog,
    ///         high: 0.541,
    ///         low: -0.541,
    ///         offset: 0.0,
    ///         delay: 0.0,
    ///         active: true,
    ///     })
    ///     .unwrap();
    /// assert!(chmap.get("RF1").is_some());
    /// ```
    pub fn define(&mut self, def: ChannelDef) -> Result<(), SeqError> {
        let (pattern, expected) = match def.kind {
            ChannelKind::Analog => (r"^ch\d+$", "ch(number)"),
            ChannelKind::Marker => (r"^ch\d+_marker[12]$", "ch(number)_marker(1|2)"),
        };
        let re = Regex::new(pattern).unwrap();
        if !re.is_match(&def.id) {
            return Err(SeqError::BadChannelId {
                id: def.id.clone(),
                expected: expected.to_string(),
            });
        }
        if def.high <= def.low {
            return Err(SeqError::ChannelRange {
                name: def.name.clone(),
                high: def.high,
                low: def.low,
            });
        }

        // An id can only be bound once; the newest definition wins
        let doubles: Vec<String> = self
            .channels
            .values()
            .filter(|c| c.id == def.id)
            .map(|c| c.name.clone())
            .collect();
        for name in doubles {
            warn!("channel id '{}' already in use by '{}', will overwrite", def.id, name);
            self.channels.shift_remove(&name);
        }

        if self.channels.contains_key(&def.name) {
            return Err(SeqError::DuplicateChannel {
                name: def.name.clone(),
            });
        }
        self.channels.insert(def.name.clone(), def);
        Ok(())
    }

    /// Looks up a definition by logical name.
    pub fn get(&self, name: &str) -> Option<&ChannelDef> {
        self.channels.get(name)
    }

    /// All definitions, active or not, in insertion order.
    pub fn channels(&self) -> &IndexMap<String, ChannelDef> {
        &self.channels
    }

    /// Active definitions only; inactive channels are bookkeeping.
    pub fn active(&self) -> impl Iterator<Item = &ChannelDef> {
        self.channels.values().filter(|c| c.active)
    }

    /// The active sub-channels bound to one physical group id.
    pub fn group(&self, id: &str) -> ChannelGroup<'_> {
        let find = |target: String| {
            self.channels
                .values()
                .find(move |c| c.active && c.id == target)
        };
        ChannelGroup {
            analog: find(id.to_string()),
            marker1: find(format!("{id}_marker1")),
            marker2: find(format!("{id}_marker2")),
        }
    }

    /// Physical group ids with at least one active channel, insertion ordered.
    pub fn used_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for chan in self.active() {
            let base = base_id(&chan.id).to_string();
            if !ids.contains(&base) {
                ids.push(base);
            }
        }
        ids
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn analog(id: &str, name: &str) -> ChannelDef {
        ChannelDef {
            id: id.to_string(),
            name: name.to_string(),
            kind: ChannelKind::Analog,
            high: 0.541,
            low: -0.541,
            offset: 0.0,
            delay: 0.0,
            active: true,
        }
    }

    fn marker(id: &str, name: &str) -> ChannelDef {
        ChannelDef {
            id: id.to_string(),
            name: name.to_string(),
            kind: ChannelKind::Marker,
            high: 1.0,
            low: 0.0,
            offset: 0.0,
            delay: 0.0,
            active: true,
        }
    }

    #[test]
    fn groups_and_used_ids() {
        let mut chmap = ChannelMap::new();
        chmap.define(analog("ch1", "RF1")).unwrap();
        chmap.define(marker("ch1_marker1", "MW_pulsemod")).unwrap();
        chmap.define(marker("ch2_marker1", "trigger")).unwrap();

        assert_eq!(chmap.used_ids(), vec!["ch1".to_string(), "ch2".to_string()]);
        let grp = chmap.group("ch1");
        assert_eq!(grp.analog.unwrap().name, "RF1");
        assert_eq!(grp.marker1.unwrap().name, "MW_pulsemod");
        assert!(grp.marker2.is_none());
        // ch2 has a marker but no analog definition
        assert!(chmap.group("ch2").analog.is_none());
    }

    #[test]
    fn id_reuse_overwrites_previous() {
        let mut chmap = ChannelMap::new();
        chmap.define(analog("ch1", "RF1")).unwrap();
        chmap.define(analog("ch1", "RF1_bis")).unwrap();
        assert!(chmap.get("RF1").is_none());
        assert_eq!(chmap.group("ch1").analog.unwrap().name, "RF1_bis");
        assert_eq!(chmap.channels().len(), 1);
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut chmap = ChannelMap::new();
        chmap.define(analog("ch1", "RF1")).unwrap();
        let err = chmap.define(analog("ch2", "RF1")).unwrap_err();
        assert!(matches!(err, SeqError::DuplicateChannel { .. }));
    }

    #[test]
    fn bad_id_format_rejected() {
        let mut chmap = ChannelMap::new();
        let err = chmap.define(analog("channel1", "RF1")).unwrap_err();
        assert!(matches!(err, SeqError::BadChannelId { .. }));
        let err = chmap.define(marker("ch1_marker3", "m3")).unwrap_err();
        assert!(matches!(err, SeqError::BadChannelId { .. }));
    }

    #[test]
    fn degenerate_voltage_window_rejected() {
        let mut chmap = ChannelMap::new();
        let mut def = analog("ch1", "RF1");
        def.high = -0.5;
        def.low = 0.5;
        assert!(matches!(
            chmap.define(def),
            Err(SeqError::ChannelRange { .. })
        ));
    }

    #[test]
    fn inactive_channels_ignored_for_compilation() {
        let mut chmap = ChannelMap::new();
        let mut def = analog("ch2", "RF2");
        def.active = false;
        chmap.define(def).unwrap();
        assert!(chmap.used_ids().is_empty());
        assert!(chmap.group("ch2").analog.is_none());
        // still retained for bookkeeping
        assert!(chmap.get("RF2").is_some());
    }
}
