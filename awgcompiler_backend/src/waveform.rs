//! Normalizes resolved channel arrays for the hardware and groups them by
//! physical channel.
//!
//! Analog samples are clipped into the channel's declared `[low, high]`
//! voltage window and scaled to the AWG-native `[-1, 1]` range. Marker
//! samples must be exactly 0 or 1 and the two marker lines of a group pack
//! into one byte per sample (`m1 + 2*m2`), aligned 1:1 with the analog array.

use indexmap::IndexMap;
use ndarray::{Array1, ArrayView1};

use crate::channel::{ChannelDef, ChannelMap, ANALOG_IDS};
use crate::element::ResolvedElement;
use crate::error::SeqError;

/// One physical group ready for encoding: normalized analog samples plus the
/// packed marker byte per sample.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelWaveform {
    pub analog: Array1<f64>,
    pub markers: Array1<u8>,
}

/// Clips `samples` into the channel's voltage window and scales the window
/// onto `[-1, 1]`.
pub fn normalize_analog(samples: ArrayView1<f64>, chan: &ChannelDef) -> Array1<f64> {
    let amp = (chan.high - chan.low) / 2.0;
    let mid = (chan.high + chan.low) / 2.0;
    samples.mapv(|v| (v.clamp(chan.low, chan.high) - mid) / amp)
}

/// Verifies that every marker sample is exactly 0 or 1 and converts to bits.
pub fn marker_bits(samples: ArrayView1<f64>, channel: &str) -> Result<Array1<u8>, SeqError> {
    let mut bits = Array1::zeros(samples.len());
    for (index, &value) in samples.iter().enumerate() {
        if value == 0.0 {
            bits[index] = 0;
        } else if value == 1.0 {
            bits[index] = 1;
        } else {
            return Err(SeqError::MarkerValue {
                channel: channel.to_string(),
                index,
                value,
            });
        }
    }
    Ok(bits)
}

/// Packs the two marker lines of a group into one byte per sample.
pub fn pack_markers(m1: &Array1<u8>, m2: &Array1<u8>) -> Array1<u8> {
    assert_eq!(m1.len(), m2.len(), "marker arrays must have equal length");
    let mut packed = Array1::zeros(m1.len());
    for i in 0..m1.len() {
        packed[i] = m1[i] + 2 * m2[i];
    }
    packed
}

/// Assembles one [`ChannelWaveform`] per physical analog group of the device.
///
/// Both groups (`ch1`, `ch2`) are always produced so the two-column sequence
/// format stays well-formed; a group with no bound analog channel gets
/// all-zero analog samples and a group with no bound marker channel gets
/// all-zero marker bits; arrays are never missing.
///
/// # Errors
///
/// [`SeqError::LengthMismatch`] if the resolved channel arrays disagree in
/// length (they cannot, coming from [`ResolvedElement`], but this is the last
/// gate before encoding); [`SeqError::MarkerValue`] for non-binary marker
/// samples.
pub fn pack_channels(
    resolved: &ResolvedElement,
    channels: &ChannelMap,
) -> Result<IndexMap<String, ChannelWaveform>, SeqError> {
    let n = resolved.total_samples();
    for (name, arr) in resolved.samples() {
        if arr.len() != n {
            return Err(SeqError::LengthMismatch {
                context: format!("element '{}', channel '{}'", resolved.name(), name),
                got: arr.len(),
                expected: n,
            });
        }
    }

    let mut packed = IndexMap::new();
    for id in ANALOG_IDS {
        let group = channels.group(id);

        let analog = match group.analog {
            Some(def) => match resolved.channel_samples(&def.name) {
                Some(samples) => normalize_analog(samples.view(), def),
                None => Array1::zeros(n),
            },
            None => Array1::zeros(n),
        };

        let mut marker_pair: Vec<Array1<u8>> = Vec::with_capacity(2);
        for marker_def in [group.marker1, group.marker2] {
            let bits = match marker_def {
                Some(def) => match resolved.channel_samples(&def.name) {
                    Some(samples) => marker_bits(samples.view(), &def.name)?,
                    None => Array1::zeros(n),
                },
                None => Array1::zeros(n),
            };
            marker_pair.push(bits);
        }

        packed.insert(
            id.to_string(),
            ChannelWaveform {
                analog,
                markers: pack_markers(&marker_pair[0], &marker_pair[1]),
            },
        );
    }
    Ok(packed)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::{ChannelDef, ChannelKind, ChannelMap};
    use crate::element::{Element, RefPoint};
    use crate::pulse::Pulse;
    use ndarray::array;

    fn chan(id: &str, name: &str, kind: ChannelKind, high: f64, low: f64) -> ChannelDef {
        ChannelDef {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            high,
            low,
            offset: 0.0,
            delay: 0.0,
            active: true,
        }
    }

    #[test]
    fn normalization_clips_and_scales() {
        let def = chan("ch1", "RF1", ChannelKind::Analog, 0.5, -0.5);
        let samples = array![0.0, 0.5, -0.5, 0.75, -2.0];
        let norm = normalize_analog(samples.view(), &def);
        assert_eq!(norm.to_vec(), vec![0.0, 1.0, -1.0, 1.0, -1.0]);
    }

    #[test]
    fn asymmetric_window_scales_around_midpoint() {
        let def = chan("ch1", "flux", ChannelKind::Analog, 1.0, 0.0);
        let samples = array![0.0, 0.5, 1.0];
        let norm = normalize_analog(samples.view(), &def);
        assert_eq!(norm.to_vec(), vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn marker_bits_require_binary_samples() {
        let good = array![0.0, 1.0, 1.0, 0.0];
        assert_eq!(
            marker_bits(good.view(), "trigger").unwrap().to_vec(),
            vec![0, 1, 1, 0]
        );
        let bad = array![0.0, 0.5, 1.0];
        let err = marker_bits(bad.view(), "trigger").unwrap_err();
        assert!(matches!(
            err,
            SeqError::MarkerValue { index: 1, .. }
        ));
    }

    #[test]
    fn marker_pair_packs_into_byte() {
        let m1 = array![0u8, 1, 0, 1];
        let m2 = array![0u8, 0, 1, 1];
        assert_eq!(pack_markers(&m1, &m2).to_vec(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn unbound_groups_get_zero_arrays() {
        let mut chmap = ChannelMap::new();
        chmap
            .define(chan("ch1", "RF1", ChannelKind::Analog, 0.5, -0.5))
            .unwrap();
        let mut elem = Element::new("shot", 1e9);
        elem.add(
            Pulse::square("RF1", 0.25, 10e-9),
            "pulse",
            0.0,
            None,
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        let resolved = elem.resolve(&chmap).unwrap();
        let packed = pack_channels(&resolved, &chmap).unwrap();

        assert_eq!(packed.len(), 2);
        let ch1 = &packed["ch1"];
        assert_eq!(ch1.analog.len(), 10);
        assert_eq!(ch1.analog[0], 0.5); // 0.25 V in a +-0.5 V window
        assert!(ch1.markers.iter().all(|&m| m == 0));
        // no channel bound to ch2 at all: still full-length zeros
        let ch2 = &packed["ch2"];
        assert_eq!(ch2.analog.len(), 10);
        assert!(ch2.analog.iter().all(|&v| v == 0.0));
        assert!(ch2.markers.iter().all(|&m| m == 0));
    }

    #[test]
    fn marker_channels_pack_with_analog() {
        let mut chmap = ChannelMap::new();
        chmap
            .define(chan("ch1", "RF1", ChannelKind::Analog, 0.5, -0.5))
            .unwrap();
        chmap
            .define(chan("ch1_marker1", "gate", ChannelKind::Marker, 1.0, 0.0))
            .unwrap();
        chmap
            .define(chan("ch1_marker2", "acq", ChannelKind::Marker, 1.0, 0.0))
            .unwrap();

        let mut elem = Element::new("shot", 1e9);
        elem.add(
            Pulse::square("gate", 1.0, 4e-9),
            "gate on",
            0.0,
            None,
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();
        elem.add(
            Pulse::square("acq", 1.0, 2e-9),
            "acquire",
            2e-9,
            None,
            RefPoint::End,
            RefPoint::Start,
        )
        .unwrap();

        let resolved = elem.resolve(&chmap).unwrap();
        let packed = pack_channels(&resolved, &chmap).unwrap();
        // m1 high for 4 samples, m2 high for samples 2..4
        assert_eq!(packed["ch1"].markers.to_vec(), vec![1, 1, 3, 3]);
    }
}
