//! Serializes waveforms and sequence tables into the device's two binary
//! file formats.
//!
//! ## Waveform format (`MAGIC 1000`)
//!
//! ASCII header `"MAGIC 1000\r\n"`, then one little-endian record per sample
//! (a 32-bit float analog value followed by one unsigned marker byte), then
//! the ASCII trailer `"CLOCK <clock-in-Hz>\r\n"` with the clock printed in
//! C-style `%.10e` notation.
//!
//! ## Sequence format (`MAGIC 3002`)
//!
//! ASCII header `"MAGIC 3002\r\n"`, a line `"LINES <N>\r\n"`, then N rows
//! `"<wf_ch1>","<wf_ch2>",<repetitions>,<wait 0|1>,<goto|0>,<jump|0>\r\n`
//! where goto/jump are 1-based positions into the sequence and 0 means
//! "no target".
//!
//! Encoding is pure byte assembly; all hardware limits are checked by the
//! sequence table and the station renderer before any of these functions run.

use log::debug;
use ndarray::{Array1, ArrayView1};

use crate::error::SeqError;

/// Waveform file header.
pub const WAVEFORM_MAGIC: &[u8] = b"MAGIC 1000\r\n";
/// Sequence file header.
pub const SEQUENCE_MAGIC: &[u8] = b"MAGIC 3002\r\n";

/// Formats a float the way C's `%.10e` does (two-digit signed exponent).
pub fn format_e10(value: f64) -> String {
    let formatted = format!("{:.10e}", value);
    let (mantissa, exponent) = formatted
        .split_once('e')
        .expect("{:.10e} always contains an exponent");
    match exponent.strip_prefix('-') {
        Some(digits) => format!("{}e-{:0>2}", mantissa, digits),
        None => format!("{}e+{:0>2}", mantissa, exponent),
    }
}

/// Encodes one analog/marker array pair into waveform-file bytes.
///
/// # Errors
///
/// [`SeqError::LengthMismatch`] if the marker array length differs from the
/// analog array length.
pub fn encode_waveform(
    analog: ArrayView1<f64>,
    markers: ArrayView1<u8>,
    clock: f64,
) -> Result<Vec<u8>, SeqError> {
    if analog.len() != markers.len() {
        return Err(SeqError::LengthMismatch {
            context: "waveform encoding: marker array".to_string(),
            got: markers.len(),
            expected: analog.len(),
        });
    }
    let mut bytes = Vec::with_capacity(WAVEFORM_MAGIC.len() + 5 * analog.len() + 32);
    bytes.extend_from_slice(WAVEFORM_MAGIC);
    for (&value, &marker) in analog.iter().zip(markers.iter()) {
        bytes.extend_from_slice(&(value as f32).to_le_bytes());
        bytes.push(marker);
    }
    bytes.extend_from_slice(format!("CLOCK {}\r\n", format_e10(clock)).as_bytes());
    debug!("encoded waveform: {} samples at {} Hz", analog.len(), clock);
    Ok(bytes)
}

/// Decodes a waveform file back into its quantized analog samples, marker
/// bytes and clock.
pub fn decode_waveform(bytes: &[u8]) -> Result<(Array1<f32>, Array1<u8>, f64), SeqError> {
    let body = bytes
        .strip_prefix(WAVEFORM_MAGIC)
        .ok_or_else(|| SeqError::MalformedFile {
            reason: "missing MAGIC 1000 header".to_string(),
        })?;
    let trailer_pos = body
        .windows(6)
        .rposition(|w| w == b"CLOCK ")
        .ok_or_else(|| SeqError::MalformedFile {
            reason: "missing CLOCK trailer".to_string(),
        })?;
    let (records, trailer) = body.split_at(trailer_pos);
    if records.len() % 5 != 0 {
        return Err(SeqError::MalformedFile {
            reason: format!("record section of {} bytes is not a multiple of 5", records.len()),
        });
    }

    let n = records.len() / 5;
    let mut analog = Array1::zeros(n);
    let mut markers = Array1::zeros(n);
    for (i, record) in records.chunks_exact(5).enumerate() {
        analog[i] = f32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        markers[i] = record[4];
    }

    let clock_text = std::str::from_utf8(trailer)
        .ok()
        .and_then(|s| s.strip_prefix("CLOCK "))
        .map(|s| s.trim_end())
        .ok_or_else(|| SeqError::MalformedFile {
            reason: "unreadable CLOCK trailer".to_string(),
        })?;
    let clock = clock_text.parse::<f64>().map_err(|_| SeqError::MalformedFile {
        reason: format!("bad clock value '{clock_text}'"),
    })?;
    Ok((analog, markers, clock))
}

/// One row of the sequence file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceRow {
    pub wf_ch1: String,
    pub wf_ch2: String,
    pub repetitions: u32,
    pub wait: bool,
    pub goto_index: usize,
    pub jump_index: usize,
}

/// Encodes the sequence table rows into sequence-file bytes.
pub fn encode_sequence(rows: &[SequenceRow]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(SEQUENCE_MAGIC);
    bytes.extend_from_slice(format!("LINES {}\r\n", rows.len()).as_bytes());
    for row in rows {
        bytes.extend_from_slice(
            format!(
                "\"{}\",\"{}\",{},{},{},{}\r\n",
                row.wf_ch1,
                row.wf_ch2,
                row.repetitions,
                row.wait as u8,
                row.goto_index,
                row.jump_index,
            )
            .as_bytes(),
        );
    }
    debug!("encoded sequence table: {} lines", rows.len());
    bytes
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    #[test]
    fn e10_format_matches_c_printf() {
        assert_eq!(format_e10(1e9), "1.0000000000e+09");
        assert_eq!(format_e10(0.0), "0.0000000000e+00");
        assert_eq!(format_e10(2.5e-7), "2.5000000000e-07");
        assert_eq!(format_e10(-1.2e3), "-1.2000000000e+03");
        assert_eq!(format_e10(9.87654321e100), "9.8765432100e+100");
    }

    #[test]
    fn waveform_golden_bytes() {
        let analog = array![0.5, -1.0];
        let markers = array![3u8, 0];
        let bytes = encode_waveform(analog.view(), markers.view(), 1e9).unwrap();

        let mut expect: Vec<u8> = Vec::new();
        expect.extend_from_slice(b"MAGIC 1000\r\n");
        expect.extend_from_slice(&0.5f32.to_le_bytes()); // 00 00 00 3f
        expect.push(3);
        expect.extend_from_slice(&(-1.0f32).to_le_bytes());
        expect.push(0);
        expect.extend_from_slice(b"CLOCK 1.0000000000e+09\r\n");
        assert_eq!(bytes, expect);
        // spot-check the f32 little-endian layout against struct.pack('<fB')
        assert_eq!(&bytes[12..17], &[0x00, 0x00, 0x00, 0x3f, 0x03]);
    }

    #[test]
    fn waveform_round_trip() {
        let analog = array![0.1, -0.25, 0.999, 0.0, -1.0];
        let markers = array![0u8, 1, 2, 3, 0];
        let bytes = encode_waveform(analog.view(), markers.view(), 1.2e9).unwrap();
        let (dec_analog, dec_markers, clock) = decode_waveform(&bytes).unwrap();

        assert_eq!(dec_analog.len(), 5);
        for (orig, dec) in analog.iter().zip(dec_analog.iter()) {
            // exact at f32 quantization, no further loss
            assert_eq!(*orig as f32, *dec);
        }
        assert_eq!(dec_markers.to_vec(), markers.to_vec());
        assert_eq!(clock, 1.2e9);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode_waveform(b"MAGIC 3002\r\nLINES 0\r\n"),
            Err(SeqError::MalformedFile { .. })
        ));
        assert!(matches!(
            decode_waveform(b"MAGIC 1000\r\nno trailer here"),
            Err(SeqError::MalformedFile { .. })
        ));
    }

    #[test]
    fn mismatched_marker_length_rejected() {
        let analog = array![0.0, 0.0];
        let markers = array![0u8];
        assert!(matches!(
            encode_waveform(analog.view(), markers.view(), 1e9),
            Err(SeqError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn sequence_golden_text() {
        let rows = vec![
            SequenceRow {
                wf_ch1: "cool_element1_ch1.wfm".to_string(),
                wf_ch2: "cool_element1_ch2.wfm".to_string(),
                repetitions: 1,
                wait: true,
                goto_index: 0,
                jump_index: 0,
            },
            SequenceRow {
                wf_ch1: "cool_element2_ch1.wfm".to_string(),
                wf_ch2: "cool_element2_ch2.wfm".to_string(),
                repetitions: 5,
                wait: false,
                goto_index: 1,
                jump_index: 2,
            },
        ];
        let bytes = encode_sequence(&rows);
        let expect = "MAGIC 3002\r\n\
                      LINES 2\r\n\
                      \"cool_element1_ch1.wfm\",\"cool_element1_ch2.wfm\",1,1,0,0\r\n\
                      \"cool_element2_ch1.wfm\",\"cool_element2_ch2.wfm\",5,0,1,2\r\n";
        assert_eq!(bytes, expect.as_bytes());
    }
}
