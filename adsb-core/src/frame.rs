//! Parse raw hex strings into structured Mode S frames.
//!
//! Responsibilities:
//! - Classify Downlink Format (DF) from first 5 bits
//! - Extract ICAO address (bytes 1-3 for DF11/17/18, or from CRC residual)
//! - Package into `ModeFrame`
//! - Reject frames that fail CRC validation
//! - Attempt bit error correction (bounded by `nfix_crc`) on CRC failures
//! - Validate residual-recovered ICAOs against the [`IcaoFilter`]

use crate::crc;
use crate::icao_filter::IcaoFilter;
use crate::types::{df_info, hex_decode, Icao, Source};

// DFs where ICAO is explicit in bytes 1-3
const DF_EXPLICIT_ICAO: &[u8] = &[11, 17, 18];

// DFs where ICAO is recovered from CRC residual
const DF_RESIDUAL_ICAO: &[u8] = &[0, 4, 5, 16, 20, 21];

// ---------------------------------------------------------------------------
// ModeFrame
// ---------------------------------------------------------------------------

/// A parsed Mode S frame.
#[derive(Debug, Clone)]
pub struct ModeFrame {
    /// Downlink Format (0-24)
    pub df: u8,
    /// 3-byte ICAO address
    pub icao: Icao,
    /// Full message bytes
    pub raw: Vec<u8>,
    /// Unix timestamp
    pub timestamp: f64,
    /// Signal strength if available
    pub signal_level: Option<f64>,
    /// Message length in bits (56 or 112)
    pub msg_bits: usize,
    /// CRC validation passed
    pub crc_ok: bool,
    /// True if error correction was applied
    pub corrected: bool,
    /// Number of bits [`crc::try_fix`] flipped to reach a clean CRC (0 if
    /// `corrected` is false).
    pub corrected_bits: u32,
}

impl ModeFrame {
    /// Human-readable Downlink Format name.
    pub fn df_name(&self) -> &'static str {
        df_info(self.df)
            .map(|info| info.name)
            .unwrap_or("Unknown")
    }

    /// True if this is an ADS-B extended squitter (DF17).
    pub fn is_adsb(&self) -> bool {
        self.df == 17
    }

    /// True if this is a 112-bit (long) message.
    pub fn is_long(&self) -> bool {
        self.msg_bits == 112
    }

    /// Message Extended field (bytes 4-10, 56 bits) for DF17/18.
    /// Returns empty slice for short frames.
    pub fn me(&self) -> &[u8] {
        if self.is_long() && self.raw.len() >= 11 {
            &self.raw[4..11]
        } else {
            &[]
        }
    }

    /// ADS-B Type Code (first 5 bits of ME field). None for non-ADS-B.
    pub fn type_code(&self) -> Option<u8> {
        if (self.df != 17 && self.df != 18) || !self.is_long() {
            return None;
        }
        if self.raw.len() < 5 {
            return None;
        }
        Some((self.raw[4] >> 3) & 0x1F)
    }

    /// Priority source this message counts as for the tracker's field
    /// acceptance rule (spec.md §3/§4.G).
    ///
    /// DF17 is a genuine ADS-B extended squitter. DF18 carries TIS-B/ADS-R
    /// traffic relayed by a ground station. Anything else arrived over the
    /// Mode S link proper; `ModeSChecked` marks a frame whose ICAO address
    /// was independently verified (clean CRC, or residual-ICAO matched
    /// against the [`IcaoFilter`]) rather than merely assumed.
    pub fn source(&self) -> Source {
        match self.df {
            17 => Source::Adsb,
            18 => Source::Tisb,
            11 => {
                if self.crc_ok && self.corrected_bits == 0 {
                    Source::ModeSChecked
                } else {
                    Source::ModeS
                }
            }
            _ => Source::ModeSChecked,
        }
    }
}

// ---------------------------------------------------------------------------
// Frame parsing
// ---------------------------------------------------------------------------

/// Parse a hex string into a ModeFrame.
///
/// `validate_icao`: if true, reject residual-recovered ICAOs not in the
/// filter. `nfix_crc` bounds how many bits [`crc::try_fix`] may repair (0
/// disables correction entirely).
pub fn parse_frame(
    hex_str: &str,
    timestamp: f64,
    signal_level: Option<f64>,
    validate_icao: bool,
    nfix_crc: u8,
    icao_filter: &mut IcaoFilter,
) -> Option<ModeFrame> {
    let hex_str = hex_str.trim();

    // Validate length: 14 hex chars (56 bits) or 28 hex chars (112 bits)
    if hex_str.len() != 14 && hex_str.len() != 28 {
        return None;
    }

    let raw = hex_decode(hex_str)?;
    let msg_bits = raw.len() * 8;
    let df = (raw[0] >> 3) & 0x1F;

    // Check if DF is recognized
    let info = df_info(df)?;

    // Validate message length matches expected for this DF
    if msg_bits != info.bits {
        return None;
    }

    let crc_remainder = crc::crc24(&raw);
    let mut corrected = false;
    let mut corrected_bits = 0u32;
    let mut raw = raw;

    // Extract ICAO address
    let (icao, crc_ok) = if DF_EXPLICIT_ICAO.contains(&df) {
        let mut crc_ok = crc_remainder == 0;

        // Attempt error correction for DF17/18 if CRC fails
        if !crc_ok && (df == 17 || df == 18) && nfix_crc > 0 {
            let hex_upper = hex_str.to_uppercase();
            if let Some((fixed_hex, n_bits)) = crc::try_fix(&hex_upper, nfix_crc) {
                if let Some(fixed_raw) = hex_decode(&fixed_hex) {
                    raw = fixed_raw;
                    crc_ok = true;
                    corrected = true;
                    corrected_bits = n_bits;
                }
            }
        }

        // Extract ICAO (possibly from corrected raw bytes)
        let icao: Icao = [raw[1], raw[2], raw[3]];
        if crc_ok && validate_icao {
            icao_filter.register(icao, timestamp);
        }
        (icao, crc_ok)
    } else if DF_RESIDUAL_ICAO.contains(&df) {
        let icao: Icao = [
            ((crc_remainder >> 16) & 0xFF) as u8,
            ((crc_remainder >> 8) & 0xFF) as u8,
            (crc_remainder & 0xFF) as u8,
        ];

        // Validate against the ICAO filter if enabled
        if validate_icao && !icao_filter.is_known(&icao, timestamp) {
            return None;
        }

        (icao, true)
    } else {
        return None;
    };

    Some(ModeFrame {
        df,
        icao,
        raw,
        timestamp,
        signal_level,
        msg_bits,
        crc_ok,
        corrected,
        corrected_bits,
    })
}

/// Parse a hex string without ICAO filter validation, using the default
/// `nfix_crc` of 1. Convenience for decoding standalone frames (e.g., from
/// test vectors).
pub fn parse_frame_uncached(
    hex_str: &str,
    timestamp: f64,
    signal_level: Option<f64>,
) -> Option<ModeFrame> {
    let mut filter = IcaoFilter::new(60.0);
    parse_frame(hex_str, timestamp, signal_level, false, 1, &mut filter)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{hex_decode, hex_encode, icao_to_string};

    #[test]
    fn test_parse_df17_identification() {
        let frame = parse_frame_uncached("8D4840D6202CC371C32CE0576098", 1.0, None);
        assert!(frame.is_some());
        let frame = frame.unwrap();
        assert_eq!(frame.df, 17);
        assert_eq!(icao_to_string(&frame.icao), "4840D6");
        assert!(frame.crc_ok);
        assert!(!frame.corrected);
        assert_eq!(frame.msg_bits, 112);
        assert!(frame.is_adsb());
        assert!(frame.is_long());
    }

    #[test]
    fn test_parse_df17_position() {
        let frame =
            parse_frame_uncached("8D40621D58C382D690C8AC2863A7", 1.0, None).unwrap();
        assert_eq!(frame.df, 17);
        assert_eq!(icao_to_string(&frame.icao), "40621D");
        assert!(frame.crc_ok);

        // TC should be 11 (airborne position with barometric altitude)
        let tc = frame.type_code().unwrap();
        assert!(tc >= 9 && tc <= 18, "TC={tc} should be airborne position");
    }

    #[test]
    fn test_parse_df17_velocity() {
        let frame =
            parse_frame_uncached("8D485020994409940838175B284F", 1.0, None).unwrap();
        assert_eq!(frame.df, 17);
        assert_eq!(icao_to_string(&frame.icao), "485020");
        assert_eq!(frame.type_code(), Some(19));
    }

    #[test]
    fn test_parse_invalid_length() {
        assert!(parse_frame_uncached("8D4840D6", 0.0, None).is_none());
        assert!(parse_frame_uncached("", 0.0, None).is_none());
    }

    #[test]
    fn test_parse_invalid_hex() {
        assert!(parse_frame_uncached("ZZZZZZZZZZZZZZ", 0.0, None).is_none());
    }

    #[test]
    fn test_me_field() {
        let frame =
            parse_frame_uncached("8D4840D6202CC371C32CE0576098", 1.0, None).unwrap();
        let me = frame.me();
        assert_eq!(me.len(), 7); // 56 bits = 7 bytes
    }

    #[test]
    fn test_type_code_identification() {
        let frame =
            parse_frame_uncached("8D4840D6202CC371C32CE0576098", 1.0, None).unwrap();
        let tc = frame.type_code().unwrap();
        assert!(tc >= 1 && tc <= 4, "TC={tc} should be identification");
    }

    #[test]
    fn test_parse_with_icao_validation() {
        let mut filter = IcaoFilter::new(60.0);

        // DF17 should succeed without prior filter entry (explicit ICAO)
        let frame = parse_frame(
            "8D4840D6202CC371C32CE0576098",
            1.0,
            None,
            true,
            1,
            &mut filter,
        );
        assert!(frame.is_some());

        // ICAO should now be known to the filter
        assert!(filter.is_known(&[0x48, 0x40, 0xD6], 2.0));
    }

    #[test]
    fn test_error_correction() {
        // Corrupt a bit in a valid frame (bit 40, well past DF field)
        let mut data = hex_decode("8D4840D6202CC371C32CE0576098").unwrap();
        data[5] ^= 0x01;
        let corrupted = hex_encode(&data);

        let frame = parse_frame_uncached(&corrupted, 1.0, None);
        assert!(frame.is_some(), "Error correction should fix single-bit error");
        let frame = frame.unwrap();
        assert!(frame.crc_ok);
        assert!(frame.corrected);
    }
}
