//! Shared types, error enum, and decoded message types for adsb-core.

use serde::Serialize;
use thiserror::Error;

/// All errors produced by adsb-core.
#[derive(Debug, Error)]
pub enum AdsbError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    #[error("invalid frame length: expected {expected} bits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("unrecognized downlink format: {0}")]
    UnknownDf(u8),
    #[error("CRC validation failed")]
    CrcFailed,
    #[error("CRC syndrome is ambiguous, refusing to guess a correction")]
    CrcAmbiguous,
    #[error("CPR decode failed: {0}")]
    CprFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("no converter available for format {format:?} (filter_dc={filter_dc}, compute_power={compute_power})")]
    UnsupportedFormat {
        format: String,
        filter_dc: bool,
        compute_power: bool,
    },
    #[error("buffer dropped: {0}")]
    Dropped(String),
}

pub type Result<T> = std::result::Result<T, AdsbError>;

// ---------------------------------------------------------------------------
// Downlink Format metadata
// ---------------------------------------------------------------------------

/// Metadata for a Downlink Format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfInfo {
    pub name: &'static str,
    pub bits: usize,
}

/// Known Downlink Format table.
pub const DF_TABLE: &[(u8, DfInfo)] = &[
    (
        0,
        DfInfo {
            name: "Short air-air surveillance",
            bits: 56,
        },
    ),
    (
        4,
        DfInfo {
            name: "Surveillance altitude reply",
            bits: 56,
        },
    ),
    (
        5,
        DfInfo {
            name: "Surveillance identity reply",
            bits: 56,
        },
    ),
    (
        11,
        DfInfo {
            name: "All-call reply",
            bits: 56,
        },
    ),
    (
        16,
        DfInfo {
            name: "Long air-air surveillance",
            bits: 112,
        },
    ),
    (
        17,
        DfInfo {
            name: "ADS-B extended squitter",
            bits: 112,
        },
    ),
    (
        18,
        DfInfo {
            name: "TIS-B / ADS-R",
            bits: 112,
        },
    ),
    (
        20,
        DfInfo {
            name: "Comm-B altitude reply",
            bits: 112,
        },
    ),
    (
        21,
        DfInfo {
            name: "Comm-B identity reply",
            bits: 112,
        },
    ),
];

/// Look up DF metadata. Returns `None` for unrecognized DFs.
pub fn df_info(df: u8) -> Option<&'static DfInfo> {
    DF_TABLE
        .iter()
        .find(|(d, _)| *d == df)
        .map(|(_, info)| info)
}

// ---------------------------------------------------------------------------
// ICAO address helpers
// ---------------------------------------------------------------------------

/// 3-byte ICAO address. Stored as raw bytes to avoid per-frame String allocation.
pub type Icao = [u8; 3];

/// Format ICAO address as 6-char uppercase hex string.
pub fn icao_to_string(icao: &Icao) -> String {
    format!("{:02X}{:02X}{:02X}", icao[0], icao[1], icao[2])
}

/// Parse a 6-char hex string into an ICAO address.
pub fn icao_from_hex(hex: &str) -> Option<Icao> {
    if hex.len() != 6 {
        return None;
    }
    let val = u32::from_str_radix(hex, 16).ok()?;
    Some([
        ((val >> 16) & 0xFF) as u8,
        ((val >> 8) & 0xFF) as u8,
        (val & 0xFF) as u8,
    ])
}

// ---------------------------------------------------------------------------
// Data source priority
// ---------------------------------------------------------------------------

/// Priority of the transport a field update arrived on.
///
/// Ordering matters: a lower-priority update only overwrites a held field
/// once the held value has gone stale (see [`crate::tracker`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Source {
    Invalid,
    Mlat,
    ModeS,
    ModeSChecked,
    Tisb,
    Adsb,
}

/// Convert ICAO bytes to u32 for numeric comparisons.
pub fn icao_to_u32(icao: &Icao) -> u32 {
    ((icao[0] as u32) << 16) | ((icao[1] as u32) << 8) | (icao[2] as u32)
}

/// Build ICAO from a 24-bit integer.
pub fn icao_from_u32(val: u32) -> Icao {
    [
        ((val >> 16) & 0xFF) as u8,
        ((val >> 8) & 0xFF) as u8,
        (val & 0xFF) as u8,
    ]
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Decode a hex string into bytes. Case-insensitive, must be even length.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if !hex.len().is_multiple_of(2) {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let high = hex_digit(chunk[0])?;
        let low = hex_digit(chunk[1])?;
        bytes.push((high << 4) | low);
    }
    Some(bytes)
}

/// Encode bytes as uppercase hex string.
pub fn hex_encode(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for &b in data {
        s.push(HEX_CHARS[(b >> 4) as usize] as char);
        s.push(HEX_CHARS[(b & 0x0F) as usize] as char);
    }
    s
}

const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ADS-B callsign character set
// ---------------------------------------------------------------------------

/// ADS-B character set for callsign encoding (6 bits per character).
pub const CALLSIGN_CHARSET: &[u8; 64] =
    b"#ABCDEFGHIJKLMNOPQRSTUVWXYZ##### ###############0123456789######";

// ---------------------------------------------------------------------------
// Decoded message types
// ---------------------------------------------------------------------------

/// TC 1-4: Aircraft identification (callsign).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentificationMsg {
    pub icao: Icao,
    pub callsign: String,
    pub category: u8,
    pub timestamp: f64,
}

/// TC 5-8 (surface) or TC 9-18/20-22 (airborne): CPR-encoded position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionMsg {
    pub icao: Icao,
    pub altitude_ft: Option<i32>,
    pub cpr_lat: u32,
    pub cpr_lon: u32,
    pub cpr_odd: bool,
    pub surveillance_status: u8,
    pub timestamp: f64,
    pub is_surface: bool,
    /// Navigation Integrity Category, estimated from the type code alone
    /// (no opstatus supplement bits applied).
    pub nic: u8,
    /// Radius of containment in meters for `nic` ([`RC_UNKNOWN`] if the
    /// type code gives no bound).
    pub rc: u32,
}

/// Sentinel for an unknown containment radius (mirrors dump1090's `RC_UNKNOWN`).
pub const RC_UNKNOWN: u32 = 0;

/// Coarse NIC/Rc estimate from the CPR type code alone (DO-260B Table 2-14),
/// before any opstatus NIC-supplement refinement.
pub fn nic_from_type_code(tc: u8) -> (u8, u32) {
    match tc {
        0 | 8 | 18 | 22 => (0, RC_UNKNOWN),
        9 | 20 => (11, 8),
        10 | 21 => (10, 25),
        11 => (9, 93), // ambiguous without nic_a/nic_b supplement; coarse default
        12 => (8, 185),
        13 => (7, 370), // ambiguous without supplement; coarse default
        14 => (6, 926),
        15 => (5, 1852),
        16 => (4, 3704), // ambiguous without supplement; coarse default
        17 => (3, 7408),
        5 => (11, 8),
        6 => (10, 25),
        7 => (8, 185),
        _ => (0, RC_UNKNOWN),
    }
}

/// TC 19: Airborne velocity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VelocityMsg {
    pub icao: Icao,
    pub speed_kts: Option<f64>,
    pub heading_deg: Option<f64>,
    pub vertical_rate_fpm: Option<i32>,
    pub speed_type: SpeedType,
    pub timestamp: f64,
}

/// Speed type for velocity messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpeedType {
    Ground,
    IAS,
    TAS,
}

impl std::fmt::Display for SpeedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeedType::Ground => write!(f, "ground"),
            SpeedType::IAS => write!(f, "IAS"),
            SpeedType::TAS => write!(f, "TAS"),
        }
    }
}

/// DF0/4/16/20: Altitude reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AltitudeMsg {
    pub icao: Icao,
    pub altitude_ft: Option<i32>,
    pub timestamp: f64,
}

/// DF5/21: Identity reply (squawk code).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SquawkMsg {
    pub icao: Icao,
    pub squawk: String,
    pub timestamp: f64,
}

/// DF11: All-call reply. The first Mode S message that establishes an
/// ICAO address with a clean (or corrected) CRC — spec.md §3's Aircraft
/// lifecycle names this alongside unrestricted DF17/DF18 as a creation
/// trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllCallMsg {
    pub icao: Icao,
    /// Capability (CA) field, bits 6-8 of byte 0.
    pub capability: u8,
    pub timestamp: f64,
}

/// TC 31: Aircraft operational status.
///
/// Carries the integrity/accuracy supplement fields (`track.h`'s
/// `nic_a`/`nic_baro`/`nac_p`/`sil`) that [`nic_from_type_code`]'s coarse
/// table can't refine — a real tracker layers this on top of the position
/// message's type-code-only NIC estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpStatusMsg {
    pub icao: Icao,
    /// Subtype 1 (surface) vs subtype 0 (airborne).
    pub surface: bool,
    /// ADS-B version number (0, 1, or 2).
    pub adsb_version: u8,
    pub nic_supplement_a: bool,
    pub nac_p: u8,
    pub nic_baro: bool,
    pub sil: u8,
    pub timestamp: f64,
}

/// TC 29: Target state and status (MCP/FCU selected altitude and heading,
/// autopilot mode bits).
///
/// Only subtype 1 ("Target State and Status") is decoded; subtype 0 is
/// reserved by DO-260B and has no defined fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStateMsg {
    pub icao: Icao,
    pub selected_altitude_ft: Option<i32>,
    /// Barometric pressure setting in millibars, when the MCP/FCU altitude
    /// source supplies one.
    pub barometric_setting_mb: Option<f64>,
    pub selected_heading_deg: Option<f64>,
    pub nac_p: u8,
    pub nic_baro: bool,
    pub sil: u8,
    pub autopilot_engaged: bool,
    pub vnav_engaged: bool,
    pub altitude_hold_engaged: bool,
    pub approach_mode: bool,
    pub tcas_operational: bool,
    pub timestamp: f64,
}

/// Union type for all decoded messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum DecodedMsg {
    Identification(IdentificationMsg),
    Position(PositionMsg),
    Velocity(VelocityMsg),
    Altitude(AltitudeMsg),
    Squawk(SquawkMsg),
    OpStatus(OpStatusMsg),
    TargetState(TargetStateMsg),
    AllCall(AllCallMsg),
}

impl DecodedMsg {
    /// Get the ICAO address from any message type.
    pub fn icao(&self) -> &Icao {
        match self {
            DecodedMsg::Identification(m) => &m.icao,
            DecodedMsg::Position(m) => &m.icao,
            DecodedMsg::Velocity(m) => &m.icao,
            DecodedMsg::Altitude(m) => &m.icao,
            DecodedMsg::Squawk(m) => &m.icao,
            DecodedMsg::OpStatus(m) => &m.icao,
            DecodedMsg::TargetState(m) => &m.icao,
            DecodedMsg::AllCall(m) => &m.icao,
        }
    }

    /// Get the timestamp from any message type.
    pub fn timestamp(&self) -> f64 {
        match self {
            DecodedMsg::Identification(m) => m.timestamp,
            DecodedMsg::Position(m) => m.timestamp,
            DecodedMsg::Velocity(m) => m.timestamp,
            DecodedMsg::Altitude(m) => m.timestamp,
            DecodedMsg::Squawk(m) => m.timestamp,
            DecodedMsg::OpStatus(m) => m.timestamp,
            DecodedMsg::TargetState(m) => m.timestamp,
            DecodedMsg::AllCall(m) => m.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
