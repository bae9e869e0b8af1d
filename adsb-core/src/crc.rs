//! CRC-24 validation for Mode S messages.
//!
//! ICAO standard polynomial: x^24 + x^23 + x^22 + ... + x^10 + x^3 + 1
//! Generator: 0xFFF409
//!
//! For DF17/18 (ADS-B): last 24 bits are pure CRC. Valid frames → remainder 0.
//! For DF0/4/5/16/20/21: last 24 bits are CRC XOR'd with ICAO address.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::types::{hex_decode, hex_encode, Icao};

const GENERATOR: u32 = 0xFFF409;

// ---------------------------------------------------------------------------
// CRC lookup table (compile-time)
// ---------------------------------------------------------------------------

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 16;
        let mut bit = 0;
        while bit < 8 {
            if crc & 0x800000 != 0 {
                crc = (crc << 1) ^ GENERATOR;
            } else {
                crc <<= 1;
            }
            crc &= 0xFFFFFF;
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = build_crc_table();

// ---------------------------------------------------------------------------
// Core CRC functions
// ---------------------------------------------------------------------------

/// Mode S CRC-24 check.
///
/// Polynomial division of the first (n-3) bytes, then XOR with the last 3
/// bytes (PI/CRC field).
///
/// - DF17/18: returns 0 when valid.
/// - DF0/4/5/16/20/21: returns ICAO address.
pub fn crc24(data: &[u8]) -> u32 {
    if data.len() <= 3 {
        let mut val = 0u32;
        for &b in data {
            val = (val << 8) | b as u32;
        }
        return val & 0xFFFFFF;
    }

    let payload_len = data.len() - 3;
    let mut crc = 0u32;

    for &byte in &data[..payload_len] {
        crc = ((crc << 8) ^ CRC_TABLE[((crc >> 16) ^ byte as u32) as usize & 0xFF]) & 0xFFFFFF;
    }

    // XOR with PI field (last 3 bytes)
    crc ^= (data[payload_len] as u32) << 16
        | (data[payload_len + 1] as u32) << 8
        | data[payload_len + 2] as u32;
    crc
}

/// Pure CRC-24 polynomial division of all bytes.
/// Used internally for syndrome table building.
fn crc24_raw(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &byte in data {
        crc = ((crc << 8) ^ CRC_TABLE[((crc >> 16) ^ byte as u32) as usize & 0xFF]) & 0xFFFFFF;
    }
    crc
}

/// Compute CRC-24 of payload bytes (all except last 3).
pub fn crc24_payload(data: &[u8]) -> u32 {
    if data.len() <= 3 {
        return 0;
    }
    crc24_raw(&data[..data.len() - 3])
}

/// Validate a Mode S message (hex string). Returns true if CRC remainder is 0.
pub fn validate(msg_hex: &str) -> bool {
    match hex_decode(msg_hex) {
        Some(data) => crc24(&data) == 0,
        None => false,
    }
}

/// Get CRC residual of a full message.
///
/// For DF17/18: returns 0 if valid.
/// For DF0/4/5/16/20/21: returns the ICAO address.
pub fn residual(msg_hex: &str) -> Option<u32> {
    hex_decode(msg_hex).map(|data| crc24(&data))
}

/// Extract ICAO address from a Mode S message hex string.
///
/// - DF11/17/18: ICAO is bytes 1-3 (explicit).
/// - DF0/4/5/16/20/21: ICAO recovered from CRC residual.
pub fn extract_icao(msg_hex: &str) -> Option<Icao> {
    let data = hex_decode(msg_hex)?;
    if data.is_empty() {
        return None;
    }
    let df = (data[0] >> 3) & 0x1F;

    match df {
        11 | 17 | 18 => {
            if data.len() < 4 {
                return None;
            }
            Some([data[1], data[2], data[3]])
        }
        0 | 4 | 5 | 16 | 20 | 21 => {
            let icao_val = crc24(&data);
            Some([
                ((icao_val >> 16) & 0xFF) as u8,
                ((icao_val >> 8) & 0xFF) as u8,
                (icao_val & 0xFF) as u8,
            ])
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Syndrome tables for error correction
// ---------------------------------------------------------------------------

/// Maps a syndrome to the bit positions that produce it, or `None` if two
/// different bit patterns produce the same syndrome (ambiguous — we cannot
/// tell which one actually happened, so refuse to correct it at all).
fn build_syndrome_table(n_bits: usize) -> HashMap<u32, Option<Vec<usize>>> {
    let n_bytes = n_bits / 8;
    let mut table: HashMap<u32, Option<Vec<usize>>> = HashMap::new();

    let mut record = |syndrome: u32, bits: Vec<usize>| {
        table
            .entry(syndrome)
            .and_modify(|existing| {
                if existing.as_ref() != Some(&bits) {
                    *existing = None;
                }
            })
            .or_insert(Some(bits));
    };

    // Single-bit errors
    for bit in 0..n_bits {
        let mut msg = vec![0u8; n_bytes];
        msg[bit / 8] |= 1 << (7 - (bit % 8));
        let syndrome = crc24(&msg);
        record(syndrome, vec![bit]);
    }

    // Double-bit errors
    for bit1 in 0..n_bits {
        for bit2 in (bit1 + 1)..n_bits {
            let mut msg = vec![0u8; n_bytes];
            msg[bit1 / 8] |= 1 << (7 - (bit1 % 8));
            msg[bit2 / 8] |= 1 << (7 - (bit2 % 8));
            let syndrome = crc24(&msg);
            record(syndrome, vec![bit1, bit2]);
        }
    }

    table
}

static SYNDROME_TABLE_112: LazyLock<HashMap<u32, Option<Vec<usize>>>> =
    LazyLock::new(|| build_syndrome_table(112));
static SYNDROME_TABLE_56: LazyLock<HashMap<u32, Option<Vec<usize>>>> =
    LazyLock::new(|| build_syndrome_table(56));

/// Attempt to correct bit errors in a Mode S message, bounded by
/// `max_bits` (0 disables correction, 1 allows single-bit fixes, 2 allows
/// up to double-bit fixes).
///
/// Looks up the CRC syndrome in pre-built tables. If found unambiguously,
/// flips the identified bits and re-validates. Never corrects bits 0-4 (DF
/// field) to avoid turning one message type into another, and refuses
/// syndromes with more than one distinct bit-flip explanation rather than
/// guessing.
///
/// Returns `(corrected hex string, bits flipped)` if fixable, `None`
/// otherwise.
pub fn try_fix(msg_hex: &str, max_bits: u8) -> Option<(String, u32)> {
    if max_bits == 0 {
        return None;
    }

    let data = hex_decode(msg_hex)?;
    let n_bits = data.len() * 8;
    let syndrome = crc24(&data);

    if syndrome == 0 {
        return Some((msg_hex.to_uppercase(), 0));
    }

    let table = if n_bits == 112 {
        &*SYNDROME_TABLE_112
    } else {
        &*SYNDROME_TABLE_56
    };

    let bit_positions = table.get(&syndrome)?.as_ref()?;

    if bit_positions.len() as u8 > max_bits {
        return None;
    }

    // Safety: never correct the DF field (bits 0-4)
    if bit_positions.iter().any(|&b| b < 5) {
        return None;
    }

    // Flip the identified bits
    let mut fixed = data;
    for &bit in bit_positions {
        fixed[bit / 8] ^= 1 << (7 - (bit % 8));
    }

    // Verify the fix actually works
    if crc24(&fixed) != 0 {
        return None;
    }

    Some((hex_encode(&fixed), bit_positions.len() as u32))
}

// ---------------------------------------------------------------------------
// Message scoring
// ---------------------------------------------------------------------------

/// Score a decoded message's trustworthiness: higher is better. A negative
/// score means "discard this candidate".
///
/// - DF17/18 with a clean CRC (no correction) score highest — these carry
///   their own address and need no external confirmation.
/// - DF11 with a clean CRC scores positively but lower — it confirms
///   presence but carries less data.
/// - Every corrected bit subtracts a penalty, since each one is a guess.
/// - DFs whose address had to be guessed from the CRC residual (no ICAO
///   filter hit) score negatively — the caller should treat this as
///   unreliable unless corroborated.
pub fn score_message(df: u8, corrected_bits: u32, requires_addr_guess: bool) -> i32 {
    if requires_addr_guess {
        return -10;
    }

    let base = match df {
        17 | 18 => 100,
        11 => 40,
        _ => 20,
    };

    base - (corrected_bits as i32) * 25
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
