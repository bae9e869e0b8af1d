//! 2.4 MHz phase-tracking Mode S demodulator.
//!
//! At 2.4 MHz we have exactly 6 samples per 5 symbols. Each symbol is 500ns
//! wide, each sample is 416.7ns wide. We maintain a phase offset expressed
//! in units of 1/5 of a sample, i.e. 1/6 of a symbol (83.333ns); each symbol
//! processed advances the phase offset by 6 (6/5 of a sample, 500ns).
//!
//! The slicer functions below correlate a 1-0 symbol pair (one Manchester
//! bit) starting at the given sample, assuming the symbol starts at a fixed
//! 0-5 phase offset within `m[0]`. They return a value generally
//! interpreted as `>0` = bit 1, `<0` = bit 0, `==0` = undecidable.
//!
//! The slicer outputs sum to zero, so no DC-offset correction is needed —
//! adding a constant to all of `m[0..3]` does not change the result.

use std::sync::OnceLock;

use super::RawFrame;

const LONG_MSG_BITS: usize = 112;
const LONG_MSG_BYTES: usize = LONG_MSG_BITS / 8;
/// Abandon a candidate once this many slicer decisions come back
/// undecidable (`test == 0`).
const MSG_ENCODER_ERRS: i32 = 3;

#[inline]
fn slice_phase0(m: &[u16]) -> i32 {
    5 * m[0] as i32 - 3 * m[1] as i32 - 2 * m[2] as i32
}
#[inline]
fn slice_phase1(m: &[u16]) -> i32 {
    4 * m[0] as i32 - m[1] as i32 - 3 * m[2] as i32
}
#[inline]
fn slice_phase2(m: &[u16]) -> i32 {
    3 * m[0] as i32 + m[1] as i32 - 4 * m[2] as i32
}
#[inline]
fn slice_phase3(m: &[u16]) -> i32 {
    2 * m[0] as i32 + 3 * m[1] as i32 - 5 * m[2] as i32
}
#[inline]
fn slice_phase4(m: &[u16]) -> i32 {
    m[0] as i32 + 5 * m[1] as i32 - 5 * m[2] as i32 - m[3] as i32
}

#[inline]
fn correlate_phase0(m: &[u16]) -> i32 {
    slice_phase0(m) * 26
}
#[inline]
fn correlate_phase1(m: &[u16]) -> i32 {
    slice_phase1(m) * 38
}
#[inline]
fn correlate_phase2(m: &[u16]) -> i32 {
    slice_phase2(m) * 38
}
#[inline]
fn correlate_phase3(m: &[u16]) -> i32 {
    slice_phase3(m) * 26
}
#[inline]
fn correlate_phase4(m: &[u16]) -> i32 {
    slice_phase4(m) * 19
}

// These work out the correlation quality for the 10 symbols (5 bits)
// starting at m[0] with a given phase offset — used to guess the right
// phase to decode with when phase-enhance trials are disabled.

fn correlate_check_0(m: &[u16]) -> i32 {
    correlate_phase0(&m[0..]).abs()
        + correlate_phase2(&m[2..]).abs()
        + correlate_phase4(&m[4..]).abs()
        + correlate_phase1(&m[7..]).abs()
        + correlate_phase3(&m[9..]).abs()
}
fn correlate_check_1(m: &[u16]) -> i32 {
    correlate_phase1(&m[0..]).abs()
        + correlate_phase3(&m[2..]).abs()
        + correlate_phase0(&m[5..]).abs()
        + correlate_phase2(&m[7..]).abs()
        + correlate_phase4(&m[9..]).abs()
}
fn correlate_check_2(m: &[u16]) -> i32 {
    correlate_phase2(&m[0..]).abs()
        + correlate_phase4(&m[2..]).abs()
        + correlate_phase1(&m[5..]).abs()
        + correlate_phase3(&m[7..]).abs()
        + correlate_phase0(&m[10..]).abs()
}
fn correlate_check_3(m: &[u16]) -> i32 {
    correlate_phase3(&m[0..]).abs()
        + correlate_phase0(&m[3..]).abs()
        + correlate_phase2(&m[5..]).abs()
        + correlate_phase4(&m[7..]).abs()
        + correlate_phase1(&m[10..]).abs()
}
fn correlate_check_4(m: &[u16]) -> i32 {
    correlate_phase4(&m[0..]).abs()
        + correlate_phase1(&m[3..]).abs()
        + correlate_phase3(&m[5..]).abs()
        + correlate_phase0(&m[8..]).abs()
        + correlate_phase2(&m[10..]).abs()
}

/// Work out the best phase offset (4..=8) to use for the given message, or
/// `None` if nothing beats the baseline (the sum of the first 6 samples).
///
/// Empirically, 4..8 is the best range to test: a wider range risks picking
/// the wrong phase for a message that would otherwise have decoded fine,
/// since the correlators can match well at a one-symbol/half-bit offset.
/// This is consistent with the peak detector, which produces the first data
/// symbol at phase offset 4..8.
fn best_phase(m: &[u16]) -> Option<i32> {
    let mut best = None;
    let mut bestval = m[0] as i32 + m[1] as i32 + m[2] as i32 + m[3] as i32 + m[4] as i32 + m[5] as i32;

    let test = correlate_check_4(&m[0..]);
    if test > bestval {
        bestval = test;
        best = Some(4);
    }
    let test = correlate_check_0(&m[1..]);
    if test > bestval {
        bestval = test;
        best = Some(5);
    }
    let test = correlate_check_1(&m[1..]);
    if test > bestval {
        bestval = test;
        best = Some(6);
    }
    let test = correlate_check_2(&m[1..]);
    if test > bestval {
        bestval = test;
        best = Some(7);
    }
    let test = correlate_check_3(&m[1..]);
    if test > bestval {
        best = Some(8);
    }
    best
}

/// 65536-entry `log10(x) * 100` lookup, in the same 0.2 dB units the
/// original SNR computation uses (`5 * 20*log10(sig/noise)`, expanded to
/// `100*log10(sig) - 100*log10(noise)`).
fn log10_lut() -> &'static [i32; 65536] {
    static LUT: OnceLock<Box<[i32; 65536]>> = OnceLock::new();
    LUT.get_or_init(|| {
        let mut table = Box::new([0i32; 65536]);
        for (i, slot) in table.iter_mut().enumerate() {
            let v = if i == 0 { 0.0 } else { (i as f64).log10() };
            *slot = (v * 100.0).round() as i32;
        }
        table
    })
}

/// A candidate decode's outcome, used internally to track the best-scoring
/// phase trial for a given preamble position.
struct Candidate {
    bytes: [u8; LONG_MSG_BYTES],
    score: i32,
    phase: i32,
    snr: i32,
}

/// Plausibility score for a just-decoded candidate message. This does not
/// check the CRC (that happens later, in the frame/CRC layer) — it only
/// rejects candidates whose downlink format is not one of the known types,
/// since those are almost always leftover noise rather than a real message
/// that simply failed its CRC. Returns `-1` to mean "reject", matching the
/// sentinel the original phase-trial loop used.
fn score_candidate(bytes: &[u8]) -> i32 {
    let df = bytes[0] >> 3;
    match df {
        0 | 4 | 5 | 11 | 16 | 17 | 18 | 19 | 20 | 21 | 24..=31 => 1,
        _ => -1,
    }
}

/// Downlink-format-dependent message length in bits: DF16-21 (and the
/// extended squitter DFs) are long (112 bits), everything else recognized
/// is short (56 bits).
fn msg_len_by_df(df: u8) -> usize {
    match df {
        16 | 17 | 18 | 19 | 20 | 21 | 24..=31 => 112,
        _ => 56,
    }
}

/// Scan a magnitude buffer (u16 samples from [`crate::convert::Converter`])
/// for Mode S messages at 2.4 MHz, returning one [`RawFrame`] per accepted
/// candidate with its best phase/SNR already applied.
///
/// `phase_enhance` controls whether every phase 4..=8 is tried per preamble
/// (more CPU, recovers more marginal messages) or only the phase the
/// cross-correlation in [`best_phase`] guesses (cheaper).
pub fn demodulate_2400(m: &[u16], timestamp: f64, phase_enhance: bool) -> Vec<RawFrame> {
    let lut = log10_lut();
    let mlen = m.len();
    let mut frames = Vec::new();
    let mut j = 0usize;

    while j + 19 + 112 * 2 < mlen {
        let preamble = &m[j..];
        if preamble.len() < 19 {
            break;
        }

        // Quick check: rising edge 0->1, falling edge 12->13.
        if !(preamble[0] < preamble[1] && preamble[12] > preamble[13]) {
            j += 1;
            continue;
        }

        let high: u32;
        let base_signal: u32;
        let base_noise: u32;

        if preamble[1] > preamble[2]
            && preamble[2] < preamble[3]
            && preamble[3] > preamble[4]
            && preamble[8] < preamble[9]
            && preamble[9] > preamble[10]
            && preamble[10] < preamble[11]
        {
            // phase 3
            high = (preamble[1] as u32 + preamble[3] as u32 + preamble[9] as u32 + preamble[11] as u32 + preamble[12] as u32) / 4;
            base_signal = preamble[1] as u32 + preamble[3] as u32 + preamble[9] as u32;
            base_noise = preamble[5] as u32 + preamble[6] as u32 + preamble[7] as u32;
        } else if preamble[1] > preamble[2]
            && preamble[2] < preamble[3]
            && preamble[3] > preamble[4]
            && preamble[8] < preamble[9]
            && preamble[9] > preamble[10]
            && preamble[11] < preamble[12]
        {
            // phase 4
            high = (preamble[1] as u32 + preamble[3] as u32 + preamble[9] as u32 + preamble[12] as u32) / 4;
            base_signal = preamble[1] as u32 + preamble[3] as u32 + preamble[9] as u32 + preamble[12] as u32;
            base_noise = preamble[5] as u32 + preamble[6] as u32 + preamble[7] as u32 + preamble[8] as u32;
        } else if preamble[1] > preamble[2]
            && preamble[2] < preamble[3]
            && preamble[4] > preamble[5]
            && preamble[8] < preamble[9]
            && preamble[10] > preamble[11]
            && preamble[11] < preamble[12]
        {
            // phase 5
            high = (preamble[1] as u32 + preamble[3] as u32 + preamble[4] as u32 + preamble[9] as u32 + preamble[10] as u32 + preamble[12] as u32) / 4;
            base_signal = preamble[1] as u32 + preamble[12] as u32;
            base_noise = preamble[6] as u32 + preamble[7] as u32;
        } else if preamble[1] > preamble[2]
            && preamble[3] < preamble[4]
            && preamble[4] > preamble[5]
            && preamble[9] < preamble[10]
            && preamble[10] > preamble[11]
            && preamble[11] < preamble[12]
        {
            // phase 6
            high = (preamble[1] as u32 + preamble[4] as u32 + preamble[10] as u32 + preamble[12] as u32) / 4;
            base_signal = preamble[1] as u32 + preamble[4] as u32 + preamble[10] as u32 + preamble[12] as u32;
            base_noise = preamble[5] as u32 + preamble[6] as u32 + preamble[7] as u32 + preamble[8] as u32;
        } else if preamble[2] > preamble[3]
            && preamble[3] < preamble[4]
            && preamble[4] > preamble[5]
            && preamble[9] < preamble[10]
            && preamble[10] > preamble[11]
            && preamble[11] < preamble[12]
        {
            // phase 7
            high = (preamble[1] as u32 + preamble[2] as u32 + preamble[4] as u32 + preamble[10] as u32 + preamble[12] as u32) / 4;
            base_signal = preamble[4] as u32 + preamble[10] as u32 + preamble[12] as u32;
            base_noise = preamble[6] as u32 + preamble[7] as u32 + preamble[8] as u32;
        } else {
            j += 1;
            continue;
        }

        // ~3.5 dB minimum SNR.
        if base_signal * 2 < 3 * base_noise {
            j += 1;
            continue;
        }

        // Quiet-zone bits must be below `high`.
        let quiet_ok = preamble[5] < high
            && preamble[6] < high
            && preamble[7] < high
            && preamble[8] < high
            && preamble[14] < high
            && preamble[15] < high
            && preamble[16] < high
            && preamble[17] < high
            && preamble[18] < high;
        if !quiet_ok {
            j += 1;
            continue;
        }

        let (first_phase, last_phase) = if phase_enhance {
            (4, 8)
        } else {
            match best_phase(&preamble[19..]) {
                Some(p) => (p, p),
                None => {
                    j += 1;
                    continue;
                }
            }
        };

        let mut best: Option<Candidate> = None;

        for try_phase in first_phase..=last_phase {
            let mut sig_level = base_signal as i64;
            let mut noise_level = base_noise as i64;
            let mut bytes = [0u8; LONG_MSG_BYTES];
            let mut byte_idx = 0usize;
            let mut the_byte: u8 = 0;
            let mut errors = 0i32;

            let mut phase = try_phase % 5;
            let mut p_off = 19 + (try_phase / 5) as usize;

            let mut i = 0usize;
            while i < LONG_MSG_BITS && errors < MSG_ENCODER_ERRS {
                if j + p_off + 4 >= mlen {
                    break;
                }
                let p_ptr = &m[j + p_off..];
                let test = match phase {
                    0 => {
                        let t = slice_phase0(p_ptr);
                        phase = 2;
                        p_off += 2;
                        t
                    }
                    1 => {
                        let t = slice_phase1(p_ptr);
                        phase = 3;
                        p_off += 2;
                        t
                    }
                    2 => {
                        let t = slice_phase2(p_ptr);
                        phase = 4;
                        p_off += 2;
                        t
                    }
                    3 => {
                        let t = slice_phase3(p_ptr);
                        phase = 0;
                        p_off += 3;
                        t
                    }
                    4 => {
                        let t = slice_phase4(p_ptr);
                        // A phase-4 bit straddles a sample boundary: one of
                        // p_ptr[1]/p_ptr[2] carries signal, the other noise.
                        if t < 0 {
                            noise_level += p_ptr[1] as i64;
                            sig_level += p_ptr[2] as i64;
                        } else {
                            sig_level += p_ptr[1] as i64;
                            noise_level += p_ptr[2] as i64;
                        }
                        phase = 1;
                        p_off += 3;
                        t
                    }
                    _ => 0,
                };

                if test > 0 {
                    the_byte |= 1;
                } else if test == 0 {
                    errors += 1;
                }

                if i & 7 == 7 {
                    bytes[byte_idx] = the_byte;
                    byte_idx += 1;
                    the_byte = 0;
                } else {
                    the_byte <<= 1;
                }
                i += 1;
            }

            if i < LONG_MSG_BITS {
                // aborted early (ran off the end of the buffer or too many errors)
                continue;
            }

            let mut score = score_candidate(&bytes);
            if score < 0 {
                continue;
            }

            while sig_level > 65535 || noise_level > 65535 {
                sig_level >>= 1;
                noise_level >>= 1;
            }
            let snr = lut[sig_level as usize] - lut[noise_level as usize];
            score += snr;

            let better = match &best {
                None => true,
                Some(b) => score > b.score,
            };
            if better {
                best = Some(Candidate {
                    bytes,
                    score,
                    phase: try_phase,
                    snr,
                });
            }
        }

        let Some(best) = best else {
            j += 1;
            continue;
        };

        let df = best.bytes[0] >> 3;
        let msglen_bits = msg_len_by_df(df);
        let msglen_bytes = msglen_bits / 8;
        let hex_str: String = best.bytes[..msglen_bytes]
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect();

        // Timestamp in 12 MHz-tick resolution: each 2.4 MHz sample is 5
        // ticks, and `phase` is already in units of 1/5 sample (1 tick).
        let ticks = j as f64 * 5.0 + best.phase as f64;
        let frame_time = timestamp + ticks / 12_000_000.0;

        frames.push(RawFrame {
            hex_str,
            timestamp: frame_time,
            signal_level: best.snr.clamp(0, 255) as f32,
        });

        // Skip to 8 bits before the end of the message: a second message's
        // preamble can clobber the tail of this one without the bits
        // actually overlapping, so don't skip the full length.
        j += (8 + msglen_bits - 8) * 12 / 5 - 1;
    }

    frames
}
