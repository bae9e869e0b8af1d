//! IQ-to-bits demodulation.
//!
//! Two independent code paths live here:
//! - [`demod2400`]: phase-tracking demodulator for 2.4 MHz sample streams
//!   (6 samples per 5 symbols), the primary path.
//! - [`demod2000`]: fixed-phase demodulator for 2.0 MHz sample streams, kept
//!   as a simpler reference path for sources that only produce 2 samples
//!   per symbol.

pub mod demod2000;
pub mod demod2400;

pub use demod2000::{
    bits_to_hex, check_preamble, demodulate_buffer, iq_to_magnitude, recover_bits,
    NoiseFloorTracker, LONG_MSG_BITS, SHORT_MSG_BITS, WINDOW_SIZE,
};
pub use demod2400::demodulate_2400;

/// A raw demodulated frame before CRC/parse validation.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub hex_str: String,
    pub timestamp: f64,
    pub signal_level: f32,
}
