//! Library surface for the edge capture/demodulation pipeline, shared by
//! the `adsb-feeder` binary and the `adsb-receiver` daemon.

pub mod capture;
pub mod pipeline;
