//! adsb-feeder: Edge device binary for ADS-B capture and demodulation.
//!
//! Supports:
//! - Demodulating raw IQ files into hex frames (2.0 MHz reference or 2.4 MHz
//!   phase-tracking demodulator)
//! - Reading pre-decoded hex frame files
//!
//! Live RTL-SDR capture will be added with `rtlsdr_mt` integration.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;

use adsb_core::convert::Format;
use adsb_core::frame;
use adsb_core::icao_filter::IcaoFilter;
use adsb_core::decode;

use adsb_feeder::{capture, pipeline};

#[derive(Parser)]
#[command(
    name = "adsb-feeder",
    version,
    about = "ADS-B capture and demodulation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Demodulate a raw IQ file into ADS-B frames
    Demod {
        /// Path to raw IQ binary file (.iq or .bin)
        file: PathBuf,

        /// Sample rate in Hz
        #[arg(long, default_value = "2000000")]
        sample_rate: u32,

        /// Parse and decode frames (not just print hex)
        #[arg(short, long)]
        decode: bool,

        /// Maximum bits of CRC error correction to attempt (0 disables)
        #[arg(long, default_value = "1")]
        nfix_crc: u8,
    },
    /// Run the Reader/Demodulator/Background pipeline over a raw UC8 IQ file
    Capture {
        /// Path to raw IQ binary file (interleaved unsigned 8-bit I/Q)
        file: PathBuf,

        /// Sample rate in Hz (pipeline assumes 2.4 MSps framing)
        #[arg(long, default_value = "2400000")]
        sample_rate: u32,

        /// Sample format: uc8, sc16, or sc16q11
        #[arg(long, default_value = "uc8")]
        format: String,

        /// Maximum bits of CRC error correction to attempt (0 disables)
        #[arg(long, default_value = "1")]
        nfix_crc: u8,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Demod {
            file,
            sample_rate,
            decode: do_decode,
            nfix_crc,
        } => cmd_demod(file, sample_rate, do_decode, nfix_crc),
        Commands::Capture {
            file,
            sample_rate,
            format,
            nfix_crc,
        } => cmd_capture(file, sample_rate, &format, nfix_crc),
    }
}

fn cmd_demod(file: PathBuf, sample_rate: u32, do_decode: bool, nfix_crc: u8) {
    let path_str = file.display().to_string();
    let reader = capture::IQReader::new(&path_str, sample_rate);

    let duration = reader.duration_seconds().unwrap_or(0.0);
    let n_samples = reader.n_samples().unwrap_or(0);

    info!(
        "demodulating {} ({} samples, {:.1}s at {} Hz)",
        file.display(),
        n_samples,
        duration,
        sample_rate
    );

    let frames = match reader.demodulate() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    info!("found {} raw frames", frames.len());

    if do_decode {
        let mut icao_filter = IcaoFilter::new(60.0);
        let mut decoded_count = 0u64;

        for raw in &frames {
            let parsed = frame::parse_frame(
                &raw.hex_str,
                raw.timestamp,
                None,
                false,
                nfix_crc,
                &mut icao_filter,
            );
            if let Some(f) = parsed {
                if let Some(msg) = decode::decode(&f) {
                    decoded_count += 1;
                    println!("{:.6} {}", raw.timestamp, raw.hex_str);
                    println!("  {:?}", msg);
                }
            }
        }
        info!("{decoded_count} decoded messages");
    } else {
        for raw in &frames {
            println!(
                "{:.6} {} signal={:.0}",
                raw.timestamp, raw.hex_str, raw.signal_level
            );
        }
    }
}

fn cmd_capture(file: PathBuf, sample_rate: u32, format: &str, nfix_crc: u8) {
    let fmt = match format {
        "uc8" => Format::Uc8,
        "sc16" => Format::Sc16,
        "sc16q11" => Format::Sc16Q11,
        other => {
            eprintln!("unknown sample format {other:?} (expected uc8, sc16, sc16q11)");
            std::process::exit(1);
        }
    };

    if let Err(e) = pipeline::run_file(&file, sample_rate as f64, fmt, nfix_crc) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
