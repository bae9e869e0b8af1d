//! adsb-receiver: thin daemon demonstrating the external interfaces of
//! the decode pipeline — runs the feeder's capture/demod/tracker stack
//! over a file and forwards `TrackEvent`s to a configured HTTP endpoint
//! in batches.
//!
//! Intentionally minimal: a real network publisher (BEAST/SBS wire
//! encoders, a websocket feed, interactive display) is out of scope. This
//! binary exists to give the decode pipeline's external-interface boundary
//! a real caller.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::{info, warn};
use serde::Serialize;

use adsb_core::frame::parse_frame;
use adsb_core::icao_filter::IcaoFilter;
use adsb_core::tracker::{Tracker, TrackEvent};
use adsb_feeder::capture::{FrameReader, IQReader};

#[derive(Parser)]
#[command(
    name = "adsb-receiver",
    version,
    about = "Decode a capture and forward track events to an HTTP endpoint"
)]
struct Cli {
    /// Path to a raw IQ file, or a pre-demodulated hex-frame file with --hex
    file: PathBuf,

    /// Treat `file` as a newline-delimited hex frame file instead of raw IQ
    #[arg(long)]
    hex: bool,

    /// Sample rate in Hz (ignored with --hex)
    #[arg(long, default_value = "2000000")]
    sample_rate: u32,

    /// Maximum bits of CRC error correction to attempt (0 disables)
    #[arg(long, default_value = "1")]
    nfix_crc: u8,

    /// HTTP endpoint to POST batches of track events to
    #[arg(long, env = "ADSB_ENDPOINT")]
    endpoint: String,

    /// Receiver reference latitude, used for CPR local decode and range checks
    #[arg(long)]
    ref_lat: Option<f64>,

    /// Receiver reference longitude
    #[arg(long)]
    ref_lon: Option<f64>,

    /// Reject decoded positions further than this from the reference (nm). 0 disables.
    #[arg(long, default_value = "360.0")]
    max_range_nm: f64,

    /// Minimum seconds between stored positions for the same aircraft
    #[arg(long, default_value = "1.0")]
    min_position_interval: f64,

    /// Number of events per HTTP POST
    #[arg(long, default_value = "50")]
    batch_size: usize,

    /// Seconds to wait between batches
    #[arg(long, default_value = "2.0")]
    batch_interval_secs: f64,
}

#[derive(Serialize)]
struct EventBatch<'a> {
    events: &'a [TrackEvent],
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let events = match decode_file(&cli) {
        Ok(events) => events,
        Err(e) => {
            eprintln!("decode failed: {e}");
            std::process::exit(1);
        }
    };

    info!("decoded {} track events, forwarding to {}", events.len(), cli.endpoint);

    let client = reqwest::Client::new();
    let mut sent = 0u64;
    let mut accepted = 0u64;
    let mut rejected = 0u64;

    for chunk in events.chunks(cli.batch_size.max(1)) {
        tokio::select! {
            result = post_batch(&client, &cli.endpoint, chunk) => {
                sent += 1;
                match result {
                    Ok(()) => accepted += 1,
                    Err(e) => {
                        rejected += 1;
                        warn!("batch {sent} rejected: {e}");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, stopping after {sent} batches sent");
                break;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(cli.batch_interval_secs.max(0.0))) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, stopping after {sent} batches sent");
                break;
            }
        }
    }

    info!("done: {sent} batches sent, {accepted} accepted, {rejected} rejected");
}

async fn post_batch(client: &reqwest::Client, endpoint: &str, events: &[TrackEvent]) -> Result<(), String> {
    let body = EventBatch { events };
    let resp = client
        .post(endpoint)
        .json(&body)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if resp.status().is_success() {
        Ok(())
    } else {
        Err(format!("HTTP {}", resp.status()))
    }
}

/// Run the capture/demod/tracker pipeline over `cli.file` and return every
/// `TrackEvent` the tracker produced, in capture order.
fn decode_file(cli: &Cli) -> Result<Vec<TrackEvent>, String> {
    let raw_frames = if cli.hex {
        FrameReader::new(&cli.file.display().to_string())
            .read_all()
            .map_err(|e| e.to_string())?
    } else {
        IQReader::new(&cli.file.display().to_string(), cli.sample_rate)
            .demodulate()
            .map_err(|e| e.to_string())?
    };

    let mut icao_filter = IcaoFilter::new(60.0);
    let mut tracker = Tracker::new(
        cli.ref_lat,
        cli.ref_lon,
        cli.max_range_nm,
        cli.min_position_interval,
    );

    let mut events = Vec::new();
    for rf in &raw_frames {
        if let Some(frame) = parse_frame(&rf.hex_str, rf.timestamp, Some(rf.signal_level as f64), true, cli.nfix_crc, &mut icao_filter) {
            let (_, mut ev) = tracker.update(&frame);
            events.append(&mut ev);
        }
    }

    Ok(events)
}
