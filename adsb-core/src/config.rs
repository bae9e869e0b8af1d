//! Configuration file management for adsb-decode.
//!
//! Reads/writes `~/.adsb-decode/config.yaml` with receiver settings,
//! database path, dashboard port, and webhook URL.

use std::path::PathBuf;

use crate::types::AdsbError;

/// Full configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub receiver: ReceiverConfig,
    pub dsp: DspConfig,
    pub database: DatabaseConfig,
    pub dashboard: DashboardConfig,
    pub webhook: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Sample-source and demodulator tuning, read from the `dsp:` section.
#[derive(Debug, Clone)]
pub struct DspConfig {
    pub sample_format: String,
    pub sample_rate: f64,
    pub filter_dc: bool,
    pub phase_enhance: bool,
    pub nfix_crc: u8,
    pub max_range_nm: f64,
}

impl Default for DspConfig {
    fn default() -> Self {
        DspConfig {
            sample_format: "uc8".into(),
            sample_rate: 2_400_000.0,
            filter_dc: true,
            phase_enhance: true,
            nfix_crc: 1,
            max_range_nm: 360.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            receiver: ReceiverConfig {
                name: "default".into(),
                lat: None,
                lon: None,
            },
            dsp: DspConfig::default(),
            database: DatabaseConfig {
                path: "data/adsb.db".into(),
            },
            dashboard: DashboardConfig {
                host: "127.0.0.1".into(),
                port: 8080,
            },
            webhook: None,
        }
    }
}

/// Get the config directory path (`~/.adsb-decode/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".adsb-decode")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.adsb-decode/config.yaml`.
///
/// Returns default config if file doesn't exist.
pub fn load_config() -> Config {
    let path = config_file();
    if !path.exists() {
        return Config::default();
    }

    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(_) => return Config::default(),
    };

    parse_config(&text).unwrap_or_default()
}

/// Save config to `~/.adsb-decode/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, AdsbError> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir).map_err(|e| AdsbError::Config(e.to_string()))?;

    let path = config_file();
    let text = serialize_config(config);
    std::fs::write(&path, text).map_err(|e| AdsbError::Config(e.to_string()))?;

    Ok(path)
}

/// Parse simple YAML-like config text.
fn parse_config(text: &str) -> Option<Config> {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        if let Some((key, val)) = stripped.split_once(':') {
            let key = key.trim();
            let val = val.trim();

            if !is_indented {
                if val.is_empty() {
                    current_section = Some(key.to_string());
                } else {
                    current_section = None;
                    // Top-level key with value
                    match key {
                        "webhook" => config.webhook = parse_string_value(val),
                        _ => {}
                    }
                }
            } else if let Some(ref section) = current_section {
                match section.as_str() {
                    "receiver" => match key {
                        "name" => {
                            if let Some(v) = parse_string_value(val) {
                                config.receiver.name = v;
                            }
                        }
                        "lat" => config.receiver.lat = parse_float_value(val),
                        "lon" => config.receiver.lon = parse_float_value(val),
                        _ => {}
                    },
                    "dsp" => match key {
                        "sample_format" => {
                            if let Some(v) = parse_string_value(val) {
                                config.dsp.sample_format = v;
                            }
                        }
                        "sample_rate" => {
                            if let Some(v) = parse_float_value(val) {
                                config.dsp.sample_rate = v;
                            }
                        }
                        "filter_dc" => config.dsp.filter_dc = val == "true",
                        "phase_enhance" => config.dsp.phase_enhance = val == "true",
                        "nfix_crc" => {
                            if let Ok(v) = val.parse::<u8>() {
                                config.dsp.nfix_crc = v;
                            }
                        }
                        "max_range_nm" => {
                            if let Some(v) = parse_float_value(val) {
                                config.dsp.max_range_nm = v;
                            }
                        }
                        _ => {}
                    },
                    "database" => {
                        if key == "path" {
                            if let Some(v) = parse_string_value(val) {
                                config.database.path = v;
                            }
                        }
                    }
                    "dashboard" => match key {
                        "host" => {
                            if let Some(v) = parse_string_value(val) {
                                config.dashboard.host = v;
                            }
                        }
                        "port" => {
                            if let Some(v) = val.parse::<u16>().ok() {
                                config.dashboard.port = v;
                            }
                        }
                        _ => {}
                    },
                    _ => {}
                }
            }
        }
    }

    Some(config)
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if (val.starts_with('"') && val.ends_with('"'))
        || (val.starts_with('\'') && val.ends_with('\''))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> Option<f64> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    val.parse().ok()
}

/// Serialize config to YAML-like text.
fn serialize_config(config: &Config) -> String {
    let mut lines = vec!["# adsb-decode configuration".to_string(), String::new()];

    lines.push("receiver:".into());
    lines.push(format!("  name: \"{}\"", config.receiver.name));
    match config.receiver.lat {
        Some(v) => lines.push(format!("  lat: {v}")),
        None => lines.push("  lat: null".into()),
    }
    match config.receiver.lon {
        Some(v) => lines.push(format!("  lon: {v}")),
        None => lines.push("  lon: null".into()),
    }
    lines.push(String::new());

    lines.push("dsp:".into());
    lines.push(format!("  sample_format: \"{}\"", config.dsp.sample_format));
    lines.push(format!("  sample_rate: {}", config.dsp.sample_rate));
    lines.push(format!("  filter_dc: {}", config.dsp.filter_dc));
    lines.push(format!("  phase_enhance: {}", config.dsp.phase_enhance));
    lines.push(format!("  nfix_crc: {}", config.dsp.nfix_crc));
    lines.push(format!("  max_range_nm: {}", config.dsp.max_range_nm));
    lines.push(String::new());

    lines.push("database:".into());
    lines.push(format!("  path: \"{}\"", config.database.path));
    lines.push(String::new());

    lines.push("dashboard:".into());
    lines.push(format!("  host: \"{}\"", config.dashboard.host));
    lines.push(format!("  port: {}", config.dashboard.port));
    lines.push(String::new());

    match &config.webhook {
        Some(url) => lines.push(format!("webhook: \"{url}\"")),
        None => lines.push("webhook: null".into()),
    }

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
