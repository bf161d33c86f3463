//! Command-line arguments for the bond monitor client.
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use bond_common::hub::{DEFAULT_HUB_URL, DEFAULT_INSTRUMENTS};
use bond_common::{Result, instruments};
use clap::Parser;

use crate::transport::HubConfig;
use crate::transport::config::DEFAULT_RECONNECT_DELAYS_SECS;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Hub endpoint URL.
    #[clap(long, default_value = DEFAULT_HUB_URL)]
    pub url: String,

    /// Instruments to subscribe to, comma separated.
    #[clap(long, value_delimiter = ',', default_values_t = DEFAULT_INSTRUMENTS.map(String::from))]
    pub instruments: Vec<String>,

    /// File with instrument identifiers; overrides `--instruments`.
    /// Identifiers may be separated by commas, spaces, or new lines.
    #[clap(long)]
    pub path: Option<String>,

    /// Open the WebSocket directly without the negotiate request.
    #[clap(long)]
    pub skip_negotiation: bool,

    /// Seconds to wait before each automatic reconnect attempt.
    #[clap(long, value_delimiter = ',', default_values_t = DEFAULT_RECONNECT_DELAYS_SECS)]
    pub reconnect_delays: Vec<u64>,

    /// Do not reconnect once an established connection drops.
    #[clap(long)]
    pub no_reconnect: bool,
}

impl Args {
    /// Instrument list to subscribe to.
    pub fn instrument_ids(&self) -> Result<Vec<String>> {
        match &self.path {
            Some(raw) => {
                let file = File::open(normalize_path(raw))?;
                instruments::parse_from_reader(BufReader::new(file))
            }
            None => Ok(self.instruments.clone()),
        }
    }

    /// Connection settings.
    pub fn hub_config(&self) -> HubConfig {
        let config = HubConfig::new(self.url.trim()).with_skip_negotiation(self.skip_negotiation);
        if self.no_reconnect {
            config.without_reconnect()
        } else {
            config.with_automatic_reconnect(
                self.reconnect_delays
                    .iter()
                    .map(|secs| Duration::from_secs(*secs))
                    .collect(),
            )
        }
    }
}

/// Normalize a CLI-provided path string by trimming whitespace and matching quotes.
///
/// This allows passing Windows paths in quotes without breaking parsing.
fn normalize_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let no_quotes = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    PathBuf::from(no_quotes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["bond_client"]);
        assert_eq!(args.url, DEFAULT_HUB_URL);
        assert_eq!(args.instrument_ids().unwrap(), vec!["instrumentId1", "instrumentId2"]);
        let config = args.hub_config();
        assert_eq!(config.reconnect_delays.len(), 4);
        assert!(!config.skip_negotiation);
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "bond_client",
            "--url",
            "http://127.0.0.1:9000/hub",
            "--instruments",
            "A,B,C",
            "--skip-negotiation",
            "--reconnect-delays",
            "1,5",
        ]);
        assert_eq!(args.instrument_ids().unwrap(), vec!["A", "B", "C"]);
        let config = args.hub_config();
        assert_eq!(config.url, "http://127.0.0.1:9000/hub");
        assert!(config.skip_negotiation);
        assert_eq!(
            config.reconnect_delays,
            vec![Duration::from_secs(1), Duration::from_secs(5)]
        );
    }

    #[test]
    fn test_no_reconnect() {
        let args = Args::parse_from(["bond_client", "--no-reconnect"]);
        assert!(args.hub_config().reconnect_delays.is_empty());
    }

    #[test]
    fn test_normalize_path_strips_quotes() {
        assert_eq!(normalize_path(" \"C:\\ids.txt\" "), PathBuf::from("C:\\ids.txt"));
        assert_eq!(normalize_path("ids.txt"), PathBuf::from("ids.txt"));
    }
}
