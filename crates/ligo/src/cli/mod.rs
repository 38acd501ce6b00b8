//! CLI subcommands: discovery, handshake and byte-stream I/O.

mod config_cmd;
mod devices;
mod endpoints;
mod probe;
mod read;
mod switch;
mod write;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use clap::{Args, Subcommand};
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use ligo_lib::LigoError;
pub(super) use ligo_lib::accessory::{AccessoryIdentity, HandshakeState, StringIndex};
pub(super) use ligo_lib::config::Config;
pub(super) use ligo_lib::discovery::{self, DiscoveredDevice};
pub(super) use ligo_lib::endpoints::EndpointPair;
pub(super) use ligo_lib::error::Result;
pub(super) use ligo_lib::session::Ligo;
pub(super) use ligo_lib::transport::{UsbBus, UsbDevice};

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| LigoError::Io(std::io::Error::other(e)))?;
    println!("{text}");
    Ok(())
}

/// `vvvv:pppp` rendering used in every listing.
pub(super) fn usb_id(vendor_id: u16, product_id: u16) -> String {
    format!("{vendor_id:04x}:{product_id:04x}")
}

/// Load the config from `custom_path` (or the default location), logging
/// parse warnings.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    match custom_path {
        Some(path) => {
            let (config, warnings) = Config::load_from(path);
            for w in &warnings {
                log::warn!("{w}");
            }
            config
        }
        None => Config::load(),
    }
}

// ── Device selection ──

/// Which device a command should act on: `vid`, `vid:pid` (hex) or a bus
/// location such as `usb:1/004`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    Id {
        vendor_id: u16,
        product_id: Option<u16>,
    },
    Location(String),
}

impl FromStr for DeviceSelector {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with("usb:") {
            return Ok(DeviceSelector::Location(s.to_string()));
        }
        let parse = |part: &str| {
            u16::from_str_radix(part.trim_start_matches("0x"), 16)
                .map_err(|_| format!("invalid USB ID \"{part}\" (expected hex, e.g. 18d1:4ee1)"))
        };
        match s.split_once(':') {
            Some((vid, pid)) => Ok(DeviceSelector::Id {
                vendor_id: parse(vid)?,
                product_id: Some(parse(pid)?),
            }),
            None => Ok(DeviceSelector::Id {
                vendor_id: parse(s)?,
                product_id: None,
            }),
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Id {
                vendor_id,
                product_id: Some(pid),
            } => write!(f, "{}", usb_id(*vendor_id, *pid)),
            DeviceSelector::Id {
                vendor_id,
                product_id: None,
            } => write!(f, "{vendor_id:04x}"),
            DeviceSelector::Location(loc) => f.write_str(loc),
        }
    }
}

impl DeviceSelector {
    pub fn matches(&self, device: &impl UsbDevice) -> bool {
        match self {
            DeviceSelector::Id {
                vendor_id,
                product_id,
            } => {
                let desc = device.descriptor();
                desc.vendor_id == *vendor_id && product_id.is_none_or(|pid| desc.product_id == pid)
            }
            DeviceSelector::Location(loc) => device.location() == *loc,
        }
    }
}

/// Pick the first candidate matching `selector` (or simply the first).
pub(super) fn select_device<D: UsbDevice>(
    candidates: Vec<D>,
    selector: Option<&DeviceSelector>,
    what: &str,
) -> Result<D> {
    let count = candidates.len();
    let chosen = match selector {
        Some(sel) => candidates.into_iter().find(|d| sel.matches(d)),
        None => candidates.into_iter().next(),
    };
    match (chosen, selector) {
        (Some(dev), _) => {
            if selector.is_none() && count > 1 {
                log::info!("{count} {what} devices attached, using {}", dev.location());
            }
            Ok(dev)
        }
        (None, Some(sel)) => Err(LigoError::NotFound(format!("no {what} device matches {sel}"))),
        (None, None) => Err(LigoError::NotFound(format!("no {what} device attached"))),
    }
}

/// The device to stream with: one already in accessory mode.
pub(super) fn select_accessory<B: UsbBus>(
    bus: &B,
    selector: Option<&DeviceSelector>,
) -> Result<B::Device> {
    select_device(
        discovery::find_accessory_mode_devices(bus)?,
        selector,
        "accessory-mode",
    )
}

#[derive(Args, Debug, Clone, Default)]
pub struct DeviceArg {
    /// Device to use: VID, VID:PID (hex) or bus location (usb:BUS/ADDR)
    #[arg(short, long)]
    device: Option<DeviceSelector>,
}

/// Per-run overrides of the configured accessory identity.
#[derive(Args, Debug, Clone, Default)]
pub struct IdentityArgs {
    #[arg(long)]
    manufacturer: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long = "accessory-version", value_name = "VERSION")]
    version: Option<String>,
    #[arg(long)]
    uri: Option<String>,
    #[arg(long)]
    serial: Option<String>,
}

impl IdentityArgs {
    pub fn apply(&self, identity: &mut AccessoryIdentity) {
        let overrides = [
            (StringIndex::Manufacturer, &self.manufacturer),
            (StringIndex::Model, &self.model),
            (StringIndex::Description, &self.description),
            (StringIndex::Version, &self.version),
            (StringIndex::Uri, &self.uri),
            (StringIndex::Serial, &self.serial),
        ];
        for (index, value) in overrides {
            if let Some(value) = value {
                *identity.get_mut(index) = value.clone();
            }
        }
    }
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct DevicesOutput {
    pub count: usize,
    pub devices: Vec<DiscoveredDevice>,
}

#[derive(Serialize)]
pub(super) struct EndpointsOutput {
    pub location: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub endpoints: EndpointPair,
    pub complete: bool,
}

#[derive(Serialize)]
pub(super) struct StringOutcomeJson {
    pub index: StringIndex,
    pub length: usize,
    pub ok: bool,
    pub code: i32,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub(super) struct SwitchOutput {
    pub location: String,
    pub state: HandshakeState,
    pub strings: Vec<StringOutcomeJson>,
    pub start_error: Option<String>,
    pub error: Option<String>,
    /// Bus location after re-enumeration, when `--wait` was given.
    pub accessory: Option<String>,
}

#[derive(Serialize)]
pub(super) struct WriteOutput {
    pub location: String,
    pub bytes_written: usize,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub problems: Vec<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List attached devices that can be switched, and devices already in accessory mode
    Devices,

    /// Query the AOA protocol version of every device from a known Android vendor
    Probe,

    /// Show the bulk endpoints that would carry the byte stream
    Endpoints {
        #[command(flatten)]
        device: DeviceArg,
    },

    /// Send the accessory identity and switch a device into accessory mode
    Switch {
        #[command(flatten)]
        device: DeviceArg,
        #[command(flatten)]
        identity: IdentityArgs,
        /// Wait for the device to re-enumerate in accessory mode
        #[arg(long)]
        wait: bool,
    },

    /// Stream data from an accessory-mode device to stdout (Ctrl+C to stop)
    Read {
        #[command(flatten)]
        device: DeviceArg,
        /// Stop after this many transfers
        #[arg(long)]
        count: Option<usize>,
        /// Stop after this long without data (0 = never) [default: read_timeout_ms from config]
        #[arg(long, value_name = "MS")]
        idle_timeout: Option<u64>,
        /// Print a hex dump instead of raw bytes
        #[arg(long)]
        hex: bool,
    },

    /// Send data to an accessory-mode device (from the argument, or stdin)
    Write {
        #[command(flatten)]
        device: DeviceArg,
        /// Text to send; reads stdin when omitted
        data: Option<String>,
    },

    /// Show current configuration and file path
    Config {
        /// Write the current settings (defaults if no file) to the config file
        #[arg(long)]
        save: bool,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool, config_path: Option<&Path>) -> Result<()> {
    if let Command::Config { save } = cmd {
        return config_cmd::cmd_config(json, config_path, save);
    }

    let config = load_config(config_path);
    let mut ligo = Ligo::init()?;
    let result = run_with(&mut ligo, cmd, json, &config);
    ligo.exit();
    result
}

/// Dispatch a device command against an initialized context.
pub(super) fn run_with<B: UsbBus>(
    ligo: &mut Ligo<B>,
    cmd: Command,
    json: bool,
    config: &Config,
) -> Result<()> {
    match cmd {
        Command::Devices => devices::cmd_devices(ligo.bus(), json),
        Command::Probe => probe::cmd_probe(ligo.bus(), json),
        Command::Endpoints { device } => {
            endpoints::cmd_endpoints(ligo.bus(), device.device.as_ref(), json)
        }
        Command::Switch {
            device,
            identity,
            wait,
        } => {
            let mut config = config.clone();
            identity.apply(&mut config.identity);
            switch::cmd_switch(ligo.bus(), device.device.as_ref(), &config, wait, json)
        }
        Command::Read {
            device,
            count,
            idle_timeout,
            hex,
        } => {
            if json {
                warn_json_unsupported("read");
            }
            let opts = read::ReadOptions::resolve(count, idle_timeout, hex, config);
            let mut out = std::io::stdout().lock();
            read::cmd_read(ligo, device.device.as_ref(), config, &opts, &mut out)
        }
        Command::Write { device, data } => {
            let payload = match data {
                Some(text) => text.into_bytes(),
                None => {
                    let mut buf = Vec::new();
                    std::io::Read::read_to_end(&mut std::io::stdin().lock(), &mut buf)?;
                    buf
                }
            };
            write::cmd_write(ligo, device.device.as_ref(), config, &payload, json)
        }
        Command::Config { save } => config_cmd::cmd_config(json, None, save),
    }
}



#[cfg(test)]
mod json_output_tests {
    use super::*;

    #[test]
    fn devices_output_empty() {
        let output = DevicesOutput {
            count: 0,
            devices: vec![],
        };
        let parsed = serde_json::to_value(&output).unwrap();
        assert_eq!(parsed["count"], 0);
        assert!(parsed["devices"].as_array().unwrap().is_empty());
    }

    #[test]
    fn endpoints_output_has_in_out_keys() {
        let output = EndpointsOutput {
            location: "usb:1/004".into(),
            vendor_id: 0x18D1,
            product_id: 0x2D00,
            endpoints: EndpointPair::new(),
            complete: false,
        };
        let parsed = serde_json::to_value(&output).unwrap();
        assert!(parsed["endpoints"]["in"].is_null());
        assert!(parsed["endpoints"]["out"].is_null());
        assert_eq!(parsed["complete"], false);
    }

    #[test]
    fn config_output_complete() {
        let output = ConfigOutput {
            config_file: Some("/home/user/.config/ligo/config.toml".into()),
            config_file_exists: false,
            settings: Config::default(),
            problems: vec![],
        };
        let parsed = serde_json::to_value(&output).unwrap();
        assert!(parsed["config_file"].is_string());
        assert_eq!(parsed["settings"]["write_timeout_ms"], 1000);
        assert_eq!(parsed["settings"]["identity"]["manufacturer"], "ligo");
        assert!(parsed["problems"].as_array().unwrap().is_empty());
    }
}
