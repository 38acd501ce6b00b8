//! Endpoint discovery: picks the IN/OUT endpoints used for the byte stream.
//!
//! Heuristic: the first interface's first alternate setting carries the data
//! endpoints. This holds for devices in accessory mode but is not validated
//! against any interface class.

use serde::Serialize;

use crate::error::{LigoError, Result};
use crate::transport::{AltSetting, Direction, UsbDevice};

/// Endpoint addresses for the accessory byte stream.
///
/// Each side is either unset or a non-zero address. Once a side is set it
/// is never overwritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EndpointPair {
    #[serde(rename = "in")]
    input: Option<u8>,
    #[serde(rename = "out")]
    output: Option<u8>,
}

impl EndpointPair {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(&self) -> Option<u8> {
        self.input
    }

    pub fn output(&self) -> Option<u8> {
        self.output
    }

    pub fn is_complete(&self) -> bool {
        self.input.is_some() && self.output.is_some()
    }

    /// Both addresses, or `EndpointsMissing` if either side is unset.
    pub fn require(&self) -> Result<(u8, u8)> {
        match (self.input, self.output) {
            (Some(i), Some(o)) => Ok((i, o)),
            _ => Err(LigoError::EndpointsMissing),
        }
    }

    /// Scan `alt` in descriptor order. The first bulk/interrupt endpoint of
    /// each direction wins; sides that are already set are left alone.
    pub fn fill_from(&mut self, alt: &AltSetting) {
        for ep in alt.endpoints.iter().filter(|ep| ep.transfer_type.is_stream()) {
            if ep.address == 0 {
                continue;
            }
            let slot = match ep.direction() {
                Direction::In => &mut self.input,
                Direction::Out => &mut self.output,
            };
            if slot.is_none() {
                *slot = Some(ep.address);
            }
        }
    }
}

/// Read the active configuration of `device` and fill the unset sides of `pair`.
///
/// A configuration that cannot be read leaves `pair` untouched; callers must
/// check [`EndpointPair::is_complete`] before doing I/O. Returns the updated pair.
pub fn discover_endpoints<D: UsbDevice>(device: &D, pair: &mut EndpointPair) -> EndpointPair {
    match device.active_config() {
        Ok(config) => match config.first_alt_setting() {
            Some(alt) => pair.fill_from(alt),
            None => log::warn!("{}: configuration has no interfaces", device.location()),
        },
        Err(e) => log::warn!(
            "{}: reading configuration descriptor: {e}",
            device.location()
        ),
    }
    log::debug!(
        "{}: endpoints in={:?} out={:?}",
        device.location(),
        pair.input,
        pair.output
    );
    *pair
}
