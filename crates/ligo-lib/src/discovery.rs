//! Device discovery: which attached devices can be switched, and which
//! already are in accessory mode.

use std::fmt;

use serde::Serialize;

use crate::error::Result;
use crate::probe::{ProtocolVersion, is_eligible, probe_protocol_version};
use crate::protocol::{
    AOA_PID_ACCESSORY, AOA_PID_ACCESSORY_ADB, AOA_PID_ACCESSORY_AUDIO,
    AOA_PID_ACCESSORY_AUDIO_ADB, AOA_PID_AUDIO, AOA_PID_AUDIO_ADB, GOOGLE_VID,
};
use crate::transport::{DeviceDescriptor, UsbBus, UsbDevice};
use crate::vendors;

/// Devices attached right now that speak AOA protocol version 2.
///
/// Every call takes a fresh snapshot of the bus. The returned devices are
/// independent references and stay valid after the snapshot is dropped.
/// An enumeration failure is returned as-is; no partial list is produced.
pub fn list_accessory_capable_devices<B: UsbBus>(bus: &B) -> Result<Vec<B::Device>> {
    let snapshot = bus.devices()?;
    log::debug!("enumerated {} device(s)", snapshot.len());

    let capable: Vec<B::Device> = snapshot
        .iter()
        .filter(|dev| probe_protocol_version(*dev).is_some_and(ProtocolVersion::is_supported))
        .cloned()
        .collect();
    drop(snapshot);

    log::info!("{} accessory-capable device(s)", capable.len());
    Ok(capable)
}

// ── Accessory mode ──

/// Function set a device exposes once it is in accessory mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessoryMode {
    Accessory,
    AccessoryAdb,
    Audio,
    AudioAdb,
    AccessoryAudio,
    AccessoryAudioAdb,
}

impl AccessoryMode {
    pub fn from_product_id(product_id: u16) -> Option<Self> {
        match product_id {
            AOA_PID_ACCESSORY => Some(AccessoryMode::Accessory),
            AOA_PID_ACCESSORY_ADB => Some(AccessoryMode::AccessoryAdb),
            AOA_PID_AUDIO => Some(AccessoryMode::Audio),
            AOA_PID_AUDIO_ADB => Some(AccessoryMode::AudioAdb),
            AOA_PID_ACCESSORY_AUDIO => Some(AccessoryMode::AccessoryAudio),
            AOA_PID_ACCESSORY_AUDIO_ADB => Some(AccessoryMode::AccessoryAudioAdb),
            _ => None,
        }
    }

    /// Whether the accessory bulk interface is present in this mode.
    pub fn has_accessory_interface(self) -> bool {
        !matches!(self, AccessoryMode::Audio | AccessoryMode::AudioAdb)
    }

    pub fn has_adb(self) -> bool {
        matches!(
            self,
            AccessoryMode::AccessoryAdb | AccessoryMode::AudioAdb | AccessoryMode::AccessoryAudioAdb
        )
    }
}

impl fmt::Display for AccessoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessoryMode::Accessory => "accessory",
            AccessoryMode::AccessoryAdb => "accessory + adb",
            AccessoryMode::Audio => "audio",
            AccessoryMode::AudioAdb => "audio + adb",
            AccessoryMode::AccessoryAudio => "accessory + audio",
            AccessoryMode::AccessoryAudioAdb => "accessory + audio + adb",
        };
        f.write_str(name)
    }
}

/// Mode of a device that already switched, if it has.
pub fn accessory_mode(desc: &DeviceDescriptor) -> Option<AccessoryMode> {
    if desc.vendor_id != GOOGLE_VID {
        return None;
    }
    AccessoryMode::from_product_id(desc.product_id)
}

pub fn is_accessory_mode(desc: &DeviceDescriptor) -> bool {
    accessory_mode(desc).is_some()
}

/// Attached devices already in accessory mode with a data interface.
pub fn find_accessory_mode_devices<B: UsbBus>(bus: &B) -> Result<Vec<B::Device>> {
    Ok(bus
        .devices()?
        .into_iter()
        .filter(|dev| {
            accessory_mode(&dev.descriptor()).is_some_and(AccessoryMode::has_accessory_interface)
        })
        .collect())
}

// ── Survey ──

/// Summary of one attached device, for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    pub location: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub vendor_name: Option<&'static str>,
    pub class: u8,
    /// `None` if the device was not probed or did not answer.
    pub protocol_version: Option<ProtocolVersion>,
    pub accessory_mode: Option<AccessoryMode>,
}

impl DiscoveredDevice {
    /// Describe `device`, probing it if it is eligible and not yet switched.
    pub fn inspect<D: UsbDevice>(device: &D) -> Self {
        let desc = device.descriptor();
        let accessory_mode = accessory_mode(&desc);
        let protocol_version = if accessory_mode.is_none() && is_eligible(&desc) {
            probe_protocol_version(device)
        } else {
            None
        };
        DiscoveredDevice {
            location: device.location(),
            vendor_id: desc.vendor_id,
            product_id: desc.product_id,
            vendor_name: vendors::vendor_name(desc.vendor_id),
            class: desc.class,
            protocol_version,
            accessory_mode,
        }
    }

    /// Can be switched into accessory mode with this library.
    pub fn is_capable(&self) -> bool {
        self.protocol_version.is_some_and(ProtocolVersion::is_supported)
    }
}

/// Describe every attached device from a known Android vendor.
pub fn survey<B: UsbBus>(bus: &B) -> Result<Vec<DiscoveredDevice>> {
    Ok(bus
        .devices()?
        .iter()
        .filter(|dev| vendors::is_known_vendor(dev.descriptor().vendor_id))
        .map(DiscoveredDevice::inspect)
        .collect())
}
