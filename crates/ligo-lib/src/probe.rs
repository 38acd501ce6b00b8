//! Protocol prober: asks a device which AOA protocol version it speaks.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::protocol::{AOA_PROTOCOL_VERSION, GET_PROTOCOL, USB_TIMEOUT_MS};
use crate::transport::{self, ControlSetup, DeviceDescriptor, UsbDevice, UsbHandle};
use crate::vendors;

/// AOA protocol version reported by GET_PROTOCOL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ProtocolVersion(u16);

impl ProtocolVersion {
    pub const fn new(version: u16) -> Self {
        ProtocolVersion(version)
    }

    /// Assemble from the two response bytes: `byte1 << 8 | byte0`.
    pub fn from_le_bytes(bytes: [u8; 2]) -> Self {
        ProtocolVersion(u16::from_le_bytes(bytes))
    }

    pub fn get(self) -> u16 {
        self.0
    }

    /// Whether this is the version device discovery accepts.
    pub fn is_supported(self) -> bool {
        self.0 == AOA_PROTOCOL_VERSION
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AOA v{}", self.0)
    }
}

/// Whether a device may be probed at all: class 0 and a known Android vendor.
pub fn is_eligible(desc: &DeviceDescriptor) -> bool {
    desc.class == 0 && vendors::is_known_vendor(desc.vendor_id)
}

/// Issue GET_PROTOCOL on an already open handle.
///
/// Returns `Ok(None)` when the device answers with fewer than two bytes.
pub fn query_protocol_version(
    handle: &impl UsbHandle,
) -> transport::Result<Option<ProtocolVersion>> {
    let mut data = [0u8; 2];
    let n = handle.control_in(
        ControlSetup::vendor(GET_PROTOCOL, 0, 0),
        &mut data,
        Some(Duration::from_millis(USB_TIMEOUT_MS)),
    )?;
    if n < data.len() {
        return Ok(None);
    }
    Ok(Some(ProtocolVersion::from_le_bytes(data)))
}

/// Probe `device` for AOA support.
///
/// Ineligible devices are rejected without any transport call. Otherwise the
/// device is opened for the duration of a single GET_PROTOCOL request and
/// closed again on every path. Open failures and failed or short transfers
/// all mean "not an accessory".
pub fn probe_protocol_version<D: UsbDevice>(device: &D) -> Option<ProtocolVersion> {
    let desc = device.descriptor();
    if !is_eligible(&desc) {
        return None;
    }

    let handle = match device.open() {
        Ok(h) => h,
        Err(e) => {
            log::debug!(
                "{:04x}:{:04x} at {}: open failed: {e}",
                desc.vendor_id,
                desc.product_id,
                device.location()
            );
            return None;
        }
    };

    match query_protocol_version(&handle) {
        Ok(Some(version)) => {
            log::debug!(
                "{:04x}:{:04x} at {}: {version}",
                desc.vendor_id,
                desc.product_id,
                device.location()
            );
            Some(version)
        }
        Ok(None) => {
            log::debug!(
                "{:04x}:{:04x}: short GET_PROTOCOL response",
                desc.vendor_id,
                desc.product_id
            );
            None
        }
        Err(e) => {
            log::debug!(
                "{:04x}:{:04x}: GET_PROTOCOL failed: {e}",
                desc.vendor_id,
                desc.product_id
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use crate::transport::mock::MockDevice;

    #[test]
    fn version_from_le_bytes() {
        assert_eq!(ProtocolVersion::from_le_bytes([0x02, 0x00]).get(), 2);
        assert_eq!(ProtocolVersion::from_le_bytes([0x01, 0x01]).get(), 0x0101);
    }

    #[test]
    fn only_version_two_is_supported() {
        assert!(ProtocolVersion::new(2).is_supported());
        assert!(!ProtocolVersion::new(1).is_supported());
        assert!(!ProtocolVersion::new(0).is_supported());
    }

    #[test]
    fn version_display() {
        assert_eq!(ProtocolVersion::new(2).to_string(), "AOA v2");
    }

    #[test]
    fn version_serializes_as_number() {
        let json = serde_json::to_string(&ProtocolVersion::new(2)).unwrap();
        assert_eq!(json, "2");
    }

    #[test]
    fn nonzero_class_is_rejected_without_transport_call() {
        for class in [0x02u8, 0x09, 0xEF, 0xFF] {
            let dev = MockDevice::android(0x18D1, 2).with_class(class);
            assert_eq!(probe_protocol_version(&dev), None, "class 0x{class:02x}");
            assert_eq!(dev.opens(), 0);
            assert!(dev.controls().is_empty());
        }
    }

    #[test]
    fn unknown_vendor_is_rejected_without_transport_call() {
        let dev = MockDevice::android(0x1235, 2);
        assert_eq!(probe_protocol_version(&dev), None);
        assert_eq!(dev.opens(), 0);
        assert!(dev.controls().is_empty());
    }

    #[test]
    fn version_two_device() {
        let dev = MockDevice::new(0x04E8, 0x6860).with_protocol_response(vec![0x02, 0x00]);
        assert_eq!(probe_protocol_version(&dev), Some(ProtocolVersion::new(2)));
        assert_eq!(dev.opens(), 1);
        assert_eq!(dev.closes(), 1);
    }

    #[test]
    fn get_protocol_request_is_bit_exact() {
        let dev = MockDevice::new(0x04E8, 0x6860).with_protocol_response(vec![0x02, 0x00]);
        probe_protocol_version(&dev);
        let controls = dev.controls();
        assert_eq!(controls.len(), 1);
        let c = &controls[0];
        assert_eq!(c.setup.bm_request_type(c.direction), 0xC0);
        assert_eq!(c.setup.request, 51);
        assert_eq!(c.setup.value, 0);
        assert_eq!(c.setup.index, 0);
        assert_eq!(c.length, 2);
    }

    #[test]
    fn short_response_is_not_supported_and_closes_once() {
        let dev = MockDevice::new(0x18D1, 0x4EE1).with_protocol_response(vec![0x02]);
        assert_eq!(probe_protocol_version(&dev), None);
        assert_eq!(dev.opens(), 1);
        assert_eq!(dev.closes(), 1);
    }

    #[test]
    fn failed_transfer_is_not_supported_and_closes_once() {
        let dev = MockDevice::new(0x18D1, 0x4EE1).with_protocol_error(TransportError::Pipe);
        assert_eq!(probe_protocol_version(&dev), None);
        assert_eq!(dev.opens(), 1);
        assert_eq!(dev.closes(), 1);
    }

    #[test]
    fn open_failure_is_not_supported() {
        let dev = MockDevice::android(0x18D1, 2)
            .with_open_error(TransportError::Access("permission denied".into()));
        assert_eq!(probe_protocol_version(&dev), None);
        assert_eq!(dev.closes(), 0);
        assert!(dev.controls().is_empty());
    }

    #[test]
    fn version_one_is_reported_but_not_supported() {
        let dev = MockDevice::android(0x2717, 1);
        let v = probe_protocol_version(&dev).unwrap();
        assert_eq!(v.get(), 1);
        assert!(!v.is_supported());
    }

    #[test]
    fn eligibility() {
        let desc = |class, vendor_id| DeviceDescriptor {
            class,
            subclass: 0,
            protocol: 0,
            vendor_id,
            product_id: 0,
        };
        assert!(is_eligible(&desc(0, 0x18D1)));
        assert!(!is_eligible(&desc(0xEF, 0x18D1)));
        assert!(!is_eligible(&desc(0, 0x1235)));
    }
}
