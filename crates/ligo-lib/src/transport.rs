//! Transport adapter boundary: the USB primitives the accessory core consumes.
//!
//! The core never talks to a host-controller stack directly. It goes through
//! three traits:
//!
//! - [`UsbBus`] enumerates attached devices (a fresh snapshot per call).
//! - [`UsbDevice`] is a shared, cheaply clonable reference to one device.
//!   Cloning takes a reference; dropping releases it.
//! - [`UsbHandle`] is an open device session. Dropping it closes the device.
//!
//! The production adapter lives in [`crate::usb`]; [`mock`] provides a
//! simulated bus for tests.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::protocol::ENDPOINT_DIR_IN;

// ── Error type ──

/// Transport failures, one variant per libusb status class.
///
/// String payloads follow the convention **"context: details"**.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Io(String),
    InvalidParam(String),
    Access(String),
    NoDevice,
    NotFound(String),
    Busy(String),
    Timeout,
    Overflow,
    Pipe,
    Interrupted,
    NoMem,
    NotSupported(String),
    Other(String),
}

impl TransportError {
    /// Negative status code, numerically compatible with libusb.
    pub fn code(&self) -> i32 {
        match self {
            TransportError::Io(_) => -1,
            TransportError::InvalidParam(_) => -2,
            TransportError::Access(_) => -3,
            TransportError::NoDevice => -4,
            TransportError::NotFound(_) => -5,
            TransportError::Busy(_) => -6,
            TransportError::Timeout => -7,
            TransportError::Overflow => -8,
            TransportError::Pipe => -9,
            TransportError::Interrupted => -10,
            TransportError::NoMem => -11,
            TransportError::NotSupported(_) => -12,
            TransportError::Other(_) => -99,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "I/O error: {e}"),
            TransportError::InvalidParam(e) => write!(f, "Invalid parameter: {e}"),
            TransportError::Access(e) => write!(f, "Access denied: {e}"),
            TransportError::NoDevice => write!(f, "Device disconnected"),
            TransportError::NotFound(e) => write!(f, "Not found: {e}"),
            TransportError::Busy(e) => write!(f, "Resource busy: {e}"),
            TransportError::Timeout => write!(f, "Transfer timed out"),
            TransportError::Overflow => write!(f, "Transfer overflow"),
            TransportError::Pipe => write!(f, "Endpoint stalled"),
            TransportError::Interrupted => write!(f, "Transfer interrupted"),
            TransportError::NoMem => write!(f, "Out of memory"),
            TransportError::NotSupported(e) => write!(f, "Not supported: {e}"),
            TransportError::Other(e) => write!(f, "Transport error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Convert a millisecond timeout to the adapter convention.
///
/// `0` means "block indefinitely" and maps to `None`.
pub fn timeout_from_millis(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

// ── Descriptors ──

/// Read-only snapshot of the fields of a device descriptor used for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

impl TransferType {
    /// Bulk and interrupt endpoints can both carry the accessory byte stream.
    pub fn is_stream(self) -> bool {
        matches!(self, TransferType::Bulk | TransferType::Interrupt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn from_address(address: u8) -> Self {
        if address & ENDPOINT_DIR_IN != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EndpointDescriptor {
    pub address: u8,
    pub transfer_type: TransferType,
    pub max_packet_size: u16,
}

impl EndpointDescriptor {
    pub fn direction(&self) -> Direction {
        Direction::from_address(self.address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AltSetting {
    pub alternate_setting: u8,
    pub class: u8,
    pub endpoints: Vec<EndpointDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceDescriptor {
    pub number: u8,
    pub alt_settings: Vec<AltSetting>,
}

/// Snapshot of the active configuration descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigDescriptor {
    pub value: u8,
    pub interfaces: Vec<InterfaceDescriptor>,
}

impl ConfigDescriptor {
    /// First alternate setting of the first interface, in descriptor order.
    pub fn first_alt_setting(&self) -> Option<&AltSetting> {
        self.interfaces.first()?.alt_settings.first()
    }
}

// ── Control requests ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
}

/// Setup packet of a device-recipient control request (direction is
/// implied by whether it is sent with `control_in` or `control_out`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSetup {
    pub request_type: RequestType,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlSetup {
    pub fn vendor(request: u8, value: u16, index: u16) -> Self {
        ControlSetup {
            request_type: RequestType::Vendor,
            request,
            value,
            index,
        }
    }

    pub fn standard(request: u8, value: u16, index: u16) -> Self {
        ControlSetup {
            request_type: RequestType::Standard,
            request,
            value,
            index,
        }
    }

    /// Raw `bmRequestType` byte for the given direction.
    pub fn bm_request_type(&self, direction: Direction) -> u8 {
        let dir = match direction {
            Direction::In => ENDPOINT_DIR_IN,
            Direction::Out => 0,
        };
        let kind = match self.request_type {
            RequestType::Standard => 0x00,
            RequestType::Class => 0x20,
            RequestType::Vendor => 0x40,
        };
        dir | kind
    }
}

// ── Traits ──

/// An initialized transport adapter.
pub trait UsbBus {
    type Device: UsbDevice;

    /// Snapshot of every currently attached device.
    fn devices(&self) -> Result<Vec<Self::Device>>;
}

/// A reference-held device. `clone()` takes another reference.
pub trait UsbDevice: Clone {
    type Handle: UsbHandle;

    fn descriptor(&self) -> DeviceDescriptor;

    /// Bus location for display, e.g. `usb:1/004`.
    fn location(&self) -> String;

    fn active_config(&self) -> Result<ConfigDescriptor>;

    /// Open a new session. The device is closed when the handle is dropped.
    fn open(&self) -> Result<Self::Handle>;
}

/// An open device session.
pub trait UsbHandle {
    fn claim_interface(&mut self, number: u8) -> Result<()>;
    fn release_interface(&mut self, number: u8) -> Result<()>;

    /// Device-to-host control transfer. Returns the number of bytes received.
    fn control_in(
        &self,
        setup: ControlSetup,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize>;

    /// Host-to-device control transfer. Returns the number of bytes sent.
    fn control_out(
        &self,
        setup: ControlSetup,
        data: &[u8],
        timeout: Option<Duration>,
    ) -> Result<usize>;

    /// Bulk (or interrupt) IN transfer. Returns the number of bytes received.
    fn bulk_in(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize>;

    /// Bulk (or interrupt) OUT transfer. Returns the number of bytes sent.
    fn bulk_out(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Option<Duration>,
    ) -> Result<usize>;
}

// ── Mock adapter for testing ──

/// Simulated USB bus for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    use crate::protocol::GET_PROTOCOL;

    /// A recorded control transfer.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ControlRecord {
        pub direction: Direction,
        pub setup: ControlSetup,
        /// Payload for OUT transfers, empty for IN.
        pub data: Vec<u8>,
        /// Requested length (buffer size for IN, payload size for OUT).
        pub length: usize,
    }

    /// Lifecycle events in the order they happened.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Event {
        Open,
        Claim(u8),
        Release(u8),
        Close,
    }

    #[derive(Debug)]
    struct State {
        descriptor: Cell<DeviceDescriptor>,
        location: String,
        config: RefCell<Option<ConfigDescriptor>>,
        protocol_response: RefCell<Result<Vec<u8>>>,
        open_error: RefCell<Option<TransportError>>,
        control_out_results: RefCell<VecDeque<Result<usize>>>,
        bulk_error: RefCell<Option<TransportError>>,
        loopback: RefCell<VecDeque<Vec<u8>>>,
        controls: RefCell<Vec<ControlRecord>>,
        bulk: RefCell<Vec<(Direction, u8, usize)>>,
        events: RefCell<Vec<Event>>,
        opens: Cell<usize>,
        closes: Cell<usize>,
    }

    /// In-memory device. Clones share state, like reference-held USB devices.
    #[derive(Debug, Clone)]
    pub struct MockDevice {
        state: Rc<State>,
    }

    impl MockDevice {
        /// A class-0 device that stalls GET_PROTOCOL and has no configuration.
        pub fn new(vendor_id: u16, product_id: u16) -> Self {
            MockDevice {
                state: Rc::new(State {
                    descriptor: Cell::new(DeviceDescriptor {
                        class: 0,
                        subclass: 0,
                        protocol: 0,
                        vendor_id,
                        product_id,
                    }),
                    location: format!("mock:{vendor_id:04x}:{product_id:04x}"),
                    config: RefCell::new(None),
                    protocol_response: RefCell::new(Err(TransportError::Pipe)),
                    open_error: RefCell::new(None),
                    control_out_results: RefCell::new(VecDeque::new()),
                    bulk_error: RefCell::new(None),
                    loopback: RefCell::new(VecDeque::new()),
                    controls: RefCell::new(Vec::new()),
                    bulk: RefCell::new(Vec::new()),
                    events: RefCell::new(Vec::new()),
                    opens: Cell::new(0),
                    closes: Cell::new(0),
                }),
            }
        }

        /// An Android phone answering GET_PROTOCOL with `version`, exposing
        /// the standard accessory interface.
        pub fn android(vendor_id: u16, version: u16) -> Self {
            MockDevice::new(vendor_id, 0x4EE1)
                .with_protocol_response(version.to_le_bytes().to_vec())
                .with_config(accessory_config())
        }

        pub fn with_class(self, class: u8) -> Self {
            let mut desc = self.state.descriptor.get();
            desc.class = class;
            self.state.descriptor.set(desc);
            self
        }

        pub fn with_protocol_response(self, bytes: Vec<u8>) -> Self {
            *self.state.protocol_response.borrow_mut() = Ok(bytes);
            self
        }

        pub fn with_protocol_error(self, error: TransportError) -> Self {
            *self.state.protocol_response.borrow_mut() = Err(error);
            self
        }

        pub fn with_config(self, config: ConfigDescriptor) -> Self {
            *self.state.config.borrow_mut() = Some(config);
            self
        }

        pub fn with_open_error(self, error: TransportError) -> Self {
            *self.state.open_error.borrow_mut() = Some(error);
            self
        }

        /// Script the result of the next `control_out` call.
        /// Unscripted calls succeed with the full payload length.
        pub fn push_control_out_result(&self, result: Result<usize>) {
            self.state.control_out_results.borrow_mut().push_back(result);
        }

        /// Make every subsequent bulk transfer fail with `error`.
        pub fn fail_bulk(&self, error: TransportError) {
            *self.state.bulk_error.borrow_mut() = Some(error);
        }

        /// Queue a packet the device will send on its IN endpoint.
        pub fn push_incoming(&self, packet: Vec<u8>) {
            self.state.loopback.borrow_mut().push_back(packet);
        }

        pub fn controls(&self) -> Vec<ControlRecord> {
            self.state.controls.borrow().clone()
        }

        pub fn bulk_transfers(&self) -> Vec<(Direction, u8, usize)> {
            self.state.bulk.borrow().clone()
        }

        pub fn events(&self) -> Vec<Event> {
            self.state.events.borrow().clone()
        }

        pub fn opens(&self) -> usize {
            self.state.opens.get()
        }

        pub fn closes(&self) -> usize {
            self.state.closes.get()
        }

        /// Number of live references (clones) to this device.
        pub fn ref_count(&self) -> usize {
            Rc::strong_count(&self.state)
        }

        pub fn same_device(&self, other: &MockDevice) -> bool {
            Rc::ptr_eq(&self.state, &other.state)
        }
    }

    impl UsbDevice for MockDevice {
        type Handle = MockHandle;

        fn descriptor(&self) -> DeviceDescriptor {
            self.state.descriptor.get()
        }

        fn location(&self) -> String {
            self.state.location.clone()
        }

        fn active_config(&self) -> Result<ConfigDescriptor> {
            self.state
                .config
                .borrow()
                .clone()
                .ok_or_else(|| TransportError::NotFound("mock: no active configuration".into()))
        }

        fn open(&self) -> Result<MockHandle> {
            if let Some(e) = self.state.open_error.borrow().clone() {
                return Err(e);
            }
            self.state.opens.set(self.state.opens.get() + 1);
            self.state.events.borrow_mut().push(Event::Open);
            Ok(MockHandle {
                state: Rc::clone(&self.state),
                claimed: Vec::new(),
            })
        }
    }

    /// Open session on a [`MockDevice`]. Counts a close when dropped.
    #[derive(Debug)]
    pub struct MockHandle {
        state: Rc<State>,
        claimed: Vec<u8>,
    }

    impl MockHandle {
        fn bulk_check(&self, direction: Direction, endpoint: u8, len: usize) -> Result<()> {
            self.state.bulk.borrow_mut().push((direction, endpoint, len));
            if let Some(e) = self.state.bulk_error.borrow().clone() {
                return Err(e);
            }
            if self.claimed.is_empty() {
                return Err(TransportError::NotFound(
                    "mock: bulk transfer without claimed interface".into(),
                ));
            }
            Ok(())
        }
    }

    impl UsbHandle for MockHandle {
        fn claim_interface(&mut self, number: u8) -> Result<()> {
            if self.claimed.contains(&number) {
                return Err(TransportError::Busy(format!(
                    "mock: interface {number} already claimed"
                )));
            }
            self.claimed.push(number);
            self.state.events.borrow_mut().push(Event::Claim(number));
            Ok(())
        }

        fn release_interface(&mut self, number: u8) -> Result<()> {
            let Some(pos) = self.claimed.iter().position(|&n| n == number) else {
                return Err(TransportError::NotFound(format!(
                    "mock: interface {number} not claimed"
                )));
            };
            self.claimed.remove(pos);
            self.state.events.borrow_mut().push(Event::Release(number));
            Ok(())
        }

        fn control_in(
            &self,
            setup: ControlSetup,
            buf: &mut [u8],
            _timeout: Option<Duration>,
        ) -> Result<usize> {
            self.state.controls.borrow_mut().push(ControlRecord {
                direction: Direction::In,
                setup,
                data: Vec::new(),
                length: buf.len(),
            });
            if setup.request_type != RequestType::Vendor || setup.request != GET_PROTOCOL {
                return Err(TransportError::Pipe);
            }
            let response = self.state.protocol_response.borrow().clone()?;
            let n = response.len().min(buf.len());
            buf[..n].copy_from_slice(&response[..n]);
            Ok(n)
        }

        fn control_out(
            &self,
            setup: ControlSetup,
            data: &[u8],
            _timeout: Option<Duration>,
        ) -> Result<usize> {
            self.state.controls.borrow_mut().push(ControlRecord {
                direction: Direction::Out,
                setup,
                data: data.to_vec(),
                length: data.len(),
            });
            self.state
                .control_out_results
                .borrow_mut()
                .pop_front()
                .unwrap_or(Ok(data.len()))
        }

        fn bulk_in(
            &mut self,
            endpoint: u8,
            buf: &mut [u8],
            _timeout: Option<Duration>,
        ) -> Result<usize> {
            self.bulk_check(Direction::In, endpoint, buf.len())?;
            let packet = self
                .state
                .loopback
                .borrow_mut()
                .pop_front()
                .ok_or(TransportError::Timeout)?;
            if packet.len() > buf.len() {
                return Err(TransportError::Overflow);
            }
            buf[..packet.len()].copy_from_slice(&packet);
            Ok(packet.len())
        }

        fn bulk_out(
            &mut self,
            endpoint: u8,
            data: &[u8],
            _timeout: Option<Duration>,
        ) -> Result<usize> {
            self.bulk_check(Direction::Out, endpoint, data.len())?;
            // Loopback: what goes out comes back in.
            self.state.loopback.borrow_mut().push_back(data.to_vec());
            Ok(data.len())
        }
    }

    impl Drop for MockHandle {
        fn drop(&mut self) {
            self.state.closes.set(self.state.closes.get() + 1);
            self.state.events.borrow_mut().push(Event::Close);
        }
    }

    /// Simulated bus holding an ordered list of devices.
    #[derive(Debug, Default)]
    pub struct MockBus {
        devices: RefCell<Vec<MockDevice>>,
        enumeration_error: RefCell<Option<TransportError>>,
    }

    impl MockBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_devices(devices: Vec<MockDevice>) -> Self {
            MockBus {
                devices: RefCell::new(devices),
                enumeration_error: RefCell::new(None),
            }
        }

        pub fn plug(&self, device: MockDevice) {
            self.devices.borrow_mut().push(device);
        }

        /// Drop the bus's own references to every device.
        pub fn unplug_all(&self) {
            self.devices.borrow_mut().clear();
        }

        pub fn fail_enumeration(&self, error: TransportError) {
            *self.enumeration_error.borrow_mut() = Some(error);
        }
    }

    impl UsbBus for MockBus {
        type Device = MockDevice;

        fn devices(&self) -> Result<Vec<MockDevice>> {
            if let Some(e) = self.enumeration_error.borrow().clone() {
                return Err(e);
            }
            Ok(self.devices.borrow().clone())
        }
    }

    /// Single interface, single alt setting: bulk IN 0x81, bulk OUT 0x01.
    pub fn accessory_config() -> ConfigDescriptor {
        config_with_endpoints(vec![
            endpoint(0x81, TransferType::Bulk),
            endpoint(0x01, TransferType::Bulk),
        ])
    }

    pub fn config_with_endpoints(endpoints: Vec<EndpointDescriptor>) -> ConfigDescriptor {
        ConfigDescriptor {
            value: 1,
            interfaces: vec![InterfaceDescriptor {
                number: 0,
                alt_settings: vec![AltSetting {
                    alternate_setting: 0,
                    class: 0xFF,
                    endpoints,
                }],
            }],
        }
    }

    pub fn endpoint(address: u8, transfer_type: TransferType) -> EndpointDescriptor {
        EndpointDescriptor {
            address,
            transfer_type,
            max_packet_size: 512,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_libusb() {
        assert_eq!(TransportError::Io("x".into()).code(), -1);
        assert_eq!(TransportError::Access("x".into()).code(), -3);
        assert_eq!(TransportError::NoDevice.code(), -4);
        assert_eq!(TransportError::Timeout.code(), -7);
        assert_eq!(TransportError::Pipe.code(), -9);
        assert_eq!(TransportError::NotSupported("x".into()).code(), -12);
        assert_eq!(TransportError::Other("x".into()).code(), -99);
    }

    #[test]
    fn error_display_includes_context() {
        let e = TransportError::Busy("claim interface 0: in use".into());
        assert_eq!(e.to_string(), "Resource busy: claim interface 0: in use");
    }

    #[test]
    fn zero_timeout_blocks_indefinitely() {
        assert_eq!(timeout_from_millis(0), None);
        assert_eq!(timeout_from_millis(250), Some(Duration::from_millis(250)));
    }

    #[test]
    fn direction_from_address_bit() {
        assert_eq!(Direction::from_address(0x81), Direction::In);
        assert_eq!(Direction::from_address(0x02), Direction::Out);
        assert_eq!(Direction::from_address(0x80), Direction::In);
    }

    #[test]
    fn stream_transfer_types() {
        assert!(TransferType::Bulk.is_stream());
        assert!(TransferType::Interrupt.is_stream());
        assert!(!TransferType::Isochronous.is_stream());
        assert!(!TransferType::Control.is_stream());
    }

    #[test]
    fn bm_request_type_bytes() {
        let vendor = ControlSetup::vendor(51, 0, 0);
        assert_eq!(vendor.bm_request_type(Direction::In), 0xC0);
        assert_eq!(vendor.bm_request_type(Direction::Out), 0x40);
        let standard = ControlSetup::standard(9, 1, 0);
        assert_eq!(standard.bm_request_type(Direction::Out), 0x00);
    }

    #[test]
    fn first_alt_setting_of_empty_config_is_none() {
        let config = ConfigDescriptor {
            value: 1,
            interfaces: vec![],
        };
        assert!(config.first_alt_setting().is_none());
    }

    #[test]
    fn mock_handle_counts_close_on_drop() {
        let dev = mock::MockDevice::new(0x18D1, 0x4EE1);
        {
            let _h = dev.open().unwrap();
            assert_eq!(dev.opens(), 1);
            assert_eq!(dev.closes(), 0);
        }
        assert_eq!(dev.closes(), 1);
        assert_eq!(dev.events(), vec![mock::Event::Open, mock::Event::Close]);
    }

    #[test]
    fn mock_loopback_round_trip() {
        let dev = mock::MockDevice::android(0x18D1, 2);
        let mut h = dev.open().unwrap();
        h.claim_interface(0).unwrap();
        assert_eq!(h.bulk_out(0x01, b"ping", None).unwrap(), 4);
        let mut buf = [0u8; 16];
        let n = h.bulk_in(0x81, &mut buf, None).unwrap();
        assert_eq!(&buf[..n], b"ping");
    }

    #[test]
    fn mock_bulk_requires_claimed_interface() {
        let dev = mock::MockDevice::android(0x18D1, 2);
        let mut h = dev.open().unwrap();
        assert!(matches!(
            h.bulk_out(0x01, b"x", None),
            Err(TransportError::NotFound(_))
        ));
    }
}
