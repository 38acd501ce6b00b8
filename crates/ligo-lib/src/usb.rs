//! Production transport adapter.
//!
//! On Linux the adapter is backed by `nusb` (usbfs, no libusb). Other
//! platforms get a stub bus that never reports any device, so the library
//! and its tests still build there.

use crate::transport;

// ── Linux implementation ──

#[cfg(target_os = "linux")]
mod linux_impl {
    use std::sync::Arc;
    use std::time::Duration;

    use nusb::MaybeFuture;
    use nusb::transfer::{
        Buffer, Bulk, Completion, ControlIn, ControlOut, ControlType, In, Interrupt, Out,
        Recipient, TransferError,
    };

    use crate::transport::{
        AltSetting, ConfigDescriptor, ControlSetup, DeviceDescriptor, EndpointDescriptor,
        InterfaceDescriptor, RequestType, Result, TransferType, TransportError, UsbBus, UsbDevice,
        UsbHandle,
    };

    /// Stand-in for "no timeout": nusb always wants a duration.
    const FOREVER: Duration = Duration::from_secs(u32::MAX as u64);

    fn blocking_timeout(timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or(FOREVER)
    }

    fn map_transfer_error(e: TransferError) -> TransportError {
        match e {
            // Blocking transfers are only cancelled when their timeout expires.
            TransferError::Cancelled => TransportError::Timeout,
            TransferError::Stall => TransportError::Pipe,
            TransferError::Disconnected => TransportError::NoDevice,
            other => TransportError::Io(other.to_string()),
        }
    }

    fn control_type(kind: RequestType) -> ControlType {
        match kind {
            RequestType::Standard => ControlType::Standard,
            RequestType::Class => ControlType::Class,
            RequestType::Vendor => ControlType::Vendor,
        }
    }

    fn transfer_type(kind: nusb::descriptors::TransferType) -> TransferType {
        match kind {
            nusb::descriptors::TransferType::Bulk => TransferType::Bulk,
            nusb::descriptors::TransferType::Interrupt => TransferType::Interrupt,
            nusb::descriptors::TransferType::Isochronous => TransferType::Isochronous,
            _ => TransferType::Control,
        }
    }

    /// Bus backed by usbfs enumeration.
    #[derive(Debug, Default)]
    pub struct NusbBus;

    impl NusbBus {
        pub fn new() -> Self {
            NusbBus
        }
    }

    impl UsbBus for NusbBus {
        type Device = NusbDevice;

        fn devices(&self) -> Result<Vec<NusbDevice>> {
            let devices = nusb::list_devices()
                .wait()
                .map_err(|e| TransportError::Io(format!("USB enumeration: {e}")))?;
            Ok(devices
                .map(|info| NusbDevice {
                    info: Arc::new(info),
                })
                .collect())
        }
    }

    /// Reference-counted handle on an enumerated device.
    #[derive(Debug, Clone)]
    pub struct NusbDevice {
        info: Arc<nusb::DeviceInfo>,
    }

    impl NusbDevice {
        fn open_raw(&self) -> Result<nusb::Device> {
            self.info
                .open()
                .wait()
                .map_err(|e| TransportError::Access(format!("open {}: {e}", self.location())))
        }
    }

    impl UsbDevice for NusbDevice {
        type Handle = NusbHandle;

        fn descriptor(&self) -> DeviceDescriptor {
            DeviceDescriptor {
                class: self.info.class(),
                subclass: self.info.subclass(),
                protocol: self.info.protocol(),
                vendor_id: self.info.vendor_id(),
                product_id: self.info.product_id(),
            }
        }

        fn location(&self) -> String {
            format!("usb:{}/{:03}", self.info.bus_id(), self.info.device_address())
        }

        /// usbfs only exposes configuration descriptors on an open device,
        /// so this opens and closes a transient handle.
        fn active_config(&self) -> Result<ConfigDescriptor> {
            let device = self.open_raw()?;
            let config = device.active_configuration().map_err(|e| {
                TransportError::NotFound(format!("active configuration of {}: {e}", self.location()))
            })?;
            Ok(ConfigDescriptor {
                value: config.configuration_value(),
                interfaces: config
                    .interfaces()
                    .map(|group| InterfaceDescriptor {
                        number: group.interface_number(),
                        alt_settings: group
                            .alt_settings()
                            .map(|alt| AltSetting {
                                alternate_setting: alt.alternate_setting(),
                                class: alt.class(),
                                endpoints: alt
                                    .endpoints()
                                    .map(|ep| EndpointDescriptor {
                                        address: ep.address(),
                                        transfer_type: transfer_type(ep.transfer_type()),
                                        max_packet_size: ep.max_packet_size() as u16,
                                    })
                                    .collect(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
        }

        fn open(&self) -> Result<NusbHandle> {
            Ok(NusbHandle {
                device: self.open_raw()?,
                interface: None,
            })
        }
    }

    /// Open usbfs device. Dropping it releases any claimed interface and
    /// closes the file descriptor.
    pub struct NusbHandle {
        device: nusb::Device,
        interface: Option<(u8, nusb::Interface)>,
    }

    impl NusbHandle {
        fn interface(&self) -> Result<&nusb::Interface> {
            self.interface
                .as_ref()
                .map(|(_, iface)| iface)
                .ok_or_else(|| TransportError::NotFound("no claimed interface".into()))
        }
    }

    /// IN requests are rounded up to whole packets so a full packet never overflows.
    fn in_request_len(len: usize, max_packet_size: usize) -> usize {
        let mps = max_packet_size.max(1);
        len.max(1).div_ceil(mps) * mps
    }

    fn in_buffer(len: usize, max_packet_size: usize) -> Buffer {
        let requested = in_request_len(len, max_packet_size);
        let mut buffer = Buffer::new(requested);
        buffer.set_requested_len(requested);
        buffer
    }

    fn finish_in(completion: Completion, buf: &mut [u8]) -> Result<usize> {
        completion.status.map_err(map_transfer_error)?;
        let n = completion.actual_len;
        if n > buf.len() {
            return Err(TransportError::Overflow);
        }
        buf[..n].copy_from_slice(&completion.buffer[..n]);
        Ok(n)
    }

    fn finish_out(completion: Completion) -> Result<usize> {
        completion.status.map_err(map_transfer_error)?;
        Ok(completion.actual_len)
    }

    impl UsbHandle for NusbHandle {
        fn claim_interface(&mut self, number: u8) -> Result<()> {
            if self.interface.is_some() {
                return Err(TransportError::Busy(format!(
                    "claim interface {number}: another interface is claimed"
                )));
            }
            let iface = self
                .device
                .detach_and_claim_interface(number)
                .wait()
                .map_err(|e| TransportError::Busy(format!("claim interface {number}: {e}")))?;
            self.interface = Some((number, iface));
            Ok(())
        }

        fn release_interface(&mut self, number: u8) -> Result<()> {
            match self.interface.take() {
                Some((claimed, _)) if claimed == number => Ok(()),
                other => {
                    self.interface = other;
                    Err(TransportError::NotFound(format!(
                        "release interface {number}: not claimed"
                    )))
                }
            }
        }

        fn control_in(
            &self,
            setup: ControlSetup,
            buf: &mut [u8],
            timeout: Option<Duration>,
        ) -> Result<usize> {
            let data = self
                .device
                .control_in(
                    ControlIn {
                        control_type: control_type(setup.request_type),
                        recipient: Recipient::Device,
                        request: setup.request,
                        value: setup.value,
                        index: setup.index,
                        length: buf.len().min(u16::MAX as usize) as u16,
                    },
                    blocking_timeout(timeout),
                )
                .wait()
                .map_err(map_transfer_error)?;
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            Ok(n)
        }

        fn control_out(
            &self,
            setup: ControlSetup,
            data: &[u8],
            timeout: Option<Duration>,
        ) -> Result<usize> {
            self.device
                .control_out(
                    ControlOut {
                        control_type: control_type(setup.request_type),
                        recipient: Recipient::Device,
                        request: setup.request,
                        value: setup.value,
                        index: setup.index,
                        data,
                    },
                    blocking_timeout(timeout),
                )
                .wait()
                .map_err(map_transfer_error)?;
            Ok(data.len())
        }

        fn bulk_in(
            &mut self,
            endpoint: u8,
            buf: &mut [u8],
            timeout: Option<Duration>,
        ) -> Result<usize> {
            let iface = self.interface()?;
            let timeout = blocking_timeout(timeout);
            let completion = match iface.endpoint::<Bulk, In>(endpoint) {
                Ok(mut ep) => {
                    let request = in_buffer(buf.len(), ep.max_packet_size());
                    ep.transfer_blocking(request, timeout)
                }
                Err(_) => {
                    let mut ep = iface.endpoint::<Interrupt, In>(endpoint).map_err(|e| {
                        TransportError::NotFound(format!("endpoint 0x{endpoint:02x}: {e}"))
                    })?;
                    let request = in_buffer(buf.len(), ep.max_packet_size());
                    ep.transfer_blocking(request, timeout)
                }
            };
            finish_in(completion, buf)
        }

        fn bulk_out(
            &mut self,
            endpoint: u8,
            data: &[u8],
            timeout: Option<Duration>,
        ) -> Result<usize> {
            let iface = self.interface()?;
            let timeout = blocking_timeout(timeout);
            let request = Buffer::from(data.to_vec());
            let completion = match iface.endpoint::<Bulk, Out>(endpoint) {
                Ok(mut ep) => ep.transfer_blocking(request, timeout),
                Err(_) => {
                    let mut ep = iface.endpoint::<Interrupt, Out>(endpoint).map_err(|e| {
                        TransportError::NotFound(format!("endpoint 0x{endpoint:02x}: {e}"))
                    })?;
                    ep.transfer_blocking(request, timeout)
                }
            };
            finish_out(completion)
        }
    }

}

#[cfg(target_os = "linux")]
pub use linux_impl::{NusbBus, NusbDevice, NusbHandle};

// ── Stub for unsupported platforms ──

#[cfg(not(target_os = "linux"))]
mod stub_impl {
    use std::time::Duration;

    use crate::transport::{
        ConfigDescriptor, ControlSetup, DeviceDescriptor, Result, UsbBus, UsbDevice, UsbHandle,
    };

    /// Bus with nothing attached.
    #[derive(Debug, Default)]
    pub struct StubBus;

    impl UsbBus for StubBus {
        type Device = StubDevice;

        fn devices(&self) -> Result<Vec<StubDevice>> {
            Ok(Vec::new())
        }
    }

    /// Uninhabited: the stub bus never yields a device.
    #[derive(Debug, Clone)]
    pub enum StubDevice {}

    pub enum StubHandle {}

    impl UsbDevice for StubDevice {
        type Handle = StubHandle;

        fn descriptor(&self) -> DeviceDescriptor {
            match *self {}
        }
        fn location(&self) -> String {
            match *self {}
        }
        fn active_config(&self) -> Result<ConfigDescriptor> {
            match *self {}
        }
        fn open(&self) -> Result<StubHandle> {
            match *self {}
        }
    }

    impl UsbHandle for StubHandle {
        fn claim_interface(&mut self, _number: u8) -> Result<()> {
            match *self {}
        }
        fn release_interface(&mut self, _number: u8) -> Result<()> {
            match *self {}
        }
        fn control_in(&self, _: ControlSetup, _: &mut [u8], _: Option<Duration>) -> Result<usize> {
            match *self {}
        }
        fn control_out(&self, _: ControlSetup, _: &[u8], _: Option<Duration>) -> Result<usize> {
            match *self {}
        }
        fn bulk_in(&mut self, _: u8, _: &mut [u8], _: Option<Duration>) -> Result<usize> {
            match *self {}
        }
        fn bulk_out(&mut self, _: u8, _: &[u8], _: Option<Duration>) -> Result<usize> {
            match *self {}
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub use stub_impl::{StubBus, StubDevice, StubHandle};

/// Transport adapter for the current platform.
#[cfg(target_os = "linux")]
pub type PlatformBus = NusbBus;
#[cfg(not(target_os = "linux"))]
pub type PlatformBus = StubBus;

/// Initialize the platform transport adapter.
pub fn platform_bus() -> transport::Result<PlatformBus> {
    log::debug!("initializing USB transport");
    Ok(PlatformBus::default())
}
