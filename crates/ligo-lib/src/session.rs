//! Byte-stream I/O over the accessory bulk endpoints, and the process
//! context that owns the transport and the single active session.

use crate::endpoints::{EndpointPair, discover_endpoints};
use crate::error::{LigoError, Result};
use crate::protocol::BUFFER_SIZE;
use crate::transport::{UsbBus, UsbDevice, UsbHandle, timeout_from_millis};

/// Open handle type produced by the devices of bus `B`.
pub type HandleOf<B> = <<B as UsbBus>::Device as UsbDevice>::Handle;

// ── Session ──

/// An open, claimed accessory interface plus the endpoints to stream on.
///
/// Closing releases the interface and then closes the handle. Dropping an
/// open session does the same.
pub struct AccessorySession<H: UsbHandle> {
    handle: Option<H>,
    interface: u8,
    endpoints: EndpointPair,
}

impl<H: UsbHandle> AccessorySession<H> {
    /// Discover endpoints on `device`, open it and claim `interface`.
    ///
    /// An incomplete endpoint pair does not fail the open; transfers on the
    /// missing side return [`LigoError::EndpointsMissing`].
    pub fn open<D: UsbDevice<Handle = H>>(device: &D, interface: u8) -> Result<Self> {
        let mut endpoints = EndpointPair::new();
        discover_endpoints(device, &mut endpoints);
        if !endpoints.is_complete() {
            log::warn!(
                "{}: no complete bulk endpoint pair (in={:?}, out={:?})",
                device.location(),
                endpoints.input(),
                endpoints.output()
            );
        }

        let mut handle = device.open()?;
        handle.claim_interface(interface)?;
        log::info!("{}: interface {interface} claimed", device.location());

        Ok(AccessorySession {
            handle: Some(handle),
            interface,
            endpoints,
        })
    }

    pub fn endpoints(&self) -> EndpointPair {
        self.endpoints
    }

    pub fn in_endpoint(&self) -> Option<u8> {
        self.endpoints.input()
    }

    pub fn out_endpoint(&self) -> Option<u8> {
        self.endpoints.output()
    }

    pub fn interface(&self) -> u8 {
        self.interface
    }

    fn handle_mut(&mut self) -> Result<&mut H> {
        self.handle.as_mut().ok_or(LigoError::NoSession)
    }

    /// Read up to [`BUFFER_SIZE`] bytes from the IN endpoint into `buf`.
    ///
    /// `timeout_ms == 0` blocks until data arrives.
    pub fn read(&mut self, buf: &mut [u8], timeout_ms: u64) -> Result<usize> {
        let endpoint = self.endpoints.input().ok_or(LigoError::EndpointsMissing)?;
        let len = buf.len().min(BUFFER_SIZE);
        let n = self
            .handle_mut()?
            .bulk_in(endpoint, &mut buf[..len], timeout_from_millis(timeout_ms))?;
        log::trace!("bulk in 0x{endpoint:02x}: {n} bytes");
        Ok(n)
    }

    /// Read one transfer into a freshly allocated buffer.
    pub fn read_packet(&mut self, timeout_ms: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; BUFFER_SIZE];
        let n = self.read(&mut buf, timeout_ms)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Write `data` to the OUT endpoint in one transfer. Returns the number
    /// of bytes the device accepted.
    pub fn write(&mut self, data: &[u8], timeout_ms: u64) -> Result<usize> {
        let endpoint = self.endpoints.output().ok_or(LigoError::EndpointsMissing)?;
        let n = self
            .handle_mut()?
            .bulk_out(endpoint, data, timeout_from_millis(timeout_ms))?;
        log::trace!("bulk out 0x{endpoint:02x}: {n} of {} bytes", data.len());
        Ok(n)
    }

    /// Release the interface, then close the handle.
    ///
    /// The handle is closed even if the release fails; the release error is
    /// returned.
    pub fn close(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };
        let released = handle.release_interface(self.interface);
        if let Err(e) = &released {
            log::warn!("releasing interface {}: {e}", self.interface);
        }
        drop(handle);
        log::debug!("accessory session closed");
        released.map_err(LigoError::from)
    }
}

impl<H: UsbHandle> Drop for AccessorySession<H> {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}

// ── Context ──

/// Process-wide context: the initialized transport plus at most one open
/// accessory session.
///
/// The session is torn down before the transport when the context exits or
/// is dropped.
pub struct Ligo<B: UsbBus> {
    session: Option<AccessorySession<HandleOf<B>>>,
    bus: B,
}

impl Ligo<crate::usb::PlatformBus> {
    /// Initialize the platform USB transport.
    pub fn init() -> Result<Self> {
        Ok(Ligo::new(crate::usb::platform_bus()?))
    }
}

impl<B: UsbBus> Ligo<B> {
    pub fn new(bus: B) -> Self {
        Ligo { session: None, bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// See [`crate::discovery::list_accessory_capable_devices`].
    pub fn list_accessory_capable_devices(&self) -> Result<Vec<B::Device>> {
        crate::discovery::list_accessory_capable_devices(&self.bus)
    }

    /// Open the session on `device`. Fails with [`LigoError::SessionActive`]
    /// if one is already open.
    pub fn open_session(
        &mut self,
        device: &B::Device,
        interface: u8,
    ) -> Result<&mut AccessorySession<HandleOf<B>>> {
        if self.session.is_some() {
            return Err(LigoError::SessionActive);
        }
        let session = AccessorySession::open(device, interface)?;
        Ok(self.session.insert(session))
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&mut self) -> Result<&mut AccessorySession<HandleOf<B>>> {
        self.session.as_mut().ok_or(LigoError::NoSession)
    }

    pub fn close_session(&mut self) -> Result<()> {
        self.session.take().ok_or(LigoError::NoSession)?.close()
    }

    /// Close any open session, then release the transport.
    pub fn exit(mut self) {
        if let Some(session) = self.session.take()
            && let Err(e) = session.close()
        {
            log::warn!("closing session on exit: {e}");
        }
        log::debug!("transport released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use crate::transport::mock::{
        Event, MockBus, MockDevice, config_with_endpoints, endpoint,
    };
    use crate::transport::{Direction, TransferType};

    #[test]
    fn open_claims_the_interface() {
        let dev = MockDevice::new(0x18D1, 0x2D00).with_config(
            crate::transport::mock::accessory_config(),
        );
        let session = AccessorySession::open(&dev, 0).unwrap();
        assert_eq!(session.in_endpoint(), Some(0x81));
        assert_eq!(session.out_endpoint(), Some(0x01));
        assert_eq!(dev.events(), vec![Event::Open, Event::Claim(0)]);
    }

    #[test]
    fn loopback_round_trip() {
        let dev = MockDevice::android(0x18D1, 2);
        let mut session = AccessorySession::open(&dev, 0).unwrap();
        assert_eq!(session.write(b"hello accessory", 1000).unwrap(), 15);
        let mut buf = [0u8; 64];
        let n = session.read(&mut buf, 1000).unwrap();
        assert_eq!(&buf[..n], b"hello accessory");
        assert_eq!(
            dev.bulk_transfers(),
            vec![(Direction::Out, 0x01, 15), (Direction::In, 0x81, 64)]
        );
    }

    #[test]
    fn read_is_capped_at_buffer_size() {
        let dev = MockDevice::android(0x18D1, 2);
        dev.push_incoming(vec![7u8; 100]);
        let mut session = AccessorySession::open(&dev, 0).unwrap();
        let mut buf = vec![0u8; BUFFER_SIZE * 2];
        assert_eq!(session.read(&mut buf, 0).unwrap(), 100);
        assert_eq!(dev.bulk_transfers(), vec![(Direction::In, 0x81, BUFFER_SIZE)]);
    }

    #[test]
    fn read_packet_truncates_to_received_length() {
        let dev = MockDevice::android(0x18D1, 2);
        dev.push_incoming(b"abc".to_vec());
        let mut session = AccessorySession::open(&dev, 0).unwrap();
        assert_eq!(session.read_packet(100).unwrap(), b"abc".to_vec());
    }

    #[test]
    fn empty_read_times_out_with_negative_code() {
        let dev = MockDevice::android(0x18D1, 2);
        let mut session = AccessorySession::open(&dev, 0).unwrap();
        let err = session.read(&mut [0u8; 16], 10).unwrap_err();
        assert!(matches!(err, LigoError::Transport(TransportError::Timeout)));
        assert_eq!(err.code(), Some(-7));
    }

    #[test]
    fn transfer_error_is_propagated() {
        let dev = MockDevice::android(0x18D1, 2);
        let mut session = AccessorySession::open(&dev, 0).unwrap();
        dev.fail_bulk(TransportError::NoDevice);
        let err = session.write(b"x", 0).unwrap_err();
        assert_eq!(err.code(), Some(-4));
    }

    #[test]
    fn missing_out_endpoint_never_touches_transport() {
        let dev = MockDevice::new(0x18D1, 0x2D00)
            .with_config(config_with_endpoints(vec![endpoint(0x81, TransferType::Bulk)]));
        let mut session = AccessorySession::open(&dev, 0).unwrap();
        assert!(matches!(
            session.write(b"data", 0),
            Err(LigoError::EndpointsMissing)
        ));
        assert!(dev.bulk_transfers().is_empty());
    }

    #[test]
    fn unreadable_config_leaves_both_sides_missing() {
        let dev = MockDevice::new(0x18D1, 0x2D00);
        let mut session = AccessorySession::open(&dev, 0).unwrap();
        assert_eq!(session.endpoints(), EndpointPair::new());
        assert!(matches!(
            session.read(&mut [0u8; 8], 0),
            Err(LigoError::EndpointsMissing)
        ));
        assert!(dev.bulk_transfers().is_empty());
    }

    #[test]
    fn close_releases_then_closes() {
        let dev = MockDevice::android(0x18D1, 2);
        let session = AccessorySession::open(&dev, 0).unwrap();
        session.close().unwrap();
        assert_eq!(
            dev.events(),
            vec![Event::Open, Event::Claim(0), Event::Release(0), Event::Close]
        );
    }

    #[test]
    fn drop_releases_then_closes() {
        let dev = MockDevice::android(0x18D1, 2);
        drop(AccessorySession::open(&dev, 0).unwrap());
        assert_eq!(
            dev.events(),
            vec![Event::Open, Event::Claim(0), Event::Release(0), Event::Close]
        );
    }

    #[test]
    fn open_failure_yields_no_session() {
        let dev = MockDevice::android(0x18D1, 2)
            .with_open_error(TransportError::Access("usb:1/004".into()));
        assert!(matches!(
            AccessorySession::open(&dev, 0),
            Err(LigoError::Transport(TransportError::Access(_)))
        ));
        assert!(dev.events().is_empty());
    }

    #[test]
    fn context_allows_one_session() {
        let dev = MockDevice::android(0x18D1, 2);
        let mut ligo = Ligo::new(MockBus::with_devices(vec![dev.clone()]));
        ligo.open_session(&dev, 0).unwrap();
        assert!(ligo.has_session());
        assert!(matches!(
            ligo.open_session(&dev, 0),
            Err(LigoError::SessionActive)
        ));
        assert_eq!(dev.opens(), 1);
    }

    #[test]
    fn context_session_requires_open() {
        let mut ligo = Ligo::new(MockBus::new());
        assert!(matches!(ligo.session(), Err(LigoError::NoSession)));
        assert!(matches!(ligo.close_session(), Err(LigoError::NoSession)));
    }

    #[test]
    fn context_reopen_after_close() {
        let dev = MockDevice::android(0x18D1, 2);
        let mut ligo = Ligo::new(MockBus::with_devices(vec![dev.clone()]));
        ligo.open_session(&dev, 0).unwrap();
        ligo.close_session().unwrap();
        assert!(!ligo.has_session());
        ligo.open_session(&dev, 0).unwrap();
        assert_eq!(dev.opens(), 2);
    }

    #[test]
    fn exit_tears_down_in_order() {
        let dev = MockDevice::android(0x18D1, 2);
        let mut ligo = Ligo::new(MockBus::with_devices(vec![dev.clone()]));
        ligo.open_session(&dev, 0).unwrap().write(b"bye", 0).unwrap();
        ligo.exit();
        assert_eq!(
            dev.events(),
            vec![Event::Open, Event::Claim(0), Event::Release(0), Event::Close]
        );
        // Only the test's own reference is left.
        assert_eq!(dev.ref_count(), 1);
    }

    #[test]
    fn context_lists_capable_devices() {
        let ligo = Ligo::new(MockBus::with_devices(vec![
            MockDevice::android(0x18D1, 2),
            MockDevice::android(0x18D1, 1),
        ]));
        assert_eq!(ligo.list_accessory_capable_devices().unwrap().len(), 1);
    }
}
