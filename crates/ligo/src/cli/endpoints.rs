//! `endpoints` subcommand: show which bulk endpoints carry the byte stream.

use super::{
    DeviceSelector, EndpointsOutput, Result, UsbBus, UsbDevice, kv, kv_indent, kv_width,
    print_json, select_accessory, usb_id,
};
use ligo_lib::endpoints::{EndpointPair, discover_endpoints};

fn address(ep: Option<u8>) -> String {
    match ep {
        Some(addr) => format!("0x{addr:02x}"),
        None => "(none)".to_string(),
    }
}

pub(super) fn cmd_endpoints<B: UsbBus>(
    bus: &B,
    selector: Option<&DeviceSelector>,
    json: bool,
) -> Result<()> {
    let device = select_accessory(bus, selector)?;
    let desc = device.descriptor();
    let pair = discover_endpoints(&device, &mut EndpointPair::new());

    if json {
        return print_json(&EndpointsOutput {
            location: device.location(),
            vendor_id: desc.vendor_id,
            product_id: desc.product_id,
            endpoints: pair,
            complete: pair.is_complete(),
        });
    }

    let w = kv_width(&["Device:", "Endpoints:"], &["IN:", "OUT:"]);
    kv(
        "Device:",
        format_args!(
            "{} {}",
            device.location(),
            usb_id(desc.vendor_id, desc.product_id)
        ),
        w,
    );
    println!("Endpoints:");
    kv_indent("IN:", address(pair.input()), w);
    kv_indent("OUT:", address(pair.output()), w);

    if !pair.is_complete() {
        log::warn!("no usable IN/OUT pair, read and write will fail on this device");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ligo_lib::LigoError;
    use ligo_lib::protocol::{AOA_PID_ACCESSORY, GOOGLE_VID};
    use ligo_lib::transport::mock::{MockBus, MockDevice, accessory_config};

    #[test]
    fn address_formatting() {
        assert_eq!(address(Some(0x81)), "0x81");
        assert_eq!(address(None), "(none)");
    }

    #[test]
    fn endpoints_of_accessory_device() {
        let dev = MockDevice::new(GOOGLE_VID, AOA_PID_ACCESSORY).with_config(accessory_config());
        let bus = MockBus::with_devices(vec![dev.clone()]);
        cmd_endpoints(&bus, None, true).unwrap();
        assert_eq!(dev.opens(), dev.closes());
    }

    #[test]
    fn endpoints_without_accessory_device() {
        let bus = MockBus::with_devices(vec![MockDevice::android(0x04E8, 2)]);
        assert!(matches!(
            cmd_endpoints(&bus, None, false),
            Err(LigoError::NotFound(_))
        ));
    }
}
