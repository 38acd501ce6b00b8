//! `devices` subcommand: list switchable and accessory-mode devices.

use super::{DevicesOutput, DiscoveredDevice, Result, UsbBus, discovery, print_json, usb_id};

/// One line per device, without the leading index.
pub(super) fn describe(dev: &DiscoveredDevice) -> String {
    let vendor = dev.vendor_name.unwrap_or("Unknown vendor");
    let status = match (dev.accessory_mode, dev.protocol_version) {
        (Some(mode), _) => format!("accessory mode ({mode})"),
        (None, Some(v)) if v.is_supported() => format!("{v}, can switch"),
        (None, Some(v)) => format!("{v}, unsupported"),
        (None, None) if dev.class != 0 => format!("class 0x{:02x}, not probed", dev.class),
        (None, None) => "no AOA support".to_string(),
    };
    format!(
        "{} {} ({vendor}) {status}",
        dev.location,
        usb_id(dev.vendor_id, dev.product_id)
    )
}

pub(super) fn cmd_devices<B: UsbBus>(bus: &B, json: bool) -> Result<()> {
    let devices: Vec<DiscoveredDevice> = discovery::survey(bus)?
        .into_iter()
        .filter(|d| d.is_capable() || d.accessory_mode.is_some())
        .collect();

    if json {
        return print_json(&DevicesOutput {
            count: devices.len(),
            devices,
        });
    }

    if devices.is_empty() {
        println!("No accessory-capable devices found.");
        return Ok(());
    }

    println!(
        "Found {} device{}:",
        devices.len(),
        if devices.len() == 1 { "" } else { "s" }
    );
    println!();

    for (i, dev) in devices.iter().enumerate() {
        println!("  [{}] {}", i + 1, describe(dev));
    }

    Ok(())
}
