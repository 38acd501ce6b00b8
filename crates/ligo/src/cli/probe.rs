//! `probe` subcommand: ask every Android-vendor device for its AOA version.

use super::{DevicesOutput, Result, UsbBus, discovery, kv, kv_width, print_json, usb_id};

pub(super) fn cmd_probe<B: UsbBus>(bus: &B, json: bool) -> Result<()> {
    let devices = discovery::survey(bus)?;

    if json {
        return print_json(&DevicesOutput {
            count: devices.len(),
            devices,
        });
    }

    if devices.is_empty() {
        println!("No devices from known Android vendors found.");
        return Ok(());
    }

    let keys: Vec<String> = devices
        .iter()
        .map(|d| format!("{}:", usb_id(d.vendor_id, d.product_id)))
        .collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let w = kv_width(&key_refs, &[]);

    for (key, dev) in keys.iter().zip(&devices) {
        let answer = match (dev.accessory_mode, dev.protocol_version) {
            (Some(mode), _) => format!("already in accessory mode ({mode})"),
            (None, Some(v)) if v.is_supported() => format!("{v}"),
            (None, Some(v)) => format!("{v} (version 2 required)"),
            (None, None) => "no answer".to_string(),
        };
        kv(key, format_args!("{answer}  [{}]", dev.location), w);
    }

    Ok(())
}
