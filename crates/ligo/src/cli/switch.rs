//! `switch` subcommand: send the accessory identity and START_ACCESSORY.

use super::{
    Config, DeviceSelector, HandshakeState, Result, StringOutcomeJson, SwitchOutput, UsbBus,
    UsbDevice, kv, kv_indent, kv_width, print_json, select_device,
};
use ligo_lib::accessory::{HandshakeReport, set_configuration, switch_to_accessory_mode};
use ligo_lib::discovery::list_accessory_capable_devices;
use ligo_lib::reenumerate::{BackoffConfig, wait_for_accessory};

fn string_outcomes(report: &HandshakeReport) -> Vec<StringOutcomeJson> {
    report
        .identity
        .outcomes()
        .iter()
        .map(|o| StringOutcomeJson {
            index: o.index,
            length: o.length,
            ok: o.result.is_ok(),
            code: match &o.result {
                Ok(()) => 0,
                Err(f) => f.code(),
            },
            error: o.result.as_ref().err().map(|f| f.to_string()),
        })
        .collect()
}

pub(super) fn cmd_switch<B: UsbBus>(
    bus: &B,
    selector: Option<&DeviceSelector>,
    config: &Config,
    wait: bool,
    json: bool,
) -> Result<()> {
    config.identity.validate()?;
    for problem in config.identity.problems() {
        log::warn!("[identity] {problem}");
    }

    let device = select_device(
        list_accessory_capable_devices(bus)?,
        selector,
        "accessory-capable",
    )?;
    let location = device.location();

    if config.set_configuration
        && let Err(e) = set_configuration(&device)
    {
        log::warn!("{location}: SET_CONFIGURATION failed, continuing: {e}");
    }

    let report = switch_to_accessory_mode(&device, &config.identity)?;
    drop(device);

    let start_ok = matches!(report.start, Some(Ok(())));
    let accessory = if wait && start_ok {
        let dev = wait_for_accessory(bus, config.reenumerate_timeout(), BackoffConfig::default())?;
        Some(dev.location())
    } else {
        None
    };

    let result = report.result();

    if json {
        print_json(&SwitchOutput {
            location,
            state: report.state,
            strings: string_outcomes(&report),
            start_error: match &report.start {
                Some(Err(e)) => Some(e.to_string()),
                _ => None,
            },
            error: result.as_ref().err().map(|e| e.to_string()),
            accessory,
        })?;
        return result;
    }

    let w = kv_width(
        &["Device:", "State:", "Accessory:"],
        &["manufacturer:", "description:"],
    );
    kv("Device:", &location, w);
    println!("Identity:");
    for outcome in report.identity.outcomes() {
        let key = format!("{}:", outcome.index);
        match &outcome.result {
            Ok(()) => kv_indent(&key, format_args!("ok ({} bytes)", outcome.length), w),
            Err(f) => kv_indent(&key, format_args!("FAILED: {f}"), w),
        }
    }
    kv("State:", report.state, w);
    match &accessory {
        Some(loc) => kv("Accessory:", loc, w),
        None if report.state == HandshakeState::SwitchRequested && start_ok && !wait => {
            println!();
            println!("The device should now re-enumerate in accessory mode.");
        }
        None => {}
    }

    result
}
