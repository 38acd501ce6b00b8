//! `write` subcommand: send bytes to the accessory OUT endpoint.

use super::{
    Config, DeviceSelector, Ligo, LigoError, Result, UsbBus, UsbDevice, WriteOutput, print_json,
};
use ligo_lib::protocol::BUFFER_SIZE;

pub(super) fn cmd_write<B: UsbBus>(
    ligo: &mut Ligo<B>,
    selector: Option<&DeviceSelector>,
    config: &Config,
    payload: &[u8],
    json: bool,
) -> Result<()> {
    let device = super::select_accessory(ligo.bus(), selector)?;
    let location = device.location();
    let session = ligo.open_session(&device, config.interface)?;

    let mut written = 0usize;
    for chunk in payload.chunks(BUFFER_SIZE) {
        let n = session.write(chunk, config.write_timeout_ms)?;
        written += n;
        if n < chunk.len() {
            log::warn!("short write: {n} of {} bytes accepted", chunk.len());
            break;
        }
    }
    ligo.close_session()?;

    if json {
        print_json(&WriteOutput {
            location,
            bytes_written: written,
        })?;
    } else {
        println!("Wrote {written} bytes to {location}");
    }

    if written < payload.len() {
        return Err(LigoError::Io(std::io::Error::new(
            std::io::ErrorKind::WriteZero,
            format!("device accepted {written} of {} bytes", payload.len()),
        )));
    }
    Ok(())
}
