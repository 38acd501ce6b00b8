//! `read` subcommand: stream IN transfers to stdout until Ctrl+C.

use std::io::Write;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use super::{Config, DeviceSelector, Ligo, LigoError, RUNNING, Result, UsbBus, UsbDevice};
use ligo_lib::transport::TransportError;

/// Longest single bulk read, so Ctrl+C is noticed. Longer waits are
/// expressed through the idle timeout.
const POLL_MS: u64 = 250;

pub(super) struct ReadOptions {
    pub count: Option<usize>,
    /// Stop after this long without data; 0 keeps reading until Ctrl+C.
    pub idle_timeout_ms: u64,
    pub hex: bool,
}

impl ReadOptions {
    /// Command-line values, with the idle timeout falling back to the
    /// configured read timeout.
    pub fn resolve(
        count: Option<usize>,
        idle_timeout: Option<u64>,
        hex: bool,
        config: &Config,
    ) -> Self {
        ReadOptions {
            count,
            idle_timeout_ms: idle_timeout.unwrap_or(config.read_timeout_ms),
            hex,
        }
    }
}

/// Classic 16-bytes-per-row dump, offsets continuing from `offset`.
pub(super) fn hex_dump(data: &[u8], offset: usize) -> String {
    let mut out = String::new();
    for (row, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect();
        out.push_str(&format!(
            "{:08x}  {:<47}  {ascii}\n",
            offset + row * 16,
            hex.join(" ")
        ));
    }
    out
}

pub(super) fn cmd_read<B: UsbBus>(
    ligo: &mut Ligo<B>,
    selector: Option<&DeviceSelector>,
    config: &Config,
    opts: &ReadOptions,
    out: &mut impl Write,
) -> Result<()> {
    let device = super::select_accessory(ligo.bus(), selector)?;
    log::info!("reading from {}", device.location());
    let session = ligo.open_session(&device, config.interface)?;

    let poll_ms = match opts.idle_timeout_ms {
        0 => POLL_MS,
        idle => idle.min(POLL_MS),
    };
    let idle_limit = (opts.idle_timeout_ms > 0).then(|| Duration::from_millis(opts.idle_timeout_ms));

    let mut transfers = 0usize;
    let mut total = 0usize;
    let mut last_data = Instant::now();

    while RUNNING.load(Ordering::SeqCst) {
        if opts.count.is_some_and(|c| transfers >= c) {
            break;
        }
        if idle_limit.is_some_and(|limit| last_data.elapsed() >= limit) {
            log::info!("no data for {} ms, stopping", opts.idle_timeout_ms);
            break;
        }

        let packet = match session.read_packet(poll_ms) {
            Ok(p) => p,
            Err(LigoError::Transport(TransportError::Timeout)) => continue,
            Err(e) => return Err(e),
        };
        last_data = Instant::now();
        transfers += 1;

        if opts.hex {
            out.write_all(hex_dump(&packet, total).as_bytes())?;
        } else {
            out.write_all(&packet)?;
        }
        out.flush()?;
        total += packet.len();
    }

    log::info!("{total} bytes in {transfers} transfer(s)");
    ligo.close_session()
}
