//! Waiting for a switched device to come back in accessory mode.
//!
//! After START_ACCESSORY the phone drops off the bus and re-enumerates with
//! the Google vendor ID. Polling the bus is retried with exponential backoff
//! until the device appears or the deadline passes.

use std::time::{Duration, Instant};

use crate::discovery::find_accessory_mode_devices;
use crate::error::{LigoError, Result};
use crate::transport::UsbBus;

/// Configuration for polling backoff.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the second poll.
    pub initial_delay: Duration,
    /// Maximum delay between polls.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed poll.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

/// Retry state machine with exponential backoff.
#[derive(Debug)]
pub struct RetryState {
    config: BackoffConfig,
    current_delay: Duration,
    last_attempt: Option<Instant>,
    consecutive_failures: u32,
}

impl RetryState {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
            last_attempt: None,
            consecutive_failures: 0,
        }
    }

    /// Record a failed attempt and advance the backoff.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.last_attempt = Some(Instant::now());

        let next = self.current_delay.as_secs_f64() * self.config.multiplier;
        self.current_delay = Duration::from_secs_f64(next).min(self.config.max_delay);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Current backoff delay before the next attempt.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Time left until the next attempt is allowed.
    pub fn remaining_delay(&self) -> Duration {
        match self.last_attempt {
            None => Duration::ZERO,
            Some(last) => self.current_delay.saturating_sub(last.elapsed()),
        }
    }
}

/// Poll `bus` until a device in accessory mode appears.
///
/// The first poll happens immediately. Enumeration errors count as a failed
/// poll, since the bus is briefly unreadable while the device re-enumerates.
/// Returns [`LigoError::Timeout`] once `timeout` has passed.
pub fn wait_for_accessory<B: UsbBus>(
    bus: &B,
    timeout: Duration,
    config: BackoffConfig,
) -> Result<B::Device> {
    let deadline = Instant::now() + timeout;
    let mut state = RetryState::new(config);

    loop {
        match find_accessory_mode_devices(bus) {
            Ok(mut found) if !found.is_empty() => {
                log::info!("accessory-mode device is back");
                return Ok(found.swap_remove(0));
            }
            Ok(_) => state.record_failure(),
            Err(e) => {
                state.record_failure();
                log::debug!("enumeration during re-enumeration wait: {e}");
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(LigoError::Timeout(format!(
                "no accessory-mode device after {} ms ({} polls)",
                timeout.as_millis(),
                state.consecutive_failures()
            )));
        }
        log::debug!(
            "no accessory-mode device yet (poll {}, retry in {:.2}s)",
            state.consecutive_failures(),
            state.current_delay().as_secs_f64()
        );
        std::thread::sleep(state.remaining_delay().min(deadline - now));
    }
}
