//! Accessory-mode switch: identity strings, start command, handshake state.
//!
//! The handshake runs on a single open handle:
//!
//! ```text
//! Probed --send_identity--> IdentitySent --request_switch--> SwitchRequested
//! ```
//!
//! After START_ACCESSORY the device detaches and re-enumerates with the
//! Google vendor ID and an accessory product ID. Waiting for that is left to
//! the caller (see [`crate::reenumerate`]).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LigoError, Result};
use crate::protocol::{
    ACCESSORY_CONFIGURATION, SEND_STRING, SET_CONFIGURATION, START_ACCESSORY, USB_TIMEOUT_MS,
};
use crate::transport::{self, ControlSetup, TransportError, UsbDevice, UsbHandle};

fn control_timeout() -> Option<Duration> {
    Some(Duration::from_millis(USB_TIMEOUT_MS))
}

// ── Identity ──

/// Position of an identity string. The discriminant is the SEND_STRING `wIndex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StringIndex {
    Manufacturer = 0,
    Model = 1,
    Description = 2,
    Version = 3,
    Uri = 4,
    Serial = 5,
}

impl StringIndex {
    /// Wire order.
    pub const ALL: [StringIndex; 6] = [
        StringIndex::Manufacturer,
        StringIndex::Model,
        StringIndex::Description,
        StringIndex::Version,
        StringIndex::Uri,
        StringIndex::Serial,
    ];

    pub fn index(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            StringIndex::Manufacturer => "manufacturer",
            StringIndex::Model => "model",
            StringIndex::Description => "description",
            StringIndex::Version => "version",
            StringIndex::Uri => "uri",
            StringIndex::Serial => "serial",
        }
    }
}

impl fmt::Display for StringIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The six strings an accessory identifies itself with.
///
/// Android matches manufacturer, model and version against the
/// `<usb-accessory>` filters of installed apps; description and URI are
/// shown to the user when no app matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessoryIdentity {
    pub manufacturer: String,
    pub model: String,
    pub description: String,
    pub version: String,
    pub uri: String,
    pub serial: String,
}

impl Default for AccessoryIdentity {
    fn default() -> Self {
        AccessoryIdentity {
            manufacturer: "ligo".into(),
            model: "ligo".into(),
            description: "Android Open Accessory host".into(),
            version: "1.0".into(),
            uri: String::new(),
            serial: "0000000000000001".into(),
        }
    }
}

impl AccessoryIdentity {
    pub fn get(&self, index: StringIndex) -> &str {
        match index {
            StringIndex::Manufacturer => &self.manufacturer,
            StringIndex::Model => &self.model,
            StringIndex::Description => &self.description,
            StringIndex::Version => &self.version,
            StringIndex::Uri => &self.uri,
            StringIndex::Serial => &self.serial,
        }
    }

    pub fn get_mut(&mut self, index: StringIndex) -> &mut String {
        match index {
            StringIndex::Manufacturer => &mut self.manufacturer,
            StringIndex::Model => &mut self.model,
            StringIndex::Description => &mut self.description,
            StringIndex::Version => &mut self.version,
            StringIndex::Uri => &mut self.uri,
            StringIndex::Serial => &mut self.serial,
        }
    }

    /// `(index, value)` pairs in wire order.
    pub fn entries(&self) -> impl Iterator<Item = (StringIndex, &str)> {
        StringIndex::ALL.into_iter().map(|i| (i, self.get(i)))
    }

    /// Every problem with the identity, one message per string.
    ///
    /// Includes empty manufacturer or model strings, which Android accepts
    /// but no app filter will match.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for index in [StringIndex::Manufacturer, StringIndex::Model] {
            if self.get(index).is_empty() {
                problems.push(format!("{index} string is empty"));
            }
        }
        problems.extend(self.wire_problems());
        problems
    }

    /// Strings that cannot be sent as a NUL-terminated control payload.
    fn wire_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (index, value) in self.entries() {
            if value.contains('\0') {
                problems.push(format!("{index} string contains a NUL byte"));
            }
            if value.len() + 1 > u16::MAX as usize {
                problems.push(format!("{index} string is too long ({} bytes)", value.len()));
            }
        }
        problems
    }

    /// Reject identities that cannot go on the wire. Empty strings are sent
    /// as a lone NUL.
    pub fn validate(&self) -> Result<()> {
        match self.wire_problems().into_iter().next() {
            Some(problem) => Err(LigoError::Config(problem)),
            None => Ok(()),
        }
    }
}

/// String bytes followed by the NUL terminator the device expects.
pub fn nul_terminated(value: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(value.len() + 1);
    payload.extend_from_slice(value.as_bytes());
    payload.push(0);
    payload
}

// ── Per-string outcome ──

/// Why one SEND_STRING transfer failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringFailure {
    /// The device accepted fewer bytes than the payload length.
    Short { expected: usize, actual: usize },
    Transport(TransportError),
}

impl StringFailure {
    /// Transfer result code: the short byte count, or the negative status.
    pub fn code(&self) -> i32 {
        match self {
            StringFailure::Short { actual, .. } => *actual as i32,
            StringFailure::Transport(e) => e.code(),
        }
    }
}

impl fmt::Display for StringFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StringFailure::Short { expected, actual } => {
                write!(f, "short transfer: sent {actual} of {expected} bytes")
            }
            StringFailure::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for StringFailure {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringOutcome {
    pub index: StringIndex,
    /// Payload length including the NUL terminator.
    pub length: usize,
    pub result: std::result::Result<(), StringFailure>,
}

/// Outcome of every SEND_STRING transfer, in the order they were sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityReport {
    outcomes: Vec<StringOutcome>,
}

impl IdentityReport {
    pub fn outcomes(&self) -> &[StringOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, index: StringIndex) -> Option<&StringOutcome> {
        self.outcomes.iter().find(|o| o.index == index)
    }

    pub fn failures(&self) -> impl Iterator<Item = (StringIndex, &StringFailure)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|f| (o.index, f)))
    }

    /// The most recent failure seen.
    pub fn last_failure(&self) -> Option<(StringIndex, &StringFailure)> {
        self.failures().last()
    }

    pub fn is_ok(&self) -> bool {
        self.last_failure().is_none()
    }

    /// `0` on success, otherwise the code of the last failing transfer.
    pub fn result_code(&self) -> i32 {
        self.last_failure().map_or(0, |(_, f)| f.code())
    }

    /// The last failure as an error.
    pub fn to_result(&self) -> Result<()> {
        match self.last_failure() {
            Some((index, failure)) => Err(LigoError::Identity {
                index,
                failure: failure.clone(),
            }),
            None => Ok(()),
        }
    }
}

// ── Handshake primitives ──

/// Send all six identity strings on `handle`.
///
/// Every string is attempted even if an earlier one fails; the device may
/// still accept later strings. Failures are kept per string in the report.
pub fn send_accessory_identity(
    handle: &impl UsbHandle,
    identity: &AccessoryIdentity,
) -> IdentityReport {
    let mut report = IdentityReport::default();
    for (index, value) in identity.entries() {
        let payload = nul_terminated(value);
        let setup = ControlSetup::vendor(SEND_STRING, 0, index.index());
        let result = match handle.control_out(setup, &payload, control_timeout()) {
            Ok(n) if n == payload.len() => Ok(()),
            Ok(n) => Err(StringFailure::Short {
                expected: payload.len(),
                actual: n,
            }),
            Err(e) => Err(StringFailure::Transport(e)),
        };
        match &result {
            Ok(()) => log::debug!("SEND_STRING {index}: {} bytes", payload.len()),
            Err(f) => log::warn!("SEND_STRING {index}: {f}"),
        }
        report.outcomes.push(StringOutcome {
            index,
            length: payload.len(),
            result,
        });
    }
    report
}

/// Send START_ACCESSORY on `handle`.
pub fn send_start_command(handle: &impl UsbHandle) -> transport::Result<()> {
    handle.control_out(
        ControlSetup::vendor(START_ACCESSORY, 0, 0),
        &[],
        control_timeout(),
    )?;
    Ok(())
}

/// Select configuration 1 on a transiently opened handle.
///
/// Best-effort: callers log the error and carry on with the handshake.
pub fn set_configuration<D: UsbDevice>(device: &D) -> Result<()> {
    let handle = device.open()?;
    handle.control_out(
        ControlSetup::standard(SET_CONFIGURATION, ACCESSORY_CONFIGURATION, 0),
        &[],
        control_timeout(),
    )?;
    log::debug!("{}: configuration {ACCESSORY_CONFIGURATION} set", device.location());
    Ok(())
}

// ── State machine ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandshakeState {
    /// Device confirmed AOA-capable, nothing sent yet.
    Probed,
    IdentitySent,
    SwitchRequested,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeState::Probed => write!(f, "probed"),
            HandshakeState::IdentitySent => write!(f, "identity-sent"),
            HandshakeState::SwitchRequested => write!(f, "switch-requested"),
        }
    }
}

/// Drives the handshake on one open handle. Dropping it closes the handle.
pub struct AccessorySwitcher<H: UsbHandle> {
    handle: H,
    state: HandshakeState,
    identity: Option<IdentityReport>,
    start: Option<transport::Result<()>>,
}

impl<H: UsbHandle> AccessorySwitcher<H> {
    /// Wrap a handle to a device that has already been probed.
    pub fn new(handle: H) -> Self {
        AccessorySwitcher {
            handle,
            state: HandshakeState::Probed,
            identity: None,
            start: None,
        }
    }

    /// Open a fresh handle on `device`.
    pub fn open<D: UsbDevice<Handle = H>>(device: &D) -> Result<Self> {
        Ok(Self::new(device.open()?))
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Probed → IdentitySent. Transport failures are recorded in the report,
    /// not returned; only an out-of-order call is an error.
    pub fn send_identity(&mut self, identity: &AccessoryIdentity) -> Result<&IdentityReport> {
        if self.state != HandshakeState::Probed {
            return Err(LigoError::Handshake(format!(
                "cannot send identity in state {}",
                self.state
            )));
        }
        let report = send_accessory_identity(&self.handle, identity);
        self.state = HandshakeState::IdentitySent;
        log::info!(
            "identity sent ({} of 6 strings accepted)",
            report.outcomes().iter().filter(|o| o.result.is_ok()).count()
        );
        Ok(self.identity.insert(report))
    }

    /// IdentitySent → SwitchRequested. The state advances even if the
    /// transfer fails; the failure is returned and kept for the report.
    pub fn request_switch(&mut self) -> Result<()> {
        if self.state != HandshakeState::IdentitySent {
            return Err(LigoError::Handshake(format!(
                "cannot request accessory mode in state {}",
                self.state
            )));
        }
        let result = send_start_command(&self.handle);
        self.state = HandshakeState::SwitchRequested;
        self.start = Some(result.clone());
        match result {
            Ok(()) => {
                log::info!("accessory mode requested");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Close the handle and summarize what was sent.
    pub fn into_report(self) -> HandshakeReport {
        HandshakeReport {
            state: self.state,
            identity: self.identity.unwrap_or_default(),
            start: self.start,
        }
    }
}

/// Summary of a completed (or partially completed) handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeReport {
    pub state: HandshakeState,
    pub identity: IdentityReport,
    /// `None` if START_ACCESSORY was never sent.
    pub start: Option<transport::Result<()>>,
}

impl HandshakeReport {
    /// The most recent failure: the start command if it failed, otherwise
    /// the last failing identity string.
    pub fn result(&self) -> Result<()> {
        if let Some(Err(e)) = &self.start {
            return Err(LigoError::Transport(e.clone()));
        }
        self.identity.to_result()
    }
}

/// Run the whole handshake on a freshly opened handle, closing it afterwards.
///
/// Only an invalid identity or a failure to open the device is returned as
/// an error; transfer failures are collected in the report.
pub fn switch_to_accessory_mode<D: UsbDevice>(
    device: &D,
    identity: &AccessoryIdentity,
) -> Result<HandshakeReport> {
    identity.validate()?;
    let mut switcher = AccessorySwitcher::open(device)?;
    switcher.send_identity(identity)?;
    if let Err(e) = switcher.request_switch() {
        log::warn!("{}: START_ACCESSORY failed: {e}", device.location());
    }
    Ok(switcher.into_report())
}
