//! Protocol constants for the Android Open Accessory Protocol (AOAP).
//!
//! Vendor request codes and product IDs follow the AOA 1.0 / 2.0 host
//! documentation. All control requests target the device recipient.

// ── Vendor requests ──

/// Query the supported AOA protocol version.
/// Device-to-host, 2-byte little-endian response.
pub const GET_PROTOCOL: u8 = 51;

/// Send one identification string.
/// Host-to-device, `wIndex` selects the string, payload includes the NUL terminator.
pub const SEND_STRING: u8 = 52;

/// Ask the device to re-enumerate in accessory mode. No payload.
pub const START_ACCESSORY: u8 = 53;

// ── Standard requests ──

/// Standard `SET_CONFIGURATION` request code.
pub const SET_CONFIGURATION: u8 = 0x09;

/// Configuration value selected before the handshake when the device
/// does not expose the accessory configuration yet.
pub const ACCESSORY_CONFIGURATION: u16 = 1;

// ── Versions ──

/// The only protocol version accepted by device discovery.
pub const AOA_PROTOCOL_VERSION: u16 = 2;

// ── Accessory-mode identifiers ──

/// Google vendor ID; every device in accessory mode re-enumerates with it.
pub const GOOGLE_VID: u16 = 0x18D1;

/// Accessory.
pub const AOA_PID_ACCESSORY: u16 = 0x2D00;
/// Accessory + ADB.
pub const AOA_PID_ACCESSORY_ADB: u16 = 0x2D01;
/// Audio (AOA 2.0).
pub const AOA_PID_AUDIO: u16 = 0x2D02;
/// Audio + ADB (AOA 2.0).
pub const AOA_PID_AUDIO_ADB: u16 = 0x2D03;
/// Accessory + audio (AOA 2.0).
pub const AOA_PID_ACCESSORY_AUDIO: u16 = 0x2D04;
/// Accessory + audio + ADB (AOA 2.0).
pub const AOA_PID_ACCESSORY_AUDIO_ADB: u16 = 0x2D05;

// ── Transfers ──

/// Receive buffer size for bulk reads.
pub const BUFFER_SIZE: usize = 16384;

/// Timeout for handshake and probe control transfers, in milliseconds.
pub const USB_TIMEOUT_MS: u64 = 1000;

/// Direction bit of an endpoint address (set = IN).
pub const ENDPOINT_DIR_IN: u8 = 0x80;

/// Interface carrying the accessory data endpoints.
pub const ACCESSORY_INTERFACE: u8 = 0;

/// How long callers wait for a switched device to come back in accessory mode.
pub const REENUMERATE_TIMEOUT_MS: u64 = 5000;
