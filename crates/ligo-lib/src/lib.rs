//! ligo: Android Open Accessory host library.
//!
//! Finds phones that speak AOA v2, switches them into accessory mode and
//! streams bytes over the accessory bulk endpoints.

pub mod accessory;
pub mod config;
pub mod discovery;
pub mod endpoints;
pub mod error;
pub mod probe;
pub mod protocol;
pub mod reenumerate;
pub mod session;
pub mod transport;
pub mod usb;
pub mod vendors;

pub use error::LigoError;
