//! Common utilities module
//!
//! This module contains shared utilities used across the XTC pipeline.

pub mod error;
pub mod device;

pub use error::{ErrorKind, Result, XtcError};
pub use device::DevicePreset;
