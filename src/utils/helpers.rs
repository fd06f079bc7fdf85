//! Utility functions and helpers for the latency probe
//!
//! This module provides small helpers shared by the configuration and reporting code.

use std::borrow::Cow;

/// Join host and port into the address string the byte-stream source connects to.
///
/// IPv6 literals are bracketed so the port separator stays unambiguous.
pub fn endpoint(address: &str, port: u16) -> String {
    let address = address.trim();
    if address.contains(':') && !address.starts_with('[') {
        format!("[{}]:{}", address, port)
    } else {
        format!("{}:{}", address, port)
    }
}

/// Decode a received unit for live echo. Invalid UTF-8 is replaced, never fatal.
pub fn decode_for_echo(data: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(data)
}
