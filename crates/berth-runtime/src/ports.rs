//! Host port allocation
//!
//! The used-port set is read by the caller before allocating, so callers
//! must serialize read-allocate-insert sequences themselves.

use berth_core::{Error, PortSettings, Result};
use std::collections::HashSet;
use std::net::TcpListener;
use tracing::debug;

/// Finds free host ports within a range
#[derive(Debug, Clone)]
pub struct PortAllocator {
    bind_host: String,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new("0.0.0.0")
    }
}

impl PortAllocator {
    pub fn new(bind_host: impl Into<String>) -> Self {
        Self {
            bind_host: bind_host.into(),
        }
    }

    pub fn from_settings(settings: &PortSettings) -> Self {
        Self::new(settings.bind_host.clone())
    }

    /// Lowest port in `start..=end` that is not in `used` and can be bound right now
    pub fn allocate(&self, start: u16, end: u16, used: &HashSet<u16>) -> Result<u16> {
        for port in start..=end {
            if used.contains(&port) {
                continue;
            }
            if self.is_bindable(port) {
                debug!("Allocated port {}", port);
                return Ok(port);
            }
        }
        Err(Error::NoPortAvailable { start, end })
    }

    /// Primary port plus a secondary port searched from primary + 1
    pub fn allocate_pair(&self, start: u16, end: u16, used: &HashSet<u16>) -> Result<(u16, u16)> {
        let primary = self.allocate(start, end, used)?;

        let mut used = used.clone();
        used.insert(primary);
        let secondary_start = primary
            .checked_add(1)
            .ok_or(Error::NoPortAvailable { start, end })?;
        let secondary = self.allocate(secondary_start, end, &used)?;

        Ok((primary, secondary))
    }

    /// Exclusive bind test; the listener is dropped immediately
    fn is_bindable(&self, port: u16) -> bool {
        TcpListener::bind((self.bind_host.as_str(), port)).is_ok()
    }
}
