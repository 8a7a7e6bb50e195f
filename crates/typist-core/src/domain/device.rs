//! Identity of a peripheral the user has chosen.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier plus the advertised name of a peripheral.
///
/// The identifier is whatever the BLE stack uses to find the device again
/// (a MAC address on Linux and Windows, a CoreBluetooth UUID on macOS).  Only
/// the identifier is persisted between runs; the name is refreshed from the
/// advertisement each time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle {
    pub id: String,
    pub name: Option<String>,
}

impl DeviceHandle {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }

    /// Returns `true` when the advertised name starts with `pattern`.
    ///
    /// An empty pattern matches every device, named or not.
    pub fn name_matches(&self, pattern: &str) -> bool {
        if pattern.is_empty() {
            return true;
        }
        self.name
            .as_deref()
            .is_some_and(|name| name.starts_with(pattern))
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", self.id),
            None => f.write_str(&self.id),
        }
    }
}
