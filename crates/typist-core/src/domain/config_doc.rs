//! The configuration snapshot streamed by the peripheral.
//!
//! The firmware answers `:CFG:LIST` with a JSON object:
//!
//! ```json
//! {
//!   "fs": {"used": 1024, "total": 65536, "type": "littlefs"},
//!   "macros": [{"id": 1, "title": "Greeting", "icon": "hand", "script": "Hello"}],
//!   "startupId": 1,
//!   "startupScript": ""
//! }
//! ```
//!
//! Every field is optional.  Older firmware omits `fs` and the startup
//! fields, and newer firmware may add fields this client does not know; both
//! must parse.

use serde::{Deserialize, Serialize};

/// Parsed configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigDocument {
    /// Storage usage of the device's flash file system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsUsage>,
    /// Stored macros, in device order.
    pub macros: Vec<MacroRecord>,
    /// Id of the macro that runs at power-up, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_id: Option<i64>,
    /// Free-form script that runs at power-up, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_script: Option<String>,
}

impl ConfigDocument {
    /// Looks up a macro by id.
    pub fn macro_by_id(&self, id: i64) -> Option<&MacroRecord> {
        self.macros.iter().find(|m| m.id == id)
    }

    /// Returns the startup macro, ignoring ids that do not match any record.
    pub fn startup_macro(&self) -> Option<&MacroRecord> {
        self.startup_id.and_then(|id| self.macro_by_id(id))
    }
}

/// Flash usage reported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FsUsage {
    pub used: u64,
    pub total: u64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FsUsage {
    /// Used space as a whole percentage, `0` when the total is unknown.
    pub fn percent_used(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.used.min(self.total) * 100) / self.total) as u8
    }
}

/// One stored macro.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroRecord {
    pub id: i64,
    pub title: String,
    pub icon: String,
    pub script: String,
}
