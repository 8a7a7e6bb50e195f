//! Domain layer: pure types with no I/O.
//!
//! # What belongs in the domain layer?
//!
//! - The configuration document the peripheral streams back
//! - The identity of a peripheral the user has authorised
//! - Bookkeeping for "replace last input"
//! - The reconnect backoff policy
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `btleplug`, or file-system types
//! - Timers (the backoff policy returns durations; the caller sleeps)

pub mod backoff;
pub mod config_doc;
pub mod device;
pub mod typed_text;

pub use backoff::ReconnectBackoff;
pub use config_doc::{ConfigDocument, FsUsage, MacroRecord};
pub use device::DeviceHandle;
pub use typed_text::TypedTextTracker;
