//! typist-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does typist-client do? (for beginners)
//!
//! A Typist is a small Bluetooth Low Energy (BLE) peripheral that shows up as
//! a USB keyboard on the computer it is plugged into.  Whatever text it
//! receives over BLE, it types.  It also stores *macros*, named scripts the
//! user can trigger later, and an optional startup script.
//!
//! This crate is the *other* side of that radio link:
//!
//! 1. Finds a Typist (or re-attaches to the one used last time).
//! 2. Resolves the serial-style service: one write channel, one notify
//!    channel.
//! 3. Sends text and `:CFG:` commands in 20-byte chunks, strictly in order.
//! 4. Rebuilds the JSON configuration snapshot the device streams back.
//! 5. Reconnects with exponential backoff when the link drops.
//!
//! The link logic lives in [`application`]; the real radio, files on disk,
//! and the console front-end live in [`infrastructure`].

/// Application layer: transport seam, writer lane, session controller.
pub mod application;

/// Infrastructure layer: btleplug backend, mock backend, storage, console.
pub mod infrastructure;
