//! Storage infrastructure: configuration and session state on disk.
//!
//! - `config` reads the user-editable `config.toml` from the platform config
//!   directory and projects it onto the runtime `SessionConfig`.
//! - `state` persists the remembered device id and the last error in
//!   `state.toml`, next to the config file.
//!
//! Both files are TOML, and a missing file always means "use the defaults".

pub mod config;
pub mod state;
