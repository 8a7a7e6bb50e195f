//! Protocol module: chunking, command frames, inbound frame classification,
//! config-stream reassembly, and notification routing.

pub mod chunk;
pub mod command;
pub mod frame;
pub mod reassembler;
pub mod router;

pub use chunk::{chunk_payload, CHUNK_SIZE};
pub use command::{ConfigCommand, MacroDraft, CFG_PREFIX};
pub use frame::InboundFrame;
pub use reassembler::{ConfigReassembler, DecodeError, StreamProgress};
pub use router::{NotificationRouter, RouteOutcome};
