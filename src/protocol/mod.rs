//! Protocol module - Defines the wire protocol spoken with the modelling
//! microservice
//!
//! Every logical message is one compact JSON object carrying a `type`
//! discriminator, terminated by a single newline byte. The newline is the
//! frame boundary: `serde_json` never emits raw newlines inside a compact
//! document, so a reader can buffer bytes until `\n` and decode exactly one
//! message per line no matter how the TCP stream splits or coalesces writes.

mod message;
mod codec;

pub use message::*;
pub use codec::*;

/// Default port the modelling microservice listens on
pub const DEFAULT_PORT: u16 = 5050;

/// Frame terminator: one JSON object per line
pub const FRAME_DELIMITER: u8 = b'\n';

/// Upper bound on a single encoded frame (64 KiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;
