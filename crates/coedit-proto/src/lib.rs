//! # coedit protocol
//!
//! Wire envelopes and MQTT topic scheme for document channels.
//!
//! ## Frames
//!
//! - `ClientFrame`: a peer's outbound message, stamped with who sent it
//! - `ServerFrame`: a message broadcast by the ordering authority
//!
//! Both encode as JSON (default) or CBOR.
//!
//! ## MQTT Topics
//!
//! Topic scheme: `coedit/v1/{tenant}/{doc_hash}/{client|server}`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod messages;
pub mod topics;

pub use messages::{ClientFrame, MessageError, ServerFrame, WireFormat};
pub use topics::{Direction, TopicScheme};
