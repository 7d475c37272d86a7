//! End-to-end encrypted messaging sessions.
//!
//! Pairwise sessions are established with an X3DH pre-key agreement and then
//! run a double ratchet; group messages use per-sender signed key chains.
//! All state lives in a caller-supplied async store as opaque record bytes,
//! and decryption tolerates the record shapes older deployments left behind.

mod types;
pub use types::*;

mod error;
pub use error::Error;

mod config;
pub use config::SessionConfig;

mod address;
pub use address::*;

mod identity_key;
pub use identity_key::*;

mod pre_key;
pub use pre_key::*;

mod message;
pub use message::*;

mod store;
pub use store::*;

mod session;
pub use session::*;

mod group;
pub use group::*;

mod chain;
mod proto;
mod x3dh;
