//! Holder side of an ISO/IEC 18013-5 proximity presentment.
//!
//! A [Credential](definitions::Credential) is presented by a
//! [SessionManager](presentation::device::SessionManager), which advertises a device
//! engagement, decodes the reader's request, lets the holder choose what to disclose
//! and returns a response signed with the device key.
//!
//! Encoding and session cryptography are delegated to a
//! [SessionEngine](presentation::engine::SessionEngine), the link to a
//! [Transport](presentation::transport::Transport) and device keys to a
//! [KeyStore](presentation::key_store::KeyStore).
pub mod cbor;
pub mod config;
pub mod definitions;
pub mod error;
pub mod presentation;

pub use config::SessionConfig;
pub use error::{Error, ErrorKind};
