use crate::config::ConfigError;
use crate::definitions::KeyAlias;
use crate::presentation::device::LifecycleState;
use crate::presentation::key_store::KeyStoreError;

/// Various errors that can occur while presenting a credential.
///
/// Every collaborator failure surfaces as one of these variants,
/// and [Error::kind] names its place in the taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The session configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The issuer-signed payload could not be parsed.
    #[error("malformed credential: {0}")]
    MalformedCredential(anyhow::Error),
    /// The session engine could not produce the engagement.
    #[error("unable to initialise session: {0}")]
    EngagementInit(anyhow::Error),
    /// The request received from the reader could not be decoded.
    #[error("unable to decode request: {0}")]
    RequestDecode(anyhow::Error),
    /// The unsigned response could not be assembled.
    #[error("unable to build response: {0}")]
    ResponseBuild(anyhow::Error),
    /// The credential's device key is not in the key store.
    #[error("key not found: {0}")]
    KeyNotFound(KeyAlias),
    /// The key store failed to sign the response.
    #[error("signing failed: {0}")]
    Signing(anyhow::Error),
    /// The signature could not be attached to the response.
    #[error("unable to attach signature: {0}")]
    SignatureAttach(anyhow::Error),
    /// The transport reported an error or could not carry out an operation.
    #[error("transport error: {0}")]
    Transport(String),
    /// An event arrived that is not valid in the current state.
    #[error("unexpected {event} while {state}")]
    ProtocolViolation {
        event: String,
        state: LifecycleState,
    },
}

/// The kind of an [Error], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumIter)]
pub enum ErrorKind {
    InvalidConfig,
    MalformedCredential,
    EngagementInitFailure,
    RequestDecodeFailure,
    ResponseBuildFailure,
    KeyNotFound,
    SigningFailure,
    SignatureAttachFailure,
    TransportError,
    ProtocolViolation,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::InvalidConfig,
            Self::MalformedCredential(_) => ErrorKind::MalformedCredential,
            Self::EngagementInit(_) => ErrorKind::EngagementInitFailure,
            Self::RequestDecode(_) => ErrorKind::RequestDecodeFailure,
            Self::ResponseBuild(_) => ErrorKind::ResponseBuildFailure,
            Self::KeyNotFound(_) => ErrorKind::KeyNotFound,
            Self::Signing(_) => ErrorKind::SigningFailure,
            Self::SignatureAttach(_) => ErrorKind::SignatureAttachFailure,
            Self::Transport(_) => ErrorKind::TransportError,
            Self::ProtocolViolation { .. } => ErrorKind::ProtocolViolation,
        }
    }
}

impl From<KeyStoreError> for Error {
    fn from(e: KeyStoreError) -> Self {
        match e {
            KeyStoreError::KeyNotFound(alias) => Self::KeyNotFound(alias),
            KeyStoreError::Signing(e) => Self::Signing(e),
        }
    }
}
