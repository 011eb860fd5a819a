//! The session engine seam.
//!
//! The engine owns the wire encoding (CBOR/COSE), the ephemeral key agreement and the
//! session encryption. The session manager threads the engine's state through it as an
//! opaque, move-only [SessionEngine::Token]: each state-advancing call consumes the
//! token and hands back its successor, so a stale token can never be replayed.
use uuid::Uuid;

use crate::definitions::device_request::{DocType, ItemsRequest};
use crate::definitions::Credential;
use crate::presentation::disclosure::ApprovedItems;

/// The metadata the engine extracts from an issuer-signed `COSE_Sign1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerMetadata {
    pub doc_type: DocType,
    /// Canonical encoding of the parsed mobile security object.
    ///
    /// Credential identity is derived from it, so it must not depend on
    /// anything outside the issuer-signed payload.
    pub fingerprint: Vec<u8>,
}

/// Cryptographic session engine used by the device.
pub trait SessionEngine {
    /// Session keys and message counters of one session.
    ///
    /// Intentionally not `Clone`.
    type Token;

    /// Parses the issuer-signed mobile security object.
    fn parse_issuer_auth(&self, issuer_auth: &[u8]) -> anyhow::Result<IssuerMetadata>;

    /// Generates the ephemeral device key and the device engagement for `credential`.
    ///
    /// Returns the initial token and the engagement payload. Must not touch any transport.
    fn initialize_session(
        &self,
        credential: &Credential,
        correlation_id: Uuid,
    ) -> anyhow::Result<(Self::Token, Vec<u8>)>;

    /// Processes the reader's session establishment, decrypting the request in it.
    fn decode_request(
        &self,
        token: Self::Token,
        request: &[u8],
    ) -> anyhow::Result<(Self::Token, ItemsRequest)>;

    /// Assembles the unsigned device response containing exactly `approved`.
    ///
    /// Returns the advanced token and the payload the device key has to sign.
    fn build_response(
        &self,
        token: Self::Token,
        approved: &ApprovedItems,
    ) -> anyhow::Result<(Self::Token, Vec<u8>)>;

    /// Attaches the device signature and encrypts the response for the transport.
    ///
    /// This is the last engine call of a session; the token is consumed for good.
    fn attach_signature(&self, token: Self::Token, signature: &[u8]) -> anyhow::Result<Vec<u8>>;
}
