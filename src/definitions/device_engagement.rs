//! Device engagement data handed to the verifier out-of-band.
//!
//! The engagement payload itself is produced by the
//! [SessionEngine](crate::presentation::engine::SessionEngine) and is opaque here.
//! This module only carries it, together with the session identifier,
//! and renders it as the `mdoc:` URI a reader expects to scan from a QR code.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the device engagement is conveyed to the verifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum EngagementMethod {
    /// The engagement payload is displayed as a QR code and scanned by the reader.
    #[default]
    QrCode,
}

/// The engagement of a single session attempt.
///
/// Created once per session by [initialise](crate::presentation::device::initialise)
/// and discarded when the session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementDescriptor {
    session_id: Uuid,
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("qr code has invalid prefix")]
    InvalidPrefix,
    #[error("qr code is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("engagement payload is empty")]
    EmptyPayload,
}

impl EngagementDescriptor {
    const QR_CODE_PREFIX: &'static str = "mdoc:";
    const BASE64_CONFIG: base64::Config = base64::URL_SAFE_NO_PAD;

    pub fn new(session_id: Uuid, payload: Vec<u8>) -> Result<Self, Error> {
        if payload.is_empty() {
            return Err(Error::EmptyPayload);
        }
        Ok(Self {
            session_id,
            payload,
        })
    }

    /// The identifier the transport advertises under.
    ///
    /// It correlates the engagement with the connection, it is not a security boundary.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Renders the engagement payload as an ISO 18013-5 QR code URI.
    ///
    /// # Example
    ///
    /// ```
    /// use mdoc_holder::definitions::EngagementDescriptor;
    /// use uuid::Uuid;
    ///
    /// let engagement = EngagementDescriptor::new(Uuid::nil(), vec![0xd8, 0x18]).unwrap();
    /// assert_eq!(engagement.qr_code_uri(), "mdoc:2Bg");
    /// ```
    pub fn qr_code_uri(&self) -> String {
        let mut qr_code_uri = String::from(Self::QR_CODE_PREFIX);
        base64::encode_config_buf(&self.payload, Self::BASE64_CONFIG, &mut qr_code_uri);
        qr_code_uri
    }

    /// Recovers the engagement payload from a URI produced by [EngagementDescriptor::qr_code_uri].
    pub fn payload_from_qr_code_uri(qr_code_uri: &str) -> Result<Vec<u8>, Error> {
        let encoded = qr_code_uri
            .strip_prefix(Self::QR_CODE_PREFIX)
            .ok_or(Error::InvalidPrefix)?;
        let payload = base64::decode_config(encoded, Self::BASE64_CONFIG)?;
        if payload.is_empty() {
            return Err(Error::EmptyPayload);
        }
        Ok(payload)
    }
}
