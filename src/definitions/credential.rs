//! The holder-side credential.
//!
//! A [Credential] pairs the issuer-signed document with the alias of the
//! device key it is bound to. The key itself stays in the
//! [KeyStore](crate::presentation::key_store::KeyStore).
use crate::definitions::device_request::{DocType, NameSpace};
use crate::error::Error;
use crate::presentation::engine::SessionEngine;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Opaque `IssuerSignedItemBytes`, as defined by ISO 18013-5 §8.3.2.1.2.2.
pub type IssuerSignedItemBytes = ByteBuf;

/// Elements in a namespace, in issuance order.
pub type Namespaces = BTreeMap<NameSpace, Vec<IssuerSignedItemBytes>>;

/// Namespace for the name-based UUIDs identifying credentials.
const CREDENTIAL_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5f0d_3a8e_4c1b_4e7a_9b62_0c3d_8e1f_2a47);

/// Reference to a device key held by a key store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyAlias(String);

impl KeyAlias {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyAlias {
    fn from(alias: &str) -> Self {
        Self(alias.to_string())
    }
}

impl From<String> for KeyAlias {
    fn from(alias: String) -> Self {
        Self(alias)
    }
}

/// Device-internal credential datatype.
///
/// Immutable once constructed. Share it between sessions behind an [Arc](std::sync::Arc).
/// Persist it through [Credential::store] and [Credential::restore], which re-derive the
/// identity from the issuer-signed payload.
#[derive(Debug, Clone)]
pub struct Credential {
    id: Uuid,
    doc_type: DocType,
    issuer_auth: ByteBuf,
    namespaces: Namespaces,
    key_alias: KeyAlias,
}

/// The persisted form of a [Credential].
///
/// Only carries what the issuer signed and the key alias. Identity and document type are
/// not stored, they are parsed again on [Credential::restore].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredential {
    issuer_auth: ByteBuf,
    namespaces: Namespaces,
    key_alias: KeyAlias,
}

impl Credential {
    /// Constructs a credential from the signed MSO and its issuer-signed items.
    ///
    /// `issuer_auth` is the `COSE_Sign1` with the MSO as payload. It is parsed by the
    /// session engine and the credential identity is derived from the parsed metadata,
    /// so two credentials built from the same issuer-signed payload share an identity.
    pub fn new<E>(
        engine: &E,
        issuer_auth: Vec<u8>,
        namespaces: BTreeMap<NameSpace, Vec<Vec<u8>>>,
        key_alias: impl Into<KeyAlias>,
    ) -> Result<Self, Error>
    where
        E: SessionEngine + ?Sized,
    {
        let namespaces = namespaces
            .into_iter()
            .map(|(namespace, items)| (namespace, items.into_iter().map(ByteBuf::from).collect()))
            .collect();
        Self::restore(
            engine,
            StoredCredential {
                issuer_auth: ByteBuf::from(issuer_auth),
                namespaces,
                key_alias: key_alias.into(),
            },
        )
    }

    /// Rebuilds a credential from its persisted form.
    pub fn restore<E>(engine: &E, stored: StoredCredential) -> Result<Self, Error>
    where
        E: SessionEngine + ?Sized,
    {
        let metadata = engine
            .parse_issuer_auth(&stored.issuer_auth)
            .map_err(Error::MalformedCredential)?;

        let mut hasher = Sha256::new();
        hasher.update(metadata.doc_type.as_bytes());
        hasher.update([0u8]);
        hasher.update(&metadata.fingerprint);
        let id = Uuid::new_v5(&CREDENTIAL_ID_NAMESPACE, &hasher.finalize());

        let credential = Self {
            id,
            doc_type: metadata.doc_type,
            issuer_auth: stored.issuer_auth,
            namespaces: stored.namespaces,
            key_alias: stored.key_alias,
        };
        tracing::debug!(credential = %credential.id, doc_type = %credential.doc_type, "credential constructed");
        Ok(credential)
    }

    pub fn store(&self) -> StoredCredential {
        StoredCredential {
            issuer_auth: self.issuer_auth.clone(),
            namespaces: self.namespaces.clone(),
            key_alias: self.key_alias.clone(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn issuer_auth(&self) -> &[u8] {
        &self.issuer_auth
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    pub fn key_alias(&self) -> &KeyAlias {
        &self.key_alias
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Credential {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::definitions::device_request::ItemsRequest;
    use crate::presentation::disclosure::ApprovedItems;
    use crate::presentation::engine::IssuerMetadata;

    /// Engine that only knows how to parse issuer auth: `<doc_type>|<mso>`.
    struct ParsingEngine;

    impl SessionEngine for ParsingEngine {
        type Token = ();

        fn parse_issuer_auth(&self, issuer_auth: &[u8]) -> anyhow::Result<IssuerMetadata> {
            let text = std::str::from_utf8(issuer_auth)?;
            let (doc_type, mso) = text
                .split_once('|')
                .ok_or_else(|| anyhow::anyhow!("missing MSO"))?;
            Ok(IssuerMetadata {
                doc_type: doc_type.to_string(),
                fingerprint: mso.as_bytes().to_vec(),
            })
        }

        fn initialize_session(&self, _: &Credential, _: Uuid) -> anyhow::Result<((), Vec<u8>)> {
            anyhow::bail!("not supported")
        }

        fn decode_request(&self, _: (), _: &[u8]) -> anyhow::Result<((), ItemsRequest)> {
            anyhow::bail!("not supported")
        }

        fn build_response(&self, _: (), _: &ApprovedItems) -> anyhow::Result<((), Vec<u8>)> {
            anyhow::bail!("not supported")
        }

        fn attach_signature(&self, _: (), _: &[u8]) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("not supported")
        }
    }

    fn namespaces() -> BTreeMap<String, Vec<Vec<u8>>> {
        [(
            "org.iso.18013.5.1".to_string(),
            vec![b"age_over_18".to_vec(), b"portrait".to_vec()],
        )]
        .into_iter()
        .collect()
    }

    #[test]
    fn identity_is_derived_from_issuer_auth() {
        let a = Credential::new(&ParsingEngine, b"mDL|mso-1".to_vec(), namespaces(), "key-a").unwrap();
        let b = Credential::new(&ParsingEngine, b"mDL|mso-1".to_vec(), Default::default(), "key-b").unwrap();
        let c = Credential::new(&ParsingEngine, b"mDL|mso-2".to_vec(), namespaces(), "key-a").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert_ne!(a, c);
        assert_eq!(a.doc_type(), "mDL");
        assert_eq!(a.key_alias().as_str(), "key-a");
        assert_eq!(a.namespaces()["org.iso.18013.5.1"].len(), 2);
    }

    #[test]
    fn restore_derives_identity_again() {
        let credential =
            Credential::new(&ParsingEngine, b"mDL|mso-1".to_vec(), namespaces(), "key-a").unwrap();

        let mut stored = serde_json::to_value(credential.store()).unwrap();
        stored["id"] = serde_json::json!(Uuid::new_v4());
        stored["docType"] = serde_json::json!("forged.doc.type");
        let stored: StoredCredential = serde_json::from_value(stored).unwrap();

        let restored = Credential::restore(&ParsingEngine, stored).unwrap();
        assert_eq!(restored, credential);
        assert_eq!(restored.id(), credential.id());
        assert_eq!(restored.doc_type(), "mDL");
        assert_eq!(restored.namespaces(), credential.namespaces());
    }

    #[test]
    fn restore_rejects_tampered_issuer_auth() {
        let credential =
            Credential::new(&ParsingEngine, b"mDL|mso-1".to_vec(), namespaces(), "key-a").unwrap();

        let mut stored = serde_json::to_value(credential.store()).unwrap();
        stored["issuerAuth"] = serde_json::json!(b"no separator".to_vec());
        let stored: StoredCredential = serde_json::from_value(stored).unwrap();

        let err = Credential::restore(&ParsingEngine, stored).unwrap_err();
        assert!(matches!(err, Error::MalformedCredential(_)));
    }

    #[test]
    fn malformed_issuer_auth() {
        let err = Credential::new(&ParsingEngine, b"no separator".to_vec(), namespaces(), "key")
            .unwrap_err();
        assert!(matches!(err, Error::MalformedCredential(_)));
    }
}
