//! Presentation of a credential to a reader.
//!
//! [device] holds the session state machine. The remaining modules define the
//! collaborators it drives: the [engine], the [transport], the [key_store] and the
//! [observer], plus the selective [disclosure] gate between request and response.
pub mod device;
pub mod disclosure;
pub mod engine;
pub mod key_store;
pub mod observer;
pub mod transport;

use anyhow::Result;
use base64::{decode, encode};
use serde::{Deserialize, Serialize};

use crate::definitions::{EngagementDescriptor, StoredCredential};

/// Trait that handles serialization of [CBOR](https://cbor.io) objects to/from [String].
/// It is an auto trait.
pub trait Stringify: Serialize + for<'a> Deserialize<'a> {
    /// Serialize to [CBOR](https://cbor.io) representation, base64 encoded.
    ///
    /// Operation may fail, so it returns a [Result].
    fn stringify(&self) -> Result<String> {
        let data = crate::cbor::to_vec(self)?;
        let encoded = encode(data);
        Ok(encoded)
    }

    /// Deserialize the object from the [CBOR](https://cbor.io) representation.
    ///
    /// You can call this on something returned by [Stringify::stringify].
    /// Operation may fail, so it returns a [Result].
    fn parse(encoded: String) -> Result<Self> {
        let data = decode(encoded)?;
        let this = crate::cbor::from_slice(&data)?;
        Ok(this)
    }
}

impl Stringify for StoredCredential {}
impl Stringify for EngagementDescriptor {}

#[cfg(test)]
mod test {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn engagement_stringify() {
        let engagement = EngagementDescriptor::new(Uuid::new_v4(), vec![1, 2, 3]).unwrap();
        let serialized = engagement.stringify().unwrap();
        let parsed = EngagementDescriptor::parse(serialized.clone()).unwrap();

        assert_eq!(parsed, engagement);
        assert_eq!(serialized, parsed.stringify().unwrap());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(EngagementDescriptor::parse("not base64!".to_string()).is_err());
    }
}
