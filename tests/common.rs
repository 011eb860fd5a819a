use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use mdoc_holder::definitions::{Credential, ItemsRequest};
use mdoc_holder::presentation::disclosure::ApprovedItems;
use mdoc_holder::presentation::engine::{IssuerMetadata, SessionEngine};
use mdoc_holder::presentation::key_store::SoftwareKeyStore;
use mdoc_holder::presentation::observer::SessionUpdate;
use mdoc_holder::presentation::transport::{EventSender, Transport};

#[allow(dead_code)]
pub const DOC_TYPE: &str = "org.iso.18013.5.1.mDL";
#[allow(dead_code)]
pub const NAMESPACE: &str = "org.iso.18013.5.1";
#[allow(dead_code)]
pub const AGE_OVER_18_ELEMENT: &str = "age_over_18";
#[allow(dead_code)]
pub const PORTRAIT_ELEMENT: &str = "portrait";
#[allow(dead_code)]
pub const KEY_ALIAS: &str = "mdl-device-key";

#[allow(dead_code)]
fn main() {}

/// Engine state of a simulated session.
pub struct SimulatedToken {
    session_id: Uuid,
    exchanges: u32,
    payload: Option<Vec<u8>>,
}

/// Session engine speaking JSON instead of CBOR/COSE.
///
/// Records every set of items it was asked to build a response from.
#[derive(Clone, Default)]
pub struct SimulatedEngine {
    pub responses: Arc<Mutex<Vec<ApprovedItems>>>,
    pub fail_initialisation: bool,
    pub fail_build: bool,
    pub fail_attach: bool,
}

impl SessionEngine for SimulatedEngine {
    type Token = SimulatedToken;

    fn parse_issuer_auth(&self, issuer_auth: &[u8]) -> Result<IssuerMetadata> {
        let value: serde_json::Value =
            serde_json::from_slice(issuer_auth).context("issuer auth is not a signed MSO")?;
        let doc_type = value["docType"]
            .as_str()
            .context("MSO has no docType")?
            .to_string();
        let mso = value["mso"].as_str().context("MSO has no digests")?;
        Ok(IssuerMetadata {
            doc_type,
            fingerprint: mso.as_bytes().to_vec(),
        })
    }

    fn initialize_session(
        &self,
        credential: &Credential,
        correlation_id: Uuid,
    ) -> Result<(SimulatedToken, Vec<u8>)> {
        anyhow::ensure!(!self.fail_initialisation, "unable to generate ephemeral key");
        let engagement = serde_json::to_vec(&json!({
            "version": "1.0",
            "docType": credential.doc_type(),
            "ble": correlation_id,
        }))?;
        let token = SimulatedToken {
            session_id: correlation_id,
            exchanges: 0,
            payload: None,
        };
        Ok((token, engagement))
    }

    fn decode_request(
        &self,
        token: SimulatedToken,
        request: &[u8],
    ) -> Result<(SimulatedToken, ItemsRequest)> {
        let request: ItemsRequest =
            serde_json::from_slice(request).context("unable to decrypt request")?;
        let token = SimulatedToken {
            exchanges: token.exchanges + 1,
            ..token
        };
        Ok((token, request))
    }

    fn build_response(
        &self,
        token: SimulatedToken,
        approved: &ApprovedItems,
    ) -> Result<(SimulatedToken, Vec<u8>)> {
        anyhow::ensure!(!self.fail_build, "unable to encode device response");
        self.responses.lock().unwrap().push(approved.clone());
        let payload = serde_json::to_vec(&json!({
            "session": token.session_id,
            "documents": approved,
        }))?;
        let token = SimulatedToken {
            exchanges: token.exchanges + 1,
            payload: Some(payload.clone()),
            ..token
        };
        Ok((token, payload))
    }

    fn attach_signature(&self, token: SimulatedToken, signature: &[u8]) -> Result<Vec<u8>> {
        anyhow::ensure!(!self.fail_attach, "unable to encrypt device response");
        anyhow::ensure!(token.exchanges == 2, "token used out of order");
        let payload = token.payload.context("no response prepared")?;
        Ok(serde_json::to_vec(&json!({
            "payload": hex::encode(payload),
            "signature": hex::encode(signature),
        }))?)
    }
}

/// What happened on the simulated link.
#[derive(Debug, Default)]
pub struct TransportLog {
    pub advertised: Option<Uuid>,
    pub sent: Vec<Vec<u8>>,
    pub disconnects: usize,
}

/// Transport that hands its [EventSender] to the test once advertising starts.
#[derive(Clone)]
pub struct SimulatedTransport {
    pub log: Arc<Mutex<TransportLog>>,
    advertised: mpsc::UnboundedSender<EventSender>,
    events: Option<EventSender>,
    confirm_writes: bool,
    fail_send: bool,
}

impl SimulatedTransport {
    /// Returns the transport and the receiver of its event sender.
    #[allow(dead_code)]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EventSender>) {
        let (advertised, rx) = mpsc::unbounded_channel();
        let transport = Self {
            log: Default::default(),
            advertised,
            events: None,
            confirm_writes: true,
            fail_send: false,
        };
        (transport, rx)
    }

    #[allow(dead_code)]
    pub fn failing_send(mut self) -> Self {
        self.fail_send = true;
        self
    }
}

impl Transport for SimulatedTransport {
    fn advertise(&mut self, correlation_id: Uuid, events: EventSender) -> Result<()> {
        self.log.lock().unwrap().advertised = Some(correlation_id);
        self.events = Some(events.clone());
        self.advertised
            .send(events)
            .map_err(|_| anyhow::anyhow!("test is gone"))
    }

    fn send(&mut self, message: Vec<u8>) -> Result<()> {
        anyhow::ensure!(!self.fail_send, "characteristic write failed");
        self.log.lock().unwrap().sent.push(message);
        if self.confirm_writes {
            if let Some(events) = &self.events {
                events.write_confirmed();
            }
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        self.log.lock().unwrap().disconnects += 1;
    }
}

/// Builds a credential with `age_over_18` and `portrait` in the mDL namespace.
#[allow(dead_code)]
pub fn create_credential(engine: &SimulatedEngine) -> Result<Credential> {
    let issuer_auth = serde_json::to_vec(&json!({
        "docType": DOC_TYPE,
        "mso": "valueDigests:0,1",
    }))?;
    let namespaces: BTreeMap<String, Vec<Vec<u8>>> = [(
        NAMESPACE.to_string(),
        vec![
            AGE_OVER_18_ELEMENT.as_bytes().to_vec(),
            PORTRAIT_ELEMENT.as_bytes().to_vec(),
        ],
    )]
    .into_iter()
    .collect();
    Credential::new(engine, issuer_auth, namespaces, KEY_ALIAS).context("could not parse mDL")
}

#[allow(dead_code)]
pub fn create_key_store() -> (Arc<SoftwareKeyStore>, p256::ecdsa::VerifyingKey) {
    let mut key_store = SoftwareKeyStore::new();
    let verifying_key = key_store.generate(KEY_ALIAS);
    (Arc::new(key_store), verifying_key)
}

/// The reader's request for `age_over_18` and `portrait`.
#[allow(dead_code)]
pub fn reader_request() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "docType": DOC_TYPE,
        "nameSpaces": {
            NAMESPACE: {
                AGE_OVER_18_ELEMENT: false,
                PORTRAIT_ELEMENT: false,
            }
        }
    }))
    .unwrap()
}

/// Waits for the request to be surfaced to the holder, keeping every update seen.
#[allow(dead_code)]
pub async fn next_request(
    updates: &mut mpsc::UnboundedReceiver<SessionUpdate>,
    seen: &mut Vec<SessionUpdate>,
) -> Option<ItemsRequest> {
    while let Some(update) = updates.recv().await {
        seen.push(update.clone());
        match update {
            SessionUpdate::SelectNamespaces(request) => return Some(request),
            update if update.is_terminal() => return None,
            _ => {}
        }
    }
    None
}

#[allow(dead_code)]
pub fn drain(updates: &mut mpsc::UnboundedReceiver<SessionUpdate>, seen: &mut Vec<SessionUpdate>) {
    while let Ok(update) = updates.try_recv() {
        seen.push(update);
    }
}

#[allow(dead_code)]
pub fn terminal_updates(seen: &[SessionUpdate]) -> usize {
    seen.iter().filter(|update| update.is_terminal()).count()
}
