//! This module is responsible for the device's interaction with the reader.
//!
//! A [SessionManager] walks a single presentment through these states:
//!
//! ```text
//! Idle -> Engaging -> AwaitingConnection -> Connected -> RequestReceived
//!      -> AwaitingDisclosure -> Signing -> Responding -> Complete
//! ```
//!
//! Every non-terminal state may also end in `Error` (collaborator failure or an
//! out-of-order event) or `Canceled` (the caller gave up).
//!
//! The manager owns its inbound event queue. The transport pushes into it through the
//! [EventSender](super::transport::EventSender) it is given when advertising, and the
//! application pushes into it through a [SessionHandle]. Events are processed one at a
//! time by [SessionManager::run], in arrival order.
//!
//! # Example
//!
//! ```ignore
//! let (mut session, handle) =
//!     SessionManager::new(credential, engine, key_store, transport, observer, config)?;
//! tokio::spawn(async move { session.run().await });
//!
//! // Once the observer has shown the request to the user:
//! let mut selection = DisclosureSelection::new();
//! selection.approve("org.iso.18013.5.1", "age_over_18");
//! handle.submit(selection);
//! ```
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::time::error::Elapsed;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::definitions::{
    Credential, DisclosureSelection, EngagementDescriptor, ItemsRequest, PermittedItems,
};
use crate::error::Error;
use crate::presentation::disclosure::filter_permitted;
use crate::presentation::engine::SessionEngine;
use crate::presentation::key_store::{KeyStore, KeyStoreError, DIGEST_LEN};
use crate::presentation::observer::SessionObserver;
use crate::presentation::transport::{EventSender, Transport, TransportEvent};

/// The externally observable state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumIter)]
pub enum LifecycleState {
    Idle,
    Engaging,
    AwaitingConnection,
    Connected,
    RequestReceived,
    AwaitingDisclosure,
    Signing,
    /// The signed response was handed to the transport, awaiting its confirmation.
    Responding,
    Complete,
    Error,
    Canceled,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Canceled)
    }
}

/// An input to the session, processed in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Transport(TransportEvent),
    /// The holder's decision on the pending request.
    Disclose(DisclosureSelection),
    /// The holder's decision, as permitted items per document type.
    DiscloseNamespaces(PermittedItems),
    Cancel,
}

/// Identifies the response payload a signature is produced for.
///
/// A signature is only attached if its ticket matches the payload of the
/// current [LifecycleState::Signing] entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningTicket {
    sequence: u64,
    digest: [u8; DIGEST_LEN],
}

impl SigningTicket {
    /// SHA-256 digest of the unsigned response payload.
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }
}

/// The application's side of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: Uuid,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Submits the holder's selection for the pending request.
    ///
    /// Returns `false` once the [SessionManager] has been dropped. A selection that arrives
    /// after the session has ended, or outside [LifecycleState::AwaitingDisclosure], is
    /// accepted here and ignored by the session.
    pub fn submit(&self, selection: DisclosureSelection) -> bool {
        self.events.send(SessionEvent::Disclose(selection)).is_ok()
    }

    /// Submits the permitted items grouped by document type and namespace.
    ///
    /// Only the entry for the presented credential's document type is used.
    /// Returns `false` under the same conditions as [SessionHandle::submit].
    pub fn submit_namespaces(&self, permitted: PermittedItems) -> bool {
        self.events
            .send(SessionEvent::DiscloseNamespaces(permitted))
            .is_ok()
    }

    /// Cancel the request mid-transaction and gracefully clean up the transport.
    ///
    /// Returns `false` once the [SessionManager] has been dropped. Has no effect on a
    /// session that has already ended.
    pub fn cancel(&self) -> bool {
        self.events.send(SessionEvent::Cancel).is_ok()
    }
}

/// Generates the engagement for a new session.
///
/// No transport action is taken; the returned engagement has to reach the reader
/// out-of-band before anything else can happen.
pub fn initialise<E>(
    engine: &E,
    credential: &Credential,
    session_id: Uuid,
) -> Result<(E::Token, EngagementDescriptor), Error>
where
    E: SessionEngine + ?Sized,
{
    let (token, payload) = engine
        .initialize_session(credential, session_id)
        .map_err(Error::EngagementInit)?;
    let engagement = EngagementDescriptor::new(session_id, payload)
        .map_err(|e| Error::EngagementInit(e.into()))?;
    Ok((token, engagement))
}

struct PendingSignature {
    sequence: u64,
    digest: [u8; DIGEST_LEN],
}

enum Phase<T> {
    Idle,
    Engaging { token: T },
    AwaitingConnection { token: T },
    Connected { token: T },
    RequestReceived { token: T, request: ItemsRequest },
    AwaitingDisclosure { token: T, request: ItemsRequest },
    Signing { token: T, pending: PendingSignature },
    Responding,
    Complete,
    Failed(Error),
    Canceled,
}

impl<T> Default for Phase<T> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<T> Phase<T> {
    fn state(&self) -> LifecycleState {
        match self {
            Self::Idle => LifecycleState::Idle,
            Self::Engaging { .. } => LifecycleState::Engaging,
            Self::AwaitingConnection { .. } => LifecycleState::AwaitingConnection,
            Self::Connected { .. } => LifecycleState::Connected,
            Self::RequestReceived { .. } => LifecycleState::RequestReceived,
            Self::AwaitingDisclosure { .. } => LifecycleState::AwaitingDisclosure,
            Self::Signing { .. } => LifecycleState::Signing,
            Self::Responding => LifecycleState::Responding,
            Self::Complete => LifecycleState::Complete,
            Self::Failed(_) => LifecycleState::Error,
            Self::Canceled => LifecycleState::Canceled,
        }
    }
}

enum Step {
    Event(Option<SessionEvent>),
    Signed(Result<Result<Vec<u8>, KeyStoreError>, Elapsed>),
}

/// Drives one presentment of one credential to one reader.
pub struct SessionManager<E, K, T, O>
where
    E: SessionEngine,
{
    session_id: Uuid,
    credential: Arc<Credential>,
    engagement: EngagementDescriptor,
    engine: E,
    key_store: Arc<K>,
    transport: T,
    observer: O,
    config: SessionConfig,
    phase: Phase<E::Token>,
    signing_sequence: u64,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    sender: mpsc::UnboundedSender<SessionEvent>,
}

impl<E, K, T, O> SessionManager<E, K, T, O>
where
    E: SessionEngine,
    K: KeyStore + 'static,
    T: Transport,
    O: SessionObserver,
{
    /// Initialise the session and hand the engagement to the observer.
    ///
    /// Fails without creating a session if the config is invalid or the engine cannot
    /// produce an engagement.
    pub fn new(
        credential: Arc<Credential>,
        engine: E,
        key_store: Arc<K>,
        transport: T,
        observer: O,
        config: SessionConfig,
    ) -> Result<(Self, SessionHandle), Error> {
        config.validate()?;
        let session_id = Uuid::new_v4();
        let (token, engagement) = initialise(&engine, &credential, session_id)?;
        let (sender, events) = mpsc::unbounded_channel();

        let mut session = Self {
            session_id,
            credential,
            engagement,
            engine,
            key_store,
            transport,
            observer,
            config,
            phase: Phase::Idle,
            signing_sequence: 0,
            events,
            sender: sender.clone(),
        };
        session.enter(LifecycleState::Idle, Phase::Engaging { token });
        tracing::info!(
            session = %session_id,
            credential = %session.credential.id(),
            method = %session.config.engagement,
            "engagement ready"
        );
        session.observer.on_engagement(&session.engagement);

        let handle = SessionHandle {
            session_id,
            events: sender,
        };
        Ok((session, handle))
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn engagement(&self) -> &EngagementDescriptor {
        &self.engagement
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn state(&self) -> LifecycleState {
        self.phase.state()
    }

    /// The request awaiting the holder's decision, if any.
    pub fn request(&self) -> Option<&ItemsRequest> {
        match &self.phase {
            Phase::RequestReceived { request, .. } | Phase::AwaitingDisclosure { request, .. } => {
                Some(request)
            }
            _ => None,
        }
    }

    /// The error that ended the session, if it failed.
    pub fn error(&self) -> Option<&Error> {
        match &self.phase {
            Phase::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            session_id: self.session_id,
            events: self.sender.clone(),
        }
    }

    /// Starts advertising and processes events until the session ends.
    ///
    /// Returns the terminal state.
    pub async fn run(&mut self) -> LifecycleState {
        self.advertise();
        while !self.state().is_terminal() {
            let Some(event) = self.events.recv().await else {
                self.cancel();
                break;
            };
            if let Some(ticket) = self.handle_event(event) {
                self.sign(ticket).await;
            }
        }
        self.state()
    }

    fn advertise(&mut self) {
        let from = self.state();
        match std::mem::take(&mut self.phase) {
            Phase::Engaging { token } => {
                let events = EventSender::new(self.sender.clone());
                match self.transport.advertise(self.session_id, events) {
                    Ok(()) => self.enter(from, Phase::AwaitingConnection { token }),
                    Err(e) => self.terminate(from, Error::Transport(format!("unable to advertise: {e}"))),
                }
            }
            phase => self.phase = phase,
        }
    }

    fn handle_event(&mut self, event: SessionEvent) -> Option<SigningTicket> {
        if self.state().is_terminal() {
            tracing::trace!(session = %self.session_id, ?event, "event after session end dropped");
            return None;
        }
        match event {
            SessionEvent::Transport(event) => {
                self.handle_transport_event(event);
                None
            }
            SessionEvent::Disclose(selection) => self.disclose(selection),
            SessionEvent::DiscloseNamespaces(permitted) => {
                let selection =
                    DisclosureSelection::from_permitted(self.credential.doc_type(), permitted);
                self.disclose(selection)
            }
            SessionEvent::Cancel => {
                self.cancel();
                None
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        let from = self.state();
        match (std::mem::take(&mut self.phase), event) {
            (Phase::AwaitingConnection { token }, TransportEvent::Connected) => {
                self.enter(from, Phase::Connected { token });
                self.observer.on_progress(&self.config.connected_message);
            }
            (Phase::Connected { token }, TransportEvent::DataReceived(data)) => {
                self.receive_request(from, token, &data);
            }
            (Phase::Responding, TransportEvent::WriteConfirmed) => {
                self.enter(from, Phase::Complete);
                tracing::info!(session = %self.session_id, "response delivered");
                self.observer.on_success();
            }
            (phase, TransportEvent::Progress(message)) => {
                self.phase = phase;
                self.observer.on_progress(&message);
            }
            (_, TransportEvent::Error(message)) => {
                self.terminate(from, Error::Transport(message));
            }
            (_, TransportEvent::Disconnected) => {
                self.terminate(from, Error::Transport("reader disconnected".to_string()));
            }
            (_, event) => {
                tracing::warn!(session = %self.session_id, state = %from, %event, "out-of-order transport event");
                self.terminate(
                    from,
                    Error::ProtocolViolation {
                        event: event.to_string(),
                        state: from,
                    },
                );
            }
        }
    }

    fn receive_request(&mut self, from: LifecycleState, token: E::Token, data: &[u8]) {
        match self.engine.decode_request(token, data) {
            Ok((token, request)) => {
                tracing::debug!(
                    session = %self.session_id,
                    doc_type = %request.doc_type,
                    elements = request.len(),
                    "request received"
                );
                self.enter(from, Phase::RequestReceived { token, request });
                self.await_disclosure();
            }
            Err(e) => self.terminate(from, Error::RequestDecode(e)),
        }
    }

    fn await_disclosure(&mut self) {
        let from = self.state();
        match std::mem::take(&mut self.phase) {
            Phase::RequestReceived { token, request } => {
                self.enter(from, Phase::AwaitingDisclosure { token, request });
                if let Phase::AwaitingDisclosure { request, .. } = &self.phase {
                    self.observer.on_request(request);
                }
            }
            phase => self.phase = phase,
        }
    }

    /// Builds the unsigned response from the approved items and enters [LifecycleState::Signing].
    fn disclose(&mut self, selection: DisclosureSelection) -> Option<SigningTicket> {
        let from = self.state();
        match std::mem::take(&mut self.phase) {
            Phase::AwaitingDisclosure { token, request } => {
                let approved = filter_permitted(&request, &selection);
                tracing::debug!(
                    session = %self.session_id,
                    requested = request.len(),
                    approved = approved.len(),
                    "disclosure approved"
                );
                match self.engine.build_response(token, &approved) {
                    Ok((token, payload)) => {
                        self.signing_sequence += 1;
                        let digest: [u8; DIGEST_LEN] = Sha256::digest(&payload).into();
                        let ticket = SigningTicket {
                            sequence: self.signing_sequence,
                            digest,
                        };
                        let pending = PendingSignature {
                            sequence: ticket.sequence,
                            digest,
                        };
                        self.enter(from, Phase::Signing { token, pending });
                        Some(ticket)
                    }
                    Err(e) => {
                        self.terminate(from, Error::ResponseBuild(e));
                        None
                    }
                }
            }
            phase => {
                self.phase = phase;
                tracing::warn!(session = %self.session_id, state = %from, "disclosure selection ignored");
                None
            }
        }
    }

    /// Signs the pending payload, racing the key store against inbound events.
    async fn sign(&mut self, ticket: SigningTicket) {
        let handle = match self.key_store.resolve(self.credential.key_alias()) {
            Ok(handle) => handle,
            Err(e) => return self.fail(e.into()),
        };

        let key_store = Arc::clone(&self.key_store);
        let digest = ticket.digest;
        let signing = tokio::time::timeout(self.config.signing_timeout(), async move {
            key_store.sign(&handle, &digest).await
        });
        tokio::pin!(signing);

        loop {
            let step = tokio::select! {
                biased;
                event = self.events.recv() => Step::Event(event),
                result = &mut signing => Step::Signed(result),
            };
            match step {
                Step::Event(Some(event)) => {
                    // Nothing here can produce another ticket: the phase is past disclosure.
                    let _ = self.handle_event(event);
                    if self.state().is_terminal() {
                        tracing::debug!(session = %self.session_id, "pending signature abandoned");
                        return;
                    }
                }
                Step::Event(None) => return self.cancel(),
                Step::Signed(Ok(Ok(signature))) => return self.submit_signature(&ticket, signature),
                Step::Signed(Ok(Err(e))) => return self.fail(e.into()),
                Step::Signed(Err(_)) => {
                    return self.fail(Error::Signing(anyhow::anyhow!(
                        "key store did not respond within {}ms",
                        self.config.signing_timeout_ms
                    )))
                }
            }
        }
    }

    /// Attaches the signature and hands the response to the transport.
    ///
    /// A signature for anything but the current payload is never attached and ends the
    /// session, since nothing else will complete the pending signature.
    fn submit_signature(&mut self, ticket: &SigningTicket, signature: Vec<u8>) {
        let from = self.state();
        match std::mem::take(&mut self.phase) {
            Phase::Signing { token, pending }
                if pending.sequence == ticket.sequence && pending.digest == ticket.digest =>
            {
                let response = match self.engine.attach_signature(token, &signature) {
                    Ok(response) => response,
                    Err(e) => return self.terminate(from, Error::SignatureAttach(e)),
                };
                self.enter(from, Phase::Responding);
                if let Err(e) = self.transport.send(response) {
                    self.terminate(
                        LifecycleState::Responding,
                        Error::Transport(format!("unable to send response: {e}")),
                    );
                }
            }
            Phase::Signing { .. } => {
                tracing::warn!(session = %self.session_id, sequence = ticket.sequence, "stale signature discarded");
                self.terminate(
                    from,
                    Error::Signing(anyhow::anyhow!("signature does not match the pending response")),
                );
            }
            phase => {
                self.phase = phase;
                tracing::warn!(session = %self.session_id, state = %from, "signature outside signing discarded");
            }
        }
    }

    fn cancel(&mut self) {
        let from = self.state();
        if from.is_terminal() {
            return;
        }
        if from == LifecycleState::Responding {
            tracing::warn!(session = %self.session_id, "cancel ignored, response already sent");
            return;
        }
        self.enter(from, Phase::Canceled);
        tracing::info!(session = %self.session_id, "session canceled");
        self.transport.disconnect();
    }

    fn fail(&mut self, error: Error) {
        let from = self.state();
        if from.is_terminal() {
            return;
        }
        self.terminate(from, error);
    }

    /// Ends the session in [LifecycleState::Error], dropping any session state.
    fn terminate(&mut self, from: LifecycleState, error: Error) {
        tracing::error!(session = %self.session_id, state = %from, kind = %error.kind(), "{error}");
        self.observer.on_error(&error.to_string());
        self.transport.disconnect();
        self.enter(from, Phase::Failed(error));
    }

    fn enter(&mut self, from: LifecycleState, next: Phase<E::Token>) {
        let to = next.state();
        tracing::debug!(session = %self.session_id, %from, %to, "transition");
        self.phase = next;
    }
}
