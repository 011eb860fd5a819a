//! Outbound notifications to the application layer.
use tokio::sync::mpsc;

use crate::definitions::{EngagementDescriptor, ItemsRequest};

/// To be implemented by the consumer to update the UI.
///
/// The session calls exactly one of [SessionObserver::on_success] and
/// [SessionObserver::on_error] per session, and neither after a cancellation.
pub trait SessionObserver {
    /// App should display the engagement, e.g. as a QR code.
    fn on_engagement(&self, engagement: &EngagementDescriptor);
    /// App should indicate to the user that progress is being made.
    fn on_progress(&self, message: &str);
    /// App should display an interactive page for the user to chose which values to reveal.
    fn on_request(&self, request: &ItemsRequest);
    /// App should display the error message.
    fn on_error(&self, message: &str);
    /// App should display a success message and offer to close the page.
    fn on_success(&self);
}

/// A notification as a message, for observers that live on another task.
#[derive(Debug, Clone, PartialEq, Eq, strum_macros::Display)]
pub enum SessionUpdate {
    Engaging(EngagementDescriptor),
    Progress(String),
    SelectNamespaces(ItemsRequest),
    Error(String),
    Success,
}

impl SessionUpdate {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Success)
    }
}

/// Forwards every notification into a channel.
impl SessionObserver for mpsc::UnboundedSender<SessionUpdate> {
    fn on_engagement(&self, engagement: &EngagementDescriptor) {
        notify(self, SessionUpdate::Engaging(engagement.clone()))
    }

    fn on_progress(&self, message: &str) {
        notify(self, SessionUpdate::Progress(message.to_string()))
    }

    fn on_request(&self, request: &ItemsRequest) {
        notify(self, SessionUpdate::SelectNamespaces(request.clone()))
    }

    fn on_error(&self, message: &str) {
        notify(self, SessionUpdate::Error(message.to_string()))
    }

    fn on_success(&self) {
        notify(self, SessionUpdate::Success)
    }
}

fn notify(tx: &mpsc::UnboundedSender<SessionUpdate>, update: SessionUpdate) {
    if let Err(e) = tx.send(update) {
        tracing::debug!("observer channel closed, dropping {}", e.0);
    }
}
