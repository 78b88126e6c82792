//! Notification records handed to the durable publisher.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};
use crate::model::{AccountId, ProposalId, RideId};
use crate::traits::NotificationPublisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RideUpdates,
    Proximity,
}

/// Structured payload clients use to refresh the right screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notification", rename_all = "snake_case")]
pub enum RideEvent {
    RequestCreated,
    RideCreated { proposal_id: ProposalId },
    RideFinalized { ride_id: RideId },
    RideCompleted { ride_id: RideId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub account_id: AccountId,
    pub kind: NotificationKind,
    pub message: String,
    pub payload: Option<RideEvent>,
}

impl Notification {
    pub fn ride_update(account_id: AccountId, message: impl Into<String>, event: RideEvent) -> Self {
        Self {
            account_id,
            kind: NotificationKind::RideUpdates,
            message: message.into(),
            payload: Some(event),
        }
    }

    pub fn proximity(account_id: AccountId, message: impl Into<String>) -> Self {
        Self {
            account_id,
            kind: NotificationKind::Proximity,
            message: message.into(),
            payload: None,
        }
    }

    /// Payload as the JSON object stored next to the message.
    pub fn payload_json(&self) -> Result<Option<String>> {
        self.payload
            .as_ref()
            .map(|event| {
                serde_json::to_string(event)
                    .map_err(|err| PlannerError::Store(format!("payload encoding: {}", err)))
            })
            .transpose()
    }
}

/// In-process queue of published notifications.
#[derive(Debug, Default)]
pub struct MemoryOutbox {
    records: Mutex<Vec<(NotificationId, Notification)>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        match self.records.lock() {
            Ok(records) => records.iter().map(|(_, n)| n.clone()).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|(_, n)| n.clone()).collect(),
        }
    }

    pub fn for_account(&self, account_id: AccountId) -> Vec<Notification> {
        self.snapshot()
            .into_iter()
            .filter(|n| n.account_id == account_id)
            .collect()
    }
}

impl NotificationPublisher for MemoryOutbox {
    fn publish(&self, notification: Notification) -> Result<NotificationId> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| PlannerError::Store("outbox lock poisoned".to_string()))?;
        let id = NotificationId(records.len() as i64 + 1);
        records.push((id, notification));
        Ok(id)
    }
}
