use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use cvm_core_vm::EventPublisher;
use cvm_types::{StateError, StateResult};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Events kept in history before the oldest are dropped
pub const MAX_EVENT_HISTORY: usize = 1024;

/// An event published by a contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl ContractEvent {
    /// Address of the emitting contract, if tagged
    pub fn contract_addr(&self) -> Option<&str> {
        self.tags.get("contract.addr").map(String::as_str)
    }

    /// Contract method named by the event source
    pub fn method(&self) -> Option<&str> {
        self.tags.get("contract.method").map(String::as_str)
    }
}

/// Event publisher that keeps a bounded history and broadcasts to subscribers
pub struct EventBus {
    history: Mutex<VecDeque<ContractEvent>>,
    capacity: usize,
    sender: broadcast::Sender<ContractEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(MAX_EVENT_HISTORY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            sender,
        }
    }

    /// Receives every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ContractEvent> {
        self.sender.subscribe()
    }

    /// Recorded events, oldest first
    pub fn events(&self) -> Vec<ContractEvent> {
        self.history
            .lock()
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Recorded events emitted by `contract_addr`
    pub fn events_for(&self, contract_addr: &str) -> Vec<ContractEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.contract_addr() == Some(contract_addr))
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for EventBus {
    fn publish_with_tags(&self, event: &str, tags: &BTreeMap<String, String>) -> StateResult<()> {
        let event = ContractEvent {
            name: event.to_string(),
            tags: tags.clone(),
            timestamp: Utc::now(),
        };

        info!(
            event = %event.name,
            contract = ?event.contract_addr(),
            method = ?event.method(),
            "Contract event"
        );

        {
            let mut history = self
                .history
                .lock()
                .map_err(|e| StateError::Storage(format!("event history poisoned: {}", e)))?;
            if self.capacity > 0 && history.len() >= self.capacity {
                history.pop_front();
            }
            if self.capacity > 0 {
                history.push_back(event.clone());
            }
        }

        if self.sender.send(event).is_err() {
            debug!("No event subscribers");
        }
        Ok(())
    }
}
