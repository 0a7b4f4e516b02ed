//! Scriptable in-memory adapter for tests.

use crate::{AdapterError, AdapterResult, DestinationAdapter, SyncItem, SyncResult, TargetInfo};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// What a [`RecordingAdapter`] does on a `sync_item` call.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Return this result.
    Result(SyncResult),
    /// Return `AdapterError::Transport` with this message.
    Error(String),
    /// Panic with this message.
    Panic(String),
}

/// Adapter that records every item it receives and answers from a script.
///
/// Queued responses are consumed first; after that the fallback response is
/// used. The default fallback succeeds with destination id
/// `"{name}-{item_id}"`.
pub struct RecordingAdapter {
    name: String,
    connected: bool,
    calls: Mutex<Vec<SyncItem>>,
    script: Mutex<VecDeque<Scripted>>,
    fallback: Mutex<Option<Scripted>>,
}

impl RecordingAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: true,
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
        }
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    /// Answer every call without a queued response with `response`.
    pub fn always(self, response: Scripted) -> Self {
        *self.fallback.lock() = Some(response);
        self
    }

    /// Queue a one-shot response.
    pub fn push(&self, response: Scripted) {
        self.script.lock().push_back(response);
    }

    pub fn calls(&self) -> Vec<SyncItem> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn respond(&self, item: &SyncItem) -> AdapterResult<SyncResult> {
        self.calls.lock().push(item.clone());
        let next = self
            .script
            .lock()
            .pop_front()
            .or_else(|| self.fallback.lock().clone());
        match next {
            Some(Scripted::Result(result)) => Ok(result),
            Some(Scripted::Error(message)) => Err(AdapterError::Transport(message)),
            Some(Scripted::Panic(message)) => panic!("{}", message),
            None => Ok(SyncResult::success(format!("{}-{}", self.name, item.item_id))),
        }
    }
}

#[async_trait]
impl DestinationAdapter for RecordingAdapter {
    async fn sync_item(&self, item: &SyncItem) -> AdapterResult<SyncResult> {
        self.respond(item)
    }

    async fn check_duplicate(&self, content_hash: &str) -> AdapterResult<Option<String>> {
        let found = self
            .calls
            .lock()
            .iter()
            .find(|item| item.content_hash.as_deref() == Some(content_hash))
            .map(|item| format!("{}-{}", self.name, item.item_id));
        Ok(found)
    }

    async fn update_item(
        &self,
        destination_id: &str,
        item: &SyncItem,
    ) -> AdapterResult<SyncResult> {
        let mut item = item.clone();
        item.existing_destination_id = Some(destination_id.to_string());
        self.respond(&item)
    }

    async fn delete_item(&self, destination_id: &str) -> AdapterResult<SyncResult> {
        Ok(SyncResult::success(destination_id))
    }

    async fn get_target_info(&self) -> AdapterResult<TargetInfo> {
        Ok(TargetInfo {
            name: self.name.clone(),
            connected: self.connected,
            capabilities: vec!["page_text".into(), "todo".into()],
            details: serde_json::Map::new(),
        })
    }
}
