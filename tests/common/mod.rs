#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use patch::app::classifier::FailureClassifier;
use patch::app::dispatch::Dispatcher;
use patch::domain::notification::{NotificationInput, NotificationKind, NotificationRecord};
use patch::domain::push::{ErrorDetails, PushMessage, Receipt, Ticket};
use patch::infra::devices::DeviceDirectory;
use patch::infra::gateway::{chunk, PushGateway};
use patch::infra::store::NotificationStore;

pub const BACKOFF_BASE: u32 = 4;

// ---------------------------------------------------------------------------
// Harness — dispatcher wired to in-memory fakes
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: MemoryStore,
    pub gateway: FakeGateway,
    pub devices: FakeDevices,
    pub dispatcher: Dispatcher<FakeGateway, MemoryStore, FakeDevices>,
}

pub fn harness(chunk_size: usize) -> Harness {
    let store = MemoryStore::default();
    let gateway = FakeGateway::new(chunk_size);
    let devices = FakeDevices::default();
    let dispatcher = Dispatcher::new(
        gateway.clone(),
        store.clone(),
        FailureClassifier::new(devices.clone()),
        BACKOFF_BASE,
    );
    Harness {
        store,
        gateway,
        devices,
        dispatcher,
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn input(to: &str) -> NotificationInput {
    NotificationInput {
        kind: NotificationKind::ChatMessage,
        to: to.to_string(),
        body: "hi".to_string(),
        payload: json!({"request_id": "r1"}),
    }
}

pub fn ok_ticket(id: &str) -> Ticket {
    Ticket::Ok { id: id.to_string() }
}

pub fn error_ticket(code: &str) -> Ticket {
    Ticket::Error {
        message: None,
        details: ErrorDetails::new(code),
    }
}

pub fn ok_receipt() -> Receipt {
    Receipt::Ok
}

pub fn error_receipt(code: &str) -> Receipt {
    Receipt::Error {
        message: None,
        details: ErrorDetails::new(code),
    }
}

/// A record whose latest attempt was rejected with the given code.
pub fn failed_record(to: &str, code: &str, next_send_at: OffsetDateTime) -> NotificationRecord {
    let mut record = NotificationRecord::materialize(input(to), OffsetDateTime::now_utc());
    record.sent_count = 1;
    record.error_ticket = Some(ErrorDetails::new(code));
    record.next_send_at = Some(next_send_at);
    record
}

/// A record whose latest attempt was accepted and is awaiting its receipt.
pub fn accepted_record(to: &str, ticket_id: &str) -> NotificationRecord {
    let now = OffsetDateTime::now_utc();
    let mut record = NotificationRecord::materialize(input(to), now);
    record.sent_count = 1;
    record.success_ticket = Some(ticket_id.to_string());
    record.next_send_at = Some(now + Duration::minutes(4));
    record
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<Uuid, NotificationRecord>>>,
}

impl MemoryStore {
    pub fn seed(&self, record: NotificationRecord) {
        self.records.lock().unwrap().insert(record.id, record);
    }

    pub fn all(&self) -> Vec<NotificationRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, id: Uuid) -> Option<NotificationRecord> {
        self.records.lock().unwrap().get(&id).cloned()
    }

    pub fn by_destination(&self, to: &str) -> Option<NotificationRecord> {
        self.all().into_iter().find(|record| record.to == to)
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn find_retry_eligible(&self, now: OffsetDateTime) -> Result<Vec<NotificationRecord>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|record| record.is_retry_eligible(now))
            .collect())
    }

    async fn find_receipt_pending(&self) -> Result<Vec<NotificationRecord>> {
        Ok(self
            .all()
            .into_iter()
            .filter(NotificationRecord::is_receipt_pending)
            .collect())
    }

    async fn bulk_upsert(&self, records: &[NotificationRecord]) -> Result<()> {
        let mut guard = self.records.lock().unwrap();
        for record in records {
            guard.insert(record.id, record.clone());
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.records.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn delete_older_than(&self, cutoff: OffsetDateTime) -> Result<u64> {
        let mut guard = self.records.lock().unwrap();
        let before = guard.len();
        guard.retain(|_, record| record.created_at >= cutoff);
        Ok((before - guard.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// FakeGateway — scripted tickets/receipts, records chunk boundaries
// ---------------------------------------------------------------------------

#[derive(Default)]
struct GatewayState {
    tickets: VecDeque<Ticket>,
    sent_chunks: Vec<Vec<PushMessage>>,
    receipts: HashMap<String, Receipt>,
    receipt_chunks: Vec<Vec<String>>,
}

#[derive(Clone)]
pub struct FakeGateway {
    chunk_size: usize,
    state: Arc<Mutex<GatewayState>>,
}

impl FakeGateway {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            state: Arc::new(Mutex::new(GatewayState::default())),
        }
    }

    /// Queue tickets to hand out, one per message, in submission order.
    pub fn script_tickets(&self, tickets: Vec<Ticket>) {
        self.state.lock().unwrap().tickets.extend(tickets);
    }

    pub fn script_receipt(&self, ticket_id: &str, receipt: Receipt) {
        self.state
            .lock()
            .unwrap()
            .receipts
            .insert(ticket_id.to_string(), receipt);
    }

    pub fn sent_messages(&self) -> Vec<PushMessage> {
        self.state
            .lock()
            .unwrap()
            .sent_chunks
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.state
            .lock()
            .unwrap()
            .sent_chunks
            .iter()
            .map(Vec::len)
            .collect()
    }

    pub fn receipt_chunks(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().receipt_chunks.clone()
    }
}

#[async_trait]
impl PushGateway for FakeGateway {
    fn chunk_messages(&self, messages: Vec<PushMessage>) -> Vec<Vec<PushMessage>> {
        chunk(messages, self.chunk_size)
    }

    async fn send_batch(&self, chunk: &[PushMessage]) -> Result<Vec<Ticket>> {
        let mut state = self.state.lock().unwrap();
        state.sent_chunks.push(chunk.to_vec());
        let mut tickets = Vec::with_capacity(chunk.len());
        for _ in chunk {
            tickets.push(
                state
                    .tickets
                    .pop_front()
                    .ok_or_else(|| anyhow!("no scripted ticket left"))?,
            );
        }
        Ok(tickets)
    }

    fn chunk_receipt_ids(&self, ids: Vec<String>) -> Vec<Vec<String>> {
        chunk(ids, self.chunk_size)
    }

    async fn fetch_receipts(&self, chunk: &[String]) -> Result<HashMap<String, Receipt>> {
        let mut state = self.state.lock().unwrap();
        state.receipt_chunks.push(chunk.to_vec());
        Ok(chunk
            .iter()
            .filter_map(|id| state.receipts.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// FakeDevices — records every disable call
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct FakeDevices {
    disabled: Arc<Mutex<Vec<String>>>,
}

impl FakeDevices {
    pub fn disabled(&self) -> Vec<String> {
        self.disabled.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceDirectory for FakeDevices {
    async fn disable_destination(&self, token: &str) -> Result<()> {
        self.disabled.lock().unwrap().push(token.to_string());
        Ok(())
    }
}
