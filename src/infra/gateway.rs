use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::AppConfig;
use crate::domain::push::{PushMessage, Receipt, Ticket};

/// Transport boundary to the push gateway. Chunking is a pure transport-size
/// concern; callers send whatever chunks the adapter hands back and must not
/// assume a fixed size.
#[async_trait]
pub trait PushGateway: Send + Sync {
    fn chunk_messages(&self, messages: Vec<PushMessage>) -> Vec<Vec<PushMessage>>;

    /// One ticket per input message, in input order.
    async fn send_batch(&self, chunk: &[PushMessage]) -> Result<Vec<Ticket>>;

    fn chunk_receipt_ids(&self, ids: Vec<String>) -> Vec<Vec<String>>;

    /// Receipts keyed by ticket id. Ids the gateway has no receipt for yet
    /// are simply absent from the map.
    async fn fetch_receipts(&self, chunk: &[String]) -> Result<HashMap<String, Receipt>>;
}

/// Order-preserving partition into runs of at most `size` items.
pub fn chunk<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        chunks.push(items.by_ref().take(size).collect());
    }
    chunks
}

/// Expo-style HTTP push gateway: `POST /push/send` with a message array,
/// `POST /push/getReceipts` with a ticket-id list.
#[derive(Clone)]
pub struct HttpPushGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    push_chunk_size: usize,
    receipt_chunk_size: usize,
}

#[derive(Deserialize)]
struct TicketEnvelope {
    data: Vec<Ticket>,
}

#[derive(Deserialize)]
struct ReceiptEnvelope {
    data: HashMap<String, Receipt>,
}

#[derive(serde::Serialize)]
struct ReceiptRequest<'a> {
    ids: &'a [String],
}

impl HttpPushGateway {
    pub fn new(config: &AppConfig) -> Result<Self> {
        // A hung gateway call must not stall a job run indefinitely.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.push_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.push_gateway_url.trim_end_matches('/').to_string(),
            token: config.push_gateway_token.clone(),
            push_chunk_size: config.push_chunk_size,
            receipt_chunk_size: config.receipt_chunk_size,
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.post(format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    fn chunk_messages(&self, messages: Vec<PushMessage>) -> Vec<Vec<PushMessage>> {
        chunk(messages, self.push_chunk_size)
    }

    async fn send_batch(&self, chunk: &[PushMessage]) -> Result<Vec<Ticket>> {
        let response = self
            .post("/push/send")
            .json(chunk)
            .send()
            .await?
            .error_for_status()?;
        let envelope: TicketEnvelope = response.json().await?;

        if envelope.data.len() != chunk.len() {
            return Err(anyhow!(
                "gateway returned {} tickets for {} messages",
                envelope.data.len(),
                chunk.len()
            ));
        }
        debug!(count = chunk.len(), "push chunk submitted");
        Ok(envelope.data)
    }

    fn chunk_receipt_ids(&self, ids: Vec<String>) -> Vec<Vec<String>> {
        chunk(ids, self.receipt_chunk_size)
    }

    async fn fetch_receipts(&self, chunk: &[String]) -> Result<HashMap<String, Receipt>> {
        let response = self
            .post("/push/getReceipts")
            .json(&ReceiptRequest { ids: chunk })
            .send()
            .await?
            .error_for_status()?;
        let envelope: ReceiptEnvelope = response.json().await?;
        Ok(envelope.data)
    }
}
