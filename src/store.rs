use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;

use crate::config::StoreConfig;
use crate::receipt::{NewReceipt, StoredReceipt};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("datastore unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("datastore returned {status}: {message}")]
    Backend { status: u16, message: String },
    #[error("datastore reply was not understood: {0}")]
    Malformed(String),
}

/// Storage operations for receipt records. Create and list is the whole
/// surface; there is no update or delete.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Insert one confirmed receipt and return the stored row with its
    /// assigned id and timestamps.
    async fn create(&self, receipt: &NewReceipt) -> Result<StoredReceipt, StoreError>;

    /// All stored receipts, most recent first. An empty table is an empty
    /// vec, never an error.
    async fn list(&self) -> Result<Vec<StoredReceipt>, StoreError>;
}

/// Receipt storage on Supabase, spoken to over its PostgREST interface.
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseStore {
    pub fn new(config: StoreConfig) -> Self {
        SupabaseStore {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key,
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/receipts", self.base_url)
    }
}

/// PostgREST errors carry a `message` field; fall back to the raw body when
/// the reply is not the usual shape.
fn backend_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl ReceiptStore for SupabaseStore {
    async fn create(&self, receipt: &NewReceipt) -> Result<StoredReceipt, StoreError> {
        let response = self
            .client
            .post(self.table_url())
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=representation")
            .json(receipt)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend {
                status,
                message: backend_message(&body),
            });
        }

        // return=representation answers with an array of inserted rows
        let raw = response.text().await?;
        let mut rows: Vec<StoredReceipt> = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Malformed(format!("undecodable insert reply: {e}")))?;
        let row = rows
            .pop()
            .ok_or_else(|| StoreError::Malformed("insert returned no row".to_string()))?;

        info!(id = ?row.id, toko = %row.toko, total = row.total, "Receipt stored");
        Ok(row)
    }

    async fn list(&self) -> Result<Vec<StoredReceipt>, StoreError> {
        let url = format!("{}?select=*&order=created_at.desc", self.table_url());
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend {
                status,
                message: backend_message(&body),
            });
        }

        let raw = response.text().await?;
        serde_json::from_str(&raw)
            .map_err(|e| StoreError::Malformed(format!("undecodable list reply: {e}")))
    }
}

/// In-process stand-in for the hosted datastore.
///
/// Rows get sequential ids and real timestamps so they look like production
/// rows, and create calls are counted so tests can assert that rejected
/// input caused no datastore traffic.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<StoredReceipt>>,
    creates: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of create calls seen so far.
    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReceiptStore for MemoryStore {
    async fn create(&self, receipt: &NewReceipt) -> Result<StoredReceipt, StoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();

        let mut rows = self.rows.lock().unwrap();
        let row = StoredReceipt {
            id: Some(format!("mem-{}", rows.len() + 1)),
            tanggal: receipt.tanggal.clone(),
            toko: receipt.toko.clone(),
            total: receipt.total,
            items: receipt.items.clone(),
            image_url: receipt.image_url.clone(),
            created_at: Some(now.clone()),
            updated_at: Some(now),
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn list(&self) -> Result<Vec<StoredReceipt>, StoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().rev().cloned().collect())
    }
}
