//! Receipt scanner API server.
//!
//! Accepts a photographed shopping receipt, has a vision model extract the
//! structured fields (date, store, total, line items), returns the result as
//! an editable draft, and persists confirmed records to a hosted datastore.
//!
//! ## Endpoints
//!
//! - POST /api/extract - Extract a draft from an uploaded receipt photo
//! - POST /api/receipts - Persist a confirmed receipt
//! - GET /api/receipts - List stored receipts, most recent first
//! - GET /health - Liveness check

pub mod api;
pub mod config;
pub mod currency;
pub mod extract;
pub mod receipt;
pub mod server;
pub mod store;

pub use config::Config;
pub use extract::{ExtractError, ReceiptExtractor};
pub use receipt::{NewReceipt, ReceiptDraft, ReceiptItem, StoredReceipt, normalize, validate_draft};
pub use server::{AppState, create_router, run_server};
pub use store::{MemoryStore, ReceiptStore, StoreError, SupabaseStore};
