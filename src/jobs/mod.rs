pub mod cleanup;
pub mod receipts;
pub mod retry;
