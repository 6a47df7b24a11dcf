//! Persistence capabilities: metadata records and blob bytes.

pub mod asset_store;
pub mod blob_store;
