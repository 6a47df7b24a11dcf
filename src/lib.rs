//! HTTP API for uploading images and PDFs, rotating images and rasterizing
//! PDF pages into images.

pub mod codecs;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod storage;
