//! Connection acceptance and per-connection protocol handling.

pub mod handler;
pub mod listener;
