//! # qwire-client
//!
//! Client library for q/kdb+ processes.
//!
//! This crate provides:
//! - Async connection over TCP or any `AsyncRead + AsyncWrite` stream
//! - Credential handshake and version negotiation
//! - Sync and async messaging with a reusable message buffer
//! - A high-level `Client` for evaluating expressions and calling functions

pub mod client;
pub mod connection;
pub mod error;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
