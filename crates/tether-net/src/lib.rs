//! Blocking TCP message transport.
//!
//! This crate turns connected TCP streams into a single pollable event stream.
//! It implements a thread-per-connection model on top of `tether-proto` framing.
//!
//! # Architecture
//!
//! - [`event`]: Events delivered to the application and connection ids
//! - [`queue`]: Shared multi-producer inbound queue
//! - [`receive`]: Per-connection receive loop
//! - [`connection`]: Send half of a live connection
//! - [`server`]: Listening endpoint
//! - [`client`]: Dialing endpoint
//! - [`error`]: Error types

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod queue;
pub mod receive;
pub mod server;

// Re-export commonly used types
pub use client::Client;
pub use config::NetConfig;
pub use connection::Connection;
pub use error::NetError;
pub use event::{ConnId, DisconnectReason, Event, EventKind, next_conn_id};
pub use queue::InboundQueue;
pub use receive::{Socket, run_receive_loop, spawn_receive_loop};
pub use server::Server;
pub use tether_proto::constants::MAX_PAYLOAD;
