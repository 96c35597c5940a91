//! Live notification delivery.
//!
//! The [`LiveGateway`] tracks active push connections per user and per org.
//! A [`Consumer`] drains the durable event stream, persists each event as a
//! notification, and forwards it to the assigned user's live connections.
//! Persistence is authoritative; live delivery is best-effort on top.

mod consumer;
mod gateway;

pub use consumer::{Consumer, HandlerError};
pub use gateway::LiveGateway;
