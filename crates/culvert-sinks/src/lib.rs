//! culvert-sinks — the sink fleet.
//!
//! Sinks are external worker nodes that run WASM artifacts. This crate
//! owns their registry, the heartbeat-driven liveness state machine,
//! task delivery over the sink peer protocol, result reconciliation,
//! and the opportunistic dispatch that keeps queue depth trending to
//! zero whenever capacity exists.

mod client;
mod error;
mod manager;

pub use client::{DeliveryReply, HeartbeatReport, HttpSinkClient, SinkClient, TaskDelivery};
pub use error::{SinkError, SinkResult};
pub use manager::{RegisterSink, ResultCallback, SinkHeartbeat, SinkManager, TaskReport};
