//! Line-oriented broadcast chat over TCP.
//!
//! Every line a client sends is relayed to every other connected client, and
//! joins and leaves are announced to the room. The pieces:
//!
//! - [`session`] owns one connection: name handshake, line ingestion, teardown.
//! - [`registry`] is the lock-guarded map of who is connected under what name.
//! - [`broadcaster`] is the single consumer that fans each queued event out.
//! - [`event`] defines connection ids, broadcast events and the queue between them.
//! - [`server`] accepts connections and ties the above together.
//! - [`client`] is a bare terminal client; [`wire`] holds the shared framing.
//! - [`cli`] and [`config`] parse and hold the command-line settings.

pub mod broadcaster;
pub mod cli;
pub mod client;
pub mod config;
pub mod event;
pub mod registry;
pub mod server;
pub mod session;
pub mod wire;
