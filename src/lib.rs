//! `zonis`: a request/response correlation and dispatch core for a
//! many-to-one WebSocket IPC fabric. One server process (the hub) holds
//! open connections from many client processes, each identified by an
//! opaque string; either side can address a request at the other and
//! await a correlated reply over the same duplex stream concurrent
//! requests share.
//!
//! See [`client::ClientSessionBuilder`] for the client side and
//! [`server::ServerHub`] for the server side. [`routes::RouteTable`] and
//! [`routes::handler_fn`] register the handlers either side exposes to
//! its peer.

pub mod client;
mod dispatch;
pub mod error;
pub mod packet;
pub mod pending;
pub mod routes;
pub mod server;
pub mod transport;

pub use client::{ClientSession, ClientSessionBuilder};
pub use error::{Result, ZonisError};
pub use packet::{Packet, PacketData, PacketId};
pub use pending::PendingRegistry;
pub use routes::{handler_fn, RouteHandler, RouteTable};
pub use server::{OverridePolicy, ServerConfig, ServerHub};
pub use transport::Frame;
