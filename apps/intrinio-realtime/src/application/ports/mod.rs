//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`TokenProvider`]: exchanges credentials for a socket token
//! - [`Transport`] / [`Connection`]: opens the socket and sends frames
//!
//! ## Strategies
//!
//! - [`FrameCodec`]: turns raw frames into domain events
//! - [`FeedProtocol`]: per-provider control frames and keep-alives

mod auth;
mod codec;
mod transport;

pub use auth::{AuthError, TokenProvider};
pub use codec::{DecodeError, FeedProtocol, FrameCodec, Heartbeat, OutboundFrame};
pub use transport::{
    Connection, RawFrame, SocketEndpoint, SocketRequest, Transport, TransportError, TransportEvent,
    TransportSession,
};
