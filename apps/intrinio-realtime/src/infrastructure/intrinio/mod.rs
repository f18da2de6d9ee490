//! Intrinio Realtime Adapters
//!
//! Concrete implementations of the application ports for Intrinio's
//! realtime equities feeds.
//!
//! # Components
//!
//! - `auth`: credentials and the HTTP token exchange
//! - `codec`: binary multi-record and Phoenix JSON decoders
//! - `protocol`: per-provider control frames and keep-alives
//! - `transport`: WebSocket transport
//! - `messages`: Phoenix envelope types
//!
//! # Endpoints
//!
//! | Provider       | Host                                  | Wire    |
//! |----------------|---------------------------------------|---------|
//! | `REALTIME`     | `realtime-mx.intrinio.com`            | binary  |
//! | `DELAYED_SIP`  | `realtime-delayed-sip.intrinio.com`   | binary  |
//! | `NASDAQ_BASIC` | `realtime-nasdaq-basic.intrinio.com`  | binary  |
//! | `MANUAL`       | caller-supplied address               | binary  |
//! | `IEX`          | `realtime.intrinio.com`               | JSON    |

pub mod auth;
pub mod codec;
pub mod messages;
pub mod protocol;
pub mod transport;

pub use auth::{Credentials, DEFAULT_AUTH_TIMEOUT, HttpTokenProvider};
pub use codec::{BinaryCodec, EncodeError, FrameReader, JsonCodec, WireVersion};
pub use protocol::{BinaryProtocol, DEFAULT_HEARTBEAT_INTERVAL, PhoenixProtocol};
pub use transport::{WebSocketConnection, WebSocketTransport};

/// Value of the `Client-Information` header sent on every request.
pub const CLIENT_INFORMATION: &str =
    concat!("IntrinioRealtimeRustSDKv", env!("CARGO_PKG_VERSION"));
