//! Alpaca Crypto Stream Adapters
//!
//! Implements the client side of Alpaca's crypto market data stream:
//!
//! - **Transport**: WebSocket over rustls with header authentication
//! - **Codec**: JSON frames into typed market events and control messages
//! - **Supervisor**: connection lifecycle, heartbeat and reconnection

pub mod auth;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod supervisor;
pub mod transport;

pub use auth::{AuthError, Authenticator, CredentialError, Credentials};
pub use codec::{CodecError, DecodedFrame, JsonCodec};
pub use heartbeat::{HeartbeatConfig, HeartbeatConfigError, Liveness};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use supervisor::{
    DEFAULT_ENDPOINT, StreamClient, StreamClientConfig, StreamClientError, StreamEvent,
};
pub use transport::{WsConnection, WsTransport};
