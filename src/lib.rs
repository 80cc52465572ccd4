pub mod announcer;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod identity;
pub mod neynar;
pub mod poller;
pub mod publish;
pub mod reporter;
pub mod state;
pub mod stream;
pub mod types;

/// HAM chain explorer v2 API base URL (public, no auth required)
pub const EXPLORER_API_BASE: &str = "https://ham.calderaexplorer.xyz/api/v2";

/// Farcaster API base URL (profile lookup and cast publishing)
pub const NEYNAR_API_BASE: &str = "https://api.neynar.com/v2/farcaster";

/// Marketplace event stream socket (Phoenix channels)
/// The client appends /websocket with the token and protocol version
pub const OPENSEA_STREAM_URL: &str = "wss://stream.openseabeta.com/socket";
