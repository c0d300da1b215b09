//! Lobby voice chat core: a lobby of peers, one negotiated media session per
//! peer, and a pulse-tone transform applied to every inbound audio track.

pub mod app;
pub mod audio;
pub mod config;
pub mod connection;
pub mod error;
pub mod lobby_server;
#[cfg(feature = "media")]
pub mod media;
pub mod net_link;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod signaling;
pub mod ui;

pub use app::App;
pub use config::Config;
pub use peer::PeerId;
pub use registry::PeerRegistry;
