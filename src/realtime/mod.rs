//! Real-time delivery: channel registry, fan-out and the per-connection loop

pub mod broadcaster;
pub mod channel;
pub mod registry;

// Re-export main types
pub use broadcaster::{Broadcaster, DEFAULT_SEND_TIMEOUT};
pub use channel::serve_channel;
pub use registry::{ChannelGuard, ChannelHandle, ChannelKey, ConnectionRegistry, Role};
