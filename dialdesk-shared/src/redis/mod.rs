/// Redis integration
///
/// - [`client`]: connection management and health checks
/// - [`bridge`]: change-event fan-out between processes over pub/sub

pub mod bridge;
pub mod client;

pub use bridge::{BridgeError, ChangePublisher, CHANGES_CHANNEL};
pub use client::{RedisClient, RedisClientError, RedisConfig};
