//! Integrations and cross-cutting services: Redis cache, media host,
//! real-time hub and notifications.

pub mod cache;
pub mod media;
pub mod notifications;
pub mod realtime;

pub use cache::RedisCache;
pub use media::MediaClient;
pub use realtime::RealtimeHub;
