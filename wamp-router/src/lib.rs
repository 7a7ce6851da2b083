//! # wamp-router
//!
//! An asynchronous WAMP (Web Application Messaging Protocol) v2 router.
//!
//! The router mediates between many client sessions connected over pluggable
//! transports and routes two kinds of interactions inside isolated realms:
//! topic-based event distribution between publishers and subscribers, and
//! procedure calls between callers and callees. Topics and procedures can be
//! matched exactly or by prefix and wildcard patterns; calls support
//! progressive results, cancellation, and timeouts.
//!
//! Serialization is negotiated per connection from a registry of bindings
//! (JSON and MessagePack ship by default), and authentication plugs in
//! through the session policy trait.

pub mod core;
pub mod message;
pub mod router;
pub mod serializer;
pub mod transport;
