//! duochat relay server library.
//!
//! Exposes the relay server for use in tests and embedding. The relay
//! accepts authenticated WebSocket connections, tracks which identities
//! are online, routes directed messages between them, and keeps unread
//! counters for recipients that were offline at send time. A small HTTP
//! surface handles account registration, login, and image uploads.

pub mod assets;
pub mod auth;
pub mod config;
pub mod delivery;
pub mod http;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod store;
pub mod unread;
