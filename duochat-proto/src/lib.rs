//! Shared protocol definitions for the duochat wire format.

pub mod event;
pub mod message;
