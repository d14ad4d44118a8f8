//! Data models for chat entities

mod chat;
mod message;
mod user;

pub use chat::*;
pub use message::*;
pub use user::*;
