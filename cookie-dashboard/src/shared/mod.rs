/// Shared modules for the cookie dashboard
pub mod animator;
pub mod cache;
pub mod derived;
pub mod error;
pub mod poller;
pub mod source;
pub mod types;
pub mod widget;
