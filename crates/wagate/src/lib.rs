//! wagate - A small HTTP gateway in front of a WhatsApp messaging session.
//!
//! The gateway exposes REST endpoints for checking whether a number is on the
//! network and for sending text and PDF documents, and streams session
//! lifecycle events (QR code, authenticated, ready, disconnected) to a browser
//! dashboard over server-sent events.

pub mod client;
pub mod config;
pub mod events;
pub mod handlers;
pub mod phone;
pub mod response;
pub mod server;
pub mod session;
pub mod staging;
pub mod validation;
