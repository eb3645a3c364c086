//! HTTP request handlers.

mod body;
mod dashboard;
mod events;
mod health;
mod messages;
mod webhook;

pub use body::RequestBody;
pub use dashboard::dashboard;
pub use events::events;
pub use health::{livez, readyz, status};
pub use messages::{check_number, send_message, send_pdf};
pub use webhook::bridge_webhook;
