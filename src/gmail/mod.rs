mod api;
mod client;
mod gateway;

pub use client::GmailGateway;
pub use gateway::{GatewayError, ListFilter, MailGateway};
