mod client;
mod inference;

pub use client::{SnifferClient, SpamClassifier};
