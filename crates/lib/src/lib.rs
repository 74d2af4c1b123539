//! Fractise relay core: answers Telegram messages with an LLM and posts scheduled broadcasts.
//!
//! The inbound relay and the broadcaster share one outbound [`channels::ChannelHandle`] and never
//! call each other. Each is its own failure domain.

pub mod broadcast;
pub mod channels;
pub mod config;
pub mod filter;
pub mod generator;
pub mod init;
pub mod llm;
pub mod relay;
pub mod service;

#[cfg(test)]
mod testing;
