//! Cookie bot: a fortune-cookie Telegram bot.

pub mod channels;
pub mod config;
pub mod conversation;
pub mod corpus;
pub mod error;
pub mod ingress;
pub mod service;
pub mod session;
