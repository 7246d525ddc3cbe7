pub mod auth;
pub mod chat;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod mail;
