pub mod api;
pub mod auth;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod feed;
pub mod push;
pub mod store;
pub mod terminal;
