pub mod mail;
pub mod mailbox;
pub mod platform;
