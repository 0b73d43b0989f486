pub mod bots;
pub mod chat;
pub mod health;
pub mod import;
pub mod sandbox;
pub mod sessions;
pub mod ui;
pub mod workspaces;
