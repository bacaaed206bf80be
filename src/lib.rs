//! OpenWork server: a filesystem-backed control plane for OpenWork
//! workspaces and the local opencode engine.

pub mod approval;
pub mod audit;
pub mod auth;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod extensions;
pub mod providers;
pub mod reload;
pub mod server;
pub mod store;
pub mod watch;
pub mod workspace;
