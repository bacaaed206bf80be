//! Route handlers, grouped by surface.

pub mod activity;
pub mod approvals;
pub mod config;
pub mod engine;
pub mod extensions;
pub mod providers;
pub mod system;
pub mod transfer;
pub mod workspaces;
