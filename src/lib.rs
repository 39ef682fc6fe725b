#![forbid(unsafe_code)]

//! `mc-warden`: sidecar agent supervising a Minecraft server.

pub mod api;
pub mod auth;
pub mod backup;
pub mod config;
pub mod errors;
pub mod logs;
pub mod models;
pub mod persistence;
pub mod policy;
pub mod rcon;
pub mod sandbox;
pub mod supervisor;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
