//! Shaper Console - live telemetry client for the shaping daemon
//!
//! This crate keeps one authenticated WebSocket connection to the daemon,
//! routes its push frames to rolling chart histories, and polls the
//! daemon's topology snapshot to project a rooted, depth-bounded tree view.

pub mod auth;
pub mod bus;
pub mod commands;
pub mod config;
pub mod context;
pub mod history;
pub mod render;
pub mod store;
pub mod tree;
pub mod units;
