//! Authoritative multiplayer block-painting platformer server
//!
//! The simulation core (map, physics, world, rounds, snapshots) is pure
//! and deterministic; the async layers (game task, WebSocket sessions,
//! HTTP surface, persistence, payouts) wrap it.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod payments;
pub mod store;
pub mod util;
pub mod ws;
