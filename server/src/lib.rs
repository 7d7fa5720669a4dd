//! Proxima real-time server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod proximity;
pub mod routes;
pub mod services;
pub mod state;
pub mod ws;
