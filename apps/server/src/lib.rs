//! Buildmail Server Library
//!
//! This module exposes the server components for testing purposes.

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
