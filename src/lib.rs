// src/lib.rs
//! Pro forma return calculator, sensitivity grid and Excel exporter for development deals.

pub mod config;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
