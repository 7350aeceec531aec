// src/handlers/mod.rs
pub mod adjust;
pub mod error;
pub mod export;
pub mod returns;
pub mod sensitivity;
pub mod validate;
