// src/services/mod.rs
pub mod adjustments;
pub mod calculations;
pub mod format;
pub mod live_workbook;
pub mod sensitivity;
pub mod summary;
pub mod validation;
pub mod workbook;
