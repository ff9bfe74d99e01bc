pub mod aggregate;
pub mod clean;
pub mod engineer;
pub mod metrics;
pub mod models;
pub mod predict;
pub mod prepare;
