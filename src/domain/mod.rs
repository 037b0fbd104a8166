pub mod classify;
pub mod models;
pub mod settings;
