pub mod batch;
pub mod catalog;
pub mod commands;
pub mod events;
pub mod models;
pub mod notices;
pub mod usage;
