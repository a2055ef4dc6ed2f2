pub mod webhook;

pub use webhook::webhook_config;
