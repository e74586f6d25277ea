pub mod charts;
pub mod config;
pub mod dashboard;
pub mod incidents;
pub mod server;
pub mod warehouse;
