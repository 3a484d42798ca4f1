pub mod client;
pub mod models;
pub mod pacer;
pub mod provider;
pub mod targets;
