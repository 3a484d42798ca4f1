pub mod cli;
pub mod config;
pub mod database_ops;
pub mod normalization;
pub mod orchestrator;
pub mod telemetry;

pub mod util {
    pub mod db;
    pub mod env;
}
