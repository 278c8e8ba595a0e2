pub mod api;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod llm;
pub mod lock;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod services;
pub mod temporal;
