pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod models;
pub mod processor;
pub mod push;
pub mod scheduler;
