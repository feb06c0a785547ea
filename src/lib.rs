pub mod aggregator;
pub mod alerts;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod facade;
pub mod ingest;
pub mod store;
