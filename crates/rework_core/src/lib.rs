pub mod analytics;
pub mod cache;
pub mod config;
pub mod db;
pub mod demo;
pub mod domain;
pub mod engine;
pub mod error;
pub mod export;
pub mod filter;
pub mod ingest;
pub mod normalize;
pub mod repo;
