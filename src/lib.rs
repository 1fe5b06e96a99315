pub mod api;
pub mod app;
pub mod config;
pub mod favorites;
pub mod fetch_error;
pub mod fetchers;
pub mod http_client;
pub mod models;
pub mod parsers;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod services;
pub mod utils;
