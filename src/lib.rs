pub mod config;
pub mod error;
pub mod http_client;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod query;
pub mod remote;
pub mod store;
