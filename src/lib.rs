// Library for tests to access modules

pub mod azure;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod health;
pub mod lock;
pub mod models;
pub mod resource_client;
pub mod routes;
pub mod store;
pub mod version;
