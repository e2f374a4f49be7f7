pub mod archive;
pub mod batch;
pub mod certificate;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod models;
pub mod pdf;
pub mod progress;
pub mod routes;
pub mod state;
pub mod storage;
pub mod store;
pub mod templates;
pub mod verify;
