pub mod clock;
pub mod config;
pub mod directory;
pub mod engine;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;
pub mod seed;
pub mod service;
pub mod wal;
