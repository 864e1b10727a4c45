pub mod config;
pub mod entity;
pub mod setup;
pub mod synthesis;
pub mod version;
