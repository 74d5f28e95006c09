pub mod config;
pub mod http;
pub mod logger;
pub mod sender;
