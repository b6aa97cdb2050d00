pub mod backends;
pub mod config_loader;
pub mod error;
pub mod invoker;
pub mod mcp;
pub mod tools;
