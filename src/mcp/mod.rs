//! Minimal MCP host: just enough of the protocol to expose the speech tools
//! to a client over stdio.

pub mod server;
pub mod types;

pub use server::McpServer;
