//! API clients for external services
//!
//! - XML-RPC: wire codec and HTTP transport for the OpenSubtitles API

pub mod xmlrpc;

pub use xmlrpc::{ensure_ok, Value, XmlRpcClient};
