//! Edge Core client library: JSON-RPC over WebSocket on a Unix socket, the protocol translator,
//! resource manager and management roles, and the payload encodings they share. Used by the CLI.

pub mod codec;
pub mod config;
pub mod fota;
pub mod init;
pub mod lwm2m;
pub mod roles;
pub mod rpc;
