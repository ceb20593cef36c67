//! Edge Core RPC: JSON-RPC 2.0 over WebSocket over a Unix domain socket.
//!
//! One connection per client. Outbound calls wait for exactly one outcome (result, remote error,
//! or timeout); inbound calls from Edge Core are answered by exposed handlers.

mod client;
mod protocol;
mod transport;

pub use client::{
    ClientError, ClientState, HandlerSet, MethodHandler, RpcClient, DEFAULT_TIMEOUT,
};
pub use protocol::{
    Incoming, Request, Response, Role, RpcError, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    JSONRPC_VERSION, METHOD_NOT_FOUND, PARSE_ERROR,
};
pub use transport::{EdgeSocket, Locator};
