//! Role clients. Each composes one [`RpcClient`] and adds the typed calls and inbound handlers of
//! its Edge Core API (`/1/pt`, `/1/grm`, `/1/mgmt`).

mod management;
mod resource_manager;
mod translator;

pub use management::ManagementClient;
pub use resource_manager::{example_resource_params, ResourceManager, ResourceManagerEvent};
pub use translator::{
    example_device_params, ProtocolTranslator, ReceivedWrite, TranslatorEvent, TranslatorSettings,
};

use crate::rpc::{ClientError, ClientState, MethodHandler, RpcClient};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Operations shared by every role. Implementors provide the RPC client and their registration.
#[async_trait]
pub trait EdgeClient: Send + Sync {
    fn rpc(&self) -> &RpcClient;

    /// Register with Edge Core and install this role's inbound handlers.
    async fn register(&self) -> Result<Value, ClientError>;

    async fn connect(&self) -> Result<(), ClientError> {
        self.rpc().connect().await
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        self.rpc().disconnect().await
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        self.rpc().call(method, params).await
    }

    async fn expose(&self, method: &str, handler: Arc<dyn MethodHandler>) -> Result<(), ClientError> {
        self.rpc().expose(method, handler).await
    }

    async fn state(&self) -> ClientState {
        self.rpc().state().await
    }
}

/// Disconnect, logging instead of returning any failure. Used on interrupt and error paths.
pub async fn disconnect_quietly<C: EdgeClient + ?Sized>(client: &C) {
    if let Err(e) = client.disconnect().await {
        log::debug!("disconnect during shutdown failed: {}", e);
    }
}
