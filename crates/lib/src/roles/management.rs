//! Management client (`/1/mgmt`): lists devices and reads or writes their resources.

use crate::config::Config;
use crate::roles::EdgeClient;
use crate::rpc::{ClientError, HandlerSet, Locator, Role, RpcClient};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;

pub struct ManagementClient {
    client: RpcClient,
}

impl ManagementClient {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &Config) -> Self {
        let locator = config.edge.locator(Role::Management);
        Self::new(RpcClient::new(locator, config.edge.request_timeout()))
    }

    /// Connect to an explicit API path and socket, as the REPL's `connect` command allows.
    pub async fn connect_with(&self, api_path: &str, socket_path: &Path) -> Result<(), ClientError> {
        self.client
            .connect_to(&Locator::new(socket_path, api_path))
            .await
    }

    pub async fn devices(&self) -> Result<Value, ClientError> {
        self.client.call("devices", json!({})).await
    }

    pub async fn read_resource(&self, endpoint_name: &str, uri: &str) -> Result<Value, ClientError> {
        self.client
            .call(
                "read_resource",
                json!({ "endpointName": endpoint_name, "uri": uri }),
            )
            .await
    }

    /// `base64_value` is already encoded; the management API does not know the resource type.
    pub async fn write_resource(
        &self,
        endpoint_name: &str,
        uri: &str,
        base64_value: &str,
    ) -> Result<Value, ClientError> {
        self.client
            .call(
                "write_resource",
                json!({ "endpointName": endpoint_name, "uri": uri, "base64Value": base64_value }),
            )
            .await
    }
}

#[async_trait]
impl EdgeClient for ManagementClient {
    fn rpc(&self) -> &RpcClient {
        &self.client
    }

    /// The management API has no registration; this always fails with `RegistrationUnsupported`.
    async fn register(&self) -> Result<Value, ClientError> {
        self.client
            .register(Role::Management, "", HandlerSet::new())
            .await
    }
}
