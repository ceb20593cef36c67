//! Gateway resource manager (`/1/grm`): publishes gateway-level resources and receives writes to them.

use crate::codec;
use crate::config::Config;
use crate::lwm2m::{operation, Object, Resource, ResourceParams, ValueType, WriteParams};
use crate::roles::EdgeClient;
use crate::rpc::{ClientError, HandlerSet, Role, RpcClient, RpcError};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// A `write` Edge Core forwarded to one of the manager's resources.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceManagerEvent {
    pub resource_path: String,
    pub operation: &'static str,
    /// Written bytes as text. Bytes that are not UTF-8 (e.g. a float) are replaced, not rejected.
    pub value: String,
}

pub struct ResourceManager {
    client: RpcClient,
    name: String,
    events: mpsc::UnboundedSender<ResourceManagerEvent>,
}

impl ResourceManager {
    pub fn new(
        client: RpcClient,
        name: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<ResourceManagerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                client,
                name: name.into(),
                events,
            },
            rx,
        )
    }

    pub fn from_config(config: &Config) -> (Self, mpsc::UnboundedReceiver<ResourceManagerEvent>) {
        let locator = config.edge.locator(Role::ResourceManager);
        let client = RpcClient::new(locator, config.edge.request_timeout());
        Self::new(client, config.resource_manager.name.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn add_resource(&self, params: &ResourceParams) -> Result<Value, ClientError> {
        self.client.call("add_resource", params.to_value()).await
    }

    pub async fn update_resource_value(&self, params: &ResourceParams) -> Result<Value, ClientError> {
        self.client
            .call("write_resource_value", params.to_value())
            .await
    }

    fn handlers(&self) -> HandlerSet {
        let events = self.events.clone();
        HandlerSet::new().with("write", move |params: Value| {
            let events = events.clone();
            async move { on_write(params, &events) }
        })
    }
}

#[async_trait]
impl EdgeClient for ResourceManager {
    fn rpc(&self) -> &RpcClient {
        &self.client
    }

    async fn register(&self) -> Result<Value, ClientError> {
        self.client
            .register(Role::ResourceManager, &self.name, self.handlers())
            .await
    }
}

fn on_write(
    params: Value,
    events: &mpsc::UnboundedSender<ResourceManagerEvent>,
) -> Result<Value, RpcError> {
    let write = WriteParams::from_params(params)?;
    let bytes = codec::decode_bytes(&write.value)?;
    let event = ResourceManagerEvent {
        resource_path: write.uri.to_string(),
        operation: write.operation_label(),
        value: String::from_utf8_lossy(&bytes).into_owned(),
    };
    log::info!("received a write: {:?}", event);
    let _ = events.send(event);
    Ok(json!("ok"))
}

/// Object 33001 with a read-only name and a writable float value.
pub fn example_resource_params(name: &str, value: f32) -> ResourceParams {
    ResourceParams {
        device_id: None,
        objects: vec![Object::single(
            33001,
            vec![
                Resource::new(0, operation::READ, ValueType::String, codec::encode_str(name))
                    .named("Name"),
                Resource::new(
                    1,
                    operation::READ | operation::WRITE,
                    ValueType::Float,
                    codec::encode_f32(value),
                )
                .named("Example Value"),
            ],
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_resource_layout() {
        let params = example_resource_params("gateway", 1.0);
        let v = params.to_value();
        assert!(v.get("deviceId").is_none());
        let name = params.find(33001, 0, 0).unwrap();
        assert_eq!(name.operations, operation::READ);
        assert_eq!(codec::decode_str(&name.value).unwrap(), "gateway");
        let value = params.find(33001, 0, 1).unwrap();
        assert_eq!(value.operations, 3);
        assert_eq!(value.value, "P4AAAA==");
        assert_eq!(value.resource_name.as_deref(), Some("Example Value"));
    }

    #[test]
    fn write_decodes_text() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let params = json!({
            "uri": { "objectId": 33001, "objectInstanceId": 0, "resourceId": 1 },
            "operation": 2,
            "value": codec::encode_str("42")
        });
        assert_eq!(on_write(params, &tx).unwrap(), json!("ok"));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.resource_path, "33001/0/1");
        assert_eq!(event.value, "42");
    }

    #[test]
    fn write_of_float_value_is_acknowledged() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let params = json!({
            "uri": { "objectId": 33001, "objectInstanceId": 0, "resourceId": 1 },
            "operation": 2,
            "value": codec::encode_f32(1.0)
        });
        assert_eq!(on_write(params, &tx).unwrap(), json!("ok"));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.resource_path, "33001/0/1");
        assert_eq!(event.value, String::from_utf8_lossy(&1.0f32.to_be_bytes()));
    }

    #[test]
    fn write_with_undecodable_base64_is_invalid_params() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let params = json!({
            "uri": { "objectId": 33001, "objectInstanceId": 0, "resourceId": 1 },
            "operation": 2,
            "value": "%%%"
        });
        assert_eq!(on_write(params, &tx).unwrap_err().code, crate::rpc::INVALID_PARAMS);
    }
}
