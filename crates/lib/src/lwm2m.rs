//! LwM2M-style resource payloads: object / instance / resource trees sent to Edge Core and the
//! resource URI carried by inbound `write` calls.

use crate::rpc::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Allowed-operations bitmask for a resource.
pub mod operation {
    pub const READ: u8 = 0x01;
    pub const WRITE: u8 = 0x02;
    pub const EXECUTE: u8 = 0x04;
    pub const DELETE: u8 = 0x08;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Int,
    Float,
    Boolean,
    Time,
    Opaque,
}

/// A resource leaf. `value` is already base64-encoded (see [`crate::codec`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub resource_id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    pub operations: u8,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub value: String,
}

impl Resource {
    pub fn new(resource_id: u16, operations: u8, value_type: ValueType, value: String) -> Self {
        Self {
            resource_id,
            resource_name: None,
            operations,
            value_type,
            value,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInstance {
    pub object_instance_id: u16,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Object {
    pub object_id: u16,
    pub object_instances: Vec<ObjectInstance>,
}

impl Object {
    /// Object with a single instance 0.
    pub fn single(object_id: u16, resources: Vec<Resource>) -> Self {
        Self {
            object_id,
            object_instances: vec![ObjectInstance {
                object_instance_id: 0,
                resources,
            }],
        }
    }
}

/// Params for `device_register`, `write`, `add_resource` and `write_resource_value`.
/// Resource-manager calls carry no device id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub objects: Vec<Object>,
}

impl ResourceParams {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn find(&self, object_id: u16, instance_id: u16, resource_id: u16) -> Option<&Resource> {
        self.objects
            .iter()
            .filter(|o| o.object_id == object_id)
            .flat_map(|o| o.object_instances.iter())
            .filter(|i| i.object_instance_id == instance_id)
            .flat_map(|i| i.resources.iter())
            .find(|r| r.resource_id == resource_id)
    }
}

/// Address of a resource as Edge Core sends it in inbound calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUri {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub object_id: u16,
    pub object_instance_id: u16,
    pub resource_id: u16,
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.object_id, self.object_instance_id, self.resource_id
        )
    }
}

/// Params of an inbound `write`: Edge Core pushing a value or an execute to this client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WriteParams {
    pub uri: ResourceUri,
    pub operation: u8,
    pub value: String,
}

impl WriteParams {
    pub fn from_params(params: Value) -> Result<Self, RpcError> {
        serde_json::from_value(params)
            .map_err(|e| RpcError::invalid_params(format!("invalid write params: {}", e)))
    }

    pub fn operation_label(&self) -> &'static str {
        match self.operation {
            operation::WRITE => "write",
            operation::EXECUTE => "execute",
            _ => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resource_params_serialize_in_edge_layout() {
        let params = ResourceParams {
            device_id: Some("thermo-0".to_string()),
            objects: vec![Object::single(
                3303,
                vec![Resource::new(5700, operation::READ, ValueType::Float, "QDWAAAAAAAA=".into())],
            )],
        };
        assert_eq!(
            params.to_value(),
            json!({
                "deviceId": "thermo-0",
                "objects": [{
                    "objectId": 3303,
                    "objectInstances": [{
                        "objectInstanceId": 0,
                        "resources": [{
                            "resourceId": 5700,
                            "operations": 1,
                            "type": "float",
                            "value": "QDWAAAAAAAA="
                        }]
                    }]
                }]
            })
        );
    }

    #[test]
    fn device_id_is_omitted_when_absent() {
        let params = ResourceParams {
            device_id: None,
            objects: vec![],
        };
        assert_eq!(params.to_value(), json!({ "objects": [] }));
    }

    #[test]
    fn write_params_parse_and_label() {
        let p = WriteParams::from_params(json!({
            "uri": { "deviceId": "d", "objectId": 3303, "objectInstanceId": 0, "resourceId": 5700 },
            "operation": 2,
            "value": "AAAAAAAANEA="
        }))
        .unwrap();
        assert_eq!(p.uri.to_string(), "3303/0/5700");
        assert_eq!(p.uri.device_id.as_deref(), Some("d"));
        assert_eq!(p.operation_label(), "write");

        let exec = WriteParams { operation: operation::EXECUTE, ..p.clone() };
        assert_eq!(exec.operation_label(), "execute");
        let other = WriteParams { operation: operation::DELETE, ..p };
        assert_eq!(other.operation_label(), "unknown");
    }

    #[test]
    fn write_params_missing_fields_are_invalid_params() {
        let e = WriteParams::from_params(json!({ "operation": 2 })).unwrap_err();
        assert_eq!(e.code, crate::rpc::INVALID_PARAMS);
    }
}
