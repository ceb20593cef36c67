//! Firmware-over-the-air: validation of the `manifest_meta_data` call Edge Core sends when a
//! firmware campaign targets one of this translator's devices.

use crate::codec;
use crate::rpc::RpcError;
use serde::Deserialize;
use serde_json::Value;

/// Vendor id the example device firmware was built for.
pub const VENDOR_ID: &[u8; 16] = b"SUBDEVICE-VENDOR";
/// Class id the example device firmware was built for.
pub const CLASS_ID: &[u8; 16] = b"SUBDEVICE--CLASS";
/// Manifest format version the example device reports in resource 10255/0/0.
pub const MANIFEST_PROTOCOL_VERSION: i32 = 4;

pub const MISSING_FIELDS: &str =
    "Missing any of the fields in params: classid, deviceId, vendorid, version, component name";
pub const WRONG_VENDOR_OR_CLASS: &str = "wrong vendor or class ID";

#[derive(Debug, Default, Deserialize)]
struct ManifestUri {
    #[serde(default, rename = "deviceId")]
    device_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestMetaData {
    #[serde(default)]
    uri: ManifestUri,
    #[serde(default)]
    classid: Option<String>,
    #[serde(default)]
    vendorid: Option<String>,
    #[serde(default)]
    component_name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

/// A validated firmware offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareRequest {
    pub device_id: String,
    pub vendor_id: Vec<u8>,
    pub class_id: Vec<u8>,
    pub component_name: String,
    pub version: String,
    pub size: Option<u64>,
}

impl FirmwareRequest {
    /// Parse `manifest_meta_data` params. Missing fields or undecodable ids are `-32602`.
    pub fn from_params(params: Value) -> Result<Self, RpcError> {
        let meta: ManifestMetaData = serde_json::from_value(params)
            .map_err(|e| RpcError::invalid_params(format!("invalid manifest params: {}", e)))?;
        let (Some(device_id), Some(classid), Some(vendorid), Some(component_name), Some(version)) = (
            meta.uri.device_id,
            meta.classid,
            meta.vendorid,
            meta.component_name,
            meta.version,
        ) else {
            return Err(RpcError::invalid_params(MISSING_FIELDS));
        };
        let version = String::from_utf8_lossy(&codec::decode_bytes(&version)?).into_owned();
        Ok(Self {
            device_id,
            vendor_id: codec::decode_bytes(&vendorid)?,
            class_id: codec::decode_bytes(&classid)?,
            component_name,
            version,
            size: meta.size,
        })
    }
}

/// Vendor and class ids this translator accepts firmware for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareIdentity {
    pub vendor_id: Vec<u8>,
    pub class_id: Vec<u8>,
}

impl Default for FirmwareIdentity {
    fn default() -> Self {
        Self {
            vendor_id: VENDOR_ID.to_vec(),
            class_id: CLASS_ID.to_vec(),
        }
    }
}

impl FirmwareIdentity {
    /// Both ids must match; a mismatch in either rejects the offer.
    pub fn check(&self, request: &FirmwareRequest) -> Result<(), RpcError> {
        if request.vendor_id != self.vendor_id || request.class_id != self.class_id {
            return Err(RpcError::invalid_params(WRONG_VENDOR_OR_CLASS));
        }
        Ok(())
    }
}
