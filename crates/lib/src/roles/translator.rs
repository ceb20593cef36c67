//! Protocol translator (`/1/pt`): registers example devices, drives certificate and crypto
//! calls, and answers Edge Core's `write`, certificate, crypto and FOTA notifications.

use crate::codec;
use crate::config::Config;
use crate::fota::{self, FirmwareIdentity, FirmwareRequest};
use crate::lwm2m::{operation, Object, Resource, ResourceParams, ValueType, WriteParams};
use crate::roles::EdgeClient;
use crate::rpc::{ClientError, HandlerSet, Role, RpcClient, RpcError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

/// Settings for the translator's registration and firmware updates.
#[derive(Debug, Clone)]
pub struct TranslatorSettings {
    pub name: String,
    /// Timeout for `download_asset`, which returns only after the whole image is fetched.
    pub fota_timeout: Duration,
    /// Pause between unregistering a device and registering it again with the new firmware.
    pub reboot_delay: Duration,
    pub identity: FirmwareIdentity,
}

impl TranslatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.translator.name.clone(),
            fota_timeout: Duration::from_millis(config.translator.fota_timeout_ms),
            reboot_delay: Duration::from_millis(config.translator.reboot_delay_ms),
            identity: FirmwareIdentity::default(),
        }
    }
}

/// Value pushed by Edge Core through an inbound `write`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedWrite {
    pub device_id: Option<String>,
    pub resource_path: String,
    pub operation: &'static str,
    pub value: f64,
}

/// Things Edge Core told the translator, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TranslatorEvent {
    Write(ReceivedWrite),
    CertificateRenewalResult(Value),
    CryptoCertificateResult(Value),
    FirmwareAccepted { device_id: String, version: String },
    FirmwareDownloaded { device_id: String, filename: Option<String> },
    FirmwareUpdated { device_id: String, version: String },
    FirmwareFailed { device_id: String, error: String },
}

type Events = mpsc::UnboundedSender<TranslatorEvent>;

/// Protocol translator client.
pub struct ProtocolTranslator {
    client: RpcClient,
    settings: TranslatorSettings,
    events: Events,
}

impl ProtocolTranslator {
    pub fn new(
        client: RpcClient,
        settings: TranslatorSettings,
    ) -> (Self, mpsc::UnboundedReceiver<TranslatorEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                client,
                settings,
                events,
            },
            rx,
        )
    }

    pub fn from_config(config: &Config) -> (Self, mpsc::UnboundedReceiver<TranslatorEvent>) {
        let locator = config.edge.locator(Role::ProtocolTranslator);
        let client = RpcClient::new(locator, config.edge.request_timeout());
        Self::new(client, TranslatorSettings::from_config(config))
    }

    pub fn settings(&self) -> &TranslatorSettings {
        &self.settings
    }

    fn handlers(&self) -> HandlerSet {
        let write_events = self.events.clone();
        let renewal_events = self.events.clone();
        let crypto_events = self.events.clone();
        let fota = FirmwareUpdater {
            client: self.client.clone(),
            settings: self.settings.clone(),
            events: self.events.clone(),
        };
        HandlerSet::new()
            .with("write", move |params: Value| {
                let events = write_events.clone();
                async move { on_write(params, &events) }
            })
            .with("certificate_renewal_result", move |params: Value| {
                let events = renewal_events.clone();
                async move {
                    log::info!("received certificate renewal result: {}", params);
                    let _ = events.send(TranslatorEvent::CertificateRenewalResult(params));
                    Ok(json!("ok"))
                }
            })
            .with("crypto_get_certificate_result", move |params: Value| {
                let events = crypto_events.clone();
                async move {
                    log::info!("received crypto certificate result: {}", params);
                    let _ = events.send(TranslatorEvent::CryptoCertificateResult(params));
                    Ok(json!("ok"))
                }
            })
            .with("manifest_meta_data", move |params: Value| {
                let fota = fota.clone();
                async move { fota.on_manifest(params) }
            })
    }

    /// `device_register` with the example thermostat layout.
    pub async fn register_device(&self, device_id: &str, version: &str) -> Result<Value, ClientError> {
        let params = example_device_params(device_id, 21.5, 23.5, version);
        self.client.call("device_register", params.to_value()).await
    }

    /// `write` new temperature and set point values for a registered device.
    pub async fn update_device(&self, device_id: &str) -> Result<Value, ClientError> {
        let params = example_device_params(device_id, 19.5, 20.5, "0.0.0");
        self.client.call("write", params.to_value()).await
    }

    pub async fn unregister_device(&self, device_id: &str) -> Result<Value, ClientError> {
        unregister_device(&self.client, device_id).await
    }

    pub async fn set_certificate_renewal_list(
        &self,
        certificates: &[&str],
    ) -> Result<Value, ClientError> {
        self.client
            .call("certificate_renewal_list_set", json!({ "certificates": certificates }))
            .await
    }

    pub async fn renew_certificate(&self, certificate: &str) -> Result<Value, ClientError> {
        self.client
            .call("renew_certificate", json!({ "certificate": certificate }))
            .await
    }

    pub async fn get_certificate(&self, certificate: &str) -> Result<Value, ClientError> {
        self.client
            .call("crypto_get_certificate", json!({ "certificate": certificate }))
            .await
    }

    pub async fn get_public_key(&self, key: &str) -> Result<Value, ClientError> {
        self.client
            .call("crypto_get_public_key", json!({ "key": key }))
            .await
    }

    pub async fn generate_random(&self, size: usize) -> Result<Value, ClientError> {
        self.client
            .call("crypto_generate_random", json!({ "size": size }))
            .await
    }

    /// Sign SHA-256(`data`) with a private key held by Edge Core.
    pub async fn asymmetric_sign(&self, private_key_name: &str, data: &[u8]) -> Result<Value, ClientError> {
        self.client
            .call(
                "crypto_asymmetric_sign",
                json!({
                    "private_key_name": private_key_name,
                    "hash_digest": codec::sha256_base64(data),
                }),
            )
            .await
    }

    pub async fn asymmetric_verify(
        &self,
        public_key_name: &str,
        data: &[u8],
        signature: &[u8],
    ) -> Result<Value, ClientError> {
        self.client
            .call(
                "crypto_asymmetric_verify",
                json!({
                    "public_key_name": public_key_name,
                    "hash_digest": codec::sha256_base64(data),
                    "signature": codec::encode_bytes(signature),
                }),
            )
            .await
    }

    pub async fn ecdh_key_agreement(
        &self,
        private_key_name: &str,
        peer_public_key: &[u8],
    ) -> Result<Value, ClientError> {
        self.client
            .call(
                "crypto_ecdh_key_agreement",
                json!({
                    "private_key_name": private_key_name,
                    "peer_public_key": codec::encode_bytes(peer_public_key),
                }),
            )
            .await
    }
}

#[async_trait]
impl EdgeClient for ProtocolTranslator {
    fn rpc(&self) -> &RpcClient {
        &self.client
    }

    async fn register(&self) -> Result<Value, ClientError> {
        self.client
            .register(Role::ProtocolTranslator, &self.settings.name, self.handlers())
            .await
    }
}

fn on_write(params: Value, events: &Events) -> Result<Value, RpcError> {
    let write = WriteParams::from_params(params)?;
    let received = ReceivedWrite {
        device_id: write.uri.device_id.clone(),
        resource_path: write.uri.to_string(),
        operation: write.operation_label(),
        value: codec::decode_f64(&write.value)?,
    };
    log::info!("received a write: {:?}", received);
    let _ = events.send(TranslatorEvent::Write(received));
    // Edge Core discards the value unless the write is acknowledged.
    Ok(json!("ok"))
}

async fn unregister_device(client: &RpcClient, device_id: &str) -> Result<Value, ClientError> {
    client
        .call("device_unregister", json!({ "deviceId": device_id }))
        .await
}

/// Answers `manifest_meta_data` and runs the download / reboot / re-register sequence.
#[derive(Clone)]
struct FirmwareUpdater {
    client: RpcClient,
    settings: TranslatorSettings,
    events: Events,
}

impl FirmwareUpdater {
    fn on_manifest(&self, params: Value) -> Result<Value, RpcError> {
        let request = FirmwareRequest::from_params(params)?;
        self.settings.identity.check(&request)?;
        log::info!(
            "accepted firmware {} for device {}",
            request.version,
            request.device_id
        );
        let _ = self.events.send(TranslatorEvent::FirmwareAccepted {
            device_id: request.device_id.clone(),
            version: request.version.clone(),
        });
        tokio::spawn(self.clone().run(request));
        Ok(json!("ok"))
    }

    async fn run(self, request: FirmwareRequest) {
        if let Err(e) = self.update(&request).await {
            log::error!("firmware update of {} failed: {}", request.device_id, e);
            let _ = self.events.send(TranslatorEvent::FirmwareFailed {
                device_id: request.device_id.clone(),
                error: e.to_string(),
            });
        }
    }

    async fn update(&self, request: &FirmwareRequest) -> Result<(), ClientError> {
        let response = self
            .client
            .call_with_timeout(
                "download_asset",
                json!({ "deviceId": request.device_id, "size": request.size }),
                self.settings.fota_timeout,
            )
            .await?;
        let filename = response
            .get("filename")
            .and_then(Value::as_str)
            .map(str::to_string);
        log::info!(
            "updating device {}, firmware file location {}",
            request.device_id,
            filename.as_deref().unwrap_or("(unknown)")
        );
        let _ = self.events.send(TranslatorEvent::FirmwareDownloaded {
            device_id: request.device_id.clone(),
            filename,
        });

        unregister_device(&self.client, &request.device_id).await?;
        log::info!("rebooting device {}", request.device_id);
        tokio::time::sleep(self.settings.reboot_delay).await;

        let params = example_device_params(&request.device_id, 19.5, 20.5, &request.version);
        self.client.call("device_register", params.to_value()).await?;
        log::info!(
            "device {} is running firmware {}",
            request.device_id,
            request.version
        );
        let _ = self.events.send(TranslatorEvent::FirmwareUpdated {
            device_id: request.device_id.clone(),
            version: request.version.clone(),
        });
        Ok(())
    }
}

/// Example FOTA-capable thermostat: component identity (14), temperature (3303), firmware
/// manifest (10252), device metadata (10255) and set point (3308).
pub fn example_device_params(
    device_id: &str,
    temperature: f64,
    set_point: f64,
    version: &str,
) -> ResourceParams {
    use operation::{EXECUTE, READ, WRITE};
    let zero = codec::encode_str("0");
    let unset = codec::encode_i32(-1);
    ResourceParams {
        device_id: Some(device_id.to_string()),
        objects: vec![
            Object::single(
                14,
                vec![
                    Resource::new(0, READ, ValueType::String, codec::encode_str("MAIN"))
                        .named("Component Identity"),
                    Resource::new(2, READ, ValueType::String, codec::encode_str(version))
                        .named("Component Version"),
                ],
            ),
            Object::single(
                3303,
                vec![Resource::new(5700, READ, ValueType::Float, codec::encode_f64(temperature))],
            ),
            Object::single(
                10252,
                vec![
                    Resource::new(1, EXECUTE, ValueType::String, zero.clone()),
                    Resource::new(2, READ | WRITE, ValueType::Int, unset.clone()),
                    Resource::new(3, READ | WRITE, ValueType::Int, unset),
                ],
            ),
            Object::single(
                10255,
                vec![
                    Resource::new(
                        0,
                        READ | WRITE,
                        ValueType::Int,
                        codec::encode_i32(fota::MANIFEST_PROTOCOL_VERSION),
                    ),
                    Resource::new(1, READ | WRITE, ValueType::String, zero.clone()),
                    Resource::new(2, READ | WRITE, ValueType::String, zero),
                    Resource::new(3, READ | WRITE, ValueType::String, codec::encode_bytes(fota::VENDOR_ID)),
                    Resource::new(4, READ | WRITE, ValueType::String, codec::encode_bytes(fota::CLASS_ID)),
                ],
            ),
            Object::single(
                3308,
                vec![Resource::new(5900, READ | WRITE, ValueType::Float, codec::encode_f64(set_point))],
            ),
        ],
    }
}
