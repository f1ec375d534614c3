//! Juju API client.
//!
//! Speaks the controller's websocket JSON-RPC protocol: one request frame
//! `{"request-id", "type", "version", "request", "params"}` per call, answered
//! by a frame carrying the same `request-id` and either `response` or `error`.
//! Calls are serialized over a single connection.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::cluster::Cluster;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Application, Unit, WorkloadStatus};

const ADMIN_VERSION: u32 = 3;
const MODEL_MANAGER_VERSION: u32 = 5;
const CLIENT_VERSION: u32 = 2;
const ALL_WATCHER_VERSION: u32 = 1;
const ACTION_VERSION: u32 = 7;
const CLIENT_RELEASE: &str = "2.9.0";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Rpc {
    ws: WsStream,
    next_id: u64,
}

impl Rpc {
    async fn connect(url: &str, cacert: &str) -> Result<Self> {
        let cert = native_tls::Certificate::from_pem(cacert.as_bytes())
            .map_err(|e| Error::Config(format!("invalid cacert: {e}")))?;
        // Juju API certificates are issued for "juju-apiserver", not the endpoint address.
        let tls = native_tls::TlsConnector::builder()
            .add_root_certificate(cert)
            .disable_built_in_roots(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| Error::Cluster(format!("tls setup failed: {e}")))?;

        let (ws, _) = tokio_tungstenite::connect_async_tls_with_config(
            url,
            None,
            false,
            Some(Connector::NativeTls(tls)),
        )
        .await
        .map_err(|e| Error::Cluster(format!("cannot connect to {url}: {e}")))?;

        Ok(Self { ws, next_id: 0 })
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.call(
            "Admin",
            ADMIN_VERSION,
            "Login",
            None,
            json!({
                "auth-tag": format!("user-{username}"),
                "credentials": password,
                "nonce": "",
                "macaroons": [],
                "client-version": CLIENT_RELEASE,
            }),
        )
        .await?;
        Ok(())
    }

    async fn call(
        &mut self,
        facade: &str,
        version: u32,
        request: &str,
        object_id: Option<&str>,
        params: Value,
    ) -> Result<Value> {
        self.next_id += 1;
        let request_id = self.next_id;

        let mut frame = json!({
            "request-id": request_id,
            "type": facade,
            "version": version,
            "request": request,
            "params": params,
        });
        if let Some(id) = object_id {
            frame["id"] = json!(id);
        }

        self.ws
            .send(Message::text(frame.to_string()))
            .await
            .map_err(|e| Error::Cluster(format!("{facade}.{request}: send failed: {e}")))?;

        loop {
            let message = self
                .ws
                .next()
                .await
                .ok_or_else(|| Error::Cluster("connection closed by controller".to_string()))?
                .map_err(|e| Error::Cluster(format!("{facade}.{request}: {e}")))?;

            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => {
                    return Err(Error::Cluster("connection closed by controller".to_string()));
                }
                _ => continue,
            };

            let reply: Value = serde_json::from_str(text.as_str())?;
            if reply.get("request-id").and_then(Value::as_u64) != Some(request_id) {
                debug!(%facade, %request, "ignoring reply for another request");
                continue;
            }
            if let Some(err) = reply.get("error").and_then(Value::as_str) {
                return Err(Error::Cluster(format!("{facade}.{request}: {err}")));
            }
            return Ok(reply.get("response").cloned().unwrap_or(Value::Null));
        }
    }

    async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Connection to one Juju model.
pub struct JujuClient {
    rpc: Mutex<Rpc>,
    watcher_id: Mutex<Option<String>>,
    model_uuid: String,
}

impl JujuClient {
    /// Log in to the controller, resolve the configured model and connect to it.
    pub async fn connect(config: &Config) -> Result<Self> {
        let password = config.password.expose_secret();

        let mut controller =
            Rpc::connect(&format!("wss://{}/api", config.endpoint), &config.cacert).await?;
        controller.login(&config.username, password).await?;
        let models = controller
            .call(
                "ModelManager",
                MODEL_MANAGER_VERSION,
                "ListModels",
                None,
                json!({"tag": format!("user-{}", config.username)}),
            )
            .await?;
        controller.close().await;

        let model_uuid = resolve_model_uuid(&models, &config.model)?;
        let url = format!("wss://{}/model/{model_uuid}/api", config.endpoint);
        let mut rpc = Rpc::connect(&url, &config.cacert).await?;
        rpc.login(&config.username, password).await?;

        info!(model = %config.model, uuid = %model_uuid, "connected to model");
        Ok(Self {
            rpc: Mutex::new(rpc),
            watcher_id: Mutex::new(None),
            model_uuid,
        })
    }

    pub fn model_uuid(&self) -> &str {
        &self.model_uuid
    }

    async fn watcher_id(&self, rpc: &mut Rpc) -> Result<String> {
        let mut watcher_id = self.watcher_id.lock().await;
        if let Some(id) = watcher_id.as_ref() {
            return Ok(id.clone());
        }

        let response = rpc
            .call("Client", CLIENT_VERSION, "WatchAll", None, json!({}))
            .await?;
        let id = response
            .get("watcher-id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Cluster("WatchAll returned no watcher id".to_string()))?
            .to_string();
        *watcher_id = Some(id.clone());
        Ok(id)
    }
}

#[async_trait]
impl Cluster for JujuClient {
    async fn applications(&self) -> Result<Vec<Application>> {
        let mut rpc = self.rpc.lock().await;
        let status = rpc
            .call(
                "Client",
                CLIENT_VERSION,
                "FullStatus",
                None,
                json!({"patterns": []}),
            )
            .await?;
        parse_full_status(&status)
    }

    async fn next_deltas(&self) -> Result<Vec<Value>> {
        let mut rpc = self.rpc.lock().await;
        let id = self.watcher_id(&mut rpc).await?;
        let response = rpc
            .call("AllWatcher", ALL_WATCHER_VERSION, "Next", Some(&id), json!({}))
            .await?;
        Ok(response
            .get("deltas")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn run_action(&self, unit: &str, action: &str) -> Result<()> {
        let mut rpc = self.rpc.lock().await;
        let response = rpc
            .call(
                "Action",
                ACTION_VERSION,
                "EnqueueOperation",
                None,
                json!({"actions": [{
                    "receiver": unit_tag(unit),
                    "name": action,
                    "parameters": {},
                }]}),
            )
            .await?;

        let failure = response
            .get("actions")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find_map(|result| result.pointer("/error/message").and_then(Value::as_str));
        match failure {
            Some(message) => Err(Error::Cluster(message.to_string())),
            None => Ok(()),
        }
    }
}

/// `"mysql/0"` -> `"unit-mysql-0"`.
pub fn unit_tag(unit: &str) -> String {
    format!("unit-{}", unit.replace('/', "-"))
}

/// Find the UUID of `model` (`"name"` or `"owner/name"`) in a ListModels response.
fn resolve_model_uuid(models: &Value, model: &str) -> Result<String> {
    let (owner, name) = match model.split_once('/') {
        Some((owner, name)) => (Some(format!("user-{owner}")), name),
        None => (None, model),
    };

    models
        .get("user-models")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("model"))
        .find(|m| {
            m.get("name").and_then(Value::as_str) == Some(name)
                && owner
                    .as_deref()
                    .is_none_or(|o| m.get("owner-tag").and_then(Value::as_str) == Some(o))
        })
        .and_then(|m| m.get("uuid").and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| Error::Cluster(format!("model {model} not found on controller")))
}

/// Convert a FullStatus response into application views.
///
/// Subordinate units are reported under their principal unit; they are
/// attributed to the application named by their unit name.
fn parse_full_status(status: &Value) -> Result<Vec<Application>> {
    let Some(applications) = status.get("applications").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };

    let mut units: BTreeMap<String, Vec<Unit>> = applications
        .keys()
        .map(|name| (name.clone(), Vec::new()))
        .collect();

    for (name, app) in applications {
        for (unit_name, unit) in entries(app, "units") {
            collect_unit(name, unit_name, unit, &mut units)?;
        }
    }

    Ok(units
        .into_iter()
        .map(|(name, units)| Application { name, units })
        .collect())
}

fn collect_unit(
    application: &str,
    name: &str,
    unit: &Value,
    units: &mut BTreeMap<String, Vec<Unit>>,
) -> Result<()> {
    let status = unit
        .pointer("/workload-status/status")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Cluster(format!("unit {name} has no workload status")))?;

    units.entry(application.to_string()).or_default().push(Unit {
        name: name.to_string(),
        workload_status: WorkloadStatus::from(status),
        leader: unit.get("leader").and_then(Value::as_bool).unwrap_or(false),
    });

    for (sub_name, sub) in entries(unit, "subordinates") {
        let owner = sub_name.split_once('/').map_or(sub_name.as_str(), |(app, _)| app);
        collect_unit(owner, sub_name, sub, units)?;
    }
    Ok(())
}

fn entries<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = (&'a String, &'a Value)> {
    value.get(key).and_then(Value::as_object).into_iter().flatten()
}
