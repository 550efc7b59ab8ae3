//! Evok REST driver.
//!
//! Talks to the Evok HTTP API exposed on Unipi controllers:
//!
//! - read:  `GET  http://<host>:<port>/rest/<kind>/<circuit>` → JSON with a `value` field
//! - write: `POST http://<host>:<port>/rest/<kind>/<circuit>` with form body `value=<v>`
//!
//! Every request carries the configured per-call timeout.

use plc_common::config::GatewayConfig;
use plc_common::gateway::{GatewayDiagnostics, GatewayError, IoGateway};
use plc_common::point::{Address, PointValue, Value};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use std::time::Duration;
use tracing::{debug, info, trace};

/// Factory function registered as `"evok"`.
pub fn create_gateway(
    config: &GatewayConfig,
    timeout: Duration,
) -> Result<Box<dyn IoGateway>, GatewayError> {
    Ok(Box::new(EvokGateway::new(config, timeout)?))
}

/// HTTP client for one Evok instance.
pub struct EvokGateway {
    base_url: String,
    timeout: Duration,
    client: Option<Client>,
    diagnostics: GatewayDiagnostics,
}

impl EvokGateway {
    pub fn new(config: &GatewayConfig, timeout: Duration) -> Result<Self, GatewayError> {
        if config.host.is_empty() {
            return Err(GatewayError::Config("evok host is empty".to_string()));
        }
        if config.port == 0 {
            return Err(GatewayError::Config("evok port must be > 0".to_string()));
        }
        Ok(Self {
            base_url: format!("http://{}:{}/rest", config.host, config.port),
            timeout,
            client: None,
            diagnostics: GatewayDiagnostics::default(),
        })
    }

    /// Resource URL of a point.
    pub fn point_url(&self, address: &Address) -> String {
        format!("{}/{}/{}", self.base_url, address.kind(), address.circuit())
    }

    fn client(&self) -> Result<&Client, GatewayError> {
        self.client
            .as_ref()
            .ok_or_else(|| GatewayError::Unreachable("not connected".to_string()))
    }

    fn count_failure(&mut self, error: &GatewayError) {
        self.diagnostics.failures += 1;
        if matches!(error, GatewayError::Timeout { .. }) {
            self.diagnostics.timeouts += 1;
        }
    }

    fn get(&self, address: &Address) -> Result<Value, GatewayError> {
        let response = self
            .client()?
            .get(self.point_url(address))
            .send()
            .map_err(|e| map_transport_error(address, self.timeout, &e))?;
        let response = check_status(address, response)?;
        let body: serde_json::Value = response
            .json()
            .map_err(|e| map_transport_error(address, self.timeout, &e))?;
        parse_value(address, &body)
    }

    fn post(&self, address: &Address, value: Value) -> Result<(), GatewayError> {
        let response = self
            .client()?
            .post(self.point_url(address))
            .form(&[("value", form_value(value))])
            .send()
            .map_err(|e| map_transport_error(address, self.timeout, &e))?;
        check_status(address, response)?;
        Ok(())
    }
}

impl IoGateway for EvokGateway {
    fn name(&self) -> &'static str {
        "evok"
    }

    fn connect(&mut self) -> Result<(), GatewayError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        // Any HTTP answer proves the service is there.
        let url = format!("{}/all", self.base_url);
        client.get(&url).send().map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout {
                    address: url.clone(),
                    timeout: self.timeout,
                }
            } else {
                GatewayError::Unreachable(format!("{}: {e}", self.base_url))
            }
        })?;

        info!("Connected to Evok at {}", self.base_url);
        self.client = Some(client);
        Ok(())
    }

    fn read_point(&mut self, address: &Address) -> Result<PointValue, GatewayError> {
        self.diagnostics.reads += 1;
        match self.get(address) {
            Ok(value) => {
                trace!("GET {} = {}", address, value);
                Ok(PointValue::fresh(address.clone(), value))
            }
            Err(e) => {
                self.count_failure(&e);
                Err(e)
            }
        }
    }

    fn write_point(&mut self, address: &Address, value: Value) -> Result<(), GatewayError> {
        self.diagnostics.writes += 1;
        match self.post(address, value) {
            Ok(()) => {
                trace!("POST {} = {}", address, value);
                Ok(())
            }
            Err(e) => {
                self.count_failure(&e);
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) -> Result<(), GatewayError> {
        self.client = None;
        debug!("Evok client released");
        Ok(())
    }

    fn diagnostics(&self) -> Option<GatewayDiagnostics> {
        Some(self.diagnostics.clone())
    }
}

// ─── Wire Helpers ───────────────────────────────────────────────────

fn map_transport_error(address: &Address, timeout: Duration, e: &reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout {
            address: address.to_string(),
            timeout,
        }
    } else if e.is_connect() {
        GatewayError::Unreachable(e.to_string())
    } else {
        GatewayError::Protocol(format!("{address}: {e}"))
    }
}

fn check_status(address: &Address, response: Response) -> Result<Response, GatewayError> {
    match response.status() {
        s if s.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(GatewayError::InvalidAddress(address.to_string())),
        s => Err(GatewayError::Protocol(format!("{address}: HTTP {s}"))),
    }
}

/// Extract the point value from an Evok JSON body.
///
/// Accepts both the flat layout (`{"value": 1, ...}`) and the wrapped one
/// (`{"status": "success", "data": {"value": 1, ...}}`).
pub(crate) fn parse_value(
    address: &Address,
    body: &serde_json::Value,
) -> Result<Value, GatewayError> {
    let raw = body
        .get("value")
        .or_else(|| body.get("data").and_then(|d| d.get("value")))
        .ok_or_else(|| GatewayError::Protocol(format!("{address}: reply has no value")))?;

    let value = match raw {
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| GatewayError::Protocol(format!("{address}: bad number {n}")))?,
        other => {
            return Err(GatewayError::Protocol(format!(
                "{address}: unexpected value {other}"
            )));
        }
    };

    value.coerce(address.value_type()).ok_or_else(|| {
        GatewayError::Protocol(format!(
            "{address}: {value} is not a {} value",
            address.value_type()
        ))
    })
}

/// Form encoding of a written value. Discrete outputs take `0` / `1`.
pub(crate) fn form_value(value: Value) -> String {
    match value {
        Value::Bool(b) => u8::from(b).to_string(),
        Value::Number(n) => n.to_string(),
    }
}
