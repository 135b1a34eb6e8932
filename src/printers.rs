//! Network printer transport (ePOS-Print over HTTPS).
//!
//! One request per ticket, no retries. Failures are classified into
//! [`PrintError`] variants so the operator sees what to fix: the printer is
//! off or on another network, ePOS-Print is disabled, or the printer refused
//! the job.

use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{info, warn};

use crate::error::{PrintError, PrintResult};
use crate::settings::PrinterSettings;

const SERVICE_PATH: &str = "/cgi-bin/epos/service.cgi";

/// Body markers the ePOS service returns when it is disabled or the device id
/// does not exist.
pub const NOT_CONFIGURED_MARKERS: [&str; 2] = ["SchemaError", "DeviceNotFound"];

/// Where and how long to wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterEndpoint {
    /// `host[:port]`, or a full `http(s)://` base.
    pub address: String,
    pub device_id: String,
    pub timeout_ms: u64,
}

impl PrinterEndpoint {
    pub fn from_settings(settings: &PrinterSettings) -> Self {
        Self {
            address: settings.ip.clone(),
            device_id: settings.device_id.clone(),
            timeout_ms: settings.timeout_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn service_url(&self) -> String {
        let address = self.address.trim().trim_end_matches('/');
        let base = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("https://{address}")
        };
        format!(
            "{base}{SERVICE_PATH}?devid={}&timeout={}",
            urlencoding::encode(&self.device_id),
            self.timeout_ms
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterResponse {
    pub status: u16,
    pub body: String,
}

/// Sends one ePOS request body and returns the raw response.
///
/// Implementations map network-level failures to [`PrintError::Unreachable`]
/// and leave status/body interpretation to [`classify_response`].
pub trait PrintTransport: Send + Sync {
    fn post(
        &self,
        endpoint: &PrinterEndpoint,
        body: String,
    ) -> impl Future<Output = PrintResult<PrinterResponse>> + Send;
}

/// reqwest-backed transport. Printers ship self-signed certificates, so this
/// client skips certificate verification.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> PrintResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| PrintError::Transport(format!("http client: {e}")))?;
        Ok(Self { client })
    }

    pub fn for_endpoint(endpoint: &PrinterEndpoint) -> PrintResult<Self> {
        Self::new(endpoint.timeout())
    }
}

fn map_send_error(address: &str, err: &reqwest::Error) -> PrintError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        return PrintError::Unreachable {
            address: address.to_string(),
            reason: err.to_string(),
        };
    }
    if err.is_builder() {
        return PrintError::Transport(format!("invalid printer address {address}"));
    }
    PrintError::Transport(err.to_string())
}

impl PrintTransport for HttpTransport {
    async fn post(&self, endpoint: &PrinterEndpoint, body: String) -> PrintResult<PrinterResponse> {
        let url = endpoint.service_url();
        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", "\"\"")
            .body(body)
            .send()
            .await
            .map_err(|e| map_send_error(&endpoint.address, &e))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| map_send_error(&endpoint.address, &e))?;
        Ok(PrinterResponse { status, body })
    }
}

/// Value of the first `name="..."` attribute in an ePOS response.
fn response_attr<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {name}=\"");
    let start = body.find(&needle)? + needle.len();
    let len = body[start..].find('"')?;
    Some(&body[start..start + len])
}

/// Turn a printer response into success or a classified failure.
///
/// Configuration markers win over the status code: a disabled ePOS service
/// answers with either 200 or 500 depending on firmware.
pub fn classify_response(response: &PrinterResponse) -> PrintResult<()> {
    if let Some(marker) = NOT_CONFIGURED_MARKERS
        .iter()
        .find(|m| response.body.contains(*m))
    {
        return Err(PrintError::NotConfigured {
            marker: marker.to_string(),
        });
    }
    if !(200..300).contains(&response.status) {
        return Err(PrintError::Rejected {
            status: response.status,
        });
    }
    if response_attr(&response.body, "success") == Some("false") {
        let code = response_attr(&response.body, "code")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("unknown");
        return Err(PrintError::Device {
            code: code.to_string(),
        });
    }
    Ok(())
}

/// Send an ePOS envelope and classify the outcome.
///
/// The transport's own timeout is backed by an outer deadline so a transport
/// that never answers still ends in [`PrintError::Unreachable`].
pub async fn send_request<T: PrintTransport>(
    transport: &T,
    endpoint: &PrinterEndpoint,
    envelope: String,
) -> PrintResult<()> {
    let started = Instant::now();
    let bytes = envelope.len();
    info!(
        address = %endpoint.address,
        device_id = %endpoint.device_id,
        bytes,
        "Sending ePOS-Print request"
    );

    let outcome = match tokio::time::timeout(endpoint.timeout(), transport.post(endpoint, envelope))
        .await
    {
        Ok(result) => result.and_then(|resp| {
            let classified = classify_response(&resp);
            if classified.is_ok() {
                info!(
                    status = resp.status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Printer accepted request"
                );
            }
            classified
        }),
        Err(_) => Err(PrintError::Unreachable {
            address: endpoint.address.clone(),
            reason: format!("no response within {} ms", endpoint.timeout_ms),
        }),
    };

    if let Err(e) = &outcome {
        warn!(
            address = %endpoint.address,
            category = e.category(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            error = %e,
            "Print request failed"
        );
    }
    outcome
}
