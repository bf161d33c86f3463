//! Negotiate round trip and WebSocket URL resolution.
//!
//! Unless negotiation is skipped, the client POSTs to `<endpoint>/negotiate` and
//! follows any redirect the hub returns before opening the WebSocket. The final
//! WebSocket URL carries the connection token as its `id` query parameter.
use bond_common::{MonitorError, Result};
use log::{debug, info};
use reqwest::blocking::Client;
use serde::Deserialize;
use url::Url;

use crate::transport::config::HubConfig;

/// Negotiate protocol version requested by this client.
pub const NEGOTIATE_VERSION: u32 = 1;
/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 100;

const WEBSOCKETS_TRANSPORT: &str = "WebSockets";
const TEXT_FORMAT: &str = "Text";

/// Transport offered by the hub.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransport {
    /// Transport name, e.g. `WebSockets`.
    pub transport: String,
    /// Supported transfer formats, e.g. `Text`.
    #[serde(default)]
    pub transfer_formats: Vec<String>,
}

/// Body of a negotiate response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    /// Connection id; doubles as the token for negotiate version 0.
    #[serde(default)]
    pub connection_id: Option<String>,
    /// Token to pass as `id` on the WebSocket URL.
    #[serde(default)]
    pub connection_token: Option<String>,
    /// Version the hub answered with.
    #[serde(default)]
    pub negotiate_version: u32,
    /// Transports the hub offers.
    #[serde(default)]
    pub available_transports: Vec<AvailableTransport>,
    /// Redirect target.
    #[serde(default)]
    pub url: Option<String>,
    /// Bearer token for the redirect target.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Negotiation refused.
    #[serde(default)]
    pub error: Option<String>,
}

/// What to do after a negotiate response.
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiateStep {
    /// Negotiate again against another endpoint.
    Redirect {
        /// Endpoint to negotiate with next.
        url: String,
        /// Token presented to that endpoint.
        access_token: Option<String>,
    },
    /// Open the WebSocket with this connection token.
    Connect {
        /// Value of the `id` query parameter.
        connection_token: String,
    },
}

impl NegotiateResponse {
    /// Interpret the response.
    pub fn next_step(self) -> Result<NegotiateStep> {
        if let Some(error) = self.error {
            return Err(MonitorError::Negotiate(error));
        }
        if let Some(url) = self.url {
            return Ok(NegotiateStep::Redirect {
                url,
                access_token: self.access_token,
            });
        }

        let websockets = self.available_transports.iter().any(|offered| {
            offered.transport == WEBSOCKETS_TRANSPORT
                && (offered.transfer_formats.is_empty()
                    || offered.transfer_formats.iter().any(|f| f == TEXT_FORMAT))
        });
        if !websockets {
            return Err(MonitorError::Negotiate(
                "hub does not offer the WebSockets transport".to_string(),
            ));
        }

        let token = if self.negotiate_version >= 1 {
            self.connection_token
        } else {
            self.connection_id
        };
        token
            .map(|connection_token| NegotiateStep::Connect { connection_token })
            .ok_or_else(|| MonitorError::Negotiate("response carries no connection token".to_string()))
    }
}

/// Where and how to open the WebSocket.
#[derive(Debug, Clone, PartialEq)]
pub struct WebSocketTarget {
    /// `ws`/`wss` URL including the connection token, if any.
    pub url: Url,
    /// Bearer token to present on the upgrade request.
    pub access_token: Option<String>,
}

/// `<endpoint>/negotiate?negotiateVersion=1`, keeping the endpoint's own query.
pub fn negotiate_url(endpoint: &Url) -> Result<Url> {
    let mut url = endpoint.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| MonitorError::Format(format!("{} cannot be a base URL", endpoint)))?;
        segments.pop_if_empty().push("negotiate");
    }
    url.query_pairs_mut()
        .append_pair("negotiateVersion", &NEGOTIATE_VERSION.to_string());
    Ok(url)
}

/// Map the endpoint onto its WebSocket URL and attach the connection token.
pub fn websocket_url(endpoint: &Url, connection_token: Option<&str>) -> Result<Url> {
    let scheme = match endpoint.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(MonitorError::Format(format!("unsupported URL scheme '{}'", other)));
        }
    };
    let mut url = endpoint.clone();
    url.set_scheme(scheme)
        .map_err(|_| MonitorError::Format(format!("cannot switch {} to {}", endpoint, scheme)))?;
    if let Some(token) = connection_token {
        url.query_pairs_mut().append_pair("id", token);
    }
    Ok(url)
}

/// Resolve the WebSocket target for `config`, negotiating unless told not to.
pub fn resolve_target(config: &HubConfig) -> Result<WebSocketTarget> {
    let mut endpoint = Url::parse(&config.url)?;
    if config.skip_negotiation {
        return Ok(WebSocketTarget {
            url: websocket_url(&endpoint, None)?,
            access_token: None,
        });
    }

    let client = Client::builder()
        .timeout(config.handshake_timeout)
        .build()
        .map_err(|e| MonitorError::Negotiate(e.to_string()))?;
    let mut access_token: Option<String> = None;

    for _ in 0..MAX_REDIRECTS {
        let response = request_negotiate(&client, &endpoint, access_token.as_deref())?;
        match response.next_step()? {
            NegotiateStep::Redirect {
                url,
                access_token: token,
            } => {
                info!("Negotiate redirected to {}", url);
                endpoint = Url::parse(&url)?;
                access_token = token;
            }
            NegotiateStep::Connect { connection_token } => {
                return Ok(WebSocketTarget {
                    url: websocket_url(&endpoint, Some(&connection_token))?,
                    access_token,
                });
            }
        }
    }
    Err(MonitorError::Negotiate(format!(
        "more than {} negotiate redirects",
        MAX_REDIRECTS
    )))
}

fn request_negotiate(
    client: &Client,
    endpoint: &Url,
    access_token: Option<&str>,
) -> Result<NegotiateResponse> {
    let url = negotiate_url(endpoint)?;
    debug!("Negotiating with {}", url);
    let mut request = client.post(url.as_str());
    if let Some(token) = access_token {
        request = request.bearer_auth(token);
    }
    request
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.json::<NegotiateResponse>())
        .map_err(|e| MonitorError::Negotiate(e.to_string()))
}
