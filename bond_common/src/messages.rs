//! Notification payloads pushed by the hub and the log lines derived from them.
//!
//! Both payloads travel as JSON text with PascalCase field names. Decoding is
//! fallible per message so that a malformed payload can be logged and skipped.
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;
use crate::hub::Channel;

/// Acknowledgement of a subscribe request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionResponse {
    /// Identifier assigned by the hub, unique per subscription.
    pub subscription_id: String,
    /// Instruments covered by the subscription; the hub may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_ids: Option<Vec<String>>,
}

impl SubscriptionResponse {
    /// Decode a response from its JSON text.
    pub fn decode(payload: &str) -> Result<Self, MonitorError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// The single log line announcing this subscription.
    pub fn log_line(&self) -> String {
        let instruments = self
            .instrument_ids
            .as_deref()
            .map(|ids| ids.join(", "))
            .unwrap_or_default();
        format!(
            "Received subscription Id {} for instruments {}",
            self.subscription_id, instruments
        )
    }
}

/// Bid/offer snapshot for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstrumentQuote {
    /// Instrument identifier.
    pub instrument_id: String,
    /// Best bid.
    pub bid: f64,
    /// Best offer.
    pub offer: f64,
}

impl InstrumentQuote {
    /// Tab-indented line rendered under a notification header.
    pub fn log_line(&self) -> String {
        format!(
            "\t{} - bid:{}, offer:{}",
            self.instrument_id,
            format_number(self.bid),
            format_number(self.offer)
        )
    }
}

/// Render a number the way a JavaScript template string does.
///
/// Plain decimals between `1e-6` and `1e21`, exponent notation with an explicit
/// sign outside that range, and `0` for negative zero.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let magnitude = value.abs();
    if value.is_nan() || (1e-6..1e21).contains(&magnitude) {
        return value.to_string();
    }
    let exponent = format!("{:e}", value);
    match exponent.split_once('e') {
        Some((mantissa, power)) if !power.starts_with('-') => format!("{}e+{}", mantissa, power),
        _ => exponent,
    }
}

/// Push update for an existing subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionNotification {
    /// Refers to the `SubscriptionResponse` this update belongs to.
    pub subscription_id: String,
    /// Quotes in the order the hub sent them.
    pub data: Vec<InstrumentQuote>,
}

impl SubscriptionNotification {
    /// Decode a notification from its JSON text.
    pub fn decode(payload: &str) -> Result<Self, MonitorError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Header line followed by one line per quote, in `data` order.
    pub fn log_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.data.len() + 1);
        lines.push(format!("{} notification:", self.subscription_id));
        lines.extend(self.data.iter().map(InstrumentQuote::log_line));
        lines
    }
}

/// A decoded delivery from one of the hub channels.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Payload of the `SubscriptionSuccessful` channel.
    SubscriptionSuccessful(SubscriptionResponse),
    /// Payload of the `SubscriptionNotification` channel.
    SubscriptionNotification(SubscriptionNotification),
}

impl InboundMessage {
    /// Decode the raw payload delivered on `channel`.
    pub fn decode(channel: Channel, payload: &str) -> Result<Self, MonitorError> {
        match channel {
            Channel::SubscriptionSuccessful => {
                SubscriptionResponse::decode(payload).map(Self::SubscriptionSuccessful)
            }
            Channel::SubscriptionNotification => {
                SubscriptionNotification::decode(payload).map(Self::SubscriptionNotification)
            }
        }
    }

    /// Lines this message contributes to the message log.
    pub fn log_lines(&self) -> Vec<String> {
        match self {
            Self::SubscriptionSuccessful(response) => vec![response.log_line()],
            Self::SubscriptionNotification(notification) => notification.log_lines(),
        }
    }
}
