//! Process-variable data model and collaborator contracts.
//!
//! The controller in [`crate::field`] never talks to a device directly. It
//! consumes updates from a subscription feed and hands set requests to a
//! mutation endpoint; both sides are defined here as small traits so the
//! controller stays agnostic of transport (an EPICS gateway, a websocket
//! bridge, or the in-process [`crate::mock::MockIoc`] used in tests).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// A process-variable value: numeric for most channels, text for string
/// records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PvValue {
    /// Numeric channel value.
    Number(f64),
    /// String channel value.
    Text(String),
}

impl From<f64> for PvValue {
    fn from(value: f64) -> Self {
        PvValue::Number(value)
    }
}

impl From<&str> for PvValue {
    fn from(value: &str) -> Self {
        PvValue::Text(value.to_owned())
    }
}

/// Channel metadata as reported by the device layer.
///
/// Limits come in two flavors: display limits (the range the operator should
/// see) and control limits (the range the device will actually accept). When
/// both are present for a bound, the display limit wins.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PvDescription {
    /// Human-readable channel name.
    #[serde(default)]
    pub name: String,
    /// Data type descriptor (e.g. "number", "string").
    #[serde(default)]
    pub dtype: String,
    /// Engineering units (e.g. "eV", "mm").
    #[serde(default)]
    pub units: String,
    /// Lower display limit, if the record defines one.
    #[serde(default)]
    pub lower_disp_limit: Option<f64>,
    /// Upper display limit, if the record defines one.
    #[serde(default)]
    pub upper_disp_limit: Option<f64>,
    /// Lower control limit, if the record defines one.
    #[serde(default)]
    pub lower_ctrl_limit: Option<f64>,
    /// Upper control limit, if the record defines one.
    #[serde(default)]
    pub upper_ctrl_limit: Option<f64>,
}

impl PvDescription {
    /// Effective lower bound: display limit preferred over control limit.
    pub fn lower_limit(&self) -> Option<f64> {
        self.lower_disp_limit.or(self.lower_ctrl_limit)
    }

    /// Effective upper bound: display limit preferred over control limit.
    pub fn upper_limit(&self) -> Option<f64> {
        self.upper_disp_limit.or(self.upper_ctrl_limit)
    }
}

/// One event on the live-value feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PvUpdate {
    /// Current channel value.
    pub value: PvValue,
    /// Channel metadata accompanying the value.
    pub description: PvDescription,
    /// When the device layer produced this update.
    pub timestamp: DateTime<Utc>,
}

/// A request to write a value to a device channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetRequest {
    /// Channel identifier to write to.
    pub target: String,
    /// Value to write.
    pub value: PvValue,
}

/// Outcome of a [`SetRequest`], delivered asynchronously.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetResponse {
    /// Whether the device accepted the write.
    pub success: bool,
    /// Device-supplied detail, present on rejection.
    #[serde(default)]
    pub message: Option<String>,
}

impl SetResponse {
    /// An accepted write.
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// A rejected write with a device-supplied message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Capability: live-value subscription feed.
///
/// Implementors hand out a watch channel per process variable. The receiver
/// holds `None` until the first update arrives.
pub trait PvMonitor: Send + Sync {
    /// Subscribe to updates for the named process variable.
    ///
    /// Errors if the process variable is unknown to this monitor.
    fn subscribe(&self, pv: &str) -> Result<watch::Receiver<Option<PvUpdate>>>;
}

/// Capability: mutation endpoint accepting set requests.
#[async_trait]
pub trait PvEndpoint: Send + Sync {
    /// Write a value to a device channel and await the device's verdict.
    ///
    /// A rejected write is a successful call returning
    /// `SetResponse { success: false, .. }`; `Err` is reserved for transport
    /// failures where no verdict was obtained.
    async fn put(&self, request: SetRequest) -> Result<SetResponse>;
}
