//! Mock device server for testing without hardware.
//!
//! [`MockIoc`] is an in-process stand-in for the device layer: it serves
//! live-value subscriptions over tokio watch channels and accepts set
//! requests with a configurable latency, enforcing each channel's control
//! limits the way a real input/output controller would. All waiting uses
//! `tokio::time::sleep`, never `std::thread::sleep`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::info;

use crate::error::{AppResult, FieldError};
use crate::pv::{PvDescription, PvEndpoint, PvMonitor, PvUpdate, PvValue, SetRequest, SetResponse};

struct Channel {
    tx: watch::Sender<Option<PvUpdate>>,
    // Kept so the channel never closes while the IOC lives.
    _rx: watch::Receiver<Option<PvUpdate>>,
    value: PvValue,
    description: PvDescription,
}

/// Simulated input/output controller.
///
/// # Example
///
/// ```rust,ignore
/// let ioc = MockIoc::new();
/// ioc.register("bl:dcm_energy", PvValue::Number(0.19), description);
/// let mut feed = ioc.subscribe("bl:dcm_energy")?;
/// ioc.put(SetRequest { target: "bl:dcm_energy".into(), value: 150.0.into() }).await?;
/// ```
pub struct MockIoc {
    channels: Mutex<HashMap<String, Channel>>,
    set_latency: Duration,
    offline: AtomicBool,
}

impl MockIoc {
    /// Create a mock IOC with a 5ms set latency.
    pub fn new() -> Self {
        Self::with_latency(Duration::from_millis(5))
    }

    /// Create a mock IOC with a custom set latency.
    pub fn with_latency(set_latency: Duration) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            set_latency,
            offline: AtomicBool::new(false),
        }
    }

    /// Register a process variable with its initial value and description.
    ///
    /// Subscribers receive the initial value immediately.
    pub fn register(
        &self,
        pv: impl Into<String>,
        initial: PvValue,
        description: PvDescription,
    ) {
        let pv = pv.into();
        let update = PvUpdate {
            value: initial.clone(),
            description: description.clone(),
            timestamp: Utc::now(),
        };
        let (tx, rx) = watch::channel(Some(update));
        self.lock().insert(
            pv,
            Channel {
                tx,
                _rx: rx,
                value: initial,
                description,
            },
        );
    }

    /// Push a live-value update onto a channel, as if the device moved on
    /// its own.
    pub fn push(&self, pv: &str, value: PvValue) -> AppResult<()> {
        let mut channels = self.lock();
        let channel = channels
            .get_mut(pv)
            .ok_or_else(|| FieldError::UnknownPv(pv.to_owned()))?;
        channel.value = value.clone();
        channel.tx.send_replace(Some(PvUpdate {
            value,
            description: channel.description.clone(),
            timestamp: Utc::now(),
        }));
        Ok(())
    }

    /// Current value of a channel, if registered.
    pub fn value(&self, pv: &str) -> Option<PvValue> {
        self.lock().get(pv).map(|channel| channel.value.clone())
    }

    /// Simulate the endpoint going away: while offline, `put` fails at the
    /// transport level (no verdict is obtained).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Channel>> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Device-side range check against the control limits (falling back to
    /// the display limits). A zero/zero pair means unconfigured.
    fn out_of_band(description: &PvDescription, value: f64) -> Option<String> {
        let lower = description.lower_ctrl_limit.or(description.lower_disp_limit);
        let upper = description.upper_ctrl_limit.or(description.upper_disp_limit);
        let configured = match (lower, upper) {
            (None, None) => false,
            (Some(lo), Some(hi)) => lo != 0.0 || hi != 0.0,
            _ => true,
        };
        if !configured {
            return None;
        }
        if lower.is_some_and(|lo| value < lo) || upper.is_some_and(|hi| value > hi) {
            return Some(format!("value {value} out of range"));
        }
        None
    }
}

impl Default for MockIoc {
    fn default() -> Self {
        Self::new()
    }
}

impl PvMonitor for MockIoc {
    fn subscribe(&self, pv: &str) -> Result<watch::Receiver<Option<PvUpdate>>> {
        self.lock()
            .get(pv)
            .map(|channel| channel.tx.subscribe())
            .ok_or_else(|| anyhow!(FieldError::UnknownPv(pv.to_owned())))
    }
}

#[async_trait]
impl PvEndpoint for MockIoc {
    async fn put(&self, request: SetRequest) -> Result<SetResponse> {
        sleep(self.set_latency).await;

        if self.offline.load(Ordering::SeqCst) {
            return Err(anyhow!("endpoint offline"));
        }

        let mut channels = self.lock();
        let Some(channel) = channels.get_mut(&request.target) else {
            return Ok(SetResponse::rejected(format!(
                "unknown process variable: {}",
                request.target
            )));
        };

        if let PvValue::Number(value) = request.value {
            if let Some(message) = Self::out_of_band(&channel.description, value) {
                return Ok(SetResponse::rejected(message));
            }
        }

        info!(pv = %request.target, value = ?request.value, "mock IOC accepted set");
        channel.value = request.value.clone();
        channel.tx.send_replace(Some(PvUpdate {
            value: request.value,
            description: channel.description.clone(),
            timestamp: Utc::now(),
        }));
        Ok(SetResponse::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn energy_description() -> PvDescription {
        PvDescription {
            name: "dcm_energy".into(),
            dtype: "number".into(),
            units: "eV".into(),
            lower_ctrl_limit: Some(100.0),
            upper_ctrl_limit: Some(200.0),
            ..PvDescription::default()
        }
    }

    #[tokio::test]
    async fn subscribers_see_the_initial_value() {
        let ioc = MockIoc::new();
        ioc.register("bl:pv", PvValue::Number(150.0), energy_description());

        let feed = ioc.subscribe("bl:pv").unwrap();
        let update = feed.borrow().clone().unwrap();
        assert_eq!(update.value, PvValue::Number(150.0));
        assert_eq!(update.description.units, "eV");
    }

    #[tokio::test]
    async fn accepted_set_updates_the_feed() {
        let ioc = MockIoc::with_latency(Duration::from_millis(1));
        ioc.register("bl:pv", PvValue::Number(150.0), energy_description());
        let mut feed = ioc.subscribe("bl:pv").unwrap();

        let response = ioc
            .put(SetRequest {
                target: "bl:pv".into(),
                value: PvValue::Number(180.0),
            })
            .await
            .unwrap();
        assert!(response.success);

        feed.changed().await.unwrap();
        let update = feed.borrow().clone().unwrap();
        assert_eq!(update.value, PvValue::Number(180.0));
    }

    #[tokio::test]
    async fn out_of_band_set_is_rejected() {
        let ioc = MockIoc::with_latency(Duration::from_millis(1));
        ioc.register("bl:pv", PvValue::Number(150.0), energy_description());

        let response = ioc
            .put(SetRequest {
                target: "bl:pv".into(),
                value: PvValue::Number(250.0),
            })
            .await
            .unwrap();
        assert!(!response.success);
        assert!(response.message.unwrap().contains("out of range"));
        assert_eq!(ioc.value("bl:pv"), Some(PvValue::Number(150.0)));
    }

    #[tokio::test]
    async fn offline_endpoint_fails_at_the_transport_level() {
        let ioc = MockIoc::with_latency(Duration::from_millis(1));
        ioc.register("bl:pv", PvValue::Number(150.0), energy_description());
        ioc.set_offline(true);

        let result = ioc
            .put(SetRequest {
                target: "bl:pv".into(),
                value: PvValue::Number(180.0),
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unknown_pv_cannot_be_subscribed() {
        let ioc = MockIoc::new();
        assert!(ioc.subscribe("bl:missing").is_err());
    }
}
