//! Bridge configuration
//!
//! Defaults match the hub's standard timings. `BridgeConfig::from_env` lays
//! any present environment variables over them.

use crate::command::RetryPolicy;
use anyhow::{Context, Result};
use hub_bridge_shared::{timing, HubMode};
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration of the bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Hub serial number, used in logs
    pub device_serial: String,
    /// Area holding the acknowledgement frame
    pub ack_area: u16,
    /// Area holding the execution frame
    pub exec_area: u16,
    /// Area the control frame is written to
    pub control_area: u16,
    /// Mode assumed at startup; `None` denies everything until the hub reports
    pub initial_mode: Option<HubMode>,
    pub accept_timeout: Duration,
    pub exec_timeout: Duration,
    /// Registry record lifetime
    pub ttl: Duration,
    /// Ack/exec token lifetime
    pub dedup_ttl: Duration,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_serial: "hub-sim-001".into(),
            ack_area: 30,
            exec_area: 31,
            control_area: 32,
            initial_mode: None,
            accept_timeout: Duration::from_millis(timing::ACCEPT_TIMEOUT_MS),
            exec_timeout: Duration::from_millis(timing::EXEC_TIMEOUT_MS),
            ttl: Duration::from_millis(timing::RECORD_TTL_MS),
            dedup_ttl: Duration::from_millis(timing::RECORD_TTL_MS),
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_millis(200),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl BridgeConfig {
    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(serial) = lookup("HUB_DEVICE_SERIAL_NUMBER") {
            config.device_serial = serial;
        }
        overlay(&lookup, "PLC_ACK_READ_DB", &mut config.ack_area)?;
        overlay(&lookup, "PLC_EXEC_READ", &mut config.exec_area)?;
        overlay(&lookup, "PLC_CONTROL_WRITE", &mut config.control_area)?;

        if let Some(raw) = lookup("HUB_INITIAL_MODE") {
            let mode = raw.parse::<HubMode>().context("invalid HUB_INITIAL_MODE")?;
            config.initial_mode = Some(mode);
        }

        overlay_ms(&lookup, "HUB_ACCEPT_TIMEOUT_MS", &mut config.accept_timeout)?;
        overlay_ms(&lookup, "HUB_EXEC_TIMEOUT_MS", &mut config.exec_timeout)?;
        overlay_ms(&lookup, "HUB_RECORD_TTL_MS", &mut config.ttl)?;
        overlay_ms(&lookup, "HUB_DEDUP_TTL_MS", &mut config.dedup_ttl)?;
        overlay(&lookup, "HUB_DISPATCH_ATTEMPTS", &mut config.retry.max_attempts)?;
        overlay_ms(&lookup, "HUB_DISPATCH_BACKOFF_MS", &mut config.retry.initial_backoff)?;
        overlay_ms(&lookup, "HUB_POLL_INTERVAL_MS", &mut config.poll_interval)?;
        overlay_ms(&lookup, "HUB_SWEEP_INTERVAL_MS", &mut config.sweep_interval)?;

        if config.retry.max_attempts == 0 {
            anyhow::bail!("HUB_DISPATCH_ATTEMPTS must be at least 1");
        }

        Ok(config)
    }
}

fn overlay<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {}: '{}'", key, raw))?;
    }
    Ok(())
}

fn overlay_ms<F>(lookup: &F, key: &str, target: &mut Duration) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let mut millis = target.as_millis() as u64;
    overlay(lookup, key, &mut millis)?;
    *target = Duration::from_millis(millis);
    Ok(())
}
