mod command;
mod config;
mod gateway;
mod safety;
mod transport;

use anyhow::{Context, Result};
use command::handlers::{register_all, HandlerMap, PlcCommandHandler};
use command::{CommandProcessor, Sweeper};
use config::BridgeConfig;
use futures::stream::{FuturesUnordered, StreamExt};
use gateway::{AckGateway, DedupCache, ExecGateway, TriggerPoller};
use hub_bridge_shared::frame::layouts;
use hub_bridge_shared::{
    Clock, Command, CommandRegistry, ExecutionState, HubMode, HubStateSnapshot, SystemClock,
};
use safety::{AdmissionPolicy, Guard, SharedHubState};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use transport::{MemoryTransport, PlcTransport};

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = BridgeConfig::from_env().context("loading configuration")?;

    info!("Hub bridge starting: {}", config.device_serial);
    info!(
        "  PLC areas: ack={} exec={} control={}",
        config.ack_area, config.exec_area, config.control_area
    );

    let ack_frame = Arc::new(layouts::ack_frame(config.ack_area)?);
    let exec_frame = Arc::new(layouts::exec_frame(config.exec_area)?);
    let control_frame = Arc::new(layouts::control_frame(config.control_area)?);

    let plc: Arc<dyn PlcTransport> = Arc::new(
        MemoryTransport::new()
            .with_area(config.ack_area, ack_frame.end())
            .with_area(config.exec_area, exec_frame.end())
            .with_area(config.control_area, control_frame.end()),
    );
    info!("PLC transport: {}", plc.name());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(Mutex::new(
        CommandRegistry::new(clock.clone()).with_timeouts(
            config.accept_timeout,
            config.exec_timeout,
            config.ttl,
        ),
    ));
    let ack_tokens = Arc::new(Mutex::new(DedupCache::new(clock.clone(), config.dedup_ttl)));
    let exec_tokens = Arc::new(Mutex::new(DedupCache::new(clock, config.dedup_ttl)));

    // Every command type the policy knows goes to the actuator
    let policy = Arc::new(AdmissionPolicy::standard());
    let mut handlers = HandlerMap::new();
    register_all(
        &mut handlers,
        policy.command_types(),
        Arc::new(PlcCommandHandler::new(plc.clone(), control_frame)),
    );
    info!("Registered handlers for {} command types", handlers.len());

    let hub_state = Arc::new(match config.initial_mode {
        Some(mode) => SharedHubState::with_snapshot(HubStateSnapshot::new(mode, ExecutionState::Idle)),
        None => SharedHubState::new(),
    });

    let processor = Arc::new(
        CommandProcessor::new(
            registry.clone(),
            Arc::new(handlers),
            hub_state.clone(),
            Guard::new(policy),
        )
        .with_retry(config.retry),
    );

    // Spawn timeout and TTL sweeps
    let sweeper = Sweeper::new(registry, config.sweep_interval)
        .with_cache(ack_tokens.clone())
        .with_cache(exec_tokens.clone());
    tokio::spawn(async move { sweeper.run().await });

    // Spawn acknowledgement poller
    let ack_poller = TriggerPoller::new(AckGateway::new(plc.clone(), ack_frame)?, ack_tokens);
    let processor_clone = processor.clone();
    let period = config.poll_interval;
    tokio::spawn(async move {
        ack_poller
            .run(period, |ack| {
                let processor = processor_clone.clone();
                async move {
                    processor.on_ack(&ack).await;
                }
            })
            .await;
    });

    // Spawn execution poller
    let exec_poller = TriggerPoller::new(ExecGateway::new(plc, exec_frame)?, exec_tokens);
    let processor_clone = processor.clone();
    tokio::spawn(async move {
        exec_poller
            .run(period, |exec| {
                let processor = processor_clone.clone();
                async move {
                    processor.on_exec(&exec).await;
                }
            })
            .await;
    });

    // Main input loop: one JSON object per line
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = FuturesUnordered::new();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(command) = handle_input_line(&line, &hub_state) {
                        let processor = processor.clone();
                        in_flight.push(tokio::spawn(async move {
                            let command_id = command.command_id.clone();
                            (command_id, processor.on_command(command).await)
                        }));
                    }
                }
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            },
            Some(joined) = in_flight.next(), if !in_flight.is_empty() => {
                log_outcome(joined);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    // Let in-flight dispatches finish
    while let Some(joined) = in_flight.next().await {
        log_outcome(joined);
    }

    Ok(())
}

/// Parse one input line: a command, or `{"hub_mode": ...}` to update the hub state.
/// A null mode forgets the reported state so every command is denied again.
fn handle_input_line(line: &str, hub_state: &SharedHubState) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!("Ignoring malformed input: {}", e);
            return None;
        }
    };

    match value.get("hub_mode") {
        Some(Value::Null) => {
            hub_state.clear();
            info!("Hub state cleared");
            return None;
        }
        Some(Value::String(mode)) => {
            match mode.parse::<HubMode>() {
                Ok(mode) => hub_state.update(HubStateSnapshot::new(mode, ExecutionState::Idle)),
                Err(e) => warn!("{}", e),
            }
            return None;
        }
        Some(other) => {
            warn!("Ignoring hub_mode that is not a string: {}", other);
            return None;
        }
        None => {}
    }

    match serde_json::from_value::<Command>(value) {
        Ok(command) => Some(command),
        Err(e) => {
            warn!("Ignoring invalid command: {}", e);
            None
        }
    }
}

fn log_outcome(
    joined: Result<(String, hub_bridge_shared::Transition), tokio::task::JoinError>,
) {
    match joined {
        Ok((command_id, transition)) => {
            debug!(
                "Command {} settled: {:?} -> {:?}",
                command_id,
                transition.result,
                transition.status()
            );
        }
        Err(e) => error!("Command task failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_line_parsing() {
        let hub_state = SharedHubState::new();

        let command = handle_input_line(
            r#"{"command_id":"c-1","command_type":"start_cycle","payload":{"mission_id":3}}"#,
            &hub_state,
        )
        .unwrap();
        assert_eq!(command.command_id, "c-1");

        assert!(handle_input_line(r#"{"hub_mode":"cycle_ready"}"#, &hub_state).is_none());
        assert_eq!(
            safety::HubStateProvider::snapshot(&hub_state).map(|s| s.mode),
            Some(HubMode::CycleReady)
        );

        assert!(handle_input_line(r#"{"hub_mode":7}"#, &hub_state).is_none());
        assert!(safety::HubStateProvider::snapshot(&hub_state).is_some());

        assert!(handle_input_line(r#"{"hub_mode":null}"#, &hub_state).is_none());
        assert!(safety::HubStateProvider::snapshot(&hub_state).is_none());

        assert!(handle_input_line("not json", &hub_state).is_none());
        assert!(handle_input_line(r#"{"command_id":"c-2"}"#, &hub_state).is_none());
        assert!(handle_input_line("   ", &hub_state).is_none());
    }
}
