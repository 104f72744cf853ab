//! Command processor - admits, gates and dispatches incoming commands

use super::handlers::{CommandHandler, HandlerMap, SendStatus};
use crate::safety::{Guard, HubStateProvider};
use hub_bridge_shared::{
    timing, AckSnapshot, Command, CommandRegistry, CommandStatus, ExecSnapshot, Transition,
    TransitionResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Wait before the second attempt; doubles for each further attempt
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: timing::DISPATCH_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(timing::DISPATCH_INITIAL_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Wait before the given 1-based attempt: 0, initial, 2 * initial, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        self.initial_backoff * 2u32.saturating_pow(attempt - 2)
    }
}

/// Orchestrates registry, guard and dispatch for every command
pub struct CommandProcessor {
    registry: Arc<Mutex<CommandRegistry>>,
    handlers: Arc<HandlerMap>,
    hub_state: Arc<dyn HubStateProvider>,
    guard: Guard,
    retry: RetryPolicy,
}

impl CommandProcessor {
    pub fn new(
        registry: Arc<Mutex<CommandRegistry>>,
        handlers: Arc<HandlerMap>,
        hub_state: Arc<dyn HubStateProvider>,
        guard: Guard,
    ) -> Self {
        Self {
            registry,
            handlers,
            hub_state,
            guard,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Handle a command from the orchestrator
    ///
    /// Returns the last registry transition. A command whose dispatch keeps
    /// failing is left RECEIVED for the timeout sweep to resolve.
    pub async fn on_command(&self, command: Command) -> Transition {
        let hub_state = self.hub_state.snapshot();
        let received = self.registry.lock().await.on_received(command.clone());

        match received.result {
            TransitionResult::Ok => {
                info!(
                    "Command received: id={} type={}",
                    command.command_id, command.command_type
                );
            }
            TransitionResult::Duplicate if received.status() == Some(CommandStatus::Received) => {
                info!("Duplicate command {} still pending, re-dispatching", command.command_id);
            }
            _ => {
                info!(
                    "Duplicate command {} ignored (status {:?})",
                    command.command_id,
                    received.status()
                );
                return received;
            }
        }

        let Some(handler) = self.handlers.get(&command.command_type) else {
            warn!(
                "No handler for command type '{}', rejecting {}",
                command.command_type, command.command_id
            );
            return self.registry.lock().await.on_rejected(&command.command_id);
        };

        let decision = self.guard.check(&command, hub_state.as_ref());
        if !decision.allowed {
            warn!(
                "Command {} ({}) denied by guard: {} (mode {:?})",
                command.command_id,
                command.command_type,
                decision.reason.map(|r| r.code()).unwrap_or("unspecified"),
                hub_state.map(|s| s.mode)
            );
            return self.registry.lock().await.on_rejected(&command.command_id);
        }

        let status = self.dispatch_with_retry(handler.as_ref(), &command).await;

        let mut registry = self.registry.lock().await;
        match status {
            SendStatus::Ok => {
                let transition = registry.on_accepted(&command.command_id);
                info!(
                    "Command {} dispatched: {:?}",
                    command.command_id, transition.result
                );
                transition
            }
            SendStatus::InvalidParameters => {
                warn!("Command {} has invalid parameters, rejecting", command.command_id);
                registry.on_rejected(&command.command_id)
            }
            SendStatus::Error | SendStatus::Timeout => {
                warn!(
                    "Command {} undelivered after {} attempts ({}), awaiting timeout",
                    command.command_id, self.retry.max_attempts, status
                );
                received
            }
        }
    }

    /// Dispatch with bounded retry; stops on success or invalid parameters
    ///
    /// Also stops once actuator feedback has moved the record out of
    /// RECEIVED during a backoff, since the earlier write evidently landed.
    async fn dispatch_with_retry(&self, handler: &dyn CommandHandler, command: &Command) -> SendStatus {
        let mut status = SendStatus::Error;

        for attempt in 1..=self.retry.max_attempts {
            let delay = self.retry.backoff(attempt);
            if !delay.is_zero() {
                debug!(
                    "Retrying {} in {:?} (attempt {}/{})",
                    command.command_id, delay, attempt, self.retry.max_attempts
                );
                tokio::time::sleep(delay).await;

                let current = self
                    .registry
                    .lock()
                    .await
                    .get(&command.command_id)
                    .map(|r| r.status);
                if current != Some(CommandStatus::Received) {
                    info!(
                        "Command {} settled by actuator feedback ({:?}), retry skipped",
                        command.command_id, current
                    );
                    return SendStatus::Ok;
                }
            }

            status = handler.dispatch(command).await;
            debug!(
                "Dispatch attempt {}/{} for {}: {}",
                attempt, self.retry.max_attempts, command.command_id, status
            );

            if !status.is_retriable() {
                break;
            }
        }

        status
    }

    /// Apply an actuator acknowledgement
    ///
    /// Any ack proves delivery, so a RECEIVED record is accepted first. Only
    /// an ack carrying an error yields a transition.
    pub async fn on_ack(&self, ack: &AckSnapshot) -> Option<Transition> {
        let mut registry = self.registry.lock().await;
        mark_delivered(&mut registry, &ack.token);

        if !ack.is_error() {
            debug!("ACK for {} ({}): ok", ack.token, ack.command);
            return None;
        }

        warn!(
            "ACK error {} for {} ({}): {}",
            ack.error, ack.token, ack.command, ack.message
        );
        let transition = registry.on_failed(&ack.token);
        log_feedback(&ack.token, &transition);
        Some(transition)
    }

    /// Apply an execution result reported by the actuator
    ///
    /// A record still RECEIVED is accepted first: the dispatch that reported
    /// a failure did reach the actuator.
    pub async fn on_exec(&self, exec: &ExecSnapshot) -> Transition {
        let mut registry = self.registry.lock().await;
        mark_delivered(&mut registry, &exec.token);
        let transition = if exec.succeeded() {
            info!("Command {} ({}) executed", exec.token, exec.command);
            registry.on_executed(&exec.token)
        } else {
            warn!(
                "Command {} ({}) failed with error {}: {}",
                exec.token, exec.command, exec.error, exec.message
            );
            registry.on_failed(&exec.token)
        };
        log_feedback(&exec.token, &transition);
        transition
    }
}

fn mark_delivered(registry: &mut CommandRegistry, command_id: &str) {
    if registry.get(command_id).map(|r| r.status) == Some(CommandStatus::Received) {
        registry.on_accepted(command_id);
        debug!("Feedback for {} implies delivery, marked accepted", command_id);
    }
}

fn log_feedback(token: &str, transition: &Transition) {
    if !transition.is_ok() {
        debug!(
            "Feedback for {} did not change the record: {:?}",
            token, transition.result
        );
    }
}
