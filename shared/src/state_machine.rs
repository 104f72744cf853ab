//! Command Lifecycle State Machine
//!
//! Tracks every command from receipt to a terminal status:
//! ```text
//! RECEIVED ──> ACCEPTED ──> EXECUTED
//!    │            │
//!    ├──> REJECTED└──> FAILED
//!    └──────┴──> TIMEOUT (sweep only)
//! ```
//! Transitions never fail with an error; every call reports a typed
//! [`TransitionResult`] and the record as it stands afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::{timing, Command, CommandStatus};

/// Outcome of a registry transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// The record changed as requested
    Ok,
    /// The record is already in the requested status
    Duplicate,
    /// No record exists for the command id
    UnknownCommand,
    /// The record is in a status the transition cannot start from
    InvalidState,
    /// The record is terminal and can no longer change
    Terminal,
}

/// Lifecycle record of one command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRecord {
    pub command: Command,
    pub status: CommandStatus,
    pub received_at_ms: u64,
    pub accepted_at_ms: Option<u64>,
    pub executed_at_ms: Option<u64>,
    pub rejected_at_ms: Option<u64>,
    pub timeout_at_ms: Option<u64>,
    pub failed_at_ms: Option<u64>,
}

impl CommandRecord {
    fn new(command: Command, received_at_ms: u64) -> Self {
        Self {
            command,
            status: CommandStatus::Received,
            received_at_ms,
            accepted_at_ms: None,
            executed_at_ms: None,
            rejected_at_ms: None,
            timeout_at_ms: None,
            failed_at_ms: None,
        }
    }

    fn enter(&mut self, status: CommandStatus, now_ms: u64) {
        self.status = status;
        let stamp = match status {
            CommandStatus::Received => return,
            CommandStatus::Accepted => &mut self.accepted_at_ms,
            CommandStatus::Executed => &mut self.executed_at_ms,
            CommandStatus::Rejected => &mut self.rejected_at_ms,
            CommandStatus::Timeout => &mut self.timeout_at_ms,
            CommandStatus::Failed => &mut self.failed_at_ms,
        };
        *stamp = Some(now_ms);
    }
}

/// Result of a transition attempt together with the affected record
#[derive(Debug, Clone)]
pub struct Transition {
    pub result: TransitionResult,
    /// Record after the call; `None` only for [`TransitionResult::UnknownCommand`]
    pub record: Option<CommandRecord>,
    pub changed: bool,
}

impl Transition {
    fn new(result: TransitionResult, record: &CommandRecord) -> Self {
        Self {
            result,
            record: Some(record.clone()),
            changed: result == TransitionResult::Ok,
        }
    }

    fn unknown() -> Self {
        Self {
            result: TransitionResult::UnknownCommand,
            record: None,
            changed: false,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result == TransitionResult::Ok
    }

    /// Status of the record after the call, if it exists
    pub fn status(&self) -> Option<CommandStatus> {
        self.record.as_ref().map(|r| r.status)
    }
}

/// In-memory registry of command lifecycles keyed by command id
pub struct CommandRegistry {
    accept_timeout_ms: u64,
    exec_timeout_ms: u64,
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
    records: HashMap<String, CommandRecord>,
}

impl CommandRegistry {
    /// Create a registry with the default lifecycle timings
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            accept_timeout_ms: timing::ACCEPT_TIMEOUT_MS,
            exec_timeout_ms: timing::EXEC_TIMEOUT_MS,
            ttl_ms: timing::RECORD_TTL_MS,
            clock,
            records: HashMap::new(),
        }
    }

    /// Override the lifecycle timings
    pub fn with_timeouts(mut self, accept: Duration, exec: Duration, ttl: Duration) -> Self {
        self.accept_timeout_ms = accept.as_millis() as u64;
        self.exec_timeout_ms = exec.as_millis() as u64;
        self.ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn get(&self, command_id: &str) -> Option<&CommandRecord> {
        self.records.get(command_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Register a command; repeats for a known id never mutate the record
    pub fn on_received(&mut self, command: Command) -> Transition {
        if let Some(existing) = self.records.get(&command.command_id) {
            return Transition::new(TransitionResult::Duplicate, existing);
        }

        let now = self.clock.now_ms();
        let id = command.command_id.clone();
        let record = self
            .records
            .entry(id)
            .or_insert_with(|| CommandRecord::new(command, now));
        Transition::new(TransitionResult::Ok, record)
    }

    pub fn on_accepted(&mut self, command_id: &str) -> Transition {
        self.transition(command_id, CommandStatus::Received, CommandStatus::Accepted)
    }

    pub fn on_rejected(&mut self, command_id: &str) -> Transition {
        self.transition(command_id, CommandStatus::Received, CommandStatus::Rejected)
    }

    pub fn on_executed(&mut self, command_id: &str) -> Transition {
        self.transition(command_id, CommandStatus::Accepted, CommandStatus::Executed)
    }

    pub fn on_failed(&mut self, command_id: &str) -> Transition {
        self.transition(command_id, CommandStatus::Accepted, CommandStatus::Failed)
    }

    fn transition(&mut self, command_id: &str, from: CommandStatus, to: CommandStatus) -> Transition {
        let now = self.clock.now_ms();
        let Some(record) = self.records.get_mut(command_id) else {
            return Transition::unknown();
        };

        if record.status.is_terminal() {
            return Transition::new(TransitionResult::Terminal, record);
        }
        if record.status == to {
            return Transition::new(TransitionResult::Duplicate, record);
        }
        if record.status != from {
            return Transition::new(TransitionResult::InvalidState, record);
        }

        record.enter(to, now);
        Transition::new(TransitionResult::Ok, record)
    }

    /// Move stale RECEIVED and ACCEPTED records to TIMEOUT
    ///
    /// RECEIVED ages from `received_at`, ACCEPTED from `accepted_at`.
    /// Returns the number of records transitioned.
    pub fn expire_timeouts(&mut self) -> usize {
        let now = self.clock.now_ms();
        let mut expired = 0;

        for record in self.records.values_mut() {
            let stale = match record.status {
                CommandStatus::Received => {
                    now.saturating_sub(record.received_at_ms) > self.accept_timeout_ms
                }
                CommandStatus::Accepted => record
                    .accepted_at_ms
                    .map(|at| now.saturating_sub(at) > self.exec_timeout_ms)
                    .unwrap_or(false),
                _ => false,
            };

            if stale {
                record.enter(CommandStatus::Timeout, now);
                expired += 1;
            }
        }

        expired
    }

    /// Delete every record whose age reached the TTL, whatever its status
    pub fn gc_ttl(&mut self) -> usize {
        let now = self.clock.now_ms();
        let ttl = self.ttl_ms;
        let before = self.records.len();
        self.records
            .retain(|_, record| now.saturating_sub(record.received_at_ms) < ttl);
        before - self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn make_command(command_id: &str) -> Command {
        Command::new(command_id, "test").with_param("x", "s")
    }

    fn registry() -> (Arc<ManualClock>, CommandRegistry) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let registry = CommandRegistry::new(clock.clone()).with_timeouts(
            Duration::from_secs(3),
            Duration::from_secs(80),
            Duration::from_secs(600),
        );
        (clock, registry)
    }

    #[test]
    fn test_duplicate_on_received() {
        let (clock, mut registry) = registry();
        let cmd = make_command("cmd1");

        let t1 = registry.on_received(cmd.clone());
        assert_eq!(t1.result, TransitionResult::Ok);
        assert_eq!(t1.status(), Some(CommandStatus::Received));
        assert!(t1.changed);

        clock.advance_ms(500);
        let t2 = registry.on_received(cmd);
        assert_eq!(t2.result, TransitionResult::Duplicate);
        assert!(!t2.changed);
        let record = t2.record.unwrap();
        assert_eq!(record.status, CommandStatus::Received);
        assert_eq!(record.received_at_ms, 1_000_000);
    }

    #[test]
    fn test_happy_path_received_accepted_executed() {
        let (clock, mut registry) = registry();
        let cmd = make_command("cmd1");

        let t1 = registry.on_received(cmd.clone());
        assert!(t1.is_ok());
        assert_eq!(t1.record.unwrap().received_at_ms, 1_000_000);

        clock.advance_ms(10);
        let t2 = registry.on_accepted(&cmd.command_id);
        assert!(t2.changed);
        let record = t2.record.unwrap();
        assert_eq!(record.status, CommandStatus::Accepted);
        assert_eq!(record.accepted_at_ms, Some(1_000_010));

        clock.advance_ms(10);
        let t3 = registry.on_executed(&cmd.command_id);
        assert!(t3.changed);
        let record = t3.record.unwrap();
        assert_eq!(record.status, CommandStatus::Executed);
        assert_eq!(record.executed_at_ms, Some(1_000_020));
    }

    #[test]
    fn test_unknown_command() {
        let (_, mut registry) = registry();
        let t = registry.on_accepted("missing");
        assert_eq!(t.result, TransitionResult::UnknownCommand);
        assert!(t.record.is_none());
        assert!(!t.changed);
    }

    #[test]
    fn test_duplicate_and_invalid_state() {
        let (_, mut registry) = registry();
        registry.on_received(make_command("cmd1"));

        // executed requires ACCEPTED
        assert_eq!(
            registry.on_executed("cmd1").result,
            TransitionResult::InvalidState
        );
        assert_eq!(registry.on_failed("cmd1").result, TransitionResult::InvalidState);

        assert!(registry.on_accepted("cmd1").is_ok());
        let again = registry.on_accepted("cmd1");
        assert_eq!(again.result, TransitionResult::Duplicate);
        assert!(!again.changed);

        // rejected requires RECEIVED
        assert_eq!(
            registry.on_rejected("cmd1").result,
            TransitionResult::InvalidState
        );
        assert_eq!(registry.get("cmd1").unwrap().rejected_at_ms, None);
    }

    #[test]
    fn test_terminal_records_never_change() {
        let (clock, mut registry) = registry();
        registry.on_received(make_command("cmd1"));
        registry.on_accepted("cmd1");
        registry.on_executed("cmd1");
        let frozen = registry.get("cmd1").unwrap().clone();

        clock.advance_ms(1_000);
        for t in [
            registry.on_accepted("cmd1"),
            registry.on_executed("cmd1"),
            registry.on_rejected("cmd1"),
            registry.on_failed("cmd1"),
        ] {
            assert_eq!(t.result, TransitionResult::Terminal);
            assert!(!t.changed);
        }
        assert_eq!(registry.get("cmd1"), Some(&frozen));

        // a rejected record is equally frozen
        registry.on_received(make_command("cmd2"));
        assert!(registry.on_rejected("cmd2").is_ok());
        assert_eq!(registry.on_rejected("cmd2").result, TransitionResult::Terminal);
        assert_eq!(registry.on_received(make_command("cmd2")).result, TransitionResult::Duplicate);
    }

    #[test]
    fn test_expire_timeouts_selectivity() {
        let (clock, mut registry) = registry();
        registry.on_received(make_command("received"));
        registry.on_received(make_command("accepted"));
        registry.on_accepted("accepted");
        registry.on_received(make_command("executed"));
        registry.on_accepted("executed");
        registry.on_executed("executed");

        // exactly at the accept timeout nothing is stale yet
        clock.advance_ms(3_000);
        assert_eq!(registry.expire_timeouts(), 0);

        clock.advance_ms(1);
        assert_eq!(registry.expire_timeouts(), 1);
        let received = registry.get("received").unwrap();
        assert_eq!(received.status, CommandStatus::Timeout);
        assert_eq!(received.timeout_at_ms, Some(1_003_001));
        assert_eq!(registry.get("accepted").unwrap().status, CommandStatus::Accepted);

        clock.advance_ms(80_000);
        assert_eq!(registry.expire_timeouts(), 1);
        assert_eq!(registry.get("accepted").unwrap().status, CommandStatus::Timeout);

        let executed = registry.get("executed").unwrap();
        assert_eq!(executed.status, CommandStatus::Executed);
        assert_eq!(executed.timeout_at_ms, None);

        // timed out records are terminal
        assert_eq!(registry.expire_timeouts(), 0);
        assert_eq!(registry.on_accepted("received").result, TransitionResult::Terminal);
    }

    #[test]
    fn test_gc_ttl_purges_regardless_of_status() {
        let (clock, mut registry) = registry();
        registry.on_received(make_command("old-open"));
        registry.on_received(make_command("old-done"));
        registry.on_rejected("old-done");

        clock.advance_ms(300_000);
        registry.on_received(make_command("young"));

        clock.advance_ms(299_999);
        assert_eq!(registry.gc_ttl(), 0);
        assert_eq!(registry.len(), 3);

        clock.advance_ms(1);
        assert_eq!(registry.gc_ttl(), 2);
        assert!(registry.get("old-open").is_none());
        assert!(registry.get("old-done").is_none());
        assert!(registry.get("young").is_some());

        // a purged id is new again
        assert!(registry.on_received(make_command("old-open")).is_ok());
    }
}
