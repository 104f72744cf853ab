//! Decoded acknowledgement and execution records

use crate::codec::{DecodeError, DecodedFrame};

/// A snapshot built from one decoded handshake frame
pub trait FrameSnapshot: Sized + Send + 'static {
    /// Human-readable frame kind for logs
    const KIND: &'static str;

    fn from_frame(frame: &DecodedFrame) -> Result<Self, DecodeError>;

    /// Handshake flag; nonzero means an event is pending
    fn trigger(&self) -> i32;

    fn token(&self) -> &str;

    fn command(&self) -> &str;

    /// Trim surrounding whitespace from the token
    fn trim_token(&mut self);
}

macro_rules! status_snapshot {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub trigger: i32,
            pub command: String,
            pub error: i32,
            pub message: String,
            pub token: String,
            pub mission_id: i32,
        }

        impl FrameSnapshot for $name {
            const KIND: &'static str = $kind;

            fn from_frame(frame: &DecodedFrame) -> Result<Self, DecodeError> {
                Ok(Self {
                    trigger: frame.int("trigger")?,
                    command: frame.text("command")?.trim().to_string(),
                    error: frame.int("error")?,
                    message: frame.text("message")?.trim().to_string(),
                    token: frame.text("token")?.trim().to_string(),
                    mission_id: frame.int("mission_id")?,
                })
            }

            fn trigger(&self) -> i32 {
                self.trigger
            }

            fn token(&self) -> &str {
                &self.token
            }

            fn command(&self) -> &str {
                &self.command
            }

            fn trim_token(&mut self) {
                let trimmed = self.token.trim();
                if trimmed.len() != self.token.len() {
                    self.token = trimmed.to_string();
                }
            }
        }
    };
}

status_snapshot!(
    /// Acknowledgement written by the actuator after it picked up a command
    AckSnapshot,
    "ack"
);

status_snapshot!(
    /// Execution result written by the actuator once a command has run
    ExecSnapshot,
    "exec"
);

impl AckSnapshot {
    /// Nonzero error means the actuator refused the command
    pub fn is_error(&self) -> bool {
        self.error != 0
    }
}

impl ExecSnapshot {
    pub fn succeeded(&self) -> bool {
        self.error == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use crate::frame::layouts;

    #[test]
    fn test_exec_snapshot_from_frame() {
        let spec = layouts::exec_frame(3).unwrap();
        let mut buf = vec![0u8; layouts::STATUS_FRAME_LEN];
        buf[0..2].copy_from_slice(&2i16.to_be_bytes());
        buf[208] = 40;
        buf[209] = 5;
        buf[210..215].copy_from_slice(b" t-1 ");

        let exec: ExecSnapshot = decode(&buf, &spec).unwrap();
        assert_eq!(exec.trigger(), 2);
        assert_eq!(exec.token(), "t-1");
        assert_eq!(exec.command(), "");
        assert!(exec.succeeded());
    }

    #[test]
    fn test_missing_field_fails_snapshot() {
        let frame = DecodedFrame::default();
        assert_eq!(
            AckSnapshot::from_frame(&frame).unwrap_err(),
            DecodeError::MissingField("trigger".into())
        );
    }

    #[test]
    fn test_trim_token() {
        let mut ack = AckSnapshot {
            trigger: 1,
            command: "start_cycle".into(),
            error: 0,
            message: String::new(),
            token: "  abc\t".into(),
            mission_id: 0,
        };
        ack.trim_token();
        assert_eq!(ack.token, "abc");
        assert!(!ack.is_error());
    }
}
