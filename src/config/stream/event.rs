use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::instance::InstanceStatus;

use super::line::StreamLine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Progress {
        percent: u8,
        status: String,
    },

    StatusChange {
        status: InstanceStatus,
        error: Option<String>,
    },

    Line {
        line: StreamLine,
    },
}

/// Event broadcast to observers of install tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallEvent {
    pub id: Uuid,

    pub instance: String,

    pub timestamp: DateTime<Utc>,

    pub payload: EventPayload,
}

impl InstallEvent {
    fn with_payload<S: Into<String>>(instance: S, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            instance: instance.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn progress<S: Into<String>, T: Into<String>>(instance: S, percent: u8, status: T) -> Self {
        Self::with_payload(
            instance,
            EventPayload::Progress {
                percent,
                status: status.into(),
            },
        )
    }

    pub fn status<S: Into<String>>(
        instance: S,
        status: InstanceStatus,
        error: Option<String>,
    ) -> Self {
        Self::with_payload(instance, EventPayload::StatusChange { status, error })
    }

    pub fn line<S: Into<String>>(instance: S, line: StreamLine) -> Self {
        Self::with_payload(instance, EventPayload::Line { line })
    }
}

impl Display for InstallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = format!("[{}] {}: ", self.timestamp.format("%H:%M:%S"), self.instance);
        match &self.payload {
            EventPayload::Progress { percent, status } => {
                write!(f, "{}{:>3}% {}", head, percent, status)
            }
            EventPayload::StatusChange { status, error } => match error {
                Some(err) => write!(f, "{}status -> {} ({})", head, status, err),
                None => write!(f, "{}status -> {}", head, status),
            },
            EventPayload::Line { line } => write!(f, "{}{}", head, line),
        }
    }
}
