use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Routing,
    Progress,
    Decision,
    Error,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Routing => "routing",
            Self::Progress => "progress",
            Self::Decision => "decision",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    uid: String,
    timestamp: String,
    owner: String,
    kind: EventKind,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Map<String, Value>>,
}

impl TraceEvent {
    pub fn new(
        uid: impl Into<String>,
        timestamp: impl Into<String>,
        owner: impl Into<String>,
        kind: EventKind,
        message: impl Into<String>,
        phase: Option<String>,
        data: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            uid: uid.into(),
            timestamp: timestamp.into(),
            owner: owner.into(),
            kind,
            message: message.into(),
            phase,
            data,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn phase(&self) -> Option<&str> {
        self.phase.as_deref()
    }

    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref()
    }
}
