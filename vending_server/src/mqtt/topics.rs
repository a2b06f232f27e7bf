use std::{fmt::Display, str::FromStr};

pub const TOPIC_ROOT: &str = "vm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Command,
    DispenseResult,
    Telemetry,
    Status,
}

impl TopicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::DispenseResult => "dispense_result",
            Self::Telemetry => "telemetry",
            Self::Status => "status",
        }
    }
}

impl Display for TopicKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopicKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "command" => Ok(Self::Command),
            "dispense_result" => Ok(Self::DispenseResult),
            "telemetry" => Ok(Self::Telemetry),
            "status" => Ok(Self::Status),
            _ => Err(format!("Unknown topic kind: {s}")),
        }
    }
}

/// A parsed `vm/<machine>/<kind>` topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmTopic {
    pub machine_id: String,
    pub kind: TopicKind,
}

impl VmTopic {
    pub fn new<S: Into<String>>(machine_id: S, kind: TopicKind) -> Self {
        Self { machine_id: machine_id.into(), kind }
    }
}

impl Display for VmTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{TOPIC_ROOT}/{}/{}", self.machine_id, self.kind)
    }
}

impl FromStr for VmTopic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s.split('/').collect::<Vec<_>>();
        match parts.as_slice() {
            [root, machine_id, kind] if *root == TOPIC_ROOT && !machine_id.is_empty() => {
                Ok(Self { machine_id: machine_id.to_string(), kind: kind.parse()? })
            },
            _ => Err(format!("{s} is not a vending machine topic")),
        }
    }
}

pub fn command_topic(machine_id: &str) -> String {
    VmTopic::new(machine_id, TopicKind::Command).to_string()
}

/// The inbound topics of a machine.
pub fn subscription_topics(machine_id: &str) -> Vec<String> {
    [TopicKind::DispenseResult, TopicKind::Telemetry, TopicKind::Status]
        .into_iter()
        .map(|kind| VmTopic::new(machine_id, kind).to_string())
        .collect()
}
