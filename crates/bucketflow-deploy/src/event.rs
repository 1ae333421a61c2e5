//! Deployment events and their NDJSON wire form
//!
//! ```text
//! { "message": string, "level": "info"|"warn"|"error"|"success"|"command",
//!   "status"?: "ok"|"error", "type"?: "log"|"result"|"error-intelligence",
//!   "title"?: string, "suggestion"?: string, "command"?: string }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Info,
    Warn,
    Error,
    Success,
    Command,
}

impl Level {
    /// Lenient parse; unknown names yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "info" | "debug" | "trace" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" | "fatal" => Some(Level::Error),
            "success" => Some(Level::Success),
            "command" => Some(Level::Command),
            _ => None,
        }
    }
}

/// Outcome carried by a terminal result line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    Log,
    Result,
    ErrorIntelligence,
}

/// A suggested remediation command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixCommand {
    pub command: String,
    pub description: String,
}

/// One line of the streaming protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployEvent {
    pub message: String,

    #[serde(default)]
    pub level: Level,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResultStatus>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Error-intelligence payload
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fix_commands: Vec<FixCommand>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tips: Vec<String>,
}

impl DeployEvent {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            status: None,
            event_type: None,
            title: None,
            suggestion: None,
            command: None,
            fix_commands: Vec::new(),
            tips: Vec::new(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Level::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(Level::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Level::Error, message)
    }

    /// Echo of the command line about to run
    pub fn command_line(command: impl Into<String>) -> Self {
        let command = command.into();
        let mut event = Self::new(Level::Command, format!("$ {}", command));
        event.command = Some(command);
        event
    }

    /// Terminal result line
    pub fn result(status: ResultStatus, message: impl Into<String>) -> Self {
        let level = match status {
            ResultStatus::Ok => Level::Success,
            ResultStatus::Error => Level::Error,
        };
        let mut event = Self::new(level, message);
        event.status = Some(status);
        event.event_type = Some(EventType::Result);
        event
    }

    /// Parse one output line. JSON objects are read field by field; anything
    /// else becomes an info event carrying the raw text.
    pub fn from_line(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.starts_with('{') {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
                return Self::from_object(&map, line);
            }
        }
        Self::info(line)
    }

    fn from_object(map: &serde_json::Map<String, Value>, raw: &str) -> Self {
        let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);

        let message = text("message").or_else(|| text("label")).unwrap_or_else(|| raw.to_string());
        let level = text("level").and_then(|l| Level::parse(&l)).unwrap_or_default();
        let status = match text("status").as_deref() {
            Some("ok") | Some("success") => Some(ResultStatus::Ok),
            Some("error") | Some("failed") => Some(ResultStatus::Error),
            _ => None,
        };
        let event_type = match text("type").as_deref() {
            Some("log") => Some(EventType::Log),
            Some("result") => Some(EventType::Result),
            Some("error-intelligence") => Some(EventType::ErrorIntelligence),
            _ => None,
        };
        let fix_commands = map
            .get("fixCommands")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let tips = map
            .get("tips")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        Self {
            message,
            level,
            status,
            event_type,
            title: text("title"),
            suggestion: text("suggestion"),
            command: text("command"),
            fix_commands,
            tips,
        }
    }

    /// A `result` line reporting failure fails the whole run
    pub fn is_failed_result(&self) -> bool {
        self.event_type == Some(EventType::Result) && self.status == Some(ResultStatus::Error)
    }

    pub fn is_result(&self) -> bool {
        self.event_type == Some(EventType::Result)
    }

    /// Wire encoding, without the trailing newline
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
