use crate::event::DeployEvent;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("invalid deploy request: {0}")]
    InvalidRequest(String),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Output could not be read to the end. `captured` holds every event
    /// decoded before the failure.
    #[error("output stream broke after {} event(s): {source}", .captured.len())]
    StreamBroken {
        #[source]
        source: std::io::Error,
        captured: Vec<DeployEvent>,
    },
}

impl DeployError {
    /// Message with a remediation hint, for display
    pub fn user_message(&self) -> String {
        match self {
            DeployError::Spawn { program, source }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                format!(
                    "{} was not found on PATH.\n\
                     \n\
                     Install the AWS CDK CLI:\n\
                     1. npm install -g aws-cdk\n\
                     2. or set cdk.command in bucketflow.yaml (e.g. \"npx cdk\")",
                    program
                )
            }
            DeployError::InvalidRequest(msg) => {
                format!(
                    "Invalid deploy request: {}\n\
                     \n\
                     deploy needs both a bucket name and a region.",
                    msg
                )
            }
            _ => format!("{}", self),
        }
    }

    /// Events decoded before the failure, if any
    pub fn captured(&self) -> &[DeployEvent] {
        match self {
            DeployError::StreamBroken { captured, .. } => captured,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
