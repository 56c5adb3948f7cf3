// ABOUTME: Error taxonomy reported by the pod hardware layer and its recoverability classification.
// ABOUTME: Composes the user-facing message shown while an error is the latest one.

use thiserror::Error;

/// Failures the pod hardware layer can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PodError {
    /// The pod reported an unrecoverable fault condition.
    #[error("Pod fault: {0}")]
    DeviceFault(String),

    #[error("Communication with the pod failed: {0}")]
    CommunicationFailure(String),

    #[error("Timed out waiting for the pod")]
    Timeout,

    #[error("Pairing was cancelled")]
    Cancelled,

    #[error("Unexpected pod error: {0}")]
    Unknown(String),
}

/// What the state machine should do with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Return to `Initial`; the user may retry pairing.
    Recoverable,
    /// The pod is physically faulted and must be replaced.
    UnrecoverableFault,
}

/// Map an error to its disposition. Only a device fault is unrecoverable.
pub fn classify(error: &PodError) -> Disposition {
    match error {
        PodError::DeviceFault(_) => Disposition::UnrecoverableFault,
        PodError::CommunicationFailure(_)
        | PodError::Timeout
        | PodError::Cancelled
        | PodError::Unknown(_) => Disposition::Recoverable,
    }
}

impl PodError {
    fn failure_reason(&self) -> Option<&'static str> {
        match self {
            PodError::DeviceFault(_) => Some("The pod cannot be used"),
            PodError::CommunicationFailure(_) | PodError::Timeout => {
                Some("The pod did not respond")
            }
            PodError::Cancelled | PodError::Unknown(_) => None,
        }
    }

    fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            PodError::DeviceFault(_) => Some("Deactivate the pod and start with a new one"),
            PodError::CommunicationFailure(_) | PodError::Timeout => {
                Some("Move the pod closer to the device and try again")
            }
            PodError::Cancelled | PodError::Unknown(_) => Some("Try again"),
        }
    }

    /// Message shown to the user: description, reason and suggestion joined
    /// into sentences.
    pub fn display_message(&self) -> String {
        let description = self.to_string();
        let parts: Vec<&str> = [
            Some(description.as_str()),
            self.failure_reason(),
            self.recovery_suggestion(),
        ]
        .into_iter()
        .flatten()
        .map(|part| part.trim().trim_end_matches('.'))
        .filter(|part| !part.is_empty())
        .collect();

        format!("{}.", parts.join(". "))
    }
}
