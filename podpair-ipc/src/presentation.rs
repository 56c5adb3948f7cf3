// ABOUTME: Pure projection from pairing phase and last error to what the setup screen shows.
// ABOUTME: Clients render this directly; it carries no widget or localization logic.

use serde::{Deserialize, Serialize};

use crate::PairingPhase;

pub const PAIRING_TEXT: &str = "Pairing...";
pub const PRIMING_TEXT: &str = "Priming...";
pub const PRIMED_TEXT: &str = "Primed";

/// Progress indicator shown above the primary button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ActivityIndicator {
    Hidden,
    Loading,
    /// Fills up until the given unix time (seconds).
    TimedProgress { finishes_at: u64 },
    Completed,
}

/// What the primary button does in the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrimaryAction {
    Pair,
    Deactivate,
    Continue,
}

impl PrimaryAction {
    pub fn title(self) -> &'static str {
        match self {
            PrimaryAction::Pair => "Pair",
            PrimaryAction::Deactivate => "Deactivate",
            PrimaryAction::Continue => "Continue",
        }
    }
}

/// Confirmation shown before a pod with an identity is shut down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivationPrompt {
    pub message: String,
    pub confirm_title: String,
    pub dismiss_title: String,
}

impl Default for DeactivationPrompt {
    fn default() -> Self {
        Self {
            message: "Are you sure you want to shutdown this pod?".to_string(),
            confirm_title: "Deactivate Pod".to_string(),
            dismiss_title: "Continue".to_string(),
        }
    }
}

/// Everything the setup screen needs to render one pairing snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presentation {
    pub indicator: ActivityIndicator,
    pub primary_action: PrimaryAction,
    pub primary_enabled: bool,
    pub loading_text: Option<String>,
    pub interactions_disabled: bool,
    pub prompt: Option<DeactivationPrompt>,
}

/// Derive the screen from a snapshot. `priming_finishes_at` is unix seconds
/// and only consulted while priming.
pub fn project(
    phase: PairingPhase,
    priming_finishes_at: u64,
    last_error: Option<&str>,
    awaiting_confirmation: bool,
) -> Presentation {
    let error_text = last_error.filter(|e| !e.is_empty()).map(str::to_string);

    let (indicator, primary_action, primary_enabled, loading_text) = match phase {
        PairingPhase::Initial => (ActivityIndicator::Hidden, PrimaryAction::Pair, true, error_text),
        PairingPhase::Pairing => (
            ActivityIndicator::Loading,
            PrimaryAction::Pair,
            false,
            Some(PAIRING_TEXT.to_string()),
        ),
        PairingPhase::Priming => (
            ActivityIndicator::TimedProgress {
                finishes_at: priming_finishes_at,
            },
            PrimaryAction::Pair,
            false,
            Some(PRIMING_TEXT.to_string()),
        ),
        PairingPhase::Fault => (
            ActivityIndicator::Hidden,
            PrimaryAction::Deactivate,
            true,
            error_text,
        ),
        PairingPhase::Ready => (
            ActivityIndicator::Completed,
            PrimaryAction::Continue,
            true,
            Some(PRIMED_TEXT.to_string()),
        ),
    };

    Presentation {
        indicator,
        primary_action,
        primary_enabled,
        loading_text,
        interactions_disabled: matches!(phase, PairingPhase::Pairing | PairingPhase::Priming),
        prompt: awaiting_confirmation.then(DeactivationPrompt::default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_shows_error_and_enabled_pair_button() {
        let view = project(PairingPhase::Initial, 0, Some("Timed out. Try again."), false);
        assert_eq!(view.indicator, ActivityIndicator::Hidden);
        assert_eq!(view.primary_action, PrimaryAction::Pair);
        assert!(view.primary_enabled);
        assert_eq!(view.loading_text.as_deref(), Some("Timed out. Try again."));
        assert!(!view.interactions_disabled);
    }

    #[test]
    fn empty_error_is_not_shown() {
        let view = project(PairingPhase::Initial, 0, Some(""), false);
        assert_eq!(view.loading_text, None);
    }

    #[test]
    fn priming_disables_button_and_interactions() {
        let view = project(PairingPhase::Priming, 1_700_000_055, None, false);
        assert_eq!(
            view.indicator,
            ActivityIndicator::TimedProgress {
                finishes_at: 1_700_000_055
            }
        );
        assert!(!view.primary_enabled);
        assert!(view.interactions_disabled);
        assert_eq!(view.loading_text.as_deref(), Some(PRIMING_TEXT));
    }

    #[test]
    fn fault_offers_deactivate_instead_of_retry() {
        let view = project(PairingPhase::Fault, 0, Some("Pod fault: occlusion."), false);
        assert_eq!(view.primary_action, PrimaryAction::Deactivate);
        assert_eq!(view.primary_action.title(), "Deactivate");
        assert!(view.primary_enabled);
    }

    #[test]
    fn ready_ignores_stale_error() {
        let view = project(PairingPhase::Ready, 0, Some("old"), false);
        assert_eq!(view.indicator, ActivityIndicator::Completed);
        assert_eq!(view.primary_action, PrimaryAction::Continue);
        assert_eq!(view.loading_text.as_deref(), Some(PRIMED_TEXT));
    }

    #[test]
    fn pending_confirmation_adds_prompt() {
        let view = project(PairingPhase::Initial, 0, None, true);
        let prompt = view.prompt.expect("prompt");
        assert_eq!(prompt.message, "Are you sure you want to shutdown this pod?");
        assert_eq!(prompt.confirm_title, "Deactivate Pod");
    }

    #[test]
    fn presentation_serializes_indicator_with_kind_tag() {
        let view = project(PairingPhase::Pairing, 0, None, false);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["indicator"]["kind"], "loading");
        assert_eq!(json["primary_action"], "pair");
    }
}
