// src/batch/action.rs

//! Logical actions and the commands they expand to

use crate::command::{self, CommandRequest, OP_RUN_ANY_IN_BACKGROUND, OP_RUN_IN_BACKGROUND, OP_WAKE_LOCK};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// One logical action applied to every target of a batch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ActionKind {
    Freeze,
    Unfreeze,
    ForceStop,
    RestrictBackground,
    AllowBackground,
    ClearCache,
    ClearData,
    Uninstall,
    /// Replay of the retained snapshot; only recorded in the log
    Rollback,
}

impl ActionKind {
    /// Whether a snapshot is captured before the batch runs
    pub fn is_reversible(&self) -> bool {
        matches!(
            self,
            ActionKind::Freeze
                | ActionKind::Unfreeze
                | ActionKind::RestrictBackground
                | ActionKind::AllowBackground
        )
    }

    /// Concrete commands for one target, in submission order
    pub fn commands(&self, package: &str, user: u32) -> Vec<CommandRequest> {
        match self {
            ActionKind::Freeze => vec![command::disable_user(package, user)],
            ActionKind::Unfreeze => vec![command::enable(package)],
            ActionKind::ForceStop => vec![command::force_stop(package)],
            ActionKind::RestrictBackground => background_commands(package, "ignore"),
            ActionKind::AllowBackground => background_commands(package, "allow"),
            ActionKind::ClearCache => vec![command::clear_cache(package)],
            ActionKind::ClearData => vec![command::clear_data(package)],
            ActionKind::Uninstall => vec![command::uninstall_keep_data(package, user)],
            // Rollback commands come from the snapshot, not the action
            ActionKind::Rollback => Vec::new(),
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            ActionKind::Freeze => "frozen",
            ActionKind::Unfreeze => "unfrozen",
            ActionKind::ForceStop => "force-stopped",
            ActionKind::RestrictBackground => "restricted",
            ActionKind::AllowBackground => "allowed in background",
            ActionKind::ClearCache => "cache cleared",
            ActionKind::ClearData => "data cleared",
            ActionKind::Uninstall => "uninstalled",
            ActionKind::Rollback => "rolled back",
        }
    }
}

fn background_commands(package: &str, mode: &str) -> Vec<CommandRequest> {
    vec![
        command::appops_set(package, OP_RUN_IN_BACKGROUND, mode),
        command::appops_set(package, OP_RUN_ANY_IN_BACKGROUND, mode),
        command::appops_set(package, OP_WAKE_LOCK, mode),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    fn strings(kind: ActionKind) -> Vec<String> {
        kind.commands("com.example.app", 0)
            .into_iter()
            .map(|c| c.command().to_string())
            .collect()
    }

    #[test]
    fn test_command_table() {
        assert_eq!(strings(ActionKind::Freeze), vec!["pm disable-user --user 0 com.example.app"]);
        assert_eq!(strings(ActionKind::Unfreeze), vec!["pm enable com.example.app"]);
        assert_eq!(
            strings(ActionKind::Uninstall),
            vec!["pm uninstall -k --user 0 com.example.app"]
        );
        assert_eq!(strings(ActionKind::ForceStop), vec!["am force-stop com.example.app"]);
        assert_eq!(
            strings(ActionKind::ClearCache),
            vec!["pm clear --cache-only com.example.app"]
        );
        assert_eq!(strings(ActionKind::ClearData), vec!["pm clear com.example.app"]);
        assert_eq!(
            strings(ActionKind::RestrictBackground),
            vec![
                "appops set com.example.app RUN_IN_BACKGROUND ignore",
                "appops set com.example.app RUN_ANY_IN_BACKGROUND ignore",
                "appops set com.example.app WAKE_LOCK ignore",
            ]
        );
        assert_eq!(
            strings(ActionKind::AllowBackground),
            vec![
                "appops set com.example.app RUN_IN_BACKGROUND allow",
                "appops set com.example.app RUN_ANY_IN_BACKGROUND allow",
                "appops set com.example.app WAKE_LOCK allow",
            ]
        );
    }

    #[test]
    fn test_commands_carry_target() {
        for kind in ActionKind::iter().filter(|k| *k != ActionKind::Rollback) {
            for request in kind.commands("com.x", 0) {
                assert_eq!(request.target(), Some("com.x"));
            }
        }
    }

    #[test]
    fn test_reversible_classes() {
        assert!(ActionKind::Freeze.is_reversible());
        assert!(ActionKind::AllowBackground.is_reversible());
        assert!(!ActionKind::ForceStop.is_reversible());
        assert!(!ActionKind::Uninstall.is_reversible());
        assert!(!ActionKind::Rollback.is_reversible());
    }

    #[test]
    fn test_string_round_trip() {
        assert_eq!(ActionKind::RestrictBackground.to_string(), "restrict-background");
        assert_eq!(ActionKind::from_str("clear-cache").unwrap(), ActionKind::ClearCache);
    }
}
