// src/policy/rules.rs

//! Fixed deny patterns and allowed command classes

use serde::Serialize;
use strum_macros::Display;

/// Destructive operations, matched against the lowercased command
///
/// Each entry is a regex and the reason reported on a match.
pub(crate) const DENY_RULES: &[(&str, &str)] = &[
    (
        r"(^|\s)rm\s+(\S+\s+)*(-[a-z]*r[a-z]*|--recursive)(\s|$)",
        "recursive deletion",
    ),
    (r"(^|\s)(mkfs(\.\w+)?|format|wipe)(\s|$)", "filesystem formatting"),
    (r"(^|\s)dd\s+if=", "raw block device copy"),
    (
        r"(^|\s)(reboot|shutdown|poweroff|halt)(\s|$)",
        "device power control",
    ),
    (r"(^|\s)svc\s+power(\s|$)", "device power control"),
    (r"setprop\s+sys\.powerctl", "device power control"),
    // Anything able to append a second command or redirect output
    (r";|&&|\|\||\||&|`|\$\(|\n|\r|>|<", "command chaining"),
];

/// Operation classes a command may belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum CommandClass {
    /// Enable, disable, uninstall or clear a package
    PackageState,
    ForceStop,
    AppOpsSet,
    AppOpsGet,
    /// Read-only package, property or service queries
    Query,
}

impl CommandClass {
    /// Whether commands of this class change device state
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            CommandClass::PackageState | CommandClass::ForceStop | CommandClass::AppOpsSet
        )
    }
}

/// Allowed token prefixes, matched against the lowercased command
pub(crate) const ALLOW_PREFIXES: &[(&[&str], CommandClass)] = &[
    (&["pm", "disable-user"], CommandClass::PackageState),
    (&["pm", "disable"], CommandClass::PackageState),
    (&["pm", "enable"], CommandClass::PackageState),
    (&["pm", "uninstall"], CommandClass::PackageState),
    (&["pm", "clear"], CommandClass::PackageState),
    (&["am", "force-stop"], CommandClass::ForceStop),
    (&["appops", "set"], CommandClass::AppOpsSet),
    (&["appops", "get"], CommandClass::AppOpsGet),
    (&["pm", "list"], CommandClass::Query),
    (&["pm", "path"], CommandClass::Query),
    (&["dumpsys"], CommandClass::Query),
    (&["getprop"], CommandClass::Query),
    (&["id"], CommandClass::Query),
];

/// Classify a command by its leading tokens
///
/// Returns the class and the number of tokens the prefix consumed.
pub(crate) fn classify(tokens: &[&str]) -> Option<(CommandClass, usize)> {
    ALLOW_PREFIXES
        .iter()
        .find(|(prefix, _)| {
            tokens.len() >= prefix.len()
                && prefix
                    .iter()
                    .zip(tokens)
                    .all(|(expected, token)| expected.eq_ignore_ascii_case(token))
        })
        .map(|(prefix, class)| (*class, prefix.len()))
}

/// Whether a quote or escape is left open at the end of `command`
///
/// Follows shell quoting: a backslash escapes the next character outside
/// quotes and inside double quotes, and is literal inside single quotes.
pub(crate) fn has_open_quoting(command: &str) -> bool {
    let mut single = false;
    let mut double = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' if !single => {
                if chars.next().is_none() {
                    return true;
                }
            }
            '\'' if !double => single = !single,
            '"' if !single => double = !double,
            _ => {}
        }
    }
    single || double
}
