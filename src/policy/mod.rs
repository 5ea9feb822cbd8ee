// src/policy/mod.rs

//! Command policy validation
//!
//! Every command passes this gate before it reaches any transport, whichever
//! transport is active. Checks run in order:
//!
//! 1. Deny scan: the lowercased command must match none of the destructive
//!    patterns. A deny match wins over any allow match.
//! 2. Allow prefix: the leading tokens must name an allowed operation class.
//!    Anything else is rejected (default deny).
//! 3. Protected target: a package-targeted command must not address a
//!    package the protected classifier reports. The package named in the
//!    arguments is always checked; a declared target must be protected-free
//!    too and must name the same package.

mod rules;

pub use rules::CommandClass;

use crate::command::CommandRequest;
use crate::config::ProtectedConfig;
use crate::error::{Error, Result};
use glob::Pattern;
use regex::RegexSet;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Decides whether a package must never be mutated
///
/// The classification data lives outside this crate; the validator only
/// consumes the verdict.
pub trait ProtectedClassifier: Send + Sync {
    fn is_protected(&self, package: &str) -> bool;
}

impl<F> ProtectedClassifier for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_protected(&self, package: &str) -> bool {
        self(package)
    }
}

/// Protected packages from configuration: exact names plus glob patterns
#[derive(Debug, Clone, Default)]
pub struct ProtectedList {
    packages: HashSet<String>,
    patterns: Vec<Pattern>,
}

impl ProtectedList {
    pub fn new<S: AsRef<str>>(packages: &[S], patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p.as_ref()).map_err(|e| {
                    Error::Config(format!("invalid protected pattern '{}': {}", p.as_ref(), e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            packages: packages.iter().map(|p| p.as_ref().to_string()).collect(),
            patterns,
        })
    }

    pub fn from_config(config: &ProtectedConfig) -> Result<Self> {
        Self::new(&config.packages, &config.patterns)
    }
}

impl ProtectedClassifier for ProtectedList {
    fn is_protected(&self, package: &str) -> bool {
        self.packages.contains(package) || self.patterns.iter().any(|p| p.matches(package))
    }
}

/// Outcome of validating one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed(CommandClass),
    /// Matched a destructive pattern
    Denied(&'static str),
    /// No allowed operation class matched
    NotAllowed,
    /// Addresses a protected package
    Protected(String),
    /// The declared target differs from the package in the arguments
    TargetMismatch { declared: String, named: String },
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed(_))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allowed(class) => write!(f, "allowed ({})", class),
            Verdict::Denied(reason) => write!(f, "denied: {}", reason),
            Verdict::NotAllowed => write!(f, "denied: not an allowed operation"),
            Verdict::Protected(pkg) => write!(f, "denied: {} is a protected package", pkg),
            Verdict::TargetMismatch { declared, named } => write!(
                f,
                "denied: declared target {} but the command names {}",
                declared, named
            ),
        }
    }
}

/// The allow/deny/protected-target gate
pub struct PolicyValidator {
    deny: RegexSet,
    protected: Arc<dyn ProtectedClassifier>,
}

impl PolicyValidator {
    pub fn new(protected: Arc<dyn ProtectedClassifier>) -> Result<Self> {
        let deny = RegexSet::new(rules::DENY_RULES.iter().map(|(pattern, _)| *pattern))
            .map_err(|e| Error::Config(format!("invalid deny pattern: {}", e)))?;
        Ok(Self { deny, protected })
    }

    /// Validator using the protected list from configuration
    pub fn from_config(config: &ProtectedConfig) -> Result<Self> {
        Self::new(Arc::new(ProtectedList::from_config(config)?))
    }

    pub fn evaluate(&self, request: &CommandRequest) -> Verdict {
        let lowered = request.command().to_lowercase();

        if let Some(index) = self.deny.matches(&lowered).iter().next() {
            return Verdict::Denied(rules::DENY_RULES[index].1);
        }
        if rules::has_open_quoting(request.command()) {
            return Verdict::Denied("unterminated quote or escape");
        }

        let tokens: Vec<&str> = request.command().split_whitespace().collect();
        let Some((class, consumed)) = rules::classify(&tokens) else {
            return Verdict::NotAllowed;
        };

        let named = infer_target(&tokens[consumed..]);

        if let Some(declared) = request.target() {
            if self.protected.is_protected(declared) {
                return Verdict::Protected(declared.to_string());
            }
            if let Some(named) = named
                && named != declared
            {
                return Verdict::TargetMismatch {
                    declared: declared.to_string(),
                    named: named.to_string(),
                };
            }
        }

        // Read-only queries may look at protected packages
        if class.is_mutating()
            && let Some(package) = named
            && self.protected.is_protected(package)
        {
            return Verdict::Protected(package.to_string());
        }

        Verdict::Allowed(class)
    }

    /// Validate, mapping any rejection to `PolicyRejected`
    pub fn check(&self, request: &CommandRequest) -> Result<CommandClass> {
        match self.evaluate(request) {
            Verdict::Allowed(class) => Ok(class),
            verdict => {
                warn!("Policy rejected '{}': {}", request, verdict);
                Err(Error::PolicyRejected(format!("'{}' {}", request, verdict)))
            }
        }
    }

    pub fn accepts(&self, request: &CommandRequest) -> bool {
        self.evaluate(request).is_allowed()
    }

    /// Whether `package` is protected
    pub fn is_protected(&self, package: &str) -> bool {
        self.protected.is_protected(package)
    }
}

/// First non-flag argument that looks like a package name
fn infer_target<'a>(args: &[&'a str]) -> Option<&'a str> {
    args.iter()
        .copied()
        .find(|arg| !arg.starts_with('-') && arg.contains('.'))
}
