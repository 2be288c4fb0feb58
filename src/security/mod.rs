//! Collaborator seam for shell-command validation.
//!
//! The allow-list validator itself lives outside this crate; the shell
//! executor only promises to consult whatever gate it is handed, to never
//! run a rejected command, and to surface rejection as a structured
//! `{error, blocked: true}` result.

/// Verdict of a command gate for one full command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    /// Rejected, with the validator's reason.
    Block(String),
}

/// A shell-command validator consulted before any process is spawned.
pub trait CommandGate: Send + Sync {
    fn evaluate(&self, command: &str) -> GateDecision;
}

/// Gate that allows everything. The default gate when no security profile
/// is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveGate;

impl CommandGate for PermissiveGate {
    fn evaluate(&self, _command: &str) -> GateDecision {
        GateDecision::Allow
    }
}
