//! Access flags and the access decision for config entries

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bit set of access flags on one config entry.
///
/// Flags are registration-time metadata; they are not written to the module
/// documents.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConfigFlags(u8);

impl ConfigFlags {
    pub const NONE: ConfigFlags = ConfigFlags(0);
    /// Other modules may read and write the entry
    pub const GLOBAL: ConfigFlags = ConfigFlags(1);
    /// Writes from other modules (except core) fail with an error; hidden
    /// from unprivileged listings
    pub const PROTECTED: ConfigFlags = ConfigFlags(1 << 1);
    /// Writes from other modules are ignored
    pub const LOCKED: ConfigFlags = ConfigFlags(1 << 2);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: ConfigFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_global(self) -> bool {
        self.contains(Self::GLOBAL)
    }

    pub const fn is_protected(self) -> bool {
        self.contains(Self::PROTECTED)
    }

    pub const fn is_locked(self) -> bool {
        self.contains(Self::LOCKED)
    }
}

impl BitOr for ConfigFlags {
    type Output = ConfigFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        ConfigFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ConfigFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ConfigFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigFlags({})", self)
    }
}

impl fmt::Display for ConfigFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::GLOBAL, "Global"),
            (Self::PROTECTED, "Protected"),
            (Self::LOCKED, "Locked"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();

        if names.is_empty() {
            f.write_str("None")
        } else {
            f.write_str(&names.join(" | "))
        }
    }
}

/// What the caller wants to do with an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

/// Why an access was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    NotGlobalCrossModule,
    Protected,
    Locked,
    TypeMismatch,
    NotFound,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DenyReason::NotGlobalCrossModule => "entry is not global and belongs to another module",
            DenyReason::Protected => "entry is protected",
            DenyReason::Locked => "entry is locked",
            DenyReason::TypeMismatch => "value type does not match the entry type",
            DenyReason::NotFound => "entry not found",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Denied(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, AccessDecision::Allowed)
    }
}

/// Decides whether `caller` may perform `operation` on an entry owned by
/// `owner` carrying `flags`.
///
/// The owning module may always read and write. For other callers a
/// protected entry refuses writes from everyone except `core_module`, a
/// non-global entry refuses everything, and a locked entry refuses writes.
pub fn check_access(
    owner: &str,
    flags: ConfigFlags,
    caller: &str,
    operation: Operation,
    core_module: &str,
) -> AccessDecision {
    if caller == owner {
        return AccessDecision::Allowed;
    }

    if operation == Operation::Write && flags.is_protected() && caller != core_module {
        return AccessDecision::Denied(DenyReason::Protected);
    }
    if !flags.is_global() {
        return AccessDecision::Denied(DenyReason::NotGlobalCrossModule);
    }
    if operation == Operation::Write && flags.is_locked() {
        return AccessDecision::Denied(DenyReason::Locked);
    }
    AccessDecision::Allowed
}
