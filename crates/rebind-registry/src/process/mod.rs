//! Process identities used by the registry and its clients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DescriptorError;

/// Offset added to a plugin slot index to form its anchor identifier.
const PLUGIN_ANCHOR_BASE: i32 = 100;

/// Logical process a component is declared to run in.
///
/// Slots parse from `ui`, `persistent`, or `p<n>` and serialise back to the
/// same strings.
///
/// # Example
///
/// ```
/// use rebind_registry::ProcessSlot;
///
/// let slot: ProcessSlot = "p2".parse().expect("valid slot");
/// assert_eq!(slot, ProcessSlot::Plugin(2));
/// assert_eq!(slot.anchor_id().as_str(), "P102");
/// assert_eq!(ProcessSlot::Persistent.anchor_id().as_str(), "Guard");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProcessSlot {
    /// The process that owns the user interface.
    Ui,
    /// The long-lived host process.
    Persistent,
    /// One of the numbered plugin processes.
    Plugin(i32),
}

impl ProcessSlot {
    /// Returns the identifier under which the slot is kept alive.
    #[must_use]
    pub fn anchor_id(self) -> AnchorId {
        match self {
            Self::Ui => AnchorId::new("UI"),
            Self::Persistent => AnchorId::new("Guard"),
            Self::Plugin(index) => {
                AnchorId::new(format!("P{}", index.saturating_add(PLUGIN_ANCHOR_BASE)))
            }
        }
    }
}

impl fmt::Display for ProcessSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ui => f.write_str("ui"),
            Self::Persistent => f.write_str("persistent"),
            Self::Plugin(index) => write!(f, "p{index}"),
        }
    }
}

impl FromStr for ProcessSlot {
    type Err = DescriptorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalised = value.trim().to_ascii_lowercase();
        match normalised.as_str() {
            "ui" => Ok(Self::Ui),
            "persistent" => Ok(Self::Persistent),
            other => other
                .strip_prefix('p')
                .and_then(|digits| digits.parse::<i32>().ok())
                .filter(|index| *index >= 0)
                .map(Self::Plugin)
                .ok_or_else(|| DescriptorError::UnknownProcess {
                    value: value.to_owned(),
                }),
        }
    }
}

impl TryFrom<String> for ProcessSlot {
    type Error = DescriptorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProcessSlot> for String {
    fn from(slot: ProcessSlot) -> Self {
        slot.to_string()
    }
}

/// Identifier returned by a process anchor for a kept-alive slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(String);

impl AnchorId {
    /// Wraps an anchor identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operating-system identity of a calling process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Wraps a raw process id.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the id of the current process.
    #[must_use]
    pub fn current() -> Self {
        Self(std::process::id())
    }

    /// Returns the raw process id.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique identity of one connection listener.
///
/// The owning process id keeps handles from different clients apart; the
/// local counter distinguishes listeners inside one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionHandle {
    pid: ProcessId,
    local: u64,
}

impl ConnectionHandle {
    /// Creates a handle from its parts.
    #[must_use]
    pub const fn new(pid: ProcessId, local: u64) -> Self {
        Self { pid, local }
    }

    /// Returns the owning process.
    #[must_use]
    pub const fn pid(self) -> ProcessId {
        self.pid
    }

    /// Returns the per-process listener counter.
    #[must_use]
    pub const fn local(self) -> u64 {
        self.local
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.pid, self.local)
    }
}
