//! Identity and descriptor types for hosted components.
//!
//! A [`ComponentName`] names one implementation class inside one package.
//! Callers describe what they want with an [`Intent`]; the registry never
//! compares intents directly but always through their canonical
//! [`IntentKey`], so two intents that differ only in their extras address the
//! same binding.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DescriptorError;
use crate::process::ProcessSlot;

/// Stable identity of a component: owning package plus class name.
///
/// # Example
///
/// ```
/// use rebind_registry::ComponentName;
///
/// let name: ComponentName = "demo.plugin/SyncService".parse().expect("valid name");
/// assert_eq!(name.package(), "demo.plugin");
/// assert_eq!(name.class(), "SyncService");
/// assert_eq!(name.to_string(), "demo.plugin/SyncService");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentName {
    package: String,
    class: String,
}

impl ComponentName {
    /// Creates a name from its package and class parts.
    #[must_use]
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
        }
    }

    /// Returns the owning package.
    #[must_use]
    pub const fn package(&self) -> &str {
        self.package.as_str()
    }

    /// Returns the implementation class name.
    #[must_use]
    pub const fn class(&self) -> &str {
        self.class.as_str()
    }

    /// Checks that neither part is blank.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::BlankName`] when either part is empty.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.package.trim().is_empty() || self.class.trim().is_empty() {
            return Err(DescriptorError::BlankName {
                value: self.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.class)
    }
}

impl FromStr for ComponentName {
    type Err = DescriptorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some((package, class)) = value.split_once('/') else {
            return Err(DescriptorError::MalformedName {
                value: value.to_owned(),
            });
        };
        let name = Self::new(package.trim(), class.trim());
        name.validate()?;
        Ok(name)
    }
}

/// Target descriptor passed to start, stop, and bind.
///
/// # Example
///
/// ```
/// use rebind_registry::{ComponentName, Intent};
///
/// let target = ComponentName::new("demo.plugin", "SyncService");
/// let intent = Intent::new(target.clone())
///     .with_action("demo.SYNC")
///     .with_category("background")
///     .with_extra("attempt", "1");
/// assert_eq!(intent.component(), &target);
/// assert_eq!(intent.action(), Some("demo.SYNC"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    component: ComponentName,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    categories: BTreeSet<String>,
    #[serde(default)]
    extras: BTreeMap<String, String>,
}

impl Intent {
    /// Creates an intent addressing `component` with no further detail.
    #[must_use]
    pub const fn new(component: ComponentName) -> Self {
        Self {
            component,
            action: None,
            data: None,
            categories: BTreeSet::new(),
            extras: BTreeMap::new(),
        }
    }

    /// Sets the action string.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Sets the data URI.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Adds a category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }

    /// Adds an extra key/value pair. Extras do not take part in matching.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Returns the addressed component.
    #[must_use]
    pub const fn component(&self) -> &ComponentName {
        &self.component
    }

    /// Returns the action, if any.
    #[must_use]
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Returns the data URI, if any.
    #[must_use]
    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// Returns the categories in sorted order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(String::as_str)
    }

    /// Looks up an extra by key.
    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extras.get(key).map(String::as_str)
    }

    /// Returns the canonical comparison key for this intent.
    #[must_use]
    pub fn key(&self) -> IntentKey {
        IntentKey::from(self)
    }
}

/// Canonical, comparison-stable form of an [`Intent`].
///
/// Built from the component, action, data, and sorted categories. Extras are
/// deliberately left out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntentKey {
    component: ComponentName,
    action: Option<String>,
    data: Option<String>,
    categories: Vec<String>,
}

impl IntentKey {
    /// Returns the component this key addresses.
    #[must_use]
    pub const fn component(&self) -> &ComponentName {
        &self.component
    }
}

impl From<&Intent> for IntentKey {
    fn from(intent: &Intent) -> Self {
        Self {
            component: intent.component.clone(),
            action: intent.action.clone(),
            data: intent.data.clone(),
            categories: intent.categories.iter().cloned().collect(),
        }
    }
}

impl fmt::Display for IntentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.component)?;
        if let Some(action) = &self.action {
            write!(f, " act={action}")?;
        }
        if let Some(data) = &self.data {
            write!(f, " dat={data}")?;
        }
        if !self.categories.is_empty() {
            write!(f, " cat=[{}]", self.categories.join(","))?;
        }
        Ok(())
    }
}

bitflags::bitflags! {
    /// Bind-time flag set.
    ///
    /// # Example
    ///
    /// ```
    /// use rebind_registry::BindFlags;
    ///
    /// let flags = BindFlags::AUTO_CREATE | BindFlags::DEBUG_UNBIND;
    /// assert!(flags.contains(BindFlags::AUTO_CREATE));
    /// assert!(!BindFlags::empty().contains(BindFlags::AUTO_CREATE));
    /// ```
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct BindFlags: u32 {
        /// Create the component if needed and keep it alive while bound.
        const AUTO_CREATE = 1 << 0;
        /// Remember where an unbind happened so a second unbind can be reported.
        const DEBUG_UNBIND = 1 << 1;
    }
}

impl BindFlags {
    /// Shorthand for `contains(BindFlags::AUTO_CREATE)`.
    #[must_use]
    pub const fn auto_create(self) -> bool {
        self.contains(Self::AUTO_CREATE)
    }
}

impl fmt::Display for BindFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

/// Kind tag that selects the factory able to instantiate a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Compiled into the host binary.
    Host,
    /// Shipped inside a loadable plugin.
    Plugin,
}

impl ComponentKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Plugin => "plugin",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved description of a component: who ships it, where it runs, and
/// which factory builds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    name: ComponentName,
    plugin: String,
    process: ProcessSlot,
    kind: ComponentKind,
}

impl ComponentMetadata {
    /// Creates metadata for `name`, shipped by `plugin`, hosted in `process`.
    #[must_use]
    pub fn new(
        name: ComponentName,
        plugin: impl Into<String>,
        process: ProcessSlot,
        kind: ComponentKind,
    ) -> Self {
        Self {
            name,
            plugin: plugin.into(),
            process,
            kind,
        }
    }

    /// Returns the component identity.
    #[must_use]
    pub const fn name(&self) -> &ComponentName {
        &self.name
    }

    /// Returns the plugin that ships the component.
    #[must_use]
    pub const fn plugin(&self) -> &str {
        self.plugin.as_str()
    }

    /// Returns the process slot the component runs in.
    #[must_use]
    pub const fn process(&self) -> ProcessSlot {
        self.process
    }

    /// Returns the factory kind.
    #[must_use]
    pub const fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Checks the metadata for obviously invalid values.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError`] when the name is blank or the plugin
    /// identifier is empty.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        self.name.validate()?;
        if self.plugin.trim().is_empty() {
            return Err(DescriptorError::BlankPlugin {
                component: self.name.to_string(),
            });
        }
        Ok(())
    }
}
