//! Media Groups
//!
//! Owners declare named groups and the conversions to perform whenever media is
//! attached to them. Declarations are rebuilt for every attach or sync call.

use std::collections::HashMap;

/// Conversions to perform when media is attached to a named group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaGroup {
    name: String,
    conversions: Vec<String>,
}

impl MediaGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conversions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the conversions for this group, replacing any previous declaration
    pub fn perform_conversions<I, S>(&mut self, conversions: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conversions = conversions.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_conversions(&self) -> bool {
        !self.conversions.is_empty()
    }

    pub fn conversions(&self) -> &[String] {
        &self.conversions
    }
}

/// The groups declared by one owner
#[derive(Debug, Clone, Default)]
pub struct MediaGroups {
    groups: HashMap<String, MediaGroup>,
}

impl MediaGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a group, or return the existing declaration
    pub fn add(&mut self, name: impl Into<String>) -> &mut MediaGroup {
        let name = name.into();
        self.groups
            .entry(name.clone())
            .or_insert_with(|| MediaGroup::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&MediaGroup> {
        self.groups.get(name)
    }

    /// Conversions declared for a group; undeclared groups have none
    pub fn conversions_for(&self, name: &str) -> &[String] {
        self.get(name).map(MediaGroup::conversions).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Hook through which an owner type declares its media groups
pub trait RegistersMediaGroups: Send + Sync {
    fn register_media_groups(&self, _groups: &mut MediaGroups) {}
}
