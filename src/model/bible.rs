//! Series Bible: the registry of story entities shared across stages.
//!
//! The bible is one value. It is replaced wholesale on every write; there is
//! no field-level merge.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four kinds of entity the bible tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Character,
    Location,
    TimelineEvent,
    Object,
}

impl EntityKind {
    pub const ALL: [Self; 4] = [
        Self::Character,
        Self::Location,
        Self::TimelineEvent,
        Self::Object,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Location => "location",
            Self::TimelineEvent => "timeline event",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named entity with free-form attributes (traits, description, appearances).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique within the entity's kind.
    pub name: String,

    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl Entity {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Rejected bible contents.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BibleError {
    #[error("duplicate {kind} name: {name}")]
    DuplicateEntity { kind: EntityKind, name: String },

    #[error("{kind} with an empty name")]
    UnnamedEntity { kind: EntityKind },
}

/// The Series Bible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesBible {
    #[serde(default)]
    pub characters: Vec<Entity>,
    #[serde(default)]
    pub locations: Vec<Entity>,
    #[serde(default)]
    pub timeline: Vec<Entity>,
    #[serde(default)]
    pub objects: Vec<Entity>,
}

impl SeriesBible {
    #[must_use]
    pub fn entities(&self, kind: EntityKind) -> &[Entity] {
        match kind {
            EntityKind::Character => &self.characters,
            EntityKind::Location => &self.locations,
            EntityKind::TimelineEvent => &self.timeline,
            EntityKind::Object => &self.objects,
        }
    }

    #[must_use]
    pub fn entity(&self, kind: EntityKind, name: &str) -> Option<&Entity> {
        self.entities(kind).iter().find(|e| e.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        EntityKind::ALL
            .into_iter()
            .map(|kind| self.entities(kind).len())
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks that every entity is named and names are unique within a kind.
    pub fn validate(&self) -> Result<(), BibleError> {
        for kind in EntityKind::ALL {
            let mut seen = HashSet::new();
            for entity in self.entities(kind) {
                if entity.name.trim().is_empty() {
                    return Err(BibleError::UnnamedEntity { kind });
                }
                if !seen.insert(entity.name.as_str()) {
                    return Err(BibleError::DuplicateEntity {
                        kind,
                        name: entity.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
