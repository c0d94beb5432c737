use indexmap::IndexMap;
use log::warn;

use crate::errors::Result;

/// Element attributes in document order. Values are kept as the strings found in the
/// input; nothing is coerced.
pub type Attributes = IndexMap<String, String>;

/// Key/value annotations of a record. A later tag with the same key replaces the earlier one.
pub type Tags = IndexMap<String, String>;

/// Attributes describing the edit session that produced a record. They are meaningless
/// once we rewrite the record, so they are dropped on every fix.
pub const SESSION_ATTRIBUTES: [&str; 4] = ["changeset", "uid", "user", "timestamp"];

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Node {
    pub attributes: Attributes,
    pub tags: Tags,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Way {
    pub attributes: Attributes,
    pub tags: Tags,
    /// Ordered node ids; the order is the path of the way.
    pub node_refs: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Relation {
    pub attributes: Attributes,
    pub tags: Tags,
    pub members: Vec<Attributes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Node,
    Way,
    Relation,
}

impl RecordKind {
    pub fn element_name(&self) -> &'static str {
        match self {
            RecordKind::Node => "node",
            RecordKind::Way => "way",
            RecordKind::Relation => "relation",
        }
    }
}

/// One fully assembled OSM element.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Node(_) => RecordKind::Node,
            Record::Way(_) => RecordKind::Way,
            Record::Relation(_) => RecordKind::Relation,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            Record::Node(node) => &node.attributes,
            Record::Way(way) => &way.attributes,
            Record::Relation(relation) => &relation.attributes,
        }
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        match self {
            Record::Node(node) => &mut node.attributes,
            Record::Way(way) => &mut way.attributes,
            Record::Relation(relation) => &mut relation.attributes,
        }
    }

    pub fn tags(&self) -> &Tags {
        match self {
            Record::Node(node) => &node.tags,
            Record::Way(way) => &way.tags,
            Record::Relation(relation) => &relation.tags,
        }
    }

    pub fn tags_mut(&mut self) -> &mut Tags {
        match self {
            Record::Node(node) => &mut node.tags,
            Record::Way(way) => &mut way.tags,
            Record::Relation(relation) => &mut relation.tags,
        }
    }

    /// The `id` attribute, empty when the input did not carry one.
    pub fn id(&self) -> &str {
        self.attributes().get("id").map(String::as_str).unwrap_or("")
    }

    /// Non-empty tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags()
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Adds `by` to the `version` attribute. A record without a version is left alone.
    pub fn bump_version(&mut self, by: u64) -> Result<()> {
        let id = self.id().to_string();
        match self.attributes_mut().get_mut("version") {
            Some(version) => {
                let current: u64 = version.parse().map_err(|err| {
                    format!("record {} has invalid version {:?}: {}", id, version, err)
                })?;
                let bumped = current
                    .checked_add(by)
                    .ok_or_else(|| format!("record {} version {} overflows", id, current))?;
                *version = bumped.to_string();
            }
            None => {
                warn!(id = id.as_str(); "Fixed record has no version attribute");
            }
        }
        Ok(())
    }

    pub fn remove_session_attributes(&mut self) {
        let attributes = self.attributes_mut();
        for key in SESSION_ATTRIBUTES {
            attributes.shift_remove(key);
        }
    }

    pub fn remove_tags(&mut self, keys: &[&str]) {
        let tags = self.tags_mut();
        for key in keys {
            tags.shift_remove(*key);
        }
    }
}
