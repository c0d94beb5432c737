use std::collections::BTreeMap;

use log::{debug, info};

use crate::data::abbreviations::AbbreviationTable;
use crate::data::osm::Record;
use crate::diagnostics::{DiagnosticEntry, Diagnostics, Reason};
use crate::errors::Result;

use super::{Selector, Transformer};

/// A way can carry up to ten parallel names: `name`, `name_1` .. `name_9`.
pub const NAME_SUFFIXES: [&str; 10] = ["", "_1", "_2", "_3", "_4", "_5", "_6", "_7", "_8", "_9"];

/// Import and editor bookkeeping tags that JOSM or Potlatch would drop on save.
pub const STALE_TAGS: [&str; 7] = [
    "created_by",
    "tiger:upload_uuid",
    "tiger:tlid",
    "tiger:source",
    "tiger:separated",
    "odbl",
    "odbl:note",
];

/// Name correction plus provenance cleanup, committed as one edit.
const VERSION_BUMP: u64 = 2;

fn add_or_incr(tally: &mut BTreeMap<String, usize>, item: &str) -> usize {
    let count = tally.entry(item.to_string()).or_insert(0);
    *count += 1;
    *count
}

fn count_word(words: &[&str], token: &str) -> usize {
    words.iter().filter(|word| **word == token).count()
}

/// Selects named highways imported from TIGER.
#[derive(Debug, Default, Clone, Copy)]
pub struct TigerRoadSelector;

impl Selector for TigerRoadSelector {
    fn select(&self, record: &Record) -> bool {
        if !matches!(record, Record::Way(_)) || !record.tags().contains_key("highway") {
            return false;
        }
        NAME_SUFFIXES.iter().any(|suffix| {
            record.tag(&format!("name{}", suffix)).is_some()
                && record.tag(&format!("tiger:name{}_base", suffix)).is_some()
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum DirectionPosition {
    Prefix,
    Suffix,
}

impl DirectionPosition {
    fn tag_key(&self, suffix: &str) -> String {
        match self {
            DirectionPosition::Prefix => format!("tiger:name_direction_prefix{}", suffix),
            DirectionPosition::Suffix => format!("tiger:name_direction_suffix{}", suffix),
        }
    }

    fn not_in_name(&self, token: &str) -> Reason {
        match self {
            DirectionPosition::Prefix => Reason::DirectionPrefixNotInName(token.to_string()),
            DirectionPosition::Suffix => Reason::DirectionSuffixNotInName(token.to_string()),
        }
    }
}

/// A short form found exactly once in the name, with what it expands to.
struct Substitution {
    short: String,
    long: String,
}

/// Expands abbreviated road types and directions in TIGER road names.
#[derive(Debug)]
pub struct TigerExpansion {
    road_types: AbbreviationTable,
    directions: AbbreviationTable,
    unrecognized_road_types: BTreeMap<String, usize>,
    unrecognized_directions: BTreeMap<String, usize>,
    ambiguous_expansions: BTreeMap<String, usize>,
}

impl Default for TigerExpansion {
    fn default() -> Self {
        Self::new(AbbreviationTable::road_types(), AbbreviationTable::directions())
    }
}

impl TigerExpansion {
    pub fn new(road_types: AbbreviationTable, directions: AbbreviationTable) -> Self {
        TigerExpansion {
            road_types,
            directions,
            unrecognized_road_types: BTreeMap::new(),
            unrecognized_directions: BTreeMap::new(),
            ambiguous_expansions: BTreeMap::new(),
        }
    }

    pub fn unrecognized_road_types(&self) -> &BTreeMap<String, usize> {
        &self.unrecognized_road_types
    }

    pub fn unrecognized_directions(&self) -> &BTreeMap<String, usize> {
        &self.unrecognized_directions
    }

    pub fn ambiguous_expansions(&self) -> &BTreeMap<String, usize> {
        &self.ambiguous_expansions
    }

    fn resolve_road_type(
        &mut self,
        record: &Record,
        suffix: &str,
        name: &str,
        words: &[&str],
        diagnostics: &mut Diagnostics,
    ) -> Option<Substitution> {
        let road_type = record.tag(&format!("tiger:name_type{}", suffix))?;

        let Some(long) = self.road_types.expand(road_type) else {
            let seen = add_or_incr(&mut self.unrecognized_road_types, road_type);
            // Report only tokens that aren't themselves an expansion we already know.
            if seen == 1 && !self.road_types.is_long_form(road_type) {
                diagnostics.push(DiagnosticEntry::for_record(
                    record,
                    Reason::UnknownRoadType(road_type.to_string()),
                ));
            }
            return None;
        };

        match count_word(words, road_type) {
            1 => Some(Substitution {
                short: road_type.to_string(),
                long: long.to_string(),
            }),
            0 => {
                if count_word(words, long) == 0 {
                    diagnostics.push(DiagnosticEntry::for_record(
                        record,
                        Reason::RoadTypeNotInName(road_type.to_string()),
                    ));
                }
                None
            }
            _ => {
                add_or_incr(&mut self.ambiguous_expansions, name);
                diagnostics.push(DiagnosticEntry::for_record(record, Reason::AmbiguousExpansion));
                None
            }
        }
    }

    fn resolve_direction(
        &mut self,
        record: &Record,
        position: DirectionPosition,
        suffix: &str,
        name: &str,
        words: &[&str],
    ) -> Option<Substitution> {
        let direction = record.tag(&position.tag_key(suffix))?;

        let Some(long) = self.directions.expand(direction) else {
            add_or_incr(&mut self.unrecognized_directions, direction);
            return None;
        };

        match count_word(words, direction) {
            1 => Some(Substitution {
                short: direction.to_string(),
                long: long.to_string(),
            }),
            0 => None,
            _ => {
                add_or_incr(&mut self.ambiguous_expansions, name);
                None
            }
        }
    }

    /// Expands one name slot. Returns true when the name tag was rewritten.
    fn fix_name(&mut self, record: &mut Record, suffix: &str, diagnostics: &mut Diagnostics) -> bool {
        let name_key = format!("name{}", suffix);
        let Some(name) = record.tag(&name_key).map(str::to_string) else {
            return false;
        };
        let words: Vec<&str> = name.split_whitespace().collect();
        let mut fixed_words: Vec<String> = words.iter().map(|word| word.to_string()).collect();

        if let Some(road_type) = self.resolve_road_type(record, suffix, &name, &words, diagnostics) {
            if let Some(index) = fixed_words.iter().position(|word| *word == road_type.short) {
                fixed_words[index] = road_type.long;
            }
        }

        for position in [DirectionPosition::Prefix, DirectionPosition::Suffix] {
            let Some(direction) = self.resolve_direction(record, position, suffix, &name, &words) else {
                continue;
            };
            // An earlier substitution may already have consumed the token.
            match fixed_words.iter().position(|word| *word == direction.short) {
                Some(index) => fixed_words[index] = direction.long,
                None => diagnostics.push(DiagnosticEntry::for_record(
                    record,
                    position.not_in_name(&direction.short),
                )),
            }
        }

        let new_name = fixed_words.join(" ");
        if new_name == name {
            return false;
        }
        debug!(id = record.id(), from = name.as_str(), to = new_name.as_str(); "Expanded name");
        record.tags_mut().insert(name_key, new_name);
        true
    }
}

impl Transformer for TigerExpansion {
    fn transform(&mut self, record: &mut Record, diagnostics: &mut Diagnostics) -> Result<bool> {
        let mut fixed = false;
        for suffix in NAME_SUFFIXES {
            if self.fix_name(record, suffix, diagnostics) && !fixed {
                record.bump_version(VERSION_BUMP)?;
                record.remove_session_attributes();
                fixed = true;
            }
        }
        if fixed {
            record.remove_tags(&STALE_TAGS);
        }
        Ok(fixed)
    }

    fn report(&self) {
        info!(
            unrecognized_road_types = self.unrecognized_road_types.len(),
            unrecognized_directions = self.unrecognized_directions.len(),
            ambiguous_names = self.ambiguous_expansions.len();
            "Expansion tallies"
        );
        for (name, count) in &self.ambiguous_expansions {
            debug!(name = name.as_str(), count = *count; "Ambiguous name");
        }
        for (token, count) in &self.unrecognized_road_types {
            debug!(token = token.as_str(), count = *count; "Unrecognized road type");
        }
        for (token, count) in &self.unrecognized_directions {
            debug!(token = token.as_str(), count = *count; "Unrecognized direction");
        }
    }
}
