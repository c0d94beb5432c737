use std::collections::{HashMap, HashSet};

use serde::Deserialize;

/// Short form to long form lookup, e.g. `St` -> `Street`.
///
/// The set of long forms is kept alongside so that a token can be recognised as an
/// expansion we already know, which is how an unknown short form is told apart from a
/// name that was expanded before.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "HashMap<String, String>")]
pub struct AbbreviationTable {
    expansions: HashMap<String, String>,
    long_forms: HashSet<String>,
}

impl From<HashMap<String, String>> for AbbreviationTable {
    fn from(expansions: HashMap<String, String>) -> Self {
        let long_forms = expansions.values().cloned().collect();
        AbbreviationTable {
            expansions,
            long_forms,
        }
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for AbbreviationTable {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(short, long)| (short.to_string(), long.to_string()))
            .collect::<HashMap<_, _>>()
            .into()
    }
}

impl AbbreviationTable {
    pub fn expand(&self, short: &str) -> Option<&str> {
        self.expansions.get(short).map(String::as_str)
    }

    pub fn is_long_form(&self, token: &str) -> bool {
        self.long_forms.contains(token)
    }

    pub fn len(&self) -> usize {
        self.expansions.len()
    }

    /// Street suffixes as they appear in `tiger:name_type`.
    pub fn road_types() -> Self {
        [
            ("Aly", "Alley"),
            ("Anx", "Annex"),
            ("Arc", "Arcade"),
            ("Ave", "Avenue"),
            ("Bch", "Beach"),
            ("Blf", "Bluff"),
            ("Blvd", "Boulevard"),
            ("Br", "Branch"),
            ("Brg", "Bridge"),
            ("Byp", "Bypass"),
            ("Cir", "Circle"),
            ("Cmn", "Common"),
            ("Cres", "Crescent"),
            ("Ct", "Court"),
            ("Cv", "Cove"),
            ("Cyn", "Canyon"),
            ("Dr", "Drive"),
            ("Expy", "Expressway"),
            ("Fwy", "Freeway"),
            ("Gln", "Glen"),
            ("Grv", "Grove"),
            ("Hbr", "Harbor"),
            ("Hl", "Hill"),
            ("Holw", "Hollow"),
            ("Hts", "Heights"),
            ("Hwy", "Highway"),
            ("Is", "Island"),
            ("Jct", "Junction"),
            ("Ln", "Lane"),
            ("Lndg", "Landing"),
            ("Loop", "Loop"),
            ("Mdw", "Meadow"),
            ("Mnr", "Manor"),
            ("Mtn", "Mountain"),
            ("Pass", "Pass"),
            ("Pike", "Pike"),
            ("Pkwy", "Parkway"),
            ("Pl", "Place"),
            ("Plz", "Plaza"),
            ("Pt", "Point"),
            ("Rd", "Road"),
            ("Rdg", "Ridge"),
            ("Rte", "Route"),
            ("Row", "Row"),
            ("Run", "Run"),
            ("Sq", "Square"),
            ("St", "Street"),
            ("Ter", "Terrace"),
            ("Tpke", "Turnpike"),
            ("Trce", "Trace"),
            ("Trl", "Trail"),
            ("Vly", "Valley"),
            ("Vw", "View"),
            ("Walk", "Walk"),
            ("Way", "Way"),
            ("Xing", "Crossing"),
        ]
        .into_iter()
        .collect()
    }

    /// Compass directions as they appear in `tiger:name_direction_prefix` and `_suffix`.
    pub fn directions() -> Self {
        [
            ("N", "North"),
            ("S", "South"),
            ("E", "East"),
            ("W", "West"),
            ("NE", "Northeast"),
            ("NW", "Northwest"),
            ("SE", "Southeast"),
            ("SW", "Southwest"),
        ]
        .into_iter()
        .collect()
    }
}
