use std::{fmt, fs::File, io, path::Path};

use csv::Writer;

use crate::data::osm::Record;
use crate::errors::Result;

/// Why a record could not be fixed automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    UnknownRoadType(String),
    AmbiguousExpansion,
    RoadTypeNotInName(String),
    DirectionPrefixNotInName(String),
    DirectionSuffixNotInName(String),
}

// Report wording is fixed, misspelling included.
impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::UnknownRoadType(token) => write!(f, "Unknown road_type ({})", token),
            Reason::AmbiguousExpansion => f.write_str("Ambigious expansion"),
            Reason::RoadTypeNotInName(token) => write!(f, "Road type ({}) not in name", token),
            Reason::DirectionPrefixNotInName(token) => {
                write!(f, "Direction prefix ({}) not in name", token)
            }
            Reason::DirectionSuffixNotInName(token) => {
                write!(f, "Direction suffix ({}) not in name", token)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub record_name: Option<String>,
    pub record_id: String,
    pub reason: Reason,
}

impl DiagnosticEntry {
    pub fn for_record(record: &Record, reason: Reason) -> Self {
        DiagnosticEntry {
            record_name: record.tags().get("name").cloned(),
            record_id: record.id().to_string(),
            reason,
        }
    }
}

/// Records that need a human to look at them, in the order they were met.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<DiagnosticEntry>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: DiagnosticEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[DiagnosticEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the `ID,Name,Reason` report. Fields containing the delimiter are quoted.
    pub fn write_csv<W: io::Write>(&self, out: W) -> Result<()> {
        let mut writer = Writer::from_writer(out);
        writer.write_record(["ID", "Name", "Reason"])?;
        for entry in self.entries() {
            writer.write_record([
                entry.record_id.as_str(),
                entry.record_name.as_deref().unwrap_or(""),
                entry.reason.to_string().as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn export(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.write_csv(File::create(path)?)
    }
}
