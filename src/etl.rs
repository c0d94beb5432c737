pub mod parse_osm;
pub mod tiger_expansion;
pub mod write_osm;

use std::path::PathBuf;

use log::{error, info};

use crate::data::osm::Record;
use crate::diagnostics::Diagnostics;
use crate::errors::Result;

use self::parse_osm::{ElementEvent, RecordAccumulator};
use self::write_osm::{serialize_record, OsmBatchWriter};

/// Decides whether a record is worth handing to the transformer.
pub trait Selector {
    fn select(&self, record: &Record) -> bool;
}

/// Rewrites a selected record in place. Returns true when the record was changed and
/// must be written out.
pub trait Transformer {
    fn transform(&mut self, record: &mut Record, diagnostics: &mut Diagnostics) -> Result<bool>;

    /// Called once after the last record.
    fn report(&self) {}
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub records: usize,
    pub selected: usize,
    pub fixed: usize,
    pub files: Vec<PathBuf>,
}

/// Single-pass driver: events in, fixed records out, one record in memory at a time.
pub struct StreamingEtl<S, T> {
    name: String,
    selector: S,
    transformer: T,
    writer: OsmBatchWriter,
    diagnostics: Diagnostics,
}

impl<S: Selector, T: Transformer> StreamingEtl<S, T> {
    pub fn new(name: &str, selector: S, transformer: T, writer: OsmBatchWriter) -> Self {
        StreamingEtl {
            name: name.to_string(),
            selector,
            transformer,
            writer,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn etl_name(&self) -> &str {
        &self.name
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn handle(&mut self, mut record: Record, summary: &mut RunSummary) -> Result<()> {
        summary.records += 1;
        if !self.selector.select(&record) {
            return Ok(());
        }
        summary.selected += 1;
        if self.transformer.transform(&mut record, &mut self.diagnostics)? {
            self.writer.write(&serialize_record(&record))?;
            summary.fixed += 1;
        }
        Ok(())
    }

    fn run<I>(&mut self, events: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<ElementEvent>>,
    {
        let mut accumulator = RecordAccumulator::new();
        let mut summary = RunSummary::default();
        for event in events {
            if let Some(record) = accumulator.accept(event?) {
                self.handle(record, &mut summary)?;
            }
        }
        summary.files = self.writer.finish()?;
        self.transformer.report();
        Ok(summary)
    }

    pub fn process<I>(&mut self, events: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<ElementEvent>>,
    {
        info!(etl_name = self.etl_name(); "Starting ETL process");
        match self.run(events) {
            Ok(summary) => {
                info!(
                    etl_name = self.etl_name(),
                    records = summary.records,
                    selected = summary.selected,
                    fixed = summary.fixed,
                    files = summary.files.len(),
                    diagnostics = self.diagnostics.len();
                    "Process finished"
                );
                Ok(summary)
            }
            Err(err) => {
                error!(etl_name = self.etl_name(), err = err.message.as_str(); "Processing failed with error");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::etl::parse_osm::OsmEventReader;
    use crate::etl::tiger_expansion::{TigerExpansion, TigerRoadSelector};
    use tempfile::tempdir;

    const OSM_SAMPLE: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<osm version="0.6" generator="test">
  <bounds minlat="0" minlon="0" maxlat="1" maxlon="1"/>
  <node id="1" version="1" lat="0.0" lon="0.0" />
  <node id="2" version="1" lat="0.0" lon="1.0">
    <tag k="name" v="Main St" />
  </node>
  <way id="10" version="3" changeset="55" uid="7" user="tiger" timestamp="2007-10-01T00:00:00Z">
    <nd ref="1" />
    <nd ref="2" />
    <tag k="highway" v="residential" />
    <tag k="name" v="Main St" />
    <tag k="tiger:name_base" v="Main" />
    <tag k="tiger:name_type" v="St" />
    <tag k="tiger:upload_uuid" v="bulk_upload.pl-1234" />
    <tag k="created_by" v="bulk_upload.pl" />
  </way>
  <way id="11" version="1">
    <nd ref="2" />
    <nd ref="1" />
    <tag k="highway" v="residential" />
    <tag k="name" v="Main St St" />
    <tag k="tiger:name_base" v="Main" />
    <tag k="tiger:name_type" v="St" />
  </way>
  <way id="12" version="1">
    <nd ref="1" />
    <nd ref="2" />
    <tag k="waterway" v="stream" />
    <tag k="name" v="Mill Rd" />
    <tag k="tiger:name_base" v="Mill" />
    <tag k="tiger:name_type" v="Rd" />
  </way>
  <way id="13" version="2">
    <nd ref="1" />
    <tag k="highway" v="service" />
    <tag k="name" v="Back Xyz" />
    <tag k="tiger:name_base" v="Back" />
    <tag k="tiger:name_type" v="Xyz" />
  </way>
  <relation id="100" version="1">
    <member type="way" ref="10" role="" />
    <tag k="type" v="route" />
  </relation>
</osm>
"#;

    fn tiger_etl(dir: &Path, max: usize) -> StreamingEtl<TigerRoadSelector, TigerExpansion> {
        StreamingEtl::new(
            "tiger_expansion",
            TigerRoadSelector,
            TigerExpansion::default(),
            OsmBatchWriter::new(dir, max),
        )
    }

    fn read_output(path: &Path) -> Vec<Record> {
        let text = fs::read_to_string(path).unwrap();
        let mut accumulator = RecordAccumulator::new();
        OsmEventReader::new(text.as_bytes())
            .filter_map(|event| accumulator.accept(event.unwrap()))
            .collect()
    }

    fn numbered_ways(count: usize) -> String {
        let mut xml = String::from("<osm version=\"0.6\">\n");
        for id in 0..count {
            xml.push_str(&format!(
                "<way id=\"{}\" version=\"1\"><nd ref=\"1\"/>\
                 <tag k=\"highway\" v=\"residential\"/>\
                 <tag k=\"name\" v=\"Elm {} Ave\"/>\
                 <tag k=\"tiger:name_base\" v=\"Elm\"/>\
                 <tag k=\"tiger:name_type\" v=\"Ave\"/></way>\n",
                id, id
            ));
        }
        xml.push_str("</osm>\n");
        xml
    }

    #[test]
    fn fixes_selected_ways_and_reports_the_rest() {
        let dir = tempdir().unwrap();
        let out_dir = dir.path().join("processed");
        let mut etl = tiger_etl(&out_dir, 1000);

        let summary = etl.process(OsmEventReader::new(OSM_SAMPLE.as_bytes())).unwrap();

        assert_eq!(summary.records, 7);
        assert_eq!(summary.selected, 3);
        assert_eq!(summary.fixed, 1);
        assert_eq!(summary.files, vec![out_dir.join("0000.osm")]);

        let records = read_output(&summary.files[0]);
        assert_eq!(records.len(), 1);
        let Record::Way(way) = &records[0] else {
            panic!("expected a way");
        };
        assert_eq!(way.attributes["id"], "10");
        assert_eq!(way.attributes["version"], "5");
        assert_eq!(way.attributes.len(), 2);
        assert_eq!(way.node_refs, vec!["1", "2"]);
        assert_eq!(way.tags["name"], "Main Street");
        assert!(!way.tags.contains_key("created_by"));
        assert!(!way.tags.contains_key("tiger:upload_uuid"));

        let reasons: Vec<(String, String)> = etl
            .diagnostics()
            .entries()
            .iter()
            .map(|entry| (entry.record_id.clone(), entry.reason.to_string()))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("11".to_string(), "Ambigious expansion".to_string()),
                ("13".to_string(), "Unknown road_type (Xyz)".to_string()),
            ]
        );
    }

    #[test]
    fn no_fixed_records_leaves_no_output_files() {
        let dir = tempdir().unwrap();
        let out_dir = dir.path().join("processed");
        let mut etl = tiger_etl(&out_dir, 1000);
        let input = r#"<osm>
  <way id="1" version="1"><nd ref="1"/><tag k="highway" v="residential"/><tag k="name" v="Main Street"/><tag k="tiger:name_base" v="Main"/><tag k="tiger:name_type" v="St"/></way>
  <node id="2" version="1"/>
</osm>"#;

        let summary = etl.process(OsmEventReader::new(input.as_bytes())).unwrap();

        assert_eq!(summary.selected, 1);
        assert_eq!(summary.fixed, 0);
        assert!(summary.files.is_empty());
        assert!(!out_dir.exists() || fs::read_dir(&out_dir).unwrap().next().is_none());
    }

    #[test]
    fn output_is_split_into_bounded_files() {
        let dir = tempdir().unwrap();
        let mut etl = tiger_etl(dir.path(), 2);
        let input = numbered_ways(5);

        let summary = etl.process(OsmEventReader::new(input.as_bytes())).unwrap();

        assert_eq!(summary.fixed, 5);
        assert_eq!(summary.files.len(), 3);
        let sizes: Vec<usize> = summary.files.iter().map(|path| read_output(path).len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        let first = read_output(&summary.files[0]);
        assert_eq!(first[0].tags()["name"], "Elm 0 Avenue");
        assert_eq!(first[0].attributes()["version"], "3");
    }

    #[test]
    fn malformed_input_aborts_the_run() {
        let dir = tempdir().unwrap();
        let mut etl = tiger_etl(dir.path(), 1000);
        let input = r#"<osm><way id="1" version="1"><tag k="highway" v="primary"/></node></osm>"#;

        assert!(etl.process(OsmEventReader::new(input.as_bytes())).is_err());
    }
}
