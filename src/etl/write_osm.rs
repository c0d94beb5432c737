use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use quick_xml::escape::escape;

use crate::data::osm::{Attributes, Record, Tags};
use crate::errors::Result;

pub const DEFAULT_MAX_OBJECTS_PER_FILE: usize = 1000;
pub const GENERATOR: &str = env!("CARGO_PKG_NAME");

const XML_DECLARATION: &str = "<?xml version='1.0' encoding='UTF-8'?>\n";

fn format_attributes(out: &mut String, attributes: &Attributes) {
    for (key, value) in attributes {
        out.push_str(&format!(" {}=\"{}\"", key, escape(value)));
    }
}

fn format_tags(out: &mut String, tags: &Tags) {
    for (key, value) in tags {
        out.push_str(&format!(" <tag k=\"{}\" v=\"{}\" />\n", escape(key), escape(value)));
    }
}

/// Renders a record as an OSM XML fragment, one element per line.
pub fn serialize_record(record: &Record) -> String {
    let element = record.kind().element_name();
    let has_children = match record {
        Record::Node(node) => !node.tags.is_empty(),
        // Ways always get an open/close pair, a way without nodes is still written out whole.
        Record::Way(_) => true,
        Record::Relation(relation) => !relation.members.is_empty() || !relation.tags.is_empty(),
    };

    let mut out = String::new();
    out.push('<');
    out.push_str(element);
    format_attributes(&mut out, record.attributes());
    if !has_children {
        out.push_str(" />\n");
        return out;
    }
    out.push_str(">\n");

    match record {
        Record::Node(_) => (),
        Record::Way(way) => {
            for node_ref in &way.node_refs {
                out.push_str(&format!(" <nd ref=\"{}\" />\n", escape(node_ref)));
            }
        }
        Record::Relation(relation) => {
            for member in &relation.members {
                out.push_str(" <member");
                format_attributes(&mut out, member);
                out.push_str(" />\n");
            }
        }
    }
    format_tags(&mut out, record.tags());

    out.push_str(&format!("</{}>\n", element));
    out
}

/// Writes serialized records into numbered `.osm` files of bounded size.
pub struct OsmBatchWriter {
    dir: PathBuf,
    max_objects_per_file: usize,
    file_counter: usize,
    object_counter: usize,
    out: Option<BufWriter<File>>,
    written_files: Vec<PathBuf>,
}

impl OsmBatchWriter {
    pub fn new(dir: &Path, max_objects_per_file: usize) -> Self {
        OsmBatchWriter {
            dir: dir.to_path_buf(),
            max_objects_per_file: max_objects_per_file.max(1),
            file_counter: 0,
            object_counter: 0,
            out: None,
            written_files: Vec::new(),
        }
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(format!("{:04}.osm", self.file_counter))
    }

    fn open(&mut self) -> Result<()> {
        create_dir_all(&self.dir)?;
        let path = self.current_path();
        let mut out = BufWriter::new(File::create(&path)?);
        out.write_all(XML_DECLARATION.as_bytes())?;
        writeln!(out, "<osm version=\"0.6\" generator=\"{}\">", GENERATOR)?;
        info!(path = path.display().to_string().as_str(); "Opened output file");
        self.out = Some(out);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut out) = self.out.take() else {
            return Ok(());
        };
        out.write_all(b"</osm>\n")?;
        out.flush()?;
        drop(out);

        let path = self.current_path();
        info!(
            path = path.display().to_string().as_str(),
            records = self.object_counter;
            "Closed output file"
        );
        self.written_files.push(path);
        self.object_counter = 0;
        self.file_counter += 1;
        Ok(())
    }

    /// Appends one serialized record, opening and rolling files as needed. A file is only
    /// opened to receive a record, so no file is ever left empty.
    pub fn write(&mut self, record_text: &str) -> Result<()> {
        if self.out.is_none() {
            self.open()?;
        }
        if let Some(out) = self.out.as_mut() {
            out.write_all(record_text.as_bytes())?;
        }
        self.object_counter += 1;
        if self.object_counter >= self.max_objects_per_file {
            self.close()?;
        }
        Ok(())
    }

    /// Closes the last file and returns every file that holds at least one record.
    pub fn finish(&mut self) -> Result<Vec<PathBuf>> {
        self.close()?;
        Ok(self.written_files.clone())
    }
}
