use std::fs;
use std::io::{self, BufRead, BufReader};
use std::mem;
use std::path::Path;
use std::str;

use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use xz::bufread::XzDecoder;

use crate::data::osm::{Attributes, Node, Record, Relation, Way};
use crate::errors::Result;

/// A primitive parse event. Self-closing elements arrive as a `Start` immediately
/// followed by the matching `End`.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementEvent {
    Start { name: String, attributes: Attributes },
    End { name: String },
}

#[cfg(test)]
impl ElementEvent {
    pub fn start(name: &str, attributes: &[(&str, &str)]) -> Self {
        ElementEvent::Start {
            name: name.to_string(),
            attributes: attributes
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    pub fn end(name: &str) -> Self {
        ElementEvent::End {
            name: name.to_string(),
        }
    }
}

/// Pulls element events out of an OSM XML document one at a time.
pub struct OsmEventReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    pending_end: Option<String>,
    depth: usize,
    done: bool,
}

impl<R: BufRead> OsmEventReader<R> {
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.trim_text(true);
        OsmEventReader {
            reader,
            buf: Vec::new(),
            pending_end: None,
            depth: 0,
            done: false,
        }
    }

    fn element_name(el: &BytesStart) -> Result<String> {
        Ok(str::from_utf8(el.name().as_ref())?.to_string())
    }

    fn parse_attributes(el: &BytesStart) -> Result<Attributes> {
        let mut attributes = Attributes::new();
        for attribute_res in el.attributes() {
            let attribute = attribute_res?;
            let key = str::from_utf8(attribute.key.as_ref())?.to_string();
            let value = attribute.unescape_value()?.into_owned();
            attributes.insert(key, value);
        }
        Ok(attributes)
    }

    /// Next event, or `None` once the document is exhausted.
    pub fn next_event(&mut self) -> Result<Option<ElementEvent>> {
        if let Some(name) = self.pending_end.take() {
            return Ok(Some(ElementEvent::End { name }));
        }

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) => {
                    self.depth += 1;
                    return Ok(Some(ElementEvent::Start {
                        name: Self::element_name(&e)?,
                        attributes: Self::parse_attributes(&e)?,
                    }));
                }
                Event::Empty(e) => {
                    let name = Self::element_name(&e)?;
                    let attributes = Self::parse_attributes(&e)?;
                    self.pending_end = Some(name.clone());
                    return Ok(Some(ElementEvent::Start { name, attributes }));
                }
                Event::End(e) => {
                    self.depth = self.depth.saturating_sub(1);
                    let name = str::from_utf8(e.name().as_ref())?.to_string();
                    return Ok(Some(ElementEvent::End { name }));
                }
                Event::Eof => {
                    if self.depth > 0 {
                        return Err(format!(
                            "malformed input: document ended with {} unclosed element(s)",
                            self.depth
                        )
                        .into());
                    }
                    return Ok(None);
                }
                // Declarations, comments, text and the like carry nothing we keep.
                _ => (),
            }
        }
    }
}

impl<R: BufRead> Iterator for OsmEventReader<R> {
    type Item = Result<ElementEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.next_event().transpose();
        if !matches!(next, Some(Ok(_))) {
            self.done = true;
        }
        next
    }
}

/// Opens `path` for streaming. `-` is standard input; `.xz` files are decompressed.
pub fn create_osm_reader(path: &str) -> Result<OsmEventReader<Box<dyn BufRead>>> {
    let input: Box<dyn BufRead> = if path == "-" {
        Box::new(io::stdin().lock())
    } else {
        let file_reader = BufReader::new(fs::File::open(Path::new(path))?);
        if path.ends_with(".xz") {
            Box::new(BufReader::new(XzDecoder::new(file_reader)))
        } else {
            Box::new(file_reader)
        }
    };
    Ok(OsmEventReader::new(input))
}

enum ParserState {
    Top,
    Node(Node),
    Way(Way),
    Relation(Relation),
}

/// Assembles records from element events, holding at most one record at a time.
pub struct RecordAccumulator {
    state: ParserState,
}

impl Default for RecordAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordAccumulator {
    pub fn new() -> Self {
        RecordAccumulator {
            state: ParserState::Top,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, ParserState::Top)
    }

    fn add_tag(&mut self, mut attributes: Attributes) {
        let tags = match &mut self.state {
            ParserState::Top => return,
            ParserState::Node(node) => &mut node.tags,
            ParserState::Way(way) => &mut way.tags,
            ParserState::Relation(relation) => &mut relation.tags,
        };
        let Some(key) = attributes.shift_remove("k") else {
            debug!(attributes = format!("{:?}", attributes).as_str(); "Skipping tag without key");
            return;
        };
        let value = attributes.shift_remove("v").unwrap_or_default();
        tags.insert(key, value);
    }

    /// Feeds one event. Returns the record completed by it, if any.
    pub fn accept(&mut self, event: ElementEvent) -> Option<Record> {
        match event {
            ElementEvent::Start { name, mut attributes } => {
                match name.as_str() {
                    "node" => {
                        self.state = ParserState::Node(Node {
                            attributes,
                            ..Node::default()
                        });
                    }
                    "way" => {
                        self.state = ParserState::Way(Way {
                            attributes,
                            ..Way::default()
                        });
                    }
                    "relation" => {
                        self.state = ParserState::Relation(Relation {
                            attributes,
                            ..Relation::default()
                        });
                    }
                    "tag" => self.add_tag(attributes),
                    "nd" => {
                        if let ParserState::Way(way) = &mut self.state {
                            match attributes.shift_remove("ref") {
                                Some(reference) => way.node_refs.push(reference),
                                None => debug!("Skipping nd without ref"),
                            }
                        }
                    }
                    "member" => {
                        if let ParserState::Relation(relation) = &mut self.state {
                            relation.members.push(attributes);
                        }
                    }
                    _ => (),
                }
                None
            }
            ElementEvent::End { name } => {
                let closes_record = matches!(
                    (name.as_str(), &self.state),
                    ("node", ParserState::Node(_))
                        | ("way", ParserState::Way(_))
                        | ("relation", ParserState::Relation(_))
                );
                if !closes_record {
                    return None;
                }
                match mem::replace(&mut self.state, ParserState::Top) {
                    ParserState::Node(node) => Some(Record::Node(node)),
                    ParserState::Way(way) => Some(Record::Way(way)),
                    ParserState::Relation(relation) => Some(Record::Relation(relation)),
                    ParserState::Top => None,
                }
            }
        }
    }
}
