//! Record and lookup-table types shared by the parsing, expansion and writing stages.

pub mod abbreviations;
pub mod osm;
