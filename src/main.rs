mod data;
mod diagnostics;
mod errors;
mod etl;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use log::{error, info};
use serde::Deserialize;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use crate::data::abbreviations::AbbreviationTable;
use crate::errors::Result;
use crate::etl::parse_osm::create_osm_reader;
use crate::etl::tiger_expansion::{TigerExpansion, TigerRoadSelector};
use crate::etl::write_osm::{OsmBatchWriter, DEFAULT_MAX_OBJECTS_PER_FILE};
use crate::etl::StreamingEtl;

const ETL_NAME: &str = "tiger_expansion";

/// Expands abbreviated TIGER road names in an OSM extract.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The input .osm (or .osm.xz) file, `-` for standard input.
    #[arg(long = "infile")]
    infile: Option<String>,

    /// Directory for the numbered output files. Defaults to the input's name.
    #[arg(long = "outdir")]
    outdir: Option<PathBuf>,

    /// CSV report of ways that could not be fixed.
    #[arg(long = "checkways", default_value = "ways.csv")]
    checkways: PathBuf,

    /// JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Records per output file, overrides the config file.
    #[arg(long = "max-per-file")]
    max_per_file: Option<usize>,

    /// Show a progress counter on stderr.
    #[arg(long)]
    progress: bool,

    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct UserConfig {
    pub max_objects_per_file: usize,
    pub road_types: Option<AbbreviationTable>,
    pub directions: Option<AbbreviationTable>,
}

impl Default for UserConfig {
    fn default() -> Self {
        UserConfig {
            max_objects_per_file: DEFAULT_MAX_OBJECTS_PER_FILE,
            road_types: None,
            directions: None,
        }
    }
}

fn load_user_config(path: Option<&Path>) -> Result<UserConfig> {
    let config: UserConfig = match path {
        Some(path) => {
            let file = File::open(path)
                .map_err(|err| format!("could not open config {}: {}", path.display(), err))?;
            serde_json::from_reader(BufReader::new(file))?
        }
        None => UserConfig::default(),
    };
    if config.max_objects_per_file == 0 {
        return Err("max_objects_per_file must be greater than zero".into());
    }
    Ok(config)
}

/// `roads.osm.xz` -> `roads`; standard input -> `expansion`.
fn default_output_dir(infile: &str) -> PathBuf {
    if infile == "-" {
        return PathBuf::from("expansion");
    }
    let file_name = Path::new(infile)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| infile.to_string());
    let stem = file_name.strip_suffix(".xz").unwrap_or(&file_name);
    let stem = stem.strip_suffix(".osm").unwrap_or(stem);
    if stem.is_empty() {
        PathBuf::from("expansion")
    } else {
        PathBuf::from(stem)
    }
}

fn setup_logging(level: &str) {
    Builder::with_level(level)
        .with_target_writer("*", new_writer(io::stderr()))
        .init();
}

/// Config file (or defaults) with command-line overrides applied.
fn effective_config(args: &Args) -> Result<UserConfig> {
    let mut config = load_user_config(args.config.as_deref())?;
    if let Some(max) = args.max_per_file {
        if max == 0 {
            return Err("--max-per-file must be greater than zero".into());
        }
        config.max_objects_per_file = max;
    }
    Ok(config)
}

fn run(args: &Args, infile: &str) -> Result<()> {
    let mut config = effective_config(args)?;
    let road_types = config.road_types.take().unwrap_or_else(AbbreviationTable::road_types);
    let directions = config.directions.take().unwrap_or_else(AbbreviationTable::directions);
    let output_dir = args
        .outdir
        .clone()
        .unwrap_or_else(|| default_output_dir(infile));

    info!(
        infile = infile,
        outdir = output_dir.display().to_string().as_str(),
        max_objects_per_file = config.max_objects_per_file,
        road_types = road_types.len(),
        directions = directions.len();
        "Configuration loaded"
    );

    let mut etl = StreamingEtl::new(
        ETL_NAME,
        TigerRoadSelector,
        TigerExpansion::new(road_types, directions),
        OsmBatchWriter::new(&output_dir, config.max_objects_per_file),
    );
    let reader = create_osm_reader(infile)?;
    if args.progress {
        etl.process(tqdm::tqdm(reader))?;
    } else {
        etl.process(reader)?;
    }

    let diagnostics = etl.diagnostics();
    if !diagnostics.is_empty() {
        diagnostics.export(&args.checkways)?;
        info!(
            path = args.checkways.display().to_string().as_str(),
            entries = diagnostics.len();
            "Wrote unfixable ways report"
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(&args.log_level);

    let Some(infile) = args.infile.clone() else {
        if let Err(err) = Args::command().print_help() {
            error!(err = err.to_string().as_str(); "Could not print usage");
        }
        return ExitCode::FAILURE;
    };

    match run(&args, &infile) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(err = err.message.as_str(); "Run failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn output_dir_is_derived_from_the_input_name() {
        assert_eq!(default_output_dir("data/roads.osm"), PathBuf::from("roads"));
        assert_eq!(default_output_dir("roads.osm.xz"), PathBuf::from("roads"));
        assert_eq!(default_output_dir("extract"), PathBuf::from("extract"));
        assert_eq!(default_output_dir("-"), PathBuf::from("expansion"));
    }

    #[test]
    fn config_defaults_apply_without_a_file() {
        let config = load_user_config(None).unwrap();
        assert_eq!(config.max_objects_per_file, DEFAULT_MAX_OBJECTS_PER_FILE);
        assert!(config.road_types.is_none());
    }

    #[test]
    fn config_file_overrides_tables_and_ceiling() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"max_objects_per_file": 250, "road_types": {"St": "Street"}}"#,
        )
        .unwrap();

        let config = load_user_config(Some(path.as_path())).unwrap();
        assert_eq!(config.max_objects_per_file, 250);
        let road_types = config.road_types.unwrap();
        assert_eq!(road_types.len(), 1);
        assert_eq!(road_types.expand("St"), Some("Street"));
        assert!(config.directions.is_none());
    }

    #[test]
    fn config_rejects_a_zero_ceiling() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"max_objects_per_file": 0}"#).unwrap();
        assert!(load_user_config(Some(path.as_path())).is_err());
    }

    fn args_for(config: Option<PathBuf>, max_per_file: Option<usize>) -> Args {
        Args {
            infile: None,
            outdir: None,
            checkways: PathBuf::from("ways.csv"),
            config,
            max_per_file,
            progress: false,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn max_per_file_flag_overrides_the_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"max_objects_per_file": 250}"#).unwrap();

        let config = effective_config(&args_for(Some(path.clone()), Some(40))).unwrap();
        assert_eq!(config.max_objects_per_file, 40);

        let config = effective_config(&args_for(Some(path), None)).unwrap();
        assert_eq!(config.max_objects_per_file, 250);

        let config = effective_config(&args_for(None, Some(3))).unwrap();
        assert_eq!(config.max_objects_per_file, 3);
    }

    #[test]
    fn max_per_file_flag_rejects_zero() {
        let err = effective_config(&args_for(None, Some(0))).unwrap_err();
        assert!(err.message.contains("--max-per-file"));
    }

    #[test]
    fn run_splits_output_at_the_flag_ceiling() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("three.osm");
        let mut xml = String::from("<osm version=\"0.6\">\n");
        for id in 1..=3 {
            xml.push_str(&format!(
                "<way id=\"{}\" version=\"1\"><nd ref=\"1\"/><tag k=\"highway\" v=\"residential\"/>\
                 <tag k=\"name\" v=\"Oak Ave\"/><tag k=\"tiger:name_base\" v=\"Oak\"/>\
                 <tag k=\"tiger:name_type\" v=\"Ave\"/></way>\n",
                id
            ));
        }
        xml.push_str("</osm>\n");
        fs::write(&input, xml).unwrap();
        let out_dir = dir.path().join("out");
        let args = Args {
            infile: Some(input.display().to_string()),
            outdir: Some(out_dir.clone()),
            checkways: dir.path().join("ways.csv"),
            ..args_for(None, Some(2))
        };

        run(&args, &input.display().to_string()).unwrap();

        assert!(out_dir.join("0000.osm").exists());
        assert!(out_dir.join("0001.osm").exists());
        assert!(!out_dir.join("0002.osm").exists());
        assert!(!dir.path().join("ways.csv").exists());
    }

    #[test]
    fn run_writes_output_and_report() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("sample.osm");
        fs::write(
            &input,
            r#"<osm version="0.6">
  <way id="1" version="1"><nd ref="1"/><tag k="highway" v="residential"/><tag k="name" v="Main St"/><tag k="tiger:name_base" v="Main"/><tag k="tiger:name_type" v="St"/></way>
  <way id="2" version="1"><nd ref="1"/><tag k="highway" v="residential"/><tag k="name" v="Oak, Xyz"/><tag k="tiger:name_base" v="Oak"/><tag k="tiger:name_type" v="Xyz"/></way>
</osm>"#,
        )
        .unwrap();
        let args = Args {
            infile: Some(input.display().to_string()),
            outdir: Some(dir.path().join("out")),
            checkways: dir.path().join("ways.csv"),
            config: None,
            max_per_file: None,
            progress: false,
            log_level: "info".to_string(),
        };

        run(&args, &input.display().to_string()).unwrap();

        let output = fs::read_to_string(dir.path().join("out").join("0000.osm")).unwrap();
        assert!(output.contains("<tag k=\"name\" v=\"Main Street\" />"));
        assert!(output.contains("<way id=\"1\" version=\"3\">"));
        let report = fs::read_to_string(dir.path().join("ways.csv")).unwrap();
        assert_eq!(report, "ID,Name,Reason\n2,\"Oak, Xyz\",Unknown road_type (Xyz)\n");
    }
}
