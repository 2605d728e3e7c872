//! Command-line frontend: load a schema dictionary and a BEJ stream from
//! disk, decode, and write the JSON document to an output file.

use std::{env, fs};
use std::{
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context as _, ensure};

use rudder_bej::{BejError, DecodeOptions, Dictionary, JsonWriter, decode_to_json};


const EXIT_USAGE: u8 = 1;
const EXIT_SCHEMA_OPEN: u8 = 2;
const EXIT_ANNOTATION_OPEN: u8 = 3;
const EXIT_STREAM_OPEN: u8 = 4;
const EXIT_DICT_PARSE: u8 = 5;
const EXIT_OUTPUT_OPEN: u8 = 6;
const EXIT_DECODE: u8 = 7;

struct CliArgs {
    schema:     PathBuf,
    annotation: PathBuf,
    stream:     PathBuf,
    output:     PathBuf,
}

fn parse_args(args: &mut env::Args) -> Option<CliArgs> {
    let mut schema = None;
    let mut annotation = None;
    let mut stream = None;
    let mut output = None;

    while let Some(arg) = args.next() {
        let slot = match arg.as_str() {
            "-s" => &mut schema,
            "-a" => &mut annotation,
            "-b" => &mut stream,
            "-o" => &mut output,
            _    => return None,
        };
        *slot = Some(PathBuf::from(args.next()?));
    }

    Some(CliArgs {
        schema:     schema?,
        annotation: annotation?,
        stream:     stream?,
        output:     output?,
    })
}

fn usage(program: &str) {
    eprintln!(
        "Usage: {program} -s <schema.bin> -a <annotation.bin> -b <data.bej> -o <out.json>\n\
         The annotation dictionary is opened and otherwise ignored.",
    );
}

/// Read a whole input file, treating an empty file as unusable.
fn load_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    let bytes = fs::read(path).with_context(|| format!("could not read {}", path.display()))?;
    ensure!(!bytes.is_empty(), "{} is empty", path.display());
    Ok(bytes)
}

fn main() -> ExitCode {
    env_logger::init();

    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "bejtool".into());
    let Some(args) = parse_args(&mut args) else {
        usage(&program);
        return ExitCode::from(EXIT_USAGE);
    };

    let schema_blob = match load_input(&args.schema) {
        Ok(blob) => blob,
        Err(err) => {
            eprintln!("ERROR: {err:#}");
            return ExitCode::from(EXIT_SCHEMA_OPEN);
        }
    };

    // The annotation dictionary is a required input for interface parity,
    // but annotation members are skipped during decoding, so its contents
    // are never consulted. Only readability is checked.
    if let Err(err) = fs::File::open(&args.annotation) {
        eprintln!("ERROR: could not open {}: {err}", args.annotation.display());
        return ExitCode::from(EXIT_ANNOTATION_OPEN);
    }

    let bej_stream = match load_input(&args.stream) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("ERROR: {err:#}");
            return ExitCode::from(EXIT_STREAM_OPEN);
        }
    };

    let dict = match Dictionary::load(&schema_blob) {
        Ok(dict) => dict,
        Err(err) => {
            eprintln!("ERROR: could not parse {}: {err}", args.schema.display());
            return ExitCode::from(EXIT_DICT_PARSE);
        }
    };
    log::debug!(
        "loaded schema dictionary with {} entries from {}",
        dict.entries().len(),
        args.schema.display(),
    );

    let out_file = match fs::File::create(&args.output) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("ERROR: could not create {}: {err}", args.output.display());
            return ExitCode::from(EXIT_OUTPUT_OPEN);
        }
    };

    let mut writer = BufWriter::new(out_file);
    let decoded = {
        let mut sink = JsonWriter::new(&mut writer);
        decode_to_json(&bej_stream, &dict, &mut sink, DecodeOptions::default())
    };
    let finished = decoded.and_then(|()| -> Result<(), BejError> {
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    });

    match finished {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: decoding {} failed: {err}", args.stream.display());
            // Never leave a truncated document behind.
            drop(writer);
            if let Err(remove_err) = fs::remove_file(&args.output) {
                eprintln!(
                    "ERROR: could not remove partial output {}: {remove_err}",
                    args.output.display(),
                );
            }
            ExitCode::from(EXIT_DECODE)
        }
    }
}
