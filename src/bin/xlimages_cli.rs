//! CLI tool for xlimages - lists the images of an XLSX file or rewrites them
//!
//! Usage:
//!   xlimages_cli <input.xlsx>                                  # Image map as JSON on stdout
//!   xlimages_cli <input.xlsx> -o out.json                      # Image map as JSON to a file
//!   xlimages_cli <input.xlsx> --replace '{sheet}/{file}' -o out.xlsx
//!   xlimages_cli <input.xlsx> --config options.json ...        # Custom resolution options
//!
//! `--replace` writes the expanded template into each image's anchor cell.
//! The template may use `{sheet}`, `{row}`, `{col}`, `{cell}` and `{file}`.

#![allow(clippy::exit)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]

use std::convert::Infallible;
use std::env;
use std::fs;
use std::io::{self, Write};

use xlimages::{CellCoordinate, MediaFile, ResolveOptions, Workbook};

const USAGE: &str =
    "Usage: xlimages_cli <input.xlsx> [--config options.json] [--replace TEMPLATE] [-o output]";

struct Args {
    input: String,
    output: Option<String>,
    config: Option<String>,
    replace: Option<String>,
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }

    let mut parsed = Args {
        input: args[1].clone(),
        output: None,
        config: None,
        replace: None,
    };

    let mut rest = args[2..].iter();
    while let Some(flag) = rest.next() {
        let slot = match flag.as_str() {
            "-o" => &mut parsed.output,
            "--config" => &mut parsed.config,
            "--replace" => &mut parsed.replace,
            other => {
                eprintln!("Unknown argument: {other}\n{USAGE}");
                std::process::exit(1);
            }
        };
        match rest.next() {
            Some(value) => *slot = Some(value.clone()),
            None => {
                eprintln!("Missing value for {flag}\n{USAGE}");
                std::process::exit(1);
            }
        }
    }

    parsed
}

fn expand_template(template: &str, sheet: &str, file: &MediaFile, at: CellCoordinate) -> String {
    template
        .replace("{sheet}", sheet)
        .replace("{row}", &at.row.to_string())
        .replace("{col}", &at.col.to_string())
        .replace("{cell}", &at.to_string())
        .replace("{file}", file.file_name())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = parse_args();

    // Read options
    let options = match &args.config {
        Some(path) => {
            let json = match fs::read_to_string(path) {
                Ok(j) => j,
                Err(e) => {
                    eprintln!("Error reading {}: {}", path, e);
                    std::process::exit(1);
                }
            };
            match ResolveOptions::from_json(&json) {
                Ok(o) => o,
                Err(e) => {
                    eprintln!("Error in {}: {}", path, e);
                    std::process::exit(1);
                }
            }
        }
        None => ResolveOptions::default(),
    };

    // Read input file
    let data = match fs::read(&args.input) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error reading {}: {}", args.input, e);
            std::process::exit(1);
        }
    };

    let mut workbook = Workbook::with_options(options);
    if let Err(e) = workbook.load(&data) {
        eprintln!("Error loading XLSX: {}", e);
        std::process::exit(1);
    }

    let Some(template) = args.replace else {
        let locations = match workbook.resolve() {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error resolving images: {}", e);
                std::process::exit(1);
            }
        };
        let json = match serde_json::to_string_pretty(&locations) {
            Ok(j) => j,
            Err(e) => {
                eprintln!("Error serializing JSON: {}", e);
                std::process::exit(1);
            }
        };
        write_output(args.output.as_deref(), json.as_bytes());
        return;
    };

    let Some(output) = args.output else {
        eprintln!("--replace needs -o <output.xlsx>");
        std::process::exit(1);
    };

    let written = match workbook
        .transform_sheets(|sheet, file, at| {
            let value = expand_template(&template, sheet, &file, at);
            async move { Ok::<_, Infallible>(value) }
        })
        .await
    {
        Ok(n) => n,
        Err(e) => {
            eprintln!("Error rewriting images: {}", e);
            std::process::exit(1);
        }
    };

    let bytes = match workbook.save() {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error saving XLSX: {}", e);
            std::process::exit(1);
        }
    };
    write_output(Some(output.as_str()), &bytes);
    eprintln!("Rewrote {} image cells", written);
}

fn write_output(path: Option<&str>, bytes: &[u8]) {
    match path {
        Some(path) => {
            if let Err(e) = fs::write(path, bytes) {
                eprintln!("Error writing {}: {}", path, e);
                std::process::exit(1);
            }
            eprintln!("Written: {}", path);
        }
        None => {
            io::stdout().write_all(bytes).unwrap();
            println!();
        }
    }
}
