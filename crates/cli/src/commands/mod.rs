pub(crate) mod bundle;
pub(crate) mod compat;
pub(crate) mod convert;
pub(crate) mod doctor;
pub(crate) mod lint;
pub(crate) mod profile;
pub(crate) mod stream;

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::process;

use mapwright_analyze::{Diagnostic, Severity};
use serde::Serialize;
use serde_json::Value as Json;

use crate::{report_error, OutputFormat};

/// Load a rules document with its includes resolved, or exit.
pub(crate) fn load_rules(path: &Path, output: OutputFormat, quiet: bool) -> Json {
    match mapwright_core::load_bundle(path) {
        Ok(doc) => doc,
        Err(e) => {
            report_error(&format!("error loading rules: {e}"), output, quiet);
            process::exit(1);
        }
    }
}

/// Open `path`, or stdin when it is absent or `-`.
pub(crate) fn open_input(path: Option<&Path>) -> io::Result<Box<dyn Read>> {
    match path {
        Some(p) if p != Path::new("-") => Ok(Box::new(File::open(p)?)),
        _ => Ok(Box::new(io::stdin())),
    }
}

/// Read all of `path` (or stdin), or exit.
pub(crate) fn read_input(path: Option<&Path>, output: OutputFormat, quiet: bool) -> String {
    let mut text = String::new();
    let read = open_input(path).and_then(|mut r| r.read_to_string(&mut text));
    if let Err(e) = read {
        let name = path.map_or_else(|| "stdin".to_string(), |p| p.display().to_string());
        report_error(&format!("error reading {name}: {e}"), output, quiet);
        process::exit(1);
    }
    text
}

pub(crate) fn print_json<T: Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
    println!("{}", json);
}

/// One line per diagnostic, then a count summary.
pub(crate) fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for d in diagnostics {
        println!("{d}");
    }
    let count = |s: Severity| diagnostics.iter().filter(|d| d.severity == s).count();
    println!(
        "{} error(s), {} warning(s), {} info",
        count(Severity::Error),
        count(Severity::Warning),
        count(Severity::Info)
    );
}
