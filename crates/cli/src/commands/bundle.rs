use std::path::Path;

use super::load_rules;
use crate::OutputFormat;

/// Print the bundled rules document. The document is JSON whatever
/// `--output` says.
pub(crate) fn cmd_bundle(rules: &Path, pretty: bool, output: OutputFormat, quiet: bool) {
    let doc = load_rules(rules, output, quiet);
    let text = if pretty {
        serde_json::to_string_pretty(&doc)
    } else {
        serde_json::to_string(&doc)
    };
    println!("{}", text.unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e)));
}
