//! Legacy bridge emitter.
//!
//! Older runtimes take the whole resource as one JSON string. No per-leaf
//! compilation happens here and no source map is produced.

use crate::options::GenerateOptions;
use crate::tree::Document;

/// The resource as compact JSON in source key order.
pub fn bridge_injector(document: &Document) -> String {
    document.materialize().to_string()
}

fn payload(document: &Document, options: &GenerateOptions) -> String {
    let value = document.materialize();
    if options.locale.is_empty() {
        value.to_string()
    } else {
        let mut wrapped = serde_json::Map::new();
        wrapped.insert(options.locale.clone(), value);
        serde_json::Value::Object(wrapped).to_string()
    }
}

/// Escapes JSON text for a single-quoted JavaScript string.
pub(crate) fn quote(json: &str) -> String {
    json.replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
        .replace('\\', "\\\\")
        .replace('\'', "\\u0027")
}

pub fn emit_legacy(document: &Document, options: &GenerateOptions) -> String {
    let payload = quote(&payload(document, options));
    format!(
        "{} function (Component) {{\n  Component.options.__i18n = Component.options.__i18n || []\n  Component.options.__i18n.push('{}')\n}}",
        options.export_prefix(),
        payload
    )
}
