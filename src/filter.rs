//! Locale filter for component custom blocks.
//!
//! Filtering works on the materialized value. The result is written back out
//! and parsed again with the same front end, so the emitter always walks a
//! freshly parsed tree. Plain modules are the exception: message functions
//! have no data form, so their top-level pairs are pruned on the tree and the
//! module is written back from it.

use serde_json::Value;

use crate::error::{CompileError, Diagnostics};
use crate::format::ResourceFormat;
use crate::module;
use crate::options::GenerateOptions;
use crate::tree::{Document, Mapping, Node};

fn is_requested(key: &str, locales: &[String]) -> bool {
    locales.iter().any(|l| l == key)
}

/// Keeps the top-level keys listed in `locales`. An empty list keeps all.
pub fn filter_locales(value: Value, locales: &[String]) -> Value {
    if locales.is_empty() {
        return value;
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| is_requested(key, locales))
                .collect(),
        ),
        other => other,
    }
}

/// Tree form of [`filter_locales`].
fn retain_locales(document: &Document, locales: &[String]) -> Document {
    let root = match &document.root {
        Node::Mapping(mapping) => Node::Mapping(Mapping {
            pairs: mapping
                .pairs
                .iter()
                .filter(|pair| is_requested(&pair.key, locales))
                .cloned()
                .collect(),
            span: mapping.span,
        }),
        other => other.clone(),
    };
    Document {
        root,
        filename: document.filename.clone(),
    }
}

/// A document rebuilt from filtered text.
#[derive(Debug)]
pub struct Filtered {
    pub document: Document,
    pub source: String,
}

/// Runs materialize, filter, re-serialize and re-parse when the options ask
/// for a locale subset of a locale-keyed custom block; `None` otherwise.
///
/// A block with its own `locale` holds that locale's messages directly, so
/// its top-level keys are message keys and it is never filtered.
pub fn refilter(
    document: &Document,
    format: ResourceFormat,
    options: &GenerateOptions,
    diagnostics: &dyn Diagnostics,
) -> Result<Option<Filtered>, CompileError> {
    if !options.is_sfc() || options.only_locales.is_empty() {
        return Ok(None);
    }
    if !options.locale.is_empty() {
        tracing::debug!(
            filename = %document.filename,
            locale = %options.locale,
            "single-locale block, locale filter skipped"
        );
        return Ok(None);
    }
    let source = match format {
        ResourceFormat::PlainModule => {
            module::serialize(&retain_locales(document, &options.only_locales))
        }
        _ => {
            let value = filter_locales(document.materialize(), &options.only_locales);
            format.serialize(&value, &document.filename)?
        }
    };
    let document = format.parse(&source, &document.filename, diagnostics)?;
    tracing::debug!(
        filename = %document.filename,
        locales = ?options.only_locales,
        "locale filter applied"
    );
    Ok(Some(Filtered { document, source }))
}
