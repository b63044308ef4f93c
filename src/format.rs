//! Front-end dispatch.
//!
//! The format is chosen from the filename extension (or a custom block's
//! `lang`), never by sniffing the content.

use serde_json::Value;

use crate::error::{CompileError, Diagnostics};
use crate::tree::Document;
use crate::{json, module, yaml};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceFormat {
    Json,
    Yaml,
    PlainModule,
}

impl ResourceFormat {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, extension) = filename.rsplit_once('.')?;
        Self::from_lang(extension)
    }

    /// Maps a custom block `lang` attribute or a bare extension.
    pub fn from_lang(lang: &str) -> Option<Self> {
        match lang.to_ascii_lowercase().as_str() {
            "json" | "json5" => Some(ResourceFormat::Json),
            "yaml" | "yml" => Some(ResourceFormat::Yaml),
            "js" | "mjs" | "cjs" | "ts" | "mts" | "cts" => Some(ResourceFormat::PlainModule),
            _ => None,
        }
    }

    pub fn parse(
        self,
        source: &str,
        filename: &str,
        diagnostics: &dyn Diagnostics,
    ) -> Result<Document, CompileError> {
        match self {
            ResourceFormat::Json => json::parse(source, filename),
            ResourceFormat::Yaml => yaml::parse(source, filename),
            ResourceFormat::PlainModule => module::parse(source, filename, diagnostics),
        }
    }

    /// Writes a plain value back out in this format's syntax.
    pub fn serialize(self, value: &Value, filename: &str) -> Result<String, CompileError> {
        let serialize_error = |message: String| CompileError::Serialize {
            filename: filename.to_string(),
            message,
        };
        match self {
            ResourceFormat::Json => {
                serde_json::to_string_pretty(value).map_err(|e| serialize_error(e.to_string()))
            }
            ResourceFormat::Yaml => {
                serde_yaml::to_string(value).map_err(|e| serialize_error(e.to_string()))
            }
            ResourceFormat::PlainModule => serde_json::to_string_pretty(value)
                .map(|object| format!("export default {}\n", object))
                .map_err(|e| serialize_error(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TracingDiagnostics;
    use serde_json::json;

    #[test]
    fn test_from_filename() {
        assert_eq!(ResourceFormat::from_filename("en.json"), Some(ResourceFormat::Json));
        assert_eq!(ResourceFormat::from_filename("a/en.JSON5"), Some(ResourceFormat::Json));
        assert_eq!(ResourceFormat::from_filename("en.yml"), Some(ResourceFormat::Yaml));
        assert_eq!(ResourceFormat::from_filename("en.yaml"), Some(ResourceFormat::Yaml));
        for name in ["en.js", "en.mjs", "en.cjs", "en.ts"] {
            assert_eq!(ResourceFormat::from_filename(name), Some(ResourceFormat::PlainModule));
        }
        assert_eq!(ResourceFormat::from_filename("en.txt"), None);
        assert_eq!(ResourceFormat::from_filename("README"), None);
    }

    #[test]
    fn test_serialize_reparses_to_same_value() {
        let value = json!({"en": {"hello": "world", "n": 1, "list": ["a", true, null]}});
        for (format, filename) in [
            (ResourceFormat::Json, "en.json"),
            (ResourceFormat::Yaml, "en.yaml"),
            (ResourceFormat::PlainModule, "en.js"),
        ] {
            let text = format.serialize(&value, filename).unwrap();
            let document = format.parse(&text, filename, &TracingDiagnostics).unwrap();
            assert_eq!(document.materialize(), value, "{:?}", format);
        }
    }
}
