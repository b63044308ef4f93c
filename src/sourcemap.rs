//! Source map (revision 3) model.
//!
//! Lines and columns in `Mapping` are 0-based; columns are UTF-16 code units.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub mappings: String,
}

impl Default for SourceMap {
    fn default() -> Self {
        Self::empty()
    }
}

/// A decoded segment of `mappings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Mapping {
    pub generated_line: u32,
    pub generated_column: u32,
    pub original: Option<OriginalLocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OriginalLocation {
    pub source: u32,
    pub line: u32,
    pub column: u32,
    pub name: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMapError(pub String);

impl std::fmt::Display for SourceMapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl SourceMap {
    /// The trivial map returned when source maps are disabled.
    pub fn empty() -> Self {
        SourceMap {
            version: 3,
            file: None,
            sources: Vec::new(),
            sources_content: None,
            names: Vec::new(),
            mappings: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn decode(&self) -> Result<Vec<Mapping>, SourceMapError> {
        decode(self)
    }

    pub fn name(&self, index: u32) -> Option<&str> {
        self.names.get(index as usize).map(String::as_str)
    }

    pub fn source(&self, index: u32) -> Option<&str> {
        self.sources.get(index as usize).map(String::as_str)
    }

    pub fn source_content(&self, index: u32) -> Option<&str> {
        self.sources_content
            .as_ref()
            .and_then(|contents| contents.get(index as usize))
            .and_then(|content| content.as_deref())
    }
}

/// Finds the original location for a generated position: the closest segment
/// at or before `column` on `line`, shifted by the remaining distance.
pub fn original_position_for(
    mappings: &[Mapping],
    line: u32,
    column: u32,
) -> Option<OriginalLocation> {
    mappings
        .iter()
        .filter(|m| m.generated_line == line && m.generated_column <= column)
        .filter_map(|m| m.original.map(|o| (m.generated_column, o)))
        .max_by_key(|(generated_column, _)| *generated_column)
        .map(|(generated_column, original)| OriginalLocation {
            column: original.column + (column - generated_column),
            ..original
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Collects segments and encodes them with `oxc_sourcemap`.
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    file: Option<String>,
    sources: Vec<String>,
    source_ids: HashMap<String, u32>,
    sources_content: Vec<Option<String>>,
    names: Vec<String>,
    name_ids: HashMap<String, u32>,
    mappings: Vec<Mapping>,
}

impl SourceMapBuilder {
    pub fn new(file: Option<&str>) -> Self {
        Self {
            file: file.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn add_source(&mut self, source: &str) -> u32 {
        if let Some(id) = self.source_ids.get(source) {
            return *id;
        }
        let id = self.sources.len() as u32;
        self.sources.push(source.to_string());
        self.sources_content.push(None);
        self.source_ids.insert(source.to_string(), id);
        id
    }

    pub fn set_source_content(&mut self, source: u32, content: &str) {
        if let Some(slot) = self.sources_content.get_mut(source as usize) {
            *slot = Some(content.to_string());
        }
    }

    fn add_name(&mut self, name: &str) -> u32 {
        if let Some(id) = self.name_ids.get(name) {
            return *id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_string());
        self.name_ids.insert(name.to_string(), id);
        id
    }

    pub fn add_mapping(
        &mut self,
        generated_line: u32,
        generated_column: u32,
        source: u32,
        original_line: u32,
        original_column: u32,
        name: Option<&str>,
    ) {
        let name = name.map(|n| self.add_name(n));
        self.mappings.push(Mapping {
            generated_line,
            generated_column,
            original: Some(OriginalLocation {
                source,
                line: original_line,
                column: original_column,
                name,
            }),
        });
    }

    pub fn build(mut self) -> SourceMap {
        self.mappings.sort();
        self.mappings.dedup();

        // sources and names go in first so oxc's ids line up with ours
        let mut inner = oxc_sourcemap::SourceMapBuilder::default();
        for (source, content) in self.sources.iter().zip(&self.sources_content) {
            inner.add_source_and_content(source, content.as_deref().unwrap_or(""));
        }
        for name in &self.names {
            inner.add_name(name);
        }
        for mapping in &self.mappings {
            if let Some(original) = mapping.original {
                inner.add_token(
                    mapping.generated_line,
                    mapping.generated_column,
                    original.line,
                    original.column,
                    Some(original.source),
                    original.name,
                );
            }
        }
        let mappings = inner.into_sourcemap().to_json().mappings;

        let has_content = self.sources_content.iter().any(Option::is_some);
        SourceMap {
            version: 3,
            file: self.file,
            mappings,
            sources: self.sources,
            sources_content: has_content.then_some(self.sources_content),
            names: self.names,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECODING
// ═══════════════════════════════════════════════════════════════════════════════

/// Base64 VLQ digits beyond this run cannot encode a 32-bit position delta.
const MAX_CONTINUATION_DIGITS: usize = 6;

/// Rejects characters outside the VLQ alphabet and values too wide for a
/// 32-bit position before the text reaches the decoder.
fn check_mappings(mappings: &str) -> Result<(), SourceMapError> {
    let mut continuation = 0;
    for c in mappings.chars() {
        match c {
            ';' | ',' => {
                if continuation != 0 {
                    return Err(SourceMapError("truncated VLQ value".into()));
                }
            }
            // digits 32..=63 carry the continuation bit
            'g'..='z' | '0'..='9' | '+' | '/' => {
                continuation += 1;
                if continuation > MAX_CONTINUATION_DIGITS {
                    return Err(SourceMapError("VLQ value out of range".into()));
                }
            }
            'A'..='Z' | 'a'..='f' => continuation = 0,
            other => return Err(SourceMapError(format!("invalid base64 `{}`", other))),
        }
    }
    if continuation != 0 {
        return Err(SourceMapError("truncated VLQ value".into()));
    }
    Ok(())
}

fn decode(map: &SourceMap) -> Result<Vec<Mapping>, SourceMapError> {
    check_mappings(&map.mappings)?;
    let json = serde_json::to_string(map).map_err(|e| SourceMapError(e.to_string()))?;
    let decoded = oxc_sourcemap::SourceMap::from_json_string(&json)
        .map_err(|e| SourceMapError(e.to_string()))?;

    let mut out = Vec::new();
    for token in decoded.get_tokens() {
        let original = match token.get_source_id() {
            Some(source) => {
                let name = token.get_name_id();
                if source as usize >= map.sources.len()
                    || name.is_some_and(|n| n as usize >= map.names.len())
                {
                    return Err(SourceMapError(format!(
                        "segment at {}:{} points past the sources or names",
                        token.get_dst_line(),
                        token.get_dst_col()
                    )));
                }
                Some(OriginalLocation {
                    source,
                    line: token.get_src_line(),
                    column: token.get_src_col(),
                    name,
                })
            }
            None => None,
        };
        out.push(Mapping {
            generated_line: token.get_dst_line(),
            generated_column: token.get_dst_col(),
            original,
        });
    }
    Ok(out)
}
