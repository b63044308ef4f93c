//! Source-map merger
//!
//! Combines the structural map of the generated module with the fragment maps
//! of compiled messages. A structural segment named after a literal anchors
//! that literal's fragment: fragment positions are offsets from the segment on
//! both the generated and the original side.

use std::collections::HashMap;

use crate::error::CompileError;
use crate::sourcemap::{original_position_for, Mapping, SourceMap, SourceMapBuilder};

pub fn merge_source_maps(
    structural: &SourceMap,
    code_maps: &HashMap<String, SourceMap>,
    in_source_map: Option<&SourceMap>,
    filename: &str,
) -> Result<SourceMap, CompileError> {
    let invalid = |message: String| CompileError::SourceMap {
        filename: filename.to_string(),
        message,
    };
    let segments = structural.decode().map_err(|e| invalid(e.to_string()))?;
    let inbound = match in_source_map {
        Some(map) => Some((map, map.decode().map_err(|e| invalid(e.to_string()))?)),
        None => None,
    };

    let mut fragments = HashMap::with_capacity(code_maps.len());
    for (literal, map) in code_maps {
        let decoded = map.decode().map_err(|e| invalid(e.to_string()))?;
        fragments.insert(literal.as_str(), decoded);
    }

    let mut merger = Merger {
        builder: SourceMapBuilder::new(structural.file.as_deref()),
        structural,
        inbound,
    };
    let mut fragment_count = 0;

    for segment in &segments {
        let Some(original) = segment.original else {
            continue;
        };
        let name = original.name.and_then(|n| structural.name(n));
        merger.add(
            original.source,
            (segment.generated_line, segment.generated_column),
            (original.line, original.column),
            name,
        );

        let Some(fragment) = name.and_then(|n| fragments.get(n)) else {
            continue;
        };
        for f in fragment {
            let Some(f_original) = f.original else {
                continue;
            };
            // already covered by the anchoring segment
            if f.generated_line == 0 && f.generated_column == 0 {
                continue;
            }
            let generated = (
                segment.generated_line + f.generated_line,
                if f.generated_line == 0 {
                    segment.generated_column + f.generated_column
                } else {
                    f.generated_column
                },
            );
            let original_position = (
                original.line + f_original.line,
                if f_original.line == 0 {
                    original.column + f_original.column
                } else {
                    f_original.column
                },
            );
            merger.add(original.source, generated, original_position, None);
            fragment_count += 1;
        }
    }

    tracing::debug!(
        filename,
        structural = segments.len(),
        fragments = fragment_count,
        "source maps merged"
    );
    Ok(merger.builder.build())
}

struct Merger<'a> {
    builder: SourceMapBuilder,
    structural: &'a SourceMap,
    inbound: Option<(&'a SourceMap, Vec<Mapping>)>,
}

impl<'a> Merger<'a> {
    /// Adds one segment, routing its original position through the inbound
    /// map when there is one.
    fn add(
        &mut self,
        source: u32,
        (generated_line, generated_column): (u32, u32),
        (line, column): (u32, u32),
        name: Option<&str>,
    ) {
        let (source_name, content, line, column) = match &self.inbound {
            Some((map, mappings)) => {
                let Some(routed) = original_position_for(mappings, line, column) else {
                    return;
                };
                (
                    map.source(routed.source),
                    map.source_content(routed.source),
                    routed.line,
                    routed.column,
                )
            }
            None => (
                self.structural.source(source),
                self.structural.source_content(source),
                line,
                column,
            ),
        };
        let Some(source_name) = source_name else {
            return;
        };
        let id = self.builder.add_source(source_name);
        if let Some(content) = content {
            self.builder.set_source_content(id, content);
        }
        self.builder
            .add_mapping(generated_line, generated_column, id, line, column, name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structural() -> SourceMap {
        // `"a": <code>` on generated line 1 column 7, literal content at 0:7
        let mut builder = SourceMapBuilder::new(None);
        let src = builder.add_source("en.json");
        builder.set_source_content(src, "{\"a\": \"hi {n}\"}");
        builder.add_mapping(1, 7, src, 0, 7, Some("hi {n}"));
        builder.build()
    }

    fn fragment() -> SourceMap {
        let mut builder = SourceMapBuilder::new(None);
        let src = builder.add_source("a");
        builder.add_mapping(0, 0, src, 0, 0, None);
        builder.add_mapping(0, 20, src, 0, 3, None);
        builder.build()
    }

    #[test]
    fn test_structural_only() {
        let merged = merge_source_maps(&structural(), &HashMap::new(), None, "en.json").unwrap();
        let mappings = merged.decode().unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(merged.sources, vec!["en.json".to_string()]);
        assert!(merged.source_content(0).is_some());
    }

    #[test]
    fn test_fragment_offsets_are_translated() {
        let mut code_maps = HashMap::new();
        code_maps.insert("hi {n}".to_string(), fragment());
        let merged = merge_source_maps(&structural(), &code_maps, None, "en.json").unwrap();
        let mappings = merged.decode().unwrap();
        let positions: Vec<_> = mappings
            .iter()
            .map(|m| {
                let o = m.original.unwrap();
                (m.generated_line, m.generated_column, o.line, o.column)
            })
            .collect();
        // the fragment's 0:0 coincides with the structural segment
        assert_eq!(positions, vec![(1, 7, 0, 7), (1, 27, 0, 10)]);
    }

    #[test]
    fn test_inbound_map_reroutes_originals() {
        // the resource text starts at line 4 column 2 of the component file
        let mut builder = SourceMapBuilder::new(None);
        let src = builder.add_source("App.vue");
        builder.add_mapping(0, 0, src, 4, 2, None);
        let inbound = builder.build();

        let merged =
            merge_source_maps(&structural(), &HashMap::new(), Some(&inbound), "en.json").unwrap();
        assert_eq!(merged.sources, vec!["App.vue".to_string()]);
        let original = merged.decode().unwrap()[0].original.unwrap();
        assert_eq!((original.line, original.column), (4, 9));
    }

    #[test]
    fn test_malformed_inbound_map_is_an_error() {
        let inbound = SourceMap {
            mappings: "!!".into(),
            ..SourceMap::empty()
        };
        let err = merge_source_maps(&structural(), &HashMap::new(), Some(&inbound), "en.json")
            .unwrap_err();
        assert!(matches!(err, CompileError::SourceMap { .. }));
    }
}
