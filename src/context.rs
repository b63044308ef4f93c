//! Append-only output buffer for the emitter.
//!
//! Tracks the generated line and UTF-16 column so position-tagged writes can
//! record structural source-map segments.

use crate::sourcemap::{SourceMap, SourceMapBuilder};
use crate::tree::Position;

const INDENT: &str = "  ";

pub struct CodeGenerator {
    code: String,
    /// 0-based
    line: u32,
    column: u32,
    indent_level: usize,
    map: Option<(SourceMapBuilder, u32)>,
}

impl CodeGenerator {
    /// `filename` names the single original source; a map is only built when
    /// `source_map` is set.
    pub fn new(source: &str, filename: &str, source_map: bool) -> Self {
        let map = source_map.then(|| {
            let mut builder = SourceMapBuilder::new(None);
            let id = builder.add_source(filename);
            builder.set_source_content(id, source);
            (builder, id)
        });
        Self {
            code: String::new(),
            line: 0,
            column: 0,
            indent_level: 0,
            map,
        }
    }

    pub fn push(&mut self, code: &str) {
        for c in code.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += c.len_utf16() as u32;
            }
        }
        self.code.push_str(code);
    }

    /// Writes `code` and maps its first character to `original`.
    pub fn push_mapped(&mut self, code: &str, original: Position, name: Option<&str>) {
        if let Some((builder, source)) = self.map.as_mut() {
            builder.add_mapping(
                self.line,
                self.column,
                *source,
                original.line.saturating_sub(1),
                original.column,
                name,
            );
        }
        self.push(code);
    }

    pub fn pushline(&mut self, code: &str) {
        self.push(code);
        self.newline();
    }

    pub fn newline(&mut self) {
        self.push("\n");
        let indent = INDENT.repeat(self.indent_level);
        self.push(&indent);
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
        self.newline();
    }

    pub fn deindent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
        self.newline();
    }

    pub fn finish(self) -> (String, Option<SourceMap>) {
        (self.code, self.map.map(|(builder, _)| builder.build()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indentation() {
        let mut gen = CodeGenerator::new("", "a.json", false);
        gen.push("{");
        gen.indent();
        gen.pushline("\"a\": 1,");
        gen.push("\"b\": 2");
        gen.deindent();
        gen.push("}");
        let (code, map) = gen.finish();
        assert_eq!(code, "{\n  \"a\": 1,\n  \"b\": 2\n}");
        assert!(map.is_none());
    }

    #[test]
    fn test_columns_count_utf16_units() {
        let original = Position::default();
        let mut gen = CodeGenerator::new("", "a.json", true);
        gen.push("\"😀\"");
        gen.push_mapped("x", original, None);
        gen.push("\nab");
        gen.push_mapped("y", original, None);
        let (_, map) = gen.finish();
        let generated: Vec<_> = map
            .unwrap()
            .decode()
            .unwrap()
            .iter()
            .map(|m| (m.generated_line, m.generated_column))
            .collect();
        assert_eq!(generated, vec![(0, 4), (1, 2)]);
    }

    #[test]
    fn test_mapped_push_records_segment() {
        let source = "{\"a\": \"x\"}";
        let mut gen = CodeGenerator::new(source, "en.json", true);
        gen.push("  ");
        let original = Position {
            line: 1,
            column: 7,
            offset: 7,
        };
        gen.push_mapped("\"x\"", original, Some("x"));
        let (_, map) = gen.finish();
        let map = map.unwrap();
        assert_eq!(map.sources, vec!["en.json".to_string()]);
        assert_eq!(map.sources_content, Some(vec![Some(source.to_string())]));
        let mappings = map.decode().unwrap();
        assert_eq!(mappings.len(), 1);
        let original = mappings[0].original.unwrap();
        assert_eq!((mappings[0].generated_column, original.line, original.column), (2, 0, 7));
        assert_eq!(map.name(original.name.unwrap()), Some("x"));
    }
}
