//! YAML front end.
//!
//! Built on the marked event stream of `yaml-rust2` so every node keeps its
//! source position. Only the first document of a stream is the resource.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

use crate::error::CompileError;
use crate::tree::{
    Document, LineIndex, Mapping, Node, Pair, Position, Scalar, ScalarValue, Sequence, Span,
};

lazy_static! {
    static ref INT_RE: Regex = Regex::new(r"^[-+]?[0-9]+$").unwrap();
    static ref OCT_RE: Regex = Regex::new(r"^0o[0-7]+$").unwrap();
    static ref HEX_RE: Regex = Regex::new(r"^0x[0-9a-fA-F]+$").unwrap();
    static ref FLOAT_RE: Regex =
        Regex::new(r"^[-+]?(\.[0-9]+|[0-9]+(\.[0-9]*)?)([eE][-+]?[0-9]+)?$").unwrap();
}

pub fn parse(source: &str, filename: &str) -> Result<Document, CompileError> {
    let index = LineIndex::new(source);
    let char_offsets: Vec<usize> = source.char_indices().map(|(i, _)| i).collect();
    let mut builder = TreeBuilder {
        source,
        index: &index,
        char_offsets: &char_offsets,
        stack: Vec::new(),
        anchors: HashMap::new(),
        root: None,
        error: None,
        filename,
    };

    let mut parser = Parser::new_from_str(source);
    parser.load(&mut builder, false).map_err(|e| {
        let offset = builder.byte_offset(e.marker().index());
        CompileError::parse(filename, e.info().to_string(), Some(index.span(offset, offset)))
    })?;
    if let Some(err) = builder.error.take() {
        return Err(err);
    }

    let root = builder.root.take().unwrap_or_else(|| {
        Node::Mapping(Mapping {
            pairs: Vec::new(),
            span: Span::default(),
        })
    });
    Ok(Document {
        root,
        filename: filename.to_string(),
    })
}

enum Frame {
    Mapping {
        start: Position,
        anchor: usize,
        pairs: Vec<Pair>,
        pending_key: Option<(String, Span)>,
    },
    Sequence {
        start: Position,
        anchor: usize,
        items: Vec<Node>,
    },
}

struct TreeBuilder<'a> {
    source: &'a str,
    index: &'a LineIndex<'a>,
    char_offsets: &'a [usize],
    stack: Vec<Frame>,
    anchors: HashMap<usize, Node>,
    root: Option<Node>,
    error: Option<CompileError>,
    filename: &'a str,
}

impl<'a> TreeBuilder<'a> {
    fn byte_offset(&self, char_index: usize) -> usize {
        self.char_offsets
            .get(char_index)
            .copied()
            .unwrap_or(self.source.len())
    }

    fn position(&self, mark: &Marker) -> Position {
        self.index.position(self.byte_offset(mark.index()))
    }

    /// Scalar markers sit on the first character of the token; quoted
    /// scalars end at the closing quote on the same line for the common case.
    fn scalar_span(&self, mark: &Marker, value: &str, style: TScalarStyle) -> (Span, Position) {
        let start = self.byte_offset(mark.index());
        let (content_start, len) = match style {
            TScalarStyle::SingleQuoted | TScalarStyle::DoubleQuoted => {
                let rest = &self.source[start.min(self.source.len())..];
                let raw = rest.find('\n').map_or(rest, |end| &rest[..end]);
                let quote = raw.chars().next().unwrap_or('"');
                let closing = raw
                    .get(1..)
                    .and_then(|tail| tail.find(quote))
                    .map(|i| i + 2)
                    .unwrap_or(raw.len());
                (start + 1, closing)
            }
            TScalarStyle::Plain => (start, value.len()),
            _ => (start, 1),
        };
        let end = (start + len).min(self.source.len());
        (
            self.index.span(start, end),
            self.index.position(content_start.min(self.source.len())),
        )
    }

    fn insert(&mut self, node: Node, anchor: usize) {
        if anchor > 0 {
            self.anchors.insert(anchor, node.clone());
        }
        match self.stack.last_mut() {
            Some(Frame::Sequence { items, .. }) => items.push(node),
            Some(Frame::Mapping {
                pairs, pending_key, ..
            }) => match pending_key.take() {
                Some((key, key_span)) => pairs.push(Pair {
                    key,
                    key_span,
                    value: node,
                }),
                None => match key_text(&node) {
                    Some(key) => *pending_key = Some((key, node.span())),
                    None => {
                        if self.error.is_none() {
                            self.error = Some(CompileError::parse(
                                self.filename,
                                "mapping keys must be scalars",
                                Some(node.span()),
                            ));
                        }
                    }
                },
            },
            None => {
                if self.root.is_none() {
                    self.root = Some(node);
                }
            }
        }
    }
}

impl MarkedEventReceiver for TreeBuilder<'_> {
    fn on_event(&mut self, ev: Event, mark: Marker) {
        // only the first document is the resource
        if self.error.is_some() || (self.root.is_some() && self.stack.is_empty()) {
            return;
        }
        match ev {
            Event::MappingStart(anchor, _) => self.stack.push(Frame::Mapping {
                start: self.position(&mark),
                anchor,
                pairs: Vec::new(),
                pending_key: None,
            }),
            Event::SequenceStart(anchor, _) => self.stack.push(Frame::Sequence {
                start: self.position(&mark),
                anchor,
                items: Vec::new(),
            }),
            Event::MappingEnd | Event::SequenceEnd => {
                let end = self.position(&mark);
                match self.stack.pop() {
                    Some(Frame::Mapping {
                        start,
                        anchor,
                        pairs,
                        ..
                    }) => {
                        let node = Node::Mapping(Mapping {
                            pairs,
                            span: Span::new(start, end),
                        });
                        self.insert(node, anchor);
                    }
                    Some(Frame::Sequence {
                        start,
                        anchor,
                        items,
                    }) => {
                        let node = Node::Sequence(Sequence {
                            items,
                            span: Span::new(start, end),
                        });
                        self.insert(node, anchor);
                    }
                    None => {}
                }
            }
            Event::Scalar(value, style, anchor, _) => {
                let (span, content_start) = self.scalar_span(&mark, &value, style);
                let value = if style == TScalarStyle::Plain {
                    resolve_plain(&value)
                } else {
                    ScalarValue::String(value)
                };
                self.insert(
                    Node::Scalar(Scalar {
                        value,
                        span,
                        content_start,
                    }),
                    anchor,
                );
            }
            Event::Alias(id) => match self.anchors.get(&id).cloned() {
                Some(node) => self.insert(node, 0),
                None => {
                    let offset = self.byte_offset(mark.index());
                    self.error = Some(CompileError::parse(
                        self.filename,
                        "unknown alias",
                        Some(self.index.span(offset, offset)),
                    ));
                }
            },
            _ => {}
        }
    }
}

fn key_text(node: &Node) -> Option<String> {
    match node {
        Node::Scalar(s) => Some(s.value.to_js_string()),
        _ => None,
    }
}

/// YAML 1.2 core schema resolution for plain scalars.
fn resolve_plain(value: &str) -> ScalarValue {
    match value {
        "" | "~" | "null" | "Null" | "NULL" => return ScalarValue::Null,
        "true" | "True" | "TRUE" => return ScalarValue::Bool(true),
        "false" | "False" | "FALSE" => return ScalarValue::Bool(false),
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => {
            return ScalarValue::Number(f64::INFINITY)
        }
        "-.inf" | "-.Inf" | "-.INF" => return ScalarValue::Number(f64::NEG_INFINITY),
        ".nan" | ".NaN" | ".NAN" => return ScalarValue::Number(f64::NAN),
        _ => {}
    }
    if INT_RE.is_match(value) || FLOAT_RE.is_match(value) {
        if let Ok(n) = value.parse::<f64>() {
            return ScalarValue::Number(n);
        }
    }
    if OCT_RE.is_match(value) {
        if let Ok(n) = i64::from_str_radix(&value[2..], 8) {
            return ScalarValue::Number(n as f64);
        }
    }
    if HEX_RE.is_match(value) {
        if let Ok(n) = i64::from_str_radix(&value[2..], 16) {
            return ScalarValue::Number(n as f64);
        }
    }
    ScalarValue::String(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(source: &str) -> Mapping {
        match parse(source, "test.yaml").unwrap().root {
            Node::Mapping(m) => m,
            other => panic!("expected mapping, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_mapping_and_sequence() {
        let m = mapping("en:\n  hello: world\n  list:\n    - a\n    - b\n");
        let Node::Mapping(en) = &m.pairs[0].value else { panic!("expected mapping") };
        assert_eq!(en.pairs[0].key, "hello");
        assert_eq!(en.pairs[0].value.as_scalar().unwrap().as_str(), Some("world"));
        let Node::Sequence(list) = &en.pairs[1].value else { panic!("expected sequence") };
        assert_eq!(list.items.len(), 2);
    }

    #[test]
    fn test_scalar_positions() {
        let m = mapping("a: hello\nb: 'quoted'\n");
        let a = m.pairs[0].value.as_scalar().unwrap();
        assert_eq!((a.span.start.line, a.span.start.column), (1, 3));
        assert_eq!(a.content_start.column, 3);
        let b = m.pairs[1].value.as_scalar().unwrap();
        assert_eq!((b.span.start.line, b.span.start.column), (2, 3));
        assert_eq!(b.content_start.column, 4);
    }

    #[test]
    fn test_core_schema_resolution() {
        let m = mapping("n: 5\nf: 1.5\nb: true\nz: ~\ns: '5'\nh: 0x10\n");
        let values: Vec<_> = m
            .pairs
            .iter()
            .map(|p| p.value.as_scalar().unwrap().value.clone())
            .collect();
        assert_eq!(
            values,
            vec![
                ScalarValue::Number(5.0),
                ScalarValue::Number(1.5),
                ScalarValue::Bool(true),
                ScalarValue::Null,
                ScalarValue::String("5".into()),
                ScalarValue::Number(16.0),
            ]
        );
    }

    #[test]
    fn test_numeric_keys_are_stringified() {
        let m = mapping("1: one\n");
        assert_eq!(m.pairs[0].key, "1");
    }

    #[test]
    fn test_alias_expands_anchor() {
        let m = mapping("base: &b\n  x: 1\ncopy: *b\n");
        assert_eq!(m.pairs[0].value.clone(), m.pairs[1].value.clone());
    }

    #[test]
    fn test_empty_stream_is_empty_mapping() {
        assert!(mapping("").pairs.is_empty());
    }

    #[test]
    fn test_syntax_error_has_position() {
        let err = parse("a: [1, 2\n", "bad.yaml").unwrap_err();
        assert!(matches!(err, CompileError::Parse { .. }));
        assert!(err.span().is_some());
        assert!(err.to_string().starts_with("bad.yaml:"));
    }
}
