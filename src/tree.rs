//! Generic Tree Model
//!
//! Every front end lowers its own syntax into these nodes so the emitter never
//! needs to know which format a resource came from.
//!
//! ## Traversal
//!
//! `ResourceVisitor` is the single traversal mechanism for resource trees:
//! 1. Traversal order is document order and fixed.
//! 2. Every `enter_*` call is paired with exactly one `leave_*` call.
//! 3. Implementers override hooks; the `walk_*` functions drive recursion.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

// ═══════════════════════════════════════════════════════════════════════════════
// POSITIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// A point in the original resource text.
///
/// `line` is 1-based, `column` counts UTF-16 code units from 0 (the unit
/// source maps use), and `offset` is a byte offset into the source string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// Byte offset → line/column lookup for one source text.
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            source,
            line_starts,
        }
    }

    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = self
            .source
            .get(line_start..offset)
            .map(|text| text.encode_utf16().count())
            .unwrap_or(offset - line_start);
        Position {
            line: line as u32 + 1,
            column: column as u32,
            offset,
        }
    }

    pub fn span(&self, start: usize, end: usize) -> Span {
        Span::new(self.position(start), self.position(end))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Node,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Mapping(Mapping),
    Sequence(Sequence),
    Scalar(Scalar),
    /// Source text kept as-is, e.g. a message function in a plain module.
    Verbatim(Verbatim),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub pairs: Vec<Pair>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    pub key: String,
    pub key_span: Span,
    pub value: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub items: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    pub value: ScalarValue,
    pub span: Span,
    /// Where the literal's content begins, past any opening quote.
    pub content_start: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verbatim {
    pub code: String,
    pub span: Span,
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Mapping(m) => m.span,
            Node::Sequence(s) => s.span,
            Node::Scalar(s) => s.span,
            Node::Verbatim(v) => v.span,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

impl Scalar {
    pub fn new(value: ScalarValue, span: Span) -> Self {
        Self {
            value,
            span,
            content_start: span.start,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl ScalarValue {
    /// JavaScript `String(value)` for the value.
    pub fn to_js_string(&self) -> String {
        match self {
            ScalarValue::String(s) => s.clone(),
            ScalarValue::Number(n) => format_number(*n),
            ScalarValue::Bool(b) => b.to_string(),
            ScalarValue::Null => "null".to_string(),
        }
    }

    /// JavaScript literal text for the value.
    pub fn to_js_literal(&self) -> String {
        match self {
            ScalarValue::String(s) => serde_json::to_string(s).unwrap_or_else(|_| "\"\"".into()),
            other => other.to_js_string(),
        }
    }
}

/// Formats a number the way JavaScript prints it for the common cases.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        if n == 0.0 {
            "0".to_string()
        } else {
            format!("{:.0}", n)
        }
    } else {
        format!("{}", n)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MATERIALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

impl Document {
    /// Resolves the tree to a plain value. Verbatim nodes have no data form and
    /// materialize as their source text; writers that must keep them go
    /// through the tree instead (see `module::serialize`).
    pub fn materialize(&self) -> Value {
        materialize_node(&self.root)
    }
}

pub fn materialize_node(node: &Node) -> Value {
    match node {
        Node::Mapping(m) => {
            let mut map = Map::new();
            for pair in &m.pairs {
                map.insert(pair.key.clone(), materialize_node(&pair.value));
            }
            Value::Object(map)
        }
        Node::Sequence(s) => Value::Array(s.items.iter().map(materialize_node).collect()),
        Node::Scalar(s) => match &s.value {
            ScalarValue::String(v) => Value::String(v.clone()),
            ScalarValue::Number(n) => number_value(*n),
            ScalarValue::Bool(b) => Value::Bool(*b),
            ScalarValue::Null => Value::Null,
        },
        Node::Verbatim(v) => Value::String(v.code.clone()),
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRAVERSAL
// ═══════════════════════════════════════════════════════════════════════════════

pub trait ResourceVisitor {
    type Error;

    fn enter_document(&mut self, _document: &Document) -> Result<(), Self::Error> {
        Ok(())
    }

    fn leave_document(&mut self, _document: &Document) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_mapping(&mut self, _mapping: &Mapping) -> Result<(), Self::Error> {
        Ok(())
    }

    fn leave_mapping(&mut self, _mapping: &Mapping) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_pair(&mut self, _pair: &Pair) -> Result<(), Self::Error> {
        Ok(())
    }

    fn leave_pair(&mut self, _pair: &Pair) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_sequence(&mut self, _sequence: &Sequence) -> Result<(), Self::Error> {
        Ok(())
    }

    fn leave_sequence(&mut self, _sequence: &Sequence) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_item(&mut self, _index: usize, _item: &Node) -> Result<(), Self::Error> {
        Ok(())
    }

    fn leave_item(&mut self, _index: usize, _item: &Node) -> Result<(), Self::Error> {
        Ok(())
    }

    // Leaf nodes, nothing to walk
    fn visit_scalar(&mut self, _scalar: &Scalar) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_verbatim(&mut self, _verbatim: &Verbatim) -> Result<(), Self::Error> {
        Ok(())
    }
}

pub fn walk_document<V: ResourceVisitor + ?Sized>(
    visitor: &mut V,
    document: &Document,
) -> Result<(), V::Error> {
    visitor.enter_document(document)?;
    walk_node(visitor, &document.root)?;
    visitor.leave_document(document)
}

pub fn walk_node<V: ResourceVisitor + ?Sized>(visitor: &mut V, node: &Node) -> Result<(), V::Error> {
    match node {
        Node::Mapping(m) => walk_mapping(visitor, m),
        Node::Sequence(s) => walk_sequence(visitor, s),
        Node::Scalar(s) => visitor.visit_scalar(s),
        Node::Verbatim(v) => visitor.visit_verbatim(v),
    }
}

pub fn walk_mapping<V: ResourceVisitor + ?Sized>(
    visitor: &mut V,
    mapping: &Mapping,
) -> Result<(), V::Error> {
    visitor.enter_mapping(mapping)?;
    for pair in &mapping.pairs {
        visitor.enter_pair(pair)?;
        walk_node(visitor, &pair.value)?;
        visitor.leave_pair(pair)?;
    }
    visitor.leave_mapping(mapping)
}

pub fn walk_sequence<V: ResourceVisitor + ?Sized>(
    visitor: &mut V,
    sequence: &Sequence,
) -> Result<(), V::Error> {
    visitor.enter_sequence(sequence)?;
    for (index, item) in sequence.items.iter().enumerate() {
        visitor.enter_item(index, item)?;
        walk_node(visitor, item)?;
        visitor.leave_item(index, item)?;
    }
    visitor.leave_sequence(sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index_positions() {
        let index = LineIndex::new("ab\ncd\n€x");
        assert_eq!(index.position(0).line, 1);
        assert_eq!(index.position(4).line, 2);
        assert_eq!(index.position(4).column, 1);
        // '€' is 3 bytes but a single UTF-16 unit
        let x = index.position(9);
        assert_eq!((x.line, x.column), (3, 1));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(1e3), "1000");
    }

    #[test]
    fn test_materialize_keeps_source_order() {
        let span = Span::default();
        let doc = Document {
            filename: "a.json".into(),
            root: Node::Mapping(Mapping {
                span,
                pairs: vec![
                    Pair {
                        key: "z".into(),
                        key_span: span,
                        value: Node::Scalar(Scalar::new(ScalarValue::Number(1.0), span)),
                    },
                    Pair {
                        key: "a".into(),
                        key_span: span,
                        value: Node::Scalar(Scalar::new(ScalarValue::Bool(true), span)),
                    },
                ],
            }),
        };
        assert_eq!(
            serde_json::to_string(&doc.materialize()).unwrap(),
            r#"{"z":1,"a":true}"#
        );
    }
}
