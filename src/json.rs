//! JSON / JSON5 front end.
//!
//! JSON5 text is an ECMAScript expression, so the document is parsed by Oxc
//! as one expression and lowered with the module lowering restricted to data:
//! no functions, template literals, parentheses or numeric keys.

use oxc_allocator::Allocator;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};

use crate::error::CompileError;
use crate::module::{Dialect, Lowering};
use crate::tree::Document;

pub fn parse(source: &str, filename: &str) -> Result<Document, CompileError> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let lowering = Lowering::new(source, filename, Dialect::Json5);

    let expr = Parser::new(&allocator, source, source_type)
        .parse_expression()
        .map_err(|errors| lowering.syntax_error(&errors))?;

    // the expression parser stops after one expression; only trivia may follow
    let end = expr.span().end as usize;
    let rest = &source[end..];
    let trailing = Parser::new(&allocator, rest, source_type).parse();
    if !trailing.errors.is_empty()
        || !trailing.program.body.is_empty()
        || !trailing.program.directives.is_empty()
    {
        let offset = end + (rest.len() - rest.trim_start().len());
        return Err(lowering.error_at("unexpected trailing content", offset));
    }

    Ok(Document {
        root: lowering.lower(&expr)?,
        filename: filename.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Node, ScalarValue};

    fn root(source: &str) -> Node {
        parse(source, "test.json").unwrap().root
    }

    #[test]
    fn test_parse_nested_with_positions() {
        let node = root("{\n  \"en\": {\n    \"hello\": \"world\"\n  }\n}");
        let Node::Mapping(m) = node else { panic!("expected mapping") };
        assert_eq!(m.pairs[0].key, "en");
        let Node::Mapping(inner) = &m.pairs[0].value else { panic!("expected mapping") };
        let scalar = inner.pairs[0].value.as_scalar().unwrap();
        assert_eq!(scalar.as_str(), Some("world"));
        assert_eq!(scalar.span.start.line, 3);
        assert_eq!(scalar.span.start.column, 13);
        assert_eq!(scalar.content_start.column, 14);
    }

    #[test]
    fn test_json5_syntax() {
        let node = root(
            "// comment\n{unquoted: 'single', /* block */ hex: 0x1F, half: .5, pos: +1, inf: -Infinity, list: [1, 2,],}",
        );
        let Node::Mapping(m) = node else { panic!("expected mapping") };
        let values: Vec<_> = m.pairs.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(values, ["unquoted", "hex", "half", "pos", "inf", "list"]);
        assert_eq!(
            m.pairs[1].value.as_scalar().unwrap().value,
            ScalarValue::Number(31.0)
        );
        assert_eq!(
            m.pairs[2].value.as_scalar().unwrap().value,
            ScalarValue::Number(0.5)
        );
        assert_eq!(
            m.pairs[4].value.as_scalar().unwrap().value,
            ScalarValue::Number(f64::NEG_INFINITY)
        );
        let Node::Sequence(list) = &m.pairs[5].value else { panic!("expected sequence") };
        assert_eq!(list.items.len(), 2);
    }

    #[test]
    fn test_string_escapes() {
        let node = root(r#"{"a": "line\nnext é 😀 \"q\""}"#);
        let Node::Mapping(m) = node else { panic!("expected mapping") };
        assert_eq!(
            m.pairs[0].value.as_scalar().unwrap().as_str(),
            Some("line\nnext é 😀 \"q\"")
        );
    }

    #[test]
    fn test_errors_carry_position() {
        let err = parse("{\n  \"a\": 1,,\n}", "bad.json").unwrap_err();
        match err {
            CompileError::Parse { filename, span, .. } => {
                assert_eq!(filename, "bad.json");
                let span = span.unwrap();
                assert_eq!((span.start.line, span.start.column), (2, 9));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(parse("", "empty.json").is_err());
        assert!(parse("{\"a\": \"open", "open.json").is_err());
        assert!(parse("{} {}", "two.json").is_err());
        assert!(parse("{} \"x\"", "two.json").is_err());
    }

    #[test]
    fn test_trailing_comments_are_trivia() {
        let node = root("{\"a\": 1} // done\n/* end */\n");
        assert!(matches!(node, Node::Mapping(_)));
    }

    #[test]
    fn test_code_is_rejected_as_parse_error() {
        for source in [
            "{\"f\": () => 1}",
            "{\"t\": `x`}",
            "{\"v\": undefined}",
            "({\"a\": 1})",
            "{1: \"a\"}",
        ] {
            match parse(source, "code.json") {
                Err(CompileError::Parse { .. }) => {}
                other => panic!("{}: unexpected {:?}", source, other.map(|d| d.root)),
            }
        }
    }

    #[test]
    fn test_signed_special_numbers() {
        let node = root("[+1, -0x10, NaN, +Infinity]");
        let Node::Sequence(list) = node else { panic!("expected sequence") };
        let values: Vec<_> = list
            .items
            .iter()
            .map(|item| match item.as_scalar().unwrap().value {
                ScalarValue::Number(n) => n,
                ref other => panic!("expected number, got {:?}", other),
            })
            .collect();
        assert_eq!(values[0], 1.0);
        assert_eq!(values[1], -16.0);
        assert!(values[2].is_nan());
        assert_eq!(values[3], f64::INFINITY);
    }
}
