//! Plain-module front end (`.js`, `.mjs`, `.cjs`, `.ts`).
//!
//! The module is parsed with Oxc; only the object literal behind
//! `export default` is the resource. Imports and type declarations are
//! skipped silently, any other top-level statement is ignored with a warning.

use oxc_allocator::Allocator;
use oxc_ast::ast::{Expression, ObjectPropertyKind, PropertyKey, PropertyKind, Statement};
use oxc_diagnostics::OxcDiagnostic;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use oxc_syntax::operator::UnaryOperator;

use crate::context::CodeGenerator;
use crate::error::{CompileError, Diagnostics};
use crate::tree::{
    format_number, Document, LineIndex, Mapping, Node, Pair, Scalar, ScalarValue, Sequence, Span,
    Verbatim,
};

pub fn parse(
    source: &str,
    filename: &str,
    diagnostics: &dyn Diagnostics,
) -> Result<Document, CompileError> {
    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_module(true)
        .with_typescript(is_typescript(filename));
    let ret = Parser::new(&allocator, source, source_type).parse();
    let lowering = Lowering::new(source, filename, Dialect::Module);

    if !ret.errors.is_empty() {
        return Err(lowering.syntax_error(&ret.errors));
    }

    let mut resource = None;
    for stmt in &ret.program.body {
        match stmt {
            Statement::ExportDefaultDeclaration(decl) => {
                resource = Some((decl.declaration.as_expression(), decl.span));
            }
            Statement::ImportDeclaration(_)
            | Statement::TSTypeAliasDeclaration(_)
            | Statement::TSInterfaceDeclaration(_) => {}
            other => {
                let at = lowering.index.position(other.span().start as usize);
                diagnostics.warn(&format!(
                    "{}:{}:{}: statement outside the default export is ignored",
                    filename,
                    at.line,
                    at.column + 1
                ));
            }
        }
    }

    let root = match resource {
        Some((Some(expr), _)) => match unwrap_expression(expr) {
            Expression::ObjectExpression(_) => lowering.lower(expr)?,
            other => {
                return Err(lowering.unsupported(
                    "the default export must be an object literal",
                    other.span(),
                ))
            }
        },
        Some((None, span)) => {
            return Err(lowering.unsupported("the default export must be an object literal", span))
        }
        None => {
            return Err(CompileError::unsupported_shape(
                filename,
                "no `export default` object literal found",
                None,
            ))
        }
    };

    Ok(Document {
        root,
        filename: filename.to_string(),
    })
}

/// Writes a resource tree back out as a module. Verbatim nodes keep their
/// code, so message functions survive a round trip.
pub fn serialize(document: &Document) -> String {
    let mut gen = CodeGenerator::new("", &document.filename, false);
    gen.push("export default ");
    write_node(&mut gen, &document.root);
    gen.push("\n");
    gen.finish().0
}

fn write_node(gen: &mut CodeGenerator, node: &Node) {
    match node {
        Node::Mapping(m) if m.pairs.is_empty() => gen.push("{}"),
        Node::Mapping(m) => {
            gen.push("{");
            gen.indent();
            for (i, pair) in m.pairs.iter().enumerate() {
                if i > 0 {
                    gen.pushline(",");
                }
                gen.push(&ScalarValue::String(pair.key.clone()).to_js_literal());
                gen.push(": ");
                write_node(gen, &pair.value);
            }
            gen.deindent();
            gen.push("}");
        }
        Node::Sequence(s) if s.items.is_empty() => gen.push("[]"),
        Node::Sequence(s) => {
            gen.push("[");
            gen.indent();
            for (i, item) in s.items.iter().enumerate() {
                if i > 0 {
                    gen.pushline(",");
                }
                write_node(gen, item);
            }
            gen.deindent();
            gen.push("]");
        }
        Node::Scalar(s) => gen.push(&s.value.to_js_literal()),
        Node::Verbatim(v) => gen.push(&v.code),
    }
}

fn is_typescript(filename: &str) -> bool {
    filename.ends_with(".ts") || filename.ends_with(".mts") || filename.ends_with(".cts")
}

/// Strips wrappers that don't change the runtime value.
fn unwrap_expression<'a, 'b>(expr: &'b Expression<'a>) -> &'b Expression<'a> {
    match expr {
        Expression::ParenthesizedExpression(e) => unwrap_expression(&e.expression),
        Expression::TSAsExpression(e) => unwrap_expression(&e.expression),
        Expression::TSSatisfiesExpression(e) => unwrap_expression(&e.expression),
        _ => expr,
    }
}

/// Which value grammar a lowering accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    /// Module exports: adds wrappers, template literals, numeric keys and
    /// verbatim functions. Rejections are `UnsupportedShape`.
    Module,
    /// JSON5 data. Rejections are parse errors.
    Json5,
}

/// Lowers an Oxc expression into a resource tree.
pub(crate) struct Lowering<'s> {
    source: &'s str,
    index: LineIndex<'s>,
    filename: &'s str,
    dialect: Dialect,
}

impl<'s> Lowering<'s> {
    pub(crate) fn new(source: &'s str, filename: &'s str, dialect: Dialect) -> Self {
        Self {
            source,
            index: LineIndex::new(source),
            filename,
            dialect,
        }
    }

    fn span(&self, span: oxc_span::Span) -> Span {
        self.index.span(span.start as usize, span.end as usize)
    }

    /// The first parser diagnostic, positioned at its primary label.
    pub(crate) fn syntax_error(&self, errors: &[OxcDiagnostic]) -> CompileError {
        let Some(error) = errors.first() else {
            return CompileError::parse(self.filename, "invalid syntax", None);
        };
        let offset = error
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| label.offset())
            .unwrap_or(0);
        CompileError::parse(
            self.filename,
            error.to_string(),
            Some(self.index.span(offset, offset)),
        )
    }

    pub(crate) fn error_at(&self, message: &str, offset: usize) -> CompileError {
        CompileError::parse(self.filename, message, Some(self.index.span(offset, offset)))
    }

    fn unsupported(&self, message: &str, span: oxc_span::Span) -> CompileError {
        match self.dialect {
            Dialect::Module => {
                CompileError::unsupported_shape(self.filename, message, Some(self.span(span)))
            }
            Dialect::Json5 => CompileError::parse(self.filename, message, Some(self.span(span))),
        }
    }

    fn string(&self, value: String, span: oxc_span::Span) -> Node {
        Node::Scalar(Scalar {
            value: ScalarValue::String(value),
            span: self.span(span),
            content_start: self.index.position(span.start as usize + 1),
        })
    }

    fn scalar(&self, value: ScalarValue, span: oxc_span::Span) -> Node {
        Node::Scalar(Scalar::new(value, self.span(span)))
    }

    /// Numeric literals plus the `Infinity` and `NaN` globals.
    fn number(&self, expr: &Expression) -> Option<f64> {
        match expr {
            Expression::NumericLiteral(lit) => Some(lit.value),
            Expression::Identifier(id) if id.name == "Infinity" => Some(f64::INFINITY),
            Expression::Identifier(id) if id.name == "NaN" => Some(f64::NAN),
            Expression::ParenthesizedExpression(e) if self.dialect == Dialect::Module => {
                self.number(&e.expression)
            }
            _ => None,
        }
    }

    pub(crate) fn lower(&self, expr: &Expression) -> Result<Node, CompileError> {
        let module = self.dialect == Dialect::Module;
        let expr = if module { unwrap_expression(expr) } else { expr };
        let span = expr.span();
        match expr {
            Expression::ObjectExpression(obj) => {
                let mut pairs = Vec::with_capacity(obj.properties.len());
                for prop in &obj.properties {
                    let ObjectPropertyKind::ObjectProperty(p) = prop else {
                        return Err(self.unsupported("spread properties are not static", prop.span()));
                    };
                    if p.computed || p.method || p.shorthand || !matches!(p.kind, PropertyKind::Init) {
                        return Err(self.unsupported(
                            "computed, shorthand, method and accessor properties are not static",
                            p.span,
                        ));
                    }
                    let key = match &p.key {
                        PropertyKey::StaticIdentifier(id) => id.name.to_string(),
                        PropertyKey::StringLiteral(s) => s.value.to_string(),
                        PropertyKey::NumericLiteral(n) if module => format_number(n.value),
                        other => {
                            return Err(self.unsupported("unsupported property key", other.span()))
                        }
                    };
                    pairs.push(Pair {
                        key,
                        key_span: self.span(p.key.span()),
                        value: self.lower(&p.value)?,
                    });
                }
                Ok(Node::Mapping(Mapping {
                    pairs,
                    span: self.span(span),
                }))
            }
            Expression::ArrayExpression(arr) => {
                let mut items = Vec::with_capacity(arr.elements.len());
                for element in &arr.elements {
                    match element.as_expression() {
                        Some(e) => items.push(self.lower(e)?),
                        None => {
                            return Err(self.unsupported(
                                "array holes and spreads are not static",
                                arr.span,
                            ))
                        }
                    }
                }
                Ok(Node::Sequence(Sequence {
                    items,
                    span: self.span(span),
                }))
            }
            Expression::StringLiteral(lit) => Ok(self.string(lit.value.to_string(), span)),
            Expression::TemplateLiteral(tpl) if module && tpl.expressions.is_empty() => {
                let text = tpl
                    .quasis
                    .first()
                    .map(|q| match &q.value.cooked {
                        Some(cooked) => cooked.to_string(),
                        None => q.value.raw.to_string(),
                    })
                    .unwrap_or_default();
                Ok(self.string(text, span))
            }
            Expression::BooleanLiteral(lit) => Ok(self.scalar(ScalarValue::Bool(lit.value), span)),
            Expression::NullLiteral(_) => Ok(self.scalar(ScalarValue::Null, span)),
            Expression::UnaryExpression(unary)
                if matches!(
                    unary.operator,
                    UnaryOperator::UnaryNegation | UnaryOperator::UnaryPlus
                ) =>
            {
                match self.number(&unary.argument) {
                    Some(n) if unary.operator == UnaryOperator::UnaryNegation => {
                        Ok(self.scalar(ScalarValue::Number(-n), span))
                    }
                    Some(n) => Ok(self.scalar(ScalarValue::Number(n), span)),
                    None => Err(self.unsupported("value is not a static literal", span)),
                }
            }
            // runtime message functions are kept as written
            Expression::ArrowFunctionExpression(_) | Expression::FunctionExpression(_) if module => {
                Ok(Node::Verbatim(Verbatim {
                    code: self.source[span.start as usize..span.end as usize].to_string(),
                    span: self.span(span),
                }))
            }
            other => match self.number(other) {
                Some(n) => Ok(self.scalar(ScalarValue::Number(n), span)),
                None => Err(self.unsupported("value is not a static literal", span)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TracingDiagnostics;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl Diagnostics for Collect {
        fn warn(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    fn parse_module(source: &str) -> Result<Document, CompileError> {
        parse(source, "en.js", &TracingDiagnostics)
    }

    #[test]
    fn test_default_export_object() {
        let doc = parse_module(
            "import x from './x'\nexport default {\n  hello: 'world',\n  'quoted-key': `tpl`,\n  n: -1,\n  list: [true, null],\n}\n",
        )
        .unwrap();
        let Node::Mapping(m) = doc.root else { panic!("expected mapping") };
        let keys: Vec<_> = m.pairs.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, ["hello", "quoted-key", "n", "list"]);
        let hello = m.pairs[0].value.as_scalar().unwrap();
        assert_eq!(hello.as_str(), Some("world"));
        assert_eq!((hello.span.start.line, hello.span.start.column), (3, 9));
        assert_eq!(hello.content_start.column, 10);
        assert_eq!(m.pairs[1].value.as_scalar().unwrap().as_str(), Some("tpl"));
        assert_eq!(
            m.pairs[2].value.as_scalar().unwrap().value,
            ScalarValue::Number(-1.0)
        );
    }

    #[test]
    fn test_typescript_wrappers() {
        let doc = parse("export default ({ a: 'b' } as const)", "en.ts", &TracingDiagnostics).unwrap();
        assert!(matches!(doc.root, Node::Mapping(_)));
        let doc = parse(
            "type M = Record<string, string>\nexport default { a: 'b' } satisfies M",
            "en.ts",
            &TracingDiagnostics,
        )
        .unwrap();
        assert!(matches!(doc.root, Node::Mapping(_)));
    }

    #[test]
    fn test_functions_are_verbatim() {
        let doc = parse_module("export default { fn: (ctx) => `x${ctx.n}` }").unwrap();
        let Node::Mapping(m) = doc.root else { panic!("expected mapping") };
        match &m.pairs[0].value {
            Node::Verbatim(v) => assert_eq!(v.code, "(ctx) => `x${ctx.n}`"),
            other => panic!("expected verbatim, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_default_export_is_unsupported() {
        let err = parse_module("export const messages = { a: 'b' }").unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedShape { .. }));
        let err = parse_module("export default defineMessages({ a: 'b' })").unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedShape { .. }));
    }

    #[test]
    fn test_dynamic_values_are_unsupported() {
        let err = parse_module("const x = 'a'\nexport default { x }").unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedShape { .. }));
        let err = parse_module("export default { ...base }").unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedShape { .. }));
    }

    #[test]
    fn test_other_statements_warn() {
        let collect = Collect::default();
        parse("const unused = 1\nexport default { a: 'b' }", "en.js", &collect).unwrap();
        let warnings = collect.0.lock().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("en.js:1:1"));
    }

    #[test]
    fn test_serialize_keeps_functions() {
        let source = "export default {\n  en: { fn: (ctx) => ctx.named('n'), s: 'x' },\n  list: [1, -Infinity],\n}";
        let doc = parse_module(source).unwrap();
        let text = serialize(&doc);
        assert_eq!(
            text,
            concat!(
                "export default {\n",
                "  \"en\": {\n",
                "    \"fn\": (ctx) => ctx.named('n'),\n",
                "    \"s\": \"x\"\n",
                "  },\n",
                "  \"list\": [\n",
                "    1,\n",
                "    -Infinity\n",
                "  ]\n",
                "}\n"
            )
        );
        let reparsed = parse_module(&text).unwrap();
        assert_eq!(reparsed.materialize(), doc.materialize());
        let Node::Mapping(root) = reparsed.root else { panic!("expected mapping") };
        let Node::Mapping(en) = &root.pairs[0].value else { panic!("expected mapping") };
        assert!(matches!(en.pairs[0].value, Node::Verbatim(_)));
    }

    #[test]
    fn test_syntax_error() {
        let err = parse_module("export default { a: }").unwrap_err();
        assert!(matches!(err, CompileError::Parse { .. }));
    }
}
