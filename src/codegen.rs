//! Tree walker / emitter
//!
//! Walks a resource tree and writes the generated module through a
//! [`CodeGenerator`]. String leaves go through the message compiler; the
//! fragment maps it returns are collected per literal value for the merger.

use std::collections::HashMap;

use crate::context::CodeGenerator;
use crate::error::{CompileError, Diagnostics, ErrorContext};
use crate::legacy;
use crate::message::MessageCompiler;
use crate::options::GenerateOptions;
use crate::sourcemap::{SourceMap, SourceMapBuilder};
use crate::tree::{
    walk_document, Document, Mapping, Node, Pair, ResourceVisitor, Scalar, ScalarValue, Sequence,
    Verbatim,
};

const COMPONENT_NAMESPACE: &str = "_Component";

/// Produces the side-channel payload registered by bridge component output.
pub type BridgeInjector = dyn Fn() -> String + Send + Sync;

// ═══════════════════════════════════════════════════════════════════════════════
// INPUT/OUTPUT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// External collaborators the walker calls into.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub compiler: &'a dyn MessageCompiler,
    pub diagnostics: &'a dyn Diagnostics,
    pub bridge_injector: Option<&'a BridgeInjector>,
}

#[derive(Debug, Clone)]
pub struct Emission {
    pub code: String,
    /// Structural map; `None` unless `sourceMap` is enabled.
    pub map: Option<SourceMap>,
    /// Fragment maps keyed by literal value. Equal literals share one entry.
    pub code_maps: HashMap<String, SourceMap>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EMIT
// ═══════════════════════════════════════════════════════════════════════════════

pub fn emit(
    document: &Document,
    source: &str,
    options: &GenerateOptions,
    collaborators: Collaborators<'_>,
) -> Result<Emission, CompileError> {
    let mut emitter = Emitter {
        gen: CodeGenerator::new(source, &document.filename, options.source_map),
        options,
        collaborators,
        source,
        filename: &document.filename,
        path: Vec::new(),
        props_count: Vec::new(),
        items_count: Vec::new(),
        code_maps: HashMap::new(),
    };
    walk_document(&mut emitter, document)?;
    debug_assert!(emitter.path.is_empty());

    let (code, map) = emitter.gen.finish();
    Ok(Emission {
        code,
        map,
        code_maps: emitter.code_maps,
    })
}

struct Emitter<'a> {
    gen: CodeGenerator,
    options: &'a GenerateOptions,
    collaborators: Collaborators<'a>,
    source: &'a str,
    filename: &'a str,
    /// Keys and indices from the root to the current node.
    path: Vec<String>,
    /// Remaining pairs of each open non-empty mapping.
    props_count: Vec<usize>,
    /// Remaining items of each open non-empty sequence.
    items_count: Vec<usize>,
    code_maps: HashMap<String, SourceMap>,
}

impl<'a> Emitter<'a> {
    fn component_variable(&self) -> &'static str {
        if self.options.bridge {
            "Component.options"
        } else if self.options.use_class_component {
            "Component.__o || Component.__vccOpts || Component"
        } else {
            "Component"
        }
    }

    fn registry(&self) -> &'static str {
        if self.options.is_global {
            "__i18nGlobal"
        } else {
            "__i18n"
        }
    }

    fn write_prelude(&mut self) {
        let prefix = self.options.export_prefix();
        if !self.options.is_sfc() {
            self.gen.push("const resource = ");
            return;
        }
        let registry = self.registry();
        let variable = self.component_variable();
        self.gen.push(&format!("{} function (Component) {{", prefix));
        self.gen.indent();
        self.gen
            .pushline(&format!("const {} = {}", COMPONENT_NAMESPACE, variable));
        self.gen.pushline(&format!(
            "{ns}.{r} = {ns}.{r} || []",
            ns = COMPONENT_NAMESPACE,
            r = registry
        ));
        self.gen
            .push(&format!("{}.{}.push({{", COMPONENT_NAMESPACE, registry));
        self.gen.indent();
        self.gen.pushline(&format!(
            "\"locale\": {},",
            serde_json::Value::String(self.options.locale.clone())
        ));
        self.gen.push("\"resource\": ");
    }

    fn write_epilogue(&mut self) {
        if !self.options.is_sfc() {
            self.gen.push("\n");
            self.gen
                .push(&format!("{} resource", self.options.export_prefix()));
            return;
        }
        self.gen.deindent();
        self.gen.push("})");
        if self.options.bridge {
            if let Some(injector) = self.collaborators.bridge_injector {
                let payload = legacy::quote(&injector());
                self.gen.newline();
                self.gen.pushline(&format!(
                    "{ns}.__i18nBridge = {ns}.__i18nBridge || []",
                    ns = COMPONENT_NAMESPACE
                ));
                self.gen.pushline(&format!(
                    "{}.__i18nBridge.push('{}')",
                    COMPONENT_NAMESPACE, payload
                ));
                self.gen
                    .push(&format!("delete {}._Ctor", COMPONENT_NAMESPACE));
            }
        }
        self.gen.deindent();
        self.gen.push("}");
    }

    /// Routes one literal through the message compiler and writes its code.
    fn write_message(&mut self, literal: &str, scalar: &Scalar) -> Result<(), CompileError> {
        let compiled = self
            .collaborators
            .compiler
            .compile(literal, self.options, &self.path);
        match compiled {
            Ok(compiled) => {
                for warning in &compiled.warnings {
                    self.collaborators
                        .diagnostics
                        .warn(&format!("{}: {}", self.filename, warning));
                }
                if self.options.source_map {
                    if let Some(map) = compiled.map {
                        let raw = self
                            .source
                            .get(scalar.span.start.offset..scalar.span.end.offset)
                            .unwrap_or("");
                        let map = literal_columns(raw, literal)
                            .and_then(|columns| rebase_fragment(&map, &columns))
                            .unwrap_or(map);
                        self.code_maps.insert(literal.to_string(), map);
                    }
                }
                self.gen
                    .push_mapped(&compiled.code, scalar.content_start, Some(literal));
                Ok(())
            }
            Err(err) if self.options.lenient => {
                self.collaborators.diagnostics.warn(&format!(
                    "{}: `{}` kept as a raw string: {}",
                    self.filename,
                    self.path.join("."),
                    err
                ));
                let raw = serde_json::Value::String(literal.to_string()).to_string();
                self.gen.push_mapped(&raw, scalar.content_start, Some(literal));
                Ok(())
            }
            Err(err) => Err(self.collaborators.diagnostics.error(
                self.filename,
                &err.message,
                ErrorContext {
                    literal: literal.to_string(),
                    path: self.path.join("."),
                    code: err.code,
                    span: Some(scalar.span),
                },
            )),
        }
    }

    fn separator(count: &mut [usize], gen: &mut CodeGenerator) {
        if let Some(remaining) = count.last_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining != 0 {
                gen.pushline(",");
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRAGMENT COLUMNS
// ═══════════════════════════════════════════════════════════════════════════════

/// Fragment maps locate nodes inside the decoded literal. This maps each
/// decoded (line, column) of a single-line quoted token to its UTF-16 column
/// in the raw token text after the opening quote, so escapes don't shift the
/// merged positions. `None` for unquoted or multi-line tokens, or when the
/// token does not decode to `literal`.
fn literal_columns(raw: &str, literal: &str) -> Option<HashMap<(u32, u32), u32>> {
    let quote = raw.chars().next().filter(|c| matches!(c, '"' | '\''))?;
    if raw.len() < 2 || !raw.ends_with(quote) || raw.contains('\n') {
        return None;
    }
    let mut rest = &raw[1..raw.len() - 1];
    let mut raw_column = 0u32;
    let (mut line, mut column) = (0u32, 0u32);
    let mut columns = HashMap::new();
    for c in literal.chars() {
        columns.insert((line, column), raw_column);
        let len = raw_len(rest, quote, c)?;
        raw_column += rest[..len].encode_utf16().count() as u32;
        rest = &rest[len..];
        if c == '\n' {
            line += 1;
            column = 0;
        } else {
            column += c.len_utf16() as u32;
        }
    }
    if !rest.is_empty() {
        return None;
    }
    columns.insert((line, column), raw_column);
    Some(columns)
}

/// Byte length of the raw text at the start of `rest` that decodes to `c`.
fn raw_len(rest: &str, quote: char, c: char) -> Option<usize> {
    let mut chars = rest.chars();
    let len = match chars.next()? {
        '\\' => match chars.next()? {
            'u' if rest[2..].starts_with('{') => rest.find('}')? + 1,
            // surrogate pair written as two escapes
            'u' if (c as u32) > 0xFFFF && rest.get(6..)?.starts_with("\\u") => 12,
            'u' => 6,
            'x' => 4,
            'U' => 10,
            other => 1 + other.len_utf8(),
        },
        // YAML single-quoted strings double the quote
        '\'' if quote == '\'' && c == '\'' && rest[1..].starts_with('\'') => 2,
        first if first == c => first.len_utf8(),
        _ => return None,
    };
    rest.get(..len).map(|_| len)
}

fn rebase_fragment(map: &SourceMap, columns: &HashMap<(u32, u32), u32>) -> Option<SourceMap> {
    let mappings = map.decode().ok()?;
    let mut builder = SourceMapBuilder::new(map.file.as_deref());
    for source in &map.sources {
        builder.add_source(source);
    }
    for mapping in mappings {
        let Some(original) = mapping.original else {
            continue;
        };
        let column = *columns.get(&(original.line, original.column))?;
        builder.add_mapping(
            mapping.generated_line,
            mapping.generated_column,
            original.source,
            0,
            column,
            original.name.and_then(|n| map.name(n)),
        );
    }
    Some(builder.build())
}

impl<'a> ResourceVisitor for Emitter<'a> {
    type Error = CompileError;

    fn enter_document(&mut self, _document: &Document) -> Result<(), CompileError> {
        self.write_prelude();
        Ok(())
    }

    fn leave_document(&mut self, _document: &Document) -> Result<(), CompileError> {
        self.write_epilogue();
        Ok(())
    }

    fn enter_mapping(&mut self, mapping: &Mapping) -> Result<(), CompileError> {
        if mapping.pairs.is_empty() {
            self.gen.push("{}");
        } else {
            self.gen.push("{");
            self.gen.indent();
            self.props_count.push(mapping.pairs.len());
        }
        Ok(())
    }

    fn leave_mapping(&mut self, mapping: &Mapping) -> Result<(), CompileError> {
        if !mapping.pairs.is_empty() {
            self.props_count.pop();
            self.gen.deindent();
            self.gen.push("}");
        }
        Ok(())
    }

    fn enter_pair(&mut self, pair: &Pair) -> Result<(), CompileError> {
        self.gen.push(&format!(
            "{}: ",
            serde_json::Value::String(pair.key.clone())
        ));
        self.path.push(pair.key.clone());
        Ok(())
    }

    fn leave_pair(&mut self, _pair: &Pair) -> Result<(), CompileError> {
        self.path.pop();
        Self::separator(&mut self.props_count, &mut self.gen);
        Ok(())
    }

    fn enter_sequence(&mut self, sequence: &Sequence) -> Result<(), CompileError> {
        if sequence.items.is_empty() {
            self.gen.push("[]");
        } else {
            self.gen.push("[");
            self.gen.indent();
            self.items_count.push(sequence.items.len());
        }
        Ok(())
    }

    fn leave_sequence(&mut self, sequence: &Sequence) -> Result<(), CompileError> {
        if !sequence.items.is_empty() {
            self.items_count.pop();
            self.gen.deindent();
            self.gen.push("]");
        }
        Ok(())
    }

    fn enter_item(&mut self, index: usize, _item: &Node) -> Result<(), CompileError> {
        self.path.push(index.to_string());
        Ok(())
    }

    fn leave_item(&mut self, _index: usize, _item: &Node) -> Result<(), CompileError> {
        self.path.pop();
        Self::separator(&mut self.items_count, &mut self.gen);
        Ok(())
    }

    fn visit_scalar(&mut self, scalar: &Scalar) -> Result<(), CompileError> {
        match &scalar.value {
            ScalarValue::String(literal) => self.write_message(literal, scalar),
            other if self.options.force_stringify => {
                self.write_message(&other.to_js_string(), scalar)
            }
            other => {
                self.gen.push(&other.to_js_literal());
                Ok(())
            }
        }
    }

    fn visit_verbatim(&mut self, verbatim: &Verbatim) -> Result<(), CompileError> {
        self.gen.push_mapped(&verbatim.code, verbatim.span.start, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TracingDiagnostics;
    use crate::json;
    use crate::message::BuiltinMessageCompiler;
    use crate::options::{Env, ResourceType};

    fn jit() -> GenerateOptions {
        GenerateOptions {
            jit: true,
            ..Default::default()
        }
    }

    fn emit_json(source: &str, options: &GenerateOptions) -> Emission {
        let document = json::parse(source, "en.json").unwrap();
        emit(
            &document,
            source,
            options,
            Collaborators {
                compiler: &BuiltinMessageCompiler,
                diagnostics: &TracingDiagnostics,
                bridge_injector: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_plain_output_shape() {
        let out = emit_json(r#"{"a": "x", "b": {"c": "y"}, "d": [1, true]}"#, &jit());
        assert_eq!(
            out.code,
            concat!(
                "const resource = {\n",
                "  \"a\": \"x\",\n",
                "  \"b\": {\n",
                "    \"c\": \"y\"\n",
                "  },\n",
                "  \"d\": [\n",
                "    1,\n",
                "    true\n",
                "  ]\n",
                "}\n",
                "export default resource"
            )
        );
        assert!(out.map.is_none());
    }

    #[test]
    fn test_empty_containers() {
        let out = emit_json(r#"{"a": {}, "b": []}"#, &jit());
        assert_eq!(
            out.code,
            "const resource = {\n  \"a\": {},\n  \"b\": []\n}\nexport default resource"
        );
    }

    #[test]
    fn test_sfc_output_shape() {
        let options = GenerateOptions {
            resource_type: ResourceType::Sfc,
            locale: "en".into(),
            jit: true,
            ..Default::default()
        };
        let out = emit_json(r#"{"hello": "world"}"#, &options);
        assert_eq!(
            out.code,
            concat!(
                "export default function (Component) {\n",
                "  const _Component = Component\n",
                "  _Component.__i18n = _Component.__i18n || []\n",
                "  _Component.__i18n.push({\n",
                "    \"locale\": \"en\",\n",
                "    \"resource\": {\n",
                "      \"hello\": \"world\"\n",
                "    }\n",
                "  })\n",
                "}"
            )
        );
    }

    #[test]
    fn test_sfc_global_class_component() {
        let options = GenerateOptions {
            resource_type: ResourceType::Sfc,
            is_global: true,
            use_class_component: true,
            jit: true,
            ..Default::default()
        };
        let out = emit_json(r#"{"a": "b"}"#, &options);
        assert!(out
            .code
            .contains("const _Component = Component.__o || Component.__vccOpts || Component\n"));
        assert!(out.code.contains("_Component.__i18nGlobal.push({"));
        assert!(out.code.contains("\"locale\": \"\","));
    }

    #[test]
    fn test_bridge_injector_appends_registration() {
        let options = GenerateOptions {
            resource_type: ResourceType::Sfc,
            bridge: true,
            jit: true,
            ..Default::default()
        };
        let source = r#"{"en": {"a": "it's"}}"#;
        let document = json::parse(source, "en.json").unwrap();
        let injector = || "{\"en\":{\"a\":\"it's \\\\ \u{2028}\"}}".to_string();
        let out = emit(
            &document,
            source,
            &options,
            Collaborators {
                compiler: &BuiltinMessageCompiler,
                diagnostics: &TracingDiagnostics,
                bridge_injector: Some(&injector as &BridgeInjector),
            },
        )
        .unwrap();
        assert!(out.code.starts_with("module.exports = function (Component) {\n  const _Component = Component.options\n"));
        assert!(out.code.contains(concat!(
            "  })\n",
            "  _Component.__i18nBridge = _Component.__i18nBridge || []\n",
            "  _Component.__i18nBridge.push('{\"en\":{\"a\":\"it\\u0027s \\\\\\\\ \\\\u2028\"}}')\n",
            "  delete _Component._Ctor\n",
            "}"
        )));
    }

    #[test]
    fn test_fragment_columns_follow_escapes() {
        let options = GenerateOptions {
            source_map: true,
            env: Env::Production,
            ..Default::default()
        };
        let out = emit_json(r#"{"a": "\"q\" {n}"}"#, &options);
        let fragment = out.code_maps.get("\"q\" {n}").unwrap();
        let columns: Vec<u32> = fragment
            .decode()
            .unwrap()
            .iter()
            .filter_map(|m| m.original.map(|o| o.column))
            .collect();
        // `{` sits at column 4 of the literal and column 6 of the raw token
        assert!(columns.contains(&6), "{:?}", columns);
        assert!(!columns.contains(&4), "{:?}", columns);
    }

    #[test]
    fn test_literal_columns() {
        let columns = literal_columns(r#""a\nb\u00e9c""#, "a\nb\u{e9}c").unwrap();
        assert_eq!(columns[&(0, 0)], 0);
        assert_eq!(columns[&(1, 0)], 3);
        assert_eq!(columns[&(1, 2)], 10);
        let columns = literal_columns("'it''s'", "it's").unwrap();
        assert_eq!(columns[&(0, 3)], 4);
        assert!(literal_columns("42", "42").is_none());
        assert!(literal_columns(r#""x""#, "y").is_none());
    }

    #[test]
    fn test_force_stringify() {
        let production = GenerateOptions {
            env: Env::Production,
            ..Default::default()
        };
        let out = emit_json(r#"{"count": 5}"#, &production);
        assert!(out.code.contains("\"count\": 5\n"));

        let forced = GenerateOptions {
            force_stringify: true,
            ..production
        };
        let out = emit_json(r#"{"count": 5}"#, &forced);
        assert!(out
            .code
            .contains(r#""count": (ctx) => {const { normalize: _normalize } = ctx;return _normalize(["5"])}"#));
    }

    #[test]
    fn test_code_maps_keyed_by_literal() {
        let options = GenerateOptions {
            source_map: true,
            ..Default::default()
        };
        let out = emit_json(r#"{"a": "same", "b": "same", "c": "other"}"#, &options);
        assert_eq!(out.code_maps.len(), 2);
        assert!(out.code_maps.contains_key("same"));
        assert!(out.map.is_some());
    }

    #[test]
    fn test_message_error_carries_path_and_span() {
        let source = r#"{"a": {"b": "hi {name"}}"#;
        let document = json::parse(source, "en.json").unwrap();
        let err = emit(
            &document,
            source,
            &GenerateOptions::default(),
            Collaborators {
                compiler: &BuiltinMessageCompiler,
                diagnostics: &TracingDiagnostics,
                bridge_injector: None,
            },
        )
        .unwrap_err();
        match err {
            CompileError::Message { context, .. } => {
                assert_eq!(context.path, "a.b");
                assert_eq!(context.literal, "hi {name");
                assert_eq!(context.code, crate::error::E_UNTERMINATED_PLACEHOLDER);
                assert_eq!(context.span.unwrap().start.column, 12);
            }
            other => panic!("expected message error, got {:?}", other),
        }
    }

    #[test]
    fn test_lenient_falls_back_to_raw_string() {
        let options = GenerateOptions {
            lenient: true,
            ..Default::default()
        };
        let out = emit_json(r#"{"a": "hi {name"}"#, &options);
        assert!(out.code.contains(r#""a": "hi {name""#));
    }
}
