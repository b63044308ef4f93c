//! Message compilation.
//!
//! Every string leaf of a resource is handed to a [`MessageCompiler`]. The
//! built-in [`BuiltinMessageCompiler`] understands the runtime's message
//! syntax: text, `{named}`, `{0}`, `{'literal'}`, linked messages (`@:key`,
//! `@.modifier:key`, `@:(key)`) and plural cases separated by `|`.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{
    E_EMPTY_LINKED_KEY, E_EMPTY_PLACEHOLDER, E_HTML_IN_MESSAGE, E_INVALID_PLACEHOLDER,
    E_UNTERMINATED_LITERAL, E_UNTERMINATED_PLACEHOLDER,
};
use crate::options::{Env, GenerateOptions};
use crate::sourcemap::{SourceMap, SourceMapBuilder};
use crate::tree::LineIndex;

lazy_static! {
    static ref HTML_RE: Regex = Regex::new(r#"</?[\w\s="/.':;#-]+>"#).unwrap();
    static ref NAMED_RE: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$-]*$").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTRACT
// ═══════════════════════════════════════════════════════════════════════════════

/// Output of one message compilation.
#[derive(Debug, Clone, Default)]
pub struct CompiledMessage {
    /// A JavaScript expression usable as a property value.
    pub code: String,
    /// Maps positions in `code` (line 0) to positions inside the literal.
    pub map: Option<SourceMap>,
    /// Non-fatal notices for the diagnostics channel.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageError {
    pub code: &'static str,
    pub message: String,
    /// Byte offset inside the literal.
    pub offset: usize,
}

impl MessageError {
    fn new(code: &'static str, message: impl Into<String>, offset: usize) -> Self {
        Self {
            code,
            message: message.into(),
            offset,
        }
    }
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (offset {})", self.message, self.offset)
    }
}

pub trait MessageCompiler: Sync {
    fn compile(
        &self,
        message: &str,
        options: &GenerateOptions,
        path: &[String],
    ) -> Result<CompiledMessage, MessageError>;
}

/// How a message leaf is represented in the generated module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionStrategy {
    /// Compiled to a function; no runtime message parser needed.
    AheadOfTime,
    /// Left as a string literal for the runtime to parse on first use.
    Deferred,
}

impl EmissionStrategy {
    pub fn from_options(options: &GenerateOptions) -> Self {
        if options.jit {
            EmissionStrategy::Deferred
        } else {
            EmissionStrategy::AheadOfTime
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MESSAGE AST
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    Named(String),
    List(u32),
    Literal(String),
    Linked {
        key: String,
        modifier: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub part: Part,
    /// Byte offset of the item in the message.
    pub offset: usize,
}

/// One plural case; a message without `|` has exactly one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Case {
    pub items: Vec<Item>,
}

pub fn parse(message: &str) -> Result<Vec<Case>, MessageError> {
    MessageParser {
        src: message,
        pos: 0,
        cases: Vec::new(),
        items: Vec::new(),
        text: String::new(),
        text_start: 0,
    }
    .run()
}

struct MessageParser<'m> {
    src: &'m str,
    pos: usize,
    cases: Vec<Case>,
    items: Vec<Item>,
    text: String,
    text_start: usize,
}

impl<'m> MessageParser<'m> {
    fn run(mut self) -> Result<Vec<Case>, MessageError> {
        while let Some(c) = self.peek() {
            match c {
                '{' => {
                    self.flush_text();
                    let item = self.placeholder()?;
                    self.items.push(item);
                    self.text_start = self.pos;
                }
                '@' if self.linked_follows() => {
                    self.flush_text();
                    let item = self.linked()?;
                    self.items.push(item);
                    self.text_start = self.pos;
                }
                '|' => {
                    self.flush_text();
                    self.close_case();
                    self.pos += 1;
                    self.skip_whitespace();
                    self.text_start = self.pos;
                }
                _ => {
                    if self.text.is_empty() {
                        self.text_start = self.pos;
                    }
                    self.text.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
        self.flush_text();
        self.cases.push(Case {
            items: std::mem::take(&mut self.items),
        });
        Ok(self.cases)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn rest(&self) -> &'m str {
        &self.src[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            self.items.push(Item {
                part: Part::Text(std::mem::take(&mut self.text)),
                offset: self.text_start,
            });
        }
    }

    /// Ends a plural case; whitespace around `|` is not part of either case.
    fn close_case(&mut self) {
        let mut case = Case {
            items: std::mem::take(&mut self.items),
        };
        if let Some(Item {
            part: Part::Text(text),
            ..
        }) = case.items.last_mut()
        {
            let trimmed = text.trim_end().len();
            text.truncate(trimmed);
            if text.is_empty() {
                case.items.pop();
            }
        }
        self.cases.push(case);
    }

    fn placeholder(&mut self) -> Result<Item, MessageError> {
        let open = self.pos;
        self.pos += 1;
        self.skip_whitespace();

        if self.peek() == Some('\'') {
            let literal_start = self.pos;
            self.pos += 1;
            let mut value = String::new();
            loop {
                match self.peek() {
                    None | Some('\n') => {
                        return Err(MessageError::new(
                            E_UNTERMINATED_LITERAL,
                            "unterminated literal in placeholder",
                            literal_start,
                        ))
                    }
                    Some('\'') => {
                        self.pos += 1;
                        break;
                    }
                    Some('\\') => {
                        self.pos += 1;
                        match self.peek() {
                            Some(escaped @ ('\'' | '\\')) => {
                                value.push(escaped);
                                self.pos += 1;
                            }
                            _ => value.push('\\'),
                        }
                    }
                    Some(c) => {
                        value.push(c);
                        self.pos += c.len_utf8();
                    }
                }
            }
            self.skip_whitespace();
            if self.peek() != Some('}') {
                return Err(MessageError::new(
                    E_UNTERMINATED_PLACEHOLDER,
                    "unterminated placeholder",
                    open,
                ));
            }
            self.pos += 1;
            return Ok(Item {
                part: Part::Literal(value),
                offset: open,
            });
        }

        let Some(close) = self.rest().find(['}', '{']) else {
            return Err(MessageError::new(
                E_UNTERMINATED_PLACEHOLDER,
                "unterminated placeholder",
                open,
            ));
        };
        if self.rest()[close..].starts_with('{') {
            return Err(MessageError::new(
                E_UNTERMINATED_PLACEHOLDER,
                "unterminated placeholder",
                open,
            ));
        }
        let content = self.rest()[..close].trim();
        self.pos += close + 1;

        let part = if content.is_empty() {
            return Err(MessageError::new(
                E_EMPTY_PLACEHOLDER,
                "empty placeholder",
                open,
            ));
        } else if content.bytes().all(|b| b.is_ascii_digit()) {
            match content.parse::<u32>() {
                Ok(index) => Part::List(index),
                Err(_) => {
                    return Err(MessageError::new(
                        E_INVALID_PLACEHOLDER,
                        format!("list index `{}` is out of range", content),
                        open,
                    ))
                }
            }
        } else if NAMED_RE.is_match(content) {
            Part::Named(content.to_string())
        } else {
            return Err(MessageError::new(
                E_INVALID_PLACEHOLDER,
                format!("invalid token in placeholder: `{}`", content),
                open,
            ));
        };
        Ok(Item { part, offset: open })
    }

    /// `@:` or `@.modifier:` starts a linked message; any other `@` is text.
    fn linked_follows(&self) -> bool {
        let after = &self.rest()[1..];
        if after.starts_with(':') {
            return true;
        }
        match after.strip_prefix('.') {
            Some(tail) => {
                let name = tail.chars().take_while(|c| c.is_ascii_alphabetic()).count();
                name > 0 && tail[name..].starts_with(':')
            }
            None => false,
        }
    }

    fn linked(&mut self) -> Result<Item, MessageError> {
        let at = self.pos;
        self.pos += 1;
        let mut modifier = None;
        if self.peek() == Some('.') {
            self.pos += 1;
            let len = self
                .rest()
                .chars()
                .take_while(|c| c.is_ascii_alphabetic())
                .count();
            modifier = Some(self.rest()[..len].to_string());
            self.pos += len;
        }
        // `:`
        self.pos += 1;

        let key = if self.peek() == Some('(') {
            let Some(close) = self.rest().find(')') else {
                return Err(MessageError::new(
                    E_UNTERMINATED_PLACEHOLDER,
                    "unterminated linked key",
                    at,
                ));
            };
            let key = self.rest()[1..close].trim().to_string();
            self.pos += close + 1;
            key
        } else {
            let len = self
                .rest()
                .find(|c: char| !is_linked_key_char(c))
                .unwrap_or(self.rest().len());
            // a sentence-ending dot is not part of the key
            let key = self.rest()[..len].trim_end_matches('.');
            self.pos += key.len();
            key.to_string()
        };

        if key.is_empty() {
            return Err(MessageError::new(
                E_EMPTY_LINKED_KEY,
                "linked message key is empty",
                at,
            ));
        }
        Ok(Item {
            part: Part::Linked { key, modifier },
            offset: at,
        })
    }
}

fn is_linked_key_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '$')
}

/// Escapes the characters that make a message render as markup.
pub fn escape_html(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for c in message.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

pub fn contains_html(message: &str) -> bool {
    HTML_RE.is_match(message)
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILT-IN COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinMessageCompiler;

impl MessageCompiler for BuiltinMessageCompiler {
    fn compile(
        &self,
        message: &str,
        options: &GenerateOptions,
        path: &[String],
    ) -> Result<CompiledMessage, MessageError> {
        let mut warnings = Vec::new();
        let source = if options.escape_html {
            escape_html(message)
        } else {
            if contains_html(message) {
                let notice = format!(
                    "Detected HTML in '{}' message. Recommend not using HTML messages to avoid XSS.",
                    message
                );
                if options.strict_message {
                    let offset = HTML_RE.find(message).map_or(0, |m| m.start());
                    return Err(MessageError::new(E_HTML_IN_MESSAGE, notice, offset));
                }
                warnings.push(notice);
            }
            message.to_string()
        };

        // both strategies reject the same messages
        let cases = parse(&source)?;

        let (code, map) = match EmissionStrategy::from_options(options) {
            EmissionStrategy::Deferred => (json_string(&source), None),
            EmissionStrategy::AheadOfTime => {
                let generated = generate_function(&cases, &source, options.env);
                let map = fragment_map(&generated.anchors, &source, path);
                (generated.code, Some(map))
            }
        };
        Ok(CompiledMessage {
            code,
            map,
            warnings,
        })
    }
}

fn json_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Single-line output with a running UTF-16 column.
#[derive(Default)]
struct LineWriter {
    code: String,
    column: u32,
    anchors: Vec<(u32, usize)>,
}

impl LineWriter {
    fn push(&mut self, s: &str) {
        self.code.push_str(s);
        self.column += s.encode_utf16().count() as u32;
    }

    fn anchor(&mut self, offset: usize) {
        self.anchors.push((self.column, offset));
    }
}

#[derive(Default)]
struct Helpers {
    interpolate: bool,
    named: bool,
    list: bool,
    linked: bool,
    plural: bool,
}

impl Helpers {
    fn collect(cases: &[Case]) -> Self {
        let mut helpers = Helpers {
            plural: cases.len() > 1,
            ..Default::default()
        };
        for item in cases.iter().flat_map(|c| &c.items) {
            match item.part {
                Part::Named(_) => {
                    helpers.interpolate = true;
                    helpers.named = true;
                }
                Part::List(_) => {
                    helpers.interpolate = true;
                    helpers.list = true;
                }
                Part::Linked { .. } => helpers.linked = true,
                Part::Text(_) | Part::Literal(_) => {}
            }
        }
        helpers
    }

    fn destructure(&self) -> String {
        let mut names = vec!["normalize: _normalize"];
        if self.interpolate {
            names.push("interpolate: _interpolate");
        }
        if self.named {
            names.push("named: _named");
        }
        if self.list {
            names.push("list: _list");
        }
        if self.linked {
            names.push("linked: _linked");
            names.push("type: _type");
        }
        if self.plural {
            names.push("plural: _plural");
        }
        format!("const {{ {} }} = ctx;", names.join(", "))
    }
}

struct GeneratedFunction {
    code: String,
    anchors: Vec<(u32, usize)>,
}

fn generate_function(cases: &[Case], source: &str, env: Env) -> GeneratedFunction {
    let mut w = LineWriter::default();
    if env == Env::Development {
        w.push("(()=>{const fn=");
    }
    w.anchor(0);
    w.push("(ctx) => {");
    w.push(&Helpers::collect(cases).destructure());
    w.push("return ");
    if cases.len() > 1 {
        w.push("_plural([");
        for (i, case) in cases.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            write_case(&mut w, case);
        }
        w.push("])");
    } else if let Some(case) = cases.first() {
        write_case(&mut w, case);
    }
    w.push("}");
    if env == Env::Development {
        w.push(";fn.source=");
        w.push(&json_string(source));
        w.push(";return fn;})()");
    }
    GeneratedFunction {
        code: w.code,
        anchors: w.anchors,
    }
}

fn write_case(w: &mut LineWriter, case: &Case) {
    w.push("_normalize([");
    for (i, item) in case.items.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.anchor(item.offset);
        match &item.part {
            Part::Text(text) | Part::Literal(text) => w.push(&json_string(text)),
            Part::Named(name) => {
                w.push("_interpolate(_named(");
                w.push(&json_string(name));
                w.push("))");
            }
            Part::List(index) => w.push(&format!("_interpolate(_list({}))", index)),
            Part::Linked { key, modifier } => {
                w.push("_linked(");
                w.push(&json_string(key));
                w.push(", ");
                match modifier {
                    Some(m) => w.push(&json_string(m)),
                    None => w.push("undefined"),
                }
                w.push(", _type)");
            }
        }
    }
    w.push("])");
}

fn fragment_map(anchors: &[(u32, usize)], source: &str, path: &[String]) -> SourceMap {
    let index = LineIndex::new(source);
    let mut builder = SourceMapBuilder::new(None);
    let src = builder.add_source(&path.join("."));
    for (column, offset) in anchors {
        let at = index.position(*offset);
        builder.add_mapping(0, *column, src, at.line - 1, at.column, None);
    }
    builder.build()
}
