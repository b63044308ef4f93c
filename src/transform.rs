//! Compile pipeline
//!
//! raw text → front end → (locale filter) → emitter → source-map merge.
//! Legacy mode replaces the emitter and the merge with a single serialized
//! registration snippet.

use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::codegen::{self, BridgeInjector, Collaborators};
use crate::error::{CompileError, Diagnostics, TracingDiagnostics};
use crate::filter;
use crate::format::ResourceFormat;
use crate::legacy;
use crate::merge;
use crate::message::{BuiltinMessageCompiler, EmissionStrategy, MessageCompiler};
use crate::options::{GenerateOptions, ResourceType};
use crate::sourcemap::SourceMap;

// ═══════════════════════════════════════════════════════════════════════════════
// INPUT/OUTPUT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub code: String,
    /// Empty unless `sourceMap` is enabled.
    pub map: SourceMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInput {
    pub source: String,
    pub filename: String,
}

/// An inline resource segment of a component file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomBlock {
    pub content: String,
    pub lang: Option<String>,
    /// Side file holding the resource, relative to the component file.
    pub src: Option<String>,
    pub locale: Option<String>,
    pub global: bool,
}

enum Outcome {
    Compiled(CompileResult),
    /// A dynamic module declined under `allowDynamic`.
    Unchanged,
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Compiler {
    message_compiler: Box<dyn MessageCompiler + Send>,
    diagnostics: Box<dyn Diagnostics + Send>,
    bridge_injector: Option<Box<BridgeInjector>>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            message_compiler: Box::new(BuiltinMessageCompiler),
            diagnostics: Box::new(TracingDiagnostics),
            bridge_injector: None,
        }
    }

    pub fn with_message_compiler(mut self, compiler: impl MessageCompiler + Send + 'static) -> Self {
        self.message_compiler = Box::new(compiler);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: impl Diagnostics + Send + 'static) -> Self {
        self.diagnostics = Box::new(diagnostics);
        self
    }

    /// Replaces the default bridge payload (the resource as legacy JSON).
    pub fn with_bridge_injector(
        mut self,
        injector: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.bridge_injector = Some(Box::new(injector));
        self
    }

    /// Compiles a resource file; the format comes from the extension.
    pub fn compile(
        &self,
        source: &str,
        filename: &str,
        options: &GenerateOptions,
    ) -> Result<CompileResult, CompileError> {
        let format = format_for(filename)?;
        match self.run(source, filename, format, options)? {
            Outcome::Compiled(result) => Ok(result),
            Outcome::Unchanged => Ok(CompileResult {
                code: source.to_string(),
                map: SourceMap::empty(),
            }),
        }
    }

    /// Like [`Compiler::compile`], but `None` when no transform is needed.
    pub fn transform(
        &self,
        source: &str,
        filename: &str,
        options: &GenerateOptions,
    ) -> Result<Option<CompileResult>, CompileError> {
        let format = format_for(filename)?;
        match self.run(source, filename, format, options)? {
            Outcome::Compiled(result) if result.code != source => Ok(Some(result)),
            _ => {
                tracing::debug!(filename, "output unchanged");
                Ok(None)
            }
        }
    }

    /// Compiles a component custom block. A `src` side file is read before
    /// anything is emitted.
    pub fn compile_block(
        &self,
        block: &CustomBlock,
        component_filename: &str,
        options: &GenerateOptions,
    ) -> Result<CompileResult, CompileError> {
        let (content, filename) = match &block.src {
            Some(src) => {
                let path = Path::new(component_filename)
                    .parent()
                    .unwrap_or_else(|| Path::new(""))
                    .join(src);
                let content =
                    std::fs::read_to_string(&path).map_err(|source| CompileError::Io {
                        filename: component_filename.to_string(),
                        path: path.display().to_string(),
                        source,
                    })?;
                (content, path.display().to_string())
            }
            None => (block.content.clone(), component_filename.to_string()),
        };

        let format = block
            .lang
            .as_deref()
            .and_then(ResourceFormat::from_lang)
            .or_else(|| block.src.as_deref().and_then(ResourceFormat::from_filename))
            .unwrap_or(ResourceFormat::Json);

        let mut options = options.clone();
        options.resource_type = ResourceType::Sfc;
        if let Some(locale) = &block.locale {
            options.locale = locale.clone();
        }
        if block.global {
            options.is_global = true;
        }

        match self.run(&content, &filename, format, &options)? {
            Outcome::Compiled(result) => Ok(result),
            Outcome::Unchanged => Ok(CompileResult {
                code: content,
                map: SourceMap::empty(),
            }),
        }
    }

    fn run(
        &self,
        source: &str,
        filename: &str,
        format: ResourceFormat,
        options: &GenerateOptions,
    ) -> Result<Outcome, CompileError> {
        let _span = tracing::debug_span!("compile", filename).entered();
        tracing::debug!(?format, resource_type = ?options.resource_type, "front end selected");

        let diagnostics = self.diagnostics.as_ref();
        let document = match format.parse(source, filename, diagnostics) {
            Ok(document) => document,
            Err(CompileError::UnsupportedShape { message, .. })
                if format == ResourceFormat::PlainModule && options.allow_dynamic =>
            {
                tracing::debug!(reason = %message, "dynamic module passed through");
                return Ok(Outcome::Unchanged);
            }
            Err(err) => return Err(err),
        };

        let filtered = filter::refilter(&document, format, options, diagnostics)?;
        let (document, source) = match &filtered {
            Some(filtered) => (&filtered.document, filtered.source.as_str()),
            None => (&document, source),
        };

        if options.legacy {
            tracing::debug!("legacy emission");
            return Ok(Outcome::Compiled(CompileResult {
                code: legacy::emit_legacy(document, options),
                map: SourceMap::empty(),
            }));
        }

        let fallback = (options.bridge && options.is_sfc() && self.bridge_injector.is_none())
            .then(|| {
                let payload = legacy::bridge_injector(document);
                move || payload.clone()
            });
        let bridge_injector: Option<&BridgeInjector> = match (&self.bridge_injector, &fallback) {
            (Some(own), _) => Some(own.as_ref()),
            (None, Some(fallback)) => Some(fallback as &BridgeInjector),
            (None, None) => None,
        };

        tracing::debug!(strategy = ?EmissionStrategy::from_options(options), "emitting");
        let emission = codegen::emit(
            document,
            source,
            options,
            Collaborators {
                compiler: self.message_compiler.as_ref(),
                diagnostics,
                bridge_injector,
            },
        )?;

        let map = match emission.map {
            Some(structural) if options.source_map => merge::merge_source_maps(
                &structural,
                &emission.code_maps,
                options.in_source_map.as_ref(),
                filename,
            )?,
            _ => SourceMap::empty(),
        };

        Ok(Outcome::Compiled(CompileResult {
            code: emission.code,
            map,
        }))
    }
}

fn format_for(filename: &str) -> Result<ResourceFormat, CompileError> {
    ResourceFormat::from_filename(filename).ok_or_else(|| {
        CompileError::parse(filename, "unsupported resource file extension", None)
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// FREE FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Compiles with the built-in message compiler and `tracing` diagnostics.
pub fn compile(
    source: &str,
    filename: &str,
    options: &GenerateOptions,
) -> Result<CompileResult, CompileError> {
    Compiler::new().compile(source, filename, options)
}

pub fn transform(
    source: &str,
    filename: &str,
    options: &GenerateOptions,
) -> Result<Option<CompileResult>, CompileError> {
    Compiler::new().transform(source, filename, options)
}

/// Compiles independent resources in parallel. Results keep input order.
pub fn compile_many(
    inputs: &[ResourceInput],
    options: &GenerateOptions,
) -> Vec<Result<CompileResult, CompileError>> {
    inputs
        .par_iter()
        .map(|input| compile(&input.source, &input.filename, options))
        .collect()
}
