//! # Localization Resource Compiler
//!
//! Turns localization resources (JSON/JSON5, YAML, plain JS/TS modules and
//! component custom blocks) into JavaScript modules that register their
//! messages with the i18n runtime.
//!
//! ## Pipeline
//!
//! 1. **Front end** (`json`, `yaml`, `module`): source text → [`tree::Document`].
//!    The format is picked from the filename, never from the content.
//! 2. **Locale filter** (`filter`): custom blocks only; materialize, drop the
//!    locales not asked for, write back out and parse again.
//! 3. **Emitter** (`codegen`): walks the tree, compiles every message through
//!    a [`MessageCompiler`] and writes the module.
//! 4. **Merge** (`merge`): folds per-message fragment maps into the module map.
//!
//! `legacy` replaces steps 3 and 4 with one serialized registration snippet.
//!
//! ## Invariants
//!
//! 1. A container with N children emits exactly N−1 separators.
//! 2. Every path segment pushed on entering a pair or item is popped on leaving it.
//! 3. Message strategy depends on options only: `jit` defers parsing to the
//!    runtime, otherwise messages are compiled to functions ahead of time.

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod codegen;
pub mod context;
pub mod error;
pub mod filter;
pub mod format;
pub mod json;
pub mod legacy;
pub mod merge;
pub mod message;
pub mod module;
pub mod options;
pub mod sourcemap;
pub mod transform;
pub mod tree;
pub mod yaml;


pub use error::{CompileError, Diagnostics, ErrorContext, TracingDiagnostics};
pub use format::ResourceFormat;
pub use message::{BuiltinMessageCompiler, CompiledMessage, MessageCompiler, MessageError};
pub use options::{Env, GenerateOptions, ResourceType};
pub use sourcemap::SourceMap;
pub use transform::{
    compile, compile_many, transform, CompileResult, Compiler, CustomBlock, ResourceInput,
};

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Node entry point for the bundler plugin. `options` is the camelCase option
/// object; errors carry a rendered excerpt of the offending source.
#[cfg(feature = "napi")]
#[napi]
pub fn compile_resource_native(
    source: String,
    filename: String,
    options: serde_json::Value,
) -> napi::Result<serde_json::Value> {
    let options: GenerateOptions = serde_json::from_value(options)
        .map_err(|e| napi::Error::from_reason(format!("Options parse error: {}", e)))?;
    let result = transform::compile(&source, &filename, &options)
        .map_err(|e| napi::Error::from_reason(e.render(&source)))?;
    serde_json::to_value(result)
        .map_err(|e| napi::Error::from_reason(format!("Serialize error: {}", e)))
}
