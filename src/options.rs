//! Generation options handed over by the bundler integration.

use serde::{Deserialize, Serialize};

use crate::sourcemap::SourceMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// A standalone resource file, exported as a bare object.
    #[default]
    Plain,
    /// A component custom block, registered on the component.
    Sfc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateOptions {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub locale: String,
    pub is_global: bool,
    pub only_locales: Vec<String>,
    pub force_stringify: bool,
    pub strict_message: bool,
    pub escape_html: bool,
    #[serde(rename = "exportESM")]
    pub export_esm: bool,
    pub jit: bool,
    pub bridge: bool,
    pub legacy: bool,
    pub use_class_component: bool,
    pub source_map: bool,
    pub in_source_map: Option<SourceMap>,
    pub env: Env,
    /// Plain modules only: pass modules with non-static content through
    /// untouched instead of rejecting them.
    pub allow_dynamic: bool,
    /// Degrade rejected messages to raw strings with a warning.
    pub lenient: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            resource_type: ResourceType::Plain,
            locale: String::new(),
            is_global: false,
            only_locales: Vec::new(),
            force_stringify: false,
            strict_message: true,
            escape_html: false,
            export_esm: false,
            jit: false,
            bridge: false,
            legacy: false,
            use_class_component: false,
            source_map: false,
            in_source_map: None,
            env: Env::Development,
            allow_dynamic: false,
            lenient: false,
        }
    }
}

impl GenerateOptions {
    pub fn is_sfc(&self) -> bool {
        self.resource_type == ResourceType::Sfc
    }

    /// `export default` unless bridging to a CommonJS target.
    pub fn export_prefix(&self) -> &'static str {
        if self.bridge && !self.export_esm {
            "module.exports ="
        } else {
            "export default"
        }
    }
}
