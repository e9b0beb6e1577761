//! Script node creation support: recognized-option parsing, module-dependency
//! validation, and the per-node state a compiled script keeps alive between ticks.
//!
//! The actual compile/run calls go through [`logic_script::ScriptingRuntime`]; this
//! module only has the parts that do not depend on which runtime is plugged in.

use std::collections::{BTreeMap, BTreeSet};

use logic_script::{
    check_dependencies_match, extract_declared_module_aliases, CompiledChunk, CreateConfig,
    ModuleId, ScriptEnvironment, StandardModule,
};

use crate::error::CompilationError;

/// One recognized creation-config value, as it would arrive across a dynamic
/// boundary (a config table, a deserialized request) before being parsed into a
/// [`CreateConfig`]. Unrecognized keys are rejected, per spec §4.4's "Recognized
/// creation-config options ... Unknown options reject at creation."
#[derive(Debug, Clone)]
pub enum OptionValue {
    StandardModules(BTreeSet<StandardModule>),
    Dependencies(BTreeMap<String, ModuleId>),
    Name(String),
}

/// Parses a raw options bag into a [`CreateConfig`], rejecting any key other than
/// `standardModules`, `dependencies`, `name`.
pub fn parse_create_options(
    raw: &BTreeMap<String, OptionValue>,
) -> Result<CreateConfig, CompilationError> {
    let mut config = CreateConfig::default();
    for (key, value) in raw {
        match (key.as_str(), value) {
            ("standardModules", OptionValue::StandardModules(modules)) => {
                config.standard_modules = modules.clone();
            }
            ("dependencies", OptionValue::Dependencies(deps)) => {
                config.dependencies = deps.clone();
            }
            ("name", OptionValue::Name(name)) => {
                config.name = Some(name.clone());
            }
            (other, _) => return Err(CompilationError::UnknownCreateOption(other.to_string())),
        }
    }
    Ok(config)
}

/// Extracts the source's declared module aliases and checks them against the
/// config's `dependencies` map exactly, per spec §4.4.
pub fn validate_module_dependencies(
    source: &str,
    config: &CreateConfig,
) -> Result<(), CompilationError> {
    let declared = extract_declared_module_aliases(source)
        .map_err(CompilationError::ModuleDeclaration)?;
    check_dependencies_match(&declared, config.dependencies.keys().map(String::as_str))
        .map_err(CompilationError::DependencyMismatch)
}

/// Per-node state for a script, kept alive for the node's entire lifetime so `run()`
/// can be invoked again on every dirty tick without recompiling.
#[derive(Debug)]
pub struct ScriptNodeData<Chunk: CompiledChunk, Env: ScriptEnvironment> {
    pub source: String,
    pub chunk: Chunk,
    pub env: Env,
    pub dependencies: BTreeMap<String, ModuleId>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_option_is_rejected() {
        let mut raw = BTreeMap::new();
        raw.insert("bogus".to_string(), OptionValue::Name("x".to_string()));
        let err = parse_create_options(&raw).unwrap_err();
        assert!(matches!(err, CompilationError::UnknownCreateOption(k) if k == "bogus"));
    }

    #[test]
    fn recognized_options_populate_config() {
        let mut raw = BTreeMap::new();
        raw.insert(
            "standardModules".to_string(),
            OptionValue::StandardModules(BTreeSet::from([StandardModule::Math])),
        );
        raw.insert("name".to_string(), OptionValue::Name("n".to_string()));
        let config = parse_create_options(&raw).unwrap();
        assert_eq!(config.name.as_deref(), Some("n"));
        assert!(config.standard_modules.contains(&StandardModule::Math));
    }

    #[test]
    fn dependency_mismatch_is_caught() {
        let mut config = CreateConfig::default();
        config
            .dependencies
            .insert("a".to_string(), ModuleId(1));
        let err = validate_module_dependencies("modules(\"b\")\n", &config).unwrap_err();
        assert!(matches!(err, CompilationError::DependencyMismatch(_)));
    }

    #[test]
    fn matching_dependencies_pass() {
        let mut config = CreateConfig::default();
        config
            .dependencies
            .insert("a".to_string(), ModuleId(1));
        validate_module_dependencies("modules(\"a\")\n", &config).unwrap();
    }
}
