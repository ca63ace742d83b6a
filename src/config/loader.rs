//! Configuration Loader
//!
//! Reads a root pipeline document, resolves `include` directives depth-first,
//! deep-merges every document into one mapping and finally resolves
//! `!reference` tags against the merged tree.
//!
//! While merging, the loader records which files defined each top-level
//! entry so duplicate job definitions can be reported later.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_yaml::{Mapping, Value};

use crate::error::{CimulatorError, Result};

use super::reference::resolve_references;

/// Default limit for nested includes.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 32;

/// What to do with include entries that cannot be resolved locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncludePolicy {
    /// Log a warning and continue
    #[default]
    Skip,
    /// Fail with [`CimulatorError::Include`]
    Reject,
}

/// Loader settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    pub include_policy: IncludePolicy,
    pub max_include_depth: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            include_policy: IncludePolicy::default(),
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }
}

/// Top-level entry name -> files that defined it, in encounter order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMap {
    entries: BTreeMap<String, Vec<PathBuf>>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `path` defines `name`. A path is kept once per name.
    pub fn record(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        let path = path.into();
        let sources = self.entries.entry(name.into()).or_default();
        if !sources.contains(&path) {
            sources.push(path);
        }
    }

    /// Returns the files that defined `name`.
    pub fn sources(&self, name: &str) -> &[PathBuf] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fully merged configuration plus the files behind each top-level entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub config: Mapping,
    pub sources: SourceMap,
}

/// Loads and resolves a pipeline configuration with default options.
///
/// # Example
///
/// ```rust,no_run
/// use cimulator::config::load;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let resolved = load(".gitlab-ci.yml")?;
///     println!("{} top-level entries", resolved.config.len());
///     Ok(())
/// }
/// ```
pub fn load(root: impl AsRef<Path>) -> Result<ResolvedConfig> {
    ConfigLoader::new(LoaderOptions::default()).load(root)
}

/// Recursive include loader. One instance per load.
#[derive(Debug)]
pub struct ConfigLoader {
    options: LoaderOptions,
    sources: SourceMap,
    stack: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new(options: LoaderOptions) -> Self {
        Self {
            options,
            sources: SourceMap::new(),
            stack: Vec::new(),
        }
    }

    /// Loads the root file, merges its includes and resolves references.
    pub fn load(mut self, root: impl AsRef<Path>) -> Result<ResolvedConfig> {
        let root = root.as_ref();
        info!("Loading pipeline configuration from: {}", root.display());

        let mut config = self.load_file(root)?;
        resolve_references(&mut config)?;

        info!(
            "Configuration resolved: {} top-level entries from {} tracked names",
            config.len(),
            self.sources.len()
        );

        Ok(ResolvedConfig {
            config,
            sources: self.sources,
        })
    }

    /// Loads one file and, depth-first, everything it includes.
    fn load_file(&mut self, path: &Path) -> Result<Mapping> {
        if self.stack.len() > self.options.max_include_depth {
            return Err(self.cycle_error(path));
        }

        let canonical = fs::canonicalize(path).map_err(|source| CimulatorError::Load {
            path: path.to_path_buf(),
            source,
        })?;

        if self.stack.contains(&canonical) {
            return Err(self.cycle_error(path));
        }

        let mut document = read_document(path)?;
        let includes = document.shift_remove("include");

        for key in document.keys() {
            if let Some(name) = key.as_str() {
                self.sources.record(name, path);
            }
        }

        let Some(includes) = includes else {
            return Ok(document);
        };

        self.stack.push(canonical);
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));

        for entry in include_entries(includes) {
            let Some(relative) = include_target(&entry) else {
                self.unsupported_include(path, &entry)?;
                continue;
            };

            let include_path = base_dir.join(relative);
            debug!("Including '{}' from '{}'", include_path.display(), path.display());

            let included = self.load_file(&include_path)?;
            merge_mappings(&mut document, included);
        }

        self.stack.pop();
        Ok(document)
    }

    fn unsupported_include(&self, path: &Path, entry: &Value) -> Result<()> {
        let rendered = serde_json::to_string(entry).unwrap_or_else(|_| format!("{:?}", entry));
        match self.options.include_policy {
            IncludePolicy::Skip => {
                warn!("Skipping unsupported include in '{}': {}", path.display(), rendered);
                Ok(())
            }
            IncludePolicy::Reject => Err(CimulatorError::Include {
                path: path.to_path_buf(),
                entry: rendered,
            }),
        }
    }

    fn cycle_error(&self, path: &Path) -> CimulatorError {
        let mut chain: Vec<String> = self.stack.iter().map(|p| p.display().to_string()).collect();
        chain.push(path.display().to_string());
        CimulatorError::IncludeCycle {
            path: path.to_path_buf(),
            chain,
        }
    }
}

/// Normalizes the `include` value into a list of entries.
fn include_entries(includes: Value) -> Vec<Value> {
    match includes {
        Value::Sequence(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

/// Extracts the local path of an include entry: `path` or `{local: path}`.
fn include_target(entry: &Value) -> Option<&str> {
    match entry {
        Value::String(path) => Some(path.as_str()),
        Value::Mapping(mapping) => mapping.get("local").and_then(Value::as_str),
        _ => None,
    }
}

/// Reads one YAML document as a mapping.
///
/// An empty document is an empty mapping. `<<` merge keys are applied here,
/// since anchors only live within one file.
pub(crate) fn read_document(path: &Path) -> Result<Mapping> {
    let bytes = fs::read(path).map_err(|source| CimulatorError::Load {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("Read '{}' ({} bytes)", path.display(), bytes.len());

    let parse_error = |source: serde_yaml::Error| CimulatorError::Parse {
        path: path.to_path_buf(),
        source,
    };

    let content = String::from_utf8(bytes)
        .map_err(|e| parse_error(<serde_yaml::Error as serde::de::Error>::custom(e)))?;

    if content.trim().is_empty() {
        return Ok(Mapping::new());
    }

    let mut value: Value = serde_yaml::from_str(&content).map_err(parse_error)?;
    value.apply_merge().map_err(parse_error)?;

    match value {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(parse_error(<serde_yaml::Error as serde::de::Error>::custom(
            "top-level document must be a mapping",
        ))),
    }
}

/// Deep-merges `incoming` into `base`.
///
/// Mapping/mapping conflicts merge key by key; any other conflict is won
/// by `incoming` wholesale. Overridden keys keep their position, new keys
/// are appended.
pub fn merge_mappings(base: &mut Mapping, incoming: Mapping) {
    for (key, value) in incoming {
        if let Value::Mapping(next) = value {
            if let Some(Value::Mapping(existing)) = base.get_mut(&key) {
                merge_mappings(existing, next);
                continue;
            }
            base.insert(key, Value::Mapping(next));
        } else {
            base.insert(key, value);
        }
    }
}
