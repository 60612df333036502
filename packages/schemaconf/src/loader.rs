//! Configuration loading orchestration
//!
//! [`ConfigLoader`] ties the pieces together: it pre-scans the source for
//! `%import` directives, extends a private copy of the schema with the
//! named components, then drives the parser and matcher and returns the
//! converted top-level value together with a [`CompositeHandler`] of the
//! collected handler entries.
//!
//! Schema extension happens strictly before matching begins; the caller's
//! schema is never mutated.

use crate::builder::Component;
use crate::config::MAX_INCLUDE_DEPTH;
use crate::datatypes::normalize_basic_key;
use crate::error::{ConfigError, Result};
use crate::matcher::{HandlerList, SchemaMatcher};
use crate::parser::{ConfigParser, ParserContext};
use crate::schema::Schema;
use crate::substitution::substitute;
use crate::types::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Named schema components available to `%import`.
#[derive(Default)]
pub struct ComponentRegistry {
    components: HashMap<String, Component>,
}

impl ComponentRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        ComponentRegistry::default()
    }

    /// Register a component under its (case-normalized) name.
    pub fn register(&mut self, component: Component) -> Result<()> {
        let name = component.name().to_ascii_lowercase();
        if self.components.contains_key(&name) {
            return Err(ConfigError::schema(format!(
                "schema component already registered: {:?}",
                name
            )));
        }
        self.components.insert(name, component);
        Ok(())
    }

    /// Look up a component by name.
    pub fn get(&self, name: &str) -> Option<&Component> {
        self.components.get(&name.to_ascii_lowercase())
    }
}

fn resolve_reference(current_url: Option<&str>, reference: &str) -> PathBuf {
    let path = Path::new(reference);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match current_url.map(Path::new).and_then(Path::parent) {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

fn open_resource(current_url: Option<&str>, reference: &str) -> Result<(String, String)> {
    let path = resolve_reference(current_url, reference);
    let url = path.display().to_string();
    let text = std::fs::read_to_string(&path).map_err(|err| {
        ConfigError::resource(format!("error opening {}: {}", url, err), Some(url.clone()))
    })?;
    Ok((text, url))
}

struct LoadContext<'a> {
    schema: &'a Schema,
}

impl ParserContext for LoadContext<'_> {
    fn include_source(
        &self,
        current_url: Option<&str>,
        reference: &str,
    ) -> Result<(String, Option<String>)> {
        let (text, url) = open_resource(current_url, reference)?;
        Ok((text, Some(url)))
    }

    fn verify_import(&self, name: &str) -> Result<()> {
        if self.schema.has_component(name) {
            Ok(())
        } else {
            Err(ConfigError::resource(
                format!("unknown schema component: {:?}", name),
                None,
            ))
        }
    }
}

/// Pre-scan pass collecting `%import`ed component names, following
/// `%include` chains with the same define scope the parser will use.
///
/// The scan is deliberately lenient: malformed lines and unreadable
/// includes are left for the parser to report with proper positions.
fn scan_imports(
    text: &str,
    url: Option<&str>,
    depth: usize,
    defines: &mut HashMap<String, String>,
    imports: &mut Vec<String>,
) {
    if depth > MAX_INCLUDE_DEPTH {
        return;
    }
    for raw_line in text.lines() {
        let line = raw_line.trim();
        let Some(rest) = line.strip_prefix('%') else {
            continue;
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name.to_ascii_lowercase().as_str() {
            "define" => {
                let (def_name, def_value) = match arg.split_once(char::is_whitespace) {
                    Some((def_name, def_value)) => (def_name, def_value.trim()),
                    None => (arg, ""),
                };
                if def_name.is_empty() {
                    continue;
                }
                if let Ok(value) = substitute(def_value, defines) {
                    defines.entry(def_name.to_ascii_lowercase()).or_insert(value);
                }
            }
            "import" => {
                if let Ok(component) = substitute(arg, defines) {
                    let component = component.to_ascii_lowercase();
                    if !component.is_empty() && !imports.contains(&component) {
                        imports.push(component);
                    }
                }
            }
            "include" => {
                let Ok(reference) = substitute(arg, defines) else {
                    continue;
                };
                if reference.is_empty() {
                    continue;
                }
                if let Ok((included, include_url)) = open_resource(url, &reference) {
                    scan_imports(&included, Some(&include_url), depth + 1, defines, imports);
                }
            }
            _ => {}
        }
    }
}

/// Loads configuration text against a compiled schema.
pub struct ConfigLoader<'a> {
    schema: &'a Schema,
    components: Option<&'a ComponentRegistry>,
}

impl<'a> ConfigLoader<'a> {
    /// Loader over a schema, with no importable components.
    pub fn new(schema: &'a Schema) -> Self {
        ConfigLoader {
            schema,
            components: None,
        }
    }

    /// Loader over a schema with components available to `%import`.
    pub fn with_components(schema: &'a Schema, components: &'a ComponentRegistry) -> Self {
        ConfigLoader {
            schema,
            components: Some(components),
        }
    }

    /// Load a configuration file.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<(Value, CompositeHandler)> {
        let path = path.as_ref();
        let url = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|err| {
            ConfigError::resource(format!("error opening {}: {}", url, err), Some(url.clone()))
        })?;
        tracing::debug!(path = %url, "loading configuration file");
        self.load_str(&text, Some(&url))
    }

    /// Load configuration text; `url` names the source in error messages
    /// and resolves relative `%include` references.
    pub fn load_str(&self, text: &str, url: Option<&str>) -> Result<(Value, CompositeHandler)> {
        let mut defines = HashMap::new();
        let mut imports = Vec::new();
        scan_imports(text, url, 0, &mut defines, &mut imports);

        let extended = if imports.is_empty() {
            None
        } else {
            Some(self.extend_schema(&imports)?)
        };
        let schema = extended.as_ref().unwrap_or(self.schema);

        let ctx = LoadContext { schema };
        let mut matcher = SchemaMatcher::new(schema);
        let mut parser = ConfigParser::new(&ctx);
        parser.parse(&mut matcher, text, url.map(str::to_string))?;
        let (value, handlers) = matcher.finish()?;
        tracing::debug!(handlers = handlers.len(), "configuration loaded");
        Ok((value, CompositeHandler::new(handlers)))
    }

    fn extend_schema(&self, imports: &[String]) -> Result<Schema> {
        let mut schema = self.schema.clone();
        for name in imports {
            if schema.has_component(name) {
                continue;
            }
            let component = self
                .components
                .and_then(|registry| registry.get(name))
                .ok_or_else(|| {
                    ConfigError::resource(
                        format!("unknown schema component: {:?}", name),
                        None,
                    )
                })?;
            component.apply(&mut schema)?;
            schema.add_component(name.clone());
            tracing::debug!(component = %name, "schema component imported");
        }
        Ok(schema)
    }
}

/// Callback invoked with the converted value of a handler entry.
pub type HandlerFn = Box<dyn Fn(&Value)>;

/// Named callbacks an application offers for dispatch.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<(String, HandlerFn)>,
}

impl HandlerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        HandlerRegistry::default()
    }

    /// Register a callback under a handler name.
    pub fn register(&mut self, name: impl Into<String>, callback: impl Fn(&Value) + 'static) {
        self.entries.push((name.into(), Box::new(callback)));
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The ordered handler entries collected during one load.
///
/// Entries appear in depth-first order: a section's children before the
/// section itself, the schema-level entry last.
#[derive(Debug, Clone)]
pub struct CompositeHandler {
    entries: HandlerList,
}

impl CompositeHandler {
    pub(crate) fn new(entries: HandlerList) -> Self {
        CompositeHandler { entries }
    }

    /// The `(handler name, value)` pairs in dispatch order.
    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the load produced no handler entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke registered callbacks for every entry, in order.
    ///
    /// Registered names are normalized through `basic-key` before
    /// matching; collisions after normalization and entries with no
    /// registered callback are errors, reported before anything runs.
    pub fn dispatch(&self, registry: &HandlerRegistry) -> Result<()> {
        let mut callbacks: HashMap<String, &HandlerFn> = HashMap::new();
        for (name, callback) in &registry.entries {
            let key = normalize_basic_key(name).map_err(|_| {
                ConfigError::configuration(format!("invalid handler name: {:?}", name))
            })?;
            if callbacks.insert(key, callback).is_some() {
                return Err(ConfigError::configuration(format!(
                    "handler name not unique when converted to a basic-key: {:?}",
                    name
                )));
            }
        }

        let missing: BTreeSet<&str> = self
            .entries
            .iter()
            .filter(|(name, _)| !callbacks.contains_key(name.as_str()))
            .map(|(name, _)| name.as_str())
            .collect();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.into_iter().collect();
            return Err(ConfigError::configuration(format!(
                "undefined handlers: {}",
                names.join(", ")
            )));
        }

        for (name, value) in &self.entries {
            if let Some(callback) = callbacks.get(name.as_str()) {
                callback(value);
            }
        }
        Ok(())
    }
}

/// Url-keyed memoization of compiled schemas, for reuse across loads.
#[derive(Default)]
pub struct SchemaCache {
    cache: HashMap<String, Arc<Schema>>,
}

impl SchemaCache {
    /// Empty cache.
    pub fn new() -> Self {
        SchemaCache::default()
    }

    /// Previously cached schema for a url, if any.
    pub fn get(&self, url: &str) -> Option<Arc<Schema>> {
        self.cache.get(url).cloned()
    }

    /// Cached schema for a url, building and caching it on first use.
    pub fn get_or_build<F>(&mut self, url: &str, build: F) -> Result<Arc<Schema>>
    where
        F: FnOnce() -> Result<Schema>,
    {
        if let Some(schema) = self.cache.get(url) {
            return Ok(schema.clone());
        }
        let schema = Arc::new(build()?);
        self.cache.insert(url.to_string(), schema.clone());
        tracing::debug!(url = %url, "schema cached");
        Ok(schema)
    }

    /// Cache a schema under a url, returning the shared handle.
    pub fn insert(&mut self, url: impl Into<String>, schema: Schema) -> Arc<Schema> {
        let schema = Arc::new(schema);
        self.cache.insert(url.into(), schema.clone());
        schema
    }

    /// Number of cached schemas.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
