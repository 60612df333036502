//! Programmatic schema construction
//!
//! Declarations ([`KeyDecl`], [`MultiKeyDecl`], [`SectionDecl`],
//! [`MultiSectionDecl`], [`SectionTypeDecl`]) describe the shape of a
//! configuration; [`SchemaBuilder`] compiles them into an immutable
//! [`Schema`]. All structural rules are enforced here, at build time,
//! so matching never encounters a malformed schema.
//!
//! [`Component`] bundles type declarations for `%import`.

use crate::datatypes::{
    basic_key_conversion, identity_section_conversion, is_identifier, normalize_basic_key,
    string_conversion, Conversion,
};
use crate::error::{ConfigError, Result};
use crate::schema::{
    AbstractType, ChildInfo, ChildName, KeyDefault, KeyInfo, MaxOccurs, Schema, SectionInfo,
    SectionType, TypeDef, ValueInfo,
};
use crate::types::{Position, Value};
use std::collections::{BTreeSet, HashMap};

/// Declaration of a single-valued key.
#[derive(Debug, Clone)]
pub struct KeyDecl {
    name: String,
    datatype: Option<String>,
    required: bool,
    defaults: Vec<(Option<String>, String)>,
    handler: Option<String>,
    attribute: Option<String>,
}

impl KeyDecl {
    /// Key with the given name; `"+"` declares an arbitrary-key slot.
    pub fn new(name: impl Into<String>) -> Self {
        KeyDecl {
            name: name.into(),
            datatype: None,
            required: false,
            defaults: Vec::new(),
            handler: None,
            attribute: None,
        }
    }

    /// Datatype name; defaults to the owning type's valuetype.
    pub fn datatype(mut self, name: impl Into<String>) -> Self {
        self.datatype = Some(name.into());
        self
    }

    /// Require the key to be present. Required keys cannot carry defaults.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Default raw value used when the key is absent.
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.defaults.push((None, value.into()));
        self
    }

    /// Default raw value for one key of an arbitrary-key (`"+"`) slot.
    pub fn keyed_default(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.push((Some(key.into()), value.into()));
        self
    }

    /// Handler name attached to the slot.
    pub fn handler(mut self, name: impl Into<String>) -> Self {
        self.handler = Some(name.into());
        self
    }

    /// Target attribute name; derived from the key name when omitted.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attribute = Some(name.into());
        self
    }
}

/// Declaration of a multi-valued key.
#[derive(Debug, Clone)]
pub struct MultiKeyDecl {
    name: String,
    datatype: Option<String>,
    min_occurs: usize,
    max_occurs: MaxOccurs,
    defaults: Vec<(Option<String>, String)>,
    handler: Option<String>,
    attribute: Option<String>,
}

impl MultiKeyDecl {
    /// Multi-valued key with the given name; `"+"` declares an
    /// arbitrary-key slot whose values collect per key.
    pub fn new(name: impl Into<String>) -> Self {
        MultiKeyDecl {
            name: name.into(),
            datatype: None,
            min_occurs: 0,
            max_occurs: MaxOccurs::Unbounded,
            defaults: Vec::new(),
            handler: None,
            attribute: None,
        }
    }

    /// Datatype name; defaults to the owning type's valuetype.
    pub fn datatype(mut self, name: impl Into<String>) -> Self {
        self.datatype = Some(name.into());
        self
    }

    /// Require at least one value (shorthand for `min_occurs(1)`).
    pub fn required(mut self) -> Self {
        self.min_occurs = self.min_occurs.max(1);
        self
    }

    /// Minimum number of values.
    pub fn min_occurs(mut self, min: usize) -> Self {
        self.min_occurs = min;
        self
    }

    /// Maximum number of values.
    pub fn max_occurs(mut self, max: usize) -> Self {
        self.max_occurs = MaxOccurs::Bounded(max);
        self
    }

    /// Default raw value, used when no values are given. May repeat.
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.defaults.push((None, value.into()));
        self
    }

    /// Default raw value for one key of an arbitrary-key (`"+"`) slot.
    pub fn keyed_default(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.push((Some(key.into()), value.into()));
        self
    }

    /// Handler name attached to the slot.
    pub fn handler(mut self, name: impl Into<String>) -> Self {
        self.handler = Some(name.into());
        self
    }

    /// Target attribute name; derived from the key name when omitted.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attribute = Some(name.into());
        self
    }
}

/// Declaration of a single-instance section slot.
#[derive(Debug, Clone)]
pub struct SectionDecl {
    type_name: String,
    name: String,
    required: bool,
    handler: Option<String>,
    attribute: Option<String>,
}

impl SectionDecl {
    /// Section slot for the given (concrete or abstract) type name.
    /// The instance name defaults to `"*"` (any name, or none).
    pub fn new(type_name: impl Into<String>) -> Self {
        SectionDecl {
            type_name: type_name.into(),
            name: "*".to_string(),
            required: false,
            handler: None,
            attribute: None,
        }
    }

    /// Instance name: a literal, `"*"`, or `"+"`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Require the section to be present.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Handler name attached to the slot.
    pub fn handler(mut self, name: impl Into<String>) -> Self {
        self.handler = Some(name.into());
        self
    }

    /// Target attribute name; required for `"*"`/`"+"` names.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attribute = Some(name.into());
        self
    }
}

/// Declaration of a repeatable section slot.
///
/// Repeatable slots must use `"*"` or `"+"` for the name and always
/// need an explicit target attribute.
#[derive(Debug, Clone)]
pub struct MultiSectionDecl {
    type_name: String,
    name: String,
    min_occurs: usize,
    max_occurs: MaxOccurs,
    handler: Option<String>,
    attribute: Option<String>,
}

impl MultiSectionDecl {
    /// Repeatable slot for the given (concrete or abstract) type name.
    pub fn new(type_name: impl Into<String>) -> Self {
        MultiSectionDecl {
            type_name: type_name.into(),
            name: "*".to_string(),
            min_occurs: 0,
            max_occurs: MaxOccurs::Unbounded,
            handler: None,
            attribute: None,
        }
    }

    /// Instance naming rule: `"*"` or `"+"`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Minimum number of instances.
    pub fn min_occurs(mut self, min: usize) -> Self {
        self.min_occurs = min;
        self
    }

    /// Maximum number of instances.
    pub fn max_occurs(mut self, max: usize) -> Self {
        self.max_occurs = MaxOccurs::Bounded(max);
        self
    }

    /// Handler name attached to the slot.
    pub fn handler(mut self, name: impl Into<String>) -> Self {
        self.handler = Some(name.into());
        self
    }

    /// Target attribute name (required).
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attribute = Some(name.into());
        self
    }
}

/// Any child declaration.
#[derive(Debug, Clone)]
pub enum ChildDecl {
    /// Single-valued key
    Key(KeyDecl),
    /// Multi-valued key
    MultiKey(MultiKeyDecl),
    /// Single-instance section
    Section(SectionDecl),
    /// Repeatable section
    MultiSection(MultiSectionDecl),
}

impl From<KeyDecl> for ChildDecl {
    fn from(decl: KeyDecl) -> Self {
        ChildDecl::Key(decl)
    }
}

impl From<MultiKeyDecl> for ChildDecl {
    fn from(decl: MultiKeyDecl) -> Self {
        ChildDecl::MultiKey(decl)
    }
}

impl From<SectionDecl> for ChildDecl {
    fn from(decl: SectionDecl) -> Self {
        ChildDecl::Section(decl)
    }
}

impl From<MultiSectionDecl> for ChildDecl {
    fn from(decl: MultiSectionDecl) -> Self {
        ChildDecl::MultiSection(decl)
    }
}

/// Declaration of a named section type.
#[derive(Debug, Clone)]
pub struct SectionTypeDecl {
    name: String,
    keytype: Option<String>,
    valuetype: Option<String>,
    datatype: Option<String>,
    extends: Option<String>,
    implements: Option<String>,
    children: Vec<ChildDecl>,
}

impl SectionTypeDecl {
    /// Section type with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        SectionTypeDecl {
            name: name.into(),
            keytype: None,
            valuetype: None,
            datatype: None,
            extends: None,
            implements: None,
            children: Vec::new(),
        }
    }

    /// Keytype used to normalize key names; defaults to `basic-key`
    /// (inherited from the base type when extending).
    pub fn keytype(mut self, name: impl Into<String>) -> Self {
        self.keytype = Some(name.into());
        self
    }

    /// Default datatype for keys without one; defaults to `string`.
    pub fn valuetype(mut self, name: impl Into<String>) -> Self {
        self.valuetype = Some(name.into());
        self
    }

    /// Section datatype applied to finished instances; defaults to the
    /// identity (inherited from the base type when extending).
    pub fn datatype(mut self, name: impl Into<String>) -> Self {
        self.datatype = Some(name.into());
        self
    }

    /// Copy the children of an existing concrete type.
    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.extends = Some(base.into());
        self
    }

    /// Register this type as a subtype of an abstract type.
    pub fn implements(mut self, abstract_name: impl Into<String>) -> Self {
        self.implements = Some(abstract_name.into());
        self
    }

    /// Append a child slot declaration.
    pub fn child(mut self, decl: impl Into<ChildDecl>) -> Self {
        self.children.push(decl.into());
        self
    }
}

/// A reusable bundle of type declarations, applied by `%import`.
#[derive(Debug, Clone)]
pub struct Component {
    name: String,
    abstract_types: Vec<String>,
    section_types: Vec<SectionTypeDecl>,
}

impl Component {
    /// Component with the given import name.
    pub fn new(name: impl Into<String>) -> Self {
        Component {
            name: name.into(),
            abstract_types: Vec::new(),
            section_types: Vec::new(),
        }
    }

    /// Name the component is imported under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add an abstract type definition.
    pub fn abstract_type(mut self, name: impl Into<String>) -> Self {
        self.abstract_types.push(name.into());
        self
    }

    /// Add a section type definition.
    pub fn section_type(mut self, decl: SectionTypeDecl) -> Self {
        self.section_types.push(decl);
        self
    }

    /// Apply the component's definitions to a schema. Definitions are
    /// append-only; name collisions with existing types are errors.
    pub(crate) fn apply(&self, schema: &mut Schema) -> Result<()> {
        for name in &self.abstract_types {
            define_abstract(schema, name)?;
        }
        for decl in &self.section_types {
            define_section_type(schema, decl)?;
        }
        Ok(())
    }
}

/// Builds an immutable [`Schema`] from declarations.
pub struct SchemaBuilder {
    schema: Schema,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        SchemaBuilder::new()
    }
}

impl SchemaBuilder {
    /// Builder with the stock datatype registry.
    pub fn new() -> Self {
        SchemaBuilder::with_registry(crate::datatypes::Registry::new())
    }

    /// Builder with an application-extended datatype registry.
    pub fn with_registry(registry: crate::datatypes::Registry) -> Self {
        let root = SectionType::new(
            None,
            basic_key_conversion(),
            string_conversion(),
            identity_section_conversion(),
        );
        SchemaBuilder {
            schema: Schema {
                root,
                types: HashMap::new(),
                components: BTreeSet::new(),
                url: None,
                registry,
            },
        }
    }

    /// Record the source url the schema definition came from.
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.schema.url = Some(url.into());
    }

    /// Keytype for top-level keys; defaults to `basic-key`.
    pub fn set_keytype(&mut self, name: &str) -> Result<()> {
        self.schema.root.keytype = self.schema.registry.get(name)?;
        Ok(())
    }

    /// Default datatype for top-level keys; defaults to `string`.
    pub fn set_valuetype(&mut self, name: &str) -> Result<()> {
        self.schema.root.valuetype = self.schema.registry.get(name)?;
        Ok(())
    }

    /// Section datatype applied to the whole assembled configuration.
    pub fn set_datatype(&mut self, name: &str) -> Result<()> {
        self.schema.root.datatype = self.schema.registry.get_section(name)?;
        Ok(())
    }

    /// Handler name for the whole configuration value.
    pub fn set_handler(&mut self, name: &str) -> Result<()> {
        self.schema.root.handler = Some(normalize_handler_name(name)?);
        Ok(())
    }

    /// Define an abstract type.
    pub fn abstract_type(&mut self, name: &str) -> Result<()> {
        define_abstract(&mut self.schema, name)
    }

    /// Define a section type.
    pub fn section_type(&mut self, decl: SectionTypeDecl) -> Result<()> {
        define_section_type(&mut self.schema, &decl)
    }

    /// Add a child slot to the top-level type.
    pub fn root_child(&mut self, decl: impl Into<ChildDecl>) -> Result<()> {
        add_root_child(&mut self.schema, &decl.into())
    }

    /// Finish building.
    pub fn build(self) -> Result<Schema> {
        tracing::debug!(
            types = self.schema.types.len(),
            root_children = self.schema.root.children.len(),
            "schema built"
        );
        Ok(self.schema)
    }
}

fn normalize_handler_name(name: &str) -> Result<String> {
    normalize_basic_key(name)
        .map_err(|_| ConfigError::schema(format!("not a valid handler name: {:?}", name)))
}

fn key_to_string(keytype: &Conversion, raw: &str) -> Result<String> {
    match keytype(raw) {
        Ok(Value::String(key)) => Ok(key),
        Ok(Value::Int(n)) => Ok(n.to_string()),
        Ok(_) => Err(ConfigError::schema(format!(
            "keytype produced a non-key value for {:?}",
            raw
        ))),
        Err(message) => Err(ConfigError::schema(format!(
            "could not convert key name: {}",
            message
        ))),
    }
}

fn derive_attribute(name: &str) -> Result<String> {
    let base = normalize_basic_key(name).map_err(ConfigError::schema)?;
    let attribute = base.replace('-', "_");
    if is_identifier(&attribute) {
        Ok(attribute)
    } else {
        Err(ConfigError::schema(format!(
            "cannot derive an attribute name from {:?}; specify one explicitly",
            name
        )))
    }
}

fn resolve_name(
    keytype: &Conversion,
    name: &str,
    attribute: Option<&str>,
    is_key: bool,
) -> Result<(ChildName, String)> {
    if let Some(attr) = attribute {
        if !is_identifier(attr) {
            return Err(ConfigError::schema(format!(
                "attribute name is not a valid identifier: {:?}",
                attr
            )));
        }
    }
    match name {
        "*" if is_key => Err(ConfigError::schema("use of '*' for a key name is not allowed")),
        "*" | "+" => {
            let Some(attr) = attribute.filter(|a| !a.is_empty()) else {
                return Err(ConfigError::schema(
                    "container attribute must be specified and non-empty \
                     when using '*' or '+' for a name",
                ));
            };
            let child_name = if name == "*" {
                ChildName::Any
            } else {
                ChildName::Named
            };
            Ok((child_name, attr.to_string()))
        }
        "" => Err(ConfigError::schema("name must not be empty")),
        literal => {
            let normalized = key_to_string(keytype, literal)?;
            let attribute = match attribute {
                Some(attr) => attr.to_string(),
                None => derive_attribute(literal)?,
            };
            Ok((ChildName::Literal(normalized), attribute))
        }
    }
}

fn check_occurs(min_occurs: usize, max_occurs: MaxOccurs) -> Result<()> {
    if let MaxOccurs::Bounded(max) = max_occurs {
        if max < 1 {
            return Err(ConfigError::schema("maxOccurs must be at least 1"));
        }
        if min_occurs > max {
            return Err(ConfigError::schema(
                "minOccurs cannot be larger than maxOccurs",
            ));
        }
    }
    Ok(())
}

fn compile_key_defaults(
    name: &ChildName,
    keytype: &Conversion,
    defaults: &[(Option<String>, String)],
    single: bool,
) -> Result<KeyDefault> {
    if defaults.is_empty() {
        return Ok(KeyDefault::None);
    }
    match name {
        ChildName::Named => {
            let mut entries: Vec<(String, ValueInfo)> = Vec::new();
            for (key, value) in defaults {
                let Some(key) = key else {
                    return Err(ConfigError::schema(
                        "default values must be keyed when the key name is '+'",
                    ));
                };
                let normalized = key_to_string(keytype, key)?;
                if single && entries.iter().any(|(k, _)| k == &normalized) {
                    return Err(ConfigError::schema(format!(
                        "duplicate default value for key {:?}",
                        normalized
                    )));
                }
                entries.push((normalized, ValueInfo::new(value.clone(), Position::unknown())));
            }
            Ok(KeyDefault::Keyed(entries))
        }
        _ => {
            let mut infos = Vec::new();
            for (key, value) in defaults {
                if key.is_some() {
                    return Err(ConfigError::schema("unexpected key for default value"));
                }
                infos.push(ValueInfo::new(value.clone(), Position::unknown()));
            }
            if single {
                if infos.len() > 1 {
                    return Err(ConfigError::schema(
                        "cannot set more than one default for a single-valued key",
                    ));
                }
                match infos.pop() {
                    Some(info) => Ok(KeyDefault::Scalar(info)),
                    None => Ok(KeyDefault::None),
                }
            } else {
                Ok(KeyDefault::List(infos))
            }
        }
    }
}

fn compile_child(
    schema: &Schema,
    keytype: &Conversion,
    valuetype: &Conversion,
    decl: &ChildDecl,
) -> Result<ChildInfo> {
    match decl {
        ChildDecl::Key(d) => {
            let (name, attribute) = resolve_name(keytype, &d.name, d.attribute.as_deref(), true)?;
            if d.required && !d.defaults.is_empty() {
                return Err(ConfigError::schema(
                    "a required key cannot have a default value",
                ));
            }
            let datatype = match &d.datatype {
                Some(type_name) => schema.registry.get(type_name)?,
                None => valuetype.clone(),
            };
            let default = compile_key_defaults(&name, keytype, &d.defaults, true)?;
            let handler = d.handler.as_deref().map(normalize_handler_name).transpose()?;
            Ok(ChildInfo::Key(KeyInfo {
                name,
                datatype,
                min_occurs: usize::from(d.required),
                max_occurs: MaxOccurs::Bounded(1),
                handler,
                attribute,
                default,
            }))
        }
        ChildDecl::MultiKey(d) => {
            check_occurs(d.min_occurs, d.max_occurs)?;
            let (name, attribute) = resolve_name(keytype, &d.name, d.attribute.as_deref(), true)?;
            let datatype = match &d.datatype {
                Some(type_name) => schema.registry.get(type_name)?,
                None => valuetype.clone(),
            };
            let default = compile_key_defaults(&name, keytype, &d.defaults, false)?;
            let handler = d.handler.as_deref().map(normalize_handler_name).transpose()?;
            Ok(ChildInfo::Key(KeyInfo {
                name,
                datatype,
                min_occurs: d.min_occurs,
                max_occurs: d.max_occurs,
                handler,
                attribute,
                default,
            }))
        }
        ChildDecl::Section(d) => {
            let (name, attribute) = resolve_name(keytype, &d.name, d.attribute.as_deref(), false)?;
            let type_name = d.type_name.to_ascii_lowercase();
            schema.get_type(&type_name)?;
            let handler = d.handler.as_deref().map(normalize_handler_name).transpose()?;
            Ok(ChildInfo::Section(SectionInfo {
                name,
                type_name,
                min_occurs: usize::from(d.required),
                max_occurs: MaxOccurs::Bounded(1),
                handler,
                attribute,
            }))
        }
        ChildDecl::MultiSection(d) => {
            check_occurs(d.min_occurs, d.max_occurs)?;
            if d.name != "*" && d.name != "+" {
                return Err(ConfigError::schema(
                    "sections which can occur more than once must use '*' or '+' for the name",
                ));
            }
            if d.attribute.is_none() {
                return Err(ConfigError::schema(
                    "sections which can occur more than once must specify \
                     a target attribute name",
                ));
            }
            let (name, attribute) = resolve_name(keytype, &d.name, d.attribute.as_deref(), false)?;
            let type_name = d.type_name.to_ascii_lowercase();
            schema.get_type(&type_name)?;
            let handler = d.handler.as_deref().map(normalize_handler_name).transpose()?;
            Ok(ChildInfo::Section(SectionInfo {
                name,
                type_name,
                min_occurs: d.min_occurs,
                max_occurs: d.max_occurs,
                handler,
                attribute,
            }))
        }
    }
}

fn define_abstract(schema: &mut Schema, name: &str) -> Result<()> {
    let name = normalize_basic_key(name)
        .map_err(|_| ConfigError::schema(format!("not a valid abstract type name: {:?}", name)))?;
    schema.add_type(TypeDef::Abstract(AbstractType::new(name)))
}

/// Re-normalize inherited keyed defaults through a derived type's own
/// keytype.
fn renormalize_keyed_defaults(children: &mut [ChildInfo], keytype: &Conversion) -> Result<()> {
    for child in children {
        if let ChildInfo::Key(key_info) = child {
            if let KeyDefault::Keyed(entries) = &mut key_info.default {
                for (key, _) in entries.iter_mut() {
                    *key = key_to_string(keytype, key)?;
                }
            }
        }
    }
    Ok(())
}

fn define_section_type(schema: &mut Schema, decl: &SectionTypeDecl) -> Result<()> {
    let name = normalize_basic_key(&decl.name)
        .map_err(|_| ConfigError::schema(format!("not a valid section type name: {:?}", decl.name)))?;

    let base = match &decl.extends {
        Some(base_name) => match schema.get_type(base_name)? {
            TypeDef::Section(section_type) => Some(section_type.clone()),
            TypeDef::Abstract(_) => {
                return Err(ConfigError::schema(format!(
                    "a section type cannot extend an abstract type: {:?}",
                    base_name
                )))
            }
        },
        None => None,
    };

    let keytype = match &decl.keytype {
        Some(type_name) => schema.registry.get(type_name)?,
        None => match &base {
            Some(base) => base.keytype.clone(),
            None => basic_key_conversion(),
        },
    };
    let valuetype = match &decl.valuetype {
        Some(type_name) => schema.registry.get(type_name)?,
        None => string_conversion(),
    };
    let datatype = match &decl.datatype {
        Some(type_name) => schema.registry.get_section(type_name)?,
        None => match &base {
            Some(base) => base.datatype.clone(),
            None => identity_section_conversion(),
        },
    };

    let mut section_type = SectionType::new(Some(name.clone()), keytype, valuetype, datatype);
    if let Some(base) = base {
        section_type.children = base.children;
        section_type.keymap = base.keymap;
        section_type.attrmap = base.attrmap;
        section_type.arbitrary_key = base.arbitrary_key;
        let keytype = section_type.keytype.clone();
        renormalize_keyed_defaults(&mut section_type.children, &keytype)?;
    }

    let owner_keytype = section_type.keytype.clone();
    let owner_valuetype = section_type.valuetype.clone();
    for child_decl in &decl.children {
        let child = compile_child(schema, &owner_keytype, &owner_valuetype, child_decl)?;
        section_type.add_child(child)?;
    }

    schema.add_type(TypeDef::Section(section_type))?;

    if let Some(abstract_name) = &decl.implements {
        let key = abstract_name.to_ascii_lowercase();
        match schema.types.get_mut(&key) {
            Some(TypeDef::Abstract(abstract_type)) => abstract_type.add_subtype(name.clone()),
            Some(_) => {
                return Err(ConfigError::schema(format!(
                    "type specified by implements is not an abstract type: {:?}",
                    abstract_name
                )))
            }
            None => {
                return Err(ConfigError::schema(format!(
                    "unknown type name: {:?}",
                    abstract_name
                )))
            }
        }
    }

    tracing::debug!(name = %name, "section type defined");
    Ok(())
}

fn add_root_child(schema: &mut Schema, decl: &ChildDecl) -> Result<()> {
    let keytype = schema.root.keytype.clone();
    let valuetype = schema.root.valuetype.clone();
    let child = compile_child(schema, &keytype, &valuetype, decl)?;
    schema.root.add_child(child)
}
