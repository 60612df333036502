//! Compiled schema model
//!
//! A [`Schema`] is the immutable result of building: a root [`SectionType`]
//! plus a name-keyed table of section and abstract types. Section types
//! reference each other by name through that table, so the model stays an
//! acyclic value even when types mention themselves.
//!
//! Matching never mutates a schema; the loader works on a private clone
//! when `%import` extends one.

use crate::datatypes::{Conversion, Registry, SectionConversion};
use crate::error::{ConfigError, Result};
use crate::types::{Position, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Upper bound on how many times a child slot may be filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxOccurs {
    /// At most this many occurrences
    Bounded(usize),
    /// No upper bound
    Unbounded,
}

impl MaxOccurs {
    /// Whether `count` occurrences stay within the bound.
    pub fn allows(self, count: usize) -> bool {
        match self {
            MaxOccurs::Bounded(max) => count <= max,
            MaxOccurs::Unbounded => true,
        }
    }

    /// Whether more than one occurrence is permitted.
    pub fn is_multi(self) -> bool {
        match self {
            MaxOccurs::Bounded(max) => max > 1,
            MaxOccurs::Unbounded => true,
        }
    }
}

/// Declared name of a child slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildName {
    /// A fixed name; the instance must use exactly this name
    Literal(String),
    /// `*`: any name, or no name at all
    Any,
    /// `+`: any name, but a name is required
    Named,
}

impl ChildName {
    /// Whether this is one of the wildcard forms.
    pub fn is_wildcard(&self) -> bool {
        !matches!(self, ChildName::Literal(_))
    }
}

/// A raw configuration value captured with its source position.
///
/// Conversion is deferred until the enclosing section finishes, so the
/// position travels along to make late failures reportable at the line
/// the value was read.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueInfo {
    /// Raw text after substitution
    pub value: String,
    /// Where the text was read
    pub position: Position,
}

impl ValueInfo {
    /// Capture raw text at a position.
    pub fn new(value: impl Into<String>, position: Position) -> Self {
        ValueInfo {
            value: value.into(),
            position,
        }
    }

    /// Apply a datatype conversion, attributing failure to the position
    /// the value was originally read at.
    pub fn convert(&self, datatype: &Conversion) -> Result<Value> {
        datatype(&self.value).map_err(|message| ConfigError::Conversion {
            message,
            value: self.value.clone(),
            position: self.position.clone(),
        })
    }
}

/// Schema-supplied default for a key slot.
#[derive(Debug, Clone)]
pub enum KeyDefault {
    /// No default
    None,
    /// Single default for a single-valued key
    Scalar(ValueInfo),
    /// Defaults for a multi-valued key
    List(Vec<ValueInfo>),
    /// Per-key defaults for an arbitrary-key slot, keyed by the
    /// keytype-normalized key
    Keyed(Vec<(String, ValueInfo)>),
}

impl KeyDefault {
    /// Whether any default value is present.
    pub fn is_some(&self) -> bool {
        !matches!(self, KeyDefault::None)
    }
}

/// Compiled declaration of a key slot.
#[derive(Clone)]
pub struct KeyInfo {
    pub(crate) name: ChildName,
    pub(crate) datatype: Conversion,
    pub(crate) min_occurs: usize,
    pub(crate) max_occurs: MaxOccurs,
    pub(crate) handler: Option<String>,
    pub(crate) attribute: String,
    pub(crate) default: KeyDefault,
}

impl fmt::Debug for KeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyInfo")
            .field("name", &self.name)
            .field("attribute", &self.attribute)
            .field("min_occurs", &self.min_occurs)
            .field("max_occurs", &self.max_occurs)
            .finish()
    }
}

/// Compiled declaration of a section slot.
///
/// The target type is referenced by name; it may be concrete or abstract
/// and resolves through the schema's type table at match time.
#[derive(Debug, Clone)]
pub struct SectionInfo {
    pub(crate) name: ChildName,
    pub(crate) type_name: String,
    pub(crate) min_occurs: usize,
    pub(crate) max_occurs: MaxOccurs,
    pub(crate) handler: Option<String>,
    pub(crate) attribute: String,
}

impl SectionInfo {
    /// Whether instances may omit a name.
    pub fn allow_unnamed(&self) -> bool {
        matches!(self.name, ChildName::Any)
    }

    /// Whether `name` is acceptable for an instance of this slot.
    pub fn is_allowed_name(&self, name: Option<&str>) -> bool {
        if matches!(name, Some("*") | Some("+")) {
            return false;
        }
        match &self.name {
            ChildName::Named => matches!(name, Some(n) if !n.is_empty()),
            ChildName::Any => true,
            ChildName::Literal(literal) => name == Some(literal.as_str()),
        }
    }

    /// Name of the declared target type (concrete or abstract).
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

/// A child slot of a section type: either a key or a nested section.
#[derive(Debug, Clone)]
pub enum ChildInfo {
    /// Key slot
    Key(KeyInfo),
    /// Section slot
    Section(SectionInfo),
}

impl ChildInfo {
    /// Target attribute name in the finished section value.
    pub fn attribute(&self) -> &str {
        match self {
            ChildInfo::Key(k) => &k.attribute,
            ChildInfo::Section(s) => &s.attribute,
        }
    }

    /// Handler name the slot contributes to, if any.
    pub fn handler(&self) -> Option<&str> {
        match self {
            ChildInfo::Key(k) => k.handler.as_deref(),
            ChildInfo::Section(s) => s.handler.as_deref(),
        }
    }

    /// Minimum number of occurrences.
    pub fn min_occurs(&self) -> usize {
        match self {
            ChildInfo::Key(k) => k.min_occurs,
            ChildInfo::Section(s) => s.min_occurs,
        }
    }

    /// Maximum number of occurrences.
    pub fn max_occurs(&self) -> MaxOccurs {
        match self {
            ChildInfo::Key(k) => k.max_occurs,
            ChildInfo::Section(s) => s.max_occurs,
        }
    }

    /// Whether this is a section slot.
    pub fn is_section(&self) -> bool {
        matches!(self, ChildInfo::Section(_))
    }

    /// Name the slot is looked up under, when it has one: the literal
    /// name, or `"+"` for an arbitrary-key slot. Wildcard section slots
    /// have no lookup name and resolve by type instead.
    pub(crate) fn lookup_key(&self) -> Option<&str> {
        match self {
            ChildInfo::Key(k) => match &k.name {
                ChildName::Literal(name) => Some(name),
                ChildName::Named => Some("+"),
                ChildName::Any => None,
            },
            ChildInfo::Section(s) => match &s.name {
                ChildName::Literal(name) => Some(name),
                _ => None,
            },
        }
    }

    /// Human-readable slot description for cardinality messages.
    pub(crate) fn describe(&self) -> String {
        match self.lookup_key() {
            Some(key) => format!("{:?}", key),
            None => match self {
                ChildInfo::Section(s) => format!("section type {:?}", s.type_name),
                ChildInfo::Key(k) => format!("{:?}", k.attribute),
            },
        }
    }
}

/// Compiled section type: an ordered list of child slots plus the
/// keytype, valuetype, and section datatype attributes.
#[derive(Clone)]
pub struct SectionType {
    pub(crate) name: Option<String>,
    pub(crate) keytype: Conversion,
    pub(crate) valuetype: Conversion,
    pub(crate) datatype: SectionConversion,
    pub(crate) handler: Option<String>,
    pub(crate) children: Vec<ChildInfo>,
    pub(crate) keymap: HashMap<String, usize>,
    pub(crate) attrmap: HashMap<String, usize>,
    pub(crate) arbitrary_key: Option<usize>,
}

impl fmt::Debug for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionType")
            .field("name", &self.name)
            .field("children", &self.children)
            .finish()
    }
}

impl SectionType {
    pub(crate) fn new(
        name: Option<String>,
        keytype: Conversion,
        valuetype: Conversion,
        datatype: SectionConversion,
    ) -> Self {
        SectionType {
            name,
            keytype,
            valuetype,
            datatype,
            handler: None,
            children: Vec::new(),
            keymap: HashMap::new(),
            attrmap: HashMap::new(),
            arbitrary_key: None,
        }
    }

    /// Name of the type, or `None` for the top-level type.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Child slots in declaration order.
    pub fn children(&self) -> &[ChildInfo] {
        &self.children
    }

    /// Look up a child slot by its declared name.
    pub fn child_by_name(&self, key: &str) -> Option<&ChildInfo> {
        self.keymap.get(key).map(|&i| &self.children[i])
    }

    pub(crate) fn child_index_by_name(&self, key: &str) -> Option<usize> {
        self.keymap.get(key).copied()
    }

    pub(crate) fn child_index_by_attribute(&self, attribute: &str) -> Option<usize> {
        self.attrmap.get(attribute).copied()
    }

    pub(crate) fn arbitrary_key(&self) -> Option<usize> {
        self.arbitrary_key
    }

    /// Normalize a raw key through the type's keytype conversion.
    pub(crate) fn convert_key(&self, raw: &str) -> std::result::Result<String, String> {
        match (self.keytype)(raw)? {
            Value::String(key) => Ok(key),
            Value::Int(n) => Ok(n.to_string()),
            _ => Err(format!("keytype produced a non-key value for {:?}", raw)),
        }
    }

    pub(crate) fn add_child(&mut self, child: ChildInfo) -> Result<()> {
        if let Some(key) = child.lookup_key() {
            if self.keymap.contains_key(key) {
                return Err(ConfigError::schema(format!(
                    "child name {:?} already used",
                    key
                )));
            }
        }
        if self.attrmap.contains_key(child.attribute()) {
            return Err(ConfigError::schema(format!(
                "child attribute name {:?} already used",
                child.attribute()
            )));
        }
        if let ChildInfo::Key(k) = &child {
            if matches!(k.name, ChildName::Named) && self.arbitrary_key.is_some() {
                return Err(ConfigError::schema(
                    "at most one '+' key slot may be declared per section type",
                ));
            }
        }

        let index = self.children.len();
        if let Some(key) = child.lookup_key() {
            self.keymap.insert(key.to_string(), index);
        }
        self.attrmap.insert(child.attribute().to_string(), index);
        if let ChildInfo::Key(k) = &child {
            if matches!(k.name, ChildName::Named) {
                self.arbitrary_key = Some(index);
            }
        }
        self.children.push(child);
        Ok(())
    }

    /// Resolve which section slot an instance of concrete type
    /// `type_name` with the given instance name fills.
    ///
    /// Children are scanned in declaration order and the first match
    /// wins. Named slots match on the instance name and then verify the
    /// type (resolving abstract declarations through their subtypes);
    /// wildcard slots match on the type, either directly or through
    /// abstract subtype membership.
    pub fn section_info<'a>(
        &'a self,
        schema: &'a Schema,
        type_name: &str,
        name: Option<&str>,
    ) -> Result<&'a SectionInfo> {
        for child in &self.children {
            if let Some(key) = child.lookup_key() {
                if Some(key) != name {
                    continue;
                }
                let ChildInfo::Section(info) = child else {
                    return Err(ConfigError::configuration(format!(
                        "section name {:?} already in use for key",
                        key
                    )));
                };
                return match schema.get_type(&info.type_name)? {
                    TypeDef::Abstract(abstract_type) => {
                        if abstract_type.has_subtype(type_name) {
                            Ok(info)
                        } else {
                            Err(ConfigError::configuration(format!(
                                "section type {:?} not allowed for name {:?}",
                                type_name, key
                            )))
                        }
                    }
                    TypeDef::Section(declared) => {
                        if declared.name.as_deref() == Some(type_name) {
                            Ok(info)
                        } else {
                            Err(ConfigError::configuration(format!(
                                "name {:?} must be used for a {:?} section",
                                key,
                                declared.name.as_deref().unwrap_or("")
                            )))
                        }
                    }
                };
            }
            let ChildInfo::Section(info) = child else {
                continue;
            };
            match schema.get_type(&info.type_name)? {
                TypeDef::Section(_) => {
                    if info.type_name == type_name {
                        return Ok(info);
                    }
                }
                TypeDef::Abstract(abstract_type) => {
                    if abstract_type.has_subtype(type_name) {
                        return Ok(info);
                    }
                }
            }
        }
        Err(ConfigError::configuration(format!(
            "no matching section defined for type {:?}, name {:?}",
            type_name,
            name.unwrap_or("")
        )))
    }
}

/// An abstract type: a named union of concrete section types.
#[derive(Debug, Clone)]
pub struct AbstractType {
    pub(crate) name: String,
    pub(crate) subtypes: BTreeSet<String>,
}

impl AbstractType {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        AbstractType {
            name: name.into(),
            subtypes: BTreeSet::new(),
        }
    }

    /// Name of the abstract type.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a concrete type name is a registered subtype.
    pub fn has_subtype(&self, name: &str) -> bool {
        self.subtypes.contains(name)
    }

    /// Registered subtype names, sorted.
    pub fn subtype_names(&self) -> impl Iterator<Item = &str> {
        self.subtypes.iter().map(String::as_str)
    }

    pub(crate) fn add_subtype(&mut self, name: String) {
        self.subtypes.insert(name);
    }
}

/// A named entry in the schema's type table.
#[derive(Debug, Clone)]
pub enum TypeDef {
    /// Concrete section type
    Section(SectionType),
    /// Abstract type
    Abstract(AbstractType),
}

impl TypeDef {
    /// Whether the entry is abstract.
    pub fn is_abstract(&self) -> bool {
        matches!(self, TypeDef::Abstract(_))
    }

    /// Name of the type.
    pub fn name(&self) -> &str {
        match self {
            TypeDef::Section(section) => section.name.as_deref().unwrap_or(""),
            TypeDef::Abstract(abstract_type) => &abstract_type.name,
        }
    }
}

/// Immutable compiled schema.
#[derive(Clone)]
pub struct Schema {
    pub(crate) root: SectionType,
    pub(crate) types: HashMap<String, TypeDef>,
    pub(crate) components: BTreeSet<String>,
    pub(crate) url: Option<String>,
    pub(crate) registry: Registry,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("url", &self.url)
            .field("types", &self.types.len())
            .field("components", &self.components)
            .finish()
    }
}

impl Schema {
    /// The top-level section type.
    pub fn root_type(&self) -> &SectionType {
        &self.root
    }

    /// Look up a type by name; the lookup is case-insensitive.
    pub fn get_type(&self, name: &str) -> Result<&TypeDef> {
        let key = name.to_ascii_lowercase();
        self.types
            .get(&key)
            .ok_or_else(|| ConfigError::schema(format!("unknown type name: {:?}", name)))
    }

    /// Names of all defined types, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Whether a schema component has already been applied.
    pub fn has_component(&self, name: &str) -> bool {
        self.components.contains(name)
    }

    /// Handler name declared on the schema itself, if any.
    pub fn handler(&self) -> Option<&str> {
        self.root.handler.as_deref()
    }

    /// Source url the schema was built from, if recorded.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// The datatype registry the schema was compiled against.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn add_component(&mut self, name: String) {
        self.components.insert(name);
    }

    pub(crate) fn add_type(&mut self, def: TypeDef) -> Result<()> {
        let name = def.name().to_string();
        if self.types.contains_key(&name) {
            return Err(ConfigError::schema(format!(
                "type name cannot be redefined: {:?}",
                name
            )));
        }
        self.types.insert(name, def);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_occurs() {
        assert!(MaxOccurs::Bounded(2).allows(2));
        assert!(!MaxOccurs::Bounded(2).allows(3));
        assert!(MaxOccurs::Unbounded.allows(usize::MAX));
        assert!(!MaxOccurs::Bounded(1).is_multi());
        assert!(MaxOccurs::Bounded(2).is_multi());
        assert!(MaxOccurs::Unbounded.is_multi());
    }

    #[test]
    fn test_is_allowed_name() {
        let info = |name: ChildName| SectionInfo {
            name,
            type_name: "db".to_string(),
            min_occurs: 0,
            max_occurs: MaxOccurs::Bounded(1),
            handler: None,
            attribute: "db".to_string(),
        };

        let any = info(ChildName::Any);
        assert!(any.is_allowed_name(None));
        assert!(any.is_allowed_name(Some("main")));
        assert!(!any.is_allowed_name(Some("*")));
        assert!(any.allow_unnamed());

        let named = info(ChildName::Named);
        assert!(!named.is_allowed_name(None));
        assert!(named.is_allowed_name(Some("main")));
        assert!(!named.is_allowed_name(Some("+")));
        assert!(!named.allow_unnamed());

        let literal = info(ChildName::Literal("main".to_string()));
        assert!(literal.is_allowed_name(Some("main")));
        assert!(!literal.is_allowed_name(Some("other")));
        assert!(!literal.is_allowed_name(None));
    }

    #[test]
    fn test_value_info_convert_keeps_position() {
        let registry = Registry::new();
        let integer = registry.get("integer").unwrap();
        let info = ValueInfo::new("oops", Position::new(5, Some("x.conf".to_string())));
        match info.convert(&integer) {
            Err(ConfigError::Conversion {
                value, position, ..
            }) => {
                assert_eq!(value, "oops");
                assert_eq!(position.line, Some(5));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
