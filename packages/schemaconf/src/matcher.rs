//! Section matcher engine
//!
//! Matchers bind configuration events (key/value pairs, section open and
//! close) against a compiled schema. One matcher tracks one section
//! instance while it is being populated; opening a nested section creates
//! a child matcher, and closing it finishes the child and hands the
//! resulting value to the parent. Finishing consumes the matcher, so a
//! finished section cannot receive further events.
//!
//! Finishing is two-phase: completion checks and defaulting run for all
//! slots first, then datatype conversion. A value whose conversion would
//! fail therefore never masks a structural error, and conversion failures
//! report the position the raw value was read at.

use crate::error::{ConfigError, Result};
use crate::schema::{
    ChildInfo, ChildName, KeyDefault, Schema, SectionInfo, SectionType, TypeDef, ValueInfo,
};
use crate::types::{Position, SectionValue, Value};
use std::collections::{BTreeMap, HashSet};
use std::ops::{Deref, DerefMut};

/// Ordered `(handler name, converted value)` pairs collected while
/// matching. Children's entries precede the parent's own, giving
/// depth-first order overall.
pub type HandlerList = Vec<(String, Value)>;

/// Pending raw state for one child slot.
enum Slot {
    Scalar(Option<ValueInfo>),
    List(Vec<ValueInfo>),
    Keyed(BTreeMap<String, Vec<ValueInfo>>),
    Section(Option<SectionValue>),
    Sections(Vec<SectionValue>),
}

fn empty_slot(child: &ChildInfo) -> Slot {
    match child {
        ChildInfo::Key(key_info) => {
            if matches!(key_info.name, ChildName::Named) {
                Slot::Keyed(BTreeMap::new())
            } else if key_info.max_occurs.is_multi() {
                Slot::List(Vec::new())
            } else {
                Slot::Scalar(None)
            }
        }
        ChildInfo::Section(section_info) => {
            if section_info.max_occurs.is_multi() {
                Slot::Sections(Vec::new())
            } else {
                Slot::Section(None)
            }
        }
    }
}

/// Builder for one section instance.
pub struct SectionMatcher<'s> {
    schema: &'s Schema,
    section_type: &'s SectionType,
    name: Option<String>,
    slots: Vec<Slot>,
    section_names: HashSet<String>,
    handlers: HandlerList,
}

impl std::fmt::Debug for SectionMatcher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionMatcher")
            .field("type", &self.section_type.name())
            .field("name", &self.name)
            .finish()
    }
}

impl<'s> SectionMatcher<'s> {
    fn for_root(schema: &'s Schema) -> Self {
        let section_type = schema.root_type();
        SectionMatcher {
            schema,
            section_type,
            name: None,
            slots: section_type.children().iter().map(empty_slot).collect(),
            section_names: HashSet::new(),
            handlers: Vec::new(),
        }
    }

    fn new(
        schema: &'s Schema,
        section_type: &'s SectionType,
        info: &SectionInfo,
        name: Option<&str>,
    ) -> Result<Self> {
        if name.is_none() && !info.allow_unnamed() {
            return Err(ConfigError::configuration(format!(
                "{:?} sections may not be unnamed",
                section_type.name().unwrap_or("")
            )));
        }
        Ok(SectionMatcher {
            schema,
            section_type,
            name: name.map(str::to_string),
            slots: section_type.children().iter().map(empty_slot).collect(),
            section_names: HashSet::new(),
            handlers: Vec::new(),
        })
    }

    /// Concrete type being populated; `None` for the top level.
    pub fn type_name(&self) -> Option<&str> {
        self.section_type.name()
    }

    /// Instance name, when the section is named.
    pub fn section_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn unknown_key_error(&self, realkey: &str, is_section_slot: bool) -> ConfigError {
        if is_section_slot {
            let scope = match self.section_type.name() {
                Some(type_name) => format!(" in {:?} sections", type_name),
                None => String::new(),
            };
            ConfigError::configuration(format!(
                "{:?} is not a valid key name{}",
                realkey, scope
            ))
        } else {
            ConfigError::configuration(format!("{:?} is not a known key name", realkey))
        }
    }

    /// Record a raw value for a key. The key is normalized through the
    /// type's keytype; the value is stored unconverted.
    pub fn add_value(&mut self, key: &str, value: &str, position: Position) -> Result<()> {
        let realkey = self
            .section_type
            .convert_key(key)
            .map_err(|message| ConfigError::Conversion {
                message,
                value: key.to_owned(),
                position: position.clone(),
            })?;

        let index = match self.section_type.child_index_by_name(&realkey) {
            Some(index) => index,
            None => match self.section_type.arbitrary_key() {
                Some(index) => index,
                None => return Err(self.unknown_key_error(&realkey, false)),
            },
        };
        let ChildInfo::Key(key_info) = &self.section_type.children()[index] else {
            return Err(self.unknown_key_error(&realkey, true));
        };
        let max_occurs = key_info.max_occurs;

        let info = ValueInfo::new(value, position);
        match &mut self.slots[index] {
            Slot::Scalar(slot) => {
                if slot.is_some() {
                    return Err(ConfigError::configuration(format!(
                        "{:?} does not support multiple values",
                        realkey
                    )));
                }
                *slot = Some(info);
            }
            Slot::List(values) => {
                if !max_occurs.allows(values.len() + 1) {
                    return Err(ConfigError::configuration(format!(
                        "too many values for {:?}",
                        realkey
                    )));
                }
                values.push(info);
            }
            Slot::Keyed(map) => {
                let values = map.entry(realkey.clone()).or_default();
                if !max_occurs.allows(values.len() + 1) {
                    return Err(ConfigError::configuration(format!(
                        "too many values for {:?}",
                        realkey
                    )));
                }
                values.push(info);
            }
            _ => return Err(self.unknown_key_error(&realkey, true)),
        }
        Ok(())
    }

    /// Create the matcher for a nested section. The type must be
    /// concrete; the slot it will fill is resolved now so that naming
    /// violations surface at the opening line.
    pub fn create_child_matcher(
        &self,
        type_name: &str,
        name: Option<&str>,
    ) -> Result<SectionMatcher<'s>> {
        let schema = self.schema;
        let section_type = self.section_type;
        let concrete = match schema.get_type(type_name)? {
            TypeDef::Abstract(abstract_type) => {
                return Err(ConfigError::configuration(format!(
                    "concrete sections cannot match abstract section types; \
                     found abstract type {:?}",
                    abstract_type.name()
                )))
            }
            TypeDef::Section(concrete) => concrete,
        };
        let concrete_name = concrete.name().unwrap_or("");
        let info = section_type.section_info(schema, concrete_name, name)?;
        if !info.is_allowed_name(name) {
            return Err(ConfigError::configuration(format!(
                "{:?} is not an allowed name for {:?} sections",
                name.unwrap_or(""),
                info.type_name()
            )));
        }
        SectionMatcher::new(schema, concrete, info, name)
    }

    /// Attach a finished child section, enforcing slot cardinality and
    /// container-wide name uniqueness, and merge the child's handler
    /// entries ahead of this matcher's own.
    pub fn add_section(
        &mut self,
        type_name: &str,
        name: Option<&str>,
        value: SectionValue,
        child_handlers: HandlerList,
    ) -> Result<()> {
        if let Some(name) = name {
            if !self.section_names.insert(name.to_string()) {
                return Err(ConfigError::configuration(format!(
                    "section names must not be re-used within the same container: {:?}",
                    name
                )));
            }
        }
        let schema = self.schema;
        let section_type = self.section_type;
        let info = section_type.section_info(schema, type_name, name)?;
        let Some(index) = section_type.child_index_by_attribute(&info.attribute) else {
            return Err(ConfigError::schema(format!(
                "no slot for attribute {:?}",
                info.attribute
            )));
        };
        let max_occurs = info.max_occurs;

        match &mut self.slots[index] {
            Slot::Section(slot) => {
                if slot.is_some() {
                    return Err(ConfigError::configuration(format!(
                        "too many instances of {:?} section",
                        type_name
                    )));
                }
                *slot = Some(value);
            }
            Slot::Sections(values) => {
                if !max_occurs.allows(values.len() + 1) {
                    return Err(ConfigError::configuration(format!(
                        "too many instances of {:?} section",
                        type_name
                    )));
                }
                values.push(value);
            }
            _ => {
                return Err(ConfigError::schema(format!(
                    "slot for attribute {:?} is not a section slot",
                    info.attribute
                )))
            }
        }
        self.handlers.extend(child_handlers);
        Ok(())
    }

    /// Close the section: run completion checks and defaulting over every
    /// slot, then convert, producing the section's value and its
    /// accumulated handler entries.
    pub fn finish(mut self) -> Result<(SectionValue, HandlerList)> {
        self.check_complete()?;

        let section_type = self.section_type;
        let mut attributes = Vec::with_capacity(section_type.children().len());
        for (index, child) in section_type.children().iter().enumerate() {
            let slot = std::mem::replace(&mut self.slots[index], Slot::Scalar(None));
            let (converted, populated) = construct_slot(self.schema, child, slot)?;
            if populated {
                if let Some(handler) = child.handler() {
                    self.handlers.push((handler.to_string(), converted.clone()));
                }
            }
            attributes.push((child.attribute().to_string(), converted));
        }

        let value = SectionValue::new(
            section_type.name().map(str::to_string),
            self.name.clone(),
            attributes,
        );
        Ok((value, self.handlers))
    }

    /// Phase one of finishing: apply defaults and verify minimum
    /// occurrence counts, in declaration order, before any conversion.
    fn check_complete(&mut self) -> Result<()> {
        let section_type = self.section_type;
        for (index, child) in section_type.children().iter().enumerate() {
            match (child, &mut self.slots[index]) {
                (ChildInfo::Key(key_info), Slot::Scalar(slot)) => {
                    if slot.is_none() {
                        match &key_info.default {
                            KeyDefault::Scalar(info) => *slot = Some(info.clone()),
                            KeyDefault::List(infos) if !infos.is_empty() => {
                                *slot = Some(infos[0].clone())
                            }
                            _ => {
                                if key_info.min_occurs > 0 {
                                    return Err(ConfigError::configuration(format!(
                                        "no values for {}; {} required",
                                        child.describe(),
                                        key_info.min_occurs
                                    )));
                                }
                            }
                        }
                    }
                }
                (ChildInfo::Key(key_info), Slot::List(values)) => {
                    if values.is_empty() {
                        match &key_info.default {
                            KeyDefault::List(infos) => *values = infos.clone(),
                            KeyDefault::Scalar(info) => values.push(info.clone()),
                            _ => {}
                        }
                    }
                    if values.len() < key_info.min_occurs {
                        return Err(ConfigError::configuration(format!(
                            "not enough values for {}; {} found, {} required",
                            child.describe(),
                            values.len(),
                            key_info.min_occurs
                        )));
                    }
                }
                (ChildInfo::Key(key_info), Slot::Keyed(map)) => {
                    if map.is_empty() {
                        if let KeyDefault::Keyed(entries) = &key_info.default {
                            for (key, info) in entries {
                                map.entry(key.clone()).or_default().push(info.clone());
                            }
                        }
                    }
                    if map.len() < key_info.min_occurs {
                        return Err(ConfigError::configuration(format!(
                            "not enough keys in the {:?} map; {} found, {} required",
                            key_info.attribute,
                            map.len(),
                            key_info.min_occurs
                        )));
                    }
                }
                (ChildInfo::Section(section_info), Slot::Section(slot)) => {
                    if slot.is_none() && section_info.min_occurs > 0 {
                        return Err(ConfigError::configuration(format!(
                            "no values for {}; {} required",
                            child.describe(),
                            section_info.min_occurs
                        )));
                    }
                }
                (ChildInfo::Section(section_info), Slot::Sections(values)) => {
                    if values.len() < section_info.min_occurs {
                        return Err(ConfigError::configuration(format!(
                            "not enough values for {}; {} found, {} required",
                            child.describe(),
                            values.len(),
                            section_info.min_occurs
                        )));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Phase two of finishing one slot: convert raw values to their typed
/// form. Returns the converted value and whether the slot was populated
/// (directly or by defaulting), which gates handler entries.
fn construct_slot(schema: &Schema, child: &ChildInfo, slot: Slot) -> Result<(Value, bool)> {
    match (child, slot) {
        (ChildInfo::Key(_), Slot::Scalar(None)) => Ok((Value::Null, false)),
        (ChildInfo::Key(key_info), Slot::Scalar(Some(info))) => {
            Ok((info.convert(&key_info.datatype)?, true))
        }
        (ChildInfo::Key(key_info), Slot::List(values)) => {
            let populated = !values.is_empty();
            let converted = values
                .iter()
                .map(|info| info.convert(&key_info.datatype))
                .collect::<Result<Vec<_>>>()?;
            Ok((Value::List(converted), populated))
        }
        (ChildInfo::Key(key_info), Slot::Keyed(map)) => {
            let populated = !map.is_empty();
            let mut converted = BTreeMap::new();
            for (key, values) in map {
                let value = if key_info.max_occurs.is_multi() {
                    Value::List(
                        values
                            .iter()
                            .map(|info| info.convert(&key_info.datatype))
                            .collect::<Result<Vec<_>>>()?,
                    )
                } else {
                    match values.first() {
                        Some(info) => info.convert(&key_info.datatype)?,
                        None => Value::Null,
                    }
                };
                converted.insert(key, value);
            }
            Ok((Value::Map(converted), populated))
        }
        (ChildInfo::Section(_), Slot::Section(None)) => Ok((Value::Null, false)),
        (ChildInfo::Section(_), Slot::Section(Some(section))) => {
            Ok((convert_section(schema, section)?, true))
        }
        (ChildInfo::Section(_), Slot::Sections(values)) => {
            let populated = !values.is_empty();
            let converted = values
                .into_iter()
                .map(|section| convert_section(schema, section))
                .collect::<Result<Vec<_>>>()?;
            Ok((Value::List(converted), populated))
        }
        // slot shapes are fixed per child kind
        _ => Ok((Value::Null, false)),
    }
}

/// Apply the section's own concrete type datatype to its assembled value.
fn convert_section(schema: &Schema, section: SectionValue) -> Result<Value> {
    let Some(type_name) = section.section_type().map(str::to_string) else {
        return Ok(Value::Section(section));
    };
    match schema.get_type(&type_name)? {
        TypeDef::Section(section_type) => (section_type.datatype)(Value::Section(section))
            .map_err(|message| ConfigError::Conversion {
                message,
                value: format!("<{} section>", type_name),
                position: Position::unknown(),
            }),
        TypeDef::Abstract(_) => Ok(Value::Section(section)),
    }
}

/// Matcher for the whole configuration: a section matcher over the
/// schema's top-level type that additionally applies the schema's own
/// datatype and handler when finishing.
pub struct SchemaMatcher<'s> {
    inner: SectionMatcher<'s>,
}

impl std::fmt::Debug for SchemaMatcher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaMatcher").finish()
    }
}

impl<'s> SchemaMatcher<'s> {
    /// Start matching a configuration against a schema.
    pub fn new(schema: &'s Schema) -> Self {
        SchemaMatcher {
            inner: SectionMatcher::for_root(schema),
        }
    }

    /// Close the configuration, producing the converted top-level value
    /// and the full handler list in depth-first order.
    pub fn finish(self) -> Result<(Value, HandlerList)> {
        let schema = self.inner.schema;
        let root = schema.root_type();
        let (section, mut handlers) = self.inner.finish()?;
        let value =
            (root.datatype)(Value::Section(section)).map_err(|message| ConfigError::Conversion {
                message,
                value: "<configuration>".to_string(),
                position: Position::unknown(),
            })?;
        if let Some(handler) = root.handler.clone() {
            handlers.push((handler, value.clone()));
        }
        tracing::debug!(handlers = handlers.len(), "configuration matched");
        Ok((value, handlers))
    }
}

impl<'s> Deref for SchemaMatcher<'s> {
    type Target = SectionMatcher<'s>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for SchemaMatcher<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{
        KeyDecl, MultiKeyDecl, MultiSectionDecl, SchemaBuilder, SectionDecl, SectionTypeDecl,
    };

    fn at(line: u64) -> Position {
        Position::new(line, None)
    }

    fn as_section(value: &Value) -> &SectionValue {
        value.as_section().expect("expected a section value")
    }

    #[test]
    fn test_scalar_key_conversion() {
        let mut builder = SchemaBuilder::new();
        builder
            .root_child(KeyDecl::new("port").datatype("integer"))
            .unwrap();
        let schema = builder.build().unwrap();

        let mut matcher = SchemaMatcher::new(&schema);
        matcher.add_value("Port", "8080", at(1)).unwrap();
        let (value, handlers) = matcher.finish().unwrap();
        assert_eq!(as_section(&value).get("port"), Some(&Value::Int(8080)));
        assert!(handlers.is_empty());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut builder = SchemaBuilder::new();
        builder.root_child(KeyDecl::new("known")).unwrap();
        let schema = builder.build().unwrap();

        let mut matcher = SchemaMatcher::new(&schema);
        let err = matcher.add_value("mystery", "x", at(1)).unwrap_err();
        assert!(err.to_string().contains("not a known key name"), "{err}");
    }

    #[test]
    fn test_single_key_rejects_second_value() {
        let mut builder = SchemaBuilder::new();
        builder.root_child(KeyDecl::new("port")).unwrap();
        let schema = builder.build().unwrap();

        let mut matcher = SchemaMatcher::new(&schema);
        matcher.add_value("port", "80", at(1)).unwrap();
        let err = matcher.add_value("port", "81", at(2)).unwrap_err();
        assert!(
            err.to_string().contains("does not support multiple values"),
            "{err}"
        );
    }

    #[test]
    fn test_multikey_bounds() {
        let mut builder = SchemaBuilder::new();
        builder
            .root_child(MultiKeyDecl::new("server").max_occurs(2))
            .unwrap();
        let schema = builder.build().unwrap();

        let mut matcher = SchemaMatcher::new(&schema);
        matcher.add_value("server", "a", at(1)).unwrap();
        matcher.add_value("server", "b", at(2)).unwrap();
        let err = matcher.add_value("server", "c", at(3)).unwrap_err();
        assert!(err.to_string().contains("too many values"), "{err}");
    }

    #[test]
    fn test_missing_required_key() {
        let mut builder = SchemaBuilder::new();
        builder.root_child(KeyDecl::new("needed").required()).unwrap();
        let schema = builder.build().unwrap();

        let matcher = SchemaMatcher::new(&schema);
        let err = matcher.finish().unwrap_err();
        assert!(err.to_string().contains("no values for"), "{err}");
    }

    #[test]
    fn test_defaults_applied() {
        let mut builder = SchemaBuilder::new();
        builder
            .root_child(KeyDecl::new("level").datatype("integer").default("3"))
            .unwrap();
        builder
            .root_child(
                MultiKeyDecl::new("path")
                    .default("/usr/bin")
                    .default("/bin"),
            )
            .unwrap();
        builder.root_child(KeyDecl::new("absent")).unwrap();
        let schema = builder.build().unwrap();

        let (value, _) = SchemaMatcher::new(&schema).finish().unwrap();
        let section = as_section(&value);
        assert_eq!(section.get("level"), Some(&Value::Int(3)));
        assert_eq!(
            section.get("path"),
            Some(&Value::List(vec![
                Value::from("/usr/bin"),
                Value::from("/bin")
            ]))
        );
        assert_eq!(section.get("absent"), Some(&Value::Null));
    }

    #[test]
    fn test_explicit_value_overrides_default() {
        let mut builder = SchemaBuilder::new();
        builder
            .root_child(KeyDecl::new("level").datatype("integer").default("3"))
            .unwrap();
        let schema = builder.build().unwrap();

        let mut matcher = SchemaMatcher::new(&schema);
        matcher.add_value("level", "7", at(1)).unwrap();
        let (value, _) = matcher.finish().unwrap();
        assert_eq!(as_section(&value).get("level"), Some(&Value::Int(7)));
    }

    #[test]
    fn test_conversion_deferred_to_finish_with_position() {
        let mut builder = SchemaBuilder::new();
        builder
            .root_child(KeyDecl::new("count").datatype("integer"))
            .unwrap();
        let schema = builder.build().unwrap();

        let mut matcher = SchemaMatcher::new(&schema);
        // intake succeeds even though the text is not a valid integer
        matcher.add_value("count", "twelve", at(4)).unwrap();
        match matcher.finish() {
            Err(ConfigError::Conversion {
                value, position, ..
            }) => {
                assert_eq!(value, "twelve");
                assert_eq!(position.line, Some(4));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_structural_error_beats_conversion_error() {
        let mut builder = SchemaBuilder::new();
        builder
            .root_child(KeyDecl::new("count").datatype("integer"))
            .unwrap();
        builder.root_child(KeyDecl::new("needed").required()).unwrap();
        let schema = builder.build().unwrap();

        let mut matcher = SchemaMatcher::new(&schema);
        matcher.add_value("count", "not-a-number", at(1)).unwrap();
        match SchemaMatcher::finish(matcher) {
            Err(ConfigError::Configuration { message, .. }) => {
                assert!(message.contains("no values for"), "{message}");
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_arbitrary_key_slot() {
        let mut builder = SchemaBuilder::new();
        builder
            .root_child(
                KeyDecl::new("+")
                    .attribute("vars")
                    .datatype("integer")
                    .keyed_default("base", "10"),
            )
            .unwrap();
        let schema = builder.build().unwrap();

        let mut matcher = SchemaMatcher::new(&schema);
        matcher.add_value("X-One", "1", at(1)).unwrap();
        matcher.add_value("x-two", "2", at(2)).unwrap();
        let (value, _) = matcher.finish().unwrap();
        match as_section(&value).get("vars") {
            Some(Value::Map(map)) => {
                // keys are normalized by the keytype; defaults only fill
                // an empty map
                assert_eq!(map.get("x-one"), Some(&Value::Int(1)));
                assert_eq!(map.get("x-two"), Some(&Value::Int(2)));
                assert!(!map.contains_key("base"));
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_arbitrary_key_defaults_fill_empty_map() {
        let mut builder = SchemaBuilder::new();
        builder
            .root_child(
                KeyDecl::new("+")
                    .attribute("vars")
                    .datatype("integer")
                    .keyed_default("base", "10"),
            )
            .unwrap();
        let schema = builder.build().unwrap();

        let (value, _) = SchemaMatcher::new(&schema).finish().unwrap();
        match as_section(&value).get("vars") {
            Some(Value::Map(map)) => assert_eq!(map.get("base"), Some(&Value::Int(10))),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_arbitrary_key_single_value_per_key() {
        let mut builder = SchemaBuilder::new();
        builder.root_child(KeyDecl::new("+").attribute("vars")).unwrap();
        let schema = builder.build().unwrap();

        let mut matcher = SchemaMatcher::new(&schema);
        matcher.add_value("dup", "1", at(1)).unwrap();
        let err = matcher.add_value("dup", "2", at(2)).unwrap_err();
        assert!(err.to_string().contains("too many values"), "{err}");
    }

    fn db_schema() -> crate::schema::Schema {
        let mut builder = SchemaBuilder::new();
        builder
            .section_type(
                SectionTypeDecl::new("db")
                    .child(KeyDecl::new("host").default("localhost"))
                    .child(KeyDecl::new("port").datatype("integer").required()),
            )
            .unwrap();
        builder
            .root_child(
                MultiSectionDecl::new("db")
                    .name("+")
                    .attribute("databases")
                    .handler("db-ready"),
            )
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_nested_section_flow() {
        let schema = db_schema();
        let mut root = SchemaMatcher::new(&schema);

        let mut child = root.create_child_matcher("db", Some("main")).unwrap();
        child.add_value("port", "5432", at(2)).unwrap();
        let (section, handlers) = child.finish().unwrap();
        root.add_section("db", Some("main"), section, handlers).unwrap();

        let (value, handlers) = root.finish().unwrap();
        let databases = as_section(&value).get("databases").unwrap();
        match databases {
            Value::List(items) => {
                let db = as_section(&items[0]);
                assert_eq!(db.section_name(), Some("main"));
                assert_eq!(db.section_type(), Some("db"));
                assert_eq!(db.get("host"), Some(&Value::from("localhost")));
                assert_eq!(db.get("port"), Some(&Value::Int(5432)));
            }
            other => panic!("unexpected value: {other:?}"),
        }
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].0, "db-ready");
    }

    #[test]
    fn test_duplicate_section_names_rejected() {
        let schema = db_schema();
        let mut root = SchemaMatcher::new(&schema);

        for _ in 0..2 {
            let mut child = root.create_child_matcher("db", Some("main")).unwrap();
            child.add_value("port", "1", at(1)).unwrap();
            let (section, handlers) = child.finish().unwrap();
            if let Err(err) = root.add_section("db", Some("main"), section, handlers) {
                assert!(err.to_string().contains("re-used"), "{err}");
                return;
            }
        }
        panic!("duplicate name was accepted");
    }

    #[test]
    fn test_unnamed_section_rejected_for_plus_slot() {
        let schema = db_schema();
        let root = SchemaMatcher::new(&schema);
        let err = root.create_child_matcher("db", None).unwrap_err();
        assert!(err.to_string().contains("may not be unnamed"), "{err}");
    }

    #[test]
    fn test_abstract_type_cannot_be_instantiated() {
        let mut builder = SchemaBuilder::new();
        builder.abstract_type("storage").unwrap();
        builder
            .section_type(SectionTypeDecl::new("filestorage").implements("storage"))
            .unwrap();
        builder
            .root_child(SectionDecl::new("storage").attribute("storage"))
            .unwrap();
        let schema = builder.build().unwrap();

        let root = SchemaMatcher::new(&schema);
        let err = root.create_child_matcher("storage", None).unwrap_err();
        assert!(err.to_string().contains("abstract"), "{err}");

        // a subtype fills the abstract slot
        let child = root.create_child_matcher("filestorage", None).unwrap();
        assert_eq!(child.type_name(), Some("filestorage"));
    }

    #[test]
    fn test_named_slot_first_match_wins() {
        // a named slot for a concrete type is declared before a wildcard
        // slot of an abstract type that the same concrete type implements
        let mut builder = SchemaBuilder::new();
        builder.abstract_type("handler").unwrap();
        builder
            .section_type(SectionTypeDecl::new("logfile").implements("handler"))
            .unwrap();
        builder
            .root_child(SectionDecl::new("logfile").name("primary").attribute("primary"))
            .unwrap();
        builder
            .root_child(
                MultiSectionDecl::new("handler")
                    .name("*")
                    .attribute("handlers"),
            )
            .unwrap();
        let schema = builder.build().unwrap();

        let mut root = SchemaMatcher::new(&schema);

        let child = root.create_child_matcher("logfile", Some("primary")).unwrap();
        let (section, handlers) = child.finish().unwrap();
        root.add_section("logfile", Some("primary"), section, handlers)
            .unwrap();

        let child = root.create_child_matcher("logfile", None).unwrap();
        let (section, handlers) = child.finish().unwrap();
        root.add_section("logfile", None, section, handlers).unwrap();

        let (value, _) = root.finish().unwrap();
        let section = as_section(&value);
        assert!(matches!(section.get("primary"), Some(Value::Section(_))));
        match section.get("handlers") {
            Some(Value::List(items)) => assert_eq!(items.len(), 1),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_section_name_conflicts_with_key() {
        let mut builder = SchemaBuilder::new();
        builder.section_type(SectionTypeDecl::new("db")).unwrap();
        builder.root_child(KeyDecl::new("main")).unwrap();
        builder
            .root_child(MultiSectionDecl::new("db").name("+").attribute("dbs"))
            .unwrap();
        let schema = builder.build().unwrap();

        let root = SchemaMatcher::new(&schema);
        let err = root.create_child_matcher("db", Some("main")).unwrap_err();
        assert!(err.to_string().contains("in use for key"), "{err}");
    }

    #[test]
    fn test_schema_handler_appended_last() {
        let mut builder = SchemaBuilder::new();
        builder.set_handler("app").unwrap();
        builder
            .root_child(KeyDecl::new("greeting").default("hi").handler("greet"))
            .unwrap();
        let schema = builder.build().unwrap();

        let (_, handlers) = SchemaMatcher::new(&schema).finish().unwrap();
        let names: Vec<&str> = handlers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["greet", "app"]);
    }

    #[test]
    fn test_handler_skipped_for_unpopulated_slot() {
        let mut builder = SchemaBuilder::new();
        builder
            .root_child(KeyDecl::new("opt").handler("on-opt"))
            .unwrap();
        let schema = builder.build().unwrap();

        let (_, handlers) = SchemaMatcher::new(&schema).finish().unwrap();
        assert!(handlers.is_empty());
    }
}
