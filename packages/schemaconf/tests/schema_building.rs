//! Schema compilation tests: type derivation, abstract types, defaults,
//! naming rules, and custom datatypes, exercised through full loads.

use std::sync::Arc;

use schemaconf::{
    ConfigLoader, KeyDecl, MultiSectionDecl, Registry, SchemaBuilder, SectionDecl,
    SectionTypeDecl, Value,
};

fn load_with(schema: &schemaconf::Schema, text: &str) -> schemaconf::Result<Value> {
    ConfigLoader::new(schema)
        .load_str(text, None)
        .map(|(value, _)| value)
}

#[test]
fn test_extends_copies_and_augments_children() {
    let mut builder = SchemaBuilder::new();
    builder
        .section_type(
            SectionTypeDecl::new("database")
                .child(KeyDecl::new("dsn").required())
                .child(KeyDecl::new("pool-size").datatype("integer").default("4")),
        )
        .expect("base type");
    builder
        .section_type(
            SectionTypeDecl::new("replicated-database")
                .extends("database")
                .child(KeyDecl::new("replica-of").required()),
        )
        .expect("derived type");
    builder
        .root_child(SectionDecl::new("replicated-database").attribute("db"))
        .expect("slot");
    let schema = builder.build().expect("schema");

    let value = load_with(
        &schema,
        "\
<replicated-database>
  dsn postgres://replica
  replica-of main
</replicated-database>
",
    )
    .expect("load");
    let db = value
        .as_section()
        .and_then(|root| root.get("db"))
        .and_then(Value::as_section)
        .expect("db");
    // inherited slot with its default, plus the new slot
    assert_eq!(db.get("pool_size").and_then(Value::as_int), Some(4));
    assert_eq!(db.get("replica_of").and_then(Value::as_str), Some("main"));

    // inherited required key still enforced
    let err = load_with(
        &schema,
        "<replicated-database>\nreplica-of main\n</replicated-database>\n",
    )
    .unwrap_err();
    assert!(err.to_string().contains("no values for \"dsn\""), "{err}");
}

#[test]
fn test_extends_requires_concrete_base() {
    let mut builder = SchemaBuilder::new();
    builder.abstract_type("storage").expect("abstract");
    let err = builder
        .section_type(SectionTypeDecl::new("disk").extends("storage"))
        .unwrap_err();
    assert!(err.to_string().contains("abstract"), "{err}");
}

#[test]
fn test_abstract_slot_accepts_any_subtype() {
    let mut builder = SchemaBuilder::new();
    builder.abstract_type("storage").expect("abstract");
    builder
        .section_type(
            SectionTypeDecl::new("disk")
                .implements("storage")
                .child(KeyDecl::new("path").required()),
        )
        .expect("disk");
    builder
        .section_type(
            SectionTypeDecl::new("memory")
                .implements("storage")
                .child(KeyDecl::new("limit").datatype("byte-size").required()),
        )
        .expect("memory");
    builder
        .root_child(
            MultiSectionDecl::new("storage")
                .name("*")
                .attribute("backends"),
        )
        .expect("slot");
    let schema = builder.build().expect("schema");

    let value = load_with(
        &schema,
        "\
<disk>
  path /var/data
</disk>
<memory>
  limit 64mb
</memory>
",
    )
    .expect("load");
    let backends = value
        .as_section()
        .and_then(|root| root.get("backends"))
        .and_then(Value::as_list)
        .expect("backends");
    assert_eq!(backends.len(), 2);
    assert_eq!(backends[0].as_section().and_then(|s| s.section_type()), Some("disk"));
    assert_eq!(
        backends[1].as_section().and_then(|s| s.section_type()),
        Some("memory")
    );

    // the abstract type itself cannot appear in a document
    let err = load_with(&schema, "<storage>\n</storage>\n").unwrap_err();
    assert!(err.to_string().contains("abstract"), "{err}");
}

#[test]
fn test_required_key_cannot_have_default() {
    let mut builder = SchemaBuilder::new();
    let err = builder
        .root_child(KeyDecl::new("port").required().default("80"))
        .unwrap_err();
    assert!(
        err.to_string()
            .contains("a required key cannot have a default value"),
        "{err}"
    );
}

#[test]
fn test_wildcard_section_needs_attribute() {
    let mut builder = SchemaBuilder::new();
    builder
        .section_type(SectionTypeDecl::new("database"))
        .expect("type");
    let err = builder
        .root_child(MultiSectionDecl::new("database").name("*"))
        .unwrap_err();
    assert!(
        err.to_string().contains("container attribute"),
        "{err}"
    );
}

#[test]
fn test_keyed_defaults_only_for_arbitrary_keys() {
    let mut builder = SchemaBuilder::new();
    let err = builder
        .root_child(KeyDecl::new("port").keyed_default("http", "80"))
        .unwrap_err();
    assert!(
        err.to_string().contains("unexpected key for default value"),
        "{err}"
    );

    let mut builder = SchemaBuilder::new();
    let err = builder
        .root_child(KeyDecl::new("+").attribute("env").default("x"))
        .unwrap_err();
    assert!(
        err.to_string().contains("must be keyed"),
        "{err}"
    );
}

#[test]
fn test_keyed_defaults_fill_empty_map() {
    let mut builder = SchemaBuilder::new();
    builder
        .root_child(
            KeyDecl::new("+")
                .attribute("limits")
                .datatype("integer")
                .keyed_default("soft", "100")
                .keyed_default("hard", "200"),
        )
        .expect("limits");
    let schema = builder.build().expect("schema");

    let value = load_with(&schema, "").expect("load");
    let limits = value
        .as_section()
        .and_then(|root| root.get("limits"))
        .and_then(Value::as_map)
        .expect("limits map");
    assert_eq!(limits.get("soft").and_then(Value::as_int), Some(100));
    assert_eq!(limits.get("hard").and_then(Value::as_int), Some(200));

    // any written key suppresses all keyed defaults
    let value = load_with(&schema, "soft 5\n").expect("load");
    let limits = value
        .as_section()
        .and_then(|root| root.get("limits"))
        .and_then(Value::as_map)
        .expect("limits map");
    assert_eq!(limits.get("soft").and_then(Value::as_int), Some(5));
    assert!(limits.get("hard").is_none());
}

#[test]
fn test_valuetype_applies_to_untyped_keys() {
    let mut builder = SchemaBuilder::new();
    builder
        .section_type(
            SectionTypeDecl::new("limits")
                .valuetype("integer")
                .child(KeyDecl::new("open-files"))
                .child(KeyDecl::new("label").datatype("string")),
        )
        .expect("type");
    builder
        .root_child(SectionDecl::new("limits").attribute("limits"))
        .expect("slot");
    let schema = builder.build().expect("schema");

    let value = load_with(
        &schema,
        "<limits>\nopen-files 1024\nlabel batch\n</limits>\n",
    )
    .expect("load");
    let limits = value
        .as_section()
        .and_then(|root| root.get("limits"))
        .and_then(Value::as_section)
        .expect("limits");
    assert_eq!(limits.get("open_files").and_then(Value::as_int), Some(1024));
    assert_eq!(limits.get("label").and_then(Value::as_str), Some("batch"));
}

#[test]
fn test_literal_named_slot_enforces_its_name() {
    let mut builder = SchemaBuilder::new();
    builder
        .section_type(SectionTypeDecl::new("database").child(KeyDecl::new("dsn")))
        .expect("type");
    builder
        .root_child(SectionDecl::new("database").name("main"))
        .expect("slot");
    let schema = builder.build().expect("schema");

    let value = load_with(&schema, "<database main>\ndsn x\n</database>\n").expect("load");
    let db = value
        .as_section()
        .and_then(|root| root.get("main"))
        .and_then(Value::as_section)
        .expect("db");
    assert_eq!(db.section_name(), Some("main"));

    let err = load_with(&schema, "<database other>\ndsn x\n</database>\n").unwrap_err();
    assert!(err.to_string().contains("no matching section"), "{err}");

    let err = load_with(&schema, "<database>\ndsn x\n</database>\n").unwrap_err();
    assert!(err.to_string().contains("no matching section"), "{err}");
}

#[test]
fn test_unknown_type_names_rejected_at_build() {
    let mut builder = SchemaBuilder::new();
    let err = builder
        .root_child(SectionDecl::new("missing").attribute("m"))
        .unwrap_err();
    assert!(err.to_string().contains("unknown type name"), "{err}");

    let mut builder = SchemaBuilder::new();
    let err = builder
        .root_child(KeyDecl::new("k").datatype("no-such-type"))
        .unwrap_err();
    assert!(err.to_string().contains("unknown datatype name"), "{err}");
}

#[test]
fn test_custom_scalar_datatype() {
    let mut registry = Registry::new();
    registry
        .register(
            "com.example.csv",
            Arc::new(|raw: &str| {
                Ok(Value::List(
                    raw.split(',')
                        .map(|part| Value::String(part.trim().to_string()))
                        .collect(),
                ))
            }),
        )
        .expect("register");

    let mut builder = SchemaBuilder::with_registry(registry);
    builder
        .root_child(KeyDecl::new("tags").datatype("com.example.csv"))
        .expect("tags");
    let schema = builder.build().expect("schema");

    let value = load_with(&schema, "tags a, b, c\n").expect("load");
    let tags = value
        .as_section()
        .and_then(|root| root.get("tags"))
        .and_then(Value::as_list)
        .expect("tags");
    assert_eq!(tags.len(), 3);
    assert_eq!(tags[1].as_str(), Some("b"));
}

#[test]
fn test_custom_section_datatype() {
    let mut registry = Registry::new();
    registry
        .register_section(
            "dsn-only",
            Arc::new(|value: Value| match value {
                Value::Section(section) => section
                    .get("dsn")
                    .cloned()
                    .ok_or_else(|| "section has no dsn".to_string()),
                other => Ok(other),
            }),
        )
        .expect("register");

    let mut builder = SchemaBuilder::with_registry(registry);
    builder
        .section_type(
            SectionTypeDecl::new("database")
                .datatype("dsn-only")
                .child(KeyDecl::new("dsn").required()),
        )
        .expect("type");
    builder
        .root_child(SectionDecl::new("database").attribute("db"))
        .expect("slot");
    let schema = builder.build().expect("schema");

    // the section datatype replaces the section value entirely
    let value = load_with(&schema, "<database>\ndsn postgres://x\n</database>\n").expect("load");
    let db = value
        .as_section()
        .and_then(|root| root.get("db"))
        .expect("db");
    assert_eq!(db.as_str(), Some("postgres://x"));
}

#[test]
fn test_type_names_cannot_be_redefined() {
    let mut builder = SchemaBuilder::new();
    builder
        .section_type(SectionTypeDecl::new("database"))
        .expect("first");
    let err = builder
        .section_type(SectionTypeDecl::new("Database"))
        .unwrap_err();
    assert!(err.to_string().contains("cannot be redefined"), "{err}");
}
