//! Core value types produced by configuration loading
//!
//! A finished load yields a tree of [`Value`]s. Scalar keys convert to the
//! scalar variants, multi-valued keys to [`Value::List`], arbitrary-key
//! slots to [`Value::Map`], and nested sections to [`Value::Section`]
//! wrapping a [`SectionValue`] attribute bag.

use chrono::Duration;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Source position of a raw configuration value.
///
/// Carried from intake through deferred datatype conversion so that a
/// conversion failure can report the line the value came from, not the
/// line on which the enclosing section closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    /// 1-based line number, if known
    pub line: Option<u64>,
    /// 1-based column number, if known
    pub column: Option<u64>,
    /// URL or file path of the resource the value came from
    pub url: Option<String>,
}

impl Position {
    /// Position at a known line within an optionally-known resource.
    pub fn new(line: u64, url: Option<String>) -> Self {
        Position {
            line: Some(line),
            column: None,
            url,
        }
    }

    /// Position with full line/column information.
    pub fn with_column(line: u64, column: u64, url: Option<String>) -> Self {
        Position {
            line: Some(line),
            column: Some(column),
            url,
        }
    }

    /// Placeholder for values with no recoverable source position,
    /// such as section conversions and schema-supplied defaults.
    pub fn unknown() -> Self {
        Position {
            line: None,
            column: None,
            url: None,
        }
    }

    /// Whether any component of the position is known.
    pub fn is_known(&self) -> bool {
        self.line.is_some() || self.url.is_some()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => {
                write!(f, "line {}", line)?;
                if let Some(column) = self.column {
                    write!(f, ", column {}", column)?;
                }
                if let Some(url) = &self.url {
                    write!(f, ", in {}", url)?;
                }
                Ok(())
            }
            None => match &self.url {
                Some(url) => write!(f, "in {}", url),
                None => write!(f, "unknown position"),
            },
        }
    }
}

/// A host/port pair produced by the `inet-address` family of datatypes.
///
/// The port is optional; a bare host name or a bare port number are both
/// accepted forms in configuration text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InetAddress {
    /// Lower-cased host name or address; may be empty for wildcard binds
    pub host: String,
    /// Port number, if one was given
    pub port: Option<u16>,
}

impl fmt::Display for InetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) if self.host.contains(':') => write!(f, "[{}]:{}", self.host, port),
            Some(port) => write!(f, "{}:{}", self.host, port),
            None => write!(f, "{}", self.host),
        }
    }
}

/// Address family of a [`SocketAddress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddressFamily {
    /// Filesystem (unix-domain) socket
    Unix,
    /// IPv4 socket
    Inet,
    /// IPv6 socket
    Inet6,
}

/// Result of the `socket-address` datatype.
///
/// Addresses containing a path separator are unix-domain paths; anything
/// else parses as an inet address. No DNS lookup is performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SocketAddress {
    /// Path of a unix-domain socket
    Unix(String),
    /// Host/port of an inet socket
    Inet(InetAddress),
}

impl SocketAddress {
    /// The address family implied by the parsed form.
    pub fn family(&self) -> AddressFamily {
        match self {
            SocketAddress::Unix(_) => AddressFamily::Unix,
            SocketAddress::Inet(addr) if addr.host.contains(':') => AddressFamily::Inet6,
            SocketAddress::Inet(_) => AddressFamily::Inet,
        }
    }
}

/// A typed configuration value.
///
/// Produced by datatype conversion during [`finish`](crate::matcher::SectionMatcher::finish);
/// raw configuration text never appears here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent optional value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Multi-valued key or multi-section slot
    List(Vec<Value>),
    /// Arbitrary-key slot, keyed by the normalized key
    Map(BTreeMap<String, Value>),
    /// Nested section
    Section(SectionValue),
    /// `inet-address` result
    InetAddress(InetAddress),
    /// `socket-address` result
    SocketAddress(SocketAddress),
    /// `timedelta` result
    Duration(#[serde(serialize_with = "serialize_duration")] Duration),
}

fn serialize_duration<S: Serializer>(d: &Duration, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_f64(d.num_milliseconds() as f64 / 1000.0)
}

impl Value {
    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get value as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get value as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get value as f64, widening integers
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get value as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get value as list reference
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Try to get value as keyed-map reference
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Try to get value as nested section reference
    pub fn as_section(&self) -> Option<&SectionValue> {
        match self {
            Value::Section(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get value as a duration
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Value::Duration(d) => Some(*d),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Immutable attribute bag produced for one finished section instance.
///
/// One attribute per schema child slot, in declaration order, bound under
/// the slot's target attribute name. Carries the instance name (for named
/// sections) and the concrete section type name for introspection. Never
/// mutated after construction; derived configurations must be rebuilt
/// through a fresh load.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionValue {
    type_name: Option<String>,
    name: Option<String>,
    attributes: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

/// Sections serialize as plain attribute maps; the type and instance
/// names are introspection metadata, not configuration data.
impl Serialize for SectionValue {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        let mut map = ser.serialize_map(Some(self.attributes.len()))?;
        for (name, value) in &self.attributes {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl SectionValue {
    pub(crate) fn new(
        type_name: Option<String>,
        name: Option<String>,
        attributes: Vec<(String, Value)>,
    ) -> Self {
        let index = attributes
            .iter()
            .enumerate()
            .map(|(i, (attr, _))| (attr.clone(), i))
            .collect();
        SectionValue {
            type_name,
            name,
            attributes,
            index,
        }
    }

    /// Name of the section instance, or `None` for unnamed sections and
    /// the top-level configuration.
    pub fn section_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name of the concrete section type this value was built from, or
    /// `None` for the top-level configuration.
    pub fn section_type(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Look up a converted value by its attribute name.
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.index.get(attribute).map(|&i| &self.attributes[i].1)
    }

    /// Iterate attributes in schema declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(a, v)| (a.as_str(), v))
    }

    /// Attribute names in schema declaration order.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|(a, _)| a.as_str())
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the section has no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl fmt::Display for SectionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.attribute_names().collect();
        names.sort_unstable();
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            if let Some(value) = self.get(name) {
                write!(f, "{:<40}: {:?}", name, value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_display() {
        let p = Position::with_column(3, 7, Some("app.conf".to_string()));
        assert_eq!(p.to_string(), "line 3, column 7, in app.conf");

        let p = Position::new(12, None);
        assert_eq!(p.to_string(), "line 12");

        assert_eq!(Position::unknown().to_string(), "unknown position");
        assert!(!Position::unknown().is_known());
    }

    #[test]
    fn test_value_accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Int(3).as_int(), Some(3));
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert!(Value::from("x").as_int().is_none());
    }

    #[test]
    fn test_value_from_conversions() {
        assert_eq!(Value::from(vec![1i64, 2]), {
            Value::List(vec![Value::Int(1), Value::Int(2)])
        });
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_inet_address_display() {
        let a = InetAddress {
            host: "example.com".to_string(),
            port: Some(8080),
        };
        assert_eq!(a.to_string(), "example.com:8080");

        let v6 = InetAddress {
            host: "::1".to_string(),
            port: Some(443),
        };
        assert_eq!(v6.to_string(), "[::1]:443");
    }

    #[test]
    fn test_socket_address_family() {
        assert_eq!(
            SocketAddress::Unix("/tmp/sock".to_string()).family(),
            AddressFamily::Unix
        );
        let inet = SocketAddress::Inet(InetAddress {
            host: "localhost".to_string(),
            port: Some(80),
        });
        assert_eq!(inet.family(), AddressFamily::Inet);
        let inet6 = SocketAddress::Inet(InetAddress {
            host: "::1".to_string(),
            port: None,
        });
        assert_eq!(inet6.family(), AddressFamily::Inet6);
    }

    #[test]
    fn test_section_value_lookup() {
        let sv = SectionValue::new(
            Some("db".to_string()),
            Some("main".to_string()),
            vec![
                ("host".to_string(), Value::from("localhost")),
                ("port".to_string(), Value::Int(5432)),
            ],
        );
        assert_eq!(sv.section_type(), Some("db"));
        assert_eq!(sv.section_name(), Some("main"));
        assert_eq!(sv.get("port"), Some(&Value::Int(5432)));
        assert!(sv.get("missing").is_none());
        let names: Vec<&str> = sv.attribute_names().collect();
        assert_eq!(names, vec!["host", "port"]);
    }
}
