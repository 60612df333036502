//! Datatype registry and stock conversions
//!
//! A datatype is a conversion from raw configuration text to a typed
//! [`Value`]. Conversions return plain `String` rejection messages; the
//! matcher wraps them into [`ConfigError::Conversion`](crate::error::ConfigError)
//! together with the position the raw value was read at.
//!
//! The registry resolves datatype names used in schemas. Names without a
//! dot are normalized through `basic-key` before lookup; dotted names are
//! application extension points and must be registered explicitly.

use crate::error::{ConfigError, Result};
use crate::types::{InetAddress, SocketAddress, Value};
use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Outcome of a single conversion: a typed value or a rejection message.
pub type ConversionResult = std::result::Result<Value, String>;

/// A scalar datatype conversion, shareable across schemas and threads.
pub type Conversion = Arc<dyn Fn(&str) -> ConversionResult + Send + Sync>;

/// A section datatype conversion, applied to an assembled section value.
pub type SectionConversion =
    Arc<dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync>;

fn conv(f: fn(&str) -> ConversionResult) -> Conversion {
    Arc::new(f)
}

fn pattern(src: &str) -> Regex {
    #[allow(clippy::expect_used)]
    Regex::new(src).expect("static pattern")
}

static BASIC_KEY_RX: Lazy<Regex> = Lazy::new(|| pattern(r"^[a-z][-._a-z0-9]*$"));
static IDENTIFIER_RX: Lazy<Regex> = Lazy::new(|| pattern(r"^[_a-zA-Z][_a-zA-Z0-9]*$"));
static DOTTED_NAME_RX: Lazy<Regex> =
    Lazy::new(|| pattern(r"^[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*$"));
static DOTTED_SUFFIX_RX: Lazy<Regex> =
    Lazy::new(|| pattern(r"^\.?[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*$"));
static HOSTNAME_RX: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"^(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}|[0-9a-z]([0-9a-z-]{0,61}[0-9a-z])?(\.[0-9a-z]([0-9a-z-]{0,61}[0-9a-z])?)*)$",
    )
});

/// Build a conversion that accepts only full matches of a regular
/// expression, returning the text unchanged as a string value.
pub fn regex_checked(pattern_src: &str, reason: &str) -> Conversion {
    let rx = pattern(pattern_src);
    let reason = reason.to_string();
    Arc::new(move |s| {
        if rx.is_match(s) {
            Ok(Value::String(s.to_owned()))
        } else {
            Err(format!("{}: {:?}", reason, s))
        }
    })
}

/// Wrap an integer-producing conversion with inclusive bounds checks.
pub fn range_checked(conversion: Conversion, min: Option<i64>, max: Option<i64>) -> Conversion {
    Arc::new(move |s| {
        let value = conversion(s)?;
        let n = match value {
            Value::Int(n) => n,
            other => return Ok(other),
        };
        if let Some(min) = min {
            if n < min {
                return Err(format!("{} is below lower bound ({})", n, min));
            }
        }
        if let Some(max) = max {
            if n > max {
                return Err(format!("{} is above upper bound ({})", n, max));
            }
        }
        Ok(Value::Int(n))
    })
}

fn convert_boolean(s: &str) -> ConversionResult {
    match s.to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" => Ok(Value::Bool(true)),
        "no" | "false" | "off" => Ok(Value::Bool(false)),
        _ => Err(format!("{:?} is not a valid boolean value", s)),
    }
}

fn convert_integer(s: &str) -> ConversionResult {
    s.trim()
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|_| format!("{:?} is not a valid integer", s))
}

fn convert_float(s: &str) -> ConversionResult {
    s.trim()
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| format!("{:?} is not a valid floating point number", s))
}

fn convert_string(s: &str) -> ConversionResult {
    Ok(Value::String(s.to_owned()))
}

fn convert_string_list(s: &str) -> ConversionResult {
    Ok(Value::List(
        s.split_whitespace()
            .map(|w| Value::String(w.to_owned()))
            .collect(),
    ))
}

fn convert_basic_key(s: &str) -> ConversionResult {
    let lower = s.to_ascii_lowercase();
    if BASIC_KEY_RX.is_match(&lower) {
        Ok(Value::String(lower))
    } else {
        Err(format!("not a valid basic-key: {:?}", s))
    }
}

fn convert_identifier(s: &str) -> ConversionResult {
    if IDENTIFIER_RX.is_match(s) {
        Ok(Value::String(s.to_owned()))
    } else {
        Err(format!("not a valid identifier: {:?}", s))
    }
}

fn convert_dotted_name(s: &str) -> ConversionResult {
    if DOTTED_NAME_RX.is_match(s) {
        Ok(Value::String(s.to_owned()))
    } else {
        Err(format!("not a valid dotted name: {:?}", s))
    }
}

fn convert_dotted_suffix(s: &str) -> ConversionResult {
    if DOTTED_SUFFIX_RX.is_match(s) {
        Ok(Value::String(s.to_owned()))
    } else {
        Err(format!("not a valid dotted name suffix: {:?}", s))
    }
}

fn parse_port(s: &str) -> std::result::Result<u16, String> {
    let n: i64 = s
        .trim()
        .parse()
        .map_err(|_| format!("{:?} is not a valid port number", s))?;
    if n < 0 {
        return Err(format!("{} is below lower bound (0)", n));
    }
    if n > 0xffff {
        return Err(format!("{} is above upper bound (65535)", n));
    }
    Ok(n as u16)
}

/// Parse `host`, `host:port`, `:port`, `port`, or `[v6addr]:port` forms.
/// No name resolution is performed; the host is only lower-cased.
fn parse_inet_address(s: &str, default_host: &str) -> std::result::Result<InetAddress, String> {
    if let Some(idx) = s.rfind(':') {
        let (host_part, port_part) = (&s[..idx], &s[idx + 1..]);
        let host = if host_part.starts_with('[') && host_part.ends_with(']') {
            host_part[1..host_part.len() - 1].to_ascii_lowercase()
        } else if host_part.contains(':') {
            // unbracketed IPv6; the whole text is the host
            return Ok(InetAddress {
                host: s.to_ascii_lowercase(),
                port: None,
            });
        } else {
            host_part.to_ascii_lowercase()
        };
        let port = if port_part.is_empty() {
            None
        } else {
            Some(parse_port(port_part)?)
        };
        let host = if host.is_empty() {
            default_host.to_string()
        } else {
            host
        };
        Ok(InetAddress { host, port })
    } else if let Ok(port) = parse_port(s) {
        Ok(InetAddress {
            host: default_host.to_string(),
            port: Some(port),
        })
    } else if s.is_empty() || s.split_whitespace().count() != 1 {
        Err(format!("{:?} is not a valid host name", s))
    } else {
        Ok(InetAddress {
            host: s.to_ascii_lowercase(),
            port: None,
        })
    }
}

fn inet_address_with_default(default_host: &'static str) -> Conversion {
    Arc::new(move |s| parse_inet_address(s, default_host).map(Value::InetAddress))
}

fn convert_socket_address(s: &str) -> ConversionResult {
    if s.contains('/') {
        Ok(Value::SocketAddress(SocketAddress::Unix(s.to_owned())))
    } else {
        parse_inet_address(s, "")
            .map(|addr| Value::SocketAddress(SocketAddress::Inet(addr)))
    }
}

fn convert_ipaddr_or_hostname(s: &str) -> ConversionResult {
    let lower = s.to_ascii_lowercase();
    if lower.contains(':') {
        lower
            .parse::<std::net::Ipv6Addr>()
            .map_err(|_| format!("not a valid IPv6 address: {:?}", s))?;
        return Ok(Value::String(lower));
    }
    if HOSTNAME_RX.is_match(&lower) {
        Ok(Value::String(lower))
    } else {
        Err(format!("not a valid IP address or host name: {:?}", s))
    }
}

fn expand_home(s: &str) -> String {
    shellexpand::tilde(s).into_owned()
}

fn convert_existing_directory(s: &str) -> ConversionResult {
    let path = expand_home(s);
    if Path::new(&path).is_dir() {
        Ok(Value::String(path))
    } else {
        Err(format!("{} is not an existing directory", path))
    }
}

fn convert_existing_path(s: &str) -> ConversionResult {
    let path = expand_home(s);
    if Path::new(&path).exists() {
        Ok(Value::String(path))
    } else {
        Err(format!("{} is not an existing path", path))
    }
}

fn convert_existing_file(s: &str) -> ConversionResult {
    let path = expand_home(s);
    if Path::new(&path).exists() {
        Ok(Value::String(path))
    } else {
        Err(format!("{} is not an existing file", path))
    }
}

fn convert_existing_dirpath(s: &str) -> ConversionResult {
    let path = expand_home(s);
    match Path::new(&path).parent() {
        None => Ok(Value::String(path)),
        Some(dir) if dir.as_os_str().is_empty() || dir.is_dir() => Ok(Value::String(path)),
        Some(dir) => Err(format!(
            "the directory named as part of the path {} does not exist: {}",
            path,
            dir.display()
        )),
    }
}

fn suffix_multiplier(
    s: &str,
    suffixes: &[(&str, i64)],
    default_multiplier: i64,
) -> std::result::Result<i64, String> {
    let lower = s.trim().to_ascii_lowercase();
    for (suffix, multiplier) in suffixes {
        if let Some(prefix) = lower.strip_suffix(suffix) {
            let n: i64 = prefix
                .trim()
                .parse()
                .map_err(|_| format!("{:?} is not a valid integer", prefix))?;
            return Ok(n * multiplier);
        }
    }
    let n: i64 = lower
        .parse()
        .map_err(|_| format!("{:?} is not a valid integer", s))?;
    Ok(n * default_multiplier)
}

fn convert_byte_size(s: &str) -> ConversionResult {
    const SUFFIXES: [(&str, i64); 3] = [("kb", 1024), ("mb", 1024 * 1024), ("gb", 1024 * 1024 * 1024)];
    suffix_multiplier(s, &SUFFIXES, 1).map(Value::Int)
}

fn convert_time_interval(s: &str) -> ConversionResult {
    const SUFFIXES: [(&str, i64); 4] = [("s", 1), ("m", 60), ("h", 3600), ("d", 86400)];
    suffix_multiplier(s, &SUFFIXES, 1).map(Value::Int)
}

/// Parse whitespace-separated parts with `w`/`d`/`h`/`m`/`s` unit
/// suffixes into a duration, e.g. `"1w 2d 3h"`.
fn convert_timedelta(s: &str) -> ConversionResult {
    let mut weeks = 0.0;
    let mut days = 0.0;
    let mut hours = 0.0;
    let mut minutes = 0.0;
    let mut seconds = 0.0;
    for part in s.split_whitespace() {
        let Some(suffix) = part.chars().last() else {
            continue;
        };
        let number = &part[..part.len() - suffix.len_utf8()];
        let value: f64 = number
            .parse()
            .map_err(|_| format!("bad part {:?} in {:?}", part, s))?;
        match suffix {
            'w' => weeks = value,
            'd' => days = value,
            'h' => hours = value,
            'm' => minutes = value,
            's' => seconds = value,
            _ => return Err(format!("unknown time unit in part {:?}", part)),
        }
    }
    let total =
        weeks * 604_800.0 + days * 86_400.0 + hours * 3_600.0 + minutes * 60.0 + seconds;
    Ok(Value::Duration(Duration::milliseconds(
        (total * 1000.0).round() as i64,
    )))
}

fn convert_null(s: &str) -> ConversionResult {
    Ok(Value::String(s.to_owned()))
}

pub(crate) fn normalize_basic_key(s: &str) -> std::result::Result<String, String> {
    match convert_basic_key(s)? {
        Value::String(key) => Ok(key),
        _ => Err(format!("not a valid basic-key: {:?}", s)),
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    IDENTIFIER_RX.is_match(s)
}

pub(crate) fn basic_key_conversion() -> Conversion {
    conv(convert_basic_key)
}

pub(crate) fn string_conversion() -> Conversion {
    conv(convert_string)
}

pub(crate) fn identity_section_conversion() -> SectionConversion {
    Arc::new(Ok)
}

fn stock_scalars() -> HashMap<String, Conversion> {
    let mut stock: HashMap<String, Conversion> = HashMap::new();
    stock.insert("boolean".into(), conv(convert_boolean));
    stock.insert("integer".into(), conv(convert_integer));
    stock.insert("float".into(), conv(convert_float));
    stock.insert("string".into(), conv(convert_string));
    stock.insert("string-list".into(), conv(convert_string_list));
    stock.insert("null".into(), conv(convert_null));
    stock.insert("identifier".into(), conv(convert_identifier));
    stock.insert("dotted-name".into(), conv(convert_dotted_name));
    stock.insert("dotted-suffix".into(), conv(convert_dotted_suffix));
    stock.insert("basic-key".into(), conv(convert_basic_key));
    stock.insert(
        "port-number".into(),
        range_checked(conv(convert_integer), Some(0), Some(0xffff)),
    );
    stock.insert("inet-address".into(), inet_address_with_default(""));
    stock.insert("inet-binding-address".into(), inet_address_with_default(""));
    stock.insert(
        "inet-connection-address".into(),
        inet_address_with_default("127.0.0.1"),
    );
    stock.insert("socket-address".into(), conv(convert_socket_address));
    stock.insert("ipaddr-or-hostname".into(), conv(convert_ipaddr_or_hostname));
    stock.insert("existing-directory".into(), conv(convert_existing_directory));
    stock.insert("existing-path".into(), conv(convert_existing_path));
    stock.insert("existing-file".into(), conv(convert_existing_file));
    stock.insert("existing-dirpath".into(), conv(convert_existing_dirpath));
    stock.insert("byte-size".into(), conv(convert_byte_size));
    stock.insert("time-interval".into(), conv(convert_time_interval));
    stock.insert("timedelta".into(), conv(convert_timedelta));
    stock
}

/// Name-to-conversion registry backing schema compilation.
///
/// Cloning is cheap; conversions are shared through `Arc`.
#[derive(Clone)]
pub struct Registry {
    stock: HashMap<String, Conversion>,
    other: HashMap<String, Conversion>,
    sections: HashMap<String, SectionConversion>,
}

impl Default for Registry {
    fn default() -> Self {
        Registry {
            stock: stock_scalars(),
            other: HashMap::new(),
            sections: HashMap::new(),
        }
    }
}

impl Registry {
    /// Registry with the stock datatypes and no extensions.
    pub fn new() -> Self {
        Registry::default()
    }

    /// Resolve a scalar datatype name.
    ///
    /// Non-dotted names are normalized through `basic-key` first, so
    /// lookups are case-insensitive. Dotted names must have been
    /// registered with [`register`](Registry::register).
    pub fn get(&self, name: &str) -> Result<Conversion> {
        let key = if name.contains('.') {
            name.to_string()
        } else {
            match convert_basic_key(name) {
                Ok(Value::String(key)) => key,
                _ => {
                    return Err(ConfigError::schema(format!(
                        "unknown datatype name: {:?}",
                        name
                    )))
                }
            }
        };
        if let Some(conversion) = self.stock.get(&key).or_else(|| self.other.get(&key)) {
            return Ok(conversion.clone());
        }
        if key.contains('.') {
            Err(ConfigError::schema(format!(
                "unloadable datatype name: {:?} (dotted names must be registered)",
                name
            )))
        } else {
            Err(ConfigError::schema(format!(
                "unknown datatype name: {:?}",
                name
            )))
        }
    }

    /// Register an application-defined scalar datatype.
    pub fn register(&mut self, name: &str, conversion: Conversion) -> Result<()> {
        if self.stock.contains_key(name) {
            return Err(ConfigError::schema(format!(
                "datatype name conflicts with built-in type: {:?}",
                name
            )));
        }
        if self.other.contains_key(name) {
            return Err(ConfigError::schema(format!(
                "datatype name already registered: {:?}",
                name
            )));
        }
        self.other.insert(name.to_string(), conversion);
        Ok(())
    }

    /// Resolve a section datatype name; `"null"` is the identity.
    pub fn get_section(&self, name: &str) -> Result<SectionConversion> {
        if name == "null" {
            return Ok(Arc::new(Ok));
        }
        self.sections.get(name).cloned().ok_or_else(|| {
            ConfigError::schema(format!("unknown section datatype name: {:?}", name))
        })
    }

    /// Register an application-defined section datatype.
    pub fn register_section(&mut self, name: &str, conversion: SectionConversion) -> Result<()> {
        if name == "null" {
            return Err(ConfigError::schema(
                "section datatype name conflicts with built-in type: \"null\"",
            ));
        }
        if self.sections.contains_key(name) {
            return Err(ConfigError::schema(format!(
                "section datatype name already registered: {:?}",
                name
            )));
        }
        self.sections.insert(name.to_string(), conversion);
        Ok(())
    }
}
