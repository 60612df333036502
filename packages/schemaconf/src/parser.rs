//! Line-oriented configuration text parser
//!
//! Recognizes blank lines, `#` comments, `key value` pairs, `<type name>`
//! section starts (with the `<type name/>` empty shorthand), `</type>`
//! section ends, and the `%define`, `%include`, and `%import` directives.
//! Section types, instance names, and directive names are lower-cased;
//! values keep their case and go through `$name` substitution.
//!
//! The parser drives a matcher stack: one matcher per open section, with
//! the caller's matcher at the bottom. `%include` recurses with the same
//! define scope, feeding the included text into the current section.

use crate::config::{MAX_INCLUDE_DEPTH, MAX_SECTION_DEPTH};
use crate::error::{ConfigError, Result};
use crate::matcher::SectionMatcher;
use crate::substitution::{is_name, substitute};
use crate::types::Position;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static SECTION_HEADER_RX: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^(?P<type>[^\s<>/]+)(?:\s+(?P<name>[^\s<>/]+))?$").expect("static pattern")
});

/// Resolution hooks the parser needs from its caller.
pub(crate) trait ParserContext {
    /// Open an included resource, returning its text and resolved url.
    fn include_source(
        &self,
        current_url: Option<&str>,
        reference: &str,
    ) -> Result<(String, Option<String>)>;

    /// Check that an imported schema component has been applied.
    fn verify_import(&self, name: &str) -> Result<()>;
}

type MatcherStack<'s> = Vec<(String, Option<String>, SectionMatcher<'s>)>;

fn current<'a, 's>(
    outer: &'a mut SectionMatcher<'s>,
    stack: &'a mut MatcherStack<'s>,
) -> &'a mut SectionMatcher<'s> {
    match stack.last_mut() {
        Some((_, _, matcher)) => matcher,
        None => outer,
    }
}

pub(crate) struct ConfigParser<'c> {
    ctx: &'c dyn ParserContext,
    defines: HashMap<String, String>,
}

impl<'c> ConfigParser<'c> {
    pub(crate) fn new(ctx: &'c dyn ParserContext) -> Self {
        ConfigParser {
            ctx,
            defines: HashMap::new(),
        }
    }

    /// Parse a complete configuration source into `matcher`.
    pub(crate) fn parse<'s>(
        &mut self,
        matcher: &mut SectionMatcher<'s>,
        text: &str,
        url: Option<String>,
    ) -> Result<()> {
        self.parse_source(matcher, text, url, 0)
    }

    fn parse_source<'s>(
        &mut self,
        outer: &mut SectionMatcher<'s>,
        text: &str,
        url: Option<String>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(ConfigError::resource(
                format!("includes nested too deeply (limit {})", MAX_INCLUDE_DEPTH),
                url,
            ));
        }
        let mut stack: MatcherStack<'s> = Vec::new();
        let mut lineno: u64 = 0;
        for raw_line in text.lines() {
            lineno += 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("</") {
                self.end_section(outer, &mut stack, rest, lineno, &url)?;
            } else if let Some(rest) = line.strip_prefix('<') {
                self.start_section(outer, &mut stack, rest, lineno, &url)?;
            } else if let Some(rest) = line.strip_prefix('%') {
                self.directive(outer, &mut stack, rest, lineno, &url, depth)?;
            } else {
                self.key_value(outer, &mut stack, line, lineno, &url)?;
            }
        }
        if let Some((type_name, _, _)) = stack.last() {
            return Err(self.syntax(
                format!("unclosed {:?} section not allowed", type_name),
                lineno,
                &url,
            ));
        }
        Ok(())
    }

    fn syntax(&self, message: impl Into<String>, line: u64, url: &Option<String>) -> ConfigError {
        ConfigError::Syntax {
            message: message.into(),
            url: url.clone(),
            line,
        }
    }

    fn replace(&self, text: &str, lineno: u64, url: &Option<String>) -> Result<String> {
        substitute(text, &self.defines).map_err(|err| match err {
            ConfigError::Substitution { message, .. } => ConfigError::Substitution {
                message,
                url: url.clone(),
                line: Some(lineno),
            },
            other => other,
        })
    }

    fn start_section<'s>(
        &mut self,
        outer: &mut SectionMatcher<'s>,
        stack: &mut MatcherStack<'s>,
        rest: &str,
        lineno: u64,
        url: &Option<String>,
    ) -> Result<()> {
        let Some(inner) = rest.strip_suffix('>') else {
            return Err(self.syntax("malformed section start", lineno, url));
        };
        let (inner, empty) = match inner.strip_suffix('/') {
            Some(inner) => (inner, true),
            None => (inner, false),
        };
        let Some(caps) = SECTION_HEADER_RX.captures(inner.trim()) else {
            return Err(self.syntax("malformed section header", lineno, url));
        };
        let type_name = caps["type"].to_ascii_lowercase();
        let name = caps.name("name").map(|m| m.as_str().to_ascii_lowercase());

        if stack.len() >= MAX_SECTION_DEPTH {
            return Err(self.syntax("sections nested too deeply", lineno, url));
        }
        let position = Position::new(lineno, url.clone());
        let parent = current(outer, stack);
        let child = parent
            .create_child_matcher(&type_name, name.as_deref())
            .map_err(|err| err.at(position.clone()))?;
        if empty {
            let (section, handlers) = child.finish().map_err(|err| err.at(position.clone()))?;
            parent
                .add_section(&type_name, name.as_deref(), section, handlers)
                .map_err(|err| err.at(position))?;
        } else {
            stack.push((type_name, name, child));
        }
        Ok(())
    }

    fn end_section<'s>(
        &mut self,
        outer: &mut SectionMatcher<'s>,
        stack: &mut MatcherStack<'s>,
        rest: &str,
        lineno: u64,
        url: &Option<String>,
    ) -> Result<()> {
        let Some(inner) = rest.strip_suffix('>') else {
            return Err(self.syntax("malformed section end", lineno, url));
        };
        let type_name = inner.trim().to_ascii_lowercase();
        let Some((open_type, name, child)) = stack.pop() else {
            return Err(self.syntax("unexpected section end", lineno, url));
        };
        if type_name != open_type {
            return Err(self.syntax(
                format!("unbalanced section end; expected </{}>", open_type),
                lineno,
                url,
            ));
        }
        let position = Position::new(lineno, url.clone());
        let (section, handlers) = child.finish().map_err(|err| err.at(position.clone()))?;
        current(outer, stack)
            .add_section(&open_type, name.as_deref(), section, handlers)
            .map_err(|err| err.at(position))
    }

    fn key_value<'s>(
        &mut self,
        outer: &mut SectionMatcher<'s>,
        stack: &mut MatcherStack<'s>,
        line: &str,
        lineno: u64,
        url: &Option<String>,
    ) -> Result<()> {
        let (key, value) = match line.split_once(char::is_whitespace) {
            Some((key, value)) => (key, value.trim()),
            None => (line, ""),
        };
        let value = self.replace(value, lineno, url)?;
        let position = Position::new(lineno, url.clone());
        current(outer, stack)
            .add_value(key, &value, position.clone())
            .map_err(|err| err.at(position))
    }

    fn directive<'s>(
        &mut self,
        outer: &mut SectionMatcher<'s>,
        stack: &mut MatcherStack<'s>,
        rest: &str,
        lineno: u64,
        url: &Option<String>,
        depth: usize,
    ) -> Result<()> {
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name.to_ascii_lowercase().as_str() {
            "define" => self.handle_define(arg, lineno, url),
            "include" => {
                if arg.is_empty() {
                    return Err(self.syntax("missing argument to %include directive", lineno, url));
                }
                let reference = self.replace(arg, lineno, url)?;
                let (text, include_url) = self.ctx.include_source(url.as_deref(), &reference)?;
                tracing::debug!(reference = %reference, "including configuration source");
                let target = current(outer, stack);
                self.parse_source(target, &text, include_url, depth + 1)
            }
            "import" => {
                if arg.is_empty() {
                    return Err(self.syntax("missing argument to %import directive", lineno, url));
                }
                let component = self.replace(arg, lineno, url)?.to_ascii_lowercase();
                self.ctx.verify_import(&component)
            }
            "" => Err(self.syntax("missing directive name", lineno, url)),
            other => Err(self.syntax(format!("unknown directive: %{}", other), lineno, url)),
        }
    }

    fn handle_define(&mut self, arg: &str, lineno: u64, url: &Option<String>) -> Result<()> {
        let (name, raw_value) = match arg.split_once(char::is_whitespace) {
            Some((name, value)) => (name, value.trim()),
            None => (arg, ""),
        };
        if name.is_empty() {
            return Err(self.syntax("missing argument to %define directive", lineno, url));
        }
        let key = name.to_ascii_lowercase();
        if !is_name(&key) {
            return Err(self.syntax(
                format!("not a substitution legal name: {:?}", name),
                lineno,
                url,
            ));
        }
        let value = self.replace(raw_value, lineno, url)?;
        if let Some(existing) = self.defines.get(&key) {
            if existing != &value {
                return Err(self.syntax(format!("cannot redefine {:?}", key), lineno, url));
            }
        }
        self.defines.insert(key, value);
        Ok(())
    }
}
