//! Declarative argument schemas for built-in tools.
//!
//! Each tool maps to a [`ToolSchema`] listing its parameters. Validation
//! coerces numeric strings to integers, enforces ranges and lengths, fills
//! declared defaults and reports every violated field at once.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::result::{FieldError, ToolError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    Integer { min: i64, max: i64 },
    String { max_len: usize },
    /// Opaque id placed in an upstream URL path: ASCII letters, digits, `-`, `_`.
    Identifier { max_len: usize },
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
}

impl ParamSpec {
    pub const fn integer(name: &'static str, min: i64, max: i64) -> Self {
        Self {
            name,
            kind: ParamKind::Integer { min, max },
            required: false,
            default: None,
        }
    }

    pub const fn string(name: &'static str, max_len: usize) -> Self {
        Self {
            name,
            kind: ParamKind::String { max_len },
            required: false,
            default: None,
        }
    }

    pub const fn identifier(name: &'static str, max_len: usize) -> Self {
        Self {
            name,
            kind: ParamKind::Identifier { max_len },
            required: false,
            default: None,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    fn coerce(&self, raw: &Value) -> Result<Value, FieldError> {
        match &self.kind {
            ParamKind::Integer { min, max } => {
                let n = as_integer(raw)
                    .ok_or_else(|| FieldError::new(self.name, "must be an integer"))?;
                if n < *min || n > *max {
                    return Err(FieldError::new(
                        self.name,
                        format!("must be between {min} and {max}"),
                    ));
                }
                Ok(Value::from(n))
            }
            ParamKind::String { max_len } => self.coerce_str(raw, *max_len).map(Value::from),
            ParamKind::Identifier { max_len } => {
                let s = self.coerce_str(raw, *max_len)?;
                if !s.is_empty() && !is_identifier(s) {
                    return Err(FieldError::new(
                        self.name,
                        "may only contain letters, digits, '-' and '_'",
                    ));
                }
                Ok(Value::from(s))
            }
        }
    }

    fn coerce_str<'a>(&self, raw: &'a Value, max_len: usize) -> Result<&'a str, FieldError> {
        let s = raw
            .as_str()
            .ok_or_else(|| FieldError::new(self.name, "must be a string"))?;
        if self.required && s.trim().is_empty() {
            return Err(FieldError::new(self.name, "is required"));
        }
        if s.chars().count() > max_len {
            return Err(FieldError::new(
                self.name,
                format!("must be at most {max_len} characters"),
            ));
        }
        Ok(s)
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn as_integer(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

impl ToolSchema {
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Validate `args`, returning only declared parameters in coerced form.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<Map<String, Value>, ToolError> {
        let mut coerced = Map::new();
        let mut errors = Vec::new();

        for spec in &self.params {
            match args.get(spec.name).filter(|v| !v.is_null()) {
                Some(raw) => match spec.coerce(raw) {
                    Ok(value) => {
                        coerced.insert(spec.name.to_string(), value);
                    }
                    Err(e) => errors.push(e),
                },
                None if spec.required => errors.push(FieldError::new(spec.name, "is required")),
                None => {
                    if let Some(default) = &spec.default {
                        coerced.insert(spec.name.to_string(), default.clone());
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(coerced)
        } else {
            Err(ToolError::InvalidArguments(errors))
        }
    }
}

/// Tool name to schema lookup.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<&'static str, ToolSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the Gmail and Calendar tools.
    pub fn builtin() -> Self {
        let max_results = ParamSpec::integer("maxResults", 1, 50).with_default(10);

        let mut registry = Self::new();
        registry.register(
            ToolSchema::new("gmail.get_unread", "List unread emails")
                .param(max_results.clone()),
        );
        registry.register(
            ToolSchema::new("gmail.search", "Search emails")
                .param(ParamSpec::string("query", 500).required())
                .param(max_results.clone()),
        );
        registry.register(
            ToolSchema::new("gmail.get_email", "Read one email")
                .param(ParamSpec::identifier("messageId", 256).required()),
        );
        registry.register(ToolSchema::new(
            "calendar.get_today",
            "List the rest of today's events",
        ));
        registry.register(
            ToolSchema::new("calendar.list_events", "List upcoming events")
                .param(ParamSpec::integer("days", 1, 30).with_default(7))
                .param(max_results),
        );
        registry
    }

    pub fn register(&mut self, schema: ToolSchema) {
        self.schemas.insert(schema.name, schema);
    }

    pub fn get(&self, tool_name: &str) -> Option<&ToolSchema> {
        self.schemas.get(tool_name)
    }

    /// Sorted tool names under `provider`.
    pub fn tools_for(&self, provider: &str) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .schemas
            .keys()
            .copied()
            .filter(|name| name.split_once('.').is_some_and(|(p, _)| p == provider))
            .collect();
        names.sort_unstable();
        names
    }

    pub fn validate(
        &self,
        tool_name: &str,
        args: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ToolError> {
        self.get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?
            .validate(args)
    }
}
