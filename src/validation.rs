//! Request payload schemas and the coercing validator behind the payload
//! validation stage.
//!
//! A route declares the primitive fields it accepts in its path parameters,
//! query string and body. Incoming values are coerced to the declared kind
//! where an obvious conversion exists, unknown fields are rejected, and every
//! violation is reported at once.

use serde_json::{Map, Number, Value};

// =============================================================================
// Payload Limits
// =============================================================================

/// Maximum size of a JSON request body.
pub const JSON_BODY_LIMIT: usize = 1024 * 1024;

/// Maximum size of a single multipart file part.
///
/// Large enough for media uploads while still bounding memory per part.
pub const UPLOAD_PART_LIMIT: usize = 200 * 1024 * 1024;

/// Maximum size of a multipart part without a file name.
pub const UPLOAD_FIELD_LIMIT: usize = 1024 * 1024;

/// Maximum number of parts in one multipart body.
pub const UPLOAD_MAX_PARTS: usize = 1000;

/// Maximum size of a whole multipart body: one full file part plus room for
/// form fields and framing.
pub const UPLOAD_BODY_LIMIT: usize = 256 * 1024 * 1024;

// =============================================================================
// Schema
// =============================================================================

/// Primitive kinds a payload field can be declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl ValueKind {
    /// JSON schema type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub name: String,
    pub kind: ValueKind,
    pub required: bool,
}

impl FieldRule {
    pub fn required(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// The accepted fields of one payload source (params, query or body).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadSchema {
    fields: Vec<FieldRule>,
}

impl PayloadSchema {
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn field(mut self, rule: FieldRule) -> Self {
        self.fields.push(rule);
        self
    }

    pub fn fields(&self) -> &[FieldRule] {
        &self.fields
    }

    pub fn rule(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|rule| rule.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// What a route accepts as its request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySchema {
    /// No body fields; a JSON body must be empty or `{}`.
    Empty,
    /// A JSON object validated against the schema.
    Json(PayloadSchema),
    /// `multipart/form-data`, handled by the multipart stage.
    Multipart,
}

/// Everything the payload stage needs to know about one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSchema {
    pub params: PayloadSchema,
    pub query: PayloadSchema,
    pub body: BodySchema,
}

impl Default for RouteSchema {
    fn default() -> Self {
        Self {
            params: PayloadSchema::new(),
            query: PayloadSchema::new(),
            body: BodySchema::Empty,
        }
    }
}

impl RouteSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, params: PayloadSchema) -> Self {
        self.params = params;
        self
    }

    pub fn query(mut self, query: PayloadSchema) -> Self {
        self.query = query;
        self
    }

    pub fn json_body(mut self, body: PayloadSchema) -> Self {
        self.body = BodySchema::Json(body);
        self
    }

    pub fn multipart(mut self) -> Self {
        self.body = BodySchema::Multipart;
        self
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Validate and coerce one payload object.
///
/// Rules:
/// - Fields not declared in the schema are rejected unless `allow_unknown`
/// - Required fields must be present, non-null and (for strings) non-empty
/// - Values are coerced to the declared kind (see [`coerce_value`])
/// - Absent and null optional fields are omitted from the output
///
/// Returns the coerced object, or every violation found.
pub fn validate_fields(
    schema: &PayloadSchema,
    mut input: Map<String, Value>,
    allow_unknown: bool,
) -> Result<Map<String, Value>, Vec<String>> {
    let mut violations = Vec::new();

    if !allow_unknown {
        for key in input.keys() {
            if schema.rule(key).is_none() {
                violations.push(format!("property {key} should not exist"));
            }
        }
    }

    let mut output = Map::new();
    for rule in schema.fields() {
        match input.remove(&rule.name) {
            None | Some(Value::Null) => {
                if rule.required {
                    violations.push(format!("{} should not be empty", rule.name));
                }
            }
            Some(value) => match coerce_value(rule, value) {
                Ok(coerced) => {
                    output.insert(rule.name.clone(), coerced);
                }
                Err(message) => violations.push(message),
            },
        }
    }

    if violations.is_empty() {
        Ok(output)
    } else {
        Err(violations)
    }
}

/// Coerce a single value to the rule's kind.
///
/// Conversions:
/// - `String`: numbers and booleans are rendered as text
/// - `Integer`: numeric strings and whole floats become integers
/// - `Number`: numeric strings become numbers
/// - `Boolean`: `"true"` and `"false"` become booleans
///
/// Arrays and objects are never coerced.
pub fn coerce_value(rule: &FieldRule, value: Value) -> Result<Value, String> {
    let name = &rule.name;
    match rule.kind {
        ValueKind::String => match value {
            Value::String(s) if s.is_empty() && rule.required => {
                Err(format!("{name} should not be empty"))
            }
            Value::String(s) => Ok(Value::String(s)),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(format!("{name} must be a string")),
        },
        ValueKind::Integer => {
            let integer = match &value {
                Value::Number(n) => integer_from_number(n),
                Value::String(s) => parse_integer(s.trim()),
                _ => None,
            };
            integer
                .map(|i| Value::Number(i.into()))
                .ok_or_else(|| format!("{name} must be an integer number"))
        }
        ValueKind::Number => match value {
            Value::Number(n) => Ok(Value::Number(n)),
            Value::String(s) => parse_number(s.trim())
                .map(Value::Number)
                .ok_or_else(|| format!("{name} must be a number")),
            _ => Err(format!("{name} must be a number")),
        },
        ValueKind::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            _ => Err(format!("{name} must be a boolean value")),
        },
    }
}

fn integer_from_number(n: &Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    let f = n.as_f64()?;
    whole_float_to_i64(f)
}

fn parse_integer(s: &str) -> Option<i64> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(i);
    }
    s.parse::<f64>().ok().and_then(whole_float_to_i64)
}

#[allow(clippy::cast_possible_truncation)]
fn whole_float_to_i64(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_number(s: &str) -> Option<Number> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(i.into());
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Decode a query string into an object of string values.
///
/// A repeated key keeps its last value.
pub fn query_to_object(query: &str) -> Result<Map<String, Value>, String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
        .map_err(|_| "Malformed query string".to_string())?;

    Ok(pairs
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect())
}
