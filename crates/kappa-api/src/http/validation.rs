//! Request body extraction and field-level validation.
//!
//! Bodies are parsed into loose JSON first and then checked against a list of
//! [`FieldSpec`]s, so clients get one problem document describing every bad field.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};
use kappa_api_models::ProblemInvalidParam;
use serde_json::{Map, Value};

use crate::http::errors::{ApiError, ApiResult};

/// Expected JSON type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldKind {
    Int,
    Float,
    Bool,
    Text,
}

impl FieldKind {
    const fn label(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Text => "str",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldSpec {
    name: &'static str,
    kind: FieldKind,
    required: bool,
    max_len: Option<usize>,
}

impl FieldSpec {
    pub(crate) const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            max_len: None,
        }
    }

    pub(crate) const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            max_len: None,
        }
    }

    pub(crate) const fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }
}

/// Converted field value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

/// Values that can be read back out of validated [`Fields`].
pub(crate) trait FromField: Sized {
    fn from_field(name: &str, value: &FieldValue) -> ApiResult<Self>;
}

impl FromField for i64 {
    fn from_field(name: &str, value: &FieldValue) -> ApiResult<Self> {
        match value {
            FieldValue::Int(value) => Ok(*value),
            _ => Err(wrong_type(name, FieldKind::Int)),
        }
    }
}

impl FromField for i32 {
    fn from_field(name: &str, value: &FieldValue) -> ApiResult<Self> {
        let wide = i64::from_field(name, value)?;
        Self::try_from(wide).map_err(|_| {
            invalid(vec![param(
                name,
                format!("Value for field '{name}' is out of range"),
            )])
        })
    }
}

impl FromField for f64 {
    fn from_field(name: &str, value: &FieldValue) -> ApiResult<Self> {
        match value {
            FieldValue::Float(value) => Ok(*value),
            _ => Err(wrong_type(name, FieldKind::Float)),
        }
    }
}

impl FromField for bool {
    fn from_field(name: &str, value: &FieldValue) -> ApiResult<Self> {
        match value {
            FieldValue::Bool(value) => Ok(*value),
            _ => Err(wrong_type(name, FieldKind::Bool)),
        }
    }
}

impl FromField for String {
    fn from_field(name: &str, value: &FieldValue) -> ApiResult<Self> {
        match value {
            FieldValue::Text(value) => Ok(value.clone()),
            _ => Err(wrong_type(name, FieldKind::Text)),
        }
    }
}

/// Fields that passed validation, keyed by name.
#[derive(Debug, Default)]
pub(crate) struct Fields {
    values: HashMap<&'static str, FieldValue>,
}

impl Fields {
    pub(crate) fn get<T: FromField>(&self, name: &str) -> ApiResult<Option<T>> {
        self.values
            .get(name)
            .map(|value| T::from_field(name, value))
            .transpose()
    }

    pub(crate) fn require<T: FromField>(&self, name: &str) -> ApiResult<T> {
        self.get(name)?
            .ok_or_else(|| ApiError::bad_request(format!("{name} required")))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Check `body` against `specs`, converting each supplied field.
///
/// Missing required fields fail fast; type errors are collected into `invalid_params`.
/// Unknown fields are ignored. `null` counts as absent, and so does a blank string
/// for a required field.
pub(crate) fn validate_fields(body: &Value, specs: &[FieldSpec]) -> ApiResult<Fields> {
    let Some(object) = body.as_object() else {
        return Err(ApiError::bad_request("request body must be a JSON object"));
    };

    let mut fields = Fields::default();
    let mut problems = Vec::new();
    for spec in specs {
        let Some(raw) = object
            .get(spec.name)
            .filter(|value| !value.is_null() && !(spec.required && is_blank(value)))
        else {
            if spec.required {
                return Err(ApiError::bad_request(format!("{} required", spec.name)));
            }
            continue;
        };
        match convert(raw, spec.kind) {
            Some(FieldValue::Text(text))
                if spec.max_len.is_some_and(|max| text.chars().count() > max) =>
            {
                problems.push(param(
                    spec.name,
                    format!(
                        "Field '{}' must be at most {} characters",
                        spec.name,
                        spec.max_len.unwrap_or_default()
                    ),
                ));
            }
            Some(value) => {
                fields.values.insert(spec.name, value);
            }
            None => problems.push(param(spec.name, type_message(spec.name, spec.kind))),
        }
    }

    if problems.is_empty() {
        Ok(fields)
    } else {
        Err(invalid(problems))
    }
}

fn is_blank(value: &Value) -> bool {
    value.as_str().is_some_and(|text| text.trim().is_empty())
}

fn convert(raw: &Value, kind: FieldKind) -> Option<FieldValue> {
    match kind {
        FieldKind::Int => match raw {
            Value::Number(number) => number.as_i64().or_else(|| {
                number
                    .as_f64()
                    .filter(|value| value.fract() == 0.0 && value.abs() < 9.0e15)
                    .map(float_to_int)
            }),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
        .map(FieldValue::Int),
        FieldKind::Float => match raw {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
        .map(FieldValue::Float),
        FieldKind::Bool => match raw {
            Value::Bool(flag) => Some(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
        .map(FieldValue::Bool),
        FieldKind::Text => match raw {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
        .map(FieldValue::Text),
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn float_to_int(value: f64) -> i64 {
    value as i64
}

fn type_message(name: &str, kind: FieldKind) -> String {
    format!(
        "Invalid type for field '{name}', expected {}",
        kind.label()
    )
}

fn param(name: &str, message: String) -> ProblemInvalidParam {
    ProblemInvalidParam {
        pointer: format!("/{}", name.replace('~', "~0").replace('/', "~1")),
        message,
    }
}

fn wrong_type(name: &str, kind: FieldKind) -> ApiError {
    invalid(vec![param(name, type_message(name, kind))])
}

fn invalid(params: Vec<ProblemInvalidParam>) -> ApiError {
    ApiError::bad_request("request body failed validation").with_invalid_params(params)
}

/// Loose JSON body. An empty body reads as `{}`.
#[derive(Debug)]
pub(crate) struct JsonBody(pub(crate) Value);

impl JsonBody {
    pub(crate) fn fields(&self, specs: &[FieldSpec]) -> ApiResult<Fields> {
        validate_fields(&self.0, specs)
    }
}

impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(Value::Object(Map::new())));
        }
        serde_json::from_slice(&bytes)
            .map(Self)
            .map_err(|_| ApiError::bad_request("request body must be valid JSON"))
    }
}
