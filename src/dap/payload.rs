//! Typed access to untyped request arguments.
//!
//! Every accessor tells an absent field (`null` counts as absent) from a field of the wrong
//! shape, the error names the offending field with its full dotted path.

use crate::dap::error::PayloadError;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Clone, Copy)]
pub struct Payload<'a> {
    fields: Option<&'a Map<String, Value>>,
    prefix: Option<&'a str>,
}

type Result<T> = std::result::Result<T, PayloadError>;

impl<'a> Payload<'a> {
    /// Arguments that must be present.
    pub fn new(arguments: &'a Value) -> Result<Self> {
        match arguments {
            Value::Null => Err(PayloadError::MissingBody),
            _ => Self::optional(arguments),
        }
    }

    /// Arguments that may be omitted, a missing body behaves as an empty object.
    pub fn optional(arguments: &'a Value) -> Result<Self> {
        match arguments {
            Value::Null => Ok(Self {
                fields: None,
                prefix: None,
            }),
            Value::Object(map) => Ok(Self {
                fields: Some(map),
                prefix: None,
            }),
            _ => Err(PayloadError::TypeMismatch {
                field: "arguments".to_string(),
                expected: "object",
            }),
        }
    }

    fn name(&self, field: &str) -> String {
        match self.prefix {
            Some(prefix) => format!("{prefix}.{field}"),
            None => field.to_string(),
        }
    }

    fn get(&self, field: &str) -> Option<&'a Value> {
        self.fields?.get(field).filter(|v| !v.is_null())
    }

    fn mismatch<T>(&self, field: &str, expected: &'static str) -> Result<T> {
        Err(PayloadError::TypeMismatch {
            field: self.name(field),
            expected,
        })
    }

    fn required<T>(&self, field: &str, value: Option<T>) -> Result<T> {
        value.ok_or_else(|| PayloadError::Missing {
            field: self.name(field),
        })
    }

    pub fn opt_str(&self, field: &str) -> Result<Option<&'a str>> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => self.mismatch(field, "string"),
        }
    }

    pub fn str(&self, field: &str) -> Result<&'a str> {
        let value = self.opt_str(field)?;
        self.required(field, value)
    }

    pub fn opt_string(&self, field: &str) -> Result<Option<String>> {
        Ok(self.opt_str(field)?.map(ToString::to_string))
    }

    pub fn string(&self, field: &str) -> Result<String> {
        Ok(self.str(field)?.to_string())
    }

    pub fn opt_i64(&self, field: &str) -> Result<Option<i64>> {
        match self.get(field) {
            None => Ok(None),
            Some(v) => match v.as_i64() {
                Some(n) => Ok(Some(n)),
                None => self.mismatch(field, "integer"),
            },
        }
    }

    pub fn i64(&self, field: &str) -> Result<i64> {
        let value = self.opt_i64(field)?;
        self.required(field, value)
    }

    pub fn opt_u32(&self, field: &str) -> Result<Option<u32>> {
        match self.opt_i64(field)? {
            None => Ok(None),
            Some(n) => match u32::try_from(n) {
                Ok(n) => Ok(Some(n)),
                Err(_) => self.mismatch(field, "unsigned 32-bit integer"),
            },
        }
    }

    pub fn opt_bool(&self, field: &str) -> Result<Option<bool>> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => self.mismatch(field, "boolean"),
        }
    }

    /// Boolean flag with a default for absent field.
    pub fn flag(&self, field: &str, default: bool) -> Result<bool> {
        Ok(self.opt_bool(field)?.unwrap_or(default))
    }

    pub fn opt_object(&self, field: &'a str) -> Result<Option<Payload<'a>>> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(Payload {
                fields: Some(map),
                prefix: Some(field),
            })),
            Some(_) => self.mismatch(field, "object"),
        }
    }

    pub fn object(&self, field: &'a str) -> Result<Payload<'a>> {
        let value = self.opt_object(field)?;
        self.required(field, value)
    }

    /// List of objects, an absent field is an empty list.
    pub fn objects(&self, field: &'a str) -> Result<Vec<Payload<'a>>> {
        match self.get(field) {
            None => Ok(vec![]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(Payload {
                        fields: Some(map),
                        prefix: Some(field),
                    }),
                    _ => self.mismatch(field, "array of objects"),
                })
                .collect(),
            Some(_) => self.mismatch(field, "array"),
        }
    }

    /// List of strings, an absent field is an empty list.
    pub fn strings(&self, field: &str) -> Result<Vec<String>> {
        match self.get(field) {
            None => Ok(vec![]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    _ => self.mismatch(field, "array of strings"),
                })
                .collect(),
            Some(_) => self.mismatch(field, "array"),
        }
    }

    /// String to string dictionary, an absent field is an empty one.
    pub fn string_map(&self, field: &str) -> Result<HashMap<String, String>> {
        match self.get(field) {
            None => Ok(HashMap::new()),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => Ok((k.clone(), s.clone())),
                    _ => self.mismatch(field, "string values"),
                })
                .collect(),
            Some(_) => self.mismatch(field, "object"),
        }
    }
}
