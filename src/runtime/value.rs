//! Values crossing the worker boundary and block argument access.
//!
//! Every value is copied across the boundary as JSON, so the runtime works
//! on [`serde_json::Value`] directly and offers the loose casts block
//! programs expect ("10" is a number, "true" is a boolean, and so on).

use serde::{Deserialize, Serialize};
use serde_json::Map;

pub use serde_json::Value;

/// Named arguments of one block invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockArgs(Map<String, Value>);

impl BlockArgs {
    /// Create empty arguments.
    #[inline]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    pub fn with(
        mut self,
        key: &str,
        value: impl Into<Value>,
    ) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Insert or replace an argument.
    pub fn insert(
        &mut self,
        key: &str,
        value: impl Into<Value>,
    ) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Raw argument lookup.
    #[inline]
    pub fn get(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.0.get(key)
    }

    /// Argument cast to a number; missing arguments read as 0.
    pub fn number(
        &self,
        key: &str,
    ) -> f64 {
        self.get(key).map(cast::to_number).unwrap_or(0.0)
    }

    /// Argument cast to a string; missing arguments read as "".
    pub fn string(
        &self,
        key: &str,
    ) -> String {
        self.get(key).map(cast::to_string).unwrap_or_default()
    }

    /// Argument cast to a boolean; missing arguments read as false.
    pub fn boolean(
        &self,
        key: &str,
    ) -> bool {
        self.get(key).map(cast::to_bool).unwrap_or(false)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for BlockArgs {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for BlockArgs {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Loose casts between JSON values.
pub mod cast {
    use super::Value;

    /// Cast to a number. Non-numeric text and NaN become 0.
    pub fn to_number(value: &Value) -> f64 {
        let n = match value {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        };
        if n.is_nan() {
            0.0
        } else {
            n
        }
    }

    /// Cast to display text. Integral numbers print without a fraction.
    pub fn to_string(value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
                _ => n.to_string(),
            },
            other => other.to_string(),
        }
    }

    /// Cast to a boolean. "", "0" and "false" (any case) are false.
    pub fn to_bool(value: &Value) -> bool {
        match value {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
            Value::String(s) => !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")),
            _ => true,
        }
    }

    /// Wrap `value` into `[min, max]`, as direction angles do.
    pub fn wrap_clamp(
        value: f64,
        min: f64,
        max: f64,
    ) -> f64 {
        let range = (max - min) + 1.0;
        value - ((value - min) / range).floor() * range
    }

    /// Number value as JSON, keeping integers integral.
    pub fn number_value(n: f64) -> Value {
        if n.fract() == 0.0 && n.abs() < 1e15 {
            Value::from(n as i64)
        } else {
            serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::from(0))
        }
    }
}
