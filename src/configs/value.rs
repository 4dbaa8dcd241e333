use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// A typed configuration value.
///
/// Raw string values are decoded through `ConfigValue::parse_literal`, a small literal
/// grammar, and are kept verbatim as `Str` whenever they don't parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Decodes a raw string, falling back to the string itself when it isn't a literal.
    ///
    /// # Arguments
    /// * `raw` - The raw value as found in the configuration.
    ///
    /// # Returns
    /// The decoded literal or `ConfigValue::Str(raw)`.
    pub fn from_raw(raw: &str) -> Self {
        Self::parse_literal(raw).unwrap_or_else(|| Self::Str(raw.to_string()))
    }

    /// Parses `raw` as a literal: integer, float, boolean, quoted string or a bracketed
    /// (or parenthesized) list of literals.
    ///
    /// # Arguments
    /// * `raw` - The text to parse.
    ///
    /// # Returns
    /// `None` if `raw` isn't a literal.
    pub fn parse_literal(raw: &str) -> Option<Self> {
        let text = raw.trim();

        match text {
            "True" | "true" => return Some(Self::Bool(true)),
            "False" | "false" => return Some(Self::Bool(false)),
            _ => {}
        }

        if let Some(inner) = unquote(text) {
            return Some(Self::Str(inner.to_string()));
        }

        if let Some(inner) = unwrap_brackets(text) {
            return split_top_level(inner)?
                .into_iter()
                .map(Self::parse_literal)
                .collect::<Option<Vec<_>>>()
                .map(Self::List);
        }

        if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit() || "+-.eE".contains(c)) {
            return None;
        }

        if let Ok(int) = text.parse::<i64>() {
            return Some(Self::Int(int));
        }

        text.parse::<f64>().ok().map(Self::Float)
    }

    /// Converts an already typed JSON value, string leaves are literal parsed.
    ///
    /// # Arguments
    /// * `value` - A JSON value of the raw configuration.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Str("null".to_string()),
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(int) => Self::Int(int),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::from_raw(s),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Returns a static name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "mapping",
        }
    }

    /// Numeric view of the value, integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Int(i) => Some(i as f64),
            Self::Float(f) => Some(f),
            _ => None,
        }
    }
}

fn unquote(text: &str) -> Option<&str> {
    ['\'', '"'].into_iter().find_map(|q| {
        let inner = text.strip_prefix(q)?.strip_suffix(q)?;
        (!inner.contains(q)).then_some(inner)
    })
}

fn unwrap_brackets(text: &str) -> Option<&str> {
    text.strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .or_else(|| text.strip_prefix('(').and_then(|t| t.strip_suffix(')')))
}

/// Splits a list body at the commas that aren't nested inside brackets or quotes.
fn split_top_level(body: &str) -> Option<Vec<&str>> {
    if body.trim().is_empty() {
        return Some(Vec::new());
    }

    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote = None;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.checked_sub(1)?,
            (None, ',') if depth == 0 => {
                items.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if quote.is_some() || depth != 0 {
        return None;
    }

    // A single trailing comma is accepted, like in `(0.9, 0.98,)`.
    let last = &body[start..];
    if !last.trim().is_empty() {
        items.push(last);
    }

    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_and_booleans_are_decoded() {
        assert_eq!(ConfigValue::from_raw("4"), ConfigValue::Int(4));
        assert_eq!(ConfigValue::from_raw("-1e-8"), ConfigValue::Float(-1e-8));
        assert_eq!(ConfigValue::from_raw(" 0.5 "), ConfigValue::Float(0.5));
        assert_eq!(ConfigValue::from_raw("True"), ConfigValue::Bool(true));
        assert_eq!(ConfigValue::from_raw("false"), ConfigValue::Bool(false));
    }

    #[test]
    fn lists_are_decoded_recursively() {
        assert_eq!(
            ConfigValue::from_raw("(0.9, 0.98)"),
            ConfigValue::List(vec![ConfigValue::Float(0.9), ConfigValue::Float(0.98)])
        );
        assert_eq!(
            ConfigValue::from_raw("['bias', 'norm.weight']"),
            ConfigValue::List(vec![
                ConfigValue::Str("bias".into()),
                ConfigValue::Str("norm.weight".into())
            ])
        );
        assert_eq!(
            ConfigValue::from_raw("[[1, 2], []]"),
            ConfigValue::List(vec![
                ConfigValue::List(vec![ConfigValue::Int(1), ConfigValue::Int(2)]),
                ConfigValue::List(vec![])
            ])
        );
    }

    #[test]
    fn unparsable_strings_are_kept_verbatim() {
        for raw in ["adam", "inf", "NaN", "[bias, norm]", "1..2", "'open", "[1, 2"] {
            assert_eq!(ConfigValue::from_raw(raw), ConfigValue::Str(raw.into()));
        }
    }

    #[test]
    fn json_values_keep_their_types() {
        let value = json!({"rate": "0.1", "steps": 10, "flags": [true, "x"], "none": null});

        let ConfigValue::Map(map) = ConfigValue::from_json(&value) else {
            panic!("expected a mapping");
        };

        assert_eq!(map["rate"], ConfigValue::Float(0.1));
        assert_eq!(map["steps"], ConfigValue::Int(10));
        assert_eq!(
            map["flags"],
            ConfigValue::List(vec![ConfigValue::Bool(true), ConfigValue::Str("x".into())])
        );
        assert_eq!(map["none"], ConfigValue::Str("null".into()));
    }
}
