//!
//! Leaf values: what `json`, `number` and scalar nodes make of the column
//! value handed down from their parent's row.
//!

use serde_json::{Number, Value};

const INVALID_JSON: &str = "invalid json: ";

/// Parse JSON text.
///
/// Absent input and the empty string give `""`. Values that are not strings
/// are taken as already parsed. Malformed text is kept as data:
/// `"invalid json: <text>"`.
pub fn json_value(value: Option<Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => Some(Value::String(String::new())),
        Some(Value::String(text)) if text.is_empty() => Some(Value::String(text)),
        Some(Value::String(text)) => match serde_json::from_str(&text) {
            Ok(parsed) => Some(parsed),
            Err(_) => Some(Value::String(format!("{}{}", INVALID_JSON, text))),
        },
        Some(parsed) => Some(parsed),
    }
}

/// Coerce to a number. Absent stays absent; text that is not a number
/// becomes `null`.
pub fn number_value(value: Option<Value>) -> Option<Value> {
    match value? {
        Value::Null => None,
        Value::Number(number) => Some(Value::Number(number)),
        Value::Bool(flag) => Some(Value::from(flag as i64)),
        Value::String(text) => Some(parse_number(text.trim())),
        _ => Some(Value::Null),
    }
}

fn parse_number(text: &str) -> Value {
    if text.is_empty() {
        return Value::from(0);
    }
    if let Ok(integer) = text.parse::<i64>() {
        return Value::from(integer);
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Pass a scalar through; only `null` is treated as absent.
pub fn scalar_value(value: Option<Value>) -> Option<Value> {
    match value {
        Some(Value::Null) => None,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_parses_text() {
        assert_eq!(json_value(Some(json!(r#"{"a":1}"#))), Some(json!({ "a": 1 })));
        assert_eq!(json_value(Some(json!("[1,2]"))), Some(json!([1, 2])));
    }

    #[test]
    fn json_invalid_is_data() {
        assert_eq!(
            json_value(Some(json!("not json"))),
            Some(json!("invalid json: not json"))
        );
    }

    #[test]
    fn json_absent_is_empty_string() {
        assert_eq!(json_value(None), Some(json!("")));
        assert_eq!(json_value(Some(Value::Null)), Some(json!("")));
        assert_eq!(json_value(Some(json!(""))), Some(json!("")));
    }

    #[test]
    fn json_passes_decoded_values() {
        assert_eq!(json_value(Some(json!({ "b": 2 }))), Some(json!({ "b": 2 })));
        assert_eq!(json_value(Some(json!(5))), Some(json!(5)));
    }

    #[test]
    fn number_coercion() {
        assert_eq!(number_value(None), None);
        assert_eq!(number_value(Some(Value::Null)), None);
        assert_eq!(number_value(Some(json!(0))), Some(json!(0)));
        assert_eq!(number_value(Some(json!("42"))), Some(json!(42)));
        assert_eq!(number_value(Some(json!(" 1.5 "))), Some(json!(1.5)));
        assert_eq!(number_value(Some(json!(true))), Some(json!(1)));
        assert_eq!(number_value(Some(json!("abc"))), Some(Value::Null));
    }

    #[test]
    fn scalar_keeps_falsy_values() {
        assert_eq!(scalar_value(Some(json!(0))), Some(json!(0)));
        assert_eq!(scalar_value(Some(json!(""))), Some(json!("")));
        assert_eq!(scalar_value(Some(json!(false))), Some(json!(false)));
        assert_eq!(scalar_value(Some(Value::Null)), None);
        assert_eq!(scalar_value(None), None);
    }
}
