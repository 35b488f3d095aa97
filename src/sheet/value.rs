//! Cell values and in-cell error codes

use std::fmt;

/// Error values a cell can hold. Scheduling errors are reported this way,
/// never as process-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A chained `execute()` has not finished yet; re-polled every tick
    Waiting,
    /// Bad `execute()` target, trigger type or argument
    InvalidParam,
    /// Referenced StreamSheet does not exist
    NoStreamSheet,
    /// Invalid cell reference
    Ref,
    /// Unknown name
    Name,
}

impl ErrorCode {
    /// Display code as shown in a cell
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::Waiting => "#WAITING",
            ErrorCode::InvalidParam => "#VALUE!",
            ErrorCode::NoStreamSheet => "#NO_STREAMSHEET",
            ErrorCode::Ref => "#REF!",
            ErrorCode::Name => "#NAME?",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Value held by a cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
    Error(ErrorCode),
}

impl Value {
    /// Convert a JSON value. Arrays and objects become their JSON text.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Empty,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Empty),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    /// Convert to JSON; errors become their display code
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Empty => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Error(code) => serde_json::Value::String(code.code().to_string()),
        }
    }

    /// Numeric view: empty is 0, booleans are 1/0, text is parsed
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Empty => Some(0.0),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Error(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<ErrorCode> {
        match self {
            Value::Error(code) => Some(*code),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Error(code) => write!(f, "{}", code),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<ErrorCode> for Value {
    fn from(code: ErrorCode) -> Self {
        Value::Error(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::Waiting.to_string(), "#WAITING");
        assert_eq!(ErrorCode::InvalidParam.code(), "#VALUE!");
        assert_eq!(ErrorCode::NoStreamSheet.code(), "#NO_STREAMSHEET");
    }

    #[test]
    fn test_from_json() {
        assert_eq!(Value::from_json(&json!(null)), Value::Empty);
        assert_eq!(Value::from_json(&json!(2)), Value::Number(2.0));
        assert_eq!(Value::from_json(&json!("x")), Value::Text("x".into()));
        assert_eq!(Value::from_json(&json!([1])), Value::Text("[1]".into()));
    }

    #[test]
    fn test_to_json_error_is_code() {
        assert_eq!(Value::Error(ErrorCode::Waiting).to_json(), json!("#WAITING"));
        assert_eq!(Value::Number(1.5).to_json(), json!(1.5));
    }

    #[test]
    fn test_as_number() {
        assert_eq!(Value::Empty.as_number(), Some(0.0));
        assert_eq!(Value::Bool(true).as_number(), Some(1.0));
        assert_eq!(Value::Text(" 4 ".into()).as_number(), Some(4.0));
        assert_eq!(Value::Text("x".into()).as_number(), None);
        assert_eq!(Value::Error(ErrorCode::Ref).as_number(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Bool(false).to_string(), "FALSE");
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Error(ErrorCode::Name).to_string(), "#NAME?");
    }
}
