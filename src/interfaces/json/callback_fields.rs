use crate::error::{GatewayError, Result};

/// Splits a `KEY=VALUE` argument. The value may itself contain `=`.
pub fn parse_field(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(GatewayError::Config(format!(
            "callback field `{raw}` is not KEY=VALUE"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field() {
        assert_eq!(
            parse_field("SIGNATURE=ab==").unwrap(),
            ("SIGNATURE".to_string(), "ab==".to_string())
        );
        assert_eq!(parse_field("State=").unwrap().1, "");
        assert!(parse_field("=OK").is_err());
        assert!(parse_field("State").is_err());
    }
}
