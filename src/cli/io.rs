//! JSON I/O handling for CLI
//!
//! - Input: one JSON value via stdin
//! - Output: one JSON object via stdout, `{"status": "ok", "data": ...}`
//! - UTF-8 only

use std::io::{self, Read, Write};

use serde_json::Value;

use super::errors::CliResult;

/// Read a JSON request from stdin. Empty input reads as `{}`.
pub fn read_request() -> CliResult<Value> {
    let mut input = String::new();
    io::stdin().lock().read_to_string(&mut input)?;
    parse_request(&input)
}

fn parse_request(input: &str) -> CliResult<Value> {
    if input.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    Ok(serde_json::from_str(input)?)
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request() {
        assert_eq!(parse_request("  \n").unwrap(), json!({}));
        assert_eq!(parse_request("{\"a\": 1}\n").unwrap(), json!({"a": 1}));
        let err = parse_request("{nope").unwrap_err();
        assert_eq!(err.code_str(), "TIDE_CLI_BAD_REQUEST");
    }
}
