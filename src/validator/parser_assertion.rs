use miette::NamedSource;
use miette::SourceSpan;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use toml::Value;

use crate::parser::Test;
use crate::validator::Assertion;
use crate::validator::ValidationError;

/// Helper function to find the span of a key in the source contents.
fn find_key_span(src: Option<&(String, String)>, key: &str) -> Option<SourceSpan> {
    let (_, content) = src?;
    // This simple find assumes the key is unique and finds its first occurrence.
    let start = content.find(key)?;
    Some(SourceSpan::new(start.into(), key.len()))
}

/// Helper function to find the span of a value in the source contents.
fn find_value_span(src: Option<&(String, String)>, value: &str) -> Option<SourceSpan> {
    let (_, content) = src?;
    let start = content.find(value)?;
    Some(SourceSpan::new(start.into(), value.len()))
}

/// Macro to simplify the creation of a ValidationError with source context.
macro_rules! validation_err {
    ($src:expr, $field:expr, $message:expr, $span_fn:expr) => {
        ValidationError {
            field: $field.to_string(),
            message: $message,
            src: $src
                .as_ref()
                .map(|(name, content)| NamedSource::new(name.clone(), content.clone())),
            span: $span_fn,
        }
    };
}

fn parse_single_header(
    header_map: &mut HeaderMap,
    key: &str,
    value: &Value,
    src: Option<&(String, String)>,
) -> Result<(), ValidationError> {
    let v_str = value.as_str().ok_or_else(|| {
        validation_err!(
            src,
            key,
            format!("Header value must be a string, got {value:?}"),
            find_key_span(src, key)
        )
    })?;

    let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
        validation_err!(
            src,
            key,
            format!("Invalid header name `{key}`: {e}"),
            find_key_span(src, key)
        )
    })?;

    let h_value = HeaderValue::from_str(v_str).map_err(|e| {
        validation_err!(
            src,
            key,
            format!("Invalid header value for `{key}`: {e}"),
            find_value_span(src, v_str)
        )
    })?;

    header_map.insert(name, h_value);
    Ok(())
}

/// Parses a TOML table of header names to string values.
pub fn parse_header_map(
    value: &Value,
    src: Option<&(String, String)>,
) -> Result<HeaderMap, ValidationError> {
    let map = value.as_table().ok_or_else(|| {
        validation_err!(
            src,
            "headers",
            format!("Expected a table for headers, got {value:?}"),
            None
        )
    })?;

    let mut header_map = HeaderMap::new();

    for (k, v) in map {
        parse_single_header(&mut header_map, k, v, src)?;
    }

    Ok(header_map)
}

/// Flattens a TOML table of scalars into `(key, value)` pairs for a query
/// string or a form body. Pairs come out sorted by key.
pub fn parse_params(
    field: &str,
    value: &Value,
    src: Option<&(String, String)>,
) -> Result<Vec<(String, String)>, ValidationError> {
    let map = value.as_table().ok_or_else(|| {
        validation_err!(
            src,
            field,
            format!("Expected a table for {field}, got {value:?}"),
            None
        )
    })?;

    map.iter()
        .map(|(k, v)| {
            let v_str = match v {
                Value::String(s) => s.clone(),
                Value::Integer(i) => i.to_string(),
                Value::Float(f) => f.to_string(),
                Value::Boolean(b) => b.to_string(),
                other => {
                    return Err(validation_err!(
                        src,
                        format!("{field}.{k}"),
                        format!("Parameter values must be scalars, got {other:?}"),
                        find_key_span(src, k)
                    ));
                }
            };

            Ok((k.clone(), v_str))
        })
        .collect()
}

/// `name` becomes `/name`; anything already starting with `/` is taken as a
/// JSON pointer.
fn to_pointer(key: &str) -> String {
    if key.starts_with('/') {
        key.to_string()
    } else {
        format!("/{key}")
    }
}

/// Parses all assertion configurations of a test into a Vec<Assertion>.
pub fn parse_assertions(
    test: &Test,
    src: Option<(&str, &str)>,
) -> Result<Vec<Assertion>, ValidationError> {
    let mut assert_vec = vec![];
    let src_ref = src.as_ref().map(|(n, c)| (n.to_string(), c.to_string()));

    if let Some(status) = test.assert_status {
        if !(100..=599).contains(&status) {
            return Err(validation_err!(
                src_ref,
                format!("{}/assert_status", test.name),
                format!("`{status}` is not an HTTP status code"),
                find_value_span(src_ref.as_ref(), &status.to_string())
            ));
        }
        assert_vec.push(Assertion::Status(status));
    }

    if let Some(value) = &test.assert_headers {
        let header_map = parse_header_map(value, src_ref.as_ref())?;
        assert_vec.push(Assertion::Headers(header_map));
    }

    if let Some(fields) = &test.assert_fields {
        for (key, expected) in fields {
            assert_vec.push(Assertion::Field {
                pointer: to_pointer(key),
                expected: expected.clone(),
            });
        }
    }

    if let Some(lengths) = &test.assert_len {
        for (key, expected) in lengths {
            assert_vec.push(Assertion::Length {
                pointer: to_pointer(key),
                expected: *expected,
            });
        }
    }

    if let Some(file) = &test.schema {
        assert_vec.push(Assertion::Schema {
            file: file.clone(),
            document: None,
        });
    }

    Ok(assert_vec)
}
