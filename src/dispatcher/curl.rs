use std::borrow::Cow;

use reqwest::Request;

/// Renders `request` as an equivalent curl invocation.
///
/// Headers are sorted by name and every word is quoted for a POSIX shell, so
/// the output can be pasted into a terminal as is.
pub fn to_curl(request: &Request) -> String {
    let mut parts: Vec<Cow<'_, str>> = vec!["curl".into(), "-X".into()];
    parts.push(quote(request.method().as_str()));

    let mut headers: Vec<(&str, Cow<'_, str>)> = request
        .headers()
        .iter()
        .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes())))
        .collect();
    headers.sort();

    for (name, value) in headers {
        parts.push("-H".into());
        parts.push(quote(&format!("{name}: {value}")).into_owned().into());
    }

    if let Some(body) = request.body().and_then(|body| body.as_bytes())
        && !body.is_empty()
    {
        parts.push("-d".into());
        parts.push(quote(&String::from_utf8_lossy(body)).into_owned().into());
    }

    parts.push(quote(request.url().as_str()));

    parts.join(" ")
}

/// Quotes a word the way POSIX shells expect, leaving safe words untouched.
pub fn quote(word: &str) -> Cow<'_, str> {
    if word.is_empty() {
        return "''".into();
    }

    let safe = word
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        return word.into();
    }

    format!("'{}'", word.replace('\'', r#"'"'"'"#)).into()
}
