//! Source-URL resolution for the directory cache.
//!
//! A directory source may be a `data:` URI (body inlined, percent or base64
//! encoded), an `http(s)` endpoint (fetched with the active locale as a
//! query parameter), or a `file:` path on local disk. Anything else fails
//! with an error naming the offending source.

use crate::error::{LinkError, LinkResult};
use base64::Engine as _;
use url::Url;

/// Substitute the locale placeholder in a source-URL template.
pub(crate) fn expand_template(template: &str, locale: &str) -> String {
    template.replace("%LOCALE%", locale)
}

/// Resolve a source URL to its response body.
pub(crate) async fn fetch_source_body(
    client: &reqwest::Client,
    source_url: &str,
    locale: &str,
) -> LinkResult<String> {
    let parsed =
        Url::parse(source_url).map_err(|_| LinkError::InvalidSource(source_url.to_string()))?;

    match parsed.scheme() {
        "data" => decode_data_uri(source_url),
        "http" | "https" => fetch_http_body(client, parsed, source_url, locale).await,
        "file" => {
            let path = parsed
                .to_file_path()
                .map_err(|_| LinkError::InvalidSource(source_url.to_string()))?;
            Ok(tokio::fs::read_to_string(path).await?)
        }
        _ => Err(LinkError::InvalidSource(source_url.to_string())),
    }
}

async fn fetch_http_body(
    client: &reqwest::Client,
    url: Url,
    source_url: &str,
    locale: &str,
) -> LinkResult<String> {
    let response = client
        .get(url)
        .query(&[("locale", locale)])
        .send()
        .await
        .map_err(|e| LinkError::Transport {
            url: source_url.to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    if status == reqwest::StatusCode::NO_CONTENT {
        // Tolerated empty directory: an empty document, not an error.
        return Ok("{}".to_string());
    }
    if !status.is_success() {
        return Err(LinkError::Status {
            url: source_url.to_string(),
            status: status.as_u16(),
        });
    }
    response.text().await.map_err(|e| LinkError::Transport {
        url: source_url.to_string(),
        reason: e.to_string(),
    })
}

/// Decode the body of a `data:` URI. Percent-encoded by default, base64
/// when the header says so.
fn decode_data_uri(uri: &str) -> LinkResult<String> {
    let comma = uri
        .find(',')
        .ok_or_else(|| LinkError::InvalidSource(uri.to_string()))?;
    let (header, body) = uri.split_at(comma);
    let body = &body[1..];

    if header.ends_with(";base64") {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(body)
            .map_err(|_| LinkError::InvalidSource(uri.to_string()))?;
        String::from_utf8(bytes).map_err(|_| LinkError::InvalidSource(uri.to_string()))
    } else {
        urlencoding::decode(body)
            .map(|decoded| decoded.into_owned())
            .map_err(|_| LinkError::InvalidSource(uri.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> reqwest::Client {
        reqwest::Client::new()
    }

    #[test]
    fn template_expands_locale_placeholder() {
        assert_eq!(
            expand_template("https://directory.example.com/%LOCALE%/links", "en-US"),
            "https://directory.example.com/en-US/links"
        );
        // No placeholder: unchanged.
        assert_eq!(
            expand_template("https://directory.example.com/links", "en-US"),
            "https://directory.example.com/links"
        );
    }

    #[tokio::test]
    async fn data_uri_percent_encoded_body_decodes() {
        let json = r#"{"en-US":[{"url":"http://example.com"}]}"#;
        let uri = format!("data:application/json,{}", urlencoding::encode(json));
        let body = fetch_source_body(&client(), &uri, "en-US").await.unwrap();
        assert_eq!(body, json);
    }

    #[tokio::test]
    async fn data_uri_base64_body_decodes() {
        let json = r#"{"en-US":[]}"#;
        let encoded = base64::engine::general_purpose::STANDARD.encode(json);
        let uri = format!("data:application/json;base64,{}", encoded);
        let body = fetch_source_body(&client(), &uri, "en-US").await.unwrap();
        assert_eq!(body, json);
    }

    #[tokio::test]
    async fn junk_source_fails_with_a_descriptive_error() {
        let err = fetch_source_body(&client(), "some junk", "en-US")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("some junk"));
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected() {
        let err = fetch_source_body(&client(), "ftp://example.com/links", "en-US")
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::InvalidSource(_)));
    }
}
