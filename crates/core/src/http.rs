use crate::AssistantError;
use reqwest::Response;
use url::Url;

/// Joins `path` onto `base`, treating `base` as a directory even without a trailing slash.
pub(crate) fn join_endpoint(base: &str, path: &str) -> Result<Url, AssistantError> {
    let trimmed = base.trim();
    let base = if trimmed.ends_with('/') {
        Url::parse(trimmed)?
    } else {
        Url::parse(&format!("{trimmed}/"))?
    };
    Ok(base.join(path.trim_start_matches('/'))?)
}

/// Turns a non-2xx response into `BackendResponse`, keeping the start of the body.
pub(crate) async fn ensure_success(
    response: Response,
    backend: &str,
) -> Result<Response, AssistantError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let preview = body.chars().take(300).collect::<String>();
    Err(AssistantError::BackendResponse {
        backend: backend.to_string(),
        details: if preview.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {preview}")
        },
    })
}
