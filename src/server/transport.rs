use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderMap, Method, StatusCode,
};

pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Validates method, content type and accepted media types of an inbound
/// request. A rejection carries the bare status to answer with.
pub fn check_http_request(method: &Method, headers: &HeaderMap) -> Result<(), StatusCode> {
    if *method != Method::POST {
        return Err(StatusCode::METHOD_NOT_ALLOWED);
    }

    if !has_json_content_type(headers) {
        return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    if !accepts_json(headers) {
        return Err(StatusCode::NOT_ACCEPTABLE);
    }

    Ok(())
}

/// Exactly one `Content-Type` header with exactly the JSON media type.
fn has_json_content_type(headers: &HeaderMap) -> bool {
    let mut values = headers.get_all(CONTENT_TYPE).iter();
    match (values.next(), values.next()) {
        (Some(value), None) => value.as_bytes() == JSON_MEDIA_TYPE.as_bytes(),
        _ => false,
    }
}

/// A request without `Accept` accepts anything.
fn accepts_json(headers: &HeaderMap) -> bool {
    let mut values = headers.get_all(ACCEPT).iter().peekable();
    if values.peek().is_none() {
        return true;
    }

    values
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(media_range_accepts_json)
}

fn media_range_accepts_json(range: &str) -> bool {
    let mut parts = range.split(';');
    let media_type = parts.next().unwrap_or_default().trim().to_ascii_lowercase();

    let refused = parts.any(|param| {
        let mut pair = param.splitn(2, '=');
        let name = pair.next().unwrap_or_default().trim();
        let value = pair.next().unwrap_or_default().trim();
        name.eq_ignore_ascii_case("q") && value.parse::<f32>().is_ok_and(|q| q <= 0.0)
    });

    !refused && matches!(media_type.as_str(), JSON_MEDIA_TYPE | "application/*" | "*/*")
}
