use std::convert::Infallible;

use axum::extract::FromRequestParts;
use backbone_core::{Locale, RequestContext};
use http::header::ACCEPT_LANGUAGE;
use http::request::Parts;
use uuid::Uuid;

use super::AppState;
use crate::network::middleware::REQUEST_ID_HEADER;

/// Request carrier and locale extracted from the incoming headers.
///
/// The request id comes from `X-Request-Id` (set by the middleware stack when
/// absent); the locale is the first `Accept-Language` tag, falling back to the
/// configured default.
#[derive(Debug, Clone)]
pub struct Carrier {
    pub ctx: RequestContext,
    pub locale: Locale,
}

impl FromRequestParts<AppState> for Carrier {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);

        let locale = parts
            .headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .and_then(primary_language)
            .map_or_else(|| state.config.default_locale(), Locale::new);

        Ok(Self {
            ctx: RequestContext::new(request_id),
            locale,
        })
    }
}

/// First language tag of an `Accept-Language` value, ignoring weights.
fn primary_language(header: &str) -> Option<&str> {
    let tag = header.split(',').next()?.split(';').next()?.trim();
    (!tag.is_empty() && tag != "*").then_some(tag)
}
