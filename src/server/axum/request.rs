use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::header::USER_AGENT;
use axum::http::{Extensions, HeaderMap, Uri};
use axum_extra::extract::cookie::CookieJar;

use crate::server::{AuthRequest, RequestMeta};

/// An axum request seen through [`AuthRequest`].
#[derive(Debug)]
pub struct AxumRequest<'a> {
    headers: &'a HeaderMap,
    jar: CookieJar,
    meta: RequestMeta,
}

impl<'a> AxumRequest<'a> {
    #[must_use]
    pub fn new(headers: &'a HeaderMap, uri: &Uri, extensions: &Extensions) -> Self {
        let mut meta = RequestMeta::new().with_path(uri.path());
        meta.ip = extract_client_ip(headers).or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
        meta.user_agent = extract_user_agent(headers);

        Self {
            headers,
            jar: CookieJar::from_headers(headers),
            meta,
        }
    }

    pub(super) fn from_request<B>(request: &'a axum::http::Request<B>) -> Self {
        Self::new(request.headers(), request.uri(), request.extensions())
    }

    pub(super) fn from_parts(parts: &'a axum::http::request::Parts) -> Self {
        Self::new(&parts.headers, &parts.uri, &parts.extensions)
    }
}

impl AuthRequest for AxumRequest<'_> {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.jar.get(name).map(|c| c.value().to_string())
    }

    fn meta(&self) -> RequestMeta {
        self.meta.clone()
    }
}

fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
}
