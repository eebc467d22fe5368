//! In-process stand-ins for the university hosts.

#![allow(dead_code)]

use axum::Router;
use axum::http::HeaderMap;
use velizy::config::Config;

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("listener has no address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server crashed");
    });
    format!("http://{addr}")
}

/// Config pointing every direct-backend host at `base`.
pub fn config_for(base: &str) -> Config {
    Config {
        cas_login_url: format!("{base}/cas/login"),
        bulletin_base_url: base.to_owned(),
        calendar_base_url: base.to_owned(),
        request_timeout_secs: 5,
        ..Config::default()
    }
}

/// Value of cookie `name` in the request's `Cookie` header.
pub fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

pub fn cookie_header(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}
