//! Full CAS login flow against a fake CAS + bulletin host.

mod helpers;

use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use helpers::{config_for, cookie, spawn};
use serde_json::json;
use std::collections::HashMap;
use velizy::Portal;

const LOGIN_PAGE: &str = r#"<!DOCTYPE html><html><body>
<form id="fm1" method="post">
  <input id="username" name="username" type="text"/>
  <input id="password" name="password" type="password"/>
  <input type="hidden" name="execution" value="e1s1-token"/>
  <input type="hidden" name="_eventId" value="submit"/>
</form></body></html>"#;

const VALID_USER: &str = "jdupont";
const VALID_PASSWORD: &str = "correct horse";

async fn login_page(Query(params): Query<HashMap<String, String>>) -> Response {
    if !params.get("service").is_some_and(|s| s.contains("/services/doAuth.php")) {
        return (StatusCode::BAD_REQUEST, "missing service").into_response();
    }
    ([(header::SET_COOKIE, "JSESSIONID=cas-flow; Path=/cas")], LOGIN_PAGE).into_response()
}

fn field<'a>(form: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    form.get(name).map(String::as_str)
}

async fn submit_credentials(
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let flow_ok = cookie(&headers, "JSESSIONID") == Some("cas-flow")
        && field(&form, "execution") == Some("e1s1-token")
        && field(&form, "_eventId") == Some("submit")
        && field(&form, "geolocation") == Some("");
    let credentials_ok = field(&form, "username") == Some(VALID_USER)
        && field(&form, "password") == Some(VALID_PASSWORD);

    if flow_ok && credentials_ok {
        (
            StatusCode::FOUND,
            [
                (header::LOCATION, "/services/doAuth.php?ticket=ST-42"),
                (header::SET_COOKIE, "TGC=granted; Path=/cas"),
            ],
        )
            .into_response()
    } else {
        (StatusCode::UNAUTHORIZED, LOGIN_PAGE).into_response()
    }
}

async fn do_auth(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if params.get("ticket").map(String::as_str) == Some("ST-42")
        && cookie(&headers, "PHPSESSID") == Some("bulletin")
    {
        (
            StatusCode::FOUND,
            [
                (header::LOCATION, "/"),
                (header::SET_COOKIE, "authenticated=yes; Path=/"),
            ],
        )
            .into_response()
    } else {
        StatusCode::FORBIDDEN.into_response()
    }
}

async fn bulletin_data(headers: HeaderMap) -> Response {
    if cookie(&headers, "authenticated") == Some("yes") {
        // Raw newline inside a string, as the real backend sends.
        (
            [(header::CONTENT_TYPE, "application/json")],
            "{\"auth\": {\"statut\": \"etudiant\"},\n \"config\": {\"nom\": \"Relevé\nS3\"}}",
        )
            .into_response()
    } else {
        (
            [(header::SET_COOKIE, "PHPSESSID=bulletin; Path=/")],
            r#"{"redirect": "/services/doAuth.php"}"#,
        )
            .into_response()
    }
}

fn cas_router() -> Router {
    Router::new()
        .route("/cas/login", get(login_page).post(submit_credentials))
        .route("/services/doAuth.php", get(do_auth))
        .route("/services/data.php", get(bulletin_data).post(bulletin_data))
        .route("/", get(|| async { "accueil" }))
}

#[tokio::test]
async fn valid_credentials_return_bulletin_payload() {
    let base = spawn(cas_router()).await;
    let portal = Portal::from_config(&config_for(&base)).unwrap();

    let payload = portal.connection(VALID_USER, VALID_PASSWORD).await;

    assert_eq!(
        payload,
        json!({ "auth": { "statut": "etudiant" }, "config": { "nom": "RelevéS3" } })
    );
}

#[tokio::test]
async fn wrong_password_is_invalid_credentials() {
    let base = spawn(cas_router()).await;
    let portal = Portal::from_config(&config_for(&base)).unwrap();

    let payload = portal.connection(VALID_USER, "wrong").await;

    assert_eq!(payload, json!({ "error": "Identifiants invalides" }));
}

#[tokio::test]
async fn cookies_do_not_leak_between_logins() {
    let base = spawn(cas_router()).await;
    let portal = Portal::from_config(&config_for(&base)).unwrap();

    let first = portal.connection(VALID_USER, VALID_PASSWORD).await;
    assert!(first.get("auth").is_some());

    // The authenticated cookie from the first login must not carry over.
    let second = portal.connection(VALID_USER, "wrong").await;
    assert_eq!(second, json!({ "error": "Identifiants invalides" }));
}

#[tokio::test]
async fn concurrent_logins_do_not_clobber_each_other() {
    let base = spawn(cas_router()).await;
    let portal = Portal::from_config(&config_for(&base)).unwrap();

    let (valid, invalid) = tokio::join!(
        portal.connection(VALID_USER, VALID_PASSWORD),
        portal.connection(VALID_USER, "wrong"),
    );

    assert_eq!(
        valid,
        json!({ "auth": { "statut": "etudiant" }, "config": { "nom": "RelevéS3" } })
    );
    assert_eq!(invalid, json!({ "error": "Identifiants invalides" }));
}

#[tokio::test]
async fn missing_token_is_reported() {
    let router = Router::new()
        .route("/cas/login", get(|| async { "<html><body>Maintenance</body></html>" }))
        .route("/services/data.php", get(bulletin_data).post(bulletin_data));
    let base = spawn(router).await;
    let portal = Portal::from_config(&config_for(&base)).unwrap();

    let payload = portal.connection(VALID_USER, VALID_PASSWORD).await;

    assert_eq!(payload, json!({ "error": "Impossible de récupérer le token" }));
}

#[tokio::test]
async fn garbage_bulletin_is_a_connection_error() {
    let router = Router::new()
        .route("/cas/login", get(login_page).post(submit_credentials))
        .route("/services/doAuth.php", get(do_auth))
        .route(
            "/services/data.php",
            get(|| async { "<html>Erreur 500</html>" })
                .post(|| async { "<html>Erreur 500</html>" }),
        );
    let base = spawn(router).await;
    let portal = Portal::from_config(&config_for(&base)).unwrap();

    let payload = portal.connection(VALID_USER, VALID_PASSWORD).await;

    assert_eq!(payload, json!({ "error": "Erreur de connexion" }));
}

#[tokio::test]
async fn unreachable_cas_is_a_connection_error() {
    let portal = Portal::from_config(&config_for("http://127.0.0.1:9")).unwrap();

    let payload = portal.connection(VALID_USER, VALID_PASSWORD).await;

    assert_eq!(payload, json!({ "error": "Erreur de connexion" }));
}
