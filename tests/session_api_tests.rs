//! HTTP tests for the session lifecycle.
//!
//! Tests cover:
//! - Login binds both cookies with matching attributes
//! - Protected endpoints accept the bearer header first, then the access cookie
//! - Refresh rebinds only the access cookie
//! - Rotation invalidates the old refresh token
//! - Logout is idempotent and always clears cookies
//! - Session listing and revocation are scoped to the caller

mod common;

use std::time::Duration;

use auraflow::audit::AuditEventKind;
use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::*;

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_sets_both_cookies() {
    let t = test_app().await;
    let user = t.create_user("alice@example.com").await;

    let response = t
        .send(post_json(
            "/api/auth/login",
            serde_json::json!({ "email": "alice@example.com", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);

    let access = cookies
        .iter()
        .find(|c| c.starts_with("access_token="))
        .unwrap();
    let refresh = cookies
        .iter()
        .find(|c| c.starts_with("refresh_token="))
        .unwrap();
    for cookie in [access, refresh] {
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Path=/"));
    }
    assert!(access.contains("Max-Age=900"));
    assert!(refresh.contains("Max-Age=604800"));

    let access_token = cookie_value(&cookies, "access_token").unwrap();
    let body = body_json(response).await;
    assert_eq!(body["user_id"], user.id);
    assert_eq!(body["role"], "user");
    assert_eq!(body["access_token"], access_token);
    assert_eq!(body["expires_in"], 900);

    let sessions = t.db.sessions().find_active(&user.id).await.unwrap();
    assert_eq!(sessions.len(), 1);
}

#[tokio::test]
async fn test_login_email_is_case_insensitive() {
    let t = test_app().await;
    t.create_user("alice@example.com").await;

    let (access, _) = t.login("Alice@Example.COM").await;
    assert!(!access.is_empty());
}

#[tokio::test]
async fn test_login_wrong_password() {
    let t = test_app().await;
    t.create_user("alice@example.com").await;

    let response = t
        .send(post_json(
            "/api/auth/login",
            serde_json::json!({ "email": "alice@example.com", "password": "not the password" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let cookies = set_cookies(&response);
    assert!(has_cleared_cookie(&cookies, "access_token"));
    assert!(has_cleared_cookie(&cookies, "refresh_token"));

    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid email or password");
    assert!(t.audit.kinds().contains(&AuditEventKind::LoginFailure));
}

#[tokio::test]
async fn test_login_unknown_email_same_error() {
    let t = test_app().await;

    let response = t
        .send(post_json(
            "/api/auth/login",
            serde_json::json!({ "email": "nobody@example.com", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid email or password");
}

#[tokio::test]
async fn test_multiple_logins_create_independent_sessions() {
    let t = test_app().await;
    let user = t.create_user("alice@example.com").await;

    let (_, refresh_a) = t.login("alice@example.com").await;
    let (_, refresh_b) = t.login("alice@example.com").await;
    assert_ne!(refresh_a, refresh_b);

    let sessions = t.db.sessions().find_active(&user.id).await.unwrap();
    assert_eq!(sessions.len(), 2);
}

// =============================================================================
// Access token transport
// =============================================================================

#[tokio::test]
async fn test_me_with_bearer() {
    let t = test_app().await;
    let user = t.create_user("alice@example.com").await;
    let (access, _) = t.login("alice@example.com").await;

    let response = t.send(get_with_bearer("/api/auth/me", &access)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["user_id"], user.id);
    assert_eq!(body["role"], "user");
}

#[tokio::test]
async fn test_me_with_cookie() {
    let t = test_app().await;
    t.create_user("alice@example.com").await;
    let (access, _) = t.login("alice@example.com").await;

    let response = t
        .send(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::COOKIE, format!("access_token={}", access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_bearer_takes_precedence_over_cookie() {
    let t = test_app().await;
    t.create_user("alice@example.com").await;
    let (access, _) = t.login("alice@example.com").await;

    let response = t
        .send(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", access))
                .header(header::COOKIE, "access_token=garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_bearer_rejected_even_with_cookie() {
    let t = test_app().await;
    t.create_user("alice@example.com").await;
    let (access, _) = t.login("alice@example.com").await;

    let response = t
        .send(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::AUTHORIZATION, "Token abc")
                .header(header::COOKIE, format!("access_token={}", access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid token");
}

#[tokio::test]
async fn test_me_without_token() {
    let t = test_app().await;

    let response = t
        .send(
            Request::builder()
                .uri("/api/auth/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let t = test_app().await;
    t.create_user("alice@example.com").await;
    let (_, refresh) = t.login("alice@example.com").await;

    let response = t.send(get_with_bearer("/api/auth/me", &refresh)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(t.audit.kinds().contains(&AuditEventKind::TokenInvalid));
}

#[tokio::test]
async fn test_expired_access_token_keeps_cookies() {
    let t = test_app().await;
    let user = t.create_user("alice@example.com").await;
    let (_, refresh) = t.login("alice@example.com").await;

    // Same keys, zero lifetime: expired the moment it is minted
    let expired = t
        .jwt
        .clone()
        .with_ttls(Duration::ZERO, t.jwt.refresh_ttl())
        .mint_access(&user.id, Some(user.role.as_str()))
        .unwrap()
        .token;

    let response = t.send(get_with_bearer("/api/auth/me", &expired)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
    let body = body_json(response).await;
    assert_eq!(body["error"], "Token expired");

    // The refresh path still works
    let response = t
        .send(post_with_cookie("/api/auth/refresh", &refresh_cookie(&refresh)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Refresh and rotation
// =============================================================================

#[tokio::test]
async fn test_refresh_rebinds_access_only() {
    let t = test_app().await;
    let user = t.create_user("alice@example.com").await;
    let (_, refresh) = t.login("alice@example.com").await;

    let response = t
        .send(post_with_cookie("/api/auth/refresh", &refresh_cookie(&refresh)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    let new_access = cookie_value(&cookies, "access_token").unwrap();

    let response = t.send(get_with_bearer("/api/auth/me", &new_access)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Same session, same refresh token
    let sessions = t.db.sessions().find_active(&user.id).await.unwrap();
    assert_eq!(sessions.len(), 1);
    let response = t
        .send(post_with_cookie("/api/auth/refresh", &refresh_cookie(&refresh)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_without_cookie() {
    let t = test_app().await;

    let response = t
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/refresh")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let cookies = set_cookies(&response);
    assert!(has_cleared_cookie(&cookies, "access_token"));
    assert!(has_cleared_cookie(&cookies, "refresh_token"));
}

#[tokio::test]
async fn test_refresh_with_access_token_rejected() {
    let t = test_app().await;
    t.create_user("alice@example.com").await;
    let (access, _) = t.login("alice@example.com").await;

    let response = t
        .send(post_with_cookie("/api/auth/refresh", &refresh_cookie(&access)))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(has_cleared_cookie(&set_cookies(&response), "refresh_token"));
}

#[tokio::test]
async fn test_rotate_invalidates_old_refresh_token() {
    let t = test_app().await;
    let user = t.create_user("alice@example.com").await;
    let (_, old_refresh) = t.login("alice@example.com").await;

    let response = t
        .send(post_with_cookie("/api/auth/rotate", &refresh_cookie(&old_refresh)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    let new_refresh = cookie_value(&cookies, "refresh_token").unwrap();
    assert_ne!(new_refresh, old_refresh);
    assert!(cookie_value(&cookies, "access_token").is_some());

    // Old token is gone
    let response = t
        .send(post_with_cookie("/api/auth/refresh", &refresh_cookie(&old_refresh)))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(has_cleared_cookie(&set_cookies(&response), "refresh_token"));
    let body = body_json(response).await;
    assert_eq!(body["error"], "Session is no longer valid");

    // New token works
    let response = t
        .send(post_with_cookie("/api/auth/refresh", &refresh_cookie(&new_refresh)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let sessions = t.db.sessions().find_active(&user.id).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(t.audit.kinds().contains(&AuditEventKind::SessionRotated));
}

#[tokio::test]
async fn test_rotate_twice_with_same_token() {
    let t = test_app().await;
    t.create_user("alice@example.com").await;
    let (_, refresh) = t.login("alice@example.com").await;

    let first = t
        .send(post_with_cookie("/api/auth/rotate", &refresh_cookie(&refresh)))
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = t
        .send(post_with_cookie("/api/auth/rotate", &refresh_cookie(&refresh)))
        .await;
    assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Logout
// =============================================================================

#[tokio::test]
async fn test_logout_is_idempotent() {
    let t = test_app().await;
    let user = t.create_user("alice@example.com").await;
    let (_, refresh) = t.login("alice@example.com").await;

    for _ in 0..2 {
        let response = t
            .send(post_with_cookie("/api/auth/logout", &refresh_cookie(&refresh)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert!(has_cleared_cookie(&cookies, "access_token"));
        assert!(has_cleared_cookie(&cookies, "refresh_token"));
    }

    let sessions = t.db.sessions().find_active(&user.id).await.unwrap();
    assert!(sessions.is_empty());

    let response = t
        .send(post_with_cookie("/api/auth/refresh", &refresh_cookie(&refresh)))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let logouts = t
        .audit
        .kinds()
        .into_iter()
        .filter(|k| *k == AuditEventKind::Logout)
        .count();
    assert_eq!(logouts, 2);
}

#[tokio::test]
async fn test_logout_without_cookie_succeeds() {
    let t = test_app().await;

    let response = t
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(has_cleared_cookie(&set_cookies(&response), "refresh_token"));

    let response = t
        .send(post_with_cookie("/api/auth/logout", "refresh_token=garbage"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_all() {
    let t = test_app().await;
    t.create_user("alice@example.com").await;
    let (access, refresh_a) = t.login("alice@example.com").await;
    let (_, refresh_b) = t.login("alice@example.com").await;

    let response = t
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout-all")
                .header(header::AUTHORIZATION, format!("Bearer {}", access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(has_cleared_cookie(&set_cookies(&response), "refresh_token"));
    let body = body_json(response).await;
    assert_eq!(body["revoked"], 2);

    for refresh in [refresh_a, refresh_b] {
        let response = t
            .send(post_with_cookie("/api/auth/refresh", &refresh_cookie(&refresh)))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

// =============================================================================
// Session management
// =============================================================================

#[tokio::test]
async fn test_list_sessions_hides_hashes() {
    let t = test_app().await;
    t.create_user("alice@example.com").await;
    let (access, _) = t.login("alice@example.com").await;
    t.login("alice@example.com").await;

    let response = t.send(get_with_bearer("/api/auth/sessions", &access)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    for session in sessions {
        assert!(session["id"].is_string());
        assert!(session["expires_at"].as_i64().unwrap() > session["created_at"].as_i64().unwrap());
        assert!(session.get("token_hash").is_none());
    }
}

#[tokio::test]
async fn test_revoke_own_session() {
    let t = test_app().await;
    let user = t.create_user("alice@example.com").await;
    let (access, _) = t.login("alice@example.com").await;
    let (_, other_refresh) = t.login("alice@example.com").await;

    let target = t
        .db
        .sessions()
        .match_session(&user.id, &other_refresh)
        .await
        .unwrap()
        .unwrap()
        .id;

    let response = t
        .send(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/auth/sessions/{}", target))
                .header(header::AUTHORIZATION, format!("Bearer {}", access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["revoked"], true);

    let sessions = t.db.sessions().find_active(&user.id).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_ne!(sessions[0].id, target);

    let response = t
        .send(post_with_cookie("/api/auth/refresh", &refresh_cookie(&other_refresh)))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cannot_revoke_other_users_session() {
    let t = test_app().await;
    let bob = t.create_user("bob@example.com").await;
    t.create_user("alice@example.com").await;
    t.login("bob@example.com").await;
    let (alice_access, _) = t.login("alice@example.com").await;

    let bob_session = t.db.sessions().find_active(&bob.id).await.unwrap()[0]
        .id
        .clone();

    let response = t
        .send(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/auth/sessions/{}", bob_session))
                .header(header::AUTHORIZATION, format!("Bearer {}", alice_access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert_eq!(t.db.sessions().find_active(&bob.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_revoke_invalid_session_id() {
    let t = test_app().await;
    t.create_user("alice@example.com").await;
    let (access, _) = t.login("alice@example.com").await;

    let response = t
        .send(
            Request::builder()
                .method("DELETE")
                .uri("/api/auth/sessions/not-a-uuid")
                .header(header::AUTHORIZATION, format!("Bearer {}", access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_endpoints_require_auth() {
    let t = test_app().await;

    for (method, uri) in [
        ("GET", "/api/auth/sessions"),
        ("POST", "/api/auth/logout-all"),
        ("DELETE", "/api/auth/sessions/00000000-0000-0000-0000-000000000000"),
    ] {
        let response = t
            .send(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
    }
}
