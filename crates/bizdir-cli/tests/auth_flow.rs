//! Integration tests for login and the OAuth redirect link.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

fn bizdir(home: &TempDir, server: &MockServer) -> Command {
    let mut cmd = cargo_bin_cmd!("bizdir");
    cmd.env("BIZDIR_HOME", home.path())
        .env("BIZDIR_BACKEND_URL", server.uri())
        .env("BIZDIR_ANON_KEY", "anon-key")
        .env("BIZDIR_NO_BROWSER", "1")
        .env_remove("BIZDIR_LOG");
    cmd
}

fn seed_session(home: &Path, user_id: &str) {
    let file = json!({
        "session": {
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "expires_at": u64::MAX / 2,
            "user_id": user_id,
        }
    });
    fs::write(home.join("session.json"), file.to_string()).unwrap();
}

fn read_session(home: &Path) -> Value {
    let contents = fs::read_to_string(home.join("session.json")).unwrap();
    serde_json::from_str(&contents).unwrap()
}

async fn mount_user(server: &MockServer, user_id: &str) {
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": user_id,
            "email": "ada@example.com",
            "user_metadata": {"full_name": "Ada"}
        })))
        .mount(server)
        .await;
}

async fn mount_profiles(server: &MockServer, rows: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_password_login_then_whoami() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "expires_in": 3600,
            "user": {"id": "user-1", "email": "ada@example.com"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_user(&server, "user-1").await;

    bizdir(&home, &server)
        .args(["login", "--email", "ada@example.com", "--password", "pw"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in as ada@example.com"));

    bizdir(&home, &server)
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("id: user-1"))
        .stdout(predicate::str::contains("name: Ada"));
}

#[tokio::test]
async fn test_rejected_login_fails() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"msg": "Invalid login credentials"})),
        )
        .mount(&server)
        .await;

    bizdir(&home, &server)
        .args(["login", "--email", "ada@example.com", "--password", "bad"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid login credentials"));
}

#[tokio::test]
async fn test_signup_requires_all_fields() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;

    bizdir(&home, &server)
        .args(["signup", "--email", "ada@example.com", "--password", "pw"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Please fill in all fields"));

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn test_facebook_login_completes_through_link() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "pkce"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "expires_in": 3600,
            "user": {"id": "user-1"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_user(&server, "user-1").await;
    mount_profiles(&server, json!([{"id": "user-1", "full_name": "Ada"}])).await;

    bizdir(&home, &server)
        .args(["login", "--facebook"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/auth/v1/authorize?provider=facebook"))
        .stdout(predicate::str::contains("redirect_to=com.bizdectory%3A%2F%2Fauth"));
    assert!(read_session(home.path()).get("pending").is_some());

    bizdir(&home, &server)
        .args(["link", "com.bizdectory://auth?code=abc"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Welcome back"))
        .stdout(predicate::str::contains("User: user-1"))
        .stdout(predicate::str::contains("Screen: HomeScreen"));

    let session = read_session(home.path());
    assert_eq!(session["session"]["user_id"], "user-1");
    assert!(session.get("pending").is_none());
}

#[tokio::test]
async fn test_link_without_profile_stays_put() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    seed_session(home.path(), "user-2");
    mount_user(&server, "user-2").await;
    mount_profiles(&server, json!([])).await;

    bizdir(&home, &server)
        .args(["link", "com.bizdectory://auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No profile yet"))
        .stdout(predicate::str::contains("Screen: LoginScreen"));
}

#[tokio::test]
async fn test_link_without_session_is_abandoned() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;

    bizdir(&home, &server)
        .args(["link", "com.bizdectory://auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("login was abandoned"));

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn test_unrelated_link_makes_no_requests() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    seed_session(home.path(), "user-1");

    bizdir(&home, &server)
        .args(["link", "https://example.com/auth?code=abc"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ignored"));

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn test_logout_clears_session() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    seed_session(home.path(), "user-1");

    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    bizdir(&home, &server)
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out."));

    assert!(read_session(home.path()).get("session").is_none());
}
