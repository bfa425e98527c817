use std::collections::HashMap;
use std::path::Path;

use httptest::matchers::{all_of, contains, eq, json_decoded, request, url_decoded};
use httptest::responders::{json_encoded, status_code};
use httptest::{Expectation, Server};
use serde_json::json;
use tempfile::tempdir;

use profile_extractor_lib::{
    App, AppConfig, AuthState, ExportOutcome, NoticeLevel, SecretVault, SessionState,
};

const CONTACTS_CSV: &str = "Full Name,LinkedIn URL,Email\n\
Ada Lovelace,https://www.linkedin.com/in/ada/,ada@example.com\n\
Grace Hopper,https://www.linkedin.com/in/grace,grace@example.com\n\
Ada L.,https://WWW.LINKEDIN.COM/in/ADA,ada2@example.com\n";

fn config_for(server: &Server) -> AppConfig {
    let vars: HashMap<&str, String> = HashMap::from([
        ("GOOGLE_CLIENT_ID", "test-client".to_string()),
        ("GOOGLE_CLIENT_SECRET", "test-secret".to_string()),
        ("GOOGLE_SHEET_ID", "sheet-1".to_string()),
        ("GOOGLE_PROJECT_ID", "test-project".to_string()),
        ("GOOGLE_REDIRECT_URI", "http://127.0.0.1:8765/".to_string()),
        ("GOOGLE_TOKEN_ENDPOINT", server.url("/token").to_string()),
        ("GOOGLE_SHEETS_API_BASE", server.url("/v4").to_string()),
        ("HTTP_TIMEOUT_SECS", "5".to_string()),
    ]);
    AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

async fn ingested_state(app: &App, dir: &Path) -> SessionState {
    let input = dir.join("contacts.csv");
    std::fs::write(&input, CONTACTS_CSV).unwrap();
    let mut state = SessionState::new();
    app.ingest(&mut state, &[input]).await;
    state
}

fn expect_token_exchange(server: &Server) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/token"),
            request::body(url_decoded(contains(("code", "4/auth-code")))),
            request::body(url_decoded(contains(("grant_type", "authorization_code")))),
            request::body(url_decoded(contains(("client_secret", "test-secret")))),
            request::body(url_decoded(contains(("redirect_uri", "http://127.0.0.1:8765/")))),
        ])
        .respond_with(json_encoded(json!({
            "access_token": "ya29.access",
            "refresh_token": "ya29.refresh",
            "expires_in": 3600,
            "scope": "https://www.googleapis.com/auth/spreadsheets",
            "token_type": "Bearer"
        }))),
    );
}

#[tokio::test]
async fn redirect_then_callback_restores_and_overwrites_sheet() {
    let server = Server::run();
    expect_token_exchange(&server);

    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/v4/spreadsheets/sheet-1/values/A:Z:clear"),
            request::headers(contains(("authorization", "Bearer ya29.access"))),
        ])
        .respond_with(json_encoded(json!({ "clearedRange": "Sheet1!A1:Z1000" }))),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("PUT", "/v4/spreadsheets/sheet-1/values/A1"),
            request::query(url_decoded(contains(("valueInputOption", "RAW")))),
            request::headers(contains(("authorization", "Bearer ya29.access"))),
            request::body(json_decoded(eq(json!({
                "values": [
                    ["Name", "LinkedIn URL"],
                    ["Ada Lovelace", "https://www.linkedin.com/in/ada"],
                    ["Grace Hopper", "https://www.linkedin.com/in/grace"]
                ]
            })))),
        ])
        .respond_with(json_encoded(json!({ "updatedRows": 3 }))),
    );

    let temp_dir = tempdir().unwrap();
    let app = App::with_parts(
        config_for(&server),
        SecretVault::in_memory(),
        &temp_dir.path().join("data"),
    )
    .unwrap();
    let state = ingested_state(&app, temp_dir.path()).await;
    assert_eq!(state.unique_count(), 2);

    let outcome = app.workflow().request_export(&state).await.unwrap();
    let ExportOutcome::AuthorizationRequired {
        authorization_url,
        snapshot_profiles,
    } = outcome
    else {
        panic!("expected a redirect before authorization");
    };
    assert!(authorization_url.contains("client_id=test-client"));
    assert_eq!(snapshot_profiles, 2);
    assert_eq!(
        app.workflow().auth_state(Some("4/auth-code")).unwrap(),
        AuthState::AwaitingCallback
    );

    // The process that receives the callback starts with an empty session.
    let resumed = app
        .workflow()
        .complete_authorization("4/auth-code", SessionState::new())
        .await
        .unwrap();
    assert!(resumed.restored);
    assert_eq!(resumed.state.profiles(), state.profiles());
    assert_eq!(
        resumed.export,
        ExportOutcome::Exported {
            sheet_id: "sheet-1".into(),
            rows: 2
        }
    );
    assert_eq!(app.workflow().auth_state(None).unwrap(), AuthState::Authenticated);
    assert!(app.snapshots().restore().unwrap().is_none());
}

#[tokio::test]
async fn failed_clear_keeps_snapshot_and_skips_write() {
    let server = Server::run();
    expect_token_exchange(&server);
    server.expect(
        Expectation::matching(request::method_path(
            "POST",
            "/v4/spreadsheets/sheet-1/values/A:Z:clear",
        ))
        .respond_with(status_code(500)),
    );
    server.expect(
        Expectation::matching(request::method_path("PUT", "/v4/spreadsheets/sheet-1/values/A1"))
            .times(0)
            .respond_with(status_code(200)),
    );

    let temp_dir = tempdir().unwrap();
    let app = App::with_parts(
        config_for(&server),
        SecretVault::in_memory(),
        &temp_dir.path().join("data"),
    )
    .unwrap();
    let state = ingested_state(&app, temp_dir.path()).await;
    app.workflow().request_export(&state).await.unwrap();

    let err = app
        .workflow()
        .complete_authorization("4/auth-code", SessionState::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "remote");

    let snapshot = app.snapshots().restore().unwrap().expect("snapshot kept");
    assert_eq!(snapshot.global_profiles.len(), 2);
    let last = app.notifications().history().pop().unwrap();
    assert_eq!(last.level, NoticeLevel::Error);
    assert_eq!(last.title, "Export failed");
}

#[tokio::test]
async fn write_failure_after_clear_keeps_snapshot() {
    let server = Server::run();
    expect_token_exchange(&server);
    server.expect(
        Expectation::matching(request::method_path(
            "POST",
            "/v4/spreadsheets/sheet-1/values/A:Z:clear",
        ))
        .respond_with(json_encoded(json!({ "clearedRange": "Sheet1!A1:Z1000" }))),
    );
    server.expect(
        Expectation::matching(request::method_path("PUT", "/v4/spreadsheets/sheet-1/values/A1"))
            .respond_with(status_code(503)),
    );

    let temp_dir = tempdir().unwrap();
    let app = App::with_parts(
        config_for(&server),
        SecretVault::in_memory(),
        &temp_dir.path().join("data"),
    )
    .unwrap();
    let state = ingested_state(&app, temp_dir.path()).await;
    app.workflow().request_export(&state).await.unwrap();

    let err = app
        .workflow()
        .complete_authorization("4/auth-code", SessionState::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "remote");

    let snapshot = app.snapshots().restore().unwrap().expect("snapshot kept");
    assert_eq!(snapshot.global_profiles.len(), 2);
    let last = app.notifications().history().pop().unwrap();
    assert_eq!(last.level, NoticeLevel::Error);
    assert_eq!(last.title, "Export failed");
}

#[tokio::test]
async fn rejected_code_leaves_vault_empty() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/token"))
            .respond_with(status_code(400).body(r#"{"error":"invalid_grant"}"#)),
    );

    let temp_dir = tempdir().unwrap();
    let app = App::with_parts(
        config_for(&server),
        SecretVault::in_memory(),
        &temp_dir.path().join("data"),
    )
    .unwrap();

    let err = app
        .workflow()
        .complete_authorization("4/expired", SessionState::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "authorization");
    assert_eq!(app.workflow().auth_state(None).unwrap(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn no_credential_means_no_network_calls() {
    // Any request to this server fails the test on drop.
    let server = Server::run();
    let temp_dir = tempdir().unwrap();
    let app = App::with_parts(
        config_for(&server),
        SecretVault::in_memory(),
        &temp_dir.path().join("data"),
    )
    .unwrap();
    let state = ingested_state(&app, temp_dir.path()).await;

    let err = app.sheets().write_profiles(state.profiles()).await.unwrap_err();
    assert_eq!(err.kind(), "authorization");
    let err = app.sheets().read_sheet().await.unwrap_err();
    assert_eq!(err.kind(), "authorization");
}

#[tokio::test]
async fn read_sheet_returns_values_with_stored_credential() {
    let server = Server::run();
    expect_token_exchange(&server);
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/v4/spreadsheets/sheet-1/values/A:Z"),
            request::headers(contains(("authorization", "Bearer ya29.access"))),
        ])
        .respond_with(json_encoded(json!({
            "range": "Sheet1!A1:B2",
            "majorDimension": "ROWS",
            "values": [["Name", "LinkedIn URL"], ["Ada", "https://linkedin.com/in/ada"]]
        }))),
    );

    let temp_dir = tempdir().unwrap();
    let app = App::with_parts(
        config_for(&server),
        SecretVault::in_memory(),
        &temp_dir.path().join("data"),
    )
    .unwrap();
    app.sheets().exchange_code("4/auth-code").await.unwrap();

    let rows = app.sheets().read_sheet().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][0], "Ada");
}
