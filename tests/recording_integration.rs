//! End-to-end checks of the recording layout and token issuing through the
//! public library API.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ssjitsi::recording::RecordingSink;
use ssjitsi::token::{issue_token, MeetingClaims, TOKEN_LIFETIME_SECS};
use tempfile::TempDir;

#[tokio::test]
async fn test_fragments_land_in_session_layout() {
    let dir = TempDir::new().unwrap();
    let sink = RecordingSink::new(dir.path(), "sess-1");

    for chunk in [&b"abc"[..], b"def"] {
        let payload = serde_json::json!({
            "u": "s1",
            "d": STANDARD.encode(chunk),
            "user": "Alice",
            "userid": "u1",
            "room": "Demo Room",
            "myid": "sess-1",
        })
        .to_string();
        sink.ingest_payload(&payload).await.unwrap();
    }

    let session_dir = dir.path().join("Demo_Room").join("sess-1");
    assert_eq!(std::fs::read(session_dir.join("u1_s1.bin")).unwrap(), b"abcdef");
    assert_eq!(std::fs::read_to_string(session_dir.join("u1.json")).unwrap(), "Alice");
    assert_eq!(
        std::fs::read_to_string(session_dir.join("room.json")).unwrap(),
        "Demo Room"
    );
    let started: i64 = std::fs::read_to_string(session_dir.join("u1_s1_start.json"))
        .unwrap()
        .parse()
        .unwrap();
    assert!(started > 0);
}

#[test]
fn test_token_is_valid_for_two_hours() {
    let jwt = issue_token("recorder", "s3cret", "https://meet.example.org/", "demo", "Bot").unwrap();

    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.set_audience(&["recorder"]);
    let claims = jsonwebtoken::decode::<MeetingClaims>(
        &jwt,
        &jsonwebtoken::DecodingKey::from_secret(b"s3cret"),
        &validation,
    )
    .unwrap()
    .claims;

    let now = chrono::Utc::now().timestamp();
    assert!(claims.nbf <= now && now <= claims.exp);
    assert_eq!(claims.exp - claims.nbf, TOKEN_LIFETIME_SECS);
    assert_eq!(claims.sub, "meet.example.org");
}
