use axum::http::StatusCode;
use axum::response::IntoResponse;

use mc_warden::api::error::ApiError;
use mc_warden::AppError;

#[test]
fn display_carries_category_prefix() {
    assert_eq!(
        AppError::Precondition("server is not running".into()).to_string(),
        "precondition failed: server is not running"
    );
    assert_eq!(
        AppError::PathViolation("'../x' escapes".into()).to_string(),
        "path violation: '../x' escapes"
    );
}

#[test]
fn io_errors_convert() {
    let err: AppError = std::io::Error::other("disk full").into();

    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("disk full")));
}

#[test]
fn status_mapping_follows_error_category() {
    let cases = [
        (AppError::Precondition(String::new()), StatusCode::CONFLICT),
        (AppError::Denied(String::new()), StatusCode::FORBIDDEN),
        (AppError::Forbidden(String::new()), StatusCode::FORBIDDEN),
        (AppError::Unauthorized(String::new()), StatusCode::UNAUTHORIZED),
        (AppError::NotFound(String::new()), StatusCode::NOT_FOUND),
        (AppError::TooLarge(String::new()), StatusCode::PAYLOAD_TOO_LARGE),
        (AppError::InvalidInput(String::new()), StatusCode::BAD_REQUEST),
        (AppError::PathViolation(String::new()), StatusCode::BAD_REQUEST),
        (AppError::Rcon(String::new()), StatusCode::INTERNAL_SERVER_ERROR),
        (AppError::Backup(String::new()), StatusCode::INTERNAL_SERVER_ERROR),
    ];

    for (err, expected) in cases {
        let label = err.to_string();
        assert_eq!(ApiError::from(err).status(), expected, "{label}");
    }
}

#[tokio::test]
async fn response_body_is_json_error() {
    let response = ApiError(AppError::NotFound("backup x does not exist".into())).into_response();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(json["error"], "not found: backup x does not exist");
}
