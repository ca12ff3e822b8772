use chrono::Utc;
use gf_core::types::ProviderType;
use gf_harness::provider::{classify_response, ProviderError};

const GH: ProviderType = ProviderType::GitHub;
const NO_HEADERS: [(&str, &str); 0] = [];

#[test]
fn success_is_ok() {
    assert!(classify_response(GH, 200, [("x-ratelimit-remaining", "0")], "").is_ok());
}

#[test]
fn unauthorized_maps_to_auth() {
    let err = classify_response(GH, 401, NO_HEADERS, "Bad credentials").unwrap_err();
    assert_eq!(err, ProviderError::Auth("Bad credentials".into()));
}

#[test]
fn forbidden_with_exhausted_quota_is_rate_limited() {
    let headers = [
        ("x-ratelimit-limit", "60"),
        ("x-ratelimit-remaining", "0"),
        ("x-ratelimit-reset", "1900000000"),
    ];
    let err = classify_response(GH, 403, headers, "API rate limit exceeded").unwrap_err();
    match err {
        ProviderError::RateLimited { reset_time } => {
            assert_eq!(reset_time.timestamp(), 1_900_000_000)
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn retry_after_sets_reset() {
    let before = Utc::now();
    let err = classify_response(GH, 429, [("Retry-After", "30")], "slow down").unwrap_err();
    match err {
        ProviderError::RateLimited { reset_time } => {
            let delta = (reset_time - before).num_seconds();
            assert!((29..=31).contains(&delta), "{delta}");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn plain_forbidden_is_auth() {
    let err = classify_response(GH, 403, NO_HEADERS, "Resource not accessible").unwrap_err();
    assert!(matches!(err, ProviderError::Auth(_)));
}

#[test]
fn not_found_and_server_errors() {
    assert!(matches!(
        classify_response(GH, 404, NO_HEADERS, "Not Found"),
        Err(ProviderError::NotFound(_))
    ));
    let err = classify_response(GH, 502, NO_HEADERS, "Bad Gateway").unwrap_err();
    assert_eq!(err.to_string(), "request failed: HTTP 502: Bad Gateway");
    assert!(!err.is_rate_limited());
}
