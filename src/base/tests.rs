use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;

#[test]
fn test_net_error_roundtrip() {
    // Standard Chromium error
    let original = NetError::ConnectionRefused;
    let code = original.as_i32();
    assert_eq!(code, -102);
    let converted = NetError::from(code);
    assert!(matches!(converted, NetError::ConnectionRefused));

    // Engine-specific error
    let custom = NetError::IllegalState;
    let custom_code = custom.as_i32();
    assert_eq!(custom_code, -10001);
    assert_eq!(NetError::from(custom_code), NetError::IllegalState);
}

#[test]
fn test_cache_error_codes() {
    assert_eq!(NetError::CacheReadFailure.as_i32(), -401);
    assert_eq!(NetError::from(-401), NetError::CacheReadFailure);
}

#[test]
fn test_unknown_error() {
    let err = NetError::from(-9999);
    assert!(matches!(err, NetError::Unknown(-9999)));
}

#[test]
fn test_connect_failures_are_classified() {
    assert!(NetError::ConnectionRefused.is_connect_failure());
    assert!(!NetError::NameNotResolved.is_connect_failure());
    assert!(!NetError::InvalidHttpResponse.is_connect_failure());
    assert!(NetError::InvalidHttpResponse.is_framing_error());
}

#[test]
fn test_load_state_default() {
    assert_eq!(LoadState::default(), LoadState::Idle);
    assert_eq!(LoadState::WaitingForResponse.description(), "waiting for response");
}
