use chrono::{Duration, Utc};
use parlor_auth::{AuthError, Claims, CredentialVerifier, JwtVerifier};
use parlor_config::AuthConfig;

fn config() -> AuthConfig {
    AuthConfig {
        jwt_secret: "integration-secret".into(),
        token_ttl_seconds: 3_600,
    }
}

#[test]
fn verifier_from_config_accepts_its_own_tokens() {
    let verifier = JwtVerifier::from_config(&config());
    let token = verifier.issue("alice").expect("token should be issued");

    let user = verifier.verify(&token).expect("token should verify");
    assert_eq!(user.user_id, "alice");
}

#[test]
fn token_signed_with_other_secret_is_rejected() {
    let issuer = JwtVerifier::new("another-secret", Duration::hours(1));
    let verifier = JwtVerifier::from_config(&config());

    let token = issuer.issue("mallory").unwrap();
    assert!(matches!(
        verifier.verify(&token),
        Err(AuthError::InvalidCredential(_))
    ));
}

#[test]
fn expired_token_is_rejected() {
    let verifier = JwtVerifier::from_config(&config());
    let past = Utc::now() - Duration::minutes(5);
    let token = verifier
        .issue_with_claims(&Claims {
            user_id: "bob".into(),
            iat: Some((past - Duration::hours(1)).timestamp()),
            exp: Some(past.timestamp()),
        })
        .unwrap();

    assert!(matches!(verifier.verify(&token), Err(AuthError::Expired)));
}

#[test]
fn token_without_expiry_is_accepted() {
    let verifier = JwtVerifier::from_config(&config());
    let token = verifier
        .issue_with_claims(&Claims {
            user_id: "carol".into(),
            iat: None,
            exp: None,
        })
        .unwrap();

    assert_eq!(verifier.verify(&token).unwrap().user_id, "carol");
}

#[test]
fn garbage_token_is_invalid() {
    let verifier = JwtVerifier::from_config(&config());
    assert!(matches!(
        verifier.verify("not.a.jwt"),
        Err(AuthError::InvalidCredential(_))
    ));
}

#[test]
fn claims_serialize_user_id_as_underscore_id() {
    let claims = Claims {
        user_id: "dave".into(),
        iat: None,
        exp: Some(10),
    };
    let value = serde_json::to_value(&claims).unwrap();
    assert_eq!(value["_id"], "dave");
    assert_eq!(value["exp"], 10);
    assert!(value.get("iat").is_none());
}
