use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use crate::{
    auth::{
        password::{hash_blocking, verify_blocking},
        repo_types::{NewUser, User},
    },
    db::StoreError,
    error::AppError,
    mail::otp_message,
    state::AppState,
};

pub const OTP_TTL: Duration = Duration::minutes(10);

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Four digits, zero padded.
pub fn generate_otp_code() -> String {
    format!("{:04}", rand::thread_rng().gen_range(0..10_000))
}

fn checked_email(raw: &str) -> Result<String, AppError> {
    let email = normalize_email(raw);
    if email.is_empty() {
        return Err(AppError::invalid_request("email is required"));
    }
    if !is_valid_email(&email) {
        return Err(AppError::invalid_request("invalid email"));
    }
    Ok(email)
}

/// Creates the user on first contact, stores a fresh code and mails it.
pub async fn request_otp(st: &AppState, raw_email: &str) -> Result<(), AppError> {
    let email = checked_email(raw_email)?;

    let user = match st
        .users
        .find_by_email(&email)
        .await
        .map_err(|e| AppError::internal("failed to get user").with_source(e))?
    {
        Some(user) => user,
        None => {
            let new = NewUser {
                email: email.clone(),
                password_hash: None,
                email_verified_at: None,
            };
            match st.users.create(&new).await {
                Ok(user) => user,
                // lost a race with a concurrent first request for the same email
                Err(StoreError::AlreadyExists(_)) => st
                    .users
                    .find_by_email(&email)
                    .await
                    .map_err(|e| AppError::internal("failed to get user").with_source(e))?
                    .ok_or_else(|| AppError::internal("failed to create user"))?,
                Err(e) => return Err(AppError::internal("failed to create user").with_source(e)),
            }
        }
    };
    if !user.is_active() {
        return Err(AppError::invalid_request("account is disabled"));
    }

    let code = generate_otp_code();
    let expires_at = OffsetDateTime::now_utc() + OTP_TTL;
    st.users
        .create_otp(user.id, &code, expires_at)
        .await
        .map_err(|e| AppError::internal("failed to create OTP").with_source(e))?;

    let message = otp_message(&st.config.mail.from, &email, &code);
    st.mailer
        .send(&message)
        .await
        .map_err(|e| AppError::internal("failed to send OTP email").with_source(e))?;

    info!(user_id = user.id, "otp issued");
    Ok(())
}

pub async fn verify_otp(st: &AppState, raw_email: &str, code: &str) -> Result<(), AppError> {
    let email = normalize_email(raw_email);
    let code = code.trim();
    if email.is_empty() || code.is_empty() {
        return Err(AppError::invalid_request("email and OTP code are required"));
    }

    let user = st
        .users
        .find_by_email(&email)
        .await
        .map_err(|e| AppError::internal("failed to get user").with_source(e))?
        .ok_or_else(|| AppError::invalid_request("user not found"))?;

    let otp = st
        .users
        .find_otp(user.id, code)
        .await
        .map_err(|e| AppError::internal("failed to get OTP").with_source(e))?
        .ok_or_else(|| AppError::unauthorized("invalid OTP"))?;

    if otp.is_used {
        return Err(AppError::invalid_request("OTP already used"));
    }
    if otp.is_expired(OffsetDateTime::now_utc()) {
        warn!(user_id = user.id, "expired otp presented");
        return Err(AppError::unauthorized("OTP expired"));
    }

    match st.users.consume_otp(otp.id, user.id).await {
        Ok(()) => {}
        Err(StoreError::NotFound) => return Err(AppError::invalid_request("OTP already used")),
        Err(e) => return Err(AppError::internal("failed to verify OTP").with_source(e)),
    }

    info!(user_id = user.id, "email verified");
    Ok(())
}

pub async fn set_password(st: &AppState, raw_email: &str, password: &str) -> Result<(), AppError> {
    let email = normalize_email(raw_email);
    if email.is_empty() || password.is_empty() {
        return Err(AppError::invalid_request("email and password are required"));
    }

    let hash = hash_blocking(password.to_string()).await?;

    match st.users.set_password_if_unset(&email, &hash).await {
        Ok(()) => {
            info!("password set");
            Ok(())
        }
        Err(StoreError::NotFound) => Err(AppError::invalid_request(
            "user is not verified or already has a password",
        )),
        Err(e) => Err(AppError::internal("failed to set password").with_source(e)),
    }
}

/// Issues a session token. Every credential failure looks the same to the caller.
pub async fn login(st: &AppState, raw_email: &str, password: &str) -> Result<String, AppError> {
    let email = normalize_email(raw_email);
    if email.is_empty() || password.is_empty() {
        return Err(AppError::invalid_request("email and password are required"));
    }
    let invalid = || AppError::unauthorized("invalid credentials");

    let user = st
        .users
        .find_by_email(&email)
        .await
        .map_err(|e| AppError::internal("failed to get user").with_source(e))?
        .ok_or_else(invalid)?;

    let hash = match (&user.password_hash, user.is_verified(), user.is_active()) {
        (Some(hash), true, true) => hash.clone(),
        _ => {
            warn!(user_id = user.id, "login for user without usable credentials");
            return Err(invalid());
        }
    };

    if !verify_blocking(password.to_string(), hash).await? {
        warn!(user_id = user.id, "login invalid password");
        return Err(invalid());
    }

    let token = st
        .keys
        .sign(user.id)
        .map_err(|e| AppError::internal("failed to issue token").with_source(e))?;
    info!(user_id = user.id, "user logged in");
    Ok(token)
}

pub async fn get_user(st: &AppState, user_id: i64) -> Result<User, AppError> {
    st.users
        .find_by_id(user_id)
        .await
        .map_err(|e| AppError::internal("failed to get user").with_source(e))?
        .ok_or_else(|| AppError::unauthorized("user not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, testing::TestEnv};

    /// Pulls the code out of the last OTP mail.
    fn last_code(env: &TestEnv) -> String {
        let sent = env.mailer.sent.lock().unwrap();
        let html = &sent.last().expect("an email was sent").html;
        let start = html.find("<strong>").unwrap() + "<strong>".len();
        let end = html.find("</strong>").unwrap();
        html[start..end].to_string()
    }

    fn other_code(code: &str) -> &'static str {
        if code == "9999" {
            "0000"
        } else {
            "9999"
        }
    }

    async fn verified_user(env: &TestEnv, email: &str) {
        request_otp(&env.state, email).await.unwrap();
        let code = last_code(env);
        verify_otp(&env.state, email, &code).await.unwrap();
    }

    #[test]
    fn otp_codes_are_four_digits() {
        for _ in 0..200 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 4);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("not an email"));
        assert_eq!(normalize_email("  Mixed@Case.COM "), "mixed@case.com");
    }

    #[tokio::test]
    async fn request_otp_creates_unverified_user_and_mails_code() {
        let env = TestEnv::new();
        request_otp(&env.state, "New@Example.com").await.unwrap();

        let user = env
            .state
            .users
            .find_by_email("new@example.com")
            .await
            .unwrap()
            .expect("user created");
        assert!(!user.is_verified());
        assert!(user.password_hash.is_none());

        let sent = env.mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "new@example.com");
        assert_eq!(sent[0].subject, "Your OTP code");
    }

    #[tokio::test]
    async fn request_otp_rejects_empty_email() {
        let env = TestEnv::new();
        let err = request_otp(&env.state, "   ").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert!(env.mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mail_failure_propagates() {
        let env = TestEnv::new();
        env.mailer.fail_next();
        let err = request_otp(&env.state, "a@b.co").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(err.source.is_some());
    }

    #[tokio::test]
    async fn wrong_code_fails_and_correct_code_works_once() {
        let env = TestEnv::new();
        request_otp(&env.state, "a@b.co").await.unwrap();
        let code = last_code(&env);

        let err = verify_otp(&env.state, "a@b.co", other_code(&code))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);

        verify_otp(&env.state, "a@b.co", &code).await.unwrap();
        let user = env
            .state
            .users
            .find_by_email("a@b.co")
            .await
            .unwrap()
            .unwrap();
        assert!(user.is_verified());

        let err = verify_otp(&env.state, "a@b.co", &code).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert_eq!(err.message, "OTP already used");
    }

    #[tokio::test]
    async fn expired_code_is_rejected() {
        let env = TestEnv::new();
        request_otp(&env.state, "late@b.co").await.unwrap();
        let user = env
            .state
            .users
            .find_by_email("late@b.co")
            .await
            .unwrap()
            .unwrap();
        let past = OffsetDateTime::now_utc() - Duration::minutes(1);
        env.state.users.create_otp(user.id, "4321", past).await.unwrap();

        let err = verify_otp(&env.state, "late@b.co", "4321").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn verify_for_unknown_email_is_invalid_request() {
        let env = TestEnv::new();
        let err = verify_otp(&env.state, "ghost@b.co", "1234").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn password_requires_verification_and_is_set_once() {
        let env = TestEnv::new();
        request_otp(&env.state, "a@b.co").await.unwrap();

        let err = set_password(&env.state, "a@b.co", "pw-1").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);

        let code = last_code(&env);
        verify_otp(&env.state, "a@b.co", &code).await.unwrap();
        set_password(&env.state, "a@b.co", "pw-1").await.unwrap();

        // a second OTP round must not allow overwriting the password
        verified_user(&env, "a@b.co").await;
        let err = set_password(&env.state, "a@b.co", "pw-2").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);

        assert!(login(&env.state, "a@b.co", "pw-1").await.is_ok());
        assert!(login(&env.state, "a@b.co", "pw-2").await.is_err());
    }

    #[tokio::test]
    async fn set_password_rejects_empty_inputs() {
        let env = TestEnv::new();
        let err = set_password(&env.state, "", "pw").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        let err = set_password(&env.state, "a@b.co", "").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let env = TestEnv::new();

        // unknown user
        let unknown = login(&env.state, "nobody@b.co", "pw").await.unwrap_err();
        // unverified, no password
        request_otp(&env.state, "fresh@b.co").await.unwrap();
        let unverified = login(&env.state, "fresh@b.co", "pw").await.unwrap_err();
        // verified, no password
        verified_user(&env, "nopw@b.co").await;
        let no_password = login(&env.state, "nopw@b.co", "pw").await.unwrap_err();
        // wrong password
        verified_user(&env, "full@b.co").await;
        set_password(&env.state, "full@b.co", "right").await.unwrap();
        let wrong = login(&env.state, "full@b.co", "wrong").await.unwrap_err();

        for err in [unknown, unverified, no_password, wrong] {
            assert_eq!(err.kind, ErrorKind::Unauthorized);
            assert_eq!(err.message, "invalid credentials");
        }
    }

    #[tokio::test]
    async fn login_issues_token_for_user() {
        let env = TestEnv::new();
        verified_user(&env, "full@b.co").await;
        set_password(&env.state, "full@b.co", "right").await.unwrap();

        let token = login(&env.state, " FULL@b.co ", "right").await.unwrap();
        let claims = env.state.keys.verify(&token).unwrap();
        let user = env
            .state
            .users
            .find_by_email("full@b.co")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claims.user_id().unwrap(), user.id);

        let me = get_user(&env.state, user.id).await.unwrap();
        assert_eq!(me.email, "full@b.co");
        let json = serde_json::to_value(&me).unwrap();
        assert!(json.get("password_hash").is_none());
    }
}
