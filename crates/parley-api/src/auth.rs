use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode};
use tracing::error;

use parley_db::Database;
use parley_db::models::UserRow;
use parley_types::api::{AuthErrorType, AuthResponse, LoginRequest, RegisterRequest};
use parley_types::models::PublicUser;

use crate::AppState;

/// POST /register — structured success/failure, never a 500 for bad input.
/// Check order matches what the client expects: email conflict, then
/// username shape/conflict, then password policy.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, StatusCode> {
    // Existence checks and the argon2id hash run off the async runtime;
    // the hash alone is deliberately slow.
    let db = state.db.clone();
    let response = tokio::task::spawn_blocking(move || -> Result<AuthResponse, StatusCode> {
        if db.get_user_by_email(&req.email).map_err(internal)?.is_some() {
            return Ok(AuthResponse::rejected(
                AuthErrorType::Email,
                "An account with this email already exists",
            ));
        }

        if req.username.len() < 3 {
            return Ok(AuthResponse::rejected(
                AuthErrorType::Username,
                "Username is too short",
            ));
        }

        if db
            .get_user_by_username(&req.username)
            .map_err(internal)?
            .is_some()
        {
            return Ok(AuthResponse::rejected(
                AuthErrorType::Username,
                "An account with this username already exists",
            ));
        }

        if let Err(reason) = check_password(&req.password, &req.repeated_password) {
            return Ok(AuthResponse::rejected(AuthErrorType::Password, reason));
        }

        // Hash with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(internal)?
            .to_string();

        db.create_user(&req.username, &req.email, &password_hash)
            .map_err(internal)?;

        Ok(AuthResponse::ok("Account created successfully"))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(Json(response))
}

/// POST /login — unknown email and wrong password come back as structured
/// `errorType` replies; only store failures become 500s.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, StatusCode> {
    let db = state.db.clone();
    let check =
        tokio::task::spawn_blocking(move || verify_credentials(&db, &req.email, &req.password))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })??;

    match check {
        CredentialCheck::Verified(user) => Ok(Json(AuthResponse::ok_user(
            "Successfully logged in",
            PublicUser {
                id: user.id,
                username: user.username,
                email: user.email,
            },
        ))),
        CredentialCheck::UnknownEmail => Ok(Json(AuthResponse::rejected(
            AuthErrorType::Email,
            "No account with this email exists",
        ))),
        CredentialCheck::WrongPassword => Ok(Json(AuthResponse::rejected(
            AuthErrorType::Password,
            "Wrong password",
        ))),
    }
}

pub enum CredentialCheck {
    Verified(UserRow),
    UnknownEmail,
    WrongPassword,
}

/// Look the account up by email and verify the password against the stored
/// hash. Bad credentials are a normal outcome, not an error; only store or
/// hash-parsing failures error out.
fn verify_credentials(
    db: &Database,
    email: &str,
    password: &str,
) -> Result<CredentialCheck, StatusCode> {
    let Some(user) = db.get_user_by_email(email).map_err(internal)? else {
        return Ok(CredentialCheck::UnknownEmail);
    };

    let parsed_hash = PasswordHash::new(&user.password).map_err(internal)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(CredentialCheck::Verified(user)),
        Err(_) => Ok(CredentialCheck::WrongPassword),
    }
}

/// Registration password policy. First failing rule wins.
fn check_password(password: &str, repeated: &str) -> Result<(), &'static str> {
    if password != repeated {
        return Err("Passwords do not match");
    }
    if password.len() < 6 {
        return Err("Password is too short");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit");
    }
    Ok(())
}

fn internal<E: std::fmt::Display>(e: E) -> StatusCode {
    error!("Internal error: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppStateInner;
    use parley_gateway::dispatcher::Dispatcher;
    use std::sync::Arc;

    fn state() -> AppState {
        Arc::new(AppStateInner {
            db: Arc::new(Database::open_in_memory().unwrap()),
            dispatcher: Dispatcher::new(),
        })
    }

    fn register_req(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            repeated_password: password.into(),
        }
    }

    #[test]
    fn test_password_policy() {
        assert!(check_password("Abcde1", "Abcde1").is_ok());
        assert!(check_password("Abcde1", "Abcde2").is_err()); // mismatch
        assert!(check_password("abc", "abc").is_err()); // too short
        assert!(check_password("ABCDE1", "ABCDE1").is_err()); // no lowercase
        assert!(check_password("abcde1", "abcde1").is_err()); // no uppercase
        assert!(check_password("Abcdef", "Abcdef").is_err()); // no digit
    }

    #[tokio::test]
    async fn test_register_weak_password_rejected() {
        let state = state();
        let resp = register(State(state), Json(register_req("alice", "a@example.com", "abc")))
            .await
            .unwrap();
        assert!(!resp.0.success);
        assert_eq!(resp.0.error_type, Some(AuthErrorType::Password));
    }

    #[tokio::test]
    async fn test_register_conflicts() {
        let state = state();
        let resp = register(
            State(state.clone()),
            Json(register_req("alice", "a@example.com", "Abcde1")),
        )
        .await
        .unwrap();
        assert!(resp.0.success);

        // Same email again
        let resp = register(
            State(state.clone()),
            Json(register_req("alice2", "a@example.com", "Abcde1")),
        )
        .await
        .unwrap();
        assert_eq!(resp.0.error_type, Some(AuthErrorType::Email));

        // Same username, different email
        let resp = register(
            State(state.clone()),
            Json(register_req("alice", "b@example.com", "Abcde1")),
        )
        .await
        .unwrap();
        assert_eq!(resp.0.error_type, Some(AuthErrorType::Username));

        // Too-short username
        let resp = register(
            State(state),
            Json(register_req("al", "c@example.com", "Abcde1")),
        )
        .await
        .unwrap();
        assert_eq!(resp.0.error_type, Some(AuthErrorType::Username));
    }

    #[tokio::test]
    async fn test_login_outcomes() {
        let state = state();
        register(
            State(state.clone()),
            Json(register_req("alice", "a@example.com", "Abcde1")),
        )
        .await
        .unwrap();

        let resp = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "nobody@example.com".into(),
                password: "Abcde1".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.0.error_type, Some(AuthErrorType::Email));

        let resp = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "a@example.com".into(),
                password: "wrong".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.0.error_type, Some(AuthErrorType::Password));

        let resp = login(
            State(state),
            Json(LoginRequest {
                email: "a@example.com".into(),
                password: "Abcde1".into(),
            }),
        )
        .await
        .unwrap();
        assert!(resp.0.success);
        let user = resp.0.user.clone().expect("login reply carries the account");
        assert_eq!(user.username, "alice");

        // The stored hash must never appear in the serialized reply.
        let json = serde_json::to_value(&resp.0).unwrap();
        assert!(json.get("password").is_none());
        assert!(json["user"].get("password").is_none());
    }
}
