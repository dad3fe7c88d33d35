use anyhow::Context;
use tracing::{info, warn};

use crate::{
    auth::{
        dto::{LoginRequest, PublicUser, RegisterRequest, TokenResponse},
        jwt::JwtKeys,
        password::{hash_password_off_thread, verify_dummy_off_thread, verify_password_off_thread},
        repo::{CreateUserError, UserStore},
    },
    error::{AuthError, AuthResult},
};

/// Hash the password, insert the user and hand back the public view.
pub async fn register(store: &dyn UserStore, payload: RegisterRequest) -> AuthResult<PublicUser> {
    payload.validate().map_err(|msg| {
        warn!(reason = %msg, "registration rejected");
        AuthError::Validation(msg)
    })?;

    let RegisterRequest {
        username,
        email,
        password,
    } = payload;

    let hash = hash_password_off_thread(password)
        .await
        .context("hash password")?;

    let user = match store.create(&username, &email, &hash).await {
        Ok(u) => u,
        Err(CreateUserError::DuplicateUsername) => {
            warn!(username = %username, "username already exists");
            return Err(AuthError::DuplicateUsername);
        }
        Err(CreateUserError::DuplicateEmail) => {
            warn!(email = %email, "email already exists");
            return Err(AuthError::DuplicateEmail);
        }
        Err(CreateUserError::Other(e)) => return Err(AuthError::Internal(e.context("create user"))),
    };

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user.into())
}

/// Check credentials and issue an access token. Unknown email and wrong
/// password end in the same error after the same amount of argon2 work.
pub async fn login(
    store: &dyn UserStore,
    keys: &JwtKeys,
    payload: LoginRequest,
) -> AuthResult<TokenResponse> {
    payload.validate().map_err(|msg| {
        warn!(reason = %msg, "login rejected");
        AuthError::Validation(msg)
    })?;

    let user = match store.find_by_email(&payload.email).await? {
        Some(u) => u,
        None => {
            verify_dummy_off_thread(payload.password).await?;
            warn!("login unknown email");
            return Err(AuthError::InvalidCredentials);
        }
    };

    let ok = verify_password_off_thread(payload.password, user.password_hash.clone()).await?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    let access_token = keys.sign_access(user.id).context("sign access token")?;

    info!(user_id = %user.id, "user logged in");
    Ok(TokenResponse::bearer(access_token, user.into()))
}
