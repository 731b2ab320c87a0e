use crate::auth::jwt::JwtManager;
use crate::auth::otp::{CodeCheck, CodeVerifier};
use crate::auth::password::PasswordHasher;
use crate::auth::refresh::{IssuedRefreshToken, RefreshLedger, RefreshPolicy};
use crate::db::error::RepositoryError;
use crate::db::models::user::{NewUser, User};
use crate::db::{Stores, UserStore};
use crate::email::{EmailDispatcher, templates};
use crate::error::AppError;
use authgate_api::{
    LoginRequest, LoginResponse, LogoutAllResponse, MessageResponse, ReceiptRequest,
    RefreshTokenResponse, RegisterRequest, ResendCodeRequest, UserResponse, VerifyEmailRequest,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const MAX_USERNAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 255;
const TOKEN_TYPE: &str = "Bearer";
const RESEND_MESSAGE: &str =
    "If the account exists and is not yet verified, a new code has been sent";

/// Login result: the JSON body plus the refresh token for the cookie.
#[derive(Debug)]
pub struct LoginOutcome {
    pub response: LoginResponse,
    pub refresh: IssuedRefreshToken,
}

#[derive(Debug)]
pub struct RefreshOutcome {
    pub response: RefreshTokenResponse,
    pub refresh: IssuedRefreshToken,
}

pub struct SessionService {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    codes: CodeVerifier,
    jwt: JwtManager,
    ledger: RefreshLedger,
    mailer: EmailDispatcher,
    otp_ttl: Duration,
}

impl SessionService {
    pub fn new(
        stores: &Stores,
        hasher: PasswordHasher,
        jwt: JwtManager,
        policy: RefreshPolicy,
        otp_ttl: Duration,
        mailer: EmailDispatcher,
    ) -> Self {
        Self {
            users: Arc::clone(&stores.users),
            hasher,
            codes: CodeVerifier::new(Arc::clone(&stores.ephemeral), otp_ttl),
            ledger: RefreshLedger::new(
                Arc::clone(&stores.refresh_tokens),
                Arc::clone(&stores.users),
                jwt.clone(),
                policy,
            ),
            jwt,
            mailer,
            otp_ttl,
        }
    }

    /// Creates an unverified account and mails it a verification code.
    pub async fn register(&self, request: RegisterRequest) -> Result<UserResponse, AppError> {
        let email = normalize_email(&request.email);
        if !is_valid_email(&email) {
            return Err(AppError::InvalidEmail);
        }

        let username = request.username.trim().to_string();
        if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
            return Err(AppError::validation(format!(
                "Username must be between 1 and {MAX_USERNAME_LEN} characters"
            )));
        }

        if !is_strong_password(&request.password) {
            return Err(AppError::WeakPassword(
                "Password must be at least 8 characters with uppercase, lowercase and numbers"
                    .to_string(),
            ));
        }

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AppError::UserAlreadyExists);
        }

        let password_hash = self.hash_password(request.password).await?;

        let user = self
            .users
            .create_user(NewUser {
                email,
                username,
                password_hash,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::UniqueViolation(_) => AppError::UserAlreadyExists,
                other => other.into(),
            })?;

        self.send_verification_code(&user).await?;
        tracing::info!(user_id = %user.id, "User registered");

        Ok(user.into())
    }

    /// The account is marked verified before the code is consumed, so a
    /// failed write leaves the code usable for a retry.
    pub async fn verify_email(
        &self,
        request: VerifyEmailRequest,
    ) -> Result<MessageResponse, AppError> {
        let email = normalize_email(&request.email);

        match self.codes.compare(&email, &request.code).await? {
            CodeCheck::Valid => {}
            outcome @ (CodeCheck::Expired | CodeCheck::Mismatch) => {
                tracing::debug!(email = %email, ?outcome, "Verification code rejected");
                return Err(AppError::InvalidVerificationCode);
            }
        }

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AppError::InvalidVerificationCode)?;
        self.users.set_verified(user.id).await?;

        if !self.codes.consume(&email).await? {
            tracing::debug!(user_id = %user.id, "Verification code consumed by a concurrent request");
            return Err(AppError::InvalidVerificationCode);
        }

        tracing::info!(user_id = %user.id, "Email verified");
        Ok(MessageResponse::new("Email verified successfully"))
    }

    /// Answers identically whether or not a code was sent, so it cannot be
    /// used to enumerate accounts.
    pub async fn resend_code(
        &self,
        request: ResendCodeRequest,
    ) -> Result<MessageResponse, AppError> {
        let email = normalize_email(&request.email);

        match self.users.find_by_email(&email).await? {
            Some(user) if !user.email_verified => self.send_verification_code(&user).await?,
            _ => tracing::debug!(email = %email, "Resend requested for unknown or verified account"),
        }

        Ok(MessageResponse::new(RESEND_MESSAGE))
    }

    pub async fn login(
        &self,
        request: LoginRequest,
        device_id: &str,
    ) -> Result<LoginOutcome, AppError> {
        let email = normalize_email(&request.email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            // Same Argon2 cost as a wrong password, so timing does not reveal
            // whether the account exists.
            self.verify_dummy_password(request.password).await?;
            tracing::info!("Login rejected: unknown email");
            return Err(AppError::InvalidCredentials);
        };

        if !self
            .verify_password(request.password, user.password_hash.clone())
            .await?
        {
            tracing::info!(user_id = %user.id, "Login rejected: wrong password");
            return Err(AppError::InvalidCredentials);
        }

        if !user.email_verified {
            return Err(AppError::AccountNotVerified);
        }

        let refresh = self.ledger.issue(user.id, device_id).await?;
        let access_token = self.jwt.mint(user.id, &user.username)?;
        tracing::info!(user_id = %user.id, device_id, "User logged in");

        Ok(LoginOutcome {
            response: LoginResponse {
                access_token,
                token_type: TOKEN_TYPE.to_string(),
                expires_in: self.jwt.expires_in_seconds(),
                user: user.into(),
            },
            refresh,
        })
    }

    pub async fn refresh(&self, raw: &str, device_id: &str) -> Result<RefreshOutcome, AppError> {
        let rotated = self.ledger.rotate(raw, device_id).await?;

        Ok(RefreshOutcome {
            response: RefreshTokenResponse {
                access_token: rotated.access_token,
                token_type: TOKEN_TYPE.to_string(),
                expires_in: self.jwt.expires_in_seconds(),
            },
            refresh: rotated.refresh,
        })
    }

    /// Best effort: an absent or unknown token is not an error, and a store
    /// failure is only logged since the cookie is cleared regardless.
    pub async fn logout(&self, raw: Option<&str>) -> MessageResponse {
        if let Some(raw) = raw.filter(|r| !r.is_empty()) {
            match self.ledger.revoke_presented(raw).await {
                Ok(revoked) => tracing::debug!(revoked, "Logout"),
                Err(e) => tracing::warn!("Logout could not revoke refresh token: {e}"),
            }
        }
        MessageResponse::new("Logged out successfully")
    }

    pub async fn logout_all(&self, user_id: Uuid) -> Result<LogoutAllResponse, AppError> {
        let revoked_sessions = self.ledger.revoke_all(user_id).await?;
        Ok(LogoutAllResponse { revoked_sessions })
    }

    /// Queues a payment receipt for the user. Called by the payment service.
    pub async fn send_receipt(&self, request: ReceiptRequest) -> Result<MessageResponse, AppError> {
        let user = self
            .users
            .find_by_id(request.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        self.mailer.dispatch(templates::receipt(
            &user.email,
            &user.username,
            &request.order_id,
            request.amount,
            &request.item_name,
        ));
        tracing::info!(user_id = %user.id, order_id = %request.order_id, "Receipt queued");

        Ok(MessageResponse::new("Receipt processed"))
    }

    async fn send_verification_code(&self, user: &User) -> Result<(), AppError> {
        let code = self.codes.issue(&user.email).await?;
        self.mailer.dispatch(templates::verification(
            &user.email,
            &user.username,
            &code,
            self.otp_ttl.as_secs() / 60,
        ));
        Ok(())
    }

    async fn hash_password(&self, password: String) -> Result<String, AppError> {
        let hasher = self.hasher.clone();
        Ok(tokio::task::spawn_blocking(move || hasher.hash(&password)).await??)
    }

    async fn verify_password(&self, password: String, encoded: String) -> Result<bool, AppError> {
        let hasher = self.hasher.clone();
        Ok(tokio::task::spawn_blocking(move || hasher.verify(&password, &encoded)).await?)
    }

    async fn verify_dummy_password(&self, password: String) -> Result<bool, AppError> {
        let hasher = self.hasher.clone();
        Ok(tokio::task::spawn_blocking(move || hasher.verify_dummy(&password)).await?)
    }
}

// === Validation helpers ===

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    email.contains('@')
        && email.contains('.')
        && email.len() > 5
        && email.chars().count() <= MAX_EMAIL_LEN
}

fn is_strong_password(password: &str) -> bool {
    if password.len() < 8 {
        return false;
    }
    let (mut upper, mut lower, mut digit) = (false, false, false);
    for c in password.chars() {
        upper |= c.is_uppercase();
        lower |= c.is_lowercase();
        digit |= c.is_ascii_digit();
        if upper && lower && digit {
            return true;
        }
    }
    upper && lower && digit
}
