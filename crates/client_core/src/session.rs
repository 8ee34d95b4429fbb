//! Authenticated session: bearer token plus the identity snapshot returned
//! by the auth endpoints, persisted in the local key/value store.

use std::sync::Arc;

use reqwest::Client;
use shared::{
    domain::Role,
    protocol::{AuthResponse, LoginRequest, RegisterRequest, UserSnapshot},
};
use storage::Storage;
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

use crate::{
    api::ensure_success,
    error::{ClientError, ClientResult},
};

pub const TOKEN_KEY: &str = "clinic_auth_token";
pub const USER_KEY: &str = "clinic_auth_user";

/// Token and identity captured together, as needed to open the messaging
/// transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub user: UserSnapshot,
}

#[derive(Default)]
struct SessionState {
    token: Option<String>,
    user: Option<UserSnapshot>,
}

pub struct SessionContext {
    http: Client,
    api_url: String,
    storage: Storage,
    state: RwLock<SessionState>,
    logged_in: watch::Sender<bool>,
}

impl SessionContext {
    /// Loads any persisted session. A user snapshot that no longer parses is
    /// dropped from the store.
    pub async fn restore(
        http: Client,
        api_url: impl Into<String>,
        storage: Storage,
    ) -> ClientResult<Arc<Self>> {
        let token = storage.get(TOKEN_KEY).await?;
        let user = match storage.get(USER_KEY).await? {
            Some(raw) => match serde_json::from_str::<UserSnapshot>(&raw) {
                Ok(user) => Some(user),
                Err(err) => {
                    warn!("session: discarding unreadable user snapshot: {err}");
                    storage.remove(USER_KEY).await?;
                    None
                }
            },
            None => None,
        };

        if let Some(user) = &user {
            info!(user_id = user.id.0, role = %user.role, "session: restored");
        }

        let (logged_in, _) = watch::channel(token.is_some());
        Ok(Arc::new(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            storage,
            state: RwLock::new(SessionState { token, user }),
            logged_in,
        }))
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub async fn token(&self) -> Option<String> {
        self.state.read().await.token.clone()
    }

    pub async fn current_user(&self) -> Option<UserSnapshot> {
        self.state.read().await.user.clone()
    }

    pub async fn role(&self) -> Option<Role> {
        self.state.read().await.user.as_ref().map(|user| user.role)
    }

    /// Both halves of the session, or `None` if either is missing.
    pub async fn credentials(&self) -> Option<Credentials> {
        let state = self.state.read().await;
        Some(Credentials {
            token: state.token.clone()?,
            user: state.user.clone()?,
        })
    }

    pub fn is_logged_in(&self) -> bool {
        *self.logged_in.borrow()
    }

    pub fn login_state(&self) -> watch::Receiver<bool> {
        self.logged_in.subscribe()
    }

    pub async fn login(&self, email: &str, password: &str) -> ClientResult<UserSnapshot> {
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let response = self
            .http
            .post(format!("{}/auth/login", self.api_url))
            .json(&request)
            .send()
            .await?;
        let auth: AuthResponse = match ensure_success(response).await {
            Ok(response) => response.json().await?,
            Err(ClientError::Unauthorized | ClientError::Forbidden(_)) => {
                return Err(ClientError::Validation("Invalid email or password.".into()));
            }
            Err(err) => return Err(err),
        };
        self.begin(auth).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> ClientResult<UserSnapshot> {
        let response = self
            .http
            .post(format!("{}/auth/register", self.api_url))
            .json(request)
            .send()
            .await?;
        let auth: AuthResponse = ensure_success(response).await?.json().await?;
        self.begin(auth).await
    }

    /// Installs a fresh session, persists it and raises the login signal.
    pub async fn begin(&self, auth: AuthResponse) -> ClientResult<UserSnapshot> {
        let user_json = serde_json::to_string(&auth.user)?;
        self.storage
            .put_many(&[(TOKEN_KEY, auth.token.as_str()), (USER_KEY, user_json.as_str())])
            .await?;

        {
            let mut state = self.state.write().await;
            state.token = Some(auth.token);
            state.user = Some(auth.user.clone());
        }
        info!(user_id = auth.user.id.0, role = %auth.user.role, "session: logged in");
        self.set_logged_in(true);
        Ok(auth.user)
    }

    /// Clears the persisted session and lowers the login signal. In-memory
    /// state is cleared even if the store cannot be updated.
    pub async fn logout(&self) -> ClientResult<()> {
        {
            let mut state = self.state.write().await;
            state.token = None;
            state.user = None;
        }
        self.set_logged_in(false);
        self.storage.remove_many(&[TOKEN_KEY, USER_KEY]).await?;
        info!("session: logged out");
        Ok(())
    }

    fn set_logged_in(&self, value: bool) {
        self.logged_in.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
