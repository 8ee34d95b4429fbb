use shared::{domain::Role, protocol::UserSnapshot};
use tracing::warn;

use crate::{
    error::{ClientError, ClientResult},
    session::SessionContext,
};

pub async fn require_login(session: &SessionContext) -> ClientResult<UserSnapshot> {
    if !session.is_logged_in() {
        return Err(ClientError::NotLoggedIn);
    }
    session.current_user().await.ok_or(ClientError::NotLoggedIn)
}

/// An empty `roles` list admits any logged-in user.
pub async fn require_role(session: &SessionContext, roles: &[Role]) -> ClientResult<UserSnapshot> {
    let user = require_login(session).await?;
    if roles.is_empty() {
        warn!("guard: no roles listed, allowing access");
        return Ok(user);
    }
    if roles.contains(&user.role) {
        Ok(user)
    } else {
        warn!(role = %user.role, ?roles, "guard: access denied");
        Err(ClientError::Forbidden(format!(
            "role {} may not access this resource",
            user.role
        )))
    }
}

#[cfg(test)]
mod tests {
    use shared::{domain::UserId, protocol::AuthResponse};
    use storage::Storage;

    use super::*;

    async fn session_as(role: Option<Role>) -> std::sync::Arc<SessionContext> {
        let storage = Storage::new("sqlite::memory:").await.expect("storage");
        let session = SessionContext::restore(reqwest::Client::new(), "http://127.0.0.1:1/api/v1", storage)
            .await
            .expect("session");
        if let Some(role) = role {
            session
                .begin(AuthResponse {
                    token: "t".into(),
                    user: UserSnapshot {
                        id: UserId(1),
                        email: "doc@clinic.test".into(),
                        first_name: "Dana".into(),
                        last_name: "Doe".into(),
                        role,
                    },
                })
                .await
                .expect("begin");
        }
        session
    }

    #[tokio::test]
    async fn anonymous_session_is_rejected() {
        let session = session_as(None).await;
        assert!(matches!(
            require_login(&session).await,
            Err(ClientError::NotLoggedIn)
        ));
        assert!(matches!(
            require_role(&session, &[Role::Admin]).await,
            Err(ClientError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn role_must_be_listed() {
        let session = session_as(Some(Role::Doctor)).await;
        assert!(require_role(&session, &[Role::Doctor, Role::Admin]).await.is_ok());
        assert!(matches!(
            require_role(&session, &[Role::Admin]).await,
            Err(ClientError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn empty_role_list_allows_any_user() {
        let session = session_as(Some(Role::Secretary)).await;
        let user = require_role(&session, &[]).await.expect("allowed");
        assert_eq!(user.role, Role::Secretary);
    }
}
