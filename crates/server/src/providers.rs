//! Identity provider glue — Google and Azure AD v2.
//!
//! Thin code-exchange plumbing: swap the authorization code for an access
//! token, fetch the profile, and hand back a provider-agnostic
//! `ResolvedUser`. Everything past that point is provider-independent.

use serde::Deserialize;
use tracing::{debug, warn};

use vitrine_protocol::{UserRole, UserSnapshot};

use crate::error::GatewayError;
use crate::state::AppState;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const GRAPH_ME_URL: &str = "https://graph.microsoft.com/v1.0/me";

/// Provider-agnostic resolved user, the collaborator contract between the
/// provider integrations and the OAuth callback handler.
#[derive(Debug, Clone)]
pub struct ResolvedUser {
    pub provider_user_id: String,
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub picture_url: Option<String>,
}

impl ResolvedUser {
    /// The user snapshot stored in the session and sent to clients. User
    /// persistence is an external collaborator; the id stays
    /// provider-scoped.
    pub fn into_snapshot(self, provider: &str) -> UserSnapshot {
        UserSnapshot {
            id: format!("{provider}:{}", self.provider_user_id),
            email: self.email,
            firstname: self.firstname,
            lastname: self.lastname,
            picture: self.picture_url,
            role: UserRole::User,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Authorize URL the `/api/auth/google` entry redirects to.
pub fn google_authorize_url(state: &AppState) -> String {
    format!(
        "{GOOGLE_AUTH_URL}?client_id={}&redirect_uri={}&response_type=code&scope=email%20profile",
        state.config.google_client_id, state.config.google_redirect_uri
    )
}

/// Authorize URL the `/api/auth/azure` entry redirects to.
pub fn azure_authorize_url(state: &AppState) -> String {
    format!(
        "https://login.microsoftonline.com/{}/oauth2/v2.0/authorize?client_id={}&redirect_uri={}&response_type=code&scope=openid%20profile%20email%20https%3A%2F%2Fgraph.microsoft.com%2FUser.Read&prompt=consent",
        state.config.azure_tenant_id, state.config.azure_client_id, state.config.azure_redirect_uri
    )
}

#[derive(Debug, Deserialize)]
struct GoogleProfile {
    id: String,
    email: String,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Exchange a Google authorization code for a resolved user.
pub async fn resolve_google_user(
    state: &AppState,
    code: &str,
) -> Result<ResolvedUser, GatewayError> {
    let token: TokenResponse = post_token(
        state,
        GOOGLE_TOKEN_URL,
        &[
            ("code", code),
            ("client_id", &state.config.google_client_id),
            ("client_secret", &state.config.google_client_secret),
            ("redirect_uri", &state.config.google_redirect_uri),
            ("grant_type", "authorization_code"),
        ],
    )
    .await?;

    let profile: GoogleProfile = get_profile(state, GOOGLE_USERINFO_URL, &token.access_token).await?;
    debug!(
        component = "providers",
        event = "providers.google_resolved",
        provider_user_id = %profile.id,
        "Resolved Google user"
    );

    Ok(ResolvedUser {
        provider_user_id: profile.id,
        email: profile.email,
        firstname: profile.given_name.unwrap_or_default(),
        lastname: profile.family_name.unwrap_or_default(),
        picture_url: profile.picture,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphProfile {
    id: String,
    #[serde(default)]
    mail: Option<String>,
    #[serde(default)]
    user_principal_name: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    surname: Option<String>,
}

/// Exchange an Azure AD authorization code for a resolved user via
/// Microsoft Graph. The access token is not inspected locally; if Graph
/// rejects it, the required permissions were not granted.
pub async fn resolve_azure_user(
    state: &AppState,
    code: &str,
) -> Result<ResolvedUser, GatewayError> {
    let token_url = format!(
        "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
        state.config.azure_tenant_id
    );
    let token: TokenResponse = post_token(
        state,
        &token_url,
        &[
            ("code", code),
            ("client_id", &state.config.azure_client_id),
            ("client_secret", &state.config.azure_client_secret),
            ("redirect_uri", &state.config.azure_redirect_uri),
            ("grant_type", "authorization_code"),
            ("scope", "https://graph.microsoft.com/User.Read"),
        ],
    )
    .await?;

    let profile: GraphProfile = get_profile(state, GRAPH_ME_URL, &token.access_token).await?;

    let email = profile
        .mail
        .or(profile.user_principal_name)
        .ok_or_else(|| GatewayError::Provider("Graph profile carries no email".to_string()))?;

    Ok(ResolvedUser {
        provider_user_id: profile.id,
        email,
        firstname: profile.given_name.unwrap_or_default(),
        lastname: profile.surname.unwrap_or_default(),
        picture_url: None,
    })
}

async fn post_token<T: serde::de::DeserializeOwned>(
    state: &AppState,
    url: &str,
    form: &[(&str, &str)],
) -> Result<T, GatewayError> {
    let response = state
        .http
        .post(url)
        .form(form)
        .send()
        .await
        .map_err(|e| GatewayError::Provider(format!("token exchange failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        warn!(
            component = "providers",
            event = "providers.token_exchange_rejected",
            url = %url,
            status = %status,
            "Provider rejected the code exchange"
        );
        return Err(GatewayError::Provider(format!(
            "token endpoint returned {status}"
        )));
    }

    response
        .json()
        .await
        .map_err(|e| GatewayError::Provider(format!("token response unreadable: {e}")))
}

async fn get_profile<T: serde::de::DeserializeOwned>(
    state: &AppState,
    url: &str,
    access_token: &str,
) -> Result<T, GatewayError> {
    let response = state
        .http
        .get(url)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| GatewayError::Provider(format!("profile fetch failed: {e}")))?;

    if !response.status().is_success() {
        return Err(GatewayError::Provider(format!(
            "profile endpoint returned {}",
            response.status()
        )));
    }

    response
        .json()
        .await
        .map_err(|e| GatewayError::Provider(format!("profile response unreadable: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_id_is_provider_scoped() {
        let resolved = ResolvedUser {
            provider_user_id: "12345".to_string(),
            email: "jo@example.com".to_string(),
            firstname: "Jo".to_string(),
            lastname: "Martin".to_string(),
            picture_url: Some("https://cdn.example/p.png".to_string()),
        };

        let snapshot = resolved.into_snapshot("google");
        assert_eq!(snapshot.id, "google:12345");
        assert_eq!(snapshot.role, UserRole::User);
        assert_eq!(snapshot.picture.as_deref(), Some("https://cdn.example/p.png"));
    }

    #[test]
    fn graph_profile_falls_back_to_principal_name() {
        let json = r#"{"id": "x1", "userPrincipalName": "jo@corp.example", "givenName": "Jo"}"#;
        let profile: GraphProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.mail, None);
        assert_eq!(
            profile.user_principal_name.as_deref(),
            Some("jo@corp.example")
        );
    }
}
