use super::models::{AuthResponse, Credentials, Registration, User};
use super::ApiClient;
use crate::error::Result;

impl ApiClient {
    /// Signs in and stores the returned token on the shared session.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: AuthResponse = self.post("/auth/login", &credentials).await?;
        self.auth().set_token(response.token.clone());

        tracing::info!(email = %email, "Signed in");
        Ok(response)
    }

    pub async fn register(&self, registration: &Registration) -> Result<AuthResponse> {
        let response: AuthResponse = self.post("/auth/register", registration).await?;
        self.auth().set_token(response.token.clone());

        tracing::info!(email = %registration.email, "Registered account");
        Ok(response)
    }

    pub async fn current_user(&self) -> Result<User> {
        self.get("/auth/me").await
    }

    /// Drops the stored credential. Returns whether one was present.
    pub fn logout(&self) -> bool {
        self.auth().clear()
    }
}
