// Session login
//
// The end-user API authenticates with a form-encoded POST and hands back a
// session cookie, which the client's cookie jar replays on every later
// request. There is no explicit logout; a session ends when the server
// starts answering 401.

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::client::{TahomaClient, api_error};
use crate::error::Error;
use crate::models::LoginResponse;

impl TahomaClient {
    /// Log in and store the session cookie in the client's jar.
    ///
    /// `POST /login` with form fields `userId` / `userPassword`.
    ///
    /// Both an explicit `{ "success": false }` body and a non-2xx status
    /// surface as [`Error::Authentication`], since the server uses either
    /// depending on the failure.
    pub async fn login(&self, user: &str, password: &SecretString) -> Result<(), Error> {
        let url = self.endpoint_url(&["login"])?;
        debug!(user, "logging in");

        let resp = self
            .http()
            .post(url)
            .form(&[
                ("userId", user),
                ("userPassword", password.expose_secret()),
            ])
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            let message = match api_error(status.as_u16(), &body) {
                Error::Api {
                    message: Some(m), ..
                } => m,
                other => other.to_string(),
            };
            return Err(Error::Authentication { message });
        }

        let parsed: LoginResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        if parsed.success {
            debug!("login successful");
            Ok(())
        } else {
            Err(Error::Authentication {
                message: parsed
                    .error
                    .unwrap_or_else(|| "login rejected".to_owned()),
            })
        }
    }
}
