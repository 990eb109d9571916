//! Password resolution and the interactive prompt

use async_trait::async_trait;
use inquire::{Password as PasswordInput, PasswordDisplayMode};

use crate::config::{Driver, Password};
use crate::error::CliError;

const PROMPT: &str = "Password:";

/// Reads a password from the user
#[async_trait]
pub trait PasswordPrompt: Send + Sync {
    async fn read_password(&self, message: &str) -> Result<String, CliError>;
}

/// Masked prompt on the controlling terminal
///
/// Each typed character echoes as `*`. The returned line has no trailing
/// newline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

#[async_trait]
impl PasswordPrompt for TerminalPrompt {
    async fn read_password(&self, message: &str) -> Result<String, CliError> {
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            PasswordInput::new(&message)
                .with_display_mode(PasswordDisplayMode::Masked)
                .without_confirmation()
                .prompt()
        })
        .await
        .map_err(|e| CliError::Prompt(e.to_string()))?
        .map_err(|e| CliError::Prompt(e.to_string()))
    }
}

/// Turn the configured password into the one handed to the driver
///
/// SQL Server logins always need a password, so an absent one is asked for.
pub async fn resolve_password(
    password: &Password,
    driver: Driver,
    prompt: &dyn PasswordPrompt,
) -> Result<Option<String>, CliError> {
    match password {
        Password::Provided(value) => Ok(Some(value.clone())),
        Password::Prompt => prompt.read_password(PROMPT).await.map(Some),
        Password::Absent if driver == Driver::SqlServer => {
            tracing::debug!("no password configured for sqlserver, prompting");
            prompt.read_password(PROMPT).await.map(Some)
        }
        Password::Absent => Ok(None),
    }
}
