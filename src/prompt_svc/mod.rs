use dialoguer::{Confirm, Password};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

pub const PASSPHRASE_ENV: &str = "BACKUP_PASSPHRASE";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt failed: {0}")]
    Interaction(String),
    #[error("an empty passphrase is not allowed")]
    EmptyPassphrase,
}

pub type Result<T> = std::result::Result<T, PromptError>;

///
/// Operator interaction: confirmations and passphrases
///
#[cfg_attr(test, automock)]
pub trait Prompt : Send + Sync {
    fn confirm(&self, message: &str) -> Result<bool>;
    ///
    /// Obtains a passphrase. `confirm` asks for it twice.
    ///
    fn passphrase(&self, message: &str, confirm: bool) -> Result<String>;
}

///
/// Terminal prompts. A passphrase set in `BACKUP_PASSPHRASE` is used without asking.
///
pub struct TerminalPrompt {
    env_passphrase: Option<String>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self { env_passphrase: std::env::var(PASSPHRASE_ENV).ok().filter(|p| !p.is_empty()) }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompt for TerminalPrompt {
    fn confirm(&self, message: &str) -> Result<bool> {
        Confirm::new()
            .with_prompt(message)
            .default(false)
            .interact()
            .map_err(|e| PromptError::Interaction(e.to_string()))
    }

    fn passphrase(&self, message: &str, confirm: bool) -> Result<String> {
        if let Some(passphrase) = &self.env_passphrase {
            return Ok(passphrase.clone());
        }

        let mut prompt = Password::new().with_prompt(message);
        if confirm {
            prompt = prompt.with_confirmation("Repeat passphrase", "Passphrases do not match");
        }
        let passphrase = prompt
            .interact()
            .map_err(|e| PromptError::Interaction(e.to_string()))?;

        if passphrase.is_empty() {
            return Err(PromptError::EmptyPassphrase);
        }
        Ok(passphrase)
    }
}
