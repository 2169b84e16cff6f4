use anyhow::{Result, anyhow};
use keyring::{Entry, Error as KeyringError};

const SERVICE: &str = "mail_console";

/// Save the backend bearer token into the OS keyring for the given account
pub fn save_session_token(account: &str, token: &str) -> Result<()> {
    let entry = Entry::new(SERVICE, account);
    entry?
        .set_password(token)
        .map_err(|e| anyhow!(e.to_string()))?;
    Ok(())
}

/// Load the bearer token from the keyring for the given account
pub fn load_session_token(account: &str) -> Result<Option<String>> {
    let entry = Entry::new(SERVICE, account);
    match entry?.get_password() {
        Ok(v) => Ok(Some(v)),
        Err(KeyringError::NoEntry) => Ok(None),
        Err(e) => Err(anyhow!(e.to_string())),
    }
}

/// Forget the stored token; missing entries are not an error
pub fn clear_session_token(account: &str) -> Result<()> {
    let entry = Entry::new(SERVICE, account);
    match entry?.delete_credential() {
        Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
        Err(e) => Err(anyhow!(e.to_string())),
    }
}

/// Token from the keyring, or `MAIL_CONSOLE_TOKEN` when none is stored.
pub fn resolve_session_token(account: &str) -> Result<String> {
    if let Some(t) = load_session_token(account)? {
        return Ok(t);
    }
    std::env::var("MAIL_CONSOLE_TOKEN")
        .map_err(|_| anyhow!("not logged in: run `mail_console login` first"))
}
