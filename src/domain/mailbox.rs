use serde::{Deserialize, Serialize};

/// How the backend retrieves mail for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MailType {
    #[default]
    Outlook,
    Imap,
    Gmail,
    Qq,
}

impl MailType {
    /// Fixed IMAP endpoint for hosted providers.
    pub fn imap_preset(self) -> Option<(&'static str, u16)> {
        match self {
            MailType::Gmail => Some(("imap.gmail.com", 993)),
            MailType::Qq => Some(("imap.qq.com", 993)),
            MailType::Outlook | MailType::Imap => None,
        }
    }

    pub fn is_oauth(self) -> bool {
        self == MailType::Outlook
    }
}

impl std::str::FromStr for MailType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "outlook" => Ok(MailType::Outlook),
            "imap" => Ok(MailType::Imap),
            "gmail" => Ok(MailType::Gmail),
            "qq" => Ok(MailType::Qq),
            other => Err(anyhow::anyhow!("unsupported mail type: {other}")),
        }
    }
}

/// A registered mailbox as listed by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mailbox {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub mail_type: MailType,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub subscription_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_check_time: Option<String>,
}

impl Mailbox {
    /// Accounts with an error or fewer than two push subscriptions need attention.
    pub fn needs_attention(&self) -> bool {
        self.last_error.as_deref().is_some_and(|e| !e.is_empty())
            || (self.mail_type.is_oauth() && self.subscription_count < 2)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailboxPage {
    pub emails: Vec<Mailbox>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

/// Credentials for registering a mailbox.
#[derive(Debug, Clone)]
pub enum MailboxCredentials {
    OAuth {
        client_id: String,
        refresh_token: String,
    },
    Imap {
        server: Option<String>,
        port: Option<u16>,
    },
}

#[derive(Debug, Clone)]
pub struct NewMailbox {
    pub email: String,
    pub password: String,
    pub mail_type: MailType,
    pub credentials: MailboxCredentials,
}

impl NewMailbox {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            anyhow::bail!("email address and password are required");
        }
        match (&self.mail_type, &self.credentials) {
            (MailType::Outlook, MailboxCredentials::OAuth { client_id, refresh_token }) => {
                if client_id.trim().is_empty() || refresh_token.trim().is_empty() {
                    anyhow::bail!("outlook mailboxes need a client id and refresh token");
                }
                Ok(())
            }
            (MailType::Outlook, MailboxCredentials::Imap { .. }) => {
                anyhow::bail!("outlook mailboxes need OAuth credentials")
            }
            (_, MailboxCredentials::OAuth { .. }) => {
                anyhow::bail!("{:?} mailboxes use IMAP credentials", self.mail_type)
            }
            _ => Ok(()),
        }
    }

    /// Request body for `POST /api/emails`.
    pub fn to_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "email": self.email.trim(),
            "password": self.password,
            "mail_type": self.mail_type,
        });
        match &self.credentials {
            MailboxCredentials::OAuth {
                client_id,
                refresh_token,
            } => {
                body["client_id"] = client_id.trim().into();
                body["refresh_token"] = refresh_token.trim().into();
            }
            MailboxCredentials::Imap { server, port } => {
                let (server, port) = match self.mail_type.imap_preset() {
                    Some((s, p)) => (Some(s.to_string()), Some(p)),
                    None => (server.clone(), *port),
                };
                if let Some(s) = server {
                    body["server"] = s.into();
                }
                if let Some(p) = port {
                    body["port"] = p.into();
                }
            }
        }
        body
    }
}

/// Partial update for `PUT /api/emails/{id}`; unset fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MailboxUpdate {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_graph_api: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imap(mail_type: MailType) -> NewMailbox {
        NewMailbox {
            email: "me@example.com".into(),
            password: "pw".into(),
            mail_type,
            credentials: MailboxCredentials::Imap {
                server: Some("mail.example.com".into()),
                port: Some(143),
            },
        }
    }

    #[test]
    fn hosted_imap_uses_fixed_server() {
        let body = imap(MailType::Gmail).to_body();
        assert_eq!(body["server"], "imap.gmail.com");
        assert_eq!(body["port"], 993);
        assert_eq!(body["mail_type"], "gmail");

        let body = imap(MailType::Imap).to_body();
        assert_eq!(body["server"], "mail.example.com");
        assert_eq!(body["port"], 143);
    }

    #[test]
    fn outlook_requires_oauth_credentials() {
        let mut m = imap(MailType::Outlook);
        assert!(m.validate().is_err());
        m.credentials = MailboxCredentials::OAuth {
            client_id: "cid".into(),
            refresh_token: " ".into(),
        };
        assert!(m.validate().is_err());
        m.credentials = MailboxCredentials::OAuth {
            client_id: "cid".into(),
            refresh_token: "rt".into(),
        };
        m.validate().unwrap();
        assert_eq!(m.to_body()["client_id"], "cid");
    }

    #[test]
    fn attention_flags_errors_and_thin_subscriptions() {
        let m: Mailbox = serde_json::from_str(
            r#"{"id":1,"email":"a@outlook.com","mail_type":"outlook","subscription_count":2}"#,
        )
        .unwrap();
        assert!(!m.needs_attention());

        let m: Mailbox = serde_json::from_str(
            r#"{"id":2,"email":"b@outlook.com","mail_type":"outlook","subscription_count":1}"#,
        )
        .unwrap();
        assert!(m.needs_attention());

        let m: Mailbox = serde_json::from_str(
            r#"{"id":3,"email":"c@qq.com","mail_type":"qq","last_error":"login failed"}"#,
        )
        .unwrap();
        assert!(m.needs_attention());
    }

    #[test]
    fn parses_mail_type_names() {
        assert_eq!("Gmail".parse::<MailType>().unwrap(), MailType::Gmail);
        assert!("pop3".parse::<MailType>().is_err());
    }
}
