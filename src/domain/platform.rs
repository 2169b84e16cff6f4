use serde::{Deserialize, Serialize};

use crate::domain::mail::flag;

pub const MAX_PLATFORM_NAME: usize = 50;

/// A sender/subject/content pattern rule that tags mail with a platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformRule {
    pub id: i64,
    pub platform_name: String,
    #[serde(default)]
    pub sender_pattern: Option<String>,
    #[serde(default)]
    pub subject_pattern: Option<String>,
    #[serde(default)]
    pub content_pattern: Option<String>,
    #[serde(default = "enabled", deserialize_with = "flag")]
    pub is_enabled: bool,
}

fn enabled() -> bool {
    true
}

/// Rule fields as entered by the operator, before the backend assigns an id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleDraft {
    pub platform_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,
}

impl RuleDraft {
    /// Trims every field and turns blank patterns into `None`.
    pub fn normalized(mut self) -> Self {
        self.platform_name = self.platform_name.trim().to_string();
        for p in [
            &mut self.sender_pattern,
            &mut self.subject_pattern,
            &mut self.content_pattern,
        ] {
            *p = p
                .take()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
        }
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_platform_name(&self.platform_name)?;
        if self.sender_pattern.is_none()
            && self.subject_pattern.is_none()
            && self.content_pattern.is_none()
        {
            anyhow::bail!("a rule needs at least one sender, subject or content pattern");
        }
        Ok(())
    }
}

/// Partial rule change. Absent fields are left as they are on the backend;
/// a blank pattern clears that pattern.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,
}

impl RuleUpdate {
    pub fn normalized(mut self) -> Self {
        for f in [
            &mut self.platform_name,
            &mut self.sender_pattern,
            &mut self.subject_pattern,
            &mut self.content_pattern,
        ] {
            if let Some(v) = f.as_mut() {
                *v = v.trim().to_string();
            }
        }
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(name) = &self.platform_name {
            validate_platform_name(name)?;
        }
        if *self == RuleUpdate::default() {
            anyhow::bail!("nothing to update");
        }
        Ok(())
    }
}

pub fn validate_platform_name(name: &str) -> anyhow::Result<()> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("platform name must not be empty");
    }
    if name.chars().count() > MAX_PLATFORM_NAME {
        anyhow::bail!("platform name must be at most {MAX_PLATFORM_NAME} characters");
    }
    Ok(())
}

/// Entry of `GET /api/platforms`: either a bare name or an object with usage.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PlatformEntry {
    Name(String),
    Detailed {
        #[serde(alias = "platform_name")]
        name: String,
        #[serde(default)]
        count: Option<u64>,
    },
}

impl PlatformEntry {
    pub fn name(&self) -> &str {
        match self {
            PlatformEntry::Name(n) => n,
            PlatformEntry::Detailed { name, .. } => name,
        }
    }

    pub fn count(&self) -> Option<u64> {
        match self {
            PlatformEntry::Name(_) => None,
            PlatformEntry::Detailed { count, .. } => *count,
        }
    }
}

/// A learned sender → platform correction kept by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformCorrection {
    pub id: i64,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub old_name: Option<String>,
    #[serde(default)]
    pub new_name: Option<String>,
}

/// Mailboxes already tagged with one platform.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformMailboxes {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub emails: Vec<String>,
}

/// One mailbox not yet tagged with a platform, picked by the backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnregisteredPick {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub remaining: u64,
}

/// Result of re-running the platform rules over stored mail.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanSummary {
    #[serde(default)]
    pub scanned: u64,
    #[serde(default)]
    pub tagged: u64,
}

/// Push-subscription health as reported by `GET /api/config/graph_api`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphApiStatus {
    #[serde(default)]
    pub use_graph_api: bool,
    #[serde(default)]
    pub outlook_email_count: u64,
    #[serde(default)]
    pub subscription_count: u64,
    #[serde(default)]
    pub expected_subscription_count: u64,
    #[serde(default)]
    pub expired_count: u64,
}

impl GraphApiStatus {
    pub fn missing_subscriptions(&self) -> u64 {
        self.expected_subscription_count
            .saturating_sub(self.subscription_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_patterns_are_dropped() {
        let d = RuleDraft {
            platform_name: "  MoreLogin ".into(),
            sender_pattern: Some("  ".into()),
            subject_pattern: Some(" verify ".into()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(d.platform_name, "MoreLogin");
        assert_eq!(d.sender_pattern, None);
        assert_eq!(d.subject_pattern.as_deref(), Some("verify"));
        d.validate().unwrap();

        let body = serde_json::to_value(&d).unwrap();
        assert!(body.get("sender_pattern").is_none());
    }

    #[test]
    fn rule_needs_a_pattern_and_a_short_name() {
        let d = RuleDraft {
            platform_name: "X".into(),
            ..Default::default()
        };
        assert!(d.validate().is_err());

        assert!(validate_platform_name(&"a".repeat(51)).is_err());
        assert!(validate_platform_name(&"a".repeat(50)).is_ok());
        assert!(validate_platform_name("   ").is_err());
    }

    #[test]
    fn enabled_only_update_sends_just_the_flag() {
        let u = RuleUpdate {
            is_enabled: Some(false),
            ..Default::default()
        }
        .normalized();
        u.validate().unwrap();
        assert_eq!(
            serde_json::to_value(&u).unwrap(),
            serde_json::json!({ "is_enabled": false })
        );
    }

    #[test]
    fn update_keeps_blank_pattern_to_clear_it() {
        let u = RuleUpdate {
            sender_pattern: Some("   ".into()),
            ..Default::default()
        }
        .normalized();
        u.validate().unwrap();
        assert_eq!(
            serde_json::to_value(&u).unwrap(),
            serde_json::json!({ "sender_pattern": "" })
        );
    }

    #[test]
    fn empty_update_and_long_name_are_rejected() {
        assert!(RuleUpdate::default().validate().is_err());
        let u = RuleUpdate {
            platform_name: Some("a".repeat(51)),
            ..Default::default()
        };
        assert!(u.validate().is_err());
    }

    #[test]
    fn unregistered_pick_may_be_empty() {
        let p: UnregisteredPick = serde_json::from_str(
            r#"{"platform":"Notion","email":null,"remaining":0,"message":"none left"}"#,
        )
        .unwrap();
        assert!(p.email.is_none());
        assert_eq!(p.remaining, 0);
    }

    #[test]
    fn rule_enabled_flag_accepts_integers() {
        let r: PlatformRule =
            serde_json::from_str(r#"{"id":4,"platform_name":"Notion","is_enabled":0}"#).unwrap();
        assert!(!r.is_enabled);
        let r: PlatformRule = serde_json::from_str(r#"{"id":5,"platform_name":"Notion"}"#).unwrap();
        assert!(r.is_enabled);
    }

    #[test]
    fn platform_list_accepts_names_and_objects() {
        let v: Vec<PlatformEntry> =
            serde_json::from_str(r#"["Notion",{"platform_name":"Figma","count":3}]"#).unwrap();
        assert_eq!(v[0].name(), "Notion");
        assert_eq!(v[1].name(), "Figma");
        assert_eq!(v[1].count(), Some(3));
    }

    #[test]
    fn graph_status_counts_missing_subscriptions() {
        let s = GraphApiStatus {
            expected_subscription_count: 10,
            subscription_count: 7,
            ..Default::default()
        };
        assert_eq!(s.missing_subscriptions(), 3);
    }
}
