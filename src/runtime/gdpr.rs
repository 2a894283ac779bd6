//! GDPR applicability heuristic.
//!
//! First match wins: forced flag, Global Privacy Control, EU-ish time
//! zone, EU language. With nothing matching the answer is still "applies";
//! the reason is kept so callers can tell a default from a detection.

use serde::Serialize;

/// Time-zone prefixes treated as European.
pub const EU_TIMEZONE_PREFIXES: &[&str] = &[
    "Europe/",
    "Atlantic/Azores",
    "Atlantic/Canary",
    "Atlantic/Madeira",
    "Atlantic/Reykjavik",
    "Arctic/Longyearbyen",
];

/// Primary language subtags of EU/EEA official languages.
pub const EU_LANGUAGES: &[&str] = &[
    "bg", "cs", "da", "de", "el", "es", "et", "fi", "fr", "ga", "hr", "hu", "is", "it", "lt", "lv",
    "mt", "nb", "nl", "nn", "no", "pl", "pt", "ro", "sk", "sl", "sv",
];

/// The lists above as they are embedded into the generated script.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GdprRules {
    pub timezone_prefixes: &'static [&'static str],
    pub languages: &'static [&'static str],
}

impl Default for GdprRules {
    fn default() -> Self {
        Self {
            timezone_prefixes: EU_TIMEZONE_PREFIXES,
            languages: EU_LANGUAGES,
        }
    }
}

/// What the page environment tells us about the visitor.
#[derive(Debug, Clone)]
pub struct BrowserEnvironment {
    pub time_zone: Option<String>,
    pub languages: Vec<String>,
    pub global_privacy_control: bool,
    pub user_agent: String,
    pub viewport_width: u32,
}

impl Default for BrowserEnvironment {
    fn default() -> Self {
        Self {
            time_zone: None,
            languages: vec!["en-US".to_string()],
            global_privacy_control: false,
            user_agent: String::new(),
            viewport_width: 1280,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GdprReason {
    Forced,
    GlobalPrivacyControl,
    Timezone,
    Language,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GdprDecision {
    pub applies: bool,
    pub reason: GdprReason,
}

pub fn gdpr_applies(force: bool, env: &BrowserEnvironment) -> GdprDecision {
    let reason = if force {
        GdprReason::Forced
    } else if env.global_privacy_control {
        GdprReason::GlobalPrivacyControl
    } else if env
        .time_zone
        .as_deref()
        .is_some_and(|tz| EU_TIMEZONE_PREFIXES.iter().any(|p| tz.starts_with(p)))
    {
        GdprReason::Timezone
    } else if env.languages.iter().any(|lang| {
        let primary = lang.split('-').next().unwrap_or("").to_ascii_lowercase();
        EU_LANGUAGES.contains(&primary.as_str())
    }) {
        GdprReason::Language
    } else {
        GdprReason::Default
    };
    GdprDecision { applies: true, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(tz: Option<&str>, langs: &[&str]) -> BrowserEnvironment {
        BrowserEnvironment {
            time_zone: tz.map(String::from),
            languages: langs.iter().map(|l| l.to_string()).collect(),
            ..BrowserEnvironment::default()
        }
    }

    #[test]
    fn test_detection_order() {
        let berlin = env(Some("Europe/Berlin"), &["de-DE"]);
        assert_eq!(gdpr_applies(true, &berlin).reason, GdprReason::Forced);
        assert_eq!(gdpr_applies(false, &berlin).reason, GdprReason::Timezone);

        let gpc = BrowserEnvironment {
            global_privacy_control: true,
            ..berlin
        };
        assert_eq!(gdpr_applies(false, &gpc).reason, GdprReason::GlobalPrivacyControl);
    }

    #[test]
    fn test_language_fallback() {
        let decision = gdpr_applies(false, &env(Some("America/New_York"), &["en-US", "FR-ca"]));
        assert_eq!(decision.reason, GdprReason::Language);
    }

    #[test]
    fn test_default_still_applies() {
        let decision = gdpr_applies(false, &env(Some("Asia/Tokyo"), &["ja-JP"]));
        assert!(decision.applies);
        assert_eq!(decision.reason, GdprReason::Default);
    }
}
