//! Consent State and the numeric purpose catalogue.
//!
//! State is always numeric (purpose, vendor and special-feature ids). The
//! four categories exist for the preferences panel only.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::templates::VendorEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Necessary,
    Preferences,
    Analytics,
    Marketing,
}

impl Category {
    pub const ALL: &'static [Category] = &[
        Category::Necessary,
        Category::Preferences,
        Category::Analytics,
        Category::Marketing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Necessary => "necessary",
            Category::Preferences => "preferences",
            Category::Analytics => "analytics",
            Category::Marketing => "marketing",
        }
    }

    pub fn purposes(&self) -> impl Iterator<Item = u32> + '_ {
        PURPOSES
            .iter()
            .filter(move |p| p.category == *self)
            .map(|p| p.id)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Purpose {
    pub id: u32,
    /// Short name sent to the consent endpoint.
    pub key: &'static str,
    pub name: &'static str,
    pub category: Category,
}

/// Purpose id 1 is the one a visitor can never refuse.
pub const NECESSARY_PURPOSE: u32 = 1;

pub const PURPOSES: &[Purpose] = &[
    Purpose { id: 1, key: "necessary", name: "Store and/or access information on a device", category: Category::Necessary },
    Purpose { id: 2, key: "basic_ads", name: "Use limited data to select advertising", category: Category::Marketing },
    Purpose { id: 3, key: "ads_profile", name: "Create profiles for personalised advertising", category: Category::Marketing },
    Purpose { id: 4, key: "personalised_ads", name: "Use profiles to select personalised advertising", category: Category::Marketing },
    Purpose { id: 5, key: "content_profile", name: "Create profiles to personalise content", category: Category::Preferences },
    Purpose { id: 6, key: "personalised_content", name: "Use profiles to select personalised content", category: Category::Preferences },
    Purpose { id: 7, key: "ad_measurement", name: "Measure advertising performance", category: Category::Analytics },
    Purpose { id: 8, key: "content_measurement", name: "Measure content performance", category: Category::Analytics },
    Purpose { id: 9, key: "audience_insights", name: "Understand audiences through statistics or combinations of data from different sources", category: Category::Analytics },
    Purpose { id: 10, key: "product_development", name: "Develop and improve services", category: Category::Analytics },
    Purpose { id: 11, key: "limited_content", name: "Use limited data to select content", category: Category::Preferences },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpecialFeature {
    pub id: u32,
    pub key: &'static str,
    pub name: &'static str,
}

pub const SPECIAL_FEATURES: &[SpecialFeature] = &[
    SpecialFeature { id: 1, key: "precise_geolocation", name: "Use precise geolocation data" },
    SpecialFeature { id: 2, key: "device_scan", name: "Actively scan device characteristics for identification" },
];

pub fn purpose(id: u32) -> Option<&'static Purpose> {
    PURPOSES.iter().find(|p| p.id == id)
}

/// A visitor's recorded decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentState {
    pub purposes: BTreeMap<u32, bool>,
    #[serde(default)]
    pub vendors: BTreeMap<u32, bool>,
    #[serde(default)]
    pub special_features: BTreeMap<u32, bool>,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tc_string: Option<String>,
}

impl ConsentState {
    /// Everything granted.
    pub fn accept_all(vendors: &[VendorEntry], now: DateTime<Utc>) -> Self {
        Self::from_predicate(vendors, now, |_| true)
    }

    /// Only the necessary purpose.
    pub fn reject_all(vendors: &[VendorEntry], now: DateTime<Utc>) -> Self {
        Self::from_predicate(vendors, now, |_| false)
    }

    /// Grant exactly the purposes of the chosen categories. A vendor is
    /// granted when every purpose it declares is granted.
    pub fn from_categories(categories: &[Category], vendors: &[VendorEntry], now: DateTime<Utc>) -> Self {
        Self::from_predicate(vendors, now, |purpose| categories.contains(&purpose.category))
    }

    /// Vendors the visitor unticked in the panel lose consent even when
    /// their purposes are granted.
    pub fn without_vendors(mut self, refused: &[u32]) -> Self {
        for id in refused {
            if let Some(allowed) = self.vendors.get_mut(id) {
                *allowed = false;
            }
        }
        self
    }

    fn from_predicate(vendors: &[VendorEntry], now: DateTime<Utc>, granted: impl Fn(&Purpose) -> bool) -> Self {
        let purposes: BTreeMap<u32, bool> = PURPOSES
            .iter()
            .map(|p| (p.id, p.id == NECESSARY_PURPOSE || granted(p)))
            .collect();
        let all_granted = purposes.values().all(|v| *v);
        let vendors = vendors
            .iter()
            .map(|v| {
                let ok = v.purposes.iter().all(|id| purposes.get(id).copied().unwrap_or(false));
                (v.id, ok)
            })
            .collect();
        let special_features = SPECIAL_FEATURES.iter().map(|f| (f.id, all_granted)).collect();
        Self {
            purposes,
            vendors,
            special_features,
            created: now,
            last_updated: now,
            tc_string: None,
        }
    }

    /// Replace the decision, keeping the original creation time.
    pub fn superseded_by(&self, mut next: ConsentState) -> ConsentState {
        next.created = self.created;
        next
    }

    pub fn purpose_allowed(&self, id: u32) -> bool {
        self.purposes.get(&id).copied().unwrap_or(false)
    }

    pub fn category_allowed(&self, category: Category) -> bool {
        category.purposes().all(|id| self.purpose_allowed(id))
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_updated
    }
}

pub fn cookie_name(banner_id: &str) -> String {
    format!("{}-consent", banner_id)
}

pub fn user_id_key(banner_id: &str) -> String {
    format!("{}-uid", banner_id)
}

/// `Set-Cookie`-style string the runtime writes to `document.cookie`.
pub fn encode_consent_cookie(
    banner_id: &str,
    state: &ConsentState,
    expiry_days: u32,
    now: DateTime<Utc>,
) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(state)?;
    Ok(format_cookie(&cookie_name(banner_id), &json, expiry_days, now))
}

pub fn format_cookie(name: &str, value: &str, expiry_days: u32, now: DateTime<Utc>) -> String {
    let expires = now + Duration::days(i64::from(expiry_days));
    format!(
        "{}={}; expires={}; path=/; SameSite=Lax",
        name,
        urlencoding::encode(value),
        expires.format("%a, %d %b %Y %H:%M:%S GMT"),
    )
}

/// Parse the raw cookie value (URL-encoded JSON). Anything malformed is
/// treated as "no decision".
pub fn decode_consent_cookie(raw: &str) -> Option<ConsentState> {
    let decoded = urlencoding::decode(raw).ok()?;
    let state: ConsentState = serde_json::from_str(&decoded).ok()?;
    Some(state)
}

/// Find one cookie in a `document.cookie`-style header.
pub fn read_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}

/// Google Consent Mode signals for a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsentModeSignals {
    pub ad_storage: &'static str,
    pub ad_user_data: &'static str,
    pub ad_personalization: &'static str,
    pub analytics_storage: &'static str,
    pub functionality_storage: &'static str,
    pub personalization_storage: &'static str,
    pub security_storage: &'static str,
}

impl ConsentModeSignals {
    pub fn denied() -> Self {
        Self {
            ad_storage: "denied",
            ad_user_data: "denied",
            ad_personalization: "denied",
            analytics_storage: "denied",
            functionality_storage: "denied",
            personalization_storage: "denied",
            security_storage: "granted",
        }
    }

    pub fn from_state(state: &ConsentState) -> Self {
        let flag = |ok: bool| if ok { "granted" } else { "denied" };
        let p = |id| state.purpose_allowed(id);
        Self {
            ad_storage: flag(p(1) && p(2)),
            ad_user_data: flag(p(1) && p(7)),
            ad_personalization: flag(p(3) && p(4)),
            analytics_storage: flag(p(1) && p(9)),
            functionality_storage: flag(p(1)),
            personalization_storage: flag(p(5) && p(6)),
            security_storage: "granted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_reject_keeps_necessary() {
        let state = ConsentState::reject_all(&[], now());
        assert!(state.purpose_allowed(NECESSARY_PURPOSE));
        assert_eq!(state.purposes.values().filter(|v| **v).count(), 1);
        assert!(state.special_features.values().all(|v| !v));
    }

    #[test]
    fn test_categories_map_to_purposes() {
        let state = ConsentState::from_categories(&[Category::Analytics], &[], now());
        for id in [7, 8, 9, 10] {
            assert!(state.purpose_allowed(id));
        }
        assert!(!state.purpose_allowed(2));
        assert!(state.category_allowed(Category::Analytics));
        assert!(!state.category_allowed(Category::Marketing));
    }

    #[test]
    fn test_vendor_follows_its_purposes() {
        let vendors = vec![
            VendorEntry { id: 10, name: "Stats".into(), purposes: vec![1, 8] },
            VendorEntry { id: 20, name: "Ads".into(), purposes: vec![1, 2, 4] },
        ];
        let state = ConsentState::from_categories(&[Category::Analytics], &vendors, now());
        assert_eq!(state.vendors.get(&10), Some(&true));
        assert_eq!(state.vendors.get(&20), Some(&false));
    }

    #[test]
    fn test_cookie_contract() {
        let state = ConsentState::accept_all(&[], now());
        let cookie = encode_consent_cookie("acme", &state, 30, now()).unwrap();
        assert!(cookie.starts_with("acme-consent=%7B"));
        assert!(cookie.contains("; expires=Tue, 31 Mar 2026 12:00:00 GMT"));
        assert!(cookie.ends_with("; path=/; SameSite=Lax"));

        let raw = read_cookie(cookie.split(';').next().unwrap(), "acme-consent").unwrap();
        assert_eq!(decode_consent_cookie(raw), Some(state));
    }

    #[test]
    fn test_malformed_cookie_is_no_decision() {
        assert_eq!(decode_consent_cookie("%7Bnot-json"), None);
        assert_eq!(read_cookie("a=1; b=2", "c"), None);
        assert_eq!(read_cookie("a=1; b=2", "b"), Some("2"));
    }

    #[test]
    fn test_consent_mode_mapping() {
        let rejected = ConsentModeSignals::from_state(&ConsentState::reject_all(&[], now()));
        assert_eq!(rejected.ad_storage, "denied");
        assert_eq!(rejected.functionality_storage, "granted");
        let accepted = ConsentModeSignals::from_state(&ConsentState::accept_all(&[], now()));
        assert_eq!(accepted.analytics_storage, "granted");
        assert_eq!(ConsentModeSignals::denied().security_storage, "granted");
    }

    #[test]
    fn test_superseded_keeps_created() {
        let first = ConsentState::reject_all(&[], now());
        let later = now() + Duration::days(3);
        let next = first.superseded_by(ConsentState::accept_all(&[], later));
        assert_eq!(next.created, now());
        assert_eq!(next.last_updated, later);
    }
}
