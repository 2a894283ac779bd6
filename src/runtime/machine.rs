//! The banner state machine: states, events and the transition table.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

use crate::consent::ConsentState;
use crate::templates::Reshow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BannerState {
    Init,
    EvaluateConsent,
    BannerVisible,
    ApplyConsent,
    PersistCookie,
    ReportToServer,
    Hidden,
}

impl BannerState {
    /// Same names the generated script records in its history.
    pub fn as_str(&self) -> &'static str {
        match self {
            BannerState::Init => "Init",
            BannerState::EvaluateConsent => "EvaluateConsent",
            BannerState::BannerVisible => "BannerVisible",
            BannerState::ApplyConsent => "ApplyConsent",
            BannerState::PersistCookie => "PersistCookie",
            BannerState::ReportToServer => "ReportToServer",
            BannerState::Hidden => "Hidden",
        }
    }
}

impl fmt::Display for BannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineEvent {
    PageLoad,
    NoValidConsent,
    ConsentFound,
    Decision,
    Applied,
    Persisted,
    Reported,
    AutoHide,
    ReshowDue,
    Reset,
}

/// The whole transition table. Anything not listed is rejected.
pub fn next_state(from: BannerState, event: MachineEvent) -> Option<BannerState> {
    use BannerState::*;
    use MachineEvent::*;

    match (from, event) {
        (Init, PageLoad) => Some(EvaluateConsent),
        (EvaluateConsent, NoValidConsent) => Some(BannerVisible),
        (EvaluateConsent, ConsentFound) => Some(Hidden),
        (BannerVisible, Decision) => Some(ApplyConsent),
        (ApplyConsent, Applied) => Some(PersistCookie),
        (PersistCookie, Persisted) => Some(ReportToServer),
        (ReportToServer, Reported) => Some(Hidden),
        (BannerVisible, AutoHide) => Some(Hidden),
        (Hidden, ReshowDue) => Some(BannerVisible),
        (Hidden | BannerVisible, Reset) => Some(BannerVisible),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowReason {
    NoConsent,
    ReshowDue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayDecision {
    Show(ShowReason),
    Hide,
}

impl DisplayDecision {
    pub fn is_show(&self) -> bool {
        matches!(self, DisplayDecision::Show(_))
    }
}

/// No stored decision shows the banner. A stored decision hides it unless
/// reshow is on and `interval` days have passed since `lastUpdated`.
pub fn display_decision(
    stored: Option<&ConsentState>,
    reshow: &Reshow,
    now: DateTime<Utc>,
) -> DisplayDecision {
    let Some(state) = stored else {
        return DisplayDecision::Show(ShowReason::NoConsent);
    };
    if !reshow.enabled {
        return DisplayDecision::Hide;
    }
    if state.age(now) >= reshow_interval(reshow.interval) {
        DisplayDecision::Show(ShowReason::ReshowDue)
    } else {
        DisplayDecision::Hide
    }
}

/// Days as a duration. Non-positive or NaN is zero, overflow saturates.
fn reshow_interval(days: f64) -> Duration {
    let ms = days * 86_400_000.0;
    if !(ms > 0.0) {
        return Duration::zero();
    }
    Duration::try_milliseconds(ms as i64).unwrap_or(Duration::MAX)
}
