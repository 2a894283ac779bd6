//! Client Runtime - the consent state machine
//!
//! The generated script and `ConsentRuntime` implement the same machine.
//! Everything a browser would provide (cookies, local storage, HTTP, the
//! visitor's locale) comes in through traits so every decision the script
//! makes can be exercised without a browser.
//!
//! One runtime per page load, built with `ConsentRuntime::new`. The
//! consent-signaling API is owned by the runtime; `__tcfapi` on the page is
//! only a shim over `CmpApi::call`.

pub mod gdpr;
pub mod machine;
pub mod report;
pub mod responsive;
pub mod storage;
pub mod tcf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::consent::{Category, ConsentModeSignals, ConsentState, Purpose, SpecialFeature, PURPOSES, SPECIAL_FEATURES};
use crate::pipeline::GenerationOptions;
use crate::templates::{Animation, AutoHide, Breakpoints, Reshow, VendorEntry};
use crate::tree::{ActionKind, BannerModel, LayoutType};

pub use gdpr::{gdpr_applies, BrowserEnvironment, GdprDecision, GdprReason, GdprRules};
pub use machine::{display_decision, next_state, BannerState, DisplayDecision, MachineEvent, ShowReason};
pub use report::{
    consent_endpoint, BannerInteraction, ConsentReport, ConsentReporter, ConsentTransport, ReportAck,
    ReportMetadata, TransportError,
};
pub use responsive::{placements, runtime_components, Placement, RuntimeComponent};
pub use storage::{ensure_user_id, load_consent, persist_consent, ConsentStore, InMemoryStore};
pub use tcf::{CmpApi, CmpIdentity, DisplayStatus, EventStatus, TcData, TcfCallback, TcfReturn};

/// Configuration shared by the generated script (serialized into its
/// config slot) and by `ConsentRuntime`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub banner_id: String,
    pub language: String,
    pub animation: Animation,
    pub auto_hide: AutoHide,
    pub reshow: Reshow,
    pub use_overlay: bool,
    pub close_button: bool,
    #[serde(rename = "forceGDPR")]
    pub force_gdpr: bool,
    /// Days.
    pub cookie_expiry: u32,
    pub user_id_expiry: u32,
    pub google_consent_mode: bool,
    pub cmp_id: u32,
    pub cmp_version: u32,
    pub gvl_version: u32,
    pub tcf_policy_version: u32,
    pub breakpoints: Breakpoints,
    pub purposes: &'static [Purpose],
    pub categories: BTreeMap<Category, Vec<u32>>,
    pub special_features: &'static [SpecialFeature],
    pub vendors: Vec<VendorEntry>,
    pub gdpr: GdprRules,
    /// Filled into their own script slots, not the config object.
    #[serde(skip)]
    pub base_url: String,
    #[serde(skip)]
    pub domain_id: String,
}

impl RuntimeConfig {
    pub fn from_model(model: &BannerModel, options: &GenerationOptions, engine: &EngineConfig) -> Self {
        let cookie_expiry = options.cookie_expiry.unwrap_or(engine.default_cookie_expiry);
        if cookie_expiry == 0 {
            tracing::warn!(banner = %model.id, "cookie expiry of 0 days raised to 1");
        }
        Self {
            banner_id: model.id.clone(),
            language: options.language_or(&engine.default_language).to_string(),
            animation: model.animation.clone(),
            auto_hide: model.settings.behaviour.auto_hide.clone(),
            reshow: model.settings.behaviour.reshow.clone(),
            use_overlay: model.layout_type() == LayoutType::Modal && model.settings.overlay,
            close_button: model.settings.close_button,
            force_gdpr: options.force_gdpr,
            cookie_expiry: cookie_expiry.max(1),
            user_id_expiry: storage::USER_ID_EXPIRY_DAYS,
            google_consent_mode: options.include_google_consent_mode,
            cmp_id: engine.cmp_id,
            cmp_version: engine.cmp_version,
            gvl_version: engine.gvl_version,
            tcf_policy_version: tcf::TCF_POLICY_VERSION,
            breakpoints: model.settings.responsive,
            purposes: PURPOSES,
            categories: Category::ALL
                .iter()
                .map(|c| (*c, c.purposes().collect()))
                .collect(),
            special_features: SPECIAL_FEATURES,
            vendors: model.settings.vendors.clone(),
            gdpr: GdprRules::default(),
            base_url: options.base_url.trim_end_matches('/').to_string(),
            domain_id: options.domain_id.clone(),
        }
    }

    fn identity(&self) -> CmpIdentity {
        CmpIdentity {
            cmp_id: self.cmp_id,
            cmp_version: self.cmp_version,
            gvl_version: self.gvl_version,
        }
    }
}

/// What a visitor can do on a visible banner.
#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    AcceptAll,
    RejectAll,
    SavePreferences {
        categories: Vec<Category>,
        refused_vendors: Vec<u32>,
    },
    /// Dismissal counts as a necessary-only decision.
    Close,
    ShowPreferences,
    ClosePreferences,
}

impl UserAction {
    /// The button action as the script sees it. `save_preferences` from a
    /// bare button carries no selection; `none` and `custom` are not
    /// visitor decisions and map to nothing.
    pub fn from_action(kind: ActionKind) -> Option<Self> {
        match kind {
            ActionKind::AcceptAll => Some(UserAction::AcceptAll),
            ActionKind::RejectAll => Some(UserAction::RejectAll),
            ActionKind::SavePreferences => Some(UserAction::SavePreferences {
                categories: vec![],
                refused_vendors: vec![],
            }),
            ActionKind::ShowPreferences => Some(UserAction::ShowPreferences),
            ActionKind::Close => Some(UserAction::Close),
            ActionKind::None | ActionKind::Custom => None,
        }
    }

    pub fn interaction(&self) -> &'static str {
        match self {
            UserAction::AcceptAll => "accept_all",
            UserAction::RejectAll => "reject_all",
            UserAction::SavePreferences { .. } => "save_preferences",
            UserAction::Close => "close",
            UserAction::ShowPreferences => "show_preferences",
            UserAction::ClosePreferences => "close_preferences",
        }
    }

    pub fn is_decision(&self) -> bool {
        !matches!(self, UserAction::ShowPreferences | UserAction::ClosePreferences)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub from: BannerState,
    pub to: BannerState,
    pub event: MachineEvent,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("event {event:?} is not valid in state {state}")]
    InvalidTransition {
        state: BannerState,
        event: MachineEvent,
    },
}

pub struct ConsentRuntime<S: ConsentStore, T: ConsentTransport> {
    config: RuntimeConfig,
    store: S,
    transport: T,
    environment: BrowserEnvironment,
    gdpr: GdprDecision,
    cmp: CmpApi,
    state: BannerState,
    consent: Option<ConsentState>,
    user_id: Option<String>,
    shown_at: Option<DateTime<Utc>>,
    panel_open: bool,
    customization_opened: bool,
    history: Vec<Transition>,
    last_report: Option<Result<ReportAck, TransportError>>,
}

impl<S: ConsentStore, T: ConsentTransport> ConsentRuntime<S, T> {
    pub fn new(config: RuntimeConfig, store: S, transport: T, environment: BrowserEnvironment) -> Self {
        let gdpr = gdpr_applies(config.force_gdpr, &environment);
        let cmp = CmpApi::new(
            config.identity(),
            gdpr.applies,
            config.purposes.iter().map(|p| p.id).collect(),
            config.vendors.iter().map(|v| v.id).collect(),
        );
        Self {
            config,
            store,
            transport,
            environment,
            gdpr,
            cmp,
            state: BannerState::Init,
            consent: None,
            user_id: None,
            shown_at: None,
            panel_open: false,
            customization_opened: false,
            history: Vec::new(),
            last_report: None,
        }
    }

    fn advance(&mut self, event: MachineEvent, now: DateTime<Utc>) -> Result<BannerState, RuntimeError> {
        let to = next_state(self.state, event).ok_or(RuntimeError::InvalidTransition {
            state: self.state,
            event,
        })?;
        tracing::debug!(banner = %self.config.banner_id, from = %self.state, to = %to, ?event, "transition");
        self.history.push(Transition {
            from: self.state,
            to,
            event,
            at: now,
        });
        self.state = to;
        self.cmp.set_display(match to {
            BannerState::BannerVisible => DisplayStatus::Visible,
            BannerState::Hidden => DisplayStatus::Hidden,
            _ => DisplayStatus::Disabled,
        });
        Ok(to)
    }

    fn show(&mut self, event: MachineEvent, now: DateTime<Utc>) -> Result<BannerState, RuntimeError> {
        let state = self.advance(event, now)?;
        self.shown_at = Some(now);
        self.customization_opened = false;
        self.panel_open = false;
        Ok(state)
    }

    /// Read stored consent and decide visibility in one step.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<BannerState, RuntimeError> {
        self.advance(MachineEvent::PageLoad, now)?;
        self.consent = load_consent(&self.store, &self.config.banner_id);
        self.user_id = Some(ensure_user_id(&mut self.store, &self.config.banner_id, now));
        self.cmp.update(self.consent.clone(), EventStatus::Tcloaded);

        match display_decision(self.consent.as_ref(), &self.config.reshow, now) {
            DisplayDecision::Show(_) => self.show(MachineEvent::NoValidConsent, now),
            DisplayDecision::Hide => self.advance(MachineEvent::ConsentFound, now),
        }
    }

    pub fn dispatch(&mut self, action: UserAction, now: DateTime<Utc>) -> Result<BannerState, RuntimeError> {
        if self.state != BannerState::BannerVisible {
            return Err(RuntimeError::InvalidTransition {
                state: self.state,
                event: MachineEvent::Decision,
            });
        }
        match action {
            UserAction::ShowPreferences => {
                self.panel_open = true;
                self.customization_opened = true;
                Ok(self.state)
            }
            UserAction::ClosePreferences => {
                self.panel_open = false;
                Ok(self.state)
            }
            decision => self.apply(decision, now),
        }
    }

    fn apply(&mut self, action: UserAction, now: DateTime<Utc>) -> Result<BannerState, RuntimeError> {
        self.advance(MachineEvent::Decision, now)?;
        let vendors = &self.config.vendors;
        let next = match &action {
            UserAction::AcceptAll => ConsentState::accept_all(vendors, now),
            UserAction::SavePreferences {
                categories,
                refused_vendors,
            } => ConsentState::from_categories(categories, vendors, now).without_vendors(refused_vendors),
            _ => ConsentState::reject_all(vendors, now),
        };
        let next = match &self.consent {
            Some(previous) => previous.superseded_by(next),
            None => next,
        };
        self.consent = Some(next.clone());
        self.cmp.update(Some(next.clone()), EventStatus::Useractioncomplete);
        self.advance(MachineEvent::Applied, now)?;

        if let Err(e) = persist_consent(&mut self.store, &self.config.banner_id, &next, self.config.cookie_expiry, now) {
            tracing::warn!(error = %e, "failed to persist consent");
        }
        self.advance(MachineEvent::Persisted, now)?;

        self.report(&action, &next, now);
        self.panel_open = false;
        self.advance(MachineEvent::Reported, now)
    }

    fn report(&mut self, action: &UserAction, state: &ConsentState, now: DateTime<Utc>) {
        if self.config.base_url.is_empty() || self.config.domain_id.is_empty() {
            tracing::debug!("no consent endpoint configured, skipping report");
            return;
        }
        let interaction = BannerInteraction {
            kind: action.interaction().to_string(),
            time_to_decision: self
                .shown_at
                .map(|shown| (now - shown).num_milliseconds())
                .unwrap_or(0),
            customization_opened: self.customization_opened,
        };
        let metadata = ReportMetadata {
            user_agent: self.environment.user_agent.clone(),
            language: self
                .environment
                .languages
                .first()
                .cloned()
                .unwrap_or_else(|| self.config.language.clone()),
            device_type: self.config.breakpoints.device_for_width(self.environment.viewport_width).as_str().to_string(),
        };
        let user_id = self.user_id.clone().unwrap_or_default();
        let report = ConsentReport::new(&user_id, state, &self.config.vendors, interaction, metadata);

        let result = ConsentReporter::new(&mut self.transport, &self.config.base_url, &self.config.domain_id).send(&report);
        match &result {
            Ok(ack) => {
                if let Some(tc_string) = ack.data.as_ref().and_then(|d| d.tc_string.clone()) {
                    self.attach_tc_string(tc_string, now);
                }
            }
            Err(e) => tracing::warn!(error = %e, "consent report failed"),
        }
        self.last_report = Some(result);
    }

    fn attach_tc_string(&mut self, tc_string: String, now: DateTime<Utc>) {
        let Some(consent) = self.consent.as_mut() else {
            return;
        };
        consent.tc_string = Some(tc_string);
        let snapshot = consent.clone();
        if let Err(e) = persist_consent(&mut self.store, &self.config.banner_id, &snapshot, self.config.cookie_expiry, now) {
            tracing::warn!(error = %e, "failed to persist consent string");
        }
        self.cmp.update(Some(snapshot), EventStatus::Useractioncomplete);
    }

    /// Timer work: auto-hide an untouched banner, reshow an expired one.
    pub fn tick(&mut self, now: DateTime<Utc>) -> BannerState {
        match self.state {
            BannerState::BannerVisible => {
                let auto_hide = &self.config.auto_hide;
                let due = self.shown_at.is_some_and(|shown| {
                    (now - shown).num_milliseconds() >= i64::try_from(auto_hide.delay).unwrap_or(i64::MAX)
                });
                if auto_hide.enabled && !self.customization_opened && due {
                    let _ = self.advance(MachineEvent::AutoHide, now);
                }
            }
            BannerState::Hidden => {
                if display_decision(self.consent.as_ref(), &self.config.reshow, now).is_show() {
                    let _ = self.show(MachineEvent::ReshowDue, now);
                }
            }
            _ => {}
        }
        self.state
    }

    /// Forget the decision and show the banner again.
    pub fn reset(&mut self, now: DateTime<Utc>) -> Result<BannerState, RuntimeError> {
        storage::clear_consent(&mut self.store, &self.config.banner_id);
        self.consent = None;
        self.cmp.update(None, EventStatus::Cmpuishown);
        self.show(MachineEvent::Reset, now)
    }

    pub fn cmp(&self) -> &CmpApi {
        &self.cmp
    }

    pub fn consent(&self) -> Option<&ConsentState> {
        self.consent.as_ref()
    }

    pub fn state(&self) -> BannerState {
        self.state
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn gdpr(&self) -> GdprDecision {
        self.gdpr
    }

    /// The `gtag('consent', ...)` signals the script would have sent, when
    /// consent mode is enabled. Denied until a decision exists.
    pub fn consent_mode(&self) -> Option<ConsentModeSignals> {
        self.config.google_consent_mode.then(|| match &self.consent {
            Some(state) => ConsentModeSignals::from_state(state),
            None => ConsentModeSignals::denied(),
        })
    }

    pub fn panel_open(&self) -> bool {
        self.panel_open
    }

    pub fn last_report(&self) -> Option<&Result<ReportAck, TransportError>> {
        self.last_report.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::report::tests::ScriptedTransport;
    use super::report::ReportAckData;
    use super::*;
    use crate::consent::cookie_name;
    use crate::templates::BannerTemplate;
    use chrono::{Duration, TimeZone};
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap()
    }

    fn config(reshow: Option<f64>, auto_hide: Option<u64>) -> RuntimeConfig {
        let template = BannerTemplate::from_json(
            &json!({
                "id": "acme",
                "layout": {
                    "desktop": { "type": "modal", "position": "center" },
                    "tablet": { "type": "modal", "position": "center" },
                    "mobile": { "type": "banner", "position": "bottom" }
                },
                "components": [
                    { "id": "yes", "type": "button", "content": "Yes", "action": { "type": "accept_all" } },
                    { "id": "no", "type": "button", "content": "No", "action": { "type": "reject_all" } }
                ],
                "settings": {
                    "behaviour": {
                        "reshow": { "enabled": reshow.is_some(), "interval": reshow.unwrap_or(180.0) },
                        "autoHide": { "enabled": auto_hide.is_some(), "delay": auto_hide.unwrap_or(0) }
                    },
                    "vendors": [ { "id": 42, "name": "Stats", "purposes": [1, 8] } ]
                }
            })
            .to_string(),
        )
        .unwrap();
        let model = BannerModel::from_template(&template).unwrap();
        let options = GenerationOptions {
            base_url: "https://consent.example/".into(),
            domain_id: "dom-1".into(),
            ..GenerationOptions::default()
        };
        RuntimeConfig::from_model(&model, &options, &EngineConfig::default())
    }

    fn runtime(config: RuntimeConfig) -> ConsentRuntime<InMemoryStore, ScriptedTransport> {
        ConsentRuntime::new(config, InMemoryStore::new(), ScriptedTransport::default(), BrowserEnvironment::default())
    }

    #[test]
    fn test_config_serializes_for_script() {
        let value = serde_json::to_value(config(None, None)).unwrap();
        assert_eq!(value["useOverlay"], true);
        assert_eq!(value["forceGDPR"], false);
        assert_eq!(value["cookieExpiry"], 365);
        assert_eq!(value["cmpId"], 300);
        assert_eq!(value["categories"]["analytics"], json!([7, 8, 9, 10]));
        assert_eq!(value["purposes"][0]["key"], "necessary");
        assert!(value.get("baseUrl").is_none());
    }

    #[test]
    fn test_zero_cookie_expiry_raised_to_one_day() {
        let template = BannerTemplate::from_json(
            &json!({
                "id": "acme",
                "layout": {
                    "desktop": { "type": "banner", "position": "bottom" },
                    "tablet": { "type": "banner", "position": "bottom" },
                    "mobile": { "type": "banner", "position": "bottom" }
                },
                "components": [
                    { "id": "yes", "type": "button", "content": "Yes", "action": { "type": "accept_all" } },
                    { "id": "no", "type": "button", "content": "No", "action": { "type": "reject_all" } }
                ]
            })
            .to_string(),
        )
        .unwrap();
        let model = BannerModel::from_template(&template).unwrap();
        let options = GenerationOptions { cookie_expiry: Some(0), ..GenerationOptions::default() };
        assert_eq!(RuntimeConfig::from_model(&model, &options, &EngineConfig::default()).cookie_expiry, 1);

        let engine = EngineConfig { default_cookie_expiry: 0, ..EngineConfig::default() };
        let config = RuntimeConfig::from_model(&model, &GenerationOptions::default(), &engine);
        assert_eq!(config.cookie_expiry, 1);

        let options = GenerationOptions { cookie_expiry: Some(30), ..GenerationOptions::default() };
        assert_eq!(RuntimeConfig::from_model(&model, &options, &EngineConfig::default()).cookie_expiry, 30);
    }

    #[test]
    fn test_first_visit_shows_then_accept_hides() {
        let mut rt = runtime(config(None, None));
        assert_eq!(rt.start(now()), Ok(BannerState::BannerVisible));
        assert!(rt.consent().is_none());

        let state = rt.dispatch(UserAction::AcceptAll, now() + Duration::seconds(3)).unwrap();
        assert_eq!(state, BannerState::Hidden);
        let path: Vec<_> = rt.history().iter().map(|t| t.to).collect();
        assert_eq!(
            path,
            vec![
                BannerState::EvaluateConsent,
                BannerState::BannerVisible,
                BannerState::ApplyConsent,
                BannerState::PersistCookie,
                BannerState::ReportToServer,
                BannerState::Hidden,
            ]
        );
        assert!(rt.consent().unwrap().purpose_allowed(4));
        assert!(rt.store().read_cookie(&cookie_name("acme")).is_some());

        let (url, body) = &rt.transport().sent[0];
        assert_eq!(url, "https://consent.example/api/v1/consent/domain/dom-1");
        assert_eq!(body.banner_interaction.time_to_decision, 3000);
    }

    #[test]
    fn test_stored_consent_hides_on_next_page() {
        let mut first = runtime(config(None, None));
        first.start(now()).unwrap();
        first.dispatch(UserAction::RejectAll, now()).unwrap();
        let store = first.store().clone();

        let mut second = ConsentRuntime::new(config(None, None), store, ScriptedTransport::default(), BrowserEnvironment::default());
        assert_eq!(second.start(now() + Duration::days(400)), Ok(BannerState::Hidden));
        assert_eq!(second.user_id(), first.user_id());
    }

    #[test]
    fn test_reshow_after_interval() {
        let mut rt = runtime(config(Some(30.0), None));
        rt.start(now()).unwrap();
        rt.dispatch(UserAction::AcceptAll, now()).unwrap();
        assert_eq!(rt.tick(now() + Duration::days(29)), BannerState::Hidden);
        assert_eq!(rt.tick(now() + Duration::days(30)), BannerState::BannerVisible);
    }

    #[test]
    fn test_show_preferences_stays_visible_and_blocks_auto_hide() {
        let mut rt = runtime(config(None, Some(5_000)));
        rt.start(now()).unwrap();
        assert_eq!(rt.dispatch(UserAction::ShowPreferences, now()), Ok(BannerState::BannerVisible));
        assert!(rt.panel_open());
        assert_eq!(rt.tick(now() + Duration::seconds(10)), BannerState::BannerVisible);

        let mut untouched = runtime(config(None, Some(5_000)));
        untouched.start(now()).unwrap();
        assert_eq!(untouched.tick(now() + Duration::seconds(4)), BannerState::BannerVisible);
        assert_eq!(untouched.tick(now() + Duration::seconds(5)), BannerState::Hidden);
        assert!(untouched.consent().is_none());
    }

    #[test]
    fn test_close_is_necessary_only() {
        let mut rt = runtime(config(None, None));
        rt.start(now()).unwrap();
        rt.dispatch(UserAction::Close, now()).unwrap();
        let consent = rt.consent().unwrap();
        assert!(consent.purpose_allowed(1));
        assert!(!consent.purpose_allowed(2));
        assert_eq!(rt.transport().sent[0].1.banner_interaction.kind, "close");
    }

    #[test]
    fn test_save_preferences_with_refused_vendor() {
        let mut rt = runtime(config(None, None));
        rt.start(now()).unwrap();
        rt.dispatch(
            UserAction::SavePreferences {
                categories: vec![Category::Analytics],
                refused_vendors: vec![42],
            },
            now(),
        )
        .unwrap();
        let consent = rt.consent().unwrap();
        assert!(consent.category_allowed(Category::Analytics));
        assert_eq!(consent.vendors.get(&42), Some(&false));
    }

    #[test]
    fn test_decisions_rejected_when_hidden() {
        let mut rt = runtime(config(None, None));
        rt.start(now()).unwrap();
        rt.dispatch(UserAction::AcceptAll, now()).unwrap();
        assert!(matches!(
            rt.dispatch(UserAction::RejectAll, now()),
            Err(RuntimeError::InvalidTransition { state: BannerState::Hidden, .. })
        ));
    }

    #[test]
    fn test_server_tc_string_is_kept() {
        let mut transport = ScriptedTransport::default();
        transport.answers.push(Ok(ReportAck {
            data: Some(ReportAckData {
                tc_string: Some("CP-test".into()),
            }),
        }));
        let mut rt = ConsentRuntime::new(config(None, None), InMemoryStore::new(), transport, BrowserEnvironment::default());
        rt.start(now()).unwrap();
        rt.dispatch(UserAction::AcceptAll, now()).unwrap();
        assert_eq!(rt.consent().unwrap().tc_string.as_deref(), Some("CP-test"));
        assert_eq!(
            load_consent(rt.store(), "acme").and_then(|c| c.tc_string),
            Some("CP-test".to_string())
        );
        assert_eq!(rt.cmp().tc_data(None, None, None).tc_string, "CP-test");
    }

    #[test]
    fn test_report_413_retry_does_not_block_hiding() {
        let mut transport = ScriptedTransport::default();
        transport.answers.push(Err(TransportError::PayloadTooLarge));
        let mut rt = ConsentRuntime::new(config(None, None), InMemoryStore::new(), transport, BrowserEnvironment::default());
        rt.start(now()).unwrap();
        assert_eq!(rt.dispatch(UserAction::AcceptAll, now()), Ok(BannerState::Hidden));
        assert_eq!(rt.transport().sent.len(), 2);
        assert_eq!(rt.transport().sent[1].1.decisions.purposes.len(), 1);
        assert!(matches!(rt.last_report(), Some(Ok(_))));
    }

    #[test]
    fn test_listener_sees_decision_and_reset() {
        let mut rt = runtime(config(None, None));
        rt.start(now()).unwrap();
        let events = Rc::new(RefCell::new(Vec::<Value>::new()));
        let sink = Rc::clone(&events);
        rt.cmp().call(
            "addEventListener",
            2,
            Box::new(move |value: &TcfReturn, _: bool| {
                let v = serde_json::to_value(value).unwrap();
                sink.borrow_mut().push(v["eventStatus"].clone());
            }),
            None,
        );
        rt.dispatch(UserAction::AcceptAll, now()).unwrap();
        rt.reset(now()).unwrap();

        assert_eq!(
            *events.borrow(),
            vec![json!("cmpuishown"), json!("useractioncomplete"), json!("cmpuishown")]
        );
        assert_eq!(rt.state(), BannerState::BannerVisible);
        assert!(load_consent(rt.store(), "acme").is_none());
    }

    #[test]
    fn test_ping_reflects_display() {
        let mut rt = runtime(config(None, None));
        rt.start(now()).unwrap();
        assert_eq!(rt.cmp().ping().display_status, DisplayStatus::Visible);
        assert!(rt.gdpr().applies);
        rt.dispatch(UserAction::RejectAll, now()).unwrap();
        assert_eq!(rt.cmp().ping().display_status, DisplayStatus::Hidden);
    }

    #[test]
    fn test_button_actions_map_to_user_actions() {
        assert_eq!(UserAction::from_action(ActionKind::AcceptAll), Some(UserAction::AcceptAll));
        assert_eq!(UserAction::from_action(ActionKind::Custom), None);
        assert_eq!(UserAction::from_action(ActionKind::None), None);

        let close = UserAction::from_action(ActionKind::Close).unwrap();
        assert!(close.is_decision());
        assert_eq!(close.interaction(), "close");
        assert!(!UserAction::from_action(ActionKind::ShowPreferences).unwrap().is_decision());
        assert!(!UserAction::ClosePreferences.is_decision());
    }

    #[test]
    fn test_consent_mode_signals_follow_decision() {
        let mut cfg = config(None, None);
        assert!(runtime(cfg.clone()).consent_mode().is_none());

        cfg.google_consent_mode = true;
        let mut rt = runtime(cfg);
        rt.start(now()).unwrap();
        assert_eq!(rt.consent_mode(), Some(ConsentModeSignals::denied()));
        rt.dispatch(UserAction::AcceptAll, now()).unwrap();
        let signals = rt.consent_mode().unwrap();
        assert_eq!(signals.analytics_storage, "granted");
        assert_eq!(signals.ad_storage, "granted");
    }
}
