//! Consent-signaling API (`__tcfapi`) and its cross-frame message form.
//!
//! One `CmpApi` per runtime. Clones share the same listener registry, so
//! the page-level shim and the message handler see the same listeners.

use serde::Serialize;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::consent::{ConsentState, NECESSARY_PURPOSE};

pub const API_VERSION: &str = "2.2";
pub const TCF_POLICY_VERSION: u32 = 4;
pub const PUBLISHER_COUNTRY: &str = "AA";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmpIdentity {
    pub cmp_id: u32,
    pub cmp_version: u32,
    pub gvl_version: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Visible,
    Hidden,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Tcloaded,
    Cmpuishown,
    Useractioncomplete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingReturn {
    pub gdpr_applies: bool,
    pub cmp_loaded: bool,
    pub cmp_status: &'static str,
    pub display_status: DisplayStatus,
    pub api_version: &'static str,
    pub cmp_version: u32,
    pub cmp_id: u32,
    pub gvl_version: u32,
    pub tcf_policy_version: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentFlags {
    pub consents: BTreeMap<u32, bool>,
    pub legitimate_interests: BTreeMap<u32, bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TcData {
    pub tc_string: String,
    pub tcf_policy_version: u32,
    pub cmp_id: u32,
    pub cmp_version: u32,
    pub gdpr_applies: bool,
    pub event_status: EventStatus,
    pub cmp_status: &'static str,
    pub is_service_specific: bool,
    pub use_non_standard_texts: bool,
    pub purpose_one_treatment: bool,
    #[serde(rename = "publisherCC")]
    pub publisher_cc: &'static str,
    pub purpose: ConsentFlags,
    pub vendor: ConsentFlags,
    pub special_feature_optins: BTreeMap<u32, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listener_id: Option<u32>,
}

/// The `returnValue` half of a callback invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TcfReturn {
    Ping(PingReturn),
    TcData(Box<TcData>),
    Removed(bool),
    Null,
}

impl TcfReturn {
    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub type TcfCallback = Box<dyn FnMut(&TcfReturn, bool)>;

struct Listener {
    id: u32,
    callback: TcfCallback,
}

struct Registry {
    identity: CmpIdentity,
    gdpr_applies: bool,
    consent: Option<ConsentState>,
    vendor_ids: Vec<u32>,
    purpose_ids: Vec<u32>,
    display: DisplayStatus,
    listeners: Vec<Listener>,
    next_listener_id: u32,
    /// Listeners taken out of `listeners` while `notify` runs them.
    in_flight: Vec<u32>,
    removed_in_flight: Vec<u32>,
}

#[derive(Clone)]
pub struct CmpApi {
    inner: Rc<RefCell<Registry>>,
}

impl CmpApi {
    pub fn new(identity: CmpIdentity, gdpr_applies: bool, purpose_ids: Vec<u32>, vendor_ids: Vec<u32>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Registry {
                identity,
                gdpr_applies,
                consent: None,
                vendor_ids,
                purpose_ids,
                display: DisplayStatus::Disabled,
                listeners: Vec::new(),
                next_listener_id: 1,
                in_flight: Vec::new(),
                removed_in_flight: Vec::new(),
            })),
        }
    }

    pub fn ping(&self) -> PingReturn {
        let inner = self.inner.borrow();
        PingReturn {
            gdpr_applies: inner.gdpr_applies,
            cmp_loaded: true,
            cmp_status: "loaded",
            display_status: inner.display,
            api_version: API_VERSION,
            cmp_version: inner.identity.cmp_version,
            cmp_id: inner.identity.cmp_id,
            gvl_version: inner.identity.gvl_version,
            tcf_policy_version: TCF_POLICY_VERSION,
        }
    }

    pub fn tc_data(&self, vendor_filter: Option<&[u32]>, listener_id: Option<u32>, status: Option<EventStatus>) -> TcData {
        let inner = self.inner.borrow();
        let consent = inner.consent.as_ref();
        let granted = |map: Option<&BTreeMap<u32, bool>>, id: u32| {
            map.and_then(|m| m.get(&id)).copied().unwrap_or(false)
        };

        let purpose = ConsentFlags {
            consents: inner
                .purpose_ids
                .iter()
                .map(|id| (*id, granted(consent.map(|c| &c.purposes), *id)))
                .collect(),
            legitimate_interests: inner
                .purpose_ids
                .iter()
                .map(|id| (*id, *id == NECESSARY_PURPOSE))
                .collect(),
        };
        let vendor_ids = match vendor_filter {
            Some(ids) if !ids.is_empty() => ids,
            _ => inner.vendor_ids.as_slice(),
        };
        let vendor = ConsentFlags {
            consents: vendor_ids
                .iter()
                .map(|id| (*id, granted(consent.map(|c| &c.vendors), *id)))
                .collect(),
            legitimate_interests: vendor_ids.iter().map(|id| (*id, false)).collect(),
        };

        TcData {
            tc_string: consent.and_then(|c| c.tc_string.clone()).unwrap_or_default(),
            tcf_policy_version: TCF_POLICY_VERSION,
            cmp_id: inner.identity.cmp_id,
            cmp_version: inner.identity.cmp_version,
            gdpr_applies: inner.gdpr_applies,
            event_status: status.unwrap_or(if consent.is_some() {
                EventStatus::Tcloaded
            } else {
                EventStatus::Cmpuishown
            }),
            cmp_status: "loaded",
            is_service_specific: true,
            use_non_standard_texts: false,
            purpose_one_treatment: false,
            publisher_cc: PUBLISHER_COUNTRY,
            purpose,
            vendor,
            special_feature_optins: consent.map(|c| c.special_features.clone()).unwrap_or_default(),
            listener_id,
        }
    }

    /// `__tcfapi(command, version, callback, parameter)`. Every command
    /// answers synchronously; unknown commands answer `(null, false)`.
    pub fn call(&self, command: &str, _version: u32, mut callback: TcfCallback, parameter: Option<&Value>) {
        match command {
            "ping" => callback(&TcfReturn::Ping(self.ping()), true),
            "getTCData" => {
                let filter: Option<Vec<u32>> = parameter.and_then(|p| serde_json::from_value(p.clone()).ok());
                let data = self.tc_data(filter.as_deref(), None, None);
                callback(&TcfReturn::TcData(Box::new(data)), true);
            }
            "addEventListener" => {
                let id = {
                    let mut inner = self.inner.borrow_mut();
                    let id = inner.next_listener_id;
                    inner.next_listener_id += 1;
                    id
                };
                let data = self.tc_data(None, Some(id), None);
                callback(&TcfReturn::TcData(Box::new(data)), true);
                self.inner.borrow_mut().listeners.push(Listener { id, callback });
            }
            "removeEventListener" => {
                let target = parameter
                    .and_then(Value::as_u64)
                    .and_then(|id| u32::try_from(id).ok());
                let removed = target.map_or(false, |target| self.remove_listener(target));
                callback(&TcfReturn::Removed(removed), removed);
            }
            other => {
                tracing::debug!(command = other, "unsupported consent API command");
                callback(&TcfReturn::Null, false);
            }
        }
    }

    fn remove_listener(&self, id: u32) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.listeners.len();
        inner.listeners.retain(|l| l.id != id);
        if inner.listeners.len() != before {
            return true;
        }
        if inner.in_flight.contains(&id) && !inner.removed_in_flight.contains(&id) {
            inner.removed_in_flight.push(id);
            return true;
        }
        false
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    pub fn set_display(&self, display: DisplayStatus) {
        self.inner.borrow_mut().display = display;
    }

    /// Publish a new decision (or none) and tell every listener.
    pub fn update(&self, consent: Option<ConsentState>, status: EventStatus) {
        self.inner.borrow_mut().consent = consent;
        self.notify(status);
    }

    fn notify(&self, status: EventStatus) {
        // Listeners may call back into the API, so none of them run while
        // the registry is borrowed.
        let mut listeners = {
            let mut inner = self.inner.borrow_mut();
            let taken = std::mem::take(&mut inner.listeners);
            inner.in_flight.extend(taken.iter().map(|l| l.id));
            taken
        };
        let ours: Vec<u32> = listeners.iter().map(|l| l.id).collect();
        for listener in listeners.iter_mut() {
            if self.inner.borrow().removed_in_flight.contains(&listener.id) {
                continue;
            }
            let data = self.tc_data(None, Some(listener.id), Some(status));
            (listener.callback)(&TcfReturn::TcData(Box::new(data)), true);
        }

        let mut inner = self.inner.borrow_mut();
        let removed: Vec<u32> = inner
            .removed_in_flight
            .iter()
            .copied()
            .filter(|id| ours.contains(id))
            .collect();
        inner.in_flight.retain(|id| !ours.contains(id));
        inner.removed_in_flight.retain(|id| !ours.contains(id));
        listeners.retain(|l| !removed.contains(&l.id));
        listeners.append(&mut inner.listeners);
        inner.listeners = listeners;
    }

    /// Answer a `__tcfapiCall` posted from another frame. String payloads
    /// get string replies. Returns false for messages that are not calls.
    pub fn handle_message(&self, data: &Value, mut reply: impl FnMut(Value) + 'static) -> bool {
        let (payload, as_string) = match data {
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(parsed) => (parsed, true),
                Err(_) => return false,
            },
            other => (other.clone(), false),
        };
        let Some(call) = payload.get("__tcfapiCall") else {
            return false;
        };
        let Some(command) = call.get("command").and_then(Value::as_str) else {
            return false;
        };
        let version = call.get("version").and_then(Value::as_u64).unwrap_or(2) as u32;
        let call_id = call.get("callId").cloned().unwrap_or(Value::Null);
        let parameter = call.get("parameter").cloned();

        let callback: TcfCallback = Box::new(move |value: &TcfReturn, success: bool| {
            let message = json!({
                "__tcfapiReturn": {
                    "returnValue": value.to_value(),
                    "success": success,
                    "callId": call_id,
                }
            });
            if as_string {
                reply(Value::String(message.to_string()));
            } else {
                reply(message);
            }
        });
        self.call(command, version, callback, parameter.as_ref());
        true
    }
}
