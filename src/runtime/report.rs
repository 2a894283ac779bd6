//! Server sync: the consent report body and its one-retry delivery.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consent::{ConsentState, NECESSARY_PURPOSE, PURPOSES, SPECIAL_FEATURES};
use crate::templates::VendorEntry;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("payload too large")]
    PayloadTooLarge,

    #[error("server answered {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReportAck {
    #[serde(default)]
    pub data: Option<ReportAckData>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAckData {
    #[serde(default)]
    pub tc_string: Option<String>,
}

/// HTTP POST of a JSON body.
pub trait ConsentTransport {
    fn post(&mut self, url: &str, body: &ConsentReport) -> Result<ReportAck, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentReport {
    pub user_id: String,
    pub decisions: Decisions,
    pub banner_interaction: BannerInteraction,
    pub metadata: ReportMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decisions {
    pub purposes: Vec<PurposeDecision>,
    pub vendors: Vec<NamedDecision>,
    pub special_features: Vec<NamedDecision>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurposeDecision {
    pub id: u32,
    pub name: String,
    pub allowed: bool,
    pub legal_basis: LegalBasis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalBasis {
    Consent,
    LegitimateInterest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedDecision {
    pub id: u32,
    pub name: String,
    pub allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerInteraction {
    #[serde(rename = "type")]
    pub kind: String,
    /// Milliseconds from banner shown to decision.
    pub time_to_decision: i64,
    pub customization_opened: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub user_agent: String,
    pub language: String,
    pub device_type: String,
}

fn purpose_decision(id: u32, name: &str, allowed: bool) -> PurposeDecision {
    PurposeDecision {
        id,
        name: name.to_string(),
        allowed,
        legal_basis: if id == NECESSARY_PURPOSE {
            LegalBasis::LegitimateInterest
        } else {
            LegalBasis::Consent
        },
    }
}

impl ConsentReport {
    pub fn new(
        user_id: &str,
        state: &ConsentState,
        vendors: &[VendorEntry],
        interaction: BannerInteraction,
        metadata: ReportMetadata,
    ) -> Self {
        let flag = |map: &std::collections::BTreeMap<u32, bool>, id: u32| map.get(&id).copied().unwrap_or(false);
        Self {
            user_id: user_id.to_string(),
            decisions: Decisions {
                purposes: PURPOSES
                    .iter()
                    .map(|p| purpose_decision(p.id, p.key, flag(&state.purposes, p.id)))
                    .collect(),
                vendors: vendors
                    .iter()
                    .map(|v| NamedDecision {
                        id: v.id,
                        name: v.name.clone(),
                        allowed: flag(&state.vendors, v.id),
                    })
                    .collect(),
                special_features: SPECIAL_FEATURES
                    .iter()
                    .map(|f| NamedDecision {
                        id: f.id,
                        name: f.key.to_string(),
                        allowed: flag(&state.special_features, f.id),
                    })
                    .collect(),
            },
            banner_interaction: interaction,
            metadata,
        }
    }

    /// The fallback body sent after a 413: only the necessary purpose,
    /// allowed, and nothing else.
    pub fn reduced(&self) -> Self {
        Self {
            user_id: self.user_id.clone(),
            decisions: Decisions {
                purposes: vec![purpose_decision(NECESSARY_PURPOSE, "necessary", true)],
                vendors: vec![],
                special_features: vec![],
            },
            banner_interaction: self.banner_interaction.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

pub fn consent_endpoint(base_url: &str, domain_id: &str) -> String {
    format!(
        "{}/api/v1/consent/domain/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(domain_id)
    )
}

pub struct ConsentReporter<'a, T: ConsentTransport> {
    transport: &'a mut T,
    url: String,
}

impl<'a, T: ConsentTransport> ConsentReporter<'a, T> {
    pub fn new(transport: &'a mut T, base_url: &str, domain_id: &str) -> Self {
        Self {
            transport,
            url: consent_endpoint(base_url, domain_id),
        }
    }

    /// Send once; on `PayloadTooLarge` send the reduced body exactly once.
    pub fn send(&mut self, report: &ConsentReport) -> Result<ReportAck, TransportError> {
        match self.transport.post(&self.url, report) {
            Err(TransportError::PayloadTooLarge) => {
                tracing::warn!(url = %self.url, "consent report too large, retrying with necessary purpose only");
                self.transport.post(&self.url, &report.reduced())
            }
            other => other,
        }
    }
}
