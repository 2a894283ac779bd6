//! Validation System - Rule/Policy Separation
//!
//! Rules produce structured violations over the wire template.
//! The validator runs every rule and never short-circuits, so the caller
//! sees the complete list in one pass.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::ValidationLimits;
use crate::templates::{BannerTemplate, Component, CssValue, Device};
use crate::tree::{ActionKind, ComponentKind, LayoutPosition, LayoutType};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl ValidationViolation {
    fn error(rule: &str, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            severity: ViolationSeverity::Error,
            message: message.into(),
            component_id: None,
            expected: None,
            actual: None,
        }
    }

    fn warning(rule: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ViolationSeverity::Warning,
            ..Self::error(rule, message)
        }
    }

    fn on(mut self, component_id: &str) -> Self {
        self.component_id = Some(component_id.to_string());
        self
    }

    fn expected(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationViolation>,
    #[serde(default)]
    pub warnings: Vec<ValidationViolation>,
    pub template_id: String,
}

impl ValidationResult {
    pub fn from_violations(template: &BannerTemplate, violations: Vec<ValidationViolation>) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) = violations
            .into_iter()
            .partition(|v| v.severity == ViolationSeverity::Error);
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            template_id: template.id.clone(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// `rule: message` lines, for logs and error strings.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|v| match &v.component_id {
                Some(id) => format!("{} [{}]: {}", v.rule, id, v.message),
                None => format!("{}: {}", v.rule, v.message),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validation rule trait - produces violations
pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn validate(&self, template: &BannerTemplate, limits: &ValidationLimits) -> Vec<ValidationViolation>;
}

/// Every component with its depth, parents before children.
fn flatten(components: &[Component]) -> Vec<(&Component, usize)> {
    let mut out = Vec::new();
    let mut stack: Vec<(&Component, usize)> = components.iter().rev().map(|c| (c, 1)).collect();
    while let Some((component, depth)) = stack.pop() {
        out.push((component, depth));
        stack.extend(component.children.iter().rev().map(|c| (c, depth + 1)));
    }
    out
}

// --- Concrete Rules ---

pub struct LayoutRule;

const MAX_PIXEL_DIMENSION: f64 = 4000.0;

impl LayoutRule {
    fn check_dimension(&self, device: Device, axis: &str, value: &CssValue) -> Option<ValidationViolation> {
        let text = value.to_css("px");
        if text == "auto" {
            return None;
        }
        let (number, max) = if let Some(n) = text.strip_suffix("px") {
            (n, MAX_PIXEL_DIMENSION)
        } else if let Some(n) = text.strip_suffix('%').or_else(|| text.strip_suffix("vw")).or_else(|| text.strip_suffix("vh")) {
            (n, 100.0)
        } else {
            return Some(
                ValidationViolation::error(self.name(), format!("{} layout {} has no recognised unit", device.as_str(), axis))
                    .expected("auto, px, %, vw or vh", text.clone()),
            );
        };
        match number.trim().parse::<f64>() {
            Ok(n) if (0.0..=max).contains(&n) => None,
            _ => Some(
                ValidationViolation::error(self.name(), format!("{} layout {} is out of bounds", device.as_str(), axis))
                    .expected(format!("0..={}", max), text.clone()),
            ),
        }
    }
}

impl ValidationRule for LayoutRule {
    fn name(&self) -> &'static str { "layout" }

    fn validate(&self, template: &BannerTemplate, _limits: &ValidationLimits) -> Vec<ValidationViolation> {
        let mut violations = vec![];

        for device in Device::ALL {
            let Some(layout) = template.layout.get(device) else {
                violations.push(ValidationViolation::error(
                    self.name(),
                    format!("Layout block for {} is missing", device.as_str()),
                ));
                continue;
            };

            if layout.kind.parse::<LayoutType>().is_err() {
                violations.push(
                    ValidationViolation::error(self.name(), format!("Invalid {} layout type", device.as_str()))
                        .expected("modal, banner or floating", layout.kind.clone()),
                );
            }
            if layout.position.parse::<LayoutPosition>().is_err() {
                violations.push(
                    ValidationViolation::error(self.name(), format!("Invalid {} layout position", device.as_str()))
                        .expected("top, bottom, center or a corner", layout.position.clone()),
                );
            }
            for (axis, value) in [("width", &layout.width), ("height", &layout.height)] {
                if let Some(violation) = value.as_ref().and_then(|v| self.check_dimension(device, axis, v)) {
                    violations.push(violation);
                }
            }
        }

        violations
    }
}

pub struct BannerIdRule;

const MAX_BANNER_ID_LENGTH: usize = 64;

impl ValidationRule for BannerIdRule {
    fn name(&self) -> &'static str { "banner_id" }

    /// The id names cookies, storage keys and output files.
    fn validate(&self, template: &BannerTemplate, _limits: &ValidationLimits) -> Vec<ValidationViolation> {
        let id = template.id.as_str();
        let well_formed = (1..=MAX_BANNER_ID_LENGTH).contains(&id.len())
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if well_formed {
            vec![]
        } else {
            vec![ValidationViolation::error(self.name(), "Banner id must be 1-64 letters, digits, '-' or '_'")
                .expected("[A-Za-z0-9_-]{1,64}", id)]
        }
    }
}

pub struct BehaviourRule;

/// Ten years.
const MAX_RESHOW_DAYS: f64 = 3650.0;
/// One day.
const MAX_AUTO_HIDE_MS: u64 = 86_400_000;

impl ValidationRule for BehaviourRule {
    fn name(&self) -> &'static str { "behaviour" }

    fn validate(&self, template: &BannerTemplate, _limits: &ValidationLimits) -> Vec<ValidationViolation> {
        let behaviour = &template.settings.behaviour;
        let mut violations = vec![];

        let interval = behaviour.reshow.interval;
        if !(interval.is_finite() && interval > 0.0 && interval <= MAX_RESHOW_DAYS) {
            violations.push(
                ValidationViolation::error(self.name(), "Reshow interval is out of bounds")
                    .expected(format!("0 < days <= {}", MAX_RESHOW_DAYS), interval.to_string()),
            );
        }
        if behaviour.auto_hide.delay > MAX_AUTO_HIDE_MS {
            violations.push(
                ValidationViolation::error(self.name(), "Auto-hide delay is out of bounds")
                    .expected(format!("<= {} ms", MAX_AUTO_HIDE_MS), behaviour.auto_hide.delay.to_string()),
            );
        }

        violations
    }
}

pub struct NonEmptyRule;

impl ValidationRule for NonEmptyRule {
    fn name(&self) -> &'static str { "components_present" }

    fn validate(&self, template: &BannerTemplate, _limits: &ValidationLimits) -> Vec<ValidationViolation> {
        if template.components.is_empty() {
            vec![ValidationViolation::error(self.name(), "Template has no components")]
        } else {
            vec![]
        }
    }
}

pub struct UniqueIdRule;

impl ValidationRule for UniqueIdRule {
    fn name(&self) -> &'static str { "unique_ids" }

    fn validate(&self, template: &BannerTemplate, _limits: &ValidationLimits) -> Vec<ValidationViolation> {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        let mut violations = vec![];

        for (component, _) in flatten(&template.components) {
            if component.id.trim().is_empty() {
                violations.push(ValidationViolation::error(self.name(), "Component id is empty"));
            } else if !seen.insert(component.id.as_str()) && reported.insert(component.id.as_str()) {
                violations.push(
                    ValidationViolation::error(self.name(), format!("Duplicate component id '{}'", component.id))
                        .on(&component.id),
                );
            }
        }

        violations
    }
}

pub struct AllowedTypesRule;

impl ValidationRule for AllowedTypesRule {
    fn name(&self) -> &'static str { "allowed_types" }

    fn validate(&self, template: &BannerTemplate, _limits: &ValidationLimits) -> Vec<ValidationViolation> {
        let mut violations = vec![];

        for (component, _) in flatten(&template.components) {
            match component.kind.parse::<ComponentKind>() {
                Ok(kind) if !kind.has_children() && !component.children.is_empty() => {
                    violations.push(
                        ValidationViolation::error(self.name(), format!("Component type '{}' cannot have children", kind))
                            .on(&component.id),
                    );
                }
                Ok(_) => {}
                Err(()) => violations.push(
                    ValidationViolation::error(self.name(), format!("Unknown component type '{}'", component.kind))
                        .on(&component.id),
                ),
            }
            if let Some(action) = component.action_type() {
                if action.parse::<ActionKind>().is_err() {
                    violations.push(
                        ValidationViolation::error(self.name(), format!("Unknown action type '{}'", action))
                            .on(&component.id),
                    );
                }
            }
        }

        violations
    }
}

pub struct TextContentRule;

impl ValidationRule for TextContentRule {
    fn name(&self) -> &'static str { "text_content" }

    fn validate(&self, template: &BannerTemplate, limits: &ValidationLimits) -> Vec<ValidationViolation> {
        let mut violations = vec![];

        for (component, _) in flatten(&template.components) {
            let Ok(kind) = component.kind.parse::<ComponentKind>() else { continue };
            let bypass = component
                .action_type()
                .and_then(|a| a.parse::<ActionKind>().ok())
                .is_some_and(|a| a.bypasses_text());

            if kind.is_text_bearing() && !bypass {
                let texts = component.content.as_ref().map(|c| c.all_texts()).unwrap_or_default();
                if texts.is_empty() || texts.iter().all(|(_, t)| t.trim().is_empty()) {
                    violations.push(
                        ValidationViolation::error(self.name(), format!("{} component has no text", kind))
                            .on(&component.id),
                    );
                    continue;
                }
                for (language, text) in texts {
                    if text.trim().is_empty() {
                        violations.push(
                            ValidationViolation::error(self.name(), format!("Text for language '{}' is empty", language))
                                .on(&component.id),
                        );
                    } else if text.chars().count() > limits.max_text_length {
                        violations.push(
                            ValidationViolation::error(self.name(), "Text is too long")
                                .on(&component.id)
                                .expected(
                                    format!("<= {} characters", limits.max_text_length),
                                    format!("{} characters", text.chars().count()),
                                ),
                        );
                    }
                }
            }

            if matches!(kind, ComponentKind::Image | ComponentKind::Logo)
                && component.alt.as_deref().map_or(true, |a| a.trim().is_empty())
            {
                violations.push(
                    ValidationViolation::warning(self.name(), "Image has no alternative text").on(&component.id),
                );
            }
        }

        violations
    }
}

pub struct PositionFormatRule;

impl ValidationRule for PositionFormatRule {
    fn name(&self) -> &'static str { "position_format" }

    fn validate(&self, template: &BannerTemplate, _limits: &ValidationLimits) -> Vec<ValidationViolation> {
        let mut violations = vec![];

        for (component, _) in flatten(&template.components) {
            for (device, bx) in component.position.iter() {
                for (edge, value) in bx.edges() {
                    let Some(value) = value else { continue };
                    let well_formed = match value {
                        CssValue::Text(s) => is_position_string(s),
                        CssValue::Number(_) => false,
                    };
                    if !well_formed {
                        violations.push(
                            ValidationViolation::error(
                                self.name(),
                                format!("Invalid {} position '{}'", device.as_str(), edge),
                            )
                            .on(&component.id)
                            .expected("a value ending in % or px", value.to_css("")),
                        );
                    }
                }
            }
        }

        violations
    }
}

fn is_position_string(value: &str) -> bool {
    let value = value.trim();
    let number = value.strip_suffix('%').or_else(|| value.strip_suffix("px"));
    number.is_some_and(|n| n.trim().parse::<f64>().is_ok_and(f64::is_finite))
}

pub struct TreeBoundsRule;

impl ValidationRule for TreeBoundsRule {
    fn name(&self) -> &'static str { "tree_bounds" }

    fn validate(&self, template: &BannerTemplate, limits: &ValidationLimits) -> Vec<ValidationViolation> {
        let mut violations = vec![];
        let all = flatten(&template.components);

        if let Some((deepest, depth)) = all.iter().max_by_key(|(_, d)| *d) {
            if *depth > limits.max_depth {
                violations.push(
                    ValidationViolation::error(self.name(), "Components are nested too deeply")
                        .on(&deepest.id)
                        .expected(format!("depth <= {}", limits.max_depth), format!("depth {}", depth)),
                );
            }
        }
        if all.len() > limits.max_components {
            violations.push(
                ValidationViolation::error(self.name(), "Too many components")
                    .expected(format!("<= {}", limits.max_components), all.len().to_string()),
            );
        }

        violations
    }
}

pub struct RequiredActionsRule;

impl ValidationRule for RequiredActionsRule {
    fn name(&self) -> &'static str { "required_actions" }

    fn validate(&self, template: &BannerTemplate, _limits: &ValidationLimits) -> Vec<ValidationViolation> {
        let all = flatten(&template.components);
        let present = |wanted: ActionKind| {
            all.iter()
                .any(|(c, _)| c.action_type() == Some(wanted.as_str()))
        };

        [ActionKind::AcceptAll, ActionKind::RejectAll]
            .into_iter()
            .filter(|action| !present(*action))
            .map(|action| {
                ValidationViolation::error(
                    self.name(),
                    format!("Missing required '{}' action", action),
                )
                .expected(format!("at least one component with action '{}'", action), "none")
            })
            .collect()
    }
}

/// Validator orchestrates rules
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule + Send + Sync>>,
    limits: ValidationLimits,
}

impl Validator {
    pub fn new(limits: ValidationLimits) -> Self {
        Self {
            rules: vec![
                Box::new(BannerIdRule),
                Box::new(LayoutRule),
                Box::new(BehaviourRule),
                Box::new(NonEmptyRule),
                Box::new(UniqueIdRule),
                Box::new(AllowedTypesRule),
                Box::new(TextContentRule),
                Box::new(PositionFormatRule),
                Box::new(TreeBoundsRule),
                Box::new(RequiredActionsRule),
            ],
            limits,
        }
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    pub fn validate(&self, template: &BannerTemplate) -> ValidationResult {
        let mut all_violations = vec![];

        for rule in &self.rules {
            let violations = rule.validate(template, &self.limits);
            if !violations.is_empty() {
                tracing::debug!(rule = rule.name(), count = violations.len(), "validation rule reported");
            }
            all_violations.extend(violations);
        }

        ValidationResult::from_violations(template, all_violations)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationLimits::default())
    }
}
