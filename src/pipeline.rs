//! Generation Pipeline - Single Entry Point
//!
//! `generate` always validates first and returns no artifacts when any
//! error-severity violation is found. After that, markup, stylesheet and
//! panel each fall back to a static rendition instead of failing the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::hashing::{compute_request_hash, sri_integrity};
use crate::markup::{attribute_count, MarkupGenerator, FALLBACK_MARKUP, ROOT_MARKER};
use crate::minify::minify_script;
use crate::panel::{PanelPalette, PreferencesPanel, FALLBACK_PANEL};
use crate::runtime::{runtime_components, RuntimeConfig};
use crate::script::{layout_css, wrap_html, ScriptAssembler, ScriptError, ScriptParts};
use crate::style::{StyleGenerator, FALLBACK_STYLESHEET};
use crate::templates::{normalize_positions, BannerTemplate};
use crate::tree::{BannerModel, ModelError};
use crate::validation::{ValidationResult, Validator};
use crate::ENGINE_VERSION;

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static VALIDATION_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_validation_call_count() -> u32 {
    VALIDATION_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_validation_call_count() {
    VALIDATION_CALL_COUNT.store(0, Ordering::SeqCst);
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation failed: {}", .0.summary())]
    ValidationFailed(ValidationResult),

    #[error("Invalid template JSON: {0}")]
    Template(#[from] serde_json::Error),

    #[error("Banner model error: {0}")]
    Model(#[from] ModelError),

    #[error("Render error: {0}")]
    Render(#[from] ScriptError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// The validation report, when that is why generation stopped.
    pub fn validation(&self) -> Option<&ValidationResult> {
        match self {
            Self::ValidationFailed(result) => Some(result),
            _ => None,
        }
    }
}

/// A generation stage that can fall back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Markup,
    Stylesheet,
    Panel,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Markup => "markup",
            Stage::Stylesheet => "stylesheet",
            Stage::Panel => "panel",
        })
    }
}

/// Why a stage's output was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum GenerationError {
    #[error("{0} stage produced no output")]
    Empty(Stage),

    #[error("markup must contain exactly one banner root, found {0}")]
    RootCount(usize),

    #[error("{0} output is missing its {1} marker")]
    MissingMarker(Stage, &'static str),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Javascript,
    Html,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    #[serde(default = "default_true")]
    pub minify: bool,
    #[serde(default)]
    pub include_google_consent_mode: bool,
    #[serde(default, rename = "forceGDPR")]
    pub force_gdpr: bool,
    /// Days. Engine default when unset.
    #[serde(default)]
    pub cookie_expiry: Option<u32>,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub domain_id: String,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub language: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            minify: true,
            include_google_consent_mode: false,
            force_gdpr: false,
            cookie_expiry: None,
            base_url: String::new(),
            domain_id: String::new(),
            format: OutputFormat::Javascript,
            language: None,
        }
    }
}

impl GenerationOptions {
    pub fn language_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.language.as_deref().filter(|l| !l.is_empty()).unwrap_or(default)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifacts {
    pub id: String,
    pub banner_id: String,
    pub markup: String,
    pub stylesheet: String,
    pub panel: String,
    pub script: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    pub script_integrity: String,
    pub request_hash: String,
    pub generated_at: DateTime<Utc>,
    pub engine_version: String,
    pub fallbacks: Vec<Stage>,
    pub validation: ValidationResult,
}

fn check_markup(markup: String) -> Result<String, GenerationError> {
    if markup.trim().is_empty() {
        return Err(GenerationError::Empty(Stage::Markup));
    }
    match attribute_count(&markup, ROOT_MARKER) {
        1 => Ok(markup),
        n => Err(GenerationError::RootCount(n)),
    }
}

fn check_stylesheet(css: String) -> Result<String, GenerationError> {
    if css.trim().is_empty() {
        return Err(GenerationError::Empty(Stage::Stylesheet));
    }
    Ok(css)
}

fn check_panel(panel: String) -> Result<String, GenerationError> {
    if panel.trim().is_empty() {
        return Err(GenerationError::Empty(Stage::Panel));
    }
    if attribute_count(&panel, "data-cb-panel") == 0 {
        return Err(GenerationError::MissingMarker(Stage::Panel, "data-cb-panel"));
    }
    Ok(panel)
}

fn with_fallback(
    stage: Stage,
    output: Result<String, GenerationError>,
    fallback: &str,
    fallbacks: &mut Vec<Stage>,
) -> String {
    match output {
        Ok(output) => {
            tracing::debug!(%stage, bytes = output.len(), "stage generated");
            output
        }
        Err(e) => {
            tracing::warn!(%stage, error = %e, "stage failed, using fallback");
            fallbacks.push(stage);
            fallback.to_string()
        }
    }
}

/// The generation pipeline - single entry point for banner generation
pub struct GenerationPipeline {
    config: EngineConfig,
    validator: Validator,
    assembler: ScriptAssembler,
}

impl GenerationPipeline {
    pub fn new(config: EngineConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            validator: Validator::new(config.limits),
            assembler: ScriptAssembler::new()?,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate a template after position normalization.
    ///
    /// This is the ONLY validation entry point.
    pub fn validate(&self, template: &BannerTemplate) -> ValidationResult {
        #[cfg(feature = "test-hooks")]
        VALIDATION_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        let mut template = template.clone();
        normalize_positions(&mut template.components);
        self.validator.validate(&template)
    }

    pub fn validate_json(&self, json: &str) -> Result<ValidationResult, PipelineError> {
        let template = BannerTemplate::from_json(json)?;
        Ok(self.validate(&template))
    }

    /// Generate every artifact for a template.
    ///
    /// Always calls `validate` first.
    pub fn generate(
        &self,
        template: &BannerTemplate,
        options: &GenerationOptions,
    ) -> Result<GeneratedArtifacts, PipelineError> {
        let validation = self.validate(template);
        if validation.has_errors() {
            tracing::warn!(
                banner = %template.id,
                errors = validation.errors.len(),
                "template rejected"
            );
            return Err(PipelineError::ValidationFailed(validation));
        }

        let mut template = template.clone();
        normalize_positions(&mut template.components);
        let model = BannerModel::from_template(&template)?;
        let language = options.language_or(&self.config.default_language);

        let mut fallbacks = vec![];
        let markup = with_fallback(
            Stage::Markup,
            check_markup(MarkupGenerator::new(language).generate(&model)),
            FALLBACK_MARKUP,
            &mut fallbacks,
        );
        let stylesheet = with_fallback(
            Stage::Stylesheet,
            check_stylesheet(StyleGenerator::generate(&model)),
            FALLBACK_STYLESHEET,
            &mut fallbacks,
        );
        let panel = with_fallback(
            Stage::Panel,
            check_panel(
                PreferencesPanel::new(
                    PanelPalette::from_theme(&model.theme),
                    &model.settings.panel_texts,
                    &model.settings.vendors,
                )
                .generate(language),
            ),
            FALLBACK_PANEL,
            &mut fallbacks,
        );

        let runtime_config = RuntimeConfig::from_model(&model, options, &self.config);
        let layout = layout_css(&model);
        let parts = ScriptParts {
            markup: &markup,
            stylesheet: &stylesheet,
            panel: &panel,
            layout_css: &layout,
        };
        let mut script = self
            .assembler
            .assemble(&parts, &runtime_config, &runtime_components(&model.tree))?;
        if options.minify {
            script = minify_script(&script);
        }

        let html = (options.format == OutputFormat::Html).then(|| wrap_html(&script, language));
        let request_hash = compute_request_hash(&template, options, ENGINE_VERSION)?;

        tracing::info!(
            banner = %model.id,
            bytes = script.len(),
            fallbacks = fallbacks.len(),
            "banner generated"
        );

        Ok(GeneratedArtifacts {
            id: Uuid::new_v4().to_string(),
            banner_id: model.id.clone(),
            script_integrity: sri_integrity(script.as_bytes()),
            markup,
            stylesheet,
            panel,
            script,
            html,
            request_hash,
            generated_at: Utc::now(),
            engine_version: ENGINE_VERSION.to_string(),
            fallbacks,
            validation,
        })
    }

    pub fn generate_json(
        &self,
        json: &str,
        options: &GenerationOptions,
    ) -> Result<GeneratedArtifacts, PipelineError> {
        let template = BannerTemplate::from_json(json)?;
        self.generate(&template, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pipeline() -> GenerationPipeline {
        GenerationPipeline::new(EngineConfig::default()).unwrap()
    }

    fn template(actions: &[&str]) -> BannerTemplate {
        let device = json!({ "type": "banner", "position": "bottom" });
        let mut components = vec![json!({
            "id": "msg", "type": "text", "content": { "texts": { "en": "We use cookies.", "de": "Wir nutzen Cookies." } },
            "position": { "desktop": { "top": 10 } }
        })];
        for action in actions {
            components.push(json!({
                "id": action, "type": "button", "content": action, "action": { "type": action }
            }));
        }
        serde_json::from_value(json!({
            "id": "shop",
            "layout": { "desktop": device, "tablet": device, "mobile": device },
            "components": components
        }))
        .unwrap()
    }

    #[test]
    fn test_pipeline_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GenerationPipeline>();
    }

    #[test]
    fn test_generate_produces_all_artifacts() {
        let artifacts = pipeline()
            .generate(&template(&["accept_all", "reject_all"]), &GenerationOptions::default())
            .unwrap();
        assert_eq!(artifacts.banner_id, "shop");
        assert_eq!(attribute_count(&artifacts.markup, ROOT_MARKER), 1);
        assert!(!artifacts.stylesheet.is_empty());
        assert!(artifacts.panel.contains("data-cb-panel"));
        assert!(artifacts.script.contains("__tcfapi"));
        assert!(artifacts.fallbacks.is_empty());
        assert!(artifacts.html.is_none());
        assert_eq!(artifacts.script_integrity, sri_integrity(artifacts.script.as_bytes()));
        assert_eq!(artifacts.engine_version, ENGINE_VERSION);
    }

    #[test]
    fn test_missing_reject_blocks_generation() {
        let err = pipeline()
            .generate(&template(&["accept_all"]), &GenerationOptions::default())
            .unwrap_err();
        let result = err.validation().unwrap();
        assert!(!result.is_valid);
        assert!(err.to_string().contains("reject_all"));
    }

    #[test]
    fn test_language_and_html_format() {
        let options = GenerationOptions {
            language: Some("de".into()),
            format: OutputFormat::Html,
            minify: false,
            ..GenerationOptions::default()
        };
        let artifacts = pipeline()
            .generate(&template(&["accept_all", "reject_all"]), &options)
            .unwrap();
        assert!(artifacts.markup.contains("Wir nutzen Cookies."));
        let html = artifacts.html.unwrap();
        assert!(html.contains("<html lang=\"de\">"));
    }

    #[test]
    fn test_request_hash_stable_across_runs() {
        let p = pipeline();
        let options = GenerationOptions::default();
        let a = p.generate(&template(&["accept_all", "reject_all"]), &options).unwrap();
        let b = p.generate(&template(&["accept_all", "reject_all"]), &options).unwrap();
        assert_eq!(a.request_hash, b.request_hash);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_options_wire_names() {
        let options: GenerationOptions = serde_json::from_value(json!({
            "forceGDPR": true,
            "includeGoogleConsentMode": true,
            "cookieExpiry": 30,
            "format": "html"
        }))
        .unwrap();
        assert!(options.minify);
        assert!(options.force_gdpr);
        assert_eq!(options.cookie_expiry, Some(30));
        assert_eq!(options.format, OutputFormat::Html);
        assert_eq!(options.language_or("en"), "en");
    }

    #[test]
    fn test_stage_checks() {
        assert_eq!(check_markup("<div></div>".into()), Err(GenerationError::RootCount(0)));
        assert_eq!(check_stylesheet("  ".into()), Err(GenerationError::Empty(Stage::Stylesheet)));
        assert_eq!(
            check_panel("<div></div>".into()),
            Err(GenerationError::MissingMarker(Stage::Panel, "data-cb-panel"))
        );
        assert!(check_markup(FALLBACK_MARKUP.to_string()).is_ok());
        assert!(check_panel(FALLBACK_PANEL.to_string()).is_ok());
    }

    #[test]
    fn test_marker_in_copy_keeps_generated_markup() {
        let template: BannerTemplate = serde_json::from_value(json!({
            "id": "copy",
            "layout": {
                "desktop": { "type": "banner", "position": "bottom" },
                "tablet": { "type": "banner", "position": "bottom" },
                "mobile": { "type": "banner", "position": "bottom" }
            },
            "components": [
                { "id": "msg", "type": "text", "content": "Our root element carries data-cb-root" },
                { "id": "a", "type": "button", "content": "Accept", "action": { "type": "accept_all" } },
                { "id": "r", "type": "button", "content": "Reject", "action": { "type": "reject_all" } }
            ]
        }))
        .unwrap();
        let artifacts = pipeline().generate(&template, &GenerationOptions::default()).unwrap();
        assert!(artifacts.fallbacks.is_empty(), "{:?}", artifacts.fallbacks);
        assert!(artifacts.markup.contains("Our root element carries data-cb-root"));
    }

    #[test]
    fn test_failed_stage_falls_back() {
        let mut fallbacks = vec![];
        let markup = with_fallback(
            Stage::Markup,
            check_markup(String::new()),
            FALLBACK_MARKUP,
            &mut fallbacks,
        );
        assert_eq!(markup, FALLBACK_MARKUP);
        assert_eq!(fallbacks, vec![Stage::Markup]);
        assert_eq!(serde_json::to_value(&fallbacks).unwrap(), json!(["markup"]));
    }
}
