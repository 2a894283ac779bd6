//! Script Assembler
//!
//! The runtime is a fixed skeleton (`assets/banner-runtime.js.hbs`) with
//! named slots. Each slot sits inside a JS template literal and every value
//! goes through `escape_script_literal`, so no generated content can end a
//! literal, interpolate, or close the surrounding `<script>` element.

use handlebars::Handlebars;
use serde::Serialize;
use thiserror::Error;

use crate::markup::FALLBACK_MARKUP;
use crate::runtime::{RuntimeComponent, RuntimeConfig};
use crate::tree::{BannerModel, LayoutPosition, LayoutType};
use crate::ENGINE_VERSION;

const SKELETON_NAME: &str = "banner-runtime";
const SKELETON: &str = include_str!("../assets/banner-runtime.js.hbs");

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("runtime skeleton failed to register: {0}")]
    Skeleton(#[from] handlebars::TemplateError),

    #[error("runtime script failed to render: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error("runtime data failed to serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Make `value` safe inside a JS template literal (`` `...` ``).
pub fn escape_script_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + value.len() / 8);
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '`' => out.push_str("\\`"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            '<' if chars.peek() == Some(&'/') => out.push_str("<\\"),
            _ => out.push(ch),
        }
    }
    out
}

/// The generated pieces the runtime injects into the page.
#[derive(Debug, Clone, Copy)]
pub struct ScriptParts<'a> {
    pub markup: &'a str,
    pub stylesheet: &'a str,
    pub panel: &'a str,
    pub layout_css: &'a str,
}

#[derive(Serialize)]
struct Slots {
    engine_version: String,
    banner_id: String,
    base_url: String,
    domain_id: String,
    markup: String,
    stylesheet: String,
    panel: String,
    layout_css: String,
    emergency_markup: String,
    config: String,
    components: String,
    google_consent_mode: bool,
}

pub struct ScriptAssembler {
    handlebars: Handlebars<'static>,
}

impl ScriptAssembler {
    pub fn new() -> Result<Self, ScriptError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        // Slots are escaped for JS, not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_template_string(SKELETON_NAME, SKELETON)?;
        Ok(Self { handlebars })
    }

    pub fn assemble(
        &self,
        parts: &ScriptParts<'_>,
        config: &RuntimeConfig,
        components: &[RuntimeComponent],
    ) -> Result<String, ScriptError> {
        let slots = Slots {
            engine_version: escape_script_literal(ENGINE_VERSION),
            banner_id: escape_script_literal(&config.banner_id),
            base_url: escape_script_literal(&config.base_url),
            domain_id: escape_script_literal(&config.domain_id),
            markup: escape_script_literal(parts.markup),
            stylesheet: escape_script_literal(parts.stylesheet),
            panel: escape_script_literal(parts.panel),
            layout_css: escape_script_literal(parts.layout_css),
            emergency_markup: escape_script_literal(FALLBACK_MARKUP),
            config: escape_script_literal(&serde_json::to_string(config)?),
            components: escape_script_literal(&serde_json::to_string(components)?),
            google_consent_mode: config.google_consent_mode,
        };
        let script = self.handlebars.render(SKELETON_NAME, &slots)?;
        tracing::debug!(banner = %config.banner_id, bytes = script.len(), "assembled runtime script");
        Ok(script)
    }
}

/// Placement the runtime falls back to when the stylesheet is missing.
/// Wrapped in `:where()` so generated per-device rules always win.
pub fn layout_css(model: &BannerModel) -> String {
    let layout = &model.layout.desktop;
    let box_rule = match layout.kind {
        LayoutType::Modal => ":where(.cb-host) .cb-modal{position:fixed;top:50%;left:50%;transform:translate(-50%,-50%);width:min(560px,90vw);max-height:90vh;overflow:auto}".to_string(),
        LayoutType::Floating => format!(
            ":where(.cb-host) .cb-floating{{position:fixed;{};width:min(380px,calc(100vw - 40px))}}",
            corner(layout.position)
        ),
        LayoutType::Banner => format!(
            ":where(.cb-host) .cb-banner{{position:fixed;left:0;right:0;{}:0;width:100%}}",
            if layout.position.is_top() { "top" } else { "bottom" }
        ),
    };

    let mut css = String::from(".cb-host{position:relative;z-index:2147483646}.cb-host[hidden],.cb-host [hidden]{display:none!important}");
    css.push_str(&box_rule);
    css.push_str(":where(.cb-host) [data-cb-root]{z-index:2147483647}");
    if layout.kind == LayoutType::Modal {
        css.push_str(".cb-overlay{position:fixed;top:0;left:0;right:0;bottom:0;background:rgba(0,0,0,.5);z-index:2147483646}");
    }
    css.push_str(".cb-preferences{position:fixed;top:50%;left:50%;transform:translate(-50%,-50%);width:min(640px,94vw);max-height:85vh;overflow:auto;padding:20px;border-radius:8px;z-index:2147483647;box-shadow:0 10px 40px rgba(0,0,0,.3)}");
    css
}

fn corner(position: LayoutPosition) -> &'static str {
    match position {
        LayoutPosition::TopLeft => "top:20px;left:20px",
        LayoutPosition::TopRight | LayoutPosition::Top => "top:20px;right:20px",
        LayoutPosition::BottomLeft => "bottom:20px;left:20px",
        LayoutPosition::BottomRight | LayoutPosition::Bottom | LayoutPosition::Center => {
            "bottom:20px;right:20px"
        }
    }
}

/// Minimal standalone document around the script, for previews.
pub fn wrap_html(script: &str, language: &str) -> String {
    format!(
        concat!(
            "<!DOCTYPE html>\n",
            "<html lang=\"{lang}\">\n",
            "<head>\n<meta charset=\"utf-8\">\n",
            "<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\n",
            "<title>Consent banner preview</title>\n",
            "</head>\n<body>\n<script>\n{script}\n</script>\n</body>\n</html>\n"
        ),
        lang = crate::markup::escape_attr(language),
        script = script.replace("</script", "<\\/script"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::pipeline::GenerationOptions;
    use crate::runtime::runtime_components;
    use crate::templates::BannerTemplate;
    use serde_json::json;

    fn model(kind: &str, position: &str) -> BannerModel {
        let device = json!({ "type": kind, "position": position });
        let template = BannerTemplate::from_json(
            &json!({
                "id": "acme",
                "layout": { "desktop": device, "tablet": device, "mobile": device },
                "components": [
                    { "id": "msg", "type": "text", "content": "We use cookies." },
                    { "id": "yes", "type": "button", "content": "Yes", "action": { "type": "accept_all" } },
                    { "id": "no", "type": "button", "content": "No", "action": { "type": "reject_all" } }
                ]
            })
            .to_string(),
        )
        .unwrap();
        BannerModel::from_template(&template).unwrap()
    }

    fn assemble(model: &BannerModel, options: &GenerationOptions, markup: &str) -> String {
        let config = RuntimeConfig::from_model(model, options, &EngineConfig::default());
        let css = layout_css(model);
        let parts = ScriptParts {
            markup,
            stylesheet: ".cb-banner{color:red}",
            panel: "<div data-cb-panel></div>",
            layout_css: &css,
        };
        ScriptAssembler::new()
            .unwrap()
            .assemble(&parts, &config, &runtime_components(&model.tree))
            .unwrap()
    }

    #[test]
    fn test_escape_script_literal() {
        assert_eq!(escape_script_literal("a`b"), "a\\`b");
        assert_eq!(escape_script_literal("${x}"), "\\${x}");
        assert_eq!(escape_script_literal("$x"), "$x");
        assert_eq!(escape_script_literal("c:\\d"), "c:\\\\d");
        assert_eq!(escape_script_literal("</script>"), "<\\/script>");
        assert_eq!(escape_script_literal("a < b"), "a < b");
    }

    #[test]
    fn test_all_slots_filled() {
        let model = model("modal", "center");
        let script = assemble(&model, &GenerationOptions::default(), "<div data-cb-root>hi</div>");
        assert!(!script.contains("{{"));
        assert!(script.contains("const BANNER_ID = `acme`;"));
        assert!(script.contains("window.__tcfapi"));
        assert!(script.contains("<div data-cb-root>hi<\\/div>"));
        assert!(script.contains("\"useOverlay\":true"));
    }

    #[test]
    fn test_runtime_looks_up_components_inside_banner() {
        let model = model("banner", "bottom");
        let script = assemble(&model, &GenerationOptions::default(), "<div data-cb-root></div>");
        assert!(!script.contains("document.getElementById(component.id)"));
        assert!(script.contains("host.querySelectorAll('[data-component-id]')"));
        assert!(script.contains("CONFIG.cookieExpiry ?? 365"));
    }

    #[test]
    fn test_hostile_content_stays_in_literal() {
        let model = model("banner", "bottom");
        let script = assemble(&model, &GenerationOptions::default(), "<p>`${alert(1)}`</p></script>");
        assert!(script.contains("<p>\\`\\${alert(1)}\\`<\\/p><\\/script>"));
        assert!(!script.contains("</script>"));
    }

    #[test]
    fn test_consent_mode_bootstrap_is_optional() {
        let model = model("banner", "top");
        let without = assemble(&model, &GenerationOptions::default(), "<div></div>");
        assert!(!without.contains("'consent', 'default'"));

        let options = GenerationOptions {
            include_google_consent_mode: true,
            ..GenerationOptions::default()
        };
        let with = assemble(&model, &options, "<div></div>");
        assert!(with.contains("window.gtag('consent', 'default'"));
        assert!(with.find("'consent', 'default'") < with.rfind("boot();"));
    }

    #[test]
    fn test_layout_css_per_type() {
        let modal = layout_css(&model("modal", "center"));
        assert!(modal.contains(".cb-overlay{"));
        assert!(modal.contains("translate(-50%,-50%)"));

        let floating = layout_css(&model("floating", "top-left"));
        assert!(floating.contains("top:20px;left:20px"));
        assert!(!floating.contains(".cb-overlay{"));

        let banner = layout_css(&model("banner", "top"));
        assert!(banner.contains("right:0;top:0;width:100%"));
    }

    #[test]
    fn test_wrap_html() {
        let html = wrap_html("var s = '</script>';", "de");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<html lang=\"de\">"));
        assert!(html.contains("var s = '<\\/script>';"));
        assert_eq!(html.matches("</script>").count(), 1);
    }
}
