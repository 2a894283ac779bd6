//! Style Generator
//!
//! Four independent passes (base, layout, components, accessibility) plus
//! optional keyframes, concatenated and minified into one stylesheet.

use crate::minify::minify_css;
use crate::templates::{AnimationType, CssValue, Device, StyleMap, Theme};
use crate::tree::{BannerModel, LayoutPosition, LayoutType, ResolvedLayout};

pub const TABLET_MEDIA: &str = "@media (max-width:1024px) and (min-width:769px)";
pub const MOBILE_MEDIA: &str = "@media (max-width:768px)";
/// Component rules are nested under this so host page ids stay untouched.
const ROOT_SELECTOR: &str = ".cb-banner[data-cb-root]";

/// Used when style generation fails outright.
pub const FALLBACK_STYLESHEET: &str = ".cb-banner{position:fixed;left:0;right:0;bottom:0;z-index:2147483647;padding:16px;background:#fff;color:#222;font-family:system-ui,sans-serif;box-shadow:0 -2px 10px rgba(0,0,0,.15)}.cb-banner button{margin:4px;padding:8px 16px;cursor:pointer}";

const POSITION_TRANSITION: &str =
    "transition:position .3s ease,left .3s ease,right .3s ease,top .3s ease,bottom .3s ease";

/// Properties that take bare numbers without a `px` unit.
const UNITLESS: &[&str] = &[
    "opacity",
    "z-index",
    "font-weight",
    "line-height",
    "flex",
    "flex-grow",
    "flex-shrink",
    "order",
];

pub struct StyleGenerator;

impl StyleGenerator {
    pub fn generate(model: &BannerModel) -> String {
        let mut css = String::new();
        css.push_str(&base_rules(&model.theme));
        css.push_str(&layout_rules(model));
        css.push_str(&component_rules(model));
        css.push_str(ACCESSIBILITY_RULES);
        match model.animation.kind {
            AnimationType::Fade => css.push_str(&fade_keyframes(model.animation.duration)),
            AnimationType::Slide => css.push_str(&slide_keyframes(model.animation.duration)),
            AnimationType::None => {}
        }
        minify_css(&css)
    }
}

struct Palette {
    primary: String,
    secondary: String,
    background: String,
    text: String,
    font: String,
    font_size: String,
    spacing: f64,
}

impl Palette {
    fn from_theme(theme: &Theme) -> Self {
        let pick = |value: &Option<String>, default: &str| {
            value
                .as_deref()
                .map(sanitize_value)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            primary: pick(&theme.colors.primary, "#2563eb"),
            secondary: pick(&theme.colors.secondary, "#e5e7eb"),
            background: pick(&theme.colors.background, "#ffffff"),
            text: pick(&theme.colors.text, "#1f2937"),
            font: pick(&theme.fonts.primary, "system-ui,-apple-system,\"Segoe UI\",Roboto,sans-serif"),
            font_size: theme
                .fonts
                .size
                .as_ref()
                .map(|s| sanitize_value(&s.to_css("px")))
                .unwrap_or_else(|| "14px".to_string()),
            spacing: theme.spacing.filter(|s| *s > 0.0).unwrap_or(8.0),
        }
    }
}

fn base_rules(theme: &Theme) -> String {
    let p = Palette::from_theme(theme);
    let gap = p.spacing;
    format!(
        r#"
.cb-banner, .cb-banner * {{ box-sizing: border-box; }}
.cb-banner {{
  z-index: 2147483647;
  font-family: {font};
  font-size: {size};
  line-height: 1.5;
  color: {text};
  background: {background};
  padding: {pad}px;
}}
.cb-banner .cb-button {{
  margin: {half}px;
  padding: {half}px {pad}px;
  border: 1px solid {primary};
  border-radius: 4px;
  background: {primary};
  color: {background};
  font: inherit;
  cursor: pointer;
}}
.cb-banner .cb-button[data-action="reject_all"], .cb-banner .cb-button--secondary {{
  background: {secondary};
  border-color: {secondary};
  color: {text};
}}
.cb-banner a {{ color: {primary}; text-decoration: underline; }}
.cb-banner .cb-close {{
  position: absolute;
  top: {half}px;
  right: {half}px;
  border: 0;
  background: transparent;
  color: {text};
  font-size: 20px;
  cursor: pointer;
}}
.cb-banner .cb-container {{ display: flex; flex-wrap: wrap; gap: {half}px; }}
.cb-banner .cb-toggle input {{ accent-color: {primary}; }}
"#,
        font = p.font,
        size = p.font_size,
        text = p.text,
        background = p.background,
        primary = p.primary,
        secondary = p.secondary,
        pad = crate::templates::format_number(gap * 2.0),
        half = crate::templates::format_number(gap),
    )
}

/// CSS placement for a banner position. Corners float 20px off the edges.
pub fn placement(position: LayoutPosition) -> &'static str {
    match position {
        LayoutPosition::Top => "top:0;left:0;right:0;bottom:auto;transform:none",
        LayoutPosition::Bottom => "bottom:0;left:0;right:0;top:auto;transform:none",
        LayoutPosition::Center => "top:50%;left:50%;right:auto;bottom:auto;transform:translate(-50%,-50%)",
        LayoutPosition::TopLeft => "top:20px;left:20px;right:auto;bottom:auto;transform:none",
        LayoutPosition::TopRight => "top:20px;right:20px;left:auto;bottom:auto;transform:none",
        LayoutPosition::BottomLeft => "bottom:20px;left:20px;right:auto;top:auto;transform:none",
        LayoutPosition::BottomRight => "bottom:20px;right:20px;left:auto;top:auto;transform:none",
    }
}

fn type_treatment(kind: LayoutType) -> &'static str {
    match kind {
        LayoutType::Modal => "border-radius:8px;box-shadow:0 10px 40px rgba(0,0,0,.3);max-width:90vw",
        LayoutType::Floating => "border-radius:8px;box-shadow:0 4px 20px rgba(0,0,0,.15);max-width:420px",
        LayoutType::Banner => "border-radius:0;box-shadow:0 -2px 10px rgba(0,0,0,.1);width:100%",
    }
}

fn device_layout_rule(layout: &ResolvedLayout) -> String {
    let mut decls = vec![
        "position:fixed".to_string(),
        placement(layout.position).to_string(),
        type_treatment(layout.kind).to_string(),
    ];
    if let Some(width) = &layout.width {
        decls.push(format!("width:{}", sanitize_value(&width.to_css("px"))));
    }
    if let Some(height) = &layout.height {
        decls.push(format!("height:{}", sanitize_value(&height.to_css("px"))));
    }
    if let Some(bg) = &layout.background_color {
        decls.push(format!("background:{}", sanitize_value(bg)));
    }
    format!("{}{{{}}}", ROOT_SELECTOR, decls.join(";"))
}

fn layout_rules(model: &BannerModel) -> String {
    let mut css = device_layout_rule(&model.layout.desktop);
    for device in [Device::Tablet, Device::Mobile] {
        if let Some(layout) = model.layout.get(device) {
            css.push_str(&wrap_media(device, &device_layout_rule(layout)));
        }
    }
    css
}

pub fn wrap_media(device: Device, rules: &str) -> String {
    match device {
        Device::Desktop => rules.to_string(),
        Device::Tablet => format!("{}{{{}}}", TABLET_MEDIA, rules),
        Device::Mobile => format!("{}{{{}}}", MOBILE_MEDIA, rules),
    }
}

fn component_rules(model: &BannerModel) -> String {
    let mut css = String::new();
    for (_, node) in model.tree.nodes() {
        let selector = format!("{} #{}", ROOT_SELECTOR, css_ident(&node.id));
        for device in Device::ALL {
            let mut decls = vec![];
            if let Some(bx) = node.position.get(device).filter(|b| !b.is_empty()) {
                decls.push("position:absolute".to_string());
                for (edge, value) in bx.edges() {
                    if let Some(value) = value {
                        decls.push(format!("{}:{}", edge, sanitize_value(&value.to_css("%"))));
                    }
                }
                decls.push(POSITION_TRANSITION.to_string());
            }
            if let Some(style) = node.style.get(device) {
                decls.extend(style_declarations(style));
            }
            if !decls.is_empty() {
                let rule = format!("{}{{{}}}", selector, decls.join(";"));
                css.push_str(&wrap_media(device, &rule));
            }
        }
    }
    css
}

/// `backgroundColor: "#fff"` → `background-color:#fff`, bare numbers get px.
pub fn style_declarations(style: &StyleMap) -> Vec<String> {
    style
        .iter()
        .filter_map(|(name, value)| {
            let property = css_property_name(name);
            let value = css_property_value(&property, value);
            (!property.is_empty() && !value.is_empty()).then(|| format!("{}:{}", property, value))
        })
        .collect()
}

pub fn css_property_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.trim().chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        }
    }
    out
}

pub fn css_property_value(property: &str, value: &CssValue) -> String {
    let unit = if UNITLESS.contains(&property) { "" } else { "px" };
    sanitize_value(&value.to_css(unit))
}

/// Values cannot close a block, start a new declaration or leave a tag.
pub fn sanitize_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ';' | '{' | '}' | '<' | '>' | '\\'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Escape an id for use in a CSS `#id` selector.
pub fn css_ident(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for (i, ch) in id.chars().enumerate() {
        if ch.is_ascii_alphabetic() || ch == '_' || ch == '-' || !ch.is_ascii() {
            out.push(ch);
        } else if ch.is_ascii_digit() {
            if i == 0 {
                out.push_str(&format!("\\3{} ", ch));
            } else {
                out.push(ch);
            }
        } else {
            out.push('\\');
            out.push(ch);
        }
    }
    out
}

const ACCESSIBILITY_RULES: &str = r#"
.cb-banner :focus-visible { outline: 2px solid currentColor; outline-offset: 2px; }
.cb-banner button:focus, .cb-banner a:focus, .cb-banner input:focus { outline: 2px solid #1d4ed8; outline-offset: 2px; }
@media (forced-colors: active) {
  .cb-banner { border: 1px solid CanvasText; }
  .cb-banner .cb-button { border: 1px solid ButtonText; forced-color-adjust: none; }
}
@media (prefers-reduced-motion: reduce) {
  .cb-banner, .cb-banner * { animation: none; transition: none; }
}
.cb-sr-only { position: absolute; width: 1px; height: 1px; padding: 0; margin: -1px; overflow: hidden; clip: rect(0,0,0,0); white-space: nowrap; border: 0; }
.cb-flex { display: flex; }
.cb-flex-col { display: flex; flex-direction: column; }
.cb-flex-wrap { flex-wrap: wrap; }
.cb-items-center { align-items: center; }
.cb-justify-between { justify-content: space-between; }
.cb-gap { gap: 8px; }
"#;

fn fade_keyframes(duration: u32) -> String {
    format!(
        "@keyframes cb-fade-in{{from{{opacity:0}}to{{opacity:1}}}}\
         @keyframes cb-fade-out{{from{{opacity:1}}to{{opacity:0}}}}\
         .cb-banner.cb-animate-in{{animation:cb-fade-in {d}ms ease-out both}}\
         .cb-banner.cb-animate-out{{animation:cb-fade-out {d}ms ease-in both}}",
        d = duration
    )
}

fn slide_keyframes(duration: u32) -> String {
    let mut css = String::new();
    for (name, from) in [
        ("top", "translateY(-100%)"),
        ("bottom", "translateY(100%)"),
        ("left", "translateX(-100%)"),
        ("right", "translateX(100%)"),
    ] {
        css.push_str(&format!(
            "@keyframes cb-slide-{name}{{from{{transform:{from};opacity:0}}to{{opacity:1}}}}"
        ));
    }
    for (position, direction) in [
        ("top", "top"),
        ("bottom", "bottom"),
        ("center", "bottom"),
        ("top-left", "left"),
        ("bottom-left", "left"),
        ("top-right", "right"),
        ("bottom-right", "right"),
    ] {
        css.push_str(&format!(
            ".cb-banner.cb-animate-in[data-position=\"{position}\"]{{animation:cb-slide-{direction} {duration}ms ease-out both}}\
             .cb-banner.cb-animate-out[data-position=\"{position}\"]{{animation:cb-slide-{direction} {duration}ms ease-in reverse both}}"
        ));
    }
    css
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::BannerTemplate;
    use serde_json::json;

    fn model(extra: serde_json::Value) -> BannerModel {
        let mut base = json!({
            "id": "b",
            "layout": {
                "desktop": { "type": "modal", "position": "center", "width": 600 },
                "tablet": { "type": "floating", "position": "bottom-right" },
                "mobile": { "type": "banner", "position": "bottom", "backgroundColor": "#000" }
            },
            "components": [
                { "id": "yes", "type": "button", "content": "OK", "action": { "type": "accept_all" },
                  "style": { "desktop": { "backgroundColor": "#0a0", "fontWeight": 700, "padding": 12 } },
                  "position": { "desktop": { "top": "10%", "left": "5px" }, "mobile": { "bottom": "0px" } } },
                { "id": "2nd", "type": "button", "content": "No", "action": { "type": "reject_all" } }
            ]
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        let template: BannerTemplate = serde_json::from_value(base).unwrap();
        BannerModel::from_template(&template).unwrap()
    }

    #[test]
    fn test_media_bands_present() {
        let css = StyleGenerator::generate(&model(json!({})));
        assert!(css.contains("@media (max-width:1024px) and (min-width:769px){.cb-banner[data-cb-root]{position:fixed;bottom:20px;right:20px"));
        assert!(css.contains("@media (max-width:768px){.cb-banner[data-cb-root]{position:fixed;bottom:0"));
        assert!(css.contains("transform:translate(-50%,-50%)"));
        assert!(css.contains("width:600px"));
    }

    #[test]
    fn test_component_rules() {
        let css = StyleGenerator::generate(&model(json!({})));
        assert!(css.contains(".cb-banner[data-cb-root] #yes{position:absolute;top:10%;left:5px;transition:position .3s ease"));
        assert!(css.contains("background-color:#0a0"));
        assert!(css.contains("font-weight:700"));
        assert!(css.contains("padding:12px"));
        assert!(css.contains("@media (max-width:768px){.cb-banner[data-cb-root] #yes{position:absolute;bottom:0px"));
    }

    #[test]
    fn test_component_selectors_scoped_to_banner_root() {
        let css = StyleGenerator::generate(&model(json!({})));
        let bare = css.match_indices("#yes{").filter(|(at, _)| !css[..*at].ends_with("[data-cb-root] ")).count();
        assert_eq!(bare, 0, "{css}");
        assert!(css.matches(".cb-banner[data-cb-root] #yes{").count() >= 2);
    }

    #[test]
    fn test_theme_defaults_when_absent() {
        let css = StyleGenerator::generate(&model(json!({})));
        assert!(css.contains("#2563eb"));
        assert!(css.contains("font-size:14px"));
    }

    #[test]
    fn test_keyframes_only_when_animated() {
        let none = StyleGenerator::generate(&model(json!({})));
        assert!(!none.contains("@keyframes"));

        let fade = StyleGenerator::generate(&model(json!({ "settings": { "animation": { "type": "fade", "duration": 250 } } })));
        assert!(fade.contains("@keyframes cb-fade-in"));
        assert!(fade.contains("250ms"));

        let slide = StyleGenerator::generate(&model(json!({ "theme": { "animation": { "type": "slide" } } })));
        assert_eq!(slide.matches("@keyframes cb-slide-").count(), 4);
        assert!(slide.contains("[data-position=\"top-left\"]"));
    }

    #[test]
    fn test_accessibility_rules_included() {
        let css = StyleGenerator::generate(&model(json!({})));
        assert!(css.contains("@media (forced-colors:active)"));
        assert!(css.contains(".cb-sr-only{"));
    }

    #[test]
    fn test_css_ident_escapes_leading_digit() {
        assert_eq!(css_ident("2nd"), "\\32 nd");
        assert_eq!(css_ident("a.b"), "a\\.b");
    }

    #[test]
    fn test_sanitize_blocks_injection() {
        assert_eq!(sanitize_value("red;}</style><script>"), "red/stylescript");
    }
}
