//! Preferences-Panel Generator
//!
//! A static settings panel, themed by palette and localized through a
//! language → key → text override map. It does not look at the component
//! tree.

use std::collections::BTreeMap;

use crate::consent::{Category, PURPOSES};
use crate::markup::{collapse_whitespace, escape_attr, escape_text};
use crate::templates::{Theme, VendorEntry};

/// Built-in English texts, keyed by the override keys authors may use.
const DEFAULT_TEXTS: &[(&str, &str)] = &[
    ("title", "Privacy preferences"),
    ("description", "Choose which categories of cookies and data processing you allow. You can change these settings at any time."),
    ("tab_general", "General"),
    ("tab_vendors", "Vendors"),
    ("tab_purposes", "Purposes"),
    ("necessary", "Strictly necessary"),
    ("necessary_description", "Required for the website to work. Always active."),
    ("preferences", "Preferences"),
    ("preferences_description", "Remember your settings and personalise content."),
    ("analytics", "Analytics"),
    ("analytics_description", "Help us understand how the website is used."),
    ("marketing", "Marketing"),
    ("marketing_description", "Show relevant advertising on this and other websites."),
    ("vendors_empty", "No third-party vendors are configured."),
    ("accept_all", "Accept all"),
    ("reject_all", "Reject all"),
    ("save", "Save preferences"),
    ("close", "Close"),
];

/// Used when the panel stage fails. Decisions only, no tabs.
pub const FALLBACK_PANEL: &str = concat!(
    r#"<div class="cb-preferences" data-cb-panel role="dialog" aria-modal="true" aria-label="Privacy preferences" hidden style="background:#fff;color:#222">"#,
    r#"<div class="cb-pref-actions">"#,
    r#"<button type="button" class="cb-button" data-action="reject_all">Reject all</button>"#,
    r#"<button type="button" class="cb-button" data-action="accept_all">Accept all</button>"#,
    r#"<button type="button" class="cb-button" data-action="close_preferences">Close</button>"#,
    "</div></div>"
);

#[derive(Debug, Clone)]
pub struct PanelPalette {
    pub primary: String,
    pub background: String,
    pub text: String,
    pub border: String,
}

impl PanelPalette {
    pub fn from_theme(theme: &Theme) -> Self {
        let colors = &theme.colors;
        let pick = |c: &Option<String>, d: &str| {
            c.as_deref()
                .map(crate::style::sanitize_value)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| d.to_string())
        };
        Self {
            primary: pick(&colors.primary, "#2563eb"),
            background: pick(&colors.background, "#ffffff"),
            text: pick(&colors.text, "#1f2937"),
            border: pick(&colors.secondary, "#e5e7eb"),
        }
    }
}

impl Default for PanelPalette {
    fn default() -> Self {
        Self::from_theme(&Theme::default())
    }
}

pub struct PreferencesPanel<'a> {
    palette: PanelPalette,
    overrides: &'a BTreeMap<String, BTreeMap<String, String>>,
    vendors: &'a [VendorEntry],
}

impl<'a> PreferencesPanel<'a> {
    pub fn new(
        palette: PanelPalette,
        overrides: &'a BTreeMap<String, BTreeMap<String, String>>,
        vendors: &'a [VendorEntry],
    ) -> Self {
        Self { palette, overrides, vendors }
    }

    /// Requested language override, then English override, then built-in.
    fn text(&self, language: &str, key: &str) -> String {
        let lookup = |lang: &str| self.overrides.get(lang).and_then(|m| m.get(key)).cloned();
        lookup(language)
            .or_else(|| lookup("en"))
            .or_else(|| {
                DEFAULT_TEXTS
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v.to_string())
            })
            .unwrap_or_default()
    }

    pub fn generate(&self, language: &str) -> String {
        let t = |key: &str| escape_text(&self.text(language, key));
        let p = &self.palette;

        let mut html = format!(
            r#"<div class="cb-preferences" data-cb-panel role="dialog" aria-modal="true" aria-labelledby="cb-pref-title" hidden style="background:{bg};color:{fg};border:1px solid {border}">
  <div class="cb-pref-header">
    <h2 id="cb-pref-title">{title}</h2>
    <button type="button" class="cb-pref-close" data-action="close_preferences" aria-label="{close}">&times;</button>
  </div>
  <div class="cb-pref-tabs" role="tablist">
    <button type="button" role="tab" class="cb-tab cb-tab--active" data-tab="general" aria-selected="true">{tab_general}</button>
    <button type="button" role="tab" class="cb-tab" data-tab="purposes" aria-selected="false">{tab_purposes}</button>
    <button type="button" role="tab" class="cb-tab" data-tab="vendors" aria-selected="false">{tab_vendors}</button>
  </div>
  <div class="cb-tab-panel" data-tab-panel="general" role="tabpanel">
    <p class="cb-pref-description">{description}</p>"#,
            bg = p.background,
            fg = p.text,
            border = p.border,
            title = t("title"),
            close = escape_attr(&self.text(language, "close")),
            tab_general = t("tab_general"),
            tab_purposes = t("tab_purposes"),
            tab_vendors = t("tab_vendors"),
            description = t("description"),
        );

        for category in Category::ALL {
            let key = category.as_str();
            let locked = *category == Category::Necessary;
            html.push_str(&format!(
                r#"
    <div class="cb-category">
      <label class="cb-toggle">
        <input type="checkbox" role="switch" data-category="{key}"{state} style="accent-color:{primary}">
        <span class="cb-toggle-slider" aria-hidden="true"></span>
        <span class="cb-label">{label}</span>
      </label>
      <p class="cb-category-description">{description}</p>
    </div>"#,
                key = key,
                state = if locked { " checked disabled" } else { "" },
                primary = p.primary,
                label = t(key),
                description = t(&format!("{}_description", key)),
            ));
        }

        html.push_str(
            r#"
  </div>
  <div class="cb-tab-panel" data-tab-panel="purposes" role="tabpanel" hidden>
    <ul class="cb-purpose-list">"#,
        );
        for purpose in PURPOSES {
            let locked = purpose.category == Category::Necessary;
            html.push_str(&format!(
                r#"
      <li><label><input type="checkbox" data-purpose="{id}"{state}> <span>{name}</span></label></li>"#,
                id = purpose.id,
                state = if locked { " checked disabled" } else { "" },
                name = escape_text(purpose.name),
            ));
        }
        html.push_str(
            r#"
    </ul>
  </div>
  <div class="cb-tab-panel" data-tab-panel="vendors" role="tabpanel" hidden>"#,
        );
        if self.vendors.is_empty() {
            html.push_str(&format!(r#"<p class="cb-vendors-empty">{}</p>"#, t("vendors_empty")));
        } else {
            html.push_str(r#"<ul class="cb-vendor-list">"#);
            for vendor in self.vendors {
                html.push_str(&format!(
                    r#"<li><label><input type="checkbox" data-vendor="{}" checked> <span>{}</span></label></li>"#,
                    vendor.id,
                    escape_text(&vendor.name),
                ));
            }
            html.push_str("</ul>");
        }

        html.push_str(&format!(
            r#"
  </div>
  <div class="cb-pref-actions">
    <button type="button" class="cb-button cb-button--secondary" data-action="reject_all">{reject}</button>
    <button type="button" class="cb-button cb-button--secondary" data-action="save_preferences">{save}</button>
    <button type="button" class="cb-button cb-button--primary" data-action="accept_all" style="background:{primary};border-color:{primary}">{accept}</button>
  </div>
</div>"#,
            reject = t("reject_all"),
            save = t("save"),
            accept = t("accept_all"),
            primary = p.primary,
        ));

        collapse_whitespace(&html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides() -> BTreeMap<String, BTreeMap<String, String>> {
        let mut de = BTreeMap::new();
        de.insert("title".to_string(), "Datenschutz-Einstellungen".to_string());
        de.insert("save".to_string(), "Auswahl speichern".to_string());
        let mut en = BTreeMap::new();
        en.insert("accept_all".to_string(), "Allow everything".to_string());
        let mut map = BTreeMap::new();
        map.insert("de".to_string(), de);
        map.insert("en".to_string(), en);
        map
    }

    #[test]
    fn test_has_tabs_and_actions() {
        let overrides = BTreeMap::new();
        let html = PreferencesPanel::new(PanelPalette::default(), &overrides, &[]).generate("en");
        for tab in ["general", "purposes", "vendors"] {
            assert!(html.contains(&format!(r#"data-tab-panel="{}""#, tab)));
        }
        for action in ["accept_all", "reject_all", "save_preferences", "close_preferences"] {
            assert!(html.contains(&format!(r#"data-action="{}""#, action)), "{}", action);
        }
        assert!(html.contains(r#"data-category="necessary" checked disabled"#));
        assert!(html.contains("No third-party vendors are configured."));
    }

    #[test]
    fn test_language_overrides_fall_back() {
        let overrides = overrides();
        let html = PreferencesPanel::new(PanelPalette::default(), &overrides, &[]).generate("de");
        assert!(html.contains("Datenschutz-Einstellungen"));
        assert!(html.contains("Auswahl speichern"));
        assert!(html.contains("Allow everything"));
        assert!(html.contains("Reject all"));
    }

    #[test]
    fn test_palette_applied() {
        let overrides = BTreeMap::new();
        let palette = PanelPalette {
            primary: "#ff0066".to_string(),
            ..PanelPalette::default()
        };
        let html = PreferencesPanel::new(palette, &overrides, &[]).generate("en");
        assert!(html.contains("accent-color:#ff0066"));
    }

    #[test]
    fn test_vendor_list() {
        let overrides = BTreeMap::new();
        let vendors = vec![VendorEntry { id: 755, name: "Ads & Co".to_string(), purposes: vec![1, 2] }];
        let html = PreferencesPanel::new(PanelPalette::default(), &overrides, &vendors).generate("en");
        assert!(html.contains(r#"data-vendor="755""#));
        assert!(html.contains("Ads &amp; Co"));
    }
}
