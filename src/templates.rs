//! Banner Templates - Wire Contracts
//!
//! The shapes an external collaborator hands us. Everything here is loosely
//! typed on purpose (strings for enums, numbers or strings for CSS values) so
//! the validator can report every problem at once. Typed views live in
//! [`crate::tree`].

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

pub type TemplateId = String;

pub const DEFAULT_BANNER_ID: &str = "consent-banner";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerTemplate {
    #[serde(default = "default_banner_id")]
    pub id: TemplateId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub layout: PerDevice<DeviceLayout>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub theme: Option<Theme>,
    #[serde(default)]
    pub settings: Settings,
}

fn default_banner_id() -> String {
    DEFAULT_BANNER_ID.to_string()
}

impl BannerTemplate {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Animation settings win over the theme's, which win over "none".
    pub fn animation(&self) -> Animation {
        self.settings
            .animation
            .clone()
            .or_else(|| self.theme.as_ref().and_then(|t| t.animation.clone()))
            .unwrap_or_default()
    }
}

/// Something keyed by device class. Only `desktop` is structurally expected;
/// the validator decides which blocks are mandatory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct PerDevice<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desktop: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tablet: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<T>,
}

impl<T> Default for PerDevice<T> {
    fn default() -> Self {
        Self {
            desktop: None,
            tablet: None,
            mobile: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Desktop,
    Tablet,
    Mobile,
}

impl Device {
    pub const ALL: [Device; 3] = [Device::Desktop, Device::Tablet, Device::Mobile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Desktop => "desktop",
            Device::Tablet => "tablet",
            Device::Mobile => "mobile",
        }
    }

    /// Lookup order when a device has no entry of its own.
    pub fn fallback_chain(&self) -> &'static [Device] {
        match self {
            Device::Mobile => &[Device::Mobile, Device::Tablet, Device::Desktop],
            Device::Tablet => &[Device::Tablet, Device::Desktop],
            Device::Desktop => &[Device::Desktop],
        }
    }
}

impl<T> PerDevice<T> {
    pub fn get(&self, device: Device) -> Option<&T> {
        match device {
            Device::Desktop => self.desktop.as_ref(),
            Device::Tablet => self.tablet.as_ref(),
            Device::Mobile => self.mobile.as_ref(),
        }
    }

    pub fn get_mut(&mut self, device: Device) -> Option<&mut T> {
        match device {
            Device::Desktop => self.desktop.as_mut(),
            Device::Tablet => self.tablet.as_mut(),
            Device::Mobile => self.mobile.as_mut(),
        }
    }

    /// First entry along the device's fallback chain.
    pub fn resolve(&self, device: Device) -> Option<&T> {
        device
            .fallback_chain()
            .iter()
            .find_map(|candidate| self.get(*candidate))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Device, &T)> {
        Device::ALL
            .into_iter()
            .filter_map(move |device| self.get(device).map(|value| (device, value)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLayout {
    #[serde(rename = "type")]
    pub kind: String,
    pub position: String,
    #[serde(default)]
    pub width: Option<CssValue>,
    #[serde(default)]
    pub height: Option<CssValue>,
    #[serde(default)]
    pub background_color: Option<String>,
}

/// A CSS-ish scalar: authors write both `10` and `"10px"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CssValue {
    Number(f64),
    Text(String),
}

impl CssValue {
    /// Render with `unit` appended to bare numbers.
    pub fn to_css(&self, unit: &str) -> String {
        match self {
            CssValue::Number(n) => format!("{}{}", format_number(*n), unit),
            CssValue::Text(s) => s.trim().to_string(),
        }
    }

    /// Position normal form: bare numbers become percentages.
    pub fn normalized_position(&self) -> CssValue {
        match self {
            CssValue::Number(n) => CssValue::Text(format!("{}%", format_number(*n))),
            CssValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.ends_with('%') || trimmed.ends_with("px") {
                    CssValue::Text(trimmed.to_string())
                } else if let Ok(n) = trimmed.parse::<f64>() {
                    CssValue::Text(format!("{}%", format_number(n)))
                } else {
                    CssValue::Text(trimmed.to_string())
                }
            }
        }
    }
}

/// `10.0` prints as `10`, `12.5` as `12.5`.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PositionBox {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<CssValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<CssValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<CssValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<CssValue>,
}

impl PositionBox {
    pub fn edges(&self) -> [(&'static str, Option<&CssValue>); 4] {
        [
            ("top", self.top.as_ref()),
            ("left", self.left.as_ref()),
            ("right", self.right.as_ref()),
            ("bottom", self.bottom.as_ref()),
        ]
    }

    fn edges_mut(&mut self) -> [&mut Option<CssValue>; 4] {
        [
            &mut self.top,
            &mut self.left,
            &mut self.right,
            &mut self.bottom,
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.edges().iter().all(|(_, v)| v.is_none())
    }
}

pub type StyleMap = BTreeMap<String, CssValue>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default)]
    pub style: PerDevice<StyleMap>,
    #[serde(default)]
    pub position: PerDevice<PositionBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Component>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Component {
    pub fn action_type(&self) -> Option<&str> {
        self.action.as_ref().map(|a| a.kind.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Component text: a plain string or a language map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Plain(String),
    Localized { texts: LocalizedText },
}

impl Content {
    /// Requested language, then `en`, then the first language declared.
    pub fn resolve(&self, language: &str) -> Option<&str> {
        match self {
            Content::Plain(text) => Some(text.as_str()),
            Content::Localized { texts } => texts
                .get(language)
                .or_else(|| texts.get("en"))
                .or_else(|| texts.first()),
        }
    }

    pub fn all_texts(&self) -> Vec<(&str, &str)> {
        match self {
            Content::Plain(text) => vec![("", text.as_str())],
            Content::Localized { texts } => texts.iter().collect(),
        }
    }
}

/// Language → text, in the order the author wrote them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizedText(Vec<(String, String)>);

impl LocalizedText {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, language: impl Into<String>, text: impl Into<String>) {
        let language = language.into();
        let text = text.into();
        match self.0.iter_mut().find(|(lang, _)| *lang == language) {
            Some(entry) => entry.1 = text,
            None => self.0.push((language, text)),
        }
    }

    pub fn get(&self, language: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(lang, _)| lang == language)
            .map(|(_, text)| text.as_str())
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(|(_, text)| text.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(l, t)| (l.as_str(), t.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<L: Into<String>, T: Into<String>> FromIterator<(L, T)> for LocalizedText {
    fn from_iter<I: IntoIterator<Item = (L, T)>>(iter: I) -> Self {
        let mut texts = LocalizedText::new();
        for (language, text) in iter {
            texts.insert(language, text);
        }
        texts
    }
}

impl Serialize for LocalizedText {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(l, t)| (l, t)))
    }
}

impl<'de> Deserialize<'de> for LocalizedText {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedTexts;

        impl<'de> Visitor<'de> for OrderedTexts {
            type Value = LocalizedText;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of language code to text")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut texts = LocalizedText::new();
                while let Some((language, text)) = map.next_entry::<String, String>()? {
                    texts.insert(language, text);
                }
                Ok(texts)
            }
        }

        deserializer.deserialize_map(OrderedTexts)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    #[serde(default)]
    pub colors: ThemeColors,
    #[serde(default)]
    pub fonts: ThemeFonts,
    #[serde(default)]
    pub spacing: Option<f64>,
    #[serde(default)]
    pub animation: Option<Animation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeColors {
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub background: Option<String>,
    pub text: Option<String>,
    pub accent: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeFonts {
    pub primary: Option<String>,
    pub size: Option<CssValue>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationType {
    Fade,
    Slide,
    #[default]
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Animation {
    #[serde(rename = "type", default)]
    pub kind: AnimationType,
    #[serde(default = "default_animation_duration")]
    pub duration: u32,
}

fn default_animation_duration() -> u32 { 300 }

impl Default for Animation {
    fn default() -> Self {
        Self {
            kind: AnimationType::None,
            duration: default_animation_duration(),
        }
    }
}

fn default_true() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_true")]
    pub overlay: bool,
    #[serde(default = "default_true")]
    pub close_button: bool,
    #[serde(default)]
    pub animation: Option<Animation>,
    #[serde(default)]
    pub behaviour: Behaviour,
    #[serde(default)]
    pub responsive: Breakpoints,
    #[serde(default)]
    pub panel_texts: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub vendors: Vec<VendorEntry>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            overlay: true,
            close_button: true,
            animation: None,
            behaviour: Behaviour::default(),
            responsive: Breakpoints::default(),
            panel_texts: BTreeMap::new(),
            vendors: vec![],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Behaviour {
    #[serde(default)]
    pub auto_hide: AutoHide,
    #[serde(default)]
    pub reshow: Reshow,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoHide {
    #[serde(default)]
    pub enabled: bool,
    /// Milliseconds.
    #[serde(default = "default_auto_hide_delay")]
    pub delay: u64,
}

fn default_auto_hide_delay() -> u64 { 10_000 }

impl Default for AutoHide {
    fn default() -> Self {
        Self {
            enabled: false,
            delay: default_auto_hide_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reshow {
    #[serde(default)]
    pub enabled: bool,
    /// Days.
    #[serde(default = "default_reshow_interval")]
    pub interval: f64,
}

fn default_reshow_interval() -> f64 { 180.0 }

impl Default for Reshow {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_reshow_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoints {
    #[serde(default = "default_mobile_breakpoint")]
    pub mobile: u32,
    #[serde(default = "default_tablet_breakpoint")]
    pub tablet: u32,
}

fn default_mobile_breakpoint() -> u32 { 768 }
fn default_tablet_breakpoint() -> u32 { 1024 }

impl Default for Breakpoints {
    fn default() -> Self {
        Self {
            mobile: default_mobile_breakpoint(),
            tablet: default_tablet_breakpoint(),
        }
    }
}

impl Breakpoints {
    pub fn device_for_width(&self, width: u32) -> Device {
        if width <= self.mobile {
            Device::Mobile
        } else if width <= self.tablet {
            Device::Tablet
        } else {
            Device::Desktop
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VendorEntry {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub purposes: Vec<u32>,
}

/// Bring every position value to its normal form (`"10%"`, `"12px"`).
///
/// Idempotent. Walks the forest with an explicit stack.
pub fn normalize_positions(components: &mut [Component]) {
    let mut stack: Vec<&mut Component> = components.iter_mut().collect();
    while let Some(component) = stack.pop() {
        let Component {
            position, children, ..
        } = component;
        for device in Device::ALL {
            if let Some(bx) = position.get_mut(device) {
                for edge in bx.edges_mut() {
                    if let Some(value) = edge.as_mut() {
                        *value = value.normalized_position();
                    }
                }
            }
        }
        stack.extend(children.iter_mut());
    }
}
