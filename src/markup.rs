//! Markup Generator
//!
//! Component tree → a single banner root element. Output is whitespace
//! collapsed between tags only; text nodes are never touched.

use crate::tree::{ActionKind, BannerModel, ComponentKind, ComponentNode, LayoutType, Visit};

/// Attribute that marks the one banner root element.
pub const ROOT_MARKER: &str = "data-cb-root";

/// Shown when the template has no components at all, or when markup
/// generation fails. Always has exactly one root and both decisions.
pub const FALLBACK_MARKUP: &str = concat!(
    r#"<div class="cb-banner cb-banner--fallback" data-cb-root role="dialog" aria-live="polite" aria-label="Cookie consent">"#,
    r#"<p class="cb-text">This website uses cookies to improve your experience.</p>"#,
    r#"<div class="cb-actions">"#,
    r#"<button type="button" class="cb-button cb-button--primary" data-action="accept_all">Accept all</button>"#,
    r#"<button type="button" class="cb-button cb-button--secondary" data-action="reject_all">Reject all</button>"#,
    r#"</div></div>"#
);

pub struct MarkupGenerator<'a> {
    language: &'a str,
}

impl<'a> MarkupGenerator<'a> {
    pub fn new(language: &'a str) -> Self {
        Self { language }
    }

    pub fn generate(&self, model: &BannerModel) -> String {
        let tree = &model.tree;
        if tree.roots().is_empty() {
            tracing::debug!(banner = %model.id, "no components, emitting fallback markup");
            return FALLBACK_MARKUP.to_string();
        }

        let layout = &model.layout.desktop;
        let mut html = format!(
            r#"<div id="{id}" class="cb-banner cb-{kind}" {marker} data-position="{position}" role="dialog"{modal} aria-live="polite" aria-label="Cookie consent">"#,
            id = escape_attr(&model.id),
            kind = layout.kind,
            marker = ROOT_MARKER,
            position = layout.position,
            modal = if layout.kind == LayoutType::Modal { r#" aria-modal="true""# } else { "" },
        );

        if model.settings.close_button && !tree.has_action(ActionKind::Close) {
            html.push_str(r#"<button type="button" class="cb-close" data-action="close" aria-label="Close">&times;</button>"#);
        }

        for visit in tree.walk() {
            match visit {
                Visit::Enter(id) => self.open(&mut html, tree.node(id)),
                Visit::Exit(id) => close(&mut html, tree.node(id)),
            }
        }

        html.push_str("</div>");
        collapse_whitespace(&html)
    }

    fn open(&self, html: &mut String, node: &ComponentNode) {
        let text = escape_text(node.text(self.language));
        let common = common_attrs(node);

        match node.kind {
            ComponentKind::Text => {
                html.push_str(&format!("<p {}>{}", common, text));
            }
            ComponentKind::Button => {
                let label = if text.is_empty() && node.action == ActionKind::Close {
                    r#"<span aria-hidden="true">&times;</span><span class="cb-sr-only">Close</span>"#.to_string()
                } else {
                    text
                };
                html.push_str(&format!(r#"<button type="button" {}>{}"#, common, label));
            }
            ComponentKind::Link => {
                let href = node.href.as_deref().or(node.action_url.as_deref()).unwrap_or("#");
                html.push_str(&format!(
                    r#"<a {} href="{}" target="_blank" rel="noopener noreferrer">{}"#,
                    common,
                    escape_attr(href),
                    text
                ));
            }
            ComponentKind::Logo | ComponentKind::Image => {
                html.push_str(&format!(
                    r#"<img {} src="{}" alt="{}" loading="lazy">"#,
                    common,
                    escape_attr(node.src.as_deref().unwrap_or("")),
                    escape_attr(node.alt.as_deref().unwrap_or("")),
                ));
            }
            ComponentKind::Checkbox | ComponentKind::Toggle => {
                let category = escape_attr(node.category.as_deref().unwrap_or(&node.id));
                let necessary = category == "necessary";
                let switch = if node.kind == ComponentKind::Toggle { r#" role="switch""# } else { "" };
                html.push_str(&format!(
                    r#"<label {}><input type="checkbox" data-category="{}"{}{}>"#,
                    common,
                    category,
                    switch,
                    if necessary { " checked disabled" } else { "" },
                ));
                if node.kind == ComponentKind::Toggle {
                    html.push_str(r#"<span class="cb-toggle-slider" aria-hidden="true"></span>"#);
                }
                html.push_str(&format!(r#"<span class="cb-label">{}</span>"#, text));
            }
            ComponentKind::Container | ComponentKind::Panel => {
                html.push_str(&format!("<div {}>", common));
            }
        }
    }
}

fn close(html: &mut String, node: &ComponentNode) {
    let tag = match node.kind {
        ComponentKind::Text => "</p>",
        ComponentKind::Button => "</button>",
        ComponentKind::Link => "</a>",
        ComponentKind::Logo | ComponentKind::Image => "",
        ComponentKind::Checkbox | ComponentKind::Toggle => "</label>",
        ComponentKind::Container | ComponentKind::Panel => "</div>",
    };
    html.push_str(tag);
}

fn common_attrs(node: &ComponentNode) -> String {
    let mut attrs = format!(
        r#"id="{}" class="cb-component cb-{}" data-component-id="{}""#,
        escape_attr(&node.id),
        node.kind,
        escape_attr(&node.id),
    );
    if node.action != ActionKind::None {
        attrs.push_str(&format!(r#" data-action="{}""#, node.action));
    }
    if let (ActionKind::Custom, Some(url)) = (node.action, node.action_url.as_deref()) {
        attrs.push_str(&format!(r#" data-action-url="{}""#, escape_attr(url)));
    }
    attrs
}

/// Occurrences of attribute `name` on elements of `html`. Text nodes and
/// quoted attribute values are skipped.
pub fn attribute_count(html: &str, name: &str) -> usize {
    let mut count = 0;
    let mut chars = html.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '<' {
            continue;
        }
        let mut token = String::new();
        let mut first = true;
        while let Some(ch) = chars.next() {
            match ch {
                '"' | '\'' => {
                    for inner in chars.by_ref() {
                        if inner == ch {
                            break;
                        }
                    }
                }
                c if c.is_whitespace() || c == '=' || c == '>' || c == '/' => {
                    if !first && token == name {
                        count += 1;
                    }
                    if !token.is_empty() {
                        first = false;
                    }
                    token.clear();
                    if c == '>' {
                        break;
                    }
                }
                c => token.push(c),
            }
        }
    }
    count
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_attr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '`' => out.push_str("&#96;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Collapse whitespace inside tags and drop whitespace-only runs between
/// tags. Text content and quoted attribute values pass through untouched.
pub fn collapse_whitespace(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut quote: Option<char> = None;
    let mut pending_text = String::new();
    let mut pending_space = false;

    for ch in html.chars() {
        if in_tag {
            if let Some(q) = quote {
                out.push(ch);
                if ch == q {
                    quote = None;
                }
                continue;
            }
            match ch {
                '"' | '\'' => {
                    flush_space(&mut out, &mut pending_space);
                    quote = Some(ch);
                    out.push(ch);
                }
                '>' => {
                    pending_space = false;
                    in_tag = false;
                    out.push(ch);
                }
                c if c.is_whitespace() => pending_space = true,
                c => {
                    flush_space(&mut out, &mut pending_space);
                    out.push(c);
                }
            }
        } else if ch == '<' {
            if !pending_text.trim().is_empty() {
                out.push_str(&pending_text);
            }
            pending_text.clear();
            in_tag = true;
            out.push(ch);
        } else {
            pending_text.push(ch);
        }
    }
    if !pending_text.trim().is_empty() {
        out.push_str(&pending_text);
    }
    out
}

fn flush_space(out: &mut String, pending: &mut bool) {
    if *pending && !out.ends_with('<') && !out.ends_with('=') {
        out.push(' ');
    }
    *pending = false;
}
