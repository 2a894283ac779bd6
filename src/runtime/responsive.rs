//! Responsive repositioning.
//!
//! The script gets a serialized view of the tree with CSS-ready values and
//! re-applies it on resize. Resolution walks mobile → tablet → desktop and
//! skips empty entries, same as the script does.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::style::{css_property_name, css_property_value, sanitize_value};
use crate::templates::{Breakpoints, Device, PerDevice, PositionBox, StyleMap};
use crate::tree::{ActionKind, ComponentNode, ComponentTree};

/// What the script knows about one component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeComponent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<&'static str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub position: BTreeMap<&'static str, BTreeMap<&'static str, String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub style: BTreeMap<&'static str, BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RuntimeComponent>,
}

fn position_css(bx: &PositionBox) -> BTreeMap<&'static str, String> {
    bx.edges()
        .into_iter()
        .filter_map(|(edge, value)| value.map(|v| (edge, sanitize_value(&v.to_css("%")))))
        .collect()
}

fn style_css(style: &StyleMap) -> BTreeMap<String, String> {
    style
        .iter()
        .filter_map(|(name, value)| {
            let property = css_property_name(name);
            let value = css_property_value(&property, value);
            (!property.is_empty() && !value.is_empty()).then_some((property, value))
        })
        .collect()
}

fn view(node: &ComponentNode, children: Vec<RuntimeComponent>) -> RuntimeComponent {
    let mut position = BTreeMap::new();
    let mut style = BTreeMap::new();
    for device in Device::ALL {
        if let Some(bx) = node.position.get(device).filter(|b| !b.is_empty()) {
            position.insert(device.as_str(), position_css(bx));
        }
        if let Some(map) = node.style.get(device).map(style_css).filter(|m| !m.is_empty()) {
            style.insert(device.as_str(), map);
        }
    }
    RuntimeComponent {
        id: node.id.clone(),
        kind: node.kind.as_str(),
        action: (node.action != ActionKind::None).then(|| node.action.as_str()),
        position,
        style,
        children,
    }
}

/// Build the nested view bottom-up. Parents precede children in the arena,
/// so walking it backwards always finds children already built.
pub fn runtime_components(tree: &ComponentTree) -> Vec<RuntimeComponent> {
    let mut built: Vec<Option<RuntimeComponent>> = vec![None; tree.len()];
    let nodes: Vec<_> = tree.nodes().collect();
    for (id, node) in nodes.into_iter().rev() {
        let children = node
            .children
            .iter()
            .filter_map(|child| built[child.index()].take())
            .collect();
        built[id.index()] = Some(view(node, children));
    }
    tree.roots()
        .iter()
        .filter_map(|root| built[root.index()].take())
        .collect()
}

fn resolve_non_empty<T>(per: &PerDevice<T>, device: Device, empty: impl Fn(&T) -> bool) -> Option<&T> {
    device
        .fallback_chain()
        .iter()
        .find_map(|candidate| per.get(*candidate).filter(|value| !empty(value)))
}

/// Effective inline placement of one component at a viewport width.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub id: String,
    pub device: Device,
    pub position: BTreeMap<&'static str, String>,
    pub style: BTreeMap<String, String>,
}

pub fn placements(tree: &ComponentTree, breakpoints: &Breakpoints, width: u32) -> Vec<Placement> {
    let device = breakpoints.device_for_width(width);
    tree.nodes()
        .map(|(_, node)| Placement {
            id: node.id.clone(),
            device,
            position: resolve_non_empty(&node.position, device, PositionBox::is_empty)
                .map(position_css)
                .unwrap_or_default(),
            style: resolve_non_empty(&node.style, device, StyleMap::is_empty)
                .map(style_css)
                .unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::Component;
    use serde_json::json;

    fn tree() -> ComponentTree {
        let components: Vec<Component> = serde_json::from_value(json!([
            { "id": "box", "type": "container",
              "position": { "desktop": { "top": "10%", "left": "5%" }, "tablet": {} },
              "style": { "desktop": { "backgroundColor": "#fff", "padding": 12 }, "mobile": { "padding": 4 } },
              "children": [
                { "id": "ok", "type": "button", "content": "OK", "action": { "type": "accept_all" } },
                { "id": "no", "type": "button", "content": "No", "action": { "type": "reject_all" } }
              ] }
        ]))
        .unwrap();
        ComponentTree::build(&components).unwrap()
    }

    #[test]
    fn test_view_is_nested_in_order() {
        let view = runtime_components(&tree());
        assert_eq!(view.len(), 1);
        let root = &view[0];
        assert_eq!(root.kind, "container");
        assert_eq!(root.action, None);
        let ids: Vec<_> = root.children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["ok", "no"]);
        assert_eq!(root.children[0].action, Some("accept_all"));
        assert_eq!(root.style["desktop"]["background-color"], "#fff");
        assert_eq!(root.style["desktop"]["padding"], "12px");
        assert!(!root.position.contains_key("tablet"));
    }

    #[test]
    fn test_fallback_chain_skips_empty_entries() {
        let tree = tree();
        let breakpoints = Breakpoints::default();

        let tablet = placements(&tree, &breakpoints, 900);
        assert_eq!(tablet[0].device, Device::Tablet);
        assert_eq!(tablet[0].position["top"], "10%");
        assert_eq!(tablet[0].style["padding"], "12px");

        let mobile = placements(&tree, &breakpoints, 375);
        assert_eq!(mobile[0].style["padding"], "4px");
        assert_eq!(mobile[0].position["left"], "5%");
    }
}
