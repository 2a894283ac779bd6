//! Typed Banner Model
//!
//! Built exactly once, after validation, from the wire template. Components
//! live in a flat arena with explicit parent/child links; nothing downstream
//! recurses over user-controlled depth.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::templates::{
    Animation, BannerTemplate, Component, Content, CssValue, Device, DeviceLayout, PerDevice,
    PositionBox, Settings, StyleMap, Theme,
};

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Unknown component type '{kind}' on component '{id}'")]
    UnknownComponentType { id: String, kind: String },

    #[error("Unknown action type '{kind}' on component '{id}'")]
    UnknownActionType { id: String, kind: String },

    #[error("Unknown layout type '{0}'")]
    UnknownLayoutType(String),

    #[error("Unknown layout position '{0}'")]
    UnknownLayoutPosition(String),

    #[error("Layout is missing a desktop block")]
    MissingDesktopLayout,
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(()),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(ComponentKind {
    Text => "text",
    Button => "button",
    Link => "link",
    Logo => "logo",
    Checkbox => "checkbox",
    Toggle => "toggle",
    Container => "container",
    Panel => "panel",
    Image => "image",
});

string_enum!(ActionKind {
    AcceptAll => "accept_all",
    RejectAll => "reject_all",
    SavePreferences => "save_preferences",
    ShowPreferences => "show_preferences",
    Close => "close",
    None => "none",
    Custom => "custom",
});

string_enum!(LayoutType {
    Modal => "modal",
    Banner => "banner",
    Floating => "floating",
});

string_enum!(LayoutPosition {
    Top => "top",
    Bottom => "bottom",
    Center => "center",
    TopLeft => "top-left",
    TopRight => "top-right",
    BottomLeft => "bottom-left",
    BottomRight => "bottom-right",
});

impl ComponentKind {
    /// Types whose text is shown to the visitor and must be present.
    pub fn is_text_bearing(&self) -> bool {
        matches!(self, ComponentKind::Text | ComponentKind::Button | ComponentKind::Link)
    }

    pub fn has_children(&self) -> bool {
        matches!(self, ComponentKind::Container | ComponentKind::Panel)
    }
}

impl ActionKind {
    /// Actions that render without visible text (an icon close button).
    pub fn bypasses_text(&self) -> bool {
        matches!(self, ActionKind::Close)
    }

    /// Actions that record a consent decision.
    pub fn is_decision(&self) -> bool {
        matches!(
            self,
            ActionKind::AcceptAll
                | ActionKind::RejectAll
                | ActionKind::SavePreferences
                | ActionKind::Close
        )
    }
}

impl LayoutPosition {
    pub fn is_top(&self) -> bool {
        matches!(
            self,
            LayoutPosition::Top | LayoutPosition::TopLeft | LayoutPosition::TopRight
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLayout {
    pub kind: LayoutType,
    pub position: LayoutPosition,
    pub width: Option<CssValue>,
    pub height: Option<CssValue>,
    pub background_color: Option<String>,
}

impl ResolvedLayout {
    fn from_wire(layout: &DeviceLayout) -> Result<Self, ModelError> {
        let kind = layout
            .kind
            .parse()
            .map_err(|_| ModelError::UnknownLayoutType(layout.kind.clone()))?;
        let position = layout
            .position
            .parse()
            .map_err(|_| ModelError::UnknownLayoutPosition(layout.position.clone()))?;
        Ok(Self {
            kind,
            position,
            width: layout.width.clone(),
            height: layout.height.clone(),
            background_color: layout.background_color.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct ComponentNode {
    pub id: String,
    pub kind: ComponentKind,
    pub content: Option<Content>,
    pub action: ActionKind,
    pub action_url: Option<String>,
    pub style: PerDevice<StyleMap>,
    pub position: PerDevice<PositionBox>,
    pub href: Option<String>,
    pub src: Option<String>,
    pub alt: Option<String>,
    pub category: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Roots sit at depth 1.
    pub depth: usize,
}

impl ComponentNode {
    pub fn text(&self, language: &str) -> &str {
        self.content
            .as_ref()
            .and_then(|c| c.resolve(language))
            .unwrap_or("")
    }
}

/// One step of a depth-first walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Enter(NodeId),
    Exit(NodeId),
}

#[derive(Debug, Clone, Default)]
pub struct ComponentTree {
    nodes: Vec<ComponentNode>,
    roots: Vec<NodeId>,
    by_id: HashMap<String, NodeId>,
}

impl ComponentTree {
    /// Flatten the wire forest breadth-first. Parents always precede their
    /// children in the arena.
    pub fn build(components: &[Component]) -> Result<Self, ModelError> {
        let mut tree = ComponentTree::default();
        let mut queue: VecDeque<(Option<NodeId>, &Component, usize)> =
            components.iter().map(|c| (None, c, 1)).collect();

        while let Some((parent, component, depth)) = queue.pop_front() {
            let kind = component.kind.parse().map_err(|_| ModelError::UnknownComponentType {
                id: component.id.clone(),
                kind: component.kind.clone(),
            })?;
            let action = match &component.action {
                Some(action) => action.kind.parse().map_err(|_| ModelError::UnknownActionType {
                    id: component.id.clone(),
                    kind: action.kind.clone(),
                })?,
                None => ActionKind::None,
            };

            let node_id = NodeId(tree.nodes.len());
            tree.nodes.push(ComponentNode {
                id: component.id.clone(),
                kind,
                content: component.content.clone(),
                action,
                action_url: component.action.as_ref().and_then(|a| a.url.clone()),
                style: component.style.clone(),
                position: component.position.clone(),
                href: component.href.clone(),
                src: component.src.clone(),
                alt: component.alt.clone(),
                category: component.category.clone(),
                parent,
                children: Vec::with_capacity(component.children.len()),
                depth,
            });
            tree.by_id.entry(component.id.clone()).or_insert(node_id);

            match parent {
                Some(parent_id) => tree.nodes[parent_id.0].children.push(node_id),
                None => tree.roots.push(node_id),
            }

            queue.extend(component.children.iter().map(|c| (Some(node_id), c, depth + 1)));
        }

        Ok(tree)
    }

    pub fn node(&self, id: NodeId) -> &ComponentNode {
        &self.nodes[id.0]
    }

    pub fn find(&self, component_id: &str) -> Option<&ComponentNode> {
        self.by_id.get(component_id).map(|id| self.node(*id))
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &ComponentNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Depth-first walk yielding enter/exit markers in document order.
    pub fn walk(&self) -> Walk<'_> {
        let stack = self.roots.iter().rev().map(|id| Visit::Enter(*id)).collect();
        Walk { tree: self, stack }
    }

    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    pub fn has_action(&self, action: ActionKind) -> bool {
        self.nodes.iter().any(|n| n.action == action)
    }
}

pub struct Walk<'a> {
    tree: &'a ComponentTree,
    stack: Vec<Visit>,
}

impl Iterator for Walk<'_> {
    type Item = Visit;

    fn next(&mut self) -> Option<Visit> {
        let visit = self.stack.pop()?;
        if let Visit::Enter(id) = visit {
            self.stack.push(Visit::Exit(id));
            let children = &self.tree.node(id).children;
            self.stack.extend(children.iter().rev().map(|c| Visit::Enter(*c)));
        }
        Some(visit)
    }
}

#[derive(Debug, Clone)]
pub struct DeviceLayouts {
    pub desktop: ResolvedLayout,
    pub tablet: Option<ResolvedLayout>,
    pub mobile: Option<ResolvedLayout>,
}

impl DeviceLayouts {
    pub fn get(&self, device: Device) -> Option<&ResolvedLayout> {
        match device {
            Device::Desktop => Some(&self.desktop),
            Device::Tablet => self.tablet.as_ref(),
            Device::Mobile => self.mobile.as_ref(),
        }
    }
}

/// The validated, typed banner every generator consumes.
#[derive(Debug, Clone)]
pub struct BannerModel {
    pub id: String,
    pub layout: DeviceLayouts,
    pub tree: ComponentTree,
    pub theme: Theme,
    pub settings: Settings,
    pub animation: Animation,
}

impl BannerModel {
    pub fn from_template(template: &BannerTemplate) -> Result<Self, ModelError> {
        let resolve = |layout: Option<&DeviceLayout>| {
            layout.map(ResolvedLayout::from_wire).transpose()
        };
        let desktop = resolve(template.layout.desktop.as_ref())?
            .ok_or(ModelError::MissingDesktopLayout)?;

        Ok(Self {
            id: template.id.clone(),
            layout: DeviceLayouts {
                desktop,
                tablet: resolve(template.layout.tablet.as_ref())?,
                mobile: resolve(template.layout.mobile.as_ref())?,
            },
            tree: ComponentTree::build(&template.components)?,
            theme: template.theme.clone().unwrap_or_default(),
            settings: template.settings.clone(),
            animation: template.animation(),
        })
    }

    pub fn layout_type(&self) -> LayoutType {
        self.layout.desktop.kind
    }
}
