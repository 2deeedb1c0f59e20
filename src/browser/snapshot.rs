//! Accessibility tree extraction and projection.
//!
//! The raw CDP accessibility tree is flattened into a nested role/name tree,
//! then projected into the response shape: interactive nodes get short element
//! references (`e1`, `e2`, ...) that are recorded in the owning tab's element
//! index for later click/type targeting.

use chromiumoxide::cdp::browser_protocol::accessibility::{AxNode, AxValue};
use std::collections::HashMap;

use super::tab::ElementIndex;

/// Roles that accept element references. Interaction targets (form controls,
/// navigation) plus document-structure and text/media roles that pages commonly
/// make clickable. Fixed closed list, matched case-insensitively.
const INTERACTIVE_ROLES: &[&str] = &[
    // Form controls
    "button",
    "link",
    "textbox",
    "checkbox",
    "radio",
    "combobox",
    "menuitem",
    "tab",
    "switch",
    "searchbox",
    // Navigation
    "navigation",
    "menubar",
    "menu",
    "menuitemcheckbox",
    "menuitemradio",
    "option",
    "progressbar",
    "scrollbar",
    "slider",
    "spinbutton",
    "tablist",
    "tabpanel",
    // Document structure
    "heading",
    "article",
    "section",
    "banner",
    "complementary",
    "contentinfo",
    "form",
    "main",
    "region",
    "search",
    // Text/media
    "paragraph",
    "listitem",
    "img",
    "figure",
];

/// Accessibility tree node in the response shape.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityNode {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<AccessibilityNode>>,
}

/// Intermediate node shape decoupled from the CDP types.
#[derive(Debug, Clone, Default)]
pub struct RawAxNode {
    pub role: Option<String>,
    pub name: Option<String>,
    pub children: Vec<RawAxNode>,
}

fn ax_value_str(value: Option<&AxValue>) -> Option<String> {
    value?
        .value
        .as_ref()?
        .as_str()
        .map(String::from)
}

/// Rebuild the nested tree from the flat node list returned by
/// `Accessibility.getFullAXTree`. The root is the first node in the list;
/// children are resolved through `child_ids`. Ignored nodes are hoisted so
/// their children take their place, which matches the "interesting nodes only"
/// tree the engine's snapshot API exposes.
pub fn build_raw_tree(nodes: &[AxNode]) -> Option<RawAxNode> {
    let by_id: HashMap<&str, &AxNode> = nodes
        .iter()
        .map(|n| (n.node_id.inner().as_str(), n))
        .collect();

    let root = nodes.first()?;
    adapt(root, &by_id).into_iter().next()
}

fn adapt(node: &AxNode, by_id: &HashMap<&str, &AxNode>) -> Vec<RawAxNode> {
    let children: Vec<RawAxNode> = node
        .child_ids
        .iter()
        .flatten()
        .filter_map(|id| by_id.get(id.inner().as_str()))
        .flat_map(|child| adapt(child, by_id))
        .collect();

    if node.ignored {
        return children;
    }

    vec![RawAxNode {
        role: ax_value_str(node.role.as_ref()),
        name: ax_value_str(node.name.as_ref()),
        children,
    }]
}

fn is_interactive(role: &str) -> bool {
    let role = role.to_ascii_lowercase();
    INTERACTIVE_ROLES.contains(&role.as_str())
}

/// Project a raw accessibility node into the response tree, assigning element
/// references for interactive nodes and recording their selectors in `index`.
///
/// Reference numbering follows depth-first pre-order over the snapshot and
/// continues from wherever the index currently stands, so repeated snapshots
/// of the same page keep counting up until navigation resets the index.
pub fn project(node: &RawAxNode, index: &mut ElementIndex) -> AccessibilityNode {
    let role = node.role.clone().unwrap_or_else(|| "generic".to_string());
    let name = node.name.clone();

    let element_ref = match name.as_deref() {
        Some(n) if !n.is_empty() && is_interactive(&role) => Some(index.assign(n)),
        _ => None,
    };

    let children: Vec<AccessibilityNode> = node
        .children
        .iter()
        .map(|child| project(child, index))
        .collect();

    AccessibilityNode {
        role,
        name,
        element_ref,
        children: if children.is_empty() {
            None
        } else {
            Some(children)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(role: &str, name: &str) -> RawAxNode {
        RawAxNode {
            role: Some(role.to_string()),
            name: Some(name.to_string()),
            children: Vec::new(),
        }
    }

    fn with_children(role: &str, name: Option<&str>, children: Vec<RawAxNode>) -> RawAxNode {
        RawAxNode {
            role: Some(role.to_string()),
            name: name.map(String::from),
            children,
        }
    }

    #[test]
    fn test_role_defaults_to_generic() {
        let mut index = ElementIndex::default();
        let out = project(&RawAxNode::default(), &mut index);
        assert_eq!(out.role, "generic");
        assert_eq!(out.name, None);
        assert_eq!(out.element_ref, None);
        assert_eq!(out.children, None);
    }

    #[test]
    fn test_non_interactive_nodes_get_no_refs() {
        let tree = with_children(
            "WebArea",
            Some("Example Domain"),
            vec![
                named("StaticText", "some text"),
                with_children("generic", None, vec![named("group", "grouped")]),
            ],
        );

        let mut index = ElementIndex::default();
        let out = project(&tree, &mut index);

        assert_eq!(out.element_ref, None);
        let children = out.children.expect("children present");
        assert!(children.iter().all(|c| c.element_ref.is_none()));
        assert!(index.known_refs().is_empty());
    }

    #[test]
    fn test_unnamed_interactive_node_gets_no_ref() {
        let mut index = ElementIndex::default();
        let out = project(
            &with_children("button", None, vec![]),
            &mut index,
        );
        assert_eq!(out.element_ref, None);

        let out = project(&named("button", ""), &mut index);
        assert_eq!(out.element_ref, None);
        assert!(index.known_refs().is_empty());
    }

    #[test]
    fn test_refs_assigned_in_preorder() {
        // document
        //   heading "Example Domain"
        //   paragraph "This domain ..."
        //     link "More information..."
        //   link "Footer"
        let tree = with_children(
            "document",
            Some("Example Domain"),
            vec![
                named("heading", "Example Domain"),
                with_children(
                    "paragraph",
                    Some("This domain ..."),
                    vec![named("link", "More information...")],
                ),
                named("link", "Footer"),
            ],
        );

        let mut index = ElementIndex::default();
        let out = project(&tree, &mut index);

        // document is not in the interactive set; the rest are, in pre-order
        assert_eq!(out.element_ref, None);
        let children = out.children.expect("children");
        assert_eq!(children[0].element_ref.as_deref(), Some("e1"));
        assert_eq!(children[1].element_ref.as_deref(), Some("e2"));
        assert_eq!(
            children[1].children.as_ref().expect("nested")[0]
                .element_ref
                .as_deref(),
            Some("e3")
        );
        assert_eq!(children[2].element_ref.as_deref(), Some("e4"));

        assert_eq!(index.known_refs(), vec!["e1", "e2", "e3", "e4"]);
        assert_eq!(index.resolve("e3"), Some("text=\"More information...\""));
    }

    #[test]
    fn test_role_match_is_case_insensitive() {
        let mut index = ElementIndex::default();
        let out = project(&named("Button", "OK"), &mut index);
        assert_eq!(out.element_ref.as_deref(), Some("e1"));
    }

    #[test]
    fn test_counter_continues_across_snapshots() {
        let mut index = ElementIndex::default();
        project(&named("link", "first page"), &mut index);
        let out = project(&named("link", "second snapshot"), &mut index);
        assert_eq!(out.element_ref.as_deref(), Some("e2"));
    }

    #[test]
    fn test_children_omitted_when_empty() {
        let mut index = ElementIndex::default();
        let out = project(&named("link", "Home"), &mut index);
        assert_eq!(out.children, None);
    }

    #[test]
    fn test_serialization_shape() {
        let node = AccessibilityNode {
            role: "link".to_string(),
            name: Some("More".to_string()),
            element_ref: Some("e1".to_string()),
            children: None,
        };
        let json = serde_json::to_value(&node).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({ "role": "link", "name": "More", "elementRef": "e1" })
        );
    }
}
