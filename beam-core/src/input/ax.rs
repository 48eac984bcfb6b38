//! Abstract accessibility interface.
//!
//! The injector walks the target window's accessibility tree to press
//! elements and drive scroll bars without moving the cursor. The real
//! tree is a platform facility; [`MockAxTree`] is the in-memory
//! implementation used by tests and the loopback binaries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::BeamError;
use crate::types::Point;

/// Opaque element id within one tree.
pub type AxNodeId = u64;

/// Role string of scroll containers.
pub const ROLE_SCROLL_AREA: &str = "AXScrollArea";

// ── AxTree ───────────────────────────────────────────────────────

/// Read/write access to the target window's accessibility tree.
pub trait AxTree: Send {
    /// Root element of the target process's main window.
    fn window_root(&mut self, pid: i32) -> Result<AxNodeId, BeamError>;

    /// Role string of an element.
    fn role(&mut self, node: AxNodeId) -> Result<String, BeamError>;

    /// Child elements in order.
    fn children(&mut self, node: AxNodeId) -> Result<Vec<AxNodeId>, BeamError>;

    /// Press the element at a screen point without moving the cursor.
    fn press_at(&mut self, pid: i32, point: Point) -> Result<(), BeamError>;

    /// The vertical scroll bar of a scroll area, if it has one.
    fn vertical_scroll_bar(&mut self, scroll_area: AxNodeId)
        -> Result<Option<AxNodeId>, BeamError>;

    /// Current value of a scroll bar in `[0, 1]`.
    fn value(&mut self, node: AxNodeId) -> Result<f64, BeamError>;

    /// Set a scroll bar value.
    fn set_value(&mut self, node: AxNodeId, value: f64) -> Result<(), BeamError>;
}

/// Depth-first search for the first scroll area, bounded by
/// `max_depth` levels below the window root.
pub fn find_scroll_area(
    tree: &mut dyn AxTree,
    pid: i32,
    max_depth: usize,
) -> Option<AxNodeId> {
    let root = tree.window_root(pid).ok()?;
    dfs(tree, root, 0, max_depth)
}

fn dfs(
    tree: &mut dyn AxTree,
    node: AxNodeId,
    depth: usize,
    max_depth: usize,
) -> Option<AxNodeId> {
    if depth > max_depth {
        return None;
    }
    if tree.role(node).ok()? == ROLE_SCROLL_AREA {
        return Some(node);
    }
    for child in tree.children(node).ok()? {
        if let Some(found) = dfs(tree, child, depth + 1, max_depth) {
            return Some(found);
        }
    }
    None
}

// ── MockAxTree ───────────────────────────────────────────────────

/// In-memory accessibility tree for tests and loopback runs.
///
/// Values and presses live behind shared handles so a test can keep
/// observing after the tree moves into an injector.
#[derive(Default)]
pub struct MockAxTree {
    nodes: HashMap<AxNodeId, MockNode>,
    root: Option<AxNodeId>,
    next_id: AxNodeId,
    values: Arc<Mutex<HashMap<AxNodeId, f64>>>,
    presses: Arc<Mutex<Vec<Point>>>,
    /// When set, `press_at` fails (simulates a denied AX permission).
    pub fail_presses: bool,
}

struct MockNode {
    role: String,
    children: Vec<AxNodeId>,
    scroll_bar: Option<AxNodeId>,
}

impl MockAxTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; the first node added becomes the window root.
    pub fn add_node(&mut self, role: &str, parent: Option<AxNodeId>) -> AxNodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            MockNode {
                role: role.to_string(),
                children: Vec::new(),
                scroll_bar: None,
            },
        );
        if let Some(parent) = parent {
            if let Some(node) = self.nodes.get_mut(&parent) {
                node.children.push(id);
            }
        }
        if self.root.is_none() {
            self.root = Some(id);
        }
        id
    }

    /// Attach a vertical scroll bar with an initial value to a node.
    pub fn attach_scroll_bar(&mut self, area: AxNodeId, value: f64) -> AxNodeId {
        let bar = self.add_node("AXScrollBar", None);
        self.values.lock().unwrap().insert(bar, value);
        if let Some(node) = self.nodes.get_mut(&area) {
            node.scroll_bar = Some(bar);
        }
        bar
    }

    /// Shared view of scroll values (survives moving the tree).
    pub fn values_handle(&self) -> Arc<Mutex<HashMap<AxNodeId, f64>>> {
        Arc::clone(&self.values)
    }

    /// Shared log of successful presses.
    pub fn presses_handle(&self) -> Arc<Mutex<Vec<Point>>> {
        Arc::clone(&self.presses)
    }

    /// Current value of a node (test inspection).
    pub fn node_value(&self, node: AxNodeId) -> f64 {
        self.values
            .lock()
            .unwrap()
            .get(&node)
            .copied()
            .unwrap_or(f64::NAN)
    }
}

impl AxTree for MockAxTree {
    fn window_root(&mut self, pid: i32) -> Result<AxNodeId, BeamError> {
        self.root.ok_or(BeamError::WindowNotFound { pid })
    }

    fn role(&mut self, node: AxNodeId) -> Result<String, BeamError> {
        self.nodes
            .get(&node)
            .map(|n| n.role.clone())
            .ok_or_else(|| BeamError::Accessibility("unknown element".into()))
    }

    fn children(&mut self, node: AxNodeId) -> Result<Vec<AxNodeId>, BeamError> {
        self.nodes
            .get(&node)
            .map(|n| n.children.clone())
            .ok_or_else(|| BeamError::Accessibility("unknown element".into()))
    }

    fn press_at(&mut self, _pid: i32, point: Point) -> Result<(), BeamError> {
        if self.fail_presses {
            return Err(BeamError::Accessibility("press denied".into()));
        }
        self.presses.lock().unwrap().push(point);
        Ok(())
    }

    fn vertical_scroll_bar(
        &mut self,
        scroll_area: AxNodeId,
    ) -> Result<Option<AxNodeId>, BeamError> {
        Ok(self.nodes.get(&scroll_area).and_then(|n| n.scroll_bar))
    }

    fn value(&mut self, node: AxNodeId) -> Result<f64, BeamError> {
        self.values
            .lock()
            .unwrap()
            .get(&node)
            .copied()
            .ok_or_else(|| BeamError::Accessibility("unknown element".into()))
    }

    fn set_value(&mut self, node: AxNodeId, value: f64) -> Result<(), BeamError> {
        match self.values.lock().unwrap().get_mut(&node) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(BeamError::Accessibility("unknown element".into())),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dfs_finds_first_scroll_area() {
        let mut tree = MockAxTree::new();
        let root = tree.add_node("AXWindow", None);
        let group = tree.add_node("AXGroup", Some(root));
        let _toolbar = tree.add_node("AXToolbar", Some(root));
        let area = tree.add_node(ROLE_SCROLL_AREA, Some(group));
        let _second = tree.add_node(ROLE_SCROLL_AREA, Some(root));

        assert_eq!(find_scroll_area(&mut tree, 1, 5), Some(area));
    }

    #[test]
    fn dfs_respects_depth_limit() {
        let mut tree = MockAxTree::new();
        let mut parent = tree.add_node("AXWindow", None);
        for _ in 0..6 {
            parent = tree.add_node("AXGroup", Some(parent));
        }
        tree.add_node(ROLE_SCROLL_AREA, Some(parent));

        assert_eq!(find_scroll_area(&mut tree, 1, 5), None);

        let mut shallow = MockAxTree::new();
        let mut parent = shallow.add_node("AXWindow", None);
        for _ in 0..4 {
            parent = shallow.add_node("AXGroup", Some(parent));
        }
        let area = shallow.add_node(ROLE_SCROLL_AREA, Some(parent));
        assert_eq!(find_scroll_area(&mut shallow, 1, 5), Some(area));
    }

    #[test]
    fn empty_tree_has_no_scroll_area() {
        let mut tree = MockAxTree::new();
        assert_eq!(find_scroll_area(&mut tree, 1, 5), None);
    }

    #[test]
    fn scroll_bar_value_roundtrip() {
        let mut tree = MockAxTree::new();
        let root = tree.add_node("AXWindow", None);
        let area = tree.add_node(ROLE_SCROLL_AREA, Some(root));
        let bar = tree.attach_scroll_bar(area, 0.25);

        assert_eq!(tree.value(bar).unwrap(), 0.25);
        tree.set_value(bar, 0.75).unwrap();
        assert_eq!(tree.node_value(bar), 0.75);
    }
}
