//! Entity store — the single source of truth for assets and graph nodes.
//!
//! All mutation goes through the store on the UI thread. Position updates
//! rebuild the node value instead of patching it in place so any consumer
//! holding the previous snapshot keeps seeing consistent data.

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;
use uuid::Uuid;

/// Fixed rendered width of a graph node, in world units.
pub const NODE_WIDTH: f32 = 320.0;
/// Vertical gap between a render node and its continuation child. Chosen to
/// clear a fully expanded node's typical rendered height.
pub const VERTICAL_SPACING: f32 = 480.0;
/// Horizontal gap between the roots of independent chains.
pub const CHAIN_SPACING: f32 = 420.0;
/// World position of the first root node.
pub const ORIGIN: (f32, f32) = (100.0, 100.0);

// ============================================================================
// DATA MODEL
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Video,
}

/// An imported reference asset. `pixels` is the decoded preview source;
/// video files are listed but never decoded. The on-screen preview handle
/// (an egui texture) lives in the texture cache and is dropped together
/// with the asset.
#[derive(Clone)]
pub struct Asset {
    pub id: Uuid,
    pub path: PathBuf,
    pub pixels: Option<Arc<RgbaImage>>,
    pub media: MediaType,
}

impl Asset {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled".to_string())
    }
}

/// Role of a node in the creative graph. Closed set: every dispatch site
/// matches exhaustively so a new variant cannot be silently mishandled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    /// A bare text instruction.
    Prompt,
    /// A bundle of reference assets.
    AssetGroup,
    /// A generated storyboard master (single frame or grid composite).
    /// Only renders participate in downstream continuation.
    Render,
    /// A single panel cut out of a grid composite.
    Slice,
}

impl NodeType {
    pub fn label(self) -> &'static str {
        match self {
            NodeType::Prompt => "PROMPT INPUT",
            NodeType::AssetGroup => "STYLE REFERENCES",
            NodeType::Render => "SCENE BOARD",
            NodeType::Slice => "PANEL SLICE",
        }
    }
}

/// A unit in the creative graph.
///
/// `image` is the primary display image; `full_grid` the higher-detail
/// master. Current producers set both to the same buffer (an `Arc` clone);
/// the distinction is kept for a future per-slice master vs. grid split.
#[derive(Clone)]
pub struct GraphNode {
    pub id: Uuid,
    pub node_type: NodeType,
    pub image: Option<Arc<RgbaImage>>,
    pub full_grid: Option<Arc<RgbaImage>>,
    /// Panel images when the node is a tiled composite: 1, 4 or 9 entries,
    /// row-major. Empty for single-frame and non-render nodes.
    pub slices: Vec<Arc<RgbaImage>>,
    /// The instruction that produced the node.
    pub prompt: String,
    /// Text payload (prompt nodes show it as the body; render nodes carry a
    /// copy of the generating prompt).
    pub text_data: String,
    /// Assets consumed as generation input, in priority order.
    pub asset_ids: Vec<Uuid>,
    /// Display aspect, `"W:H"`.
    pub aspect_ratio: String,
    /// Creation time (unix millis); display ordering / tie-break only.
    pub timestamp: u64,
    /// Lineage back-reference. At creation this always names a render node;
    /// the parent may be deleted later, leaving the reference dangling.
    pub parent_id: Option<Uuid>,
    /// World-space position. Assigned once at creation; mutated only by an
    /// explicit user drag.
    pub position: Option<(f32, f32)>,
    /// Short camera-movement annotation from the caption service.
    pub camera_description: Option<String>,
}

impl GraphNode {
    /// The image to hand to the generation service as the continuity
    /// context when this node is continued. Prefers the full-detail master.
    pub fn context_image(&self) -> Option<&Arc<RgbaImage>> {
        self.full_grid.as_ref().or(self.image.as_ref())
    }
}

// ============================================================================
// LINEAGE / PLACEMENT
// ============================================================================

/// Compute the world position for a node about to be created.
///
/// Continuations stack downward from their parent; unrelated chains grow
/// left-to-right along the baseline row. Horizontal position encodes "which
/// creative thread", vertical position "iteration depth within a thread".
pub fn place_new_node(parent: Option<&GraphNode>, nodes: &[GraphNode]) -> (f32, f32) {
    if let Some(p) = parent {
        // Parent position should always be set; tolerate the impossible.
        let (px, py) = p.position.unwrap_or((0.0, 0.0));
        return (px, py + VERTICAL_SPACING);
    }
    let last_root = nodes.iter().rev().find(|n| n.parent_id.is_none());
    match last_root {
        Some(root) => {
            let rx = root.position.map(|(x, _)| x).unwrap_or(ORIGIN.0);
            (rx + CHAIN_SPACING, ORIGIN.1)
        }
        None => ORIGIN,
    }
}

// ============================================================================
// SELECTION
// ============================================================================

/// Mutually exclusive selection between an asset and a graph node. The
/// selected render node doubles as the continuation parent for the next
/// generation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub asset: Option<Uuid>,
    pub node: Option<Uuid>,
}

impl Selection {
    pub fn select_asset(&mut self, id: Uuid) {
        self.asset = Some(id);
        self.node = None;
    }

    pub fn select_node(&mut self, id: Uuid) {
        self.node = Some(id);
        self.asset = None;
    }

    pub fn clear(&mut self) {
        self.asset = None;
        self.node = None;
    }

    pub fn is_empty(&self) -> bool {
        self.asset.is_none() && self.node.is_none()
    }
}

// ============================================================================
// STORE
// ============================================================================

/// In-memory collections, creation-ordered. Single writer (the UI thread);
/// everything is cleared on exit — graph persistence is out of scope.
#[derive(Default)]
pub struct Store {
    assets: Vec<Asset>,
    nodes: Vec<GraphNode>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- assets -------------------------------------------------------

    pub fn add_asset(&mut self, asset: Asset) {
        self.assets.push(asset);
    }

    pub fn remove_asset(&mut self, id: Uuid) {
        self.assets.retain(|a| a.id != id);
    }

    pub fn asset(&self, id: Uuid) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }

    pub fn list_assets(&self) -> &[Asset] {
        &self.assets
    }

    // ---- nodes --------------------------------------------------------

    pub fn add_node(&mut self, node: GraphNode) {
        self.nodes.push(node);
    }

    /// Remove a node. Children are left alone: their `parent_id` now
    /// dangles, which the edge collection treats as "no edge".
    pub fn remove_node(&mut self, id: Uuid) {
        self.nodes.retain(|n| n.id != id);
    }

    pub fn node(&self, id: Uuid) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn list_nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn render_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Render)
    }

    /// Replace only the position field, keeping identity and every other
    /// field intact. The node value is rebuilt rather than mutated so
    /// snapshot consumers see a consistent whole.
    pub fn update_node_position(&mut self, id: Uuid, x: f32, y: f32) {
        if let Some(slot) = self.nodes.iter_mut().find(|n| n.id == id) {
            let mut updated = slot.clone();
            updated.position = Some((x, y));
            *slot = updated;
        }
    }

    /// Replace only the camera annotation, analogous to
    /// [`Self::update_node_position`].
    pub fn set_camera_description(&mut self, id: Uuid, text: String) {
        if let Some(slot) = self.nodes.iter_mut().find(|n| n.id == id) {
            let mut updated = slot.clone();
            updated.camera_description = Some(text);
            *slot = updated;
        }
    }
}

#[cfg(test)]
pub(crate) fn test_node(node_type: NodeType, parent_id: Option<Uuid>) -> GraphNode {
    GraphNode {
        id: Uuid::new_v4(),
        node_type,
        image: None,
        full_grid: None,
        slices: Vec::new(),
        prompt: String::new(),
        text_data: String::new(),
        asset_ids: Vec::new(),
        aspect_ratio: "16:9".to_string(),
        timestamp: 0,
        parent_id,
        position: None,
        camera_description: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_placed(store: &mut Store, parent: Option<Uuid>) -> Uuid {
        let parent_node = parent.and_then(|id| store.node(id)).cloned();
        let pos = place_new_node(parent_node.as_ref(), store.list_nodes());
        let mut node = test_node(NodeType::Render, parent);
        node.position = Some(pos);
        let id = node.id;
        store.add_node(node);
        id
    }

    #[test]
    fn first_root_lands_at_origin() {
        let store = Store::new();
        assert_eq!(place_new_node(None, store.list_nodes()), (100.0, 100.0));
    }

    #[test]
    fn continuation_stacks_below_parent() {
        let mut store = Store::new();
        let a = add_placed(&mut store, None);
        let b = add_placed(&mut store, Some(a));
        assert_eq!(store.node(b).unwrap().position, Some((100.0, 580.0)));
    }

    #[test]
    fn new_chain_grows_right_of_last_root() {
        let mut store = Store::new();
        let a = add_placed(&mut store, None);
        // A continuation must not shift the chain baseline.
        add_placed(&mut store, Some(a));
        let c = add_placed(&mut store, None);
        assert_eq!(store.node(c).unwrap().position, Some((520.0, 100.0)));
    }

    #[test]
    fn unplaced_parent_falls_back_to_x_zero() {
        let parent = test_node(NodeType::Render, None);
        assert_eq!(place_new_node(Some(&parent), &[]), (0.0, 480.0));
    }

    #[test]
    fn deleting_parent_keeps_child_and_its_reference() {
        let mut store = Store::new();
        let a = add_placed(&mut store, None);
        let b = add_placed(&mut store, Some(a));
        store.remove_node(a);
        assert!(store.node(a).is_none());
        let child = store.node(b).expect("child must survive parent removal");
        assert_eq!(child.parent_id, Some(a));
    }

    #[test]
    fn position_update_preserves_everything_else() {
        let mut store = Store::new();
        let mut node = test_node(NodeType::Render, None);
        node.prompt = "wide shot of a harbor".to_string();
        node.position = Some((100.0, 100.0));
        let id = node.id;
        store.add_node(node);

        store.update_node_position(id, -40.0, 900.0);
        let n = store.node(id).unwrap();
        assert_eq!(n.position, Some((-40.0, 900.0)));
        assert_eq!(n.prompt, "wide shot of a harbor");
        assert_eq!(n.id, id);
    }

    #[test]
    fn selection_is_mutually_exclusive() {
        let mut sel = Selection::default();
        let asset = Uuid::new_v4();
        let node = Uuid::new_v4();

        sel.select_asset(asset);
        assert_eq!(sel.asset, Some(asset));
        assert_eq!(sel.node, None);

        sel.select_node(node);
        assert_eq!(sel.node, Some(node));
        assert_eq!(sel.asset, None);

        sel.select_asset(asset);
        assert_eq!(sel.asset, Some(asset));
        assert_eq!(sel.node, None);
    }

    #[test]
    fn scenario_create_continue_branch_delete() {
        let mut store = Store::new();
        let a = add_placed(&mut store, None);
        assert_eq!(store.node(a).unwrap().position, Some((100.0, 100.0)));

        let b = add_placed(&mut store, Some(a));
        assert_eq!(store.node(b).unwrap().position, Some((100.0, 580.0)));

        let c = add_placed(&mut store, None);
        assert_eq!(store.node(c).unwrap().position, Some((520.0, 100.0)));

        store.remove_node(a);
        assert_eq!(store.node(b).unwrap().parent_id, Some(a));
        assert_eq!(store.list_nodes().len(), 2);
    }
}
