//! The canvas — an infinite pan/zoom node-graph surface plus the flat grid
//! and table presentations of the same store.
//!
//! World space is the zoom-independent coordinate system nodes live in;
//! screen space is pixels inside the canvas rect. The two are related by
//! the viewport's pan offset and scale. Connector curves, node rects and
//! port positions are all derived per frame and never stored.

use std::collections::HashMap;

use egui::{
    Align2, Color32, CursorIcon, FontId, Pos2, Rect, Rounding, Sense, Stroke, Vec2,
    epaint::CubicBezierShape,
};
use uuid::Uuid;

use crate::store::{GraphNode, NODE_WIDTH, NodeType, Selection, Store};
use crate::textures::{TexKey, TextureCache};

/// Connector fallback when a parent's height has not been measured yet.
pub const DEFAULT_NODE_HEIGHT: f32 = 200.0;

const MIN_SCALE: f32 = 0.2;
const MAX_SCALE: f32 = 3.0;
const ZOOM_SENSITIVITY: f32 = 0.001;

// Palette (near-black chrome with a lime accent).
const ACCENT: Color32 = Color32::from_rgb(201, 255, 86);
const CANVAS_BG: Color32 = Color32::from_rgb(5, 5, 5);
const NODE_BG: Color32 = Color32::from_rgb(12, 12, 14);
const NODE_BORDER: Color32 = Color32::from_rgb(39, 39, 42);
const NODE_BORDER_HOVER: Color32 = Color32::from_rgb(82, 82, 91);
const TEXT_DIM: Color32 = Color32::from_rgb(113, 113, 122);
const TEXT_BODY: Color32 = Color32::from_rgb(212, 212, 216);
const EDGE_BASE: Color32 = Color32::from_rgb(51, 51, 51);
const PANEL_BG: Color32 = Color32::from_rgb(24, 24, 27);

// ============================================================================
// VIEWPORT
// ============================================================================

/// Pan/zoom state of the workflow view, in canvas-local coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub pan: Vec2,
    pub scale: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan: Vec2::new(100.0, 100.0),
            scale: 1.0,
        }
    }
}

impl Viewport {
    pub fn world_to_screen(&self, world: Pos2) -> Pos2 {
        Pos2::new(
            self.pan.x + world.x * self.scale,
            self.pan.y + world.y * self.scale,
        )
    }

    pub fn screen_to_world(&self, screen: Pos2) -> Pos2 {
        Pos2::new(
            (screen.x - self.pan.x) / self.scale,
            (screen.y - self.pan.y) / self.scale,
        )
    }

    /// Canvas pan: screen-space deltas apply directly.
    pub fn pan_by(&mut self, delta: Vec2) {
        self.pan += delta;
    }

    /// Node drag: convert a screen-space delta to world space.
    pub fn drag_world_delta(&self, delta: Vec2) -> Vec2 {
        delta / self.scale
    }

    /// Zoom anchored at `cursor` (canvas-local): the world point under the
    /// cursor stays under the cursor. `delta_y` follows wheel semantics —
    /// positive scrolls away / zooms out.
    pub fn zoom_at(&mut self, cursor: Pos2, delta_y: f32) {
        let new_scale = (self.scale - delta_y * ZOOM_SENSITIVITY).clamp(MIN_SCALE, MAX_SCALE);
        let world = self.screen_to_world(cursor);
        self.pan = Vec2::new(
            cursor.x - world.x * new_scale,
            cursor.y - world.y * new_scale,
        );
        self.scale = new_scale;
    }
}

// ============================================================================
// NODE HEIGHT TRACKER
// ============================================================================

/// Last rendered height per node, in world units. Ephemeral view state —
/// heights feed the connector geometry and nothing else, and identical
/// observations are dropped so measurement can never feed a repaint loop.
#[derive(Default)]
pub struct HeightTracker {
    heights: HashMap<Uuid, f32>,
}

impl HeightTracker {
    /// Record a measured height. Returns true only when the stored value
    /// actually changed.
    pub fn observe(&mut self, id: Uuid, height: f32) -> bool {
        match self.heights.get(&id) {
            Some(prev) if (prev - height).abs() < 0.5 => false,
            _ => {
                self.heights.insert(id, height);
                true
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Option<f32> {
        self.heights.get(&id).copied()
    }

    /// Forget nodes that left the store.
    pub fn prune(&mut self, store: &Store) {
        self.heights.retain(|id, _| store.node(*id).is_some());
    }
}

// ============================================================================
// CONNECTOR GEOMETRY
// ============================================================================

/// Control points of the parent→child connector, in world space: an
/// S-curve that leaves the parent's bottom-center straight down and arrives
/// at the child's top-center straight from above, whatever the horizontal
/// offset.
pub fn connector_points(
    parent_pos: (f32, f32),
    parent_height: Option<f32>,
    child_pos: (f32, f32),
) -> [Pos2; 4] {
    let h = parent_height.unwrap_or(DEFAULT_NODE_HEIGHT);
    let start = Pos2::new(parent_pos.0 + NODE_WIDTH / 2.0, parent_pos.1 + h);
    let end = Pos2::new(child_pos.0 + NODE_WIDTH / 2.0, child_pos.1);
    let offset = ((end.y - start.y).abs() * 0.5).max(50.0);
    [
        start,
        Pos2::new(start.x, start.y + offset),
        Pos2::new(end.x, end.y - offset),
        end,
    ]
}

/// Lineage edges to draw: `(parent_id, child_id)` for every node whose
/// parent still exists and where both ends are positioned. A dangling
/// `parent_id` simply yields no edge.
pub fn collect_edges(store: &Store) -> Vec<(Uuid, Uuid)> {
    store
        .list_nodes()
        .iter()
        .filter_map(|node| {
            let parent_id = node.parent_id?;
            let parent = store.node(parent_id)?;
            if parent.position.is_some() && node.position.is_some() {
                Some((parent_id, node.id))
            } else {
                None
            }
        })
        .collect()
}

// ============================================================================
// VIEW STATE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewMode {
    Workflow,
    Grid,
    Table,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
enum Gesture {
    #[default]
    None,
    Pan,
    DragNode(Uuid),
}

/// What the canvas asks the app to do; the canvas itself only ever writes
/// positions (drag) and its own view state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CanvasAction {
    SelectNode(Uuid),
    DeleteNode(Uuid),
    ExportAll,
}

/// Screen-space hit regions of one painted node, used to dispatch the next
/// frame's pointer events (immediate mode: paint this frame, hit-test with
/// last frame's rects).
struct NodeHit {
    id: Uuid,
    rect: Rect,
    delete_rect: Rect,
    collapse_rect: Option<Rect>,
    slice_rects: Vec<(usize, Rect)>,
}

pub struct CanvasView {
    pub mode: ViewMode,
    pub viewport: Viewport,
    pub heights: HeightTracker,
    gesture: Gesture,
    hits: Vec<NodeHit>,
    /// Per-node expanded slice index (workflow view).
    expanded_slice: HashMap<Uuid, usize>,
    /// Node open in the grid/table detail overlay.
    pub detail_node: Option<Uuid>,
    detail_slice: Option<usize>,
}

impl Default for CanvasView {
    fn default() -> Self {
        Self {
            mode: ViewMode::Workflow,
            viewport: Viewport::default(),
            heights: HeightTracker::default(),
            gesture: Gesture::None,
            hits: Vec::new(),
            expanded_slice: HashMap::new(),
            detail_node: None,
            detail_slice: None,
        }
    }
}

impl CanvasView {
    /// Render the central canvas area and return the actions the user took.
    pub fn show(
        &mut self,
        ui: &mut egui::Ui,
        store: &mut Store,
        selection: &Selection,
        textures: &mut TextureCache,
    ) -> Vec<CanvasAction> {
        let mut actions = Vec::new();

        self.heights.prune(store);
        self.expanded_slice
            .retain(|id, idx| store.node(*id).map(|n| *idx < n.slices.len()).unwrap_or(false));
        if let Some(id) = self.detail_node
            && store.node(id).is_none()
        {
            self.detail_node = None;
            self.detail_slice = None;
        }

        self.toolbar(ui, store, &mut actions);

        let canvas_rect = ui.available_rect_before_wrap();
        if store.list_nodes().is_empty() && store.list_assets().is_empty() {
            self.empty_state(ui, canvas_rect);
            return actions;
        }

        match self.mode {
            ViewMode::Workflow => {
                self.show_workflow(ui, canvas_rect, store, selection, textures, &mut actions);
            }
            ViewMode::Grid | ViewMode::Table => {
                self.show_flat(ui, store, selection, textures, &mut actions);
                if self.detail_node.is_some() {
                    self.show_detail_overlay(ui, canvas_rect, store, textures);
                }
            }
        }
        actions
    }

    fn toolbar(&mut self, ui: &mut egui::Ui, store: &Store, actions: &mut Vec<CanvasAction>) {
        ui.horizontal(|ui| {
            let renders = store.render_nodes().count();
            ui.label(
                egui::RichText::new(format!("CANVAS / {} TASKS", renders))
                    .monospace()
                    .size(10.0)
                    .color(TEXT_DIM),
            );
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if !store.list_nodes().is_empty()
                    && ui
                        .button(egui::RichText::new("Download ZIP").size(10.0))
                        .clicked()
                {
                    actions.push(CanvasAction::ExportAll);
                }
                ui.separator();
                for (mode, label) in [
                    (ViewMode::Table, "Table"),
                    (ViewMode::Grid, "Grid"),
                    (ViewMode::Workflow, "Node Graph"),
                ] {
                    if ui
                        .selectable_label(self.mode == mode, egui::RichText::new(label).size(10.0))
                        .clicked()
                    {
                        self.mode = mode;
                        // Leaving grid/table closes the overlay.
                        if mode == ViewMode::Workflow {
                            self.detail_node = None;
                            self.detail_slice = None;
                        }
                    }
                }
            });
        });
        ui.separator();
    }

    fn empty_state(&self, ui: &mut egui::Ui, rect: Rect) {
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, Rounding::ZERO, CANVAS_BG);
        let center = rect.center();
        painter.text(
            center - Vec2::new(0.0, 30.0),
            Align2::CENTER_CENTER,
            "CineBoard",
            FontId::proportional(26.0),
            Color32::WHITE,
        );
        painter.text(
            center + Vec2::new(0.0, 8.0),
            Align2::CENTER_CENTER,
            "Import reference stills, write a directive, and generate a storyboard master.",
            FontId::proportional(13.0),
            TEXT_DIM,
        );
        painter.text(
            center + Vec2::new(0.0, 30.0),
            Align2::CENTER_CENTER,
            "Continuing a selected scene board chains a new node below it.",
            FontId::proportional(13.0),
            TEXT_DIM,
        );
    }

    // ------------------------------------------------------------------
    // WORKFLOW (node graph)
    // ------------------------------------------------------------------

    fn show_workflow(
        &mut self,
        ui: &mut egui::Ui,
        canvas_rect: Rect,
        store: &mut Store,
        selection: &Selection,
        textures: &mut TextureCache,
        actions: &mut Vec<CanvasAction>,
    ) {
        let response = ui.allocate_rect(canvas_rect, Sense::click_and_drag());
        let painter = ui.painter_at(canvas_rect);
        painter.rect_filled(canvas_rect, Rounding::ZERO, CANVAS_BG);
        self.paint_dot_grid(&painter, canvas_rect);

        // --- Zoom (wheel, workflow only, anchored at the cursor) ---
        if response.hovered() {
            let scroll = ui.input(|i| i.scroll_delta.y);
            if scroll != 0.0
                && let Some(pos) = ui.input(|i| i.pointer.hover_pos())
            {
                let local = pos - canvas_rect.min.to_vec2();
                // egui wheel-up is +y; wheel deltas here use scroll-down = +.
                self.viewport.zoom_at(local, -scroll);
            }
        }

        // --- Gestures (hit-test against last frame's node rects) ---
        if response.drag_started()
            && let Some(pos) = response.interact_pointer_pos()
        {
            match self.hit_node(pos) {
                Some(id) => {
                    self.gesture = Gesture::DragNode(id);
                    actions.push(CanvasAction::SelectNode(id));
                }
                None => self.gesture = Gesture::Pan,
            }
        }
        if response.dragged() {
            let delta = response.drag_delta();
            match self.gesture {
                Gesture::Pan => self.viewport.pan_by(delta),
                Gesture::DragNode(id) => {
                    let world_delta = self.viewport.drag_world_delta(delta);
                    if let Some((x, y)) = store.node(id).and_then(|n| n.position) {
                        store.update_node_position(id, x + world_delta.x, y + world_delta.y);
                    }
                }
                Gesture::None => {}
            }
        }
        let pointer_left = ui
            .input(|i| i.pointer.hover_pos())
            .map(|p| !canvas_rect.contains(p))
            .unwrap_or(false);
        if response.drag_released() || pointer_left || !ui.input(|i| i.pointer.any_down()) {
            self.gesture = Gesture::None;
        }
        match self.gesture {
            Gesture::Pan => ui.ctx().set_cursor_icon(CursorIcon::Grabbing),
            Gesture::DragNode(_) => ui.ctx().set_cursor_icon(CursorIcon::Move),
            Gesture::None => {}
        }

        // --- Clicks (delete / slice expand / collapse / select) ---
        if response.clicked()
            && let Some(pos) = response.interact_pointer_pos()
        {
            self.dispatch_click(pos, actions);
        }

        // --- Edges under nodes ---
        for (parent_id, child_id) in collect_edges(store) {
            let (Some(parent), Some(child)) = (store.node(parent_id), store.node(child_id)) else {
                continue;
            };
            let (Some(ppos), Some(cpos)) = (parent.position, child.position) else {
                continue;
            };
            let world = connector_points(ppos, self.heights.get(parent_id), cpos);
            let origin = canvas_rect.min.to_vec2();
            let pts = world.map(|p| self.viewport.world_to_screen(p) + origin);
            let width = (2.0 * self.viewport.scale).max(0.5);
            painter.add(CubicBezierShape::from_points_stroke(
                pts,
                false,
                Color32::TRANSPARENT,
                Stroke::new(width, EDGE_BASE),
            ));
            painter.add(CubicBezierShape::from_points_stroke(
                pts,
                false,
                Color32::TRANSPARENT,
                Stroke::new(width * 0.6, ACCENT.gamma_multiply(0.5)),
            ));
        }

        // --- Nodes (selected last = on top, hit-tested topmost-first) ---
        let mut order: Vec<Uuid> = store.list_nodes().iter().map(|n| n.id).collect();
        if let Some(sel) = selection.node
            && let Some(idx) = order.iter().position(|id| *id == sel)
        {
            let id = order.remove(idx);
            order.push(id);
        }

        let mut hits = Vec::with_capacity(order.len());
        for id in order {
            let Some(node) = store.node(id).cloned() else {
                continue;
            };
            let selected = selection.node == Some(id);
            let hovered = matches!(self.gesture, Gesture::DragNode(g) if g == id);
            let hit = self.paint_node(
                ui,
                canvas_rect,
                &node,
                store,
                textures,
                selected || hovered,
            );
            if let Some(hit) = hit {
                self.heights.observe(id, hit.rect.height() / self.viewport.scale);
                hits.push(hit);
            }
        }
        self.hits = hits;
    }

    fn paint_dot_grid(&self, painter: &egui::Painter, rect: Rect) {
        let step = 20.0 * self.viewport.scale;
        if step < 6.0 {
            return;
        }
        let dot = Color32::from_gray(40);
        let off_x = (self.viewport.pan.x % step + step) % step;
        let off_y = (self.viewport.pan.y % step + step) % step;
        let mut x = rect.min.x + off_x;
        while x < rect.max.x {
            let mut y = rect.min.y + off_y;
            while y < rect.max.y {
                painter.circle_filled(Pos2::new(x, y), 1.0, dot);
                y += step;
            }
            x += step;
        }
    }

    /// Topmost node under `pos`, if any (hits are in paint order).
    fn hit_node(&self, pos: Pos2) -> Option<Uuid> {
        self.hits
            .iter()
            .rev()
            .find(|h| h.rect.contains(pos))
            .map(|h| h.id)
    }

    fn dispatch_click(&mut self, pos: Pos2, actions: &mut Vec<CanvasAction>) {
        for hit in self.hits.iter().rev() {
            if !hit.rect.contains(pos) {
                continue;
            }
            if hit.delete_rect.contains(pos) {
                actions.push(CanvasAction::DeleteNode(hit.id));
            } else if hit.collapse_rect.map(|r| r.contains(pos)).unwrap_or(false) {
                self.expanded_slice.remove(&hit.id);
            } else if let Some((idx, _)) = hit
                .slice_rects
                .iter()
                .find(|(_, r)| r.contains(pos))
                .copied()
            {
                self.expanded_slice.insert(hit.id, idx);
                actions.push(CanvasAction::SelectNode(hit.id));
            } else {
                actions.push(CanvasAction::SelectNode(hit.id));
            }
            return;
        }
    }

    /// Paint one node and return its screen-space hit regions. Nodes fully
    /// outside the canvas are culled (`None`).
    fn paint_node(
        &self,
        ui: &egui::Ui,
        canvas_rect: Rect,
        node: &GraphNode,
        store: &Store,
        textures: &mut TextureCache,
        highlighted: bool,
    ) -> Option<NodeHit> {
        let Some((wx, wy)) = node.position else {
            return None;
        };
        let s = self.viewport.scale;
        let origin = canvas_rect.min.to_vec2();
        let top_left = self.viewport.world_to_screen(Pos2::new(wx, wy)) + origin;
        let width = NODE_WIDTH * s;
        let painter = ui.painter_at(canvas_rect);

        // Worst-case cull before layout: known height or the fallback.
        let est_h = self.heights.get(node.id).unwrap_or(DEFAULT_NODE_HEIGHT) * s;
        let est_rect = Rect::from_min_size(top_left, Vec2::new(width, est_h * 2.0 + 100.0));
        if !canvas_rect.intersects(est_rect) {
            return None;
        }

        let pad = 8.0 * s;
        let inner_w = width - 2.0 * pad;
        let mut cursor_y = top_left.y;

        // --- Header ---
        let header_h = 26.0 * s;
        let header_rect =
            Rect::from_min_size(top_left, Vec2::new(width, header_h));
        painter.rect_filled(
            header_rect,
            Rounding {
                nw: 4.0,
                ne: 4.0,
                sw: 0.0,
                se: 0.0,
            },
            PANEL_BG,
        );
        painter.text(
            Pos2::new(top_left.x + pad, header_rect.center().y),
            Align2::LEFT_CENTER,
            node.node_type.label(),
            FontId::monospace((9.0 * s).max(5.0)),
            TEXT_BODY,
        );
        let delete_size = 14.0 * s;
        let delete_rect = Rect::from_center_size(
            Pos2::new(header_rect.max.x - pad - delete_size / 2.0, header_rect.center().y),
            Vec2::splat(delete_size),
        );
        painter.text(
            delete_rect.center(),
            Align2::CENTER_CENTER,
            "✕",
            FontId::proportional((10.0 * s).max(5.0)),
            TEXT_DIM,
        );
        cursor_y += header_h;

        // --- Body (exhaustive over node types) ---
        let mut collapse_rect = None;
        let mut slice_rects = Vec::new();
        cursor_y += pad;

        match node.node_type {
            NodeType::Prompt => {
                let galley = painter.layout(
                    format!("\"{}\"", node.text_data),
                    FontId::monospace((10.0 * s).max(5.0)),
                    TEXT_BODY,
                    inner_w - 2.0 * pad,
                );
                let box_h = (galley.size().y + 2.0 * pad).max(80.0 * s);
                let box_rect = Rect::from_min_size(
                    Pos2::new(top_left.x + pad, cursor_y),
                    Vec2::new(inner_w, box_h),
                );
                painter.rect(box_rect, Rounding::same(2.0), PANEL_BG, Stroke::new(1.0, NODE_BORDER));
                painter.galley(box_rect.min + Vec2::splat(pad), galley);
                cursor_y = box_rect.max.y;
            }
            NodeType::AssetGroup => {
                cursor_y = self.paint_asset_grid(
                    &painter,
                    store,
                    textures,
                    ui.ctx(),
                    &node.asset_ids,
                    Pos2::new(top_left.x + pad, cursor_y),
                    inner_w,
                );
            }
            NodeType::Render => {
                // 1. Prompt excerpt
                if !node.text_data.is_empty() {
                    let galley = painter.layout(
                        node.text_data.clone(),
                        FontId::monospace((9.0 * s).max(5.0)),
                        TEXT_BODY,
                        inner_w - 2.0 * pad,
                    );
                    let text_h = galley.size().y.min(52.0 * s);
                    let box_rect = Rect::from_min_size(
                        Pos2::new(top_left.x + pad, cursor_y),
                        Vec2::new(inner_w, text_h + 2.6 * pad + 10.0 * s),
                    );
                    painter.rect(box_rect, Rounding::same(2.0), PANEL_BG, Stroke::new(1.0, NODE_BORDER));
                    painter.text(
                        box_rect.min + Vec2::splat(pad * 0.8),
                        Align2::LEFT_TOP,
                        "DIRECTOR PROMPT",
                        FontId::monospace((7.0 * s).max(4.0)),
                        TEXT_DIM,
                    );
                    painter
                        .with_clip_rect(box_rect.shrink(pad * 0.8))
                        .galley(box_rect.min + Vec2::new(pad * 0.8, pad * 0.8 + 10.0 * s), galley);
                    cursor_y = box_rect.max.y + pad * 0.6;
                }

                // 2. Reference thumbnails
                if !node.asset_ids.is_empty() {
                    let strip_h = 40.0 * s;
                    let label_h = 12.0 * s;
                    painter.text(
                        Pos2::new(top_left.x + pad, cursor_y),
                        Align2::LEFT_TOP,
                        format!("REFS ({})", node.asset_ids.len()),
                        FontId::monospace((7.0 * s).max(4.0)),
                        TEXT_DIM,
                    );
                    let mut thumb_x = top_left.x + pad;
                    for asset_id in &node.asset_ids {
                        if thumb_x + strip_h > top_left.x + pad + inner_w {
                            break;
                        }
                        let thumb = Rect::from_min_size(
                            Pos2::new(thumb_x, cursor_y + label_h),
                            Vec2::splat(strip_h),
                        );
                        self.paint_asset_thumb(&painter, store, textures, ui.ctx(), *asset_id, thumb);
                        thumb_x += strip_h + 4.0 * s;
                    }
                    cursor_y += label_h + strip_h + pad * 0.6;
                }

                // 3. Media area: expanded slice, slice grid, or the master
                let media_h = inner_w / crate::ops::compositor::aspect_ratio_value(&node.aspect_ratio);
                let media_rect = Rect::from_min_size(
                    Pos2::new(top_left.x + pad, cursor_y),
                    Vec2::new(inner_w, media_h),
                );
                painter.rect(media_rect, Rounding::same(2.0), Color32::BLACK, Stroke::new(1.0, NODE_BORDER));

                if let Some(&expanded) = self.expanded_slice.get(&node.id) {
                    if let Some(slice) = node.slices.get(expanded) {
                        let tex = textures.get_or_upload(
                            ui.ctx(),
                            TexKey::NodeSlice(node.id, expanded),
                            slice,
                        );
                        painter.image(
                            tex.id(),
                            media_rect,
                            Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                            Color32::WHITE,
                        );
                    }
                    let btn = Rect::from_center_size(
                        Pos2::new(media_rect.max.x - 12.0 * s, media_rect.min.y + 12.0 * s),
                        Vec2::splat(16.0 * s),
                    );
                    painter.rect_filled(btn, Rounding::same(2.0), Color32::from_black_alpha(160));
                    painter.text(
                        btn.center(),
                        Align2::CENTER_CENTER,
                        "✕",
                        FontId::proportional((10.0 * s).max(5.0)),
                        Color32::WHITE,
                    );
                    collapse_rect = Some(btn);
                } else if node.slices.len() > 1 {
                    let cols = if node.slices.len() == 9 { 3 } else { 2 };
                    let rows = node.slices.len() / cols;
                    let gap = 1.0 * s;
                    let cell_w = (media_rect.width() - gap * (cols as f32 - 1.0)) / cols as f32;
                    let cell_h = (media_rect.height() - gap * (rows as f32 - 1.0)) / rows as f32;
                    for (idx, slice) in node.slices.iter().enumerate() {
                        let r = idx / cols;
                        let c = idx % cols;
                        let cell = Rect::from_min_size(
                            Pos2::new(
                                media_rect.min.x + c as f32 * (cell_w + gap),
                                media_rect.min.y + r as f32 * (cell_h + gap),
                            ),
                            Vec2::new(cell_w, cell_h),
                        );
                        let tex =
                            textures.get_or_upload(ui.ctx(), TexKey::NodeSlice(node.id, idx), slice);
                        painter.image(
                            tex.id(),
                            cell,
                            Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                            Color32::WHITE,
                        );
                        slice_rects.push((idx, cell));
                    }
                } else if let Some(img) = &node.image {
                    let tex = textures.get_or_upload(ui.ctx(), TexKey::NodeMain(node.id), img);
                    painter.image(
                        tex.id(),
                        media_rect,
                        Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                        Color32::WHITE,
                    );
                }
                cursor_y = media_rect.max.y;

                // 4. Camera annotation
                if let Some(camera) = &node.camera_description {
                    cursor_y += pad * 0.6;
                    let galley = painter.layout(
                        format!("CAMERA: {}", camera),
                        FontId::monospace((8.0 * s).max(4.0)),
                        TEXT_BODY,
                        inner_w - 2.0 * pad,
                    );
                    let box_rect = Rect::from_min_size(
                        Pos2::new(top_left.x + pad, cursor_y),
                        Vec2::new(inner_w, galley.size().y + 1.6 * pad),
                    );
                    painter.rect(
                        box_rect,
                        Rounding::same(2.0),
                        ACCENT.gamma_multiply(0.05),
                        Stroke::new(1.0, ACCENT.gamma_multiply(0.2)),
                    );
                    painter.galley(box_rect.min + Vec2::splat(pad * 0.8), galley);
                    cursor_y = box_rect.max.y;
                }
            }
            NodeType::Slice => {
                let media_h = inner_w / crate::ops::compositor::aspect_ratio_value(&node.aspect_ratio);
                let media_rect = Rect::from_min_size(
                    Pos2::new(top_left.x + pad, cursor_y),
                    Vec2::new(inner_w, media_h),
                );
                painter.rect(media_rect, Rounding::same(2.0), Color32::BLACK, Stroke::new(1.0, NODE_BORDER));
                if let Some(img) = &node.image {
                    let tex = textures.get_or_upload(ui.ctx(), TexKey::NodeMain(node.id), img);
                    painter.image(
                        tex.id(),
                        media_rect,
                        Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                        Color32::WHITE,
                    );
                }
                cursor_y = media_rect.max.y;
            }
        }

        cursor_y += pad;
        let rect = Rect::from_min_max(top_left, Pos2::new(top_left.x + width, cursor_y));

        // --- Frame + ports over the body ---
        let border = if highlighted { ACCENT } else { NODE_BORDER };
        painter.rect_stroke(rect, Rounding::same(4.0), Stroke::new(if highlighted { 1.5 } else { 1.0 }, border));
        // Input port (top center) — prompts have no input.
        if node.node_type != NodeType::Prompt {
            painter.circle_filled(Pos2::new(rect.center().x, rect.min.y), 4.0 * s, NODE_BORDER_HOVER);
        }
        // Output port (bottom center) — slices have no output.
        if node.node_type != NodeType::Slice {
            painter.circle_filled(
                Pos2::new(rect.center().x, rect.max.y),
                4.0 * s,
                if highlighted { ACCENT } else { Color32::from_gray(160) },
            );
        }

        Some(NodeHit {
            id: node.id,
            rect,
            delete_rect,
            collapse_rect,
            slice_rects,
        })
    }

    /// 3-column square thumbnail grid for asset-group bodies. Returns the
    /// new y cursor.
    fn paint_asset_grid(
        &self,
        painter: &egui::Painter,
        store: &Store,
        textures: &mut TextureCache,
        ctx: &egui::Context,
        asset_ids: &[Uuid],
        min: Pos2,
        inner_w: f32,
    ) -> f32 {
        let s = self.viewport.scale;
        let gap = 4.0 * s;
        let cell = (inner_w - 2.0 * gap) / 3.0;
        let mut max_y = min.y;
        for (i, asset_id) in asset_ids.iter().enumerate() {
            let r = i / 3;
            let c = i % 3;
            let rect = Rect::from_min_size(
                Pos2::new(min.x + c as f32 * (cell + gap), min.y + r as f32 * (cell + gap)),
                Vec2::splat(cell),
            );
            self.paint_asset_thumb(painter, store, textures, ctx, *asset_id, rect);
            max_y = max_y.max(rect.max.y);
        }
        max_y
    }

    fn paint_asset_thumb(
        &self,
        painter: &egui::Painter,
        store: &Store,
        textures: &mut TextureCache,
        ctx: &egui::Context,
        asset_id: Uuid,
        rect: Rect,
    ) {
        painter.rect(rect, Rounding::same(1.0), PANEL_BG, Stroke::new(1.0, NODE_BORDER));
        let Some(asset) = store.asset(asset_id) else {
            return; // removed asset: empty cell, not an error
        };
        match &asset.pixels {
            Some(pixels) => {
                let tex = textures.get_or_upload(ctx, TexKey::Asset(asset_id), pixels);
                painter.image(
                    tex.id(),
                    rect,
                    Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                    Color32::WHITE,
                );
            }
            None => {
                painter.text(
                    rect.center(),
                    Align2::CENTER_CENTER,
                    "▶",
                    FontId::proportional(rect.height() * 0.4),
                    TEXT_DIM,
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // GRID / TABLE (flat views — document scroll, no viewport)
    // ------------------------------------------------------------------

    fn show_flat(
        &mut self,
        ui: &mut egui::Ui,
        store: &Store,
        selection: &Selection,
        textures: &mut TextureCache,
        actions: &mut Vec<CanvasAction>,
    ) {
        let renders: Vec<GraphNode> = store.render_nodes().cloned().collect();
        let table = self.mode == ViewMode::Table;
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                if table {
                    for node in &renders {
                        self.flat_row(ui, node, selection, textures, actions);
                    }
                } else {
                    let tile_w = 200.0;
                    let cols = ((ui.available_width() / (tile_w + 10.0)) as usize).max(1);
                    egui::Grid::new("render_grid")
                        .num_columns(cols)
                        .spacing([10.0, 10.0])
                        .show(ui, |ui| {
                            for (i, node) in renders.iter().enumerate() {
                                self.flat_tile(ui, node, tile_w, selection, textures, actions);
                                if (i + 1) % cols == 0 {
                                    ui.end_row();
                                }
                            }
                        });
                }
            });
    }

    fn flat_tile(
        &mut self,
        ui: &mut egui::Ui,
        node: &GraphNode,
        tile_w: f32,
        selection: &Selection,
        textures: &mut TextureCache,
        actions: &mut Vec<CanvasAction>,
    ) {
        let tile_h = tile_w * 9.0 / 16.0;
        let (rect, response) =
            ui.allocate_exact_size(Vec2::new(tile_w, tile_h), Sense::click());
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, Rounding::same(2.0), PANEL_BG);
        if let Some(img) = &node.image {
            let tex = textures.get_or_upload(ui.ctx(), TexKey::NodeMain(node.id), img);
            painter.image(
                tex.id(),
                rect,
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        }
        let selected = selection.node == Some(node.id);
        painter.rect_stroke(
            rect,
            Rounding::same(2.0),
            Stroke::new(1.0, if selected { ACCENT } else { NODE_BORDER }),
        );
        painter.text(
            rect.min + Vec2::splat(6.0),
            Align2::LEFT_TOP,
            "RENDER",
            FontId::monospace(8.0),
            ACCENT,
        );
        if response.clicked() {
            actions.push(CanvasAction::SelectNode(node.id));
            self.detail_node = Some(node.id);
            self.detail_slice = None;
        }
    }

    fn flat_row(
        &mut self,
        ui: &mut egui::Ui,
        node: &GraphNode,
        selection: &Selection,
        textures: &mut TextureCache,
        actions: &mut Vec<CanvasAction>,
    ) {
        let selected = selection.node == Some(node.id);
        let response = ui
            .horizontal(|ui| {
                let thumb = Vec2::new(128.0, 72.0);
                let (rect, _) = ui.allocate_exact_size(thumb, Sense::hover());
                let painter = ui.painter_at(rect);
                painter.rect_filled(rect, Rounding::same(2.0), PANEL_BG);
                if let Some(img) = &node.image {
                    let tex = textures.get_or_upload(ui.ctx(), TexKey::NodeMain(node.id), img);
                    painter.image(
                        tex.id(),
                        rect,
                        Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                        Color32::WHITE,
                    );
                }
                ui.vertical(|ui| {
                    ui.label(
                        egui::RichText::new(&node.prompt)
                            .monospace()
                            .size(11.0)
                            .color(if selected { ACCENT } else { TEXT_BODY }),
                    );
                    ui.label(
                        egui::RichText::new(format!("ID: {}", node.id))
                            .size(9.0)
                            .color(TEXT_DIM),
                    );
                    if let Some(camera) = &node.camera_description {
                        ui.label(
                            egui::RichText::new(format!("Camera: {}", camera))
                                .size(9.0)
                                .color(TEXT_DIM),
                        );
                    }
                });
            })
            .response;
        if response.interact(Sense::click()).clicked() {
            actions.push(CanvasAction::SelectNode(node.id));
            self.detail_node = Some(node.id);
            self.detail_slice = None;
        }
        ui.separator();
    }

    fn show_detail_overlay(
        &mut self,
        ui: &mut egui::Ui,
        canvas_rect: Rect,
        store: &Store,
        textures: &mut TextureCache,
    ) {
        let Some(node) = self.detail_node.and_then(|id| store.node(id)).cloned() else {
            return;
        };
        let painter = ui.painter_at(canvas_rect);
        painter.rect_filled(canvas_rect, Rounding::ZERO, Color32::from_black_alpha(245));

        // Header: back button + prompt excerpt
        let back_rect = Rect::from_min_size(canvas_rect.min + Vec2::new(16.0, 12.0), Vec2::new(70.0, 22.0));
        painter.rect(back_rect, Rounding::same(2.0), PANEL_BG, Stroke::new(1.0, NODE_BORDER));
        painter.text(
            back_rect.center(),
            Align2::CENTER_CENTER,
            "← Back",
            FontId::proportional(11.0),
            TEXT_BODY,
        );
        let excerpt: String = node.prompt.chars().take(60).collect();
        painter.text(
            Pos2::new(back_rect.max.x + 16.0, back_rect.center().y),
            Align2::LEFT_CENTER,
            excerpt,
            FontId::proportional(11.0),
            Color32::WHITE,
        );
        if ui
            .interact(back_rect, ui.id().with("detail_back"), Sense::click())
            .clicked()
        {
            self.detail_node = None;
            self.detail_slice = None;
            return;
        }

        // Media area: fit the node's aspect into the remaining space.
        let content = Rect::from_min_max(
            canvas_rect.min + Vec2::new(40.0, 50.0),
            canvas_rect.max - Vec2::new(40.0, 40.0),
        );
        let ar = crate::ops::compositor::aspect_ratio_value(&node.aspect_ratio);
        let mut size = Vec2::new(content.width(), content.width() / ar);
        if size.y > content.height() {
            size = Vec2::new(content.height() * ar, content.height());
        }
        let media_rect = Rect::from_center_size(content.center(), size);

        if let Some(expanded) = self.detail_slice {
            if let Some(slice) = node.slices.get(expanded) {
                let tex = textures.get_or_upload(ui.ctx(), TexKey::NodeSlice(node.id, expanded), slice);
                painter.image(
                    tex.id(),
                    media_rect,
                    Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                    Color32::WHITE,
                );
            }
            if ui
                .interact(media_rect, ui.id().with("detail_collapse"), Sense::click())
                .clicked()
            {
                self.detail_slice = None;
            }
        } else if node.slices.len() > 1 {
            let cols = if node.slices.len() == 9 { 3 } else { 2 };
            let rows = node.slices.len() / cols;
            let gap = 2.0;
            let cell_w = (media_rect.width() - gap * (cols as f32 - 1.0)) / cols as f32;
            let cell_h = (media_rect.height() - gap * (rows as f32 - 1.0)) / rows as f32;
            for (idx, slice) in node.slices.iter().enumerate() {
                let r = idx / cols;
                let c = idx % cols;
                let cell = Rect::from_min_size(
                    Pos2::new(
                        media_rect.min.x + c as f32 * (cell_w + gap),
                        media_rect.min.y + r as f32 * (cell_h + gap),
                    ),
                    Vec2::new(cell_w, cell_h),
                );
                let tex = textures.get_or_upload(ui.ctx(), TexKey::NodeSlice(node.id, idx), slice);
                painter.image(
                    tex.id(),
                    cell,
                    Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                    Color32::WHITE,
                );
                if ui
                    .interact(cell, ui.id().with(("detail_slice", idx)), Sense::click())
                    .clicked()
                {
                    self.detail_slice = Some(idx);
                }
            }
            painter.text(
                Pos2::new(media_rect.center().x, media_rect.max.y + 16.0),
                Align2::CENTER_CENTER,
                "Click a panel to expand",
                FontId::monospace(10.0),
                TEXT_DIM,
            );
        } else if let Some(img) = &node.image {
            let tex = textures.get_or_upload(ui.ctx(), TexKey::NodeMain(node.id), img);
            painter.image(
                tex.id(),
                media_rect,
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NodeType, test_node};

    #[test]
    fn zoom_keeps_world_point_under_cursor() {
        let mut vp = Viewport::default();
        vp.pan = Vec2::new(37.0, -12.0);
        vp.scale = 0.8;
        let cursor = Pos2::new(412.0, 266.0);
        let before = vp.screen_to_world(cursor);
        vp.zoom_at(cursor, -240.0); // zoom in
        let after = vp.screen_to_world(cursor);
        assert!((before.x - after.x).abs() < 1e-3);
        assert!((before.y - after.y).abs() < 1e-3);
        assert!(vp.scale > 0.8);
    }

    #[test]
    fn zoom_scale_is_clamped() {
        let mut vp = Viewport::default();
        vp.zoom_at(Pos2::ZERO, 100_000.0);
        assert_eq!(vp.scale, 0.2);
        vp.zoom_at(Pos2::ZERO, -100_000.0);
        assert_eq!(vp.scale, 3.0);
    }

    #[test]
    fn node_drag_delta_is_scale_corrected() {
        let mut vp = Viewport::default();
        vp.scale = 2.0;
        assert_eq!(vp.drag_world_delta(Vec2::new(10.0, -4.0)), Vec2::new(5.0, -2.0));
    }

    #[test]
    fn connector_departs_down_and_arrives_from_above() {
        let [start, c1, c2, end] = connector_points((100.0, 100.0), Some(300.0), (520.0, 700.0));
        assert_eq!(start, Pos2::new(260.0, 400.0));
        assert_eq!(end, Pos2::new(680.0, 700.0));
        // Vertical-first tangents: control 1 straight below the start,
        // control 2 straight above the end.
        assert_eq!(c1.x, start.x);
        assert!(c1.y > start.y);
        assert_eq!(c2.x, end.x);
        assert!(c2.y < end.y);
        // |dy| = 300 -> offset 150
        assert_eq!(c1.y, 550.0);
        assert_eq!(c2.y, 550.0);
    }

    #[test]
    fn connector_offset_has_a_floor() {
        let [start, c1, _, _] = connector_points((0.0, 0.0), Some(100.0), (0.0, 140.0));
        // |dy| = 40 -> 20 < 50 floor
        assert_eq!(c1.y - start.y, 50.0);
    }

    #[test]
    fn unmeasured_parent_uses_fallback_height() {
        let [start, ..] = connector_points((0.0, 0.0), None, (0.0, 480.0));
        assert_eq!(start.y, DEFAULT_NODE_HEIGHT);
    }

    #[test]
    fn edges_omit_dangling_parents() {
        let mut store = Store::new();
        let mut parent = test_node(NodeType::Render, None);
        parent.position = Some((100.0, 100.0));
        let parent_id = parent.id;
        store.add_node(parent);

        let mut child = test_node(NodeType::Render, Some(parent_id));
        child.position = Some((100.0, 580.0));
        let child_id = child.id;
        store.add_node(child);

        assert_eq!(collect_edges(&store), vec![(parent_id, child_id)]);

        store.remove_node(parent_id);
        // Child survives with a dangling reference; the edge just vanishes.
        assert!(store.node(child_id).is_some());
        assert!(collect_edges(&store).is_empty());
    }

    #[test]
    fn edges_require_both_ends_positioned() {
        let mut store = Store::new();
        let mut parent = test_node(NodeType::Render, None);
        parent.position = Some((0.0, 0.0));
        let parent_id = parent.id;
        store.add_node(parent);
        // Child not yet placed: no edge.
        store.add_node(test_node(NodeType::Render, Some(parent_id)));
        assert!(collect_edges(&store).is_empty());
    }

    #[test]
    fn height_observation_is_idempotent() {
        let mut tracker = HeightTracker::default();
        let id = Uuid::new_v4();
        assert!(tracker.observe(id, 312.0));
        assert!(!tracker.observe(id, 312.0));
        assert!(!tracker.observe(id, 312.2)); // sub-epsilon jitter
        assert!(tracker.observe(id, 402.0));
        assert_eq!(tracker.get(id), Some(402.0));
    }

    #[test]
    fn height_tracker_prunes_removed_nodes() {
        let mut store = Store::new();
        let node = test_node(NodeType::Render, None);
        let id = node.id;
        store.add_node(node);

        let mut tracker = HeightTracker::default();
        tracker.observe(id, 250.0);
        tracker.prune(&store);
        assert_eq!(tracker.get(id), Some(250.0));

        store.remove_node(id);
        tracker.prune(&store);
        assert_eq!(tracker.get(id), None);
    }
}
