//! Application shell: owns the store and the selection, wires the three
//! panels together, and dispatches background jobs.
//!
//! All service and file work runs on the rayon pool; results come back over
//! mpsc channels drained at the top of `update()`. The UI thread never
//! blocks on the network.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{SystemTime, UNIX_EPOCH};

use egui::Color32;
use uuid::Uuid;

use crate::canvas::{CanvasAction, CanvasView};
use crate::components::asset_bay::{self, AssetBayAction};
use crate::components::deck::{self, DeckAction, DeckState};
use crate::components::inspector::{self, InspectorAction};
use crate::ops::ai::{AiClient, AiError, RefImage};
use crate::ops::{compositor, export};
use crate::settings::AppSettings;
use crate::store::{
    Asset, GraphNode, MediaType, NodeType, Selection, Store, place_new_node,
};
use crate::textures::TextureCache;
use crate::{io, log_err, log_info, log_warn};

/// References sent with one generation request, hard limit of the service.
const MAX_PROMPT_REFS: usize = 5;

/// Starting text of the inspector's analyze command box.
const DEFAULT_ANALYSIS_INSTRUCTION: &str =
    "Describe this image for a film director: subject, composition, lighting, \
     color palette and mood. Three sentences at most.";

const ACCENT: Color32 = Color32::from_rgb(201, 255, 86);

/// Progress and outcome of a generation job. Steps stream in while the job
/// runs so the busy overlay can narrate.
enum GenMessage {
    Step(&'static str),
    Done(Box<Result<GraphNode, AiError>>),
}

/// Outcome of the lightweight text jobs (all share one channel).
enum TextResult {
    Analysis(Result<String, AiError>),
    Enhanced(Result<String, AiError>),
    Camera(Uuid, String),
    /// Caption of the deck's prompt text, shown in the analysis area.
    CameraPrompt(String),
}

enum ExportResult {
    Written(PathBuf),
    Failed(String),
}

/// Draft state of the collage editor window.
struct CollageDraft {
    images: Vec<(String, image::RgbaImage)>,
    cols: u32,
    aspect_ratio: String,
}

impl Default for CollageDraft {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            cols: 2,
            aspect_ratio: "16:9".to_string(),
        }
    }
}

pub struct CineBoardApp {
    store: Store,
    selection: Selection,
    textures: TextureCache,
    settings: AppSettings,
    canvas: CanvasView,
    deck: DeckState,

    // Background job channels, one long-lived pair per concern.
    gen_sender: mpsc::Sender<GenMessage>,
    gen_receiver: mpsc::Receiver<GenMessage>,
    text_sender: mpsc::Sender<TextResult>,
    text_receiver: mpsc::Receiver<TextResult>,
    export_sender: mpsc::Sender<ExportResult>,
    export_receiver: mpsc::Receiver<ExportResult>,

    generating: bool,
    generation_step: &'static str,
    enhancing: bool,
    analyzing: bool,
    camera_pending: Option<Uuid>,
    camera_prompt_pending: bool,
    exporting: bool,

    /// Vision-model instruction for the inspector's analyze runs,
    /// user-editable.
    analysis_instruction: String,
    /// Vision-model output for the current selection (or the last deck
    /// camera caption). Cleared whenever the selection changes.
    analysis: Option<String>,

    error_banner: Option<String>,
    status_line: Option<String>,

    collage: Option<CollageDraft>,
    collage_counter: u32,
    settings_open: bool,

    force_exit: bool,
    pending_exit: bool,
}

impl Default for CineBoardApp {
    fn default() -> Self {
        let settings = AppSettings::load();
        let (gen_sender, gen_receiver) = mpsc::channel();
        let (text_sender, text_receiver) = mpsc::channel();
        let (export_sender, export_receiver) = mpsc::channel();
        Self {
            store: Store::new(),
            selection: Selection::default(),
            textures: TextureCache::default(),
            settings,
            canvas: CanvasView::default(),
            deck: DeckState::default(),
            gen_sender,
            gen_receiver,
            text_sender,
            text_receiver,
            export_sender,
            export_receiver,
            generating: false,
            generation_step: "",
            enhancing: false,
            analyzing: false,
            camera_pending: None,
            camera_prompt_pending: false,
            exporting: false,
            analysis_instruction: DEFAULT_ANALYSIS_INSTRUCTION.to_string(),
            analysis: None,
            error_banner: None,
            status_line: None,
            collage: None,
            collage_counter: 0,
            settings_open: false,
            force_exit: false,
            pending_exit: false,
        }
    }
}

impl CineBoardApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::dark());
        Self::default()
    }

    // ------------------------------------------------------------------
    // Selection (mutual exclusion + analysis lifetime)
    // ------------------------------------------------------------------

    fn select_asset(&mut self, id: Uuid) {
        // Any selection event invalidates the current analysis text, even a
        // re-select of the same asset.
        self.analysis = None;
        self.selection.select_asset(id);
    }

    fn select_node(&mut self, id: Uuid) {
        self.analysis = None;
        self.selection.select_node(id);
    }

    fn delete_node(&mut self, id: Uuid) {
        self.store.remove_node(id);
        if self.selection.node == Some(id) {
            self.selection.clear();
            self.analysis = None;
        }
        log_info!("deleted node {}", id);
    }

    fn remove_asset(&mut self, id: Uuid) {
        self.store.remove_asset(id);
        if self.selection.asset == Some(id) {
            self.selection.clear();
            self.analysis = None;
        }
    }

    // ------------------------------------------------------------------
    // Job results
    // ------------------------------------------------------------------

    fn drain_channels(&mut self) {
        while let Ok(msg) = self.gen_receiver.try_recv() {
            match msg {
                GenMessage::Step(step) => self.generation_step = step,
                GenMessage::Done(result) => {
                    self.generating = false;
                    match *result {
                        Ok(node) => {
                            let id = node.id;
                            log_info!("generation finished, node {}", id);
                            self.store.add_node(node);
                            self.select_node(id);
                            self.deck.prompt.clear();
                        }
                        Err(e) => {
                            log_err!("generation failed: {}", e);
                            self.error_banner = Some(e.user_message());
                        }
                    }
                }
            }
        }

        while let Ok(result) = self.text_receiver.try_recv() {
            match result {
                TextResult::Analysis(Ok(text)) => {
                    self.analyzing = false;
                    self.analysis = Some(text);
                }
                TextResult::Analysis(Err(e)) => {
                    self.analyzing = false;
                    log_warn!("analysis failed: {}", e);
                    self.error_banner = Some(e.user_message());
                }
                TextResult::Enhanced(Ok(text)) => {
                    self.enhancing = false;
                    self.deck.prompt = text;
                }
                TextResult::Enhanced(Err(e)) => {
                    // Falls back to the raw prompt still in the box; log only.
                    self.enhancing = false;
                    log_warn!("prompt enhancement failed, keeping raw prompt: {}", e);
                }
                TextResult::Camera(id, caption) => {
                    if self.camera_pending == Some(id) {
                        self.camera_pending = None;
                    }
                    self.store.set_camera_description(id, caption);
                }
                TextResult::CameraPrompt(caption) => {
                    self.camera_prompt_pending = false;
                    self.analysis = Some(caption);
                }
            }
        }

        while let Ok(result) = self.export_receiver.try_recv() {
            self.exporting = false;
            match result {
                ExportResult::Written(path) => {
                    log_info!("exported render archive to {}", path.display());
                    self.status_line = Some(format!("Exported {}", path.display()));
                }
                ExportResult::Failed(e) => {
                    log_err!("export failed: {}", e);
                    self.error_banner = Some(format!("Export failed: {}", e));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------

    /// The parent for a new generation: the selected node, if it is a
    /// render. Anything else starts a fresh chain.
    fn continuation_parent(&self) -> Option<&GraphNode> {
        self.selection
            .node
            .and_then(|id| self.store.node(id))
            .filter(|n| n.node_type == NodeType::Render)
    }

    /// Reference assets for a generation, in priority order: the selected
    /// asset first, otherwise newest-imported first. Video assets carry no
    /// pixels and are skipped.
    fn prioritized_refs(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .store
            .list_assets()
            .iter()
            .filter(|a| a.media == MediaType::Image && a.pixels.is_some())
            .map(|a| a.id)
            .collect();
        ids.reverse();
        if let Some(selected) = self.selection.asset
            && let Some(pos) = ids.iter().position(|id| *id == selected)
        {
            let id = ids.remove(pos);
            ids.insert(0, id);
        }
        ids.truncate(MAX_PROMPT_REFS);
        ids
    }

    fn start_generation(&mut self) {
        let client = AiClient::from_settings(&self.settings);
        if !client.has_key() {
            self.error_banner = Some(AiError::Unauthorized.user_message());
            self.settings_open = true;
            return;
        }
        let prompt = self.deck.prompt.trim().to_string();
        if prompt.is_empty() || self.generating {
            return;
        }

        let parent = self.continuation_parent();
        let parent_id = parent.map(|p| p.id);
        let context = parent.and_then(|p| p.context_image()).cloned();
        let position = place_new_node(parent, self.store.list_nodes());

        let asset_ids = self.prioritized_refs();
        let mut refs = Vec::with_capacity(asset_ids.len());
        for id in &asset_ids {
            let Some(pixels) = self.store.asset(*id).and_then(|a| a.pixels.clone()) else {
                continue;
            };
            match io::encode_png(&pixels) {
                Ok(data) => refs.push(RefImage {
                    mime: "image/png".to_string(),
                    data,
                }),
                Err(e) => log_warn!("skipping reference {}: {}", id, e),
            }
        }

        let (rows, cols) = self.deck.layout.dims();
        let aspect_ratio = self.deck.aspect_ratio.clone();
        let image_size = self.deck.image_size.clone();
        let node_id = Uuid::new_v4();

        self.generating = true;
        self.generation_step = "Preparing the shot...";
        self.error_banner = None;
        self.status_line = None;
        log_info!(
            "generation started: {}x{} {} parent={:?} refs={}",
            rows,
            cols,
            aspect_ratio,
            parent_id,
            refs.len()
        );

        let sender = self.gen_sender.clone();
        rayon::spawn(move || {
            let context_png = match &context {
                Some(img) => match io::encode_png(img) {
                    Ok(data) => Some(data),
                    Err(e) => {
                        let _ = sender.send(GenMessage::Done(Box::new(Err(AiError::Service(
                            format!("context image encoding failed: {}", e),
                        )))));
                        return;
                    }
                },
                None => None,
            };

            let _ = sender.send(GenMessage::Step("Generating storyboard master..."));
            let grid = match client.generate_grid(
                &prompt,
                rows,
                cols,
                &aspect_ratio,
                &image_size,
                &refs,
                context_png.as_deref(),
            ) {
                Ok(grid) => grid,
                Err(e) => {
                    let _ = sender.send(GenMessage::Done(Box::new(Err(e))));
                    return;
                }
            };

            let _ = sender.send(GenMessage::Step("Annotating camera movement..."));
            let camera = client.camera_caption(&prompt);

            let full = Arc::new(grid.full);
            let node = GraphNode {
                id: node_id,
                node_type: NodeType::Render,
                image: Some(full.clone()),
                full_grid: Some(full),
                slices: grid.slices.into_iter().map(Arc::new).collect(),
                prompt: prompt.clone(),
                text_data: prompt,
                asset_ids,
                aspect_ratio,
                timestamp: now_millis(),
                parent_id,
                position: Some(position),
                camera_description: Some(camera),
            };
            let _ = sender.send(GenMessage::Done(Box::new(Ok(node))));
        });
    }

    fn start_enhance(&mut self) {
        let client = AiClient::from_settings(&self.settings);
        if !client.has_key() {
            self.error_banner = Some(AiError::Unauthorized.user_message());
            self.settings_open = true;
            return;
        }
        let raw = self.deck.prompt.clone();
        if raw.trim().is_empty() || self.enhancing {
            return;
        }
        self.enhancing = true;
        let sender = self.text_sender.clone();
        rayon::spawn(move || {
            let _ = sender.send(TextResult::Enhanced(client.enhance_prompt(&raw)));
        });
    }

    fn start_asset_analysis(&mut self, asset_id: Uuid) {
        let Some(png) = asset_analysis_png(&self.store, asset_id) else {
            return;
        };
        self.spawn_analysis(png);
    }

    fn start_node_analysis(&mut self, node_id: Uuid) {
        let Some(png) = node_analysis_png(&self.store, node_id) else {
            return;
        };
        self.spawn_analysis(png);
    }

    /// Ships a PNG to the vision model with the inspector's current
    /// instruction text.
    fn spawn_analysis(&mut self, png: Vec<u8>) {
        let client = AiClient::from_settings(&self.settings);
        if !client.has_key() {
            self.error_banner = Some(AiError::Unauthorized.user_message());
            self.settings_open = true;
            return;
        }
        let instruction = self.analysis_instruction.trim().to_string();
        if instruction.is_empty() || self.analyzing {
            return;
        }
        self.analyzing = true;
        self.analysis = None;
        let sender = self.text_sender.clone();
        rayon::spawn(move || {
            let result = client.analyze(&png, "image/png", &instruction);
            let _ = sender.send(TextResult::Analysis(result));
        });
    }

    /// Captions the deck's prompt text as a camera movement. The selection
    /// is dropped first so the caption lands in the inspector's free
    /// analysis area.
    fn start_camera_prompt(&mut self) {
        let client = AiClient::from_settings(&self.settings);
        if !client.has_key() {
            self.error_banner = Some(AiError::Unauthorized.user_message());
            self.settings_open = true;
            return;
        }
        let prompt = self.deck.prompt.trim().to_string();
        if prompt.is_empty() || self.camera_prompt_pending {
            return;
        }
        self.selection.clear();
        self.analysis = None;
        self.camera_prompt_pending = true;
        let sender = self.text_sender.clone();
        rayon::spawn(move || {
            let _ = sender.send(TextResult::CameraPrompt(client.camera_caption(&prompt)));
        });
    }

    fn start_camera_caption(&mut self, node_id: Uuid) {
        let client = AiClient::from_settings(&self.settings);
        if !client.has_key() {
            self.error_banner = Some(AiError::Unauthorized.user_message());
            self.settings_open = true;
            return;
        }
        let Some(prompt) = self.store.node(node_id).map(|n| n.prompt.clone()) else {
            return;
        };
        self.camera_pending = Some(node_id);
        let sender = self.text_sender.clone();
        rayon::spawn(move || {
            let caption = client.camera_caption(&prompt);
            let _ = sender.send(TextResult::Camera(node_id, caption));
        });
    }

    // ------------------------------------------------------------------
    // Assets / collage / export
    // ------------------------------------------------------------------

    fn import_assets(&mut self) {
        for path in io::pick_asset_files() {
            match io::load_asset(&path) {
                Ok(asset) => {
                    let id = asset.id;
                    self.store.add_asset(asset);
                    self.select_asset(id);
                }
                Err(e) => {
                    log_warn!("asset import failed: {}", e);
                    self.error_banner = Some(e);
                }
            }
        }
    }

    fn commit_collage(&mut self, draft: CollageDraft) {
        let images: Vec<image::RgbaImage> =
            draft.images.into_iter().map(|(_, img)| img).collect();
        if images.is_empty() {
            return;
        }
        let cols = draft.cols.min(images.len() as u32).max(1);
        let rows = (images.len() as u32).div_ceil(cols);
        let stitched = compositor::stitch_grid(&images, rows, cols, &draft.aspect_ratio);
        self.collage_counter += 1;
        let asset = Asset {
            id: Uuid::new_v4(),
            path: PathBuf::from(format!("collage_{}.png", self.collage_counter)),
            pixels: Some(Arc::new(stitched)),
            media: MediaType::Image,
        };
        let id = asset.id;
        log_info!("collage created: {} tiles, {} cols", images.len(), cols);
        self.store.add_asset(asset);
        self.select_asset(id);
    }

    fn start_export(&mut self) {
        if self.exporting {
            return;
        }
        let renders = export::collect_renders(&self.store);
        if renders.is_empty() {
            self.error_banner = Some("Nothing to export yet.".to_string());
            return;
        }
        let Some(path) = io::pick_archive_path("cineboard_renders.zip") else {
            return;
        };
        self.exporting = true;
        let sender = self.export_sender.clone();
        rayon::spawn(move || {
            let result = match export::export_renders(&renders, &path) {
                Ok(path) => ExportResult::Written(path),
                Err(e) => ExportResult::Failed(e),
            };
            let _ = sender.send(result);
        });
    }

    // ------------------------------------------------------------------
    // Windows
    // ------------------------------------------------------------------

    fn collage_window(&mut self, ctx: &egui::Context) {
        let Some(draft) = &mut self.collage else {
            return;
        };
        let mut open = true;
        let mut commit = false;
        egui::Window::new("Collage Editor")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.label(
                    egui::RichText::new("Stitch reference stills into one board.")
                        .size(10.0)
                        .color(Color32::from_gray(140)),
                );
                ui.add_space(4.0);
                if ui.button("+ Add images").clicked() {
                    for path in io::pick_collage_files() {
                        if draft.images.len() >= 9 {
                            break;
                        }
                        match io::load_image(&path) {
                            Ok(img) => {
                                let name = path
                                    .file_name()
                                    .map(|n| n.to_string_lossy().into_owned())
                                    .unwrap_or_default();
                                draft.images.push((name, img));
                            }
                            Err(e) => log_warn!("collage source skipped: {}", e),
                        }
                    }
                }
                let mut remove = None;
                for (i, (name, _)) in draft.images.iter().enumerate() {
                    ui.horizontal(|ui| {
                        ui.label(egui::RichText::new(name.as_str()).size(10.0));
                        if ui.small_button("✕").clicked() {
                            remove = Some(i);
                        }
                    });
                }
                if let Some(i) = remove {
                    draft.images.remove(i);
                }
                ui.add_space(4.0);
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new("Columns").size(10.0));
                    ui.add(egui::DragValue::new(&mut draft.cols).clamp_range(1..=4));
                    egui::ComboBox::from_id_source("collage_aspect")
                        .selected_text(draft.aspect_ratio.as_str())
                        .width(66.0)
                        .show_ui(ui, |ui| {
                            for ar in deck::ASPECT_RATIOS {
                                ui.selectable_value(
                                    &mut draft.aspect_ratio,
                                    (*ar).to_string(),
                                    *ar,
                                );
                            }
                        });
                });
                ui.add_space(6.0);
                if ui
                    .add_enabled(
                        !draft.images.is_empty(),
                        egui::Button::new(
                            egui::RichText::new("Create collage").color(Color32::BLACK),
                        )
                        .fill(ACCENT),
                    )
                    .clicked()
                {
                    commit = true;
                }
            });
        if commit {
            if let Some(draft) = self.collage.take() {
                self.commit_collage(draft);
            }
        } else if !open {
            self.collage = None;
        }
    }

    fn settings_window(&mut self, ctx: &egui::Context) {
        if !self.settings_open {
            return;
        }
        let mut open = true;
        let mut save = false;
        egui::Window::new("Settings")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                egui::Grid::new("settings_grid")
                    .num_columns(2)
                    .spacing([8.0, 6.0])
                    .show(ui, |ui| {
                        ui.label("API key");
                        ui.add(
                            egui::TextEdit::singleline(&mut self.settings.api_key)
                                .password(true)
                                .desired_width(220.0),
                        );
                        ui.end_row();
                        ui.label("API base");
                        ui.text_edit_singleline(&mut self.settings.api_base);
                        ui.end_row();
                        ui.label("Image model");
                        ui.text_edit_singleline(&mut self.settings.image_model);
                        ui.end_row();
                        ui.label("Text model");
                        ui.text_edit_singleline(&mut self.settings.text_model);
                        ui.end_row();
                        ui.label("Vision model");
                        ui.text_edit_singleline(&mut self.settings.vision_model);
                        ui.end_row();
                        ui.label("Timeout (s)");
                        ui.add(
                            egui::DragValue::new(&mut self.settings.request_timeout_secs)
                                .clamp_range(10..=600),
                        );
                        ui.end_row();
                        ui.label("Confirm on exit");
                        ui.checkbox(&mut self.settings.confirm_on_exit, "");
                        ui.end_row();
                    });
                ui.add_space(6.0);
                ui.label(
                    egui::RichText::new(
                        "Leave the key empty to use the GEMINI_API_KEY environment variable.",
                    )
                    .size(9.0)
                    .color(Color32::from_gray(120)),
                );
                ui.add_space(4.0);
                if ui.button("Save").clicked() {
                    save = true;
                }
            });
        if save {
            self.settings.save();
            self.settings_open = false;
        } else if !open {
            self.settings_open = false;
        }
    }

    fn exit_dialog(&mut self, ctx: &egui::Context) {
        if !self.pending_exit {
            return;
        }
        egui::Window::new("Quit CineBoard?")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label("The board is not saved anywhere. Quit anyway?");
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Cancel").clicked() {
                        self.pending_exit = false;
                    }
                    if ui
                        .button(egui::RichText::new("Quit").color(Color32::from_rgb(240, 120, 120)))
                        .clicked()
                    {
                        self.force_exit = true;
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
            });
    }

    fn busy_overlay(&self, ctx: &egui::Context) {
        if !self.generating {
            return;
        }
        // Full-window backdrop that swallows pointer input: nothing on the
        // board can change under a generation in flight.
        let screen = ctx.screen_rect();
        egui::Area::new(egui::Id::new("busy_backdrop"))
            .order(egui::Order::Foreground)
            .fixed_pos(screen.min)
            .show(ctx, |ui| {
                ui.allocate_rect(screen, egui::Sense::click_and_drag());
                ui.painter().rect_filled(
                    screen,
                    egui::Rounding::ZERO,
                    Color32::from_black_alpha(150),
                );
            });
        egui::Area::new(egui::Id::new("busy_overlay"))
            .order(egui::Order::Foreground)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                egui::Frame::window(&ctx.style()).show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label(
                            egui::RichText::new(self.generation_step)
                                .monospace()
                                .size(11.0),
                        );
                    });
                });
            });
        ctx.request_repaint();
    }

    fn top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(
                    egui::RichText::new("CINEBOARD")
                        .monospace()
                        .strong()
                        .color(ACCENT),
                );
                ui.label(
                    egui::RichText::new("visual direction workspace")
                        .size(9.0)
                        .color(Color32::from_gray(120)),
                );
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("⚙ Settings").clicked() {
                        self.settings_open = true;
                    }
                    if let Some(status) = &self.status_line {
                        ui.label(egui::RichText::new(status.as_str()).size(9.0).color(ACCENT));
                    }
                });
            });
        });

        if let Some(error) = self.error_banner.clone() {
            egui::TopBottomPanel::top("error_banner").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label(
                        egui::RichText::new(error)
                            .size(10.0)
                            .color(Color32::from_rgb(255, 140, 140)),
                    );
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("Dismiss").clicked() {
                            self.error_banner = None;
                        }
                    });
                });
            });
        }
    }
}

impl eframe::App for CineBoardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_channels();
        self.textures.prune(&self.store);

        // Intercept the OS close button when exit confirmation is on.
        if ctx.input(|i| i.viewport().close_requested())
            && !self.force_exit
            && self.settings.confirm_on_exit
            && !self.store.list_nodes().is_empty()
        {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            self.pending_exit = true;
        }

        self.top_bar(ctx);

        // --- Left: asset bay + director deck ---
        let continuing = self.continuation_parent().is_some();
        let mut bay_actions = Vec::new();
        let mut deck_actions = Vec::new();
        egui::SidePanel::left("left_panel")
            .exact_width(340.0)
            .resizable(false)
            .show(ctx, |ui| {
                ui.add_space(6.0);
                bay_actions = asset_bay::show(ui, &self.store, &self.selection, &mut self.textures);
                ui.separator();
                deck_actions = deck::show(
                    ui,
                    &mut self.deck,
                    self.generating,
                    self.enhancing,
                    self.camera_prompt_pending,
                    continuing,
                );
            });

        // --- Right: inspector ---
        let mut inspector_actions = Vec::new();
        egui::SidePanel::right("inspector_panel")
            .exact_width(260.0)
            .resizable(false)
            .show(ctx, |ui| {
                ui.add_space(6.0);
                egui::ScrollArea::vertical()
                    .auto_shrink([false, false])
                    .show(ui, |ui| {
                        inspector_actions = inspector::show(
                            ui,
                            &self.store,
                            &self.selection,
                            &mut self.textures,
                            &mut self.analysis_instruction,
                            self.analysis.as_deref(),
                            self.analyzing,
                            self.camera_pending.is_some(),
                        );
                    });
            });

        // --- Center: canvas ---
        let mut canvas_actions = Vec::new();
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::from_rgb(5, 5, 5)))
            .show(ctx, |ui| {
                canvas_actions = self.canvas.show(
                    ui,
                    &mut self.store,
                    &self.selection,
                    &mut self.textures,
                );
            });

        for action in bay_actions {
            match action {
                AssetBayAction::ImportFiles => self.import_assets(),
                AssetBayAction::OpenCollageEditor => {
                    self.collage = Some(CollageDraft::default());
                }
                AssetBayAction::SelectAsset(id) => self.select_asset(id),
                AssetBayAction::RemoveAsset(id) => self.remove_asset(id),
            }
        }
        for action in deck_actions {
            match action {
                DeckAction::Generate => self.start_generation(),
                DeckAction::EnhancePrompt => self.start_enhance(),
                DeckAction::CameraPrompt => self.start_camera_prompt(),
            }
        }
        for action in inspector_actions {
            match action {
                InspectorAction::AnalyzeAsset(id) => self.start_asset_analysis(id),
                InspectorAction::AnalyzeNode(id) => self.start_node_analysis(id),
                InspectorAction::RemoveAsset(id) => self.remove_asset(id),
                InspectorAction::DeleteNode(id) => self.delete_node(id),
                InspectorAction::GenerateCamera(id) => self.start_camera_caption(id),
            }
        }
        for action in canvas_actions {
            match action {
                CanvasAction::SelectNode(id) => self.select_node(id),
                CanvasAction::DeleteNode(id) => self.delete_node(id),
                CanvasAction::ExportAll => self.start_export(),
            }
        }

        self.collage_window(ctx);
        self.settings_window(ctx);
        self.exit_dialog(ctx);
        self.busy_overlay(ctx);

        // Keep polling while any job is in flight.
        if self.enhancing
            || self.analyzing
            || self.exporting
            || self.camera_pending.is_some()
            || self.camera_prompt_pending
        {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// PNG bytes of an asset's pixels, if it has any (videos carry none).
fn asset_analysis_png(store: &Store, asset_id: Uuid) -> Option<Vec<u8>> {
    let pixels = store.asset(asset_id).and_then(|a| a.pixels.clone())?;
    match io::encode_png(&pixels) {
        Ok(data) => Some(data),
        Err(e) => {
            log_warn!("asset {} not analyzable: {}", asset_id, e);
            None
        }
    }
}

/// PNG bytes of a node's main image, if it has one.
fn node_analysis_png(store: &Store, node_id: Uuid) -> Option<Vec<u8>> {
    let image = store.node(node_id).and_then(|n| n.image.clone())?;
    match io::encode_png(&image) {
        Ok(data) => Some(data),
        Err(e) => {
            log_warn!("node {} not analyzable: {}", node_id, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_node;
    use image::RgbaImage;

    fn image_asset(pixels: Option<RgbaImage>) -> Asset {
        Asset {
            id: Uuid::new_v4(),
            path: PathBuf::from("ref.png"),
            pixels: pixels.map(Arc::new),
            media: MediaType::Image,
        }
    }

    #[test]
    fn failed_enhancement_keeps_prompt_and_raises_no_banner() {
        let mut app = CineBoardApp::default();
        app.deck.prompt = "a rainy alley at dawn".to_string();
        app.enhancing = true;
        app.text_sender
            .send(TextResult::Enhanced(Err(AiError::Network(
                "connect timed out".to_string(),
            ))))
            .unwrap();
        app.drain_channels();
        assert!(!app.enhancing);
        assert_eq!(app.deck.prompt, "a rainy alley at dawn");
        assert!(app.error_banner.is_none());
    }

    #[test]
    fn camera_prompt_caption_lands_in_the_analysis_area() {
        let mut app = CineBoardApp::default();
        app.camera_prompt_pending = true;
        app.text_sender
            .send(TextResult::CameraPrompt(
                "Slow dolly-in through the rain.".to_string(),
            ))
            .unwrap();
        app.drain_channels();
        assert!(!app.camera_prompt_pending);
        assert_eq!(
            app.analysis.as_deref(),
            Some("Slow dolly-in through the rain.")
        );
    }

    #[test]
    fn reselecting_an_asset_clears_stale_analysis() {
        let mut app = CineBoardApp::default();
        let asset = image_asset(Some(RgbaImage::new(2, 2)));
        let id = asset.id;
        app.store.add_asset(asset);
        app.select_asset(id);
        app.analysis = Some("a moody close-up".to_string());
        app.select_asset(id);
        assert!(app.analysis.is_none());
        assert_eq!(app.selection.asset, Some(id));
    }

    #[test]
    fn render_nodes_are_analyzable_sources() {
        let mut store = Store::new();
        let mut with_image = test_node(NodeType::Render, None);
        with_image.image = Some(Arc::new(RgbaImage::new(4, 4)));
        let imaged_id = with_image.id;
        store.add_node(with_image);
        let bare = test_node(NodeType::Render, None);
        let bare_id = bare.id;
        store.add_node(bare);

        assert!(node_analysis_png(&store, imaged_id).is_some());
        assert!(node_analysis_png(&store, bare_id).is_none());
    }

    #[test]
    fn assets_without_pixels_are_not_analyzable() {
        let mut store = Store::new();
        let video = Asset {
            id: Uuid::new_v4(),
            path: PathBuf::from("take.mp4"),
            pixels: None,
            media: MediaType::Video,
        };
        let video_id = video.id;
        store.add_asset(video);
        let still = image_asset(Some(RgbaImage::new(2, 2)));
        let still_id = still.id;
        store.add_asset(still);

        assert!(asset_analysis_png(&store, video_id).is_none());
        assert!(asset_analysis_png(&store, still_id).is_some());
    }

    #[test]
    fn generation_completion_clears_the_blocking_state() {
        let mut app = CineBoardApp::default();
        app.generating = true;
        app.deck.prompt = "wide establishing shot".to_string();
        let node = test_node(NodeType::Render, None);
        let id = node.id;
        app.gen_sender
            .send(GenMessage::Done(Box::new(Ok(node))))
            .unwrap();
        app.drain_channels();
        assert!(!app.generating);
        assert_eq!(app.selection.node, Some(id));
        assert!(app.deck.prompt.is_empty());
    }
}
