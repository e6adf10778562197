//! Inspector — the right panel detailing whatever is selected, one entity
//! at a time.

use egui::{Color32, Pos2, Rect, Rounding, Sense, Stroke, Vec2};
use uuid::Uuid;

use crate::store::{Asset, GraphNode, MediaType, NodeType, Selection, Store};
use crate::textures::{TexKey, TextureCache};

const ACCENT: Color32 = Color32::from_rgb(201, 255, 86);
const TEXT_DIM: Color32 = Color32::from_gray(120);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InspectorAction {
    AnalyzeAsset(Uuid),
    AnalyzeNode(Uuid),
    RemoveAsset(Uuid),
    DeleteNode(Uuid),
    GenerateCamera(Uuid),
}

pub fn show(
    ui: &mut egui::Ui,
    store: &Store,
    selection: &Selection,
    textures: &mut TextureCache,
    instruction: &mut String,
    analysis: Option<&str>,
    analyzing: bool,
    camera_busy: bool,
) -> Vec<InspectorAction> {
    let mut actions = Vec::new();

    ui.label(
        egui::RichText::new("INSPECTOR")
            .monospace()
            .size(10.0)
            .color(TEXT_DIM),
    );
    ui.add_space(6.0);

    if let Some(asset) = selection.asset.and_then(|id| store.asset(id)) {
        asset_section(
            ui,
            asset,
            textures,
            instruction,
            analysis,
            analyzing,
            &mut actions,
        );
    } else if let Some(node) = selection.node.and_then(|id| store.node(id)) {
        node_section(
            ui,
            node,
            textures,
            instruction,
            analysis,
            analyzing,
            camera_busy,
            &mut actions,
        );
    } else {
        ui.label(
            egui::RichText::new("Select a reference or a board node to inspect it.")
                .size(10.0)
                .color(TEXT_DIM),
        );
        // Camera-prompt captions land here after the selection is cleared.
        if let Some(text) = analysis {
            ui.add_space(6.0);
            analysis_text(ui, text);
        }
    }
    actions
}

fn asset_section(
    ui: &mut egui::Ui,
    asset: &Asset,
    textures: &mut TextureCache,
    instruction: &mut String,
    analysis: Option<&str>,
    analyzing: bool,
    actions: &mut Vec<InspectorAction>,
) {
    ui.label(egui::RichText::new(asset.name()).size(11.0).strong());
    ui.label(
        egui::RichText::new(match asset.media {
            MediaType::Image => "Reference still",
            MediaType::Video => "Reference clip (listed only, frames not decoded)",
        })
        .size(9.0)
        .color(TEXT_DIM),
    );
    ui.add_space(6.0);

    if let Some(pixels) = &asset.pixels {
        preview(ui, textures, TexKey::Asset(asset.id), pixels);
    }
    ui.add_space(6.0);

    match asset.media {
        MediaType::Image => {
            if analysis_controls(ui, instruction, analyzing) {
                actions.push(InspectorAction::AnalyzeAsset(asset.id));
            }
            if let Some(text) = analysis {
                analysis_text(ui, text);
            }
        }
        MediaType::Video => {}
    }

    ui.add_space(8.0);
    if ui
        .button(egui::RichText::new("Remove from bay").size(10.0).color(Color32::from_rgb(240, 120, 120)))
        .clicked()
    {
        actions.push(InspectorAction::RemoveAsset(asset.id));
    }
}

fn node_section(
    ui: &mut egui::Ui,
    node: &GraphNode,
    textures: &mut TextureCache,
    instruction: &mut String,
    analysis: Option<&str>,
    analyzing: bool,
    camera_busy: bool,
    actions: &mut Vec<InspectorAction>,
) {
    ui.label(egui::RichText::new(node.node_type.label()).size(11.0).strong().color(ACCENT));
    ui.label(
        egui::RichText::new(format!("ID: {}", node.id))
            .size(8.0)
            .color(TEXT_DIM),
    );
    ui.add_space(6.0);

    if let Some(img) = &node.image {
        preview(ui, textures, TexKey::NodeMain(node.id), img);
        ui.add_space(6.0);
    }

    if !node.text_data.is_empty() {
        field(ui, "DIRECTIVE", &node.text_data);
    }
    field(ui, "ASPECT", &node.aspect_ratio);
    if !node.slices.is_empty() {
        field(ui, "PANELS", &node.slices.len().to_string());
    }

    if node.node_type == NodeType::Render {
        ui.add_space(4.0);
        match &node.camera_description {
            Some(camera) => field(ui, "CAMERA", camera),
            None => {
                ui.label(egui::RichText::new("CAMERA").size(8.0).color(TEXT_DIM));
                ui.label(egui::RichText::new("Not annotated yet.").size(9.0).color(TEXT_DIM));
            }
        }
        let label = if camera_busy { "Directing..." } else { "🎥 Suggest Camera Move" };
        if ui
            .add_enabled(!camera_busy, egui::Button::new(egui::RichText::new(label).size(10.0)))
            .clicked()
        {
            actions.push(InspectorAction::GenerateCamera(node.id));
        }
    }

    if node.image.is_some() {
        ui.add_space(6.0);
        if analysis_controls(ui, instruction, analyzing) {
            actions.push(InspectorAction::AnalyzeNode(node.id));
        }
        if let Some(text) = analysis {
            analysis_text(ui, text);
        }
    }

    ui.add_space(8.0);
    if ui
        .button(egui::RichText::new("Delete node").size(10.0).color(Color32::from_rgb(240, 120, 120)))
        .clicked()
    {
        actions.push(InspectorAction::DeleteNode(node.id));
    }
}

/// Instruction box plus the analyze button. Returns true when a run was
/// requested.
fn analysis_controls(ui: &mut egui::Ui, instruction: &mut String, analyzing: bool) -> bool {
    ui.label(egui::RichText::new("ANALYTICS COMMAND").size(8.0).color(TEXT_DIM));
    ui.add(
        egui::TextEdit::multiline(instruction)
            .desired_rows(2)
            .desired_width(f32::INFINITY)
            .font(egui::TextStyle::Monospace),
    );
    let label = if analyzing { "Analyzing..." } else { "🔍 Analyze" };
    ui.add_enabled(
        !analyzing && !instruction.trim().is_empty(),
        egui::Button::new(egui::RichText::new(label).size(10.0)),
    )
    .on_hover_text("Run the vision model with the command above")
    .clicked()
}

fn analysis_text(ui: &mut egui::Ui, text: &str) {
    ui.add_space(4.0);
    egui::ScrollArea::vertical()
        .id_source("analysis_scroll")
        .max_height(160.0)
        .show(ui, |ui| {
            ui.label(egui::RichText::new(text).size(10.0).color(Color32::from_gray(200)));
        });
}

fn field(ui: &mut egui::Ui, label: &str, value: &str) {
    ui.label(egui::RichText::new(label).size(8.0).color(TEXT_DIM));
    ui.label(egui::RichText::new(value).size(10.0).color(Color32::from_gray(210)));
    ui.add_space(4.0);
}

fn preview(
    ui: &mut egui::Ui,
    textures: &mut TextureCache,
    key: TexKey,
    pixels: &image::RgbaImage,
) {
    let aspect = pixels.height() as f32 / pixels.width() as f32;
    let w = ui.available_width();
    let (rect, _) = ui.allocate_exact_size(Vec2::new(w, w * aspect), Sense::hover());
    let painter = ui.painter_at(rect);
    let tex = textures.get_or_upload(ui.ctx(), key, pixels);
    painter.image(
        tex.id(),
        rect,
        Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
        Color32::WHITE,
    );
    painter.rect_stroke(rect, Rounding::same(2.0), Stroke::new(1.0, Color32::from_gray(50)));
}
