//! Asset bay — the reference library strip at the top of the left panel.

use egui::{Align2, Color32, FontId, Pos2, Rect, Rounding, Sense, Stroke, Vec2};
use uuid::Uuid;

use crate::store::{MediaType, Selection, Store};
use crate::textures::{TexKey, TextureCache};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetBayAction {
    ImportFiles,
    OpenCollageEditor,
    SelectAsset(Uuid),
    RemoveAsset(Uuid),
}

pub fn show(
    ui: &mut egui::Ui,
    store: &Store,
    selection: &Selection,
    textures: &mut TextureCache,
) -> Vec<AssetBayAction> {
    let mut actions = Vec::new();

    ui.horizontal(|ui| {
        ui.label(
            egui::RichText::new("ASSET BAY")
                .monospace()
                .size(10.0)
                .color(Color32::from_gray(140)),
        );
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui
                .button(egui::RichText::new("+ Import").size(10.0))
                .clicked()
            {
                actions.push(AssetBayAction::ImportFiles);
            }
            if ui
                .button(egui::RichText::new("Collage").size(10.0))
                .on_hover_text("Stitch several stills into one reference board")
                .clicked()
            {
                actions.push(AssetBayAction::OpenCollageEditor);
            }
        });
    });
    ui.add_space(4.0);

    if store.list_assets().is_empty() {
        ui.label(
            egui::RichText::new("No references yet. Import stills to ground the look.")
                .size(10.0)
                .color(Color32::from_gray(100)),
        );
        return actions;
    }

    egui::ScrollArea::vertical()
        .id_source("asset_bay_scroll")
        .max_height(180.0)
        .auto_shrink([false, true])
        .show(ui, |ui| {
            let thumb = 56.0;
            let gap = 6.0;
            let cols = ((ui.available_width() + gap) / (thumb + gap)).floor().max(1.0) as usize;
            let assets: Vec<Uuid> = store.list_assets().iter().map(|a| a.id).collect();
            for row in assets.chunks(cols) {
                ui.horizontal(|ui| {
                    for &id in row {
                        asset_tile(ui, store, selection, textures, id, thumb, &mut actions);
                    }
                });
                ui.add_space(gap);
            }
        });
    actions
}

fn asset_tile(
    ui: &mut egui::Ui,
    store: &Store,
    selection: &Selection,
    textures: &mut TextureCache,
    id: Uuid,
    thumb: f32,
    actions: &mut Vec<AssetBayAction>,
) {
    let Some(asset) = store.asset(id) else {
        return;
    };
    let (rect, response) = ui.allocate_exact_size(Vec2::splat(thumb), Sense::click());
    let painter = ui.painter_at(rect);
    let selected = selection.asset == Some(id);
    painter.rect_filled(rect, Rounding::same(2.0), Color32::from_gray(18));
    match (&asset.pixels, asset.media) {
        (Some(pixels), _) => {
            let tex = textures.get_or_upload(ui.ctx(), TexKey::Asset(id), pixels);
            painter.image(
                tex.id(),
                rect,
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        }
        (None, MediaType::Video) => {
            painter.text(
                rect.center(),
                Align2::CENTER_CENTER,
                "▶",
                FontId::proportional(18.0),
                Color32::from_gray(140),
            );
        }
        (None, MediaType::Image) => {}
    }
    painter.rect_stroke(
        rect,
        Rounding::same(2.0),
        Stroke::new(
            1.0,
            if selected {
                Color32::from_rgb(201, 255, 86)
            } else {
                Color32::from_gray(50)
            },
        ),
    );

    if response.clicked() {
        actions.push(AssetBayAction::SelectAsset(id));
    }
    if response.hovered() {
        let close = Rect::from_center_size(
            Pos2::new(rect.max.x - 8.0, rect.min.y + 8.0),
            Vec2::splat(12.0),
        );
        painter.rect_filled(close, Rounding::same(2.0), Color32::from_black_alpha(180));
        painter.text(
            close.center(),
            Align2::CENTER_CENTER,
            "✕",
            FontId::proportional(9.0),
            Color32::WHITE,
        );
        if ui
            .interact(close, ui.id().with(("asset_remove", id)), Sense::click())
            .clicked()
        {
            actions.push(AssetBayAction::RemoveAsset(id));
        }
    }
    response.on_hover_text(asset.name());
}
