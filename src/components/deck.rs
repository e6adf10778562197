//! Director deck — the prompt and generation controls at the bottom of the
//! left panel. The deck owns the draft parameters; submitting hands a
//! snapshot to the app for dispatch.

use egui::Color32;

const ACCENT: Color32 = Color32::from_rgb(201, 255, 86);

pub const ASPECT_RATIOS: &[&str] = &["16:9", "9:16", "1:1", "4:3", "3:4"];
pub const IMAGE_SIZES: &[&str] = &["1K", "2K"];

/// Panel layout of the generated board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridLayout {
    Single,
    TwoByTwo,
    ThreeByThree,
}

impl GridLayout {
    pub fn dims(self) -> (u32, u32) {
        match self {
            GridLayout::Single => (1, 1),
            GridLayout::TwoByTwo => (2, 2),
            GridLayout::ThreeByThree => (3, 3),
        }
    }

    fn label(self) -> &'static str {
        match self {
            GridLayout::Single => "Single frame",
            GridLayout::TwoByTwo => "2x2 board",
            GridLayout::ThreeByThree => "3x3 board",
        }
    }
}

pub struct DeckState {
    pub prompt: String,
    pub aspect_ratio: String,
    pub layout: GridLayout,
    pub image_size: String,
}

impl Default for DeckState {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            aspect_ratio: "16:9".to_string(),
            layout: GridLayout::TwoByTwo,
            image_size: "1K".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeckAction {
    Generate,
    EnhancePrompt,
    CameraPrompt,
}

pub fn show(
    ui: &mut egui::Ui,
    state: &mut DeckState,
    busy: bool,
    enhancing: bool,
    directing: bool,
    continuing: bool,
) -> Vec<DeckAction> {
    let mut actions = Vec::new();

    ui.label(
        egui::RichText::new("DIRECTOR DECK")
            .monospace()
            .size(10.0)
            .color(Color32::from_gray(140)),
    );
    if continuing {
        ui.label(
            egui::RichText::new("Continuing from selected scene board")
                .size(9.0)
                .color(ACCENT),
        );
    }
    ui.add_space(4.0);

    ui.add(
        egui::TextEdit::multiline(&mut state.prompt)
            .hint_text("Describe the scene, blocking and mood...")
            .desired_rows(4)
            .desired_width(f32::INFINITY)
            .font(egui::TextStyle::Monospace),
    );

    ui.add_space(4.0);
    ui.horizontal(|ui| {
        egui::ComboBox::from_id_source("deck_aspect")
            .selected_text(state.aspect_ratio.as_str())
            .width(66.0)
            .show_ui(ui, |ui| {
                for ar in ASPECT_RATIOS {
                    ui.selectable_value(&mut state.aspect_ratio, (*ar).to_string(), *ar);
                }
            });
        egui::ComboBox::from_id_source("deck_layout")
            .selected_text(state.layout.label())
            .width(100.0)
            .show_ui(ui, |ui| {
                for layout in [
                    GridLayout::Single,
                    GridLayout::TwoByTwo,
                    GridLayout::ThreeByThree,
                ] {
                    ui.selectable_value(&mut state.layout, layout, layout.label());
                }
            });
        egui::ComboBox::from_id_source("deck_size")
            .selected_text(state.image_size.as_str())
            .width(50.0)
            .show_ui(ui, |ui| {
                for size in IMAGE_SIZES {
                    ui.selectable_value(&mut state.image_size, (*size).to_string(), *size);
                }
            });
    });

    ui.add_space(6.0);
    ui.horizontal(|ui| {
        let can_submit = !busy && !state.prompt.trim().is_empty();
        if ui
            .add_enabled(
                can_submit && !enhancing,
                egui::Button::new(egui::RichText::new("✨ Enhance").size(10.0)),
            )
            .on_hover_text("Rewrite the prompt with cinematic detail")
            .clicked()
        {
            actions.push(DeckAction::EnhancePrompt);
        }
        if ui
            .add_enabled(
                can_submit && !directing,
                egui::Button::new(egui::RichText::new("🎥 Camera").size(10.0)),
            )
            .on_hover_text("Caption a camera movement for this prompt")
            .clicked()
        {
            actions.push(DeckAction::CameraPrompt);
        }
        let generate_label = if busy {
            "Generating..."
        } else if continuing {
            "Continue Scene"
        } else {
            "Generate Board"
        };
        if ui
            .add_enabled(
                can_submit,
                egui::Button::new(
                    egui::RichText::new(generate_label)
                        .size(11.0)
                        .color(Color32::BLACK),
                )
                .fill(ACCENT),
            )
            .clicked()
        {
            actions.push(DeckAction::Generate);
        }
    });

    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_dims_match_labels() {
        assert_eq!(GridLayout::Single.dims(), (1, 1));
        assert_eq!(GridLayout::TwoByTwo.dims(), (2, 2));
        assert_eq!(GridLayout::ThreeByThree.dims(), (3, 3));
    }
}
