#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use cineboard::app::CineBoardApp;
use cineboard::logger;

fn main() -> eframe::Result<()> {
    // Session log truncates on every start.
    logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_maximized(true)
            .with_title("CineBoard"),
        ..Default::default()
    };

    eframe::run_native(
        "CineBoard",
        options,
        Box::new(|cc| Box::new(CineBoardApp::new(cc))),
    )
}
