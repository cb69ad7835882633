mod app;
mod config;
mod error;
mod input;
mod loader;
mod render;
mod viewer;

use anyhow::Result;
use clap::Parser;
use eframe::egui;

use crate::app::ViewerApp;
use crate::config::{Args, LaunchPaths, ViewerConfig};
use crate::loader::NiftiLoader;
use crate::viewer::SliceViewer;

fn main() -> Result<()> {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_secs()
        .try_init();

    let args = Args::parse();
    let mut viewer = SliceViewer::new(
        ViewerConfig::from(&args),
        Box::new(NiftiLoader::new(args.reorient)),
        Box::new(LaunchPaths::from(&args)),
    );
    // startup load failures are shown in the window, not fatal
    if let Err(err) = viewer.reload() {
        log::error!("Initial load failed: {err:#}");
    }

    let app = ViewerApp::new(viewer);
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 480.0])
            .with_drag_and_drop(true),
        ..Default::default()
    };
    eframe::run_native(
        "NIfTI Tri-Slice Viewer",
        native_options,
        Box::new(|_cc| Ok(Box::new(app))),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))
}
