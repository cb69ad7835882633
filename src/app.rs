use eframe::egui;

use crate::input::WheelAccumulator;
use crate::render::{self, Overlay};
use crate::viewer::{Pane, SliceViewer, ViewerEvent};

/// Requests coming from the menu bar and window, applied after layout.
#[derive(Debug, Clone, PartialEq)]
enum UiAction {
    OpenImage(String),
    OpenMask(String),
    Clear,
    ShowMask(bool),
    Transparency(f32),
}

pub struct ViewerApp {
    viewer: SliceViewer,
    textures: Vec<(Pane, egui::TextureHandle)>,
    rendered_generation: Option<u64>,
    wheel: [WheelAccumulator; 3],
}

impl ViewerApp {
    pub fn new(viewer: SliceViewer) -> Self {
        Self {
            viewer,
            textures: Vec::new(),
            rendered_generation: None,
            wheel: [WheelAccumulator::default(); 3],
        }
    }

    fn apply(&mut self, action: UiAction) {
        let result = match action {
            UiAction::OpenImage(path) => {
                let mask = self.viewer.mask_path().to_owned();
                self.viewer.set_paths(path, mask, None)
            }
            UiAction::OpenMask(path) => {
                let image = self.viewer.image_path().to_owned();
                self.viewer.set_paths(image, path, None)
            }
            UiAction::Clear => self.viewer.set_paths("", "", None),
            UiAction::ShowMask(visible) => self.viewer.set_mask_visible(visible),
            UiAction::Transparency(alpha) => {
                self.viewer.set_mask_transparency(alpha);
                Ok(())
            }
        };
        // the viewer keeps the message for the error label
        if let Err(err) = result {
            log::debug!("UI action failed: {err:#}");
        }
    }

    /// Rebuild pane textures when the viewer asked for a re-render.
    fn refresh_textures(&mut self, ctx: &egui::Context) {
        let generation = self.viewer.render_generation();
        if self.rendered_generation == Some(generation) {
            return;
        }
        self.rendered_generation = Some(generation);

        let range = self.viewer.intensity_range();
        let alpha = self.viewer.mask_transparency();
        self.textures = self
            .viewer
            .pane_slices()
            .into_iter()
            .map(|slice| {
                let overlay = slice.mask.map(|mask| Overlay { mask, alpha });
                let image = render::slice_to_color_image(slice.image, range, overlay);
                let texture =
                    ctx.load_texture(slice.pane.label(), image, egui::TextureOptions::LINEAR);
                (slice.pane, texture)
            })
            .collect();
    }

    fn menu_bar(&self, ui: &mut egui::Ui, actions: &mut Vec<UiAction>) {
        egui::MenuBar::new().ui(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Open image…").clicked() {
                    ui.close();
                    if let Some(path) = pick_nifti() {
                        actions.push(UiAction::OpenImage(path));
                    }
                }
                if ui.button("Open mask…").clicked() {
                    ui.close();
                    if let Some(path) = pick_nifti() {
                        actions.push(UiAction::OpenMask(path));
                    }
                }
                ui.separator();
                if ui.button("Clear").clicked() {
                    ui.close();
                    actions.push(UiAction::Clear);
                }
            });

            ui.separator();
            let mut visible = self.viewer.mask_visible();
            if ui.checkbox(&mut visible, "Show mask").changed() {
                actions.push(UiAction::ShowMask(visible));
            }
            let mut alpha = self.viewer.mask_transparency();
            let slider = egui::Slider::new(&mut alpha, 0.0..=1.0).text("Mask alpha");
            if ui.add(slider).changed() {
                actions.push(UiAction::Transparency(alpha));
            }
            if let Some([x, y, z]) = self.viewer.volume_shape() {
                ui.separator();
                ui.label(format!("{x} × {y} × {z}"));
            }
        });
    }

    fn show_panes(&mut self, ui: &mut egui::Ui) -> Vec<ViewerEvent> {
        let mut events = Vec::new();
        let avail = ui.available_size();
        let spacing = ui.spacing().item_spacing;
        let cell = egui::vec2((avail.x - 2.0 * spacing.x) / 3.0, avail.y);

        let overlay_bg = egui::Color32::from_black_alpha(160);
        let label_font = egui::FontId::proportional(14.0);
        let strip_h = 22.0;
        let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));

        ui.horizontal(|ui| {
            for (pane, texture) in &self.textures {
                let [w, h] = texture.size();
                let [vox_w, vox_h] = self.viewer.pane_spacing(*pane);
                let size = render::fit_size(w, h, vox_w, vox_h, cell.x, cell.y - strip_h);
                let caption = pane_caption(&self.viewer, *pane);
                let color = pane_color(*pane);

                ui.allocate_ui(cell, |ui| {
                    let (cell_rect, _) = ui.allocate_exact_size(cell, egui::Sense::hover());
                    let offset = egui::vec2(
                        (cell.x - size.x) / 2.0,
                        strip_h + (cell.y - strip_h - size.y) / 2.0,
                    );
                    let img_rect = egui::Rect::from_min_size(cell_rect.min + offset, size);
                    ui.painter()
                        .image(texture.id(), img_rect, uv, egui::Color32::WHITE);

                    let label_strip = egui::Rect::from_min_size(
                        cell_rect.min,
                        egui::vec2(cell_rect.width(), strip_h),
                    );
                    ui.painter().rect_filled(label_strip, 0.0, overlay_bg);
                    ui.painter().text(
                        label_strip.left_center() + egui::vec2(6.0, 0.0),
                        egui::Align2::LEFT_CENTER,
                        caption,
                        label_font.clone(),
                        color,
                    );

                    let wheel = &mut self.wheel[pane.axis()];
                    if ui.rect_contains_pointer(cell_rect) {
                        let delta = ui.input(|i| i.raw_scroll_delta.y);
                        for direction in wheel.feed(delta) {
                            events.push(ViewerEvent::Scroll {
                                pane: *pane,
                                direction,
                            });
                        }
                    } else {
                        wheel.reset();
                    }
                });
            }
        });
        events
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.viewport().close_requested()) {
            self.viewer.handle(ViewerEvent::Close);
            self.textures.clear();
        }

        let mut actions = Vec::new();
        let dropped = ctx.input(|i| i.raw.dropped_files.iter().find_map(|f| f.path.clone()));
        if let Some(path) = dropped {
            actions.push(UiAction::OpenImage(path.to_string_lossy().into_owned()));
        }

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            self.menu_bar(ui, &mut actions);
            if let Some(msg) = self.viewer.last_error() {
                ui.colored_label(egui::Color32::RED, msg);
            }
        });

        for action in actions {
            self.apply(action);
        }
        self.refresh_textures(ctx);

        let frame = egui::Frame::new()
            .fill(egui::Color32::BLACK)
            .inner_margin(0.0);
        let events = egui::CentralPanel::default()
            .frame(frame)
            .show(ctx, |ui| {
                if self.textures.is_empty() {
                    ui.centered_and_justified(|ui| {
                        ui.label(
                            egui::RichText::new(
                                "No volume loaded.\nUse File > Open image… or drop a NIfTI file.",
                            )
                            .color(egui::Color32::GRAY)
                            .size(20.0),
                        );
                    });
                    return Vec::new();
                }
                self.show_panes(ui)
            })
            .inner;

        for event in events {
            self.viewer.handle(event);
        }
        if self.rendered_generation != Some(self.viewer.render_generation()) {
            ctx.request_repaint();
        }
    }
}

fn pick_nifti() -> Option<String> {
    rfd::FileDialog::new()
        .add_filter("NIfTI", &["nii", "gz"])
        .pick_file()
        .map(|path| path.to_string_lossy().into_owned())
}

fn pane_color(pane: Pane) -> egui::Color32 {
    match pane {
        Pane::Axial => egui::Color32::YELLOW,
        Pane::Sagittal => egui::Color32::RED,
        Pane::Coronal => egui::Color32::GREEN,
    }
}

fn pane_caption(viewer: &SliceViewer, pane: Pane) -> String {
    let extent = viewer.extent(pane).unwrap_or(0);
    let mut caption = format!("{}  {} / {}", pane.label(), viewer.cursor(pane), extent);
    if let Some(mm) = viewer.position_mm(pane) {
        caption.push_str(&format!("  ({mm:.1} mm)"));
    }
    caption
}
