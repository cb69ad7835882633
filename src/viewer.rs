use anyhow::Result;
use ndarray::{Array3, ArrayView2, Axis};

use crate::config::{clamp_transparency, AppService, ViewerConfig};
use crate::error::ViewerError;
use crate::loader::{LoadedVolume, VolumeLoader};

/// Slice step for one wheel notch.
const SCROLL_STEP: isize = 2;

/// One of the three display regions. Each pane fixes one array axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pane {
    Axial,
    Sagittal,
    Coronal,
}

impl Pane {
    pub const ALL: [Pane; 3] = [Pane::Axial, Pane::Sagittal, Pane::Coronal];

    /// Array axis held fixed at the cursor.
    pub fn axis(self) -> usize {
        match self {
            Pane::Axial => 0,
            Pane::Sagittal => 1,
            Pane::Coronal => 2,
        }
    }

    /// Remaining axes, in the order they appear in the 2D slice.
    pub fn slice_axes(self) -> [usize; 2] {
        match self {
            Pane::Axial => [1, 2],
            Pane::Sagittal => [0, 2],
            Pane::Coronal => [0, 1],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Pane::Axial => "Axial",
            Pane::Sagittal => "Sagittal",
            Pane::Coronal => "Coronal",
        }
    }
}

/// One wheel notch. Anything that is not a notch never becomes an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelDirection {
    Up,
    Down,
}

impl WheelDirection {
    pub fn slice_delta(self) -> isize {
        match self {
            WheelDirection::Up => SCROLL_STEP,
            WheelDirection::Down => -SCROLL_STEP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerEvent {
    Scroll { pane: Pane, direction: WheelDirection },
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskState {
    #[default]
    NoMask,
    Loaded,
    /// A mask was given but did not fit the volume.
    Discarded,
}

/// What one pane should show right now.
#[derive(Debug, Clone)]
pub struct PaneSlice<'a> {
    pub pane: Pane,
    pub image: ArrayView2<'a, f32>,
    pub mask: Option<ArrayView2<'a, f32>>,
}

/// Owns the volume, the optional mask and the three slice cursors.
pub struct SliceViewer {
    config: ViewerConfig,
    loader: Box<dyn VolumeLoader>,
    service: Box<dyn AppService>,
    volume: Option<LoadedVolume>,
    mask: Option<Array3<f32>>,
    mask_state: MaskState,
    intensity_range: (f32, f32),
    cursors: [usize; 3],
    last_error: Option<String>,
    render_generation: u64,
}

impl SliceViewer {
    pub fn new(
        config: ViewerConfig,
        loader: Box<dyn VolumeLoader>,
        service: Box<dyn AppService>,
    ) -> Self {
        let config = ViewerConfig {
            mask_transparency: clamp_transparency(config.mask_transparency),
            ..config
        };
        Self {
            config,
            loader,
            service,
            volume: None,
            mask: None,
            mask_state: MaskState::NoMask,
            intensity_range: (0.0, 1.0),
            cursors: [0; 3],
            last_error: None,
            render_generation: 0,
        }
    }

    pub fn set_paths(
        &mut self,
        image_path: impl Into<String>,
        mask_path: impl Into<String>,
        transparency: Option<f32>,
    ) -> Result<()> {
        self.config.image_path = image_path.into();
        self.config.mask_path = mask_path.into();
        if let Some(value) = transparency {
            self.config.mask_transparency = clamp_transparency(value);
        }
        self.reload()
    }

    /// Load the image and mask named by the current paths.
    ///
    /// A failing image load clears everything; a failing mask load keeps the
    /// image. Both are returned to the caller. A mask of the wrong shape is
    /// not an error here: it is dropped and reported through
    /// [`SliceViewer::last_error`].
    pub fn reload(&mut self) -> Result<()> {
        self.last_error = None;
        self.mask = None;
        self.mask_state = MaskState::NoMask;

        let result = self.reload_volume().and_then(|()| self.reload_mask());
        if let Err(err) = &result {
            log::warn!("Reload failed: {err:#}");
            self.last_error = Some(format!("Failed to load: {err:#}"));
        }
        self.request_render();
        result
    }

    fn reload_volume(&mut self) -> Result<()> {
        self.volume = None;
        self.intensity_range = (0.0, 1.0);
        self.cursors = [0; 3];
        if self.config.image_path.is_empty() {
            return Ok(());
        }

        let volume = self.loader.load(&self.config.image_path)?;
        if volume.data.is_empty() {
            return Err(ViewerError::EmptyVolume {
                path: self.config.image_path.clone(),
                shape: volume.data.shape().to_vec(),
            }
            .into());
        }
        let (x, y, z) = volume.data.dim();
        self.intensity_range = intensity_range(&volume.data);
        self.cursors = [x / 2, y / 2, z / 2];
        log::info!(
            "Image {} shape {:?}, intensity range {:?}",
            self.config.image_path,
            volume.data.shape(),
            self.intensity_range
        );
        self.volume = Some(volume);
        Ok(())
    }

    fn reload_mask(&mut self) -> Result<()> {
        if self.config.mask_path.is_empty() {
            return Ok(());
        }

        let mask = self.loader.load(&self.config.mask_path)?.data;
        match self.check_mask_shape(&mask) {
            Ok(()) => {
                self.mask = Some(mask);
                self.mask_state = MaskState::Loaded;
            }
            Err(err) => {
                log::error!("{err}");
                self.last_error = Some(err.to_string());
                self.mask_state = MaskState::Discarded;
            }
        }
        Ok(())
    }

    fn check_mask_shape(&self, mask: &Array3<f32>) -> Result<(), ViewerError> {
        let Some(volume) = &self.volume else {
            return Err(ViewerError::MaskWithoutVolume {
                path: self.config.mask_path.clone(),
            });
        };
        if mask.shape() != volume.data.shape() {
            return Err(ViewerError::MaskShapeMismatch {
                mask: mask.shape().to_vec(),
                volume: volume.data.shape().to_vec(),
            });
        }
        Ok(())
    }

    pub fn set_mask_transparency(&mut self, value: f32) {
        self.config.mask_transparency = clamp_transparency(value);
        self.request_render();
    }

    /// Show or hide the overlay. Without a mask path, the default image and
    /// label from the [`AppService`] are loaded first.
    ///
    /// That reload replaces the current image too, so hiding the overlay of
    /// an image opened without a mask clears it when the service has no
    /// defaults.
    pub fn set_mask_visible(&mut self, visible: bool) -> Result<()> {
        if self.config.mask_path.is_empty() {
            let image = self.service.get_image_path();
            let label = self.service.get_label_path();
            log::info!("No mask set, loading defaults {image:?} / {label:?}");
            self.set_paths(image, label, None)?;
        }
        self.config.mask_visible = visible;
        self.request_render();
        Ok(())
    }

    pub fn handle(&mut self, event: ViewerEvent) {
        match event {
            ViewerEvent::Scroll { pane, direction } => {
                if self.move_slice(pane, direction.slice_delta()) {
                    self.request_render();
                }
            }
            ViewerEvent::Close => self.close(),
        }
    }

    fn move_slice(&mut self, pane: Pane, delta: isize) -> bool {
        let Some(extent) = self.extent(pane) else {
            return false;
        };
        if delta == 0 || extent == 0 {
            return false;
        }
        let axis = pane.axis();
        let next = (self.cursors[axis] as isize + delta).rem_euclid(extent as isize);
        self.cursors[axis] = next as usize;
        true
    }

    /// Drop the loaded data; nothing is drawn afterwards.
    fn close(&mut self) {
        log::debug!("Viewer closed, releasing volume data");
        self.volume = None;
        self.mask = None;
        self.mask_state = MaskState::NoMask;
        self.request_render();
    }

    fn request_render(&mut self) {
        self.render_generation = self.render_generation.wrapping_add(1);
    }

    /// Changes whenever the panes need to be redrawn.
    pub fn render_generation(&self) -> u64 {
        self.render_generation
    }

    /// The 2D slices to draw, one per pane, or nothing without a volume.
    pub fn pane_slices(&self) -> Vec<PaneSlice<'_>> {
        let Some(volume) = &self.volume else {
            return Vec::new();
        };
        let mask = self.visible_mask();
        Pane::ALL
            .iter()
            .map(|&pane| {
                let axis = Axis(pane.axis());
                let cursor = self.cursors[pane.axis()];
                PaneSlice {
                    pane,
                    image: volume.data.index_axis(axis, cursor),
                    mask: mask.map(|m| m.index_axis(axis, cursor)),
                }
            })
            .collect()
    }

    fn visible_mask(&self) -> Option<&Array3<f32>> {
        if self.config.mask_visible && self.mask_state == MaskState::Loaded {
            self.mask.as_ref()
        } else {
            None
        }
    }

    pub fn cursor(&self, pane: Pane) -> usize {
        self.cursors[pane.axis()]
    }

    pub fn extent(&self, pane: Pane) -> Option<usize> {
        self.volume.as_ref().map(|v| v.data.shape()[pane.axis()])
    }

    pub fn volume_shape(&self) -> Option<[usize; 3]> {
        self.volume.as_ref().map(|v| {
            let (x, y, z) = v.data.dim();
            [x, y, z]
        })
    }

    /// Voxel spacing along the horizontal and vertical axis of a pane.
    pub fn pane_spacing(&self, pane: Pane) -> [f32; 2] {
        let voxdim = self
            .volume
            .as_ref()
            .map(|v| v.meta.voxdim)
            .unwrap_or([1.0; 3]);
        pane.slice_axes().map(|axis| voxdim[axis])
    }

    /// World position in mm of the slice shown in a pane.
    pub fn position_mm(&self, pane: Pane) -> Option<f32> {
        let volume = self.volume.as_ref()?;
        Some(volume.meta.voxel_to_mm(pane.axis(), self.cursor(pane)))
    }

    pub fn intensity_range(&self) -> (f32, f32) {
        self.intensity_range
    }

    pub fn mask_state(&self) -> MaskState {
        self.mask_state
    }

    pub fn mask_transparency(&self) -> f32 {
        self.config.mask_transparency
    }

    pub fn mask_visible(&self) -> bool {
        self.config.mask_visible
    }

    pub fn image_path(&self) -> &str {
        &self.config.image_path
    }

    pub fn mask_path(&self) -> &str {
        &self.config.mask_path
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

/// Global min and max, skipping NaN. Falls back to (0, 1) when empty.
fn intensity_range(data: &Array3<f32>) -> (f32, f32) {
    let (min, max) = data
        .iter()
        .filter(|v| !v.is_nan())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if min > max {
        (0.0, 1.0)
    } else {
        (min, max)
    }
}
