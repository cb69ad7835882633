use clap::Parser;

pub const DEFAULT_MASK_TRANSPARENCY: f32 = 0.333;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "nifti-trislice", version, about = "Axial, sagittal and coronal NIfTI viewer with mask overlay")]
pub struct Args {
    /// Image volume to open on startup
    #[arg(long, value_name = "PATH")]
    pub image: Option<String>,

    /// Label mask to overlay on the image
    #[arg(long, value_name = "PATH")]
    pub mask: Option<String>,

    /// Mask overlay transparency, clamped to [0, 1]
    #[arg(long, value_name = "ALPHA")]
    pub transparency: Option<f32>,

    /// Start with the mask overlay hidden
    #[arg(long)]
    pub hide_mask: bool,

    /// Reorder volume axes from the header affine so each pane shows its
    /// anatomical plane
    #[arg(long)]
    pub reorient: bool,

    /// Image path used when the mask is shown before any mask is set
    #[arg(long, env = "TRISLICE_DEFAULT_IMAGE", value_name = "PATH")]
    pub default_image: Option<String>,

    /// Label path used when the mask is shown before any mask is set
    #[arg(long, env = "TRISLICE_DEFAULT_LABEL", value_name = "PATH")]
    pub default_label: Option<String>,
}

/// Per-instance viewer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub image_path: String,
    pub mask_path: String,
    pub mask_transparency: f32,
    pub mask_visible: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            image_path: String::new(),
            mask_path: String::new(),
            mask_transparency: DEFAULT_MASK_TRANSPARENCY,
            mask_visible: true,
        }
    }
}

impl From<&Args> for ViewerConfig {
    fn from(args: &Args) -> Self {
        Self {
            image_path: args.image.clone().unwrap_or_default(),
            mask_path: args.mask.clone().unwrap_or_default(),
            mask_transparency: args
                .transparency
                .map(clamp_transparency)
                .unwrap_or(DEFAULT_MASK_TRANSPARENCY),
            mask_visible: !args.hide_mask,
        }
    }
}

pub fn clamp_transparency(value: f32) -> f32 {
    if value.is_nan() {
        return DEFAULT_MASK_TRANSPARENCY;
    }
    value.clamp(0.0, 1.0)
}

/// Application-wide state that knows which image and label to show by default.
pub trait AppService {
    fn get_image_path(&self) -> String;
    fn get_label_path(&self) -> String;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchPaths {
    pub image: String,
    pub label: String,
}

impl From<&Args> for LaunchPaths {
    fn from(args: &Args) -> Self {
        Self {
            image: args.default_image.clone().unwrap_or_default(),
            label: args.default_label.clone().unwrap_or_default(),
        }
    }
}

impl AppService for LaunchPaths {
    fn get_image_path(&self) -> String {
        self.image.clone()
    }

    fn get_label_path(&self) -> String {
        self.label.clone()
    }
}
