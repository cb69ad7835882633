use anyhow::Result;
use ndarray::{Array3, ArrayD, Axis, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::error::ViewerError;

/// Voxel geometry carried alongside a volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeMeta {
    /// Voxel spacing in mm along array axes 0, 1, 2.
    pub voxdim: [f32; 3],
    /// World coordinate (mm) of voxel (0,0,0).
    pub origin: [f32; 3],
}

impl Default for VolumeMeta {
    fn default() -> Self {
        Self {
            voxdim: [1.0; 3],
            origin: [0.0; 3],
        }
    }
}

impl VolumeMeta {
    fn from_header(hdr: &NiftiHeader) -> Self {
        Self {
            voxdim: spacing_or_unit([hdr.pixdim[1], hdr.pixdim[2], hdr.pixdim[3]]),
            origin: Affine::from_header(hdr).translation,
        }
    }

    /// World position in mm of index `idx` along `axis`.
    pub fn voxel_to_mm(&self, axis: usize, idx: usize) -> f32 {
        self.origin[axis] + idx as f32 * self.voxdim[axis]
    }
}

#[derive(Debug, Clone)]
pub struct LoadedVolume {
    pub data: Array3<f32>,
    pub meta: VolumeMeta,
}

/// Source of volumes keyed by file path.
pub trait VolumeLoader {
    fn load(&self, path: &str) -> Result<LoadedVolume>;
}

/// Reads NIfTI-1 files (`.nii`, `.nii.gz`) from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiLoader {
    /// Reorder axes on load so each pane shows its anatomical plane.
    pub reorient: bool,
}

impl NiftiLoader {
    pub fn new(reorient: bool) -> Self {
        Self { reorient }
    }
}

impl VolumeLoader for NiftiLoader {
    fn load(&self, path: &str) -> Result<LoadedVolume> {
        log::info!("Loading NIfTI volume: {path}");
        let obj = ReaderOptions::new().read_file(path)?;
        let header = obj.header().clone();
        let volume = obj.into_volume().into_ndarray::<f32>()?;
        let data = squeeze_to_3d(volume)?;
        let loaded = if self.reorient {
            reorient_for_display(data, &header)
        } else {
            LoadedVolume {
                data,
                meta: VolumeMeta::from_header(&header),
            }
        };
        log::debug!("Loaded {path} with shape {:?}", loaded.data.shape());
        Ok(loaded)
    }
}

/// Accept 3D volumes, and 4D volumes with a single trailing frame.
fn squeeze_to_3d(volume: ArrayD<f32>) -> Result<Array3<f32>> {
    let volume = match *volume.shape() {
        [_, _, _] => volume,
        [_, _, _, 1] => volume.index_axis_move(Axis(3), 0),
        _ => {
            let shape = volume.shape().to_vec();
            return Err(ViewerError::UnsupportedDimensionality { shape }.into());
        }
    };
    Ok(volume.into_dimensionality::<Ix3>()?)
}

fn spacing_or_unit(spacing: [f32; 3]) -> [f32; 3] {
    spacing.map(|v| if v.is_finite() && v > 0.0 { v } else { 1.0 })
}

/// Voxel-to-world transform of a header: linear part and translation.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Affine {
    linear: [[f32; 3]; 3],
    translation: [f32; 3],
}

impl Affine {
    /// Prefers the sform, then the qform, then plain voxel scaling.
    fn from_header(hdr: &NiftiHeader) -> Self {
        let pixdim = [hdr.pixdim[1], hdr.pixdim[2], hdr.pixdim[3]];
        if hdr.sform_code > 0 {
            let rows = [hdr.srow_x, hdr.srow_y, hdr.srow_z];
            Self {
                linear: rows.map(|r| [r[0], r[1], r[2]]),
                translation: rows.map(|r| r[3]),
            }
        } else if hdr.qform_code > 0 {
            let rotation = quaternion_rotation(hdr.quatern_b, hdr.quatern_c, hdr.quatern_d);
            let qfac = if hdr.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
            let scale = [pixdim[0], pixdim[1], pixdim[2] * qfac];
            Self {
                linear: rotation.map(|row| [0, 1, 2].map(|c| row[c] * scale[c])),
                translation: [hdr.quatern_x, hdr.quatern_y, hdr.quatern_z],
            }
        } else {
            let mut linear = [[0.0; 3]; 3];
            for (axis, row) in linear.iter_mut().enumerate() {
                row[axis] = pixdim[axis];
            }
            Self {
                linear,
                translation: [0.0; 3],
            }
        }
    }

    fn apply(&self, ijk: [f32; 3]) -> [f32; 3] {
        [0, 1, 2].map(|row| {
            let dir = self.linear[row];
            dir[0] * ijk[0] + dir[1] * ijk[1] + dir[2] * ijk[2] + self.translation[row]
        })
    }

    /// For each voxel axis, the world axis it mostly runs along and whether
    /// it runs backwards along it.
    fn dominant_world_axes(&self) -> [(usize, bool); 3] {
        [0, 1, 2].map(|col| {
            let row = (0..3)
                .max_by(|&a, &b| {
                    self.linear[a][col]
                        .abs()
                        .total_cmp(&self.linear[b][col].abs())
                })
                .unwrap_or(col);
            (row, self.linear[row][col] < 0.0)
        })
    }
}

/// Rotation matrix of the unit quaternion (a, b, c, d) with a derived from
/// b, c and d.
fn quaternion_rotation(b: f32, c: f32, d: f32) -> [[f32; 3]; 3] {
    let (b, c, d) = (b as f64, c as f64, d as f64);
    let a = (1.0 - b * b - c * c - d * d).max(0.0).sqrt();
    [
        [
            a * a + b * b - c * c - d * d,
            2.0 * (b * c - a * d),
            2.0 * (b * d + a * c),
        ],
        [
            2.0 * (b * c + a * d),
            a * a + c * c - b * b - d * d,
            2.0 * (c * d - a * b),
        ],
        [
            2.0 * (b * d - a * c),
            2.0 * (c * d + a * b),
            a * a + d * d - b * b - c * c,
        ],
    ]
    .map(|row| row.map(|v| v as f32))
}

/// World axes (0 = right, 1 = anterior, 2 = superior) in array order after
/// reorientation: superior, right, anterior. Axis 0 then holds axial
/// planes, axis 1 sagittal planes and axis 2 coronal planes.
const DISPLAY_WORLD_ORDER: [usize; 3] = [2, 0, 1];

/// Permute and flip a volume so array axes follow [`DISPLAY_WORLD_ORDER`],
/// each increasing towards superior, right or anterior. Spacing and origin
/// are reported in the new axis order.
pub fn reorient_for_display(volume: Array3<f32>, hdr: &NiftiHeader) -> LoadedVolume {
    let affine = Affine::from_header(hdr);
    let spacing = spacing_or_unit([hdr.pixdim[1], hdr.pixdim[2], hdr.pixdim[3]]);
    let dominant = affine.dominant_world_axes();

    let mut voxel_for_world = [usize::MAX; 3];
    for (voxel_axis, &(world_axis, _)) in dominant.iter().enumerate() {
        voxel_for_world[world_axis] = voxel_axis;
    }
    // two voxel axes along the same world axis: no axis permutation exists
    if voxel_for_world.contains(&usize::MAX) {
        log::warn!("Affine is too oblique to reorient, keeping voxel order");
        return LoadedVolume {
            data: volume,
            meta: VolumeMeta {
                voxdim: spacing,
                origin: affine.translation,
            },
        };
    }

    let source_axes = DISPLAY_WORLD_ORDER.map(|world| voxel_for_world[world]);
    let shape = volume.shape().to_vec();

    let mut data = volume.permuted_axes(source_axes);
    let mut first_voxel = [0.0f32; 3];
    for (axis, &src) in source_axes.iter().enumerate() {
        if dominant[src].1 {
            data.invert_axis(Axis(axis));
            first_voxel[src] = (shape[src] - 1) as f32;
        }
    }
    let data = data.as_standard_layout().into_owned();

    let world_origin = affine.apply(first_voxel);
    LoadedVolume {
        data,
        meta: VolumeMeta {
            voxdim: source_axes.map(|src| spacing[src]),
            origin: DISPLAY_WORLD_ORDER.map(|world| world_origin[world]),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr3, Array};
    use nifti::writer::WriterOptions;

    fn header_with_sform(rows: [[f32; 4]; 3]) -> NiftiHeader {
        let mut hdr = NiftiHeader::default();
        hdr.sform_code = 1;
        hdr.qform_code = 0;
        hdr.srow_x = rows[0];
        hdr.srow_y = rows[1];
        hdr.srow_z = rows[2];
        hdr.pixdim = [1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0];
        hdr
    }

    #[test]
    fn test_squeeze_keeps_3d() {
        let vol = Array::<f32, _>::zeros(vec![2, 3, 4]);
        assert_eq!(squeeze_to_3d(vol).unwrap().shape(), &[2, 3, 4]);
    }

    #[test]
    fn test_squeeze_drops_single_frame() {
        let vol = Array::<f32, _>::zeros(vec![2, 3, 4, 1]);
        assert_eq!(squeeze_to_3d(vol).unwrap().shape(), &[2, 3, 4]);
    }

    #[test]
    fn test_squeeze_rejects_multi_frame() {
        let vol = Array::<f32, _>::zeros(vec![2, 3, 4, 5]);
        let err = squeeze_to_3d(vol).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ViewerError>(),
            Some(&ViewerError::UnsupportedDimensionality {
                shape: vec![2, 3, 4, 5]
            })
        );
    }

    #[test]
    fn test_meta_from_sform() {
        let hdr = header_with_sform([
            [2.0, 0.0, 0.0, -10.0],
            [0.0, 3.0, 0.0, 5.0],
            [0.0, 0.0, 4.0, 1.5],
        ]);
        let meta = VolumeMeta::from_header(&hdr);
        assert_eq!(meta.voxdim, [2.0, 3.0, 4.0]);
        assert_eq!(meta.origin, [-10.0, 5.0, 1.5]);
        assert_eq!(meta.voxel_to_mm(0, 3), -4.0);
    }

    #[test]
    fn test_zero_spacing_falls_back_to_unit() {
        assert_eq!(spacing_or_unit([0.0, -1.0, 2.5]), [1.0, 1.0, 2.5]);
    }

    #[test]
    fn test_qform_affine_scales_rotation() {
        let mut hdr = NiftiHeader::default();
        hdr.sform_code = 0;
        hdr.qform_code = 1;
        // 180 degrees about z
        hdr.quatern_b = 0.0;
        hdr.quatern_c = 0.0;
        hdr.quatern_d = 1.0;
        hdr.quatern_x = 7.0;
        hdr.pixdim = [1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0];
        let affine = Affine::from_header(&hdr);
        assert_eq!(affine.linear[0][0], -2.0);
        assert_eq!(affine.linear[1][1], -3.0);
        assert_eq!(affine.linear[2][2], 4.0);
        assert_eq!(affine.apply([1.0, 0.0, 0.0]), [5.0, 0.0, 0.0]);
        assert_eq!(
            affine.dominant_world_axes(),
            [(0, true), (1, true), (2, false)]
        );
    }

    #[test]
    fn test_reorient_identity_puts_superior_first() {
        let hdr = header_with_sform([
            [2.0, 0.0, 0.0, 0.0],
            [0.0, 3.0, 0.0, 0.0],
            [0.0, 0.0, 4.0, 0.0],
        ]);
        let vol = Array3::<f32>::from_shape_fn((2, 3, 4), |(x, y, z)| (x * 100 + y * 10 + z) as f32);
        let out = reorient_for_display(vol, &hdr);
        assert_eq!(out.data.shape(), &[4, 2, 3]);
        // out[[z, x, y]] == vol[[x, y, z]]
        assert_eq!(out.data[[3, 1, 2]], 123.0);
        assert_eq!(out.meta.voxdim, [4.0, 2.0, 3.0]);
    }

    #[test]
    fn test_reorient_flips_negative_axis() {
        let hdr = header_with_sform([
            [-2.0, 0.0, 0.0, 10.0],
            [0.0, 3.0, 0.0, 0.0],
            [0.0, 0.0, 4.0, 0.0],
        ]);
        let vol = arr3(&[[[1.0f32]], [[2.0]]]);
        let out = reorient_for_display(vol, &hdr);
        assert_eq!(out.data, arr3(&[[[2.0f32], [1.0]]]));
        assert_eq!(out.meta.voxdim, [4.0, 2.0, 3.0]);
        // voxel 1 of the stored x axis is now voxel 0
        assert_eq!(out.meta.origin, [0.0, 8.0, 0.0]);
    }

    #[test]
    fn test_reorient_permutes_swapped_axes() {
        let hdr = header_with_sform([
            [0.0, 3.0, 0.0, 0.0],
            [2.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 4.0, 0.0],
        ]);
        let vol = Array3::<f32>::from_shape_fn((2, 3, 1), |(i, j, _)| (i * 10 + j) as f32);
        let out = reorient_for_display(vol, &hdr);
        assert_eq!(out.data.shape(), &[1, 3, 2]);
        assert_eq!(out.data[[0, 2, 1]], 12.0);
        assert_eq!(out.meta.voxdim, [4.0, 3.0, 2.0]);
    }

    #[test]
    fn test_reorient_keeps_order_for_degenerate_affine() {
        let hdr = header_with_sform([
            [1.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ]);
        let vol = Array3::<f32>::zeros((2, 3, 4));
        let out = reorient_for_display(vol, &hdr);
        assert_eq!(out.data.shape(), &[2, 3, 4]);
    }

    #[test]
    fn test_load_written_volume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.nii");
        let hdr = header_with_sform([
            [2.0, 0.0, 0.0, -10.0],
            [0.0, 3.0, 0.0, 5.0],
            [0.0, 0.0, 4.0, 1.5],
        ]);
        let vol = Array3::<f32>::from_shape_fn((3, 4, 5), |(x, y, z)| (x * 100 + y * 10 + z) as f32);
        WriterOptions::new(&path)
            .reference_header(&hdr)
            .write_nifti(&vol)
            .unwrap();

        let loaded = NiftiLoader::default()
            .load(path.to_str().unwrap())
            .unwrap();
        assert_eq!(loaded.data.shape(), &[3, 4, 5]);
        assert_eq!(loaded.data[[2, 1, 4]], 214.0);
        assert_eq!(loaded.meta.voxdim, [2.0, 3.0, 4.0]);
        assert_eq!(loaded.meta.origin, [-10.0, 5.0, 1.5]);

        let reoriented = NiftiLoader::new(true)
            .load(path.to_str().unwrap())
            .unwrap();
        assert_eq!(reoriented.data.shape(), &[5, 3, 4]);
        assert_eq!(reoriented.meta.origin, [1.5, -10.0, 5.0]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let loader = NiftiLoader::default();
        assert!(loader.load("/nonexistent/volume.nii.gz").is_err());
    }
}
