use crate::types::{OrthoError, OrthoResult, BAND_COUNT};
use ndarray::{Array, Array2, Array3, ArrayView3, Axis, Dimension};
use num_traits::Float;

/// Layers of the L2A mask product, in file order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskFlag {
    Cloud,
    Cirrus,
    Water,
    Spacecraft,
    DilatedCloud,
    /// Aerosol optical depth at 550 nm (continuous, not a flag)
    Aod550,
    /// Water vapour in g/cm² (continuous, not a flag)
    H2o,
    Aggregate,
}

/// Layer indices that hold continuous data rather than flags
pub const RESERVED_DATA_LAYERS: [usize; 2] = [5, 6];

impl MaskFlag {
    pub const ALL: [MaskFlag; 8] = [
        MaskFlag::Cloud,
        MaskFlag::Cirrus,
        MaskFlag::Water,
        MaskFlag::Spacecraft,
        MaskFlag::DilatedCloud,
        MaskFlag::Aod550,
        MaskFlag::H2o,
        MaskFlag::Aggregate,
    ];

    pub fn index(&self) -> usize {
        match self {
            MaskFlag::Cloud => 0,
            MaskFlag::Cirrus => 1,
            MaskFlag::Water => 2,
            MaskFlag::Spacecraft => 3,
            MaskFlag::DilatedCloud => 4,
            MaskFlag::Aod550 => 5,
            MaskFlag::H2o => 6,
            MaskFlag::Aggregate => 7,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn is_data_layer(&self) -> bool {
        RESERVED_DATA_LAYERS.contains(&self.index())
    }
}

impl std::fmt::Display for MaskFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MaskFlag::Cloud => "Cloud flag",
            MaskFlag::Cirrus => "Cirrus flag",
            MaskFlag::Water => "Water flag",
            MaskFlag::Spacecraft => "Spacecraft Flag",
            MaskFlag::DilatedCloud => "Dilated Cloud Flag",
            MaskFlag::Aod550 => "AOD550",
            MaskFlag::H2o => "H2O (g cm-2)",
            MaskFlag::Aggregate => "Aggregate Flag",
        };
        write!(f, "{}", label)
    }
}

/// Pixel-level exclusion mask over (rows, cols); 1 = exclude from all bands
#[derive(Debug, Clone, PartialEq)]
pub struct QualityMask(pub Array2<f32>);

impl QualityMask {
    /// Build from named flags of a (rows, cols, layers) mask variable
    pub fn from_flags(flag_layers: ArrayView3<f32>, flags: &[MaskFlag]) -> OrthoResult<Self> {
        let indices: Vec<usize> = flags.iter().map(|f| f.index()).collect();
        build_quality_mask(flag_layers, &indices)
    }

    pub fn dim(&self) -> (usize, usize) {
        self.0.dim()
    }

    pub fn is_excluded(&self, row: usize, col: usize) -> bool {
        self.0[[row, col]] == 1.0
    }

    /// Fraction of pixels the mask removes
    pub fn excluded_fraction(&self) -> f64 {
        excluded_fraction(self.0.iter().map(|&v| v == 1.0), self.0.len())
    }
}

/// Pixel×band exclusion mask over (rows, cols, 285); 1 = exclude that band
#[derive(Debug, Clone, PartialEq)]
pub struct BandMask(pub Array3<u8>);

impl BandMask {
    pub fn dim(&self) -> (usize, usize, usize) {
        self.0.dim()
    }

    pub fn excluded_fraction(&self) -> f64 {
        excluded_fraction(self.0.iter().map(|&v| v == 1), self.0.len())
    }
}

fn excluded_fraction(flags: impl Iterator<Item = bool>, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    flags.filter(|&excluded| excluded).count() as f64 / total as f64
}

/// Combine selected flag layers into a {0,1} quality mask
///
/// `flag_layers` is (rows, cols, layers). The selected layers are summed
/// and any sum above 1 is clamped to 1. Selecting one of the continuous
/// data layers (AOD550, H2O) is rejected before any array work.
pub fn build_quality_mask(flag_layers: ArrayView3<f32>, selected: &[usize]) -> OrthoResult<QualityMask> {
    if let Some(reserved) = selected.iter().find(|i| RESERVED_DATA_LAYERS.contains(i)) {
        return Err(OrthoError::Validation(format!(
            "selected flags include a data band ({}) not just flag bands; layers {:?} are continuous data",
            reserved, RESERVED_DATA_LAYERS
        )));
    }

    let (rows, cols, layers) = flag_layers.dim();
    if let Some(out_of_range) = selected.iter().find(|&&i| i >= layers) {
        return Err(OrthoError::Validation(format!(
            "flag index {} is out of range for a mask with {} layers",
            out_of_range, layers
        )));
    }

    log::debug!(
        "Building quality mask from {} flag layers on a {}x{} grid",
        selected.len(),
        rows,
        cols
    );

    let mut qmask = Array2::<f32>::zeros((rows, cols));
    for &layer in selected {
        qmask += &flag_layers.index_axis(Axis(2), layer);
    }
    qmask.mapv_inplace(|sum| if sum > 1.0 { 1.0 } else { sum });

    Ok(QualityMask(qmask))
}

/// Unpack a bit-packed band mask into one {0,1} entry per band
///
/// `packed` is (rows, cols, bytes); bits are read most-significant first and
/// the trailing axis is truncated to the 285 valid bands.
pub fn build_band_mask(packed: ArrayView3<u8>) -> OrthoResult<BandMask> {
    let (rows, cols, byte_width) = packed.dim();
    if byte_width * 8 < BAND_COUNT {
        return Err(OrthoError::Shape(format!(
            "packed band mask holds {} bits per pixel, need at least {}",
            byte_width * 8,
            BAND_COUNT
        )));
    }

    let bmask = Array3::from_shape_fn((rows, cols, BAND_COUNT), |(r, c, band)| {
        let byte = packed[[r, c, band / 8]];
        (byte >> (7 - band % 8)) & 1
    });

    log::debug!(
        "Unpacked band mask: {} bytes -> {} bands per pixel",
        byte_width,
        BAND_COUNT
    );

    Ok(BandMask(bmask))
}

/// Replace literal fill values with NaN
///
/// Running this twice gives the same result as running it once.
pub fn mask_fill_value<T, D>(data: &mut Array<T, D>, fill_value: T)
where
    T: Float,
    D: Dimension,
{
    data.mapv_inplace(|v| if v == fill_value { T::nan() } else { v });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    fn flag_stack() -> Array3<f32> {
        let mut layers = Array3::<f32>::zeros((2, 3, 8));
        layers[[0, 0, 0]] = 1.0; // cloud
        layers[[0, 0, 1]] = 1.0; // cirrus, same pixel
        layers[[1, 2, 2]] = 1.0; // water
        layers[[1, 1, 5]] = 0.37; // AOD is continuous
        layers
    }

    #[test]
    fn test_quality_mask_clamps_overlapping_flags() {
        let layers = flag_stack();
        let qmask = build_quality_mask(layers.view(), &[0, 1, 2]).unwrap();

        assert_eq!(qmask.dim(), (2, 3));
        assert_eq!(qmask.0[[0, 0]], 1.0);
        assert_eq!(qmask.0[[1, 2]], 1.0);
        assert_eq!(qmask.0[[1, 1]], 0.0);
        assert!(qmask.0.iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn test_quality_mask_rejects_data_layers() {
        let layers = flag_stack();
        for selection in [vec![5], vec![0, 6], vec![6, 5, 1]] {
            let result = build_quality_mask(layers.view(), &selection);
            assert!(matches!(result, Err(OrthoError::Validation(_))));
        }
    }

    #[test]
    fn test_quality_mask_rejects_data_layers_before_shape_checks() {
        // An empty stack would fail the range check, the reserved check must win
        let layers = Array3::<f32>::zeros((0, 0, 0));
        let err = build_quality_mask(layers.view(), &[5]).unwrap_err();
        assert!(err.to_string().contains("data band"));
    }

    #[test]
    fn test_quality_mask_out_of_range_layer() {
        let layers = flag_stack();
        assert!(matches!(
            build_quality_mask(layers.view(), &[8]),
            Err(OrthoError::Validation(_))
        ));
    }

    #[test]
    fn test_quality_mask_from_named_flags() {
        let layers = flag_stack();
        let qmask = QualityMask::from_flags(layers.view(), &[MaskFlag::Water]).unwrap();
        assert!(qmask.is_excluded(1, 2));
        assert!(!qmask.is_excluded(0, 0));
        assert!((qmask.excluded_fraction() - 1.0 / 6.0).abs() < 1e-12);

        assert!(QualityMask::from_flags(layers.view(), &[MaskFlag::H2o]).is_err());
    }

    #[test]
    fn test_empty_selection_excludes_nothing() {
        let layers = flag_stack();
        let qmask = build_quality_mask(layers.view(), &[]).unwrap();
        assert!(qmask.0.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_band_mask_unpacks_msb_first() {
        let mut packed = Array3::<u8>::zeros((1, 2, 36));
        packed[[0, 0, 0]] = 0b1000_0001;
        packed[[0, 1, 35]] = 0b0001_0000; // band 283
        packed[[0, 1, 35]] |= 0b0000_0111; // padding bits beyond 285

        let bmask = build_band_mask(packed.view()).unwrap();
        assert_eq!(bmask.dim(), (1, 2, BAND_COUNT));
        assert_eq!(bmask.0[[0, 0, 0]], 1);
        assert_eq!(bmask.0[[0, 0, 7]], 1);
        assert_eq!(bmask.0[[0, 0, 1]], 0);
        assert_eq!(bmask.0[[0, 1, 283]], 1);
        assert_eq!(bmask.0.iter().filter(|&&b| b == 1).count(), 3);
    }

    #[test]
    fn test_band_mask_length_independent_of_byte_width() {
        for width in [36, 37, 48] {
            let packed = Array3::<u8>::from_elem((2, 2, width), 0xFF);
            let bmask = build_band_mask(packed.view()).unwrap();
            assert_eq!(bmask.0.len_of(Axis(2)), BAND_COUNT);
            assert!(bmask.0.iter().all(|&b| b == 1));
        }
    }

    #[test]
    fn test_band_mask_too_narrow() {
        let packed = Array3::<u8>::zeros((1, 1, 35));
        assert!(matches!(build_band_mask(packed.view()), Err(OrthoError::Shape(_))));
    }

    #[test]
    fn test_mask_fill_value_idempotent() {
        let mut data = array![[1.0f32, -9999.0], [f32::NAN, 4.5]];
        mask_fill_value(&mut data, -9999.0);
        let once = data.clone();
        mask_fill_value(&mut data, -9999.0);

        assert!(data[[0, 1]].is_nan());
        assert!(data[[1, 0]].is_nan());
        assert_eq!(data[[0, 0]], 1.0);
        assert_eq!(data[[1, 1]], 4.5);
        for (a, b) in once.iter().zip(data.iter()) {
            assert!(a == b || (a.is_nan() && b.is_nan()));
        }
    }
}
