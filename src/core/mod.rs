//! Core orthorectification modules

pub mod masks;
pub mod coordinates;
pub mod glt;
pub mod selection;
pub mod orthorectify;

// Re-export main types
pub use masks::{build_band_mask, build_quality_mask, mask_fill_value, BandMask, MaskFlag, QualityMask};
pub use coordinates::{compute_axes, grid_bounds};
pub use glt::{apply_glt, build_glt_index, valid_cell_count};
pub use selection::{select_band_indices, BandSelection};
pub use orthorectify::{orthorectify, OrthoParams, Orthorectifier};
