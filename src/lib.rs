//! orthocube: GLT orthorectification for imaging spectrometer cubes
//!
//! Assembles sensor-space granules (radiance, reflectance, mask, mineral
//! products) into validated cubes, applies quality and band masks, and
//! remaps them onto a regular latitude/longitude grid through a geolocation
//! lookup table.

pub mod types;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use crate::types::{
    AttrValue, Attributes, BandCoordinate, BandSemantics, BoundingBox, GeoTransform, GltFields, GranuleId,
    OrthoCube, OrthoError, OrthoResult, OrthoVariable, ProcessingLevel, ProductType, SensorCube, Variable,
    BAND_COUNT, FILL_VALUE, GLT_NODATA,
};

pub use crate::core::{
    apply_glt, build_band_mask, build_quality_mask, compute_axes, mask_fill_value, orthorectify, BandMask,
    BandSelection, MaskFlag, OrthoParams, Orthorectifier, QualityMask,
};

pub use crate::io::{AssemblyParams, DatasetAssembler, RawData, RawGranule, RawGroup, RawVariable};
