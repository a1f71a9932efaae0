//! Granule ingestion and raster export

pub mod granule;
pub mod assembler;
#[cfg(feature = "gdal")]
pub mod geotiff;

pub use granule::{RawData, RawGranule, RawGroup, RawVariable};
pub use assembler::{band_mask_from_granule, quality_mask_from_granule, AssemblyParams, DatasetAssembler};
#[cfg(feature = "gdal")]
pub use geotiff::write_geotiff;
