use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, ArrayD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Numeric sentinel marking "no valid data" in input and output cubes
pub const FILL_VALUE: f32 = -9999.0;

/// GLT value meaning "no sensor pixel maps to this geographic cell"
pub const GLT_NODATA: i64 = 0;

/// Number of valid spectral bands carried by the band mask
pub const BAND_COUNT: usize = 285;

/// Per-variable and per-cube metadata
pub type Attributes = BTreeMap<String, AttrValue>;

/// A single metadata attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Numbers(Vec<f64>),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_numbers(&self) -> Option<&[f64]> {
        match self {
            AttrValue::Numbers(v) => Some(v),
            _ => None,
        }
    }
}

/// Processing level of a granule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingLevel {
    L1B,
    L2A,
    L2B,
}

impl std::fmt::Display for ProcessingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingLevel::L1B => write!(f, "L1B"),
            ProcessingLevel::L2A => write!(f, "L2A"),
            ProcessingLevel::L2B => write!(f, "L2B"),
        }
    }
}

/// What the trailing band axis of a product means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandSemantics {
    /// Spectral channels addressed by wavelength (nm)
    Spectral,
    /// Named categories, e.g. mineral identities
    Categorical,
    /// Named quality flags or observation layers
    Flag,
}

/// Imaging spectrometer product types
///
/// Resolved once at ingestion; every variant knows where its band axis
/// coordinate lives and what it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductType {
    Radiance,               // L1B RAD
    Observation,            // L1B OBS
    Reflectance,            // L2A RFL
    ReflectanceUncertainty, // L2A RFLUNCERT
    Mask,                   // L2A MASK
    Mineral,                // L2B MIN
    MineralUncertainty,     // L2B MINUNCERT
}

impl ProductType {
    /// Resolve a product from its level and short code (e.g. `L2A`, `RFL`)
    pub fn from_code(level: ProcessingLevel, code: &str) -> Option<Self> {
        let product = match (level, code) {
            (ProcessingLevel::L1B, "RAD") => ProductType::Radiance,
            (ProcessingLevel::L1B, "OBS") => ProductType::Observation,
            (ProcessingLevel::L2A, "RFL") => ProductType::Reflectance,
            (ProcessingLevel::L2A, "RFLUNCERT") => ProductType::ReflectanceUncertainty,
            (ProcessingLevel::L2A, "MASK") => ProductType::Mask,
            (ProcessingLevel::L2B, "MIN") => ProductType::Mineral,
            (ProcessingLevel::L2B, "MINUNCERT") => ProductType::MineralUncertainty,
            _ => return None,
        };
        Some(product)
    }

    pub fn code(&self) -> &'static str {
        match self {
            ProductType::Radiance => "RAD",
            ProductType::Observation => "OBS",
            ProductType::Reflectance => "RFL",
            ProductType::ReflectanceUncertainty => "RFLUNCERT",
            ProductType::Mask => "MASK",
            ProductType::Mineral => "MIN",
            ProductType::MineralUncertainty => "MINUNCERT",
        }
    }

    pub fn level(&self) -> ProcessingLevel {
        match self {
            ProductType::Radiance | ProductType::Observation => ProcessingLevel::L1B,
            ProductType::Reflectance | ProductType::ReflectanceUncertainty | ProductType::Mask => {
                ProcessingLevel::L2A
            }
            ProductType::Mineral | ProductType::MineralUncertainty => ProcessingLevel::L2B,
        }
    }

    /// Ancillary group holding the band axis coordinate
    pub fn band_group(&self) -> &'static str {
        match self {
            ProductType::Mineral | ProductType::MineralUncertainty => "mineral_metadata",
            _ => "sensor_band_parameters",
        }
    }

    /// Variable inside [`band_group`](Self::band_group) that labels the band axis
    pub fn band_variable(&self) -> &'static str {
        match self {
            ProductType::Radiance | ProductType::Reflectance | ProductType::ReflectanceUncertainty => {
                "wavelengths"
            }
            ProductType::Observation => "observation_bands",
            ProductType::Mask => "mask_bands",
            ProductType::Mineral | ProductType::MineralUncertainty => "name",
        }
    }

    /// Dimension name of the band axis on data variables
    pub fn band_dim(&self) -> &'static str {
        match self {
            ProductType::Mineral | ProductType::MineralUncertainty => "mineral",
            _ => "bands",
        }
    }

    pub fn band_semantics(&self) -> BandSemantics {
        match self {
            ProductType::Radiance | ProductType::Reflectance | ProductType::ReflectanceUncertainty => {
                BandSemantics::Spectral
            }
            ProductType::Mineral | ProductType::MineralUncertainty => BandSemantics::Categorical,
            ProductType::Observation | ProductType::Mask => BandSemantics::Flag,
        }
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.level(), self.code())
    }
}

/// Band/label axis of a cube
#[derive(Debug, Clone, PartialEq)]
pub enum BandCoordinate {
    /// Spectral axis in nanometres, with optional full-width-half-max
    Wavelengths {
        dim: String,
        values: Array1<f64>,
        fwhm: Option<Array1<f64>>,
    },
    /// Categorical or flag axis
    Labels { dim: String, values: Vec<String> },
}

impl BandCoordinate {
    pub fn dim(&self) -> &str {
        match self {
            BandCoordinate::Wavelengths { dim, .. } | BandCoordinate::Labels { dim, .. } => dim,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BandCoordinate::Wavelengths { values, .. } => values.len(),
            BandCoordinate::Labels { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Restrict the coordinate to the given band indices, in order
    pub fn select(&self, indices: &[usize]) -> Self {
        match self {
            BandCoordinate::Wavelengths { dim, values, fwhm } => BandCoordinate::Wavelengths {
                dim: dim.clone(),
                values: indices.iter().map(|&i| values[i]).collect(),
                fwhm: fwhm.as_ref().map(|f| indices.iter().map(|&i| f[i]).collect()),
            },
            BandCoordinate::Labels { dim, values } => BandCoordinate::Labels {
                dim: dim.clone(),
                values: indices.iter().map(|&i| values[i].clone()).collect(),
            },
        }
    }
}

/// Sensor-space variable shaped (downtrack, crosstrack[, band])
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub dims: Vec<String>,
    pub data: ArrayD<f32>,
    pub attributes: Attributes,
}

impl Variable {
    /// Name of the trailing band axis, if the variable has one
    pub fn band_dim(&self) -> Option<&str> {
        if self.data.ndim() == 3 {
            self.dims.get(2).map(|s| s.as_str())
        } else {
            None
        }
    }

    /// (rows, cols) of the spatial grid; `None` below two dimensions
    pub fn spatial_shape(&self) -> Option<(usize, usize)> {
        match self.data.shape() {
            [rows, cols, ..] => Some((*rows, *cols)),
            _ => None,
        }
    }
}

/// Raw geolocation lookup table fields, shaped (geo_rows, geo_cols)
///
/// Values are 1-based indices into the sensor grid; NaN and the GLT
/// sentinel both mean "unmapped".
#[derive(Debug, Clone)]
pub struct GltFields {
    pub glt_x: Array2<f64>,
    pub glt_y: Array2<f64>,
}

/// Geospatial bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Build from the six GDAL-ordered coefficients `[x0, dx, rx, y0, ry, dy]`
    pub fn from_coefficients(coefficients: &[f64]) -> OrthoResult<Self> {
        if coefficients.len() != 6 {
            return Err(OrthoError::InvalidFormat(format!(
                "geotransform needs 6 coefficients, got {}",
                coefficients.len()
            )));
        }

        let transform = Self {
            top_left_x: coefficients[0],
            pixel_width: coefficients[1],
            rotation_x: coefficients[2],
            top_left_y: coefficients[3],
            rotation_y: coefficients[4],
            pixel_height: coefficients[5],
        };

        if transform.rotation_x != 0.0 || transform.rotation_y != 0.0 {
            log::warn!(
                "Ignoring geotransform rotation terms ({}, {})",
                transform.rotation_x,
                transform.rotation_y
            );
        }

        Ok(transform)
    }

    pub fn to_coefficients(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }
}

/// Identity of a granule as encoded in its file name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GranuleId {
    pub name: String,
    pub product: ProductType,
    pub collection: String,
    pub start_time: DateTime<Utc>,
    pub orbit: String,
    pub scene: String,
}

/// Sensor-space cube ready for orthorectification
#[derive(Debug, Clone)]
pub struct SensorCube {
    pub granule_id: String,
    pub product: ProductType,
    /// Data variables in file order
    pub variables: Vec<Variable>,
    pub band_coord: BandCoordinate,
    /// Per-pixel latitude, sensor space
    pub lat: Array2<f64>,
    /// Per-pixel longitude, sensor space
    pub lon: Array2<f64>,
    pub elevation: Option<Array2<f32>>,
    pub glt: Option<GltFields>,
    pub geotransform: Option<GeoTransform>,
    /// Spatial reference as WKT
    pub spatial_ref: Option<String>,
    pub attributes: Attributes,
}

impl SensorCube {
    /// (rows, cols) of the sensor grid
    pub fn sensor_shape(&self) -> (usize, usize) {
        self.lat.dim()
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// Variable on the geographic grid, shaped (latitude, longitude[, band])
#[derive(Debug, Clone)]
pub struct OrthoVariable {
    pub name: String,
    pub dims: Vec<String>,
    pub data: ArrayD<f32>,
    pub attributes: Attributes,
}

/// Orthorectified cube on a regular latitude/longitude grid
#[derive(Debug, Clone)]
pub struct OrthoCube {
    pub granule_id: String,
    pub product: ProductType,
    pub variables: Vec<OrthoVariable>,
    pub latitude: Array1<f64>,
    pub longitude: Array1<f64>,
    /// Elevation coordinate, shaped (latitude, longitude)
    pub elevation: Array2<f32>,
    pub band_coord: BandCoordinate,
    pub geotransform: GeoTransform,
    pub spatial_ref: Option<String>,
    pub attributes: Attributes,
}

impl OrthoCube {
    /// (latitude, longitude) size of the grid
    pub fn grid_shape(&self) -> (usize, usize) {
        (self.latitude.len(), self.longitude.len())
    }

    pub fn variable(&self, name: &str) -> Option<&OrthoVariable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// Error types for orthorectification
#[derive(Debug, thiserror::Error)]
pub enum OrthoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Selection error: {0}")]
    Selection(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Result type for orthorectification operations
pub type OrthoResult<T> = Result<T, OrthoError>;
