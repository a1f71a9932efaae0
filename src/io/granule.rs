//! Decoded granule contents and granule identification
//!
//! The file reader is an external collaborator: it hands over a [`RawGranule`]
//! with the root group, named sub-groups, and their attributes already in
//! memory. Nothing here touches the file system.

use crate::types::{AttrValue, Attributes, GranuleId, OrthoError, OrthoResult, ProcessingLevel, ProductType};
use chrono::{NaiveDateTime, TimeZone, Utc};
use ndarray::ArrayD;
use std::collections::HashMap;

/// Array payload of a decoded variable
#[derive(Debug, Clone)]
pub enum RawData {
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
    Int32(ArrayD<i32>),
    UInt8(ArrayD<u8>),
    Text(Vec<String>),
}

impl RawData {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            RawData::Float32(a) => a.shape().to_vec(),
            RawData::Float64(a) => a.shape().to_vec(),
            RawData::Int32(a) => a.shape().to_vec(),
            RawData::UInt8(a) => a.shape().to_vec(),
            RawData::Text(v) => vec![v.len()],
        }
    }

    /// Numeric payload as f32; `None` for text
    pub fn to_f32(&self) -> Option<ArrayD<f32>> {
        match self {
            RawData::Float32(a) => Some(a.clone()),
            RawData::Float64(a) => Some(a.mapv(|v| v as f32)),
            RawData::Int32(a) => Some(a.mapv(|v| v as f32)),
            RawData::UInt8(a) => Some(a.mapv(|v| v as f32)),
            RawData::Text(_) => None,
        }
    }

    /// Numeric payload as f64; `None` for text
    pub fn to_f64(&self) -> Option<ArrayD<f64>> {
        match self {
            RawData::Float32(a) => Some(a.mapv(|v| v as f64)),
            RawData::Float64(a) => Some(a.clone()),
            RawData::Int32(a) => Some(a.mapv(|v| v as f64)),
            RawData::UInt8(a) => Some(a.mapv(|v| v as f64)),
            RawData::Text(_) => None,
        }
    }
}

/// One decoded variable
#[derive(Debug, Clone)]
pub struct RawVariable {
    pub name: String,
    pub dims: Vec<String>,
    pub data: RawData,
    pub attributes: Attributes,
}

impl RawVariable {
    pub fn new(name: &str, dims: &[&str], data: RawData) -> Self {
        Self {
            name: name.to_string(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            data,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: AttrValue) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }
}

/// A group of variables, kept in file order
#[derive(Debug, Clone, Default)]
pub struct RawGroup {
    pub variables: Vec<RawVariable>,
    pub attributes: Attributes,
}

impl RawGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, variable: RawVariable) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn with_attribute(mut self, key: &str, value: AttrValue) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub fn variable(&self, name: &str) -> Option<&RawVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Look up a variable that must exist
    pub fn require(&self, group: &str, name: &str) -> OrthoResult<&RawVariable> {
        self.variable(name)
            .ok_or_else(|| OrthoError::MissingField(format!("variable '{}' in group '{}'", name, group)))
    }
}

/// A decoded granule: root group plus named sub-groups
#[derive(Debug, Clone)]
pub struct RawGranule {
    /// File name or granule id, e.g. `EMIT_L2A_RFL_001_20230316T045211_2307503_004.nc`
    pub name: String,
    pub root: RawGroup,
    pub groups: HashMap<String, RawGroup>,
}

impl RawGranule {
    pub fn new(name: &str, root: RawGroup) -> Self {
        Self {
            name: name.to_string(),
            root,
            groups: HashMap::new(),
        }
    }

    pub fn with_group(mut self, name: &str, group: RawGroup) -> Self {
        self.groups.insert(name.to_string(), group);
        self
    }

    /// Look up a sub-group that must exist
    pub fn group(&self, name: &str) -> OrthoResult<&RawGroup> {
        self.groups
            .get(name)
            .ok_or_else(|| OrthoError::MissingField(format!("group '{}'", name)))
    }
}

impl GranuleId {
    /// Parse `EMIT_<level>_<product>_<collection>_<YYYYMMDDTHHMMSS>_<orbit>_<scene>`
    ///
    /// A directory prefix and file extension are ignored.
    pub fn parse(name: &str) -> OrthoResult<Self> {
        let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);

        let pattern = regex::Regex::new(
            r"^EMIT_(L1B|L2A|L2B)_([A-Z]+)_(\d{3})_(\d{8}T\d{6})_(\d{7})_(\d{3})(?:\.[A-Za-z0-9]+)?$",
        )
        .map_err(|e| OrthoError::InvalidFormat(format!("Regex error: {}", e)))?;

        let captures = pattern
            .captures(file_name)
            .ok_or_else(|| OrthoError::InvalidFormat(format!("unrecognised granule id '{}'", file_name)))?;

        let level = match &captures[1] {
            "L1B" => ProcessingLevel::L1B,
            "L2A" => ProcessingLevel::L2A,
            _ => ProcessingLevel::L2B,
        };
        let product = ProductType::from_code(level, &captures[2]).ok_or_else(|| {
            OrthoError::InvalidFormat(format!("no {} product with code '{}'", level, &captures[2]))
        })?;

        let naive = NaiveDateTime::parse_from_str(&captures[4], "%Y%m%dT%H%M%S")
            .map_err(|e| OrthoError::InvalidFormat(format!("bad acquisition time '{}': {}", &captures[4], e)))?;

        let id = GranuleId {
            name: file_name
                .split('.')
                .next()
                .unwrap_or(file_name)
                .to_string(),
            product,
            collection: captures[3].to_string(),
            start_time: Utc.from_utc_datetime(&naive),
            orbit: captures[5].to_string(),
            scene: captures[6].to_string(),
        };

        log::debug!("Parsed granule id {} -> {}", id.name, id.product);
        Ok(id)
    }
}
