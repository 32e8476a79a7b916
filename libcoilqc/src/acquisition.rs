//! Grouped acquisitions handed over by the DICOM sorting front end
//!
//! Every image is an [`AcquisitionUnit`] tagged with an [`AcquisitionKey`].
//! Units live in an ordered [`AcquisitionSet`] so iteration order is stable:
//! date, series time, repeat, category, slice, element.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::CoilConfig;
use crate::error::{QcError, Result};
use crate::raster::Image;

/// Highest repeat index; NEMA pairs repeat 0 with repeat 1
pub const MAX_REPEAT: u8 = 1;

/// Kind of reconstructed image
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ImageCategory {
    /// Root-sum-of-squares of all coil elements
    Combined,
    /// One coil element reconstructed on its own
    DelRec,
}

impl fmt::Display for ImageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Combined => "Combined",
            Self::DelRec => "DelRec",
        })
    }
}

/// Identity of one image within an analysis run
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AcquisitionKey {
    pub date: String,
    pub series_time: String,
    pub repeat: u8,
    pub category: ImageCategory,
    pub slice: u32,
    /// Present only for [`ImageCategory::DelRec`]
    pub element: Option<u32>,
}

impl AcquisitionKey {
    pub fn combined(date: &str, series_time: &str, repeat: u8, slice: u32) -> Self {
        Self {
            date: date.to_string(),
            series_time: series_time.to_string(),
            repeat,
            category: ImageCategory::Combined,
            slice,
            element: None,
        }
    }

    pub fn element(date: &str, series_time: &str, repeat: u8, slice: u32, element: u32) -> Self {
        Self {
            date: date.to_string(),
            series_time: series_time.to_string(),
            repeat,
            category: ImageCategory::DelRec,
            slice,
            element: Some(element),
        }
    }

    /// Identifier of the acquisition within its date (series time + repeat)
    pub fn acquisition_id(&self) -> String {
        format!("{}_{}", self.series_time, self.repeat)
    }

    /// Key shared by both repeats of the same image
    pub fn repeat_group(&self) -> RepeatGroupKey {
        RepeatGroupKey {
            date: self.date.clone(),
            series_time: self.series_time.clone(),
            category: self.category,
            slice: self.slice,
            element: self.element,
        }
    }

    /// Key shared by every repeat of this slice/element acquired on the same date
    pub fn aggregation_group(&self) -> AggregationKey {
        AggregationKey {
            date: self.date.clone(),
            category: self.category,
            slice: self.slice,
            element: self.element,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.repeat > MAX_REPEAT {
            return Err(QcError::InvalidAcquisition(format!(
                "{self}: repeat index must be 0 or 1"
            )));
        }
        match (self.category, self.element) {
            (ImageCategory::Combined, Some(_)) => Err(QcError::InvalidAcquisition(format!(
                "{self}: combined images carry no element index"
            ))),
            (ImageCategory::DelRec, None) => Err(QcError::InvalidAcquisition(format!(
                "{self}: element images need an element index"
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for AcquisitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} repeat {} {} slice {}",
            self.date, self.series_time, self.repeat, self.category, self.slice
        )?;
        if let Some(element) = self.element {
            write!(f, " element {element}")?;
        }
        Ok(())
    }
}

/// Both repeats of one image
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepeatGroupKey {
    pub date: String,
    pub series_time: String,
    pub category: ImageCategory,
    pub slice: u32,
    pub element: Option<u32>,
}

/// All repeats of one slice/element on one date
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregationKey {
    pub date: String,
    pub category: ImageCategory,
    pub slice: u32,
    pub element: Option<u32>,
}

/// One image plus the metadata metrology needs
#[derive(Debug, Clone)]
pub struct AcquisitionUnit {
    pub key: AcquisitionKey,
    pub image: Image,
    /// Receiver bandwidth in Hz/pixel, if the header exposed it
    pub pixel_bandwidth_hz: Option<f64>,
}

impl AcquisitionUnit {
    pub const fn new(key: AcquisitionKey, image: Image) -> Self {
        Self {
            key,
            image,
            pixel_bandwidth_hz: None,
        }
    }

    #[must_use]
    pub const fn with_bandwidth(mut self, pixel_bandwidth_hz: f64) -> Self {
        self.pixel_bandwidth_hz = Some(pixel_bandwidth_hz);
        self
    }
}

/// First repeat and, when acquired, the second
#[derive(Debug, Clone, Copy)]
pub struct RepeatPair<'a> {
    pub first: &'a AcquisitionUnit,
    pub second: Option<&'a AcquisitionUnit>,
}

impl<'a> RepeatPair<'a> {
    pub fn units(&self) -> impl Iterator<Item = &'a AcquisitionUnit> {
        std::iter::once(self.first).chain(self.second)
    }
}

/// Ordered collection of acquisition units
#[derive(Debug, Clone, Default)]
pub struct AcquisitionSet {
    units: BTreeMap<AcquisitionKey, AcquisitionUnit>,
}

impl AcquisitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit; keys must be unique and well formed
    pub fn insert(&mut self, unit: AcquisitionUnit) -> Result<()> {
        unit.key.validate()?;
        if let Some(bw) = unit.pixel_bandwidth_hz {
            if !bw.is_finite() || bw <= 0.0 {
                return Err(QcError::InvalidAcquisition(format!(
                    "{}: pixel bandwidth {bw} must be positive",
                    unit.key
                )));
            }
        }
        if self.units.contains_key(&unit.key) {
            return Err(QcError::DuplicateAcquisition(unit.key.to_string()));
        }
        self.units.insert(unit.key.clone(), unit);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, key: &AcquisitionKey) -> Option<&AcquisitionUnit> {
        self.units.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AcquisitionUnit> {
        self.units.values()
    }

    /// Distinct slice indices, ascending
    pub fn slices(&self) -> BTreeSet<u32> {
        self.units.keys().map(|k| k.slice).collect()
    }

    /// First combined image of `slice` in key order, used as segmentation reference
    pub fn reference_image(&self, slice: u32) -> Result<&AcquisitionUnit> {
        self.iter()
            .find(|u| u.key.category == ImageCategory::Combined && u.key.slice == slice)
            .ok_or(QcError::MissingReference { slice })
    }

    /// Pair repeat 0 with repeat 1 for every image
    ///
    /// A group holding only repeat 1 is promoted so its single image still
    /// gets single-image metrology.
    pub fn repeat_pairs(&self) -> Vec<(RepeatGroupKey, RepeatPair<'_>)> {
        let mut groups: BTreeMap<RepeatGroupKey, Vec<&AcquisitionUnit>> = BTreeMap::new();
        for unit in self.units.values() {
            groups.entry(unit.key.repeat_group()).or_default().push(unit);
        }
        groups
            .into_iter()
            .map(|(key, members)| {
                // Members are in repeat order because the key orders repeat before category
                let pair = RepeatPair {
                    first: members[0],
                    second: members.get(1).copied(),
                };
                (key, pair)
            })
            .collect()
    }

    /// Check the grouped input against the coil's expected layout
    ///
    /// Every (date, series, repeat) must hold `slice_count` slices and every
    /// element-image slice must hold `element_count` elements.
    pub fn validate_counts(&self, coil: &CoilConfig) -> Result<()> {
        let mut slices: BTreeMap<(&str, &str, u8), BTreeSet<u32>> = BTreeMap::new();
        let mut elements: BTreeMap<(&str, &str, u8, u32), BTreeSet<u32>> = BTreeMap::new();

        for key in self.units.keys() {
            slices
                .entry((key.date.as_str(), key.series_time.as_str(), key.repeat))
                .or_default()
                .insert(key.slice);
            if let Some(element) = key.element {
                elements
                    .entry((key.date.as_str(), key.series_time.as_str(), key.repeat, key.slice))
                    .or_default()
                    .insert(element);
            }
        }

        for ((date, series, repeat), found) in &slices {
            if found.len() != coil.slice_count {
                return Err(QcError::CountMismatch {
                    what: format!("slices in {date} {series} repeat {repeat}"),
                    expected: coil.slice_count,
                    found: found.len(),
                });
            }
        }
        for ((date, series, repeat, slice), found) in &elements {
            if found.len() != coil.element_count as usize {
                return Err(QcError::CountMismatch {
                    what: format!("elements in {date} {series} repeat {repeat} slice {slice}"),
                    expected: coil.element_count as usize,
                    found: found.len(),
                });
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a AcquisitionSet {
    type Item = &'a AcquisitionUnit;
    type IntoIter = std::collections::btree_map::Values<'a, AcquisitionKey, AcquisitionUnit>;

    fn into_iter(self) -> Self::IntoIter {
        self.units.values()
    }
}
