//! Job descriptors and the builder that validates operator input.
//!
//! A [`JobDescriptor`] is one queued experiment: which sample to load, the 2θ
//! range to scan, scan precision, and the temperature ramp. Once built it never
//! changes; only its position in the queue does.
//!
//! [`JobBuilder`] turns a raw [`JobForm`] into a descriptor and owns the
//! sample selection, which advances to the next slot after every successful
//! build so consecutive submissions walk through the sample tray.

use crate::error::ValidationError;
use crate::estimate::{self, DurationEstimate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// XRD scan precision. High precision scans with finer steps and longer dwell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Precision {
    /// Fast scan.
    #[default]
    Low,
    /// Slow scan.
    High,
}

impl Precision {
    /// Wire representation used by the instrument service.
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Low => "Low",
            Precision::High => "High",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Precision::Low),
            "high" => Ok(Precision::High),
            _ => Err(ValidationError::InvalidPrecision(s.to_string())),
        }
    }
}

/// One queued experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    id: Uuid,
    created_at: DateTime<Utc>,
    item_name: String,
    sample_number: u32,
    min_angle: f64,
    max_angle: f64,
    precision: Precision,
    temperatures: Vec<f64>,
}

impl JobDescriptor {
    /// Unique id assigned at build time.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// When the descriptor was built.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Operator-supplied label.
    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    /// Sample tray slot to load.
    pub fn sample_number(&self) -> u32 {
        self.sample_number
    }

    /// Lower bound of the 2θ scan range, in degrees.
    pub fn min_angle(&self) -> f64 {
        self.min_angle
    }

    /// Upper bound of the 2θ scan range, in degrees.
    pub fn max_angle(&self) -> f64 {
        self.max_angle
    }

    /// Scan precision.
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Temperature ramp in °C. Empty means no heating.
    pub fn temperatures(&self) -> &[f64] {
        &self.temperatures
    }

    /// Whether the experiment heats the sample.
    pub fn is_heated(&self) -> bool {
        !self.temperatures.is_empty()
    }

    /// Projected duration, or `None` when the job does not heat.
    pub fn estimate(&self) -> Option<DurationEstimate> {
        let first = *self.temperatures.first()?;
        let last = *self.temperatures.last()?;
        let scans = u32::try_from(self.temperatures.len()).unwrap_or(u32::MAX);
        Some(estimate::estimate(
            first,
            last,
            self.min_angle,
            self.max_angle,
            self.precision,
            scans,
        ))
    }

    /// One-line description for queue listings.
    pub fn summary(&self) -> String {
        let heating = match (self.temperatures.first(), self.temperatures.last()) {
            (Some(first), Some(last)) => format!(
                "{}-{}°C x{} scans",
                first,
                last,
                self.temperatures.len()
            ),
            _ => "no heating".to_string(),
        };
        format!(
            "{} | Sample Number: {} | 2θ {}-{} {} | {}",
            self.item_name, self.sample_number, self.min_angle, self.max_angle, self.precision, heating
        )
    }
}

/// Heating section of the operator form, as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeatingForm {
    /// Ramp start, °C.
    pub min_temp: String,
    /// Ramp end, °C.
    pub max_temp: String,
    /// Number of scans along the ramp.
    pub num_scans: String,
}

/// Raw operator input for one experiment, as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobForm {
    /// Label for the queue entry.
    pub item_name: String,
    /// Lower 2θ bound.
    pub min_angle: String,
    /// Upper 2θ bound.
    pub max_angle: String,
    /// `Low` or `High`.
    pub precision: String,
    /// `None` when heating is disabled.
    pub heating: Option<HeatingForm>,
}

/// Which sample slot is currently selected, out of a fixed tray.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSelection {
    slots: u32,
    current: Option<u32>,
}

impl SampleSelection {
    /// Tray of `slots` samples with slot 0 selected.
    pub fn new(slots: u32) -> Self {
        Self {
            slots,
            current: (slots > 0).then_some(0),
        }
    }

    /// Number of slots in the tray.
    pub fn slots(&self) -> u32 {
        self.slots
    }

    /// Currently selected slot, if any.
    pub fn current(&self) -> Option<u32> {
        self.current
    }

    /// Select slot `sample`.
    pub fn select(&mut self, sample: u32) -> Result<(), ValidationError> {
        if sample >= self.slots {
            return Err(ValidationError::UnknownSample {
                sample,
                slots: self.slots,
            });
        }
        self.current = Some(sample);
        Ok(())
    }

    /// Deselect everything.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Move to the slot after `from`, or back to slot 0 if there is none.
    fn advance_from(&mut self, from: u32) {
        let next = from.saturating_add(1);
        self.current = if next < self.slots {
            Some(next)
        } else {
            (self.slots > 0).then_some(0)
        };
    }
}

/// Validates [`JobForm`]s into [`JobDescriptor`]s.
#[derive(Debug, Clone)]
pub struct JobBuilder {
    selection: SampleSelection,
}

impl JobBuilder {
    /// Builder for a tray with `slots` samples.
    pub fn new(slots: u32) -> Self {
        Self {
            selection: SampleSelection::new(slots),
        }
    }

    /// Current sample selection.
    pub fn selection(&self) -> SampleSelection {
        self.selection
    }

    /// Select the sample the next build will target.
    pub fn select(&mut self, sample: u32) -> Result<(), ValidationError> {
        self.selection.select(sample)
    }

    /// Clear the sample selection.
    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Validate `form` against the current selection.
    ///
    /// On success the selection advances to the next sample (wrapping to 0).
    /// On failure nothing changes.
    pub fn build(&mut self, form: &JobForm) -> Result<JobDescriptor, ValidationError> {
        let item_name = form.item_name.trim();
        if item_name.is_empty() {
            return Err(ValidationError::MissingField("item name"));
        }
        let sample_number = self
            .selection
            .current()
            .ok_or(ValidationError::MissingField("sample number"))?;

        let min_angle = parse_angle(&form.min_angle)?;
        let max_angle = parse_angle(&form.max_angle)?;
        let precision: Precision = form.precision.parse()?;

        let temperatures = match &form.heating {
            Some(heating) => {
                let min_temp = parse_temperature(&heating.min_temp)?;
                let max_temp = parse_temperature(&heating.max_temp)?;
                let num_scans = parse_scan_count(&heating.num_scans)?;
                estimate::temperature_ramp(min_temp, max_temp, num_scans)
            }
            None => Vec::new(),
        };

        let job = JobDescriptor {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            item_name: item_name.to_string(),
            sample_number,
            min_angle,
            max_angle,
            precision,
            temperatures,
        };

        self.selection.advance_from(sample_number);
        tracing::debug!(
            job = %job.id,
            sample = sample_number,
            next_sample = ?self.selection.current(),
            "built job descriptor"
        );
        Ok(job)
    }
}

fn parse_angle(raw: &str) -> Result<f64, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::MissingField("scan angle"));
    }
    parse_finite(raw).ok_or_else(|| ValidationError::NonNumericAngle(raw.to_string()))
}

fn parse_temperature(raw: &str) -> Result<f64, ValidationError> {
    let raw = raw.trim();
    parse_finite(raw).ok_or_else(|| ValidationError::NonNumericTemperature(raw.to_string()))
}

fn parse_scan_count(raw: &str) -> Result<u32, ValidationError> {
    let raw = raw.trim();
    let value = parse_finite(raw)
        .ok_or_else(|| ValidationError::NonNumericTemperature(raw.to_string()))?;
    // Number inputs may carry a fractional part; only whole scans count.
    let scans = value.trunc();
    if scans < 1.0 {
        return Err(ValidationError::InvalidScanCount);
    }
    if scans > f64::from(u32::MAX) {
        return Err(ValidationError::NonNumericTemperature(raw.to_string()));
    }
    Ok(scans as u32)
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}
