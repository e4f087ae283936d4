//! Violation predicates.
//!
//! Two independent rules decide whether a detection is reportable:
//!
//! - `LabelRule`: the label is in the violation set and the confidence clears
//!   the threshold (missing PPE).
//! - `ZoneRule`: a subject (a person, by default) has its box center strictly
//!   inside the restricted polygon.
//!
//! `ViolationRules` runs whichever checks the caller enabled. Each passing rule
//! yields its own `Violation`; rules are never ANDed together here.

use std::collections::HashSet;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::detect::{BoundingBox, Detection};
use crate::zone::Zone;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;
pub const DEFAULT_VIOLATION_LABELS: &[&str] =
    &["no_helmet", "no_vest", "no_mask", "no_gloves", "no_goggles"];
pub const DEFAULT_NEGATION_PREFIX: &str = "no_";
pub const DEFAULT_ZONE_SUBJECT: &str = "person";
pub const DEFAULT_ZONE_VIOLATION_TYPE: &str = "Person in Restricted Zone";

/// Which predicate produced a violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Check {
    /// Label/confidence predicate.
    Ppe,
    /// Zone containment predicate.
    Zone,
}

impl std::str::FromStr for Check {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ppe" | "label" => Ok(Check::Ppe),
            "zone" => Ok(Check::Zone),
            other => Err(anyhow!("unknown check '{}'; expected ppe or zone", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Violation {
    pub check: Check,
    pub violation_type: String,
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

#[derive(Clone, Debug)]
pub struct LabelRule {
    labels: HashSet<String>,
    threshold: f32,
}

impl LabelRule {
    pub fn new<I, S>(labels: I, threshold: f32) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!("confidence threshold {} outside [0, 1]", threshold));
        }
        let labels: HashSet<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(anyhow!("violation label set must not be empty"));
        }
        Ok(Self { labels, threshold })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn is_violation_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn is_violation(&self, det: &Detection) -> bool {
        det.confidence >= self.threshold && self.labels.contains(&det.label)
    }

    pub fn evaluate(&self, det: &Detection) -> Option<Violation> {
        self.is_violation(det).then(|| Violation {
            check: Check::Ppe,
            violation_type: det.label.clone(),
            label: det.label.clone(),
            confidence: det.confidence,
            bbox: det.bbox,
        })
    }
}

impl Default for LabelRule {
    fn default() -> Self {
        Self {
            labels: DEFAULT_VIOLATION_LABELS.iter().map(|s| s.to_string()).collect(),
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ZoneRule {
    zone: Zone,
    subjects: Vec<String>,
    violation_type: String,
}

impl ZoneRule {
    pub fn new(zone: Zone) -> Self {
        Self {
            zone,
            subjects: vec![DEFAULT_ZONE_SUBJECT.to_string()],
            violation_type: DEFAULT_ZONE_VIOLATION_TYPE.to_string(),
        }
    }

    /// Labels (case-insensitive) the zone applies to.
    pub fn with_subjects(mut self, subjects: Vec<String>) -> Self {
        self.subjects = subjects.into_iter().map(|s| s.to_lowercase()).collect();
        self
    }

    pub fn with_violation_type(mut self, violation_type: impl Into<String>) -> Self {
        self.violation_type = violation_type.into();
        self
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    pub fn applies_to(&self, det: &Detection) -> bool {
        let label = det.label.to_lowercase();
        self.subjects.iter().any(|s| *s == label)
    }

    pub fn is_violation(&self, det: &Detection) -> bool {
        self.applies_to(det) && self.zone.contains(det.bbox.center())
    }

    pub fn evaluate(&self, det: &Detection) -> Option<Violation> {
        self.is_violation(det).then(|| Violation {
            check: Check::Zone,
            violation_type: self.violation_type.clone(),
            label: det.label.clone(),
            confidence: det.confidence,
            bbox: det.bbox,
        })
    }
}

/// The enabled checks plus the rules behind them.
#[derive(Clone, Debug)]
pub struct ViolationRules {
    checks: Vec<Check>,
    label: LabelRule,
    zone: Option<ZoneRule>,
    negation_prefix: String,
}

impl ViolationRules {
    pub fn new(checks: Vec<Check>, label: LabelRule, zone: Option<ZoneRule>) -> Result<Self> {
        if checks.is_empty() {
            return Err(anyhow!("at least one check must be enabled"));
        }
        if checks.contains(&Check::Zone) && zone.is_none() {
            return Err(anyhow!("zone check enabled without a zone polygon"));
        }
        let mut unique = Vec::with_capacity(checks.len());
        for check in checks {
            if !unique.contains(&check) {
                unique.push(check);
            }
        }
        Ok(Self {
            checks: unique,
            label,
            zone,
            negation_prefix: DEFAULT_NEGATION_PREFIX.to_string(),
        })
    }

    pub fn with_negation_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.negation_prefix = prefix.into();
        self
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn is_enabled(&self, check: Check) -> bool {
        self.checks.contains(&check)
    }

    pub fn label_rule(&self) -> &LabelRule {
        &self.label
    }

    pub fn zone_rule(&self) -> Option<&ZoneRule> {
        self.zone.as_ref()
    }

    pub fn negation_prefix(&self) -> &str {
        &self.negation_prefix
    }

    /// True for labels describing missing equipment, whether or not they are
    /// above threshold. Used for colouring overlays.
    pub fn is_negative_label(&self, label: &str) -> bool {
        self.label.is_violation_label(label)
            || (!self.negation_prefix.is_empty()
                && label
                    .to_lowercase()
                    .starts_with(&self.negation_prefix.to_lowercase()))
    }

    /// Every violation the enabled checks find in one detection.
    pub fn evaluate(&self, det: &Detection) -> Vec<Violation> {
        self.checks
            .iter()
            .filter_map(|check| match check {
                Check::Ppe => self.label.evaluate(det),
                Check::Zone => self.zone.as_ref().and_then(|rule| rule.evaluate(det)),
            })
            .collect()
    }
}
