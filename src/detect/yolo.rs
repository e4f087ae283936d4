//! YOLOv8 output decoding.
//!
//! Ultralytics detection heads emit one tensor of shape `[1, 4 + C, N]`
//! (channels first) or `[1, N, 4 + C]`, where each proposal carries
//! `cx, cy, w, h` in model input pixels followed by `C` class scores.

use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::detect::result::{BoundingBox, Detection};

/// Upper bound on proposals kept before NMS.
const MAX_CANDIDATES: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputLayout {
    /// `[1, 4 + C, N]`
    ChannelsFirst,
    /// `[1, N, 4 + C]`
    ProposalsFirst,
}

impl OutputLayout {
    /// Guess the layout from the two trailing dimensions: there are always far
    /// more proposals than channels.
    pub fn infer(dim1: usize, dim2: usize) -> Self {
        if dim1 < dim2 {
            OutputLayout::ChannelsFirst
        } else {
            OutputLayout::ProposalsFirst
        }
    }
}

#[derive(Clone, Debug)]
pub struct DecodeParams {
    pub confidence: f32,
    pub iou: f32,
    /// Multiply model-space x coordinates by this to get frame pixels.
    pub scale_x: f32,
    /// Multiply model-space y coordinates by this to get frame pixels.
    pub scale_y: f32,
}

/// Decode a raw output tensor into frame-space detections after NMS.
pub fn decode(
    data: &[f32],
    layout: OutputLayout,
    channels: usize,
    proposals: usize,
    labels: &[String],
    params: &DecodeParams,
) -> Result<Vec<Detection>> {
    if channels < 5 {
        return Err(anyhow!("yolo output needs at least 5 channels, got {}", channels));
    }
    let expected = channels
        .checked_mul(proposals)
        .ok_or_else(|| anyhow!("yolo output dimensions overflow"))?;
    if data.len() != expected {
        return Err(anyhow!(
            "yolo output length mismatch: expected {}, got {}",
            expected,
            data.len()
        ));
    }

    let at = |proposal: usize, channel: usize| -> f32 {
        match layout {
            OutputLayout::ChannelsFirst => data[channel * proposals + proposal],
            OutputLayout::ProposalsFirst => data[proposal * channels + channel],
        }
    };

    let num_classes = channels - 4;
    let mut candidates: Vec<(usize, f32, BoundingBox)> = Vec::new();
    for p in 0..proposals {
        let (class_id, score) = (0..num_classes)
            .map(|c| (c, at(p, 4 + c)))
            .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
        if !score.is_finite() || score < params.confidence {
            continue;
        }
        let (cx, cy, w, h) = (at(p, 0), at(p, 1), at(p, 2), at(p, 3));
        let bbox = BoundingBox::new(
            (cx - w / 2.0) * params.scale_x,
            (cy - h / 2.0) * params.scale_y,
            (cx + w / 2.0) * params.scale_x,
            (cy + h / 2.0) * params.scale_y,
        );
        candidates.push((class_id, score.min(1.0), bbox));
    }

    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
    candidates.truncate(MAX_CANDIDATES);

    Ok(nms(candidates, params.iou)
        .into_iter()
        .map(|(class_id, score, bbox)| Detection::new(label_for(labels, class_id), score, bbox))
        .collect())
}

/// Greedy per-class NMS over candidates sorted by descending score.
fn nms(
    candidates: Vec<(usize, f32, BoundingBox)>,
    iou_threshold: f32,
) -> Vec<(usize, f32, BoundingBox)> {
    let mut suppressed = vec![false; candidates.len()];
    let mut kept = Vec::new();
    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        let (class_i, _, box_i) = candidates[i];
        for j in (i + 1)..candidates.len() {
            let (class_j, _, box_j) = candidates[j];
            if class_i == class_j && box_i.iou(&box_j) > iou_threshold {
                suppressed[j] = true;
            }
        }
        kept.push(candidates[i]);
    }
    kept
}

fn label_for(labels: &[String], class_id: usize) -> String {
    labels
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class_{}", class_id))
}

/// Read class names, one per line. Blank lines are skipped.
pub fn read_labels<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels file {}", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DecodeParams {
        DecodeParams {
            confidence: 0.5,
            iou: 0.45,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    fn labels() -> Vec<String> {
        vec!["Person".to_string(), "no_helmet".to_string()]
    }

    /// Builds a channels-first tensor from proposals of `[cx, cy, w, h, s0, s1]`.
    fn channels_first(proposals: &[[f32; 6]]) -> Vec<f32> {
        let mut data = vec![0.0; 6 * proposals.len()];
        for (p, values) in proposals.iter().enumerate() {
            for (c, v) in values.iter().enumerate() {
                data[c * proposals.len() + p] = *v;
            }
        }
        data
    }

    #[test]
    fn decodes_and_scales_boxes() -> Result<()> {
        let data = channels_first(&[[100.0, 100.0, 40.0, 80.0, 0.1, 0.9]]);
        let mut p = params();
        p.scale_x = 2.0;
        p.scale_y = 0.5;
        let dets = decode(&data, OutputLayout::ChannelsFirst, 6, 1, &labels(), &p)?;
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "no_helmet");
        assert_eq!(dets[0].bbox, BoundingBox::new(160.0, 30.0, 240.0, 70.0));
        Ok(())
    }

    #[test]
    fn drops_low_scores_and_overlaps_of_same_class() -> Result<()> {
        let data = channels_first(&[
            [100.0, 100.0, 50.0, 50.0, 0.95, 0.0],
            [102.0, 101.0, 50.0, 50.0, 0.80, 0.0],
            [102.0, 101.0, 50.0, 50.0, 0.0, 0.70],
            [300.0, 300.0, 20.0, 20.0, 0.30, 0.0],
        ]);
        let dets = decode(&data, OutputLayout::ChannelsFirst, 6, 4, &labels(), &params())?;
        let summary: Vec<(&str, f32)> = dets.iter().map(|d| (d.label.as_str(), d.confidence)).collect();
        assert_eq!(summary, vec![("Person", 0.95), ("no_helmet", 0.70)]);
        Ok(())
    }

    #[test]
    fn proposals_first_layout_matches() -> Result<()> {
        let data = vec![50.0, 50.0, 10.0, 10.0, 0.6, 0.1];
        let dets = decode(&data, OutputLayout::ProposalsFirst, 6, 1, &[], &params())?;
        assert_eq!(dets[0].label, "class_0");
        assert_eq!(OutputLayout::infer(84, 8400), OutputLayout::ChannelsFirst);
        assert_eq!(OutputLayout::infer(8400, 84), OutputLayout::ProposalsFirst);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_lengths() {
        assert!(decode(&[0.0; 5], OutputLayout::ChannelsFirst, 6, 1, &[], &params()).is_err());
    }
}
