#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::detect::yolo::{self, DecodeParams, OutputLayout};

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// Loads a local model file once; every frame is resized to the square model
/// input, normalised to `[0, 1]` and run on the CPU. Boxes are scaled back to
/// the frame's own pixel coordinates.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    labels: Vec<String>,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32, labels: Vec<String>) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{} input, {} labels)",
            model_path.display(),
            input_size,
            input_size,
            labels.len()
        );

        Ok(Self {
            model,
            input_size,
            labels,
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
        })
    }

    /// Override the default score and NMS thresholds.
    pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
        self.confidence_threshold = confidence;
        self.iou_threshold = iou;
        self
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let side = self.input_size;
        let resized = image::imageops::resize(image, side, side, FilterType::Triangle);
        let side = side as usize;
        tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        })
        .into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected yolo output shape {:?}", shape));
        }
        let layout = OutputLayout::infer(shape[1], shape[2]);
        let (channels, proposals) = match layout {
            OutputLayout::ChannelsFirst => (shape[1], shape[2]),
            OutputLayout::ProposalsFirst => (shape[2], shape[1]),
        };
        let data: Vec<f32> = view.iter().copied().collect();
        let params = DecodeParams {
            confidence: self.confidence_threshold,
            iou: self.iou_threshold,
            scale_x: image.width() as f32 / self.input_size as f32,
            scale_y: image.height() as f32 / self.input_size as f32,
        };
        yolo::decode(&data, layout, channels, proposals, &self.labels, &params)
    }
}
