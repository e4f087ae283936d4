mod backend;
mod backends;
mod result;
pub mod yolo;

use anyhow::{anyhow, Result};

use crate::config::{BackendKind, ModelSettings};

pub use backend::DetectorBackend;
pub use backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, Detection};

/// Build the detector backend described by the model settings.
pub fn backend_from_settings(settings: &ModelSettings) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend {
        BackendKind::Scripted => {
            let backend = match &settings.detections_path {
                Some(path) => ScriptedBackend::from_path(path)?,
                None => ScriptedBackend::empty(),
            };
            Ok(Box::new(backend.with_min_confidence(settings.confidence)))
        }
        BackendKind::Tract => {
            #[cfg(feature = "backend-tract")]
            {
                let model_path = settings
                    .model_path
                    .as_ref()
                    .ok_or_else(|| anyhow!("tract backend requires model.path"))?;
                let labels = match &settings.labels_path {
                    Some(path) => yolo::read_labels(path)?,
                    None => Vec::new(),
                };
                let backend = TractBackend::new(model_path, settings.input_size, labels)?
                    .with_thresholds(settings.confidence, settings.iou);
                Ok(Box::new(backend))
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                Err(anyhow!(
                    "model backend 'tract' requires the backend-tract feature"
                ))
            }
        }
    }
}
