//! TorchScript backends
//!
//! Detectors take a `[1, 3, H, W]` float image in `[0, 1]` and return either
//! a `[N, 6]` tensor of `x1, y1, x2, y2, confidence, class` rows, or a tuple
//! of that tensor and `[N, h, w]` mask probabilities. Classifiers take a
//! `[1, 3, H, W]` image and return class logits.

use super::{Backend, BackendFactory, Finding, ModelKind, Prediction, Region};
use crate::config::VEGETATION_INPUT_SIZE;
use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tch::{no_grad, CModule, IValue, Kind, Tensor};

/// Loads every kind of model as a TorchScript module
#[derive(Debug, Default)]
pub struct TorchFactory;

impl BackendFactory for TorchFactory {
    fn load(&self, kind: ModelKind, path: &Path) -> Result<Arc<dyn Backend>> {
        let module = Mutex::new(CModule::load(path)?);
        let backend: Arc<dyn Backend> = match kind {
            ModelKind::Vegetation => Arc::new(TorchDetector {
                module,
                input_size: Some(VEGETATION_INPUT_SIZE),
                labels: &["vegetation"],
            }),
            // callers already resize to the model's input size
            ModelKind::SoilDetection => Arc::new(TorchDetector {
                module,
                input_size: None,
                labels: &[],
            }),
            ModelKind::SoilClassifier => Arc::new(TorchClassifier { module }),
        };
        Ok(backend)
    }
}

/// Convert an image to a `[1, 3, H, W]` float tensor
fn to_tensor(image: &RgbImage) -> Tensor {
    let (w, h) = image.dimensions();
    Tensor::from_slice(image.as_raw())
        .view([h as i64, w as i64, 3])
        .permute([2, 0, 1])
        .to_kind(Kind::Float)
        .unsqueeze(0)
        / 255.
}

fn to_vec(tensor: &Tensor) -> Result<Vec<f32>> {
    Ok(Vec::<f32>::try_from(
        &tensor.to_kind(Kind::Float).flatten(0, -1),
    )?)
}

/// Height and width of one mask plane, given the mask tensor's shape and the
/// number of detections the masks belong to
fn mask_size(dims: &[i64], detections: usize) -> Result<(u32, u32)> {
    let (count, h, w) = match dims {
        [n, h, w] | [1, n, h, w] => (*n, *h, *w),
        _ => return Err(anyhow!("masks have shape {dims:?}")),
    };
    if count < 0 || count as usize != detections {
        return Err(anyhow!("{count} masks for {detections} detections"));
    }
    if h <= 0 || w <= 0 {
        return Err(anyhow!("masks have shape {dims:?}"));
    }
    Ok((h as u32, w as u32))
}

pub struct TorchDetector {
    module: Mutex<CModule>,
    /// Square size the image is resized to, if the module needs it
    input_size: Option<u32>,
    labels: &'static [&'static str],
}

impl TorchDetector {
    fn forward(&self, input: &RgbImage) -> Result<(Tensor, Option<Tensor>)> {
        let module = self
            .module
            .lock()
            .map_err(|_| anyhow!("model lock poisoned"))?;
        let output = no_grad(|| module.forward_is(&[IValue::Tensor(to_tensor(input))]))?;

        match output {
            IValue::Tensor(boxes) => Ok((boxes, None)),
            IValue::Tuple(items) => match <[IValue; 2]>::try_from(items) {
                Ok([IValue::Tensor(boxes), IValue::Tensor(masks)]) => Ok((boxes, Some(masks))),
                _ => Err(anyhow!("detector returned a malformed tuple")),
            },
            _ => Err(anyhow!("detector inference failed to return a tensor")),
        }
    }
}

impl Backend for TorchDetector {
    fn infer(&self, image: &RgbImage) -> Result<Prediction> {
        let (width, height) = image.dimensions();
        let input = match self.input_size {
            Some(side) if (width, height) != (side, side) => {
                imageops::resize(image, side, side, FilterType::Triangle)
            }
            _ => image.clone(),
        };
        let (scale_x, scale_y) = (
            width as f32 / input.width() as f32,
            height as f32 / input.height() as f32,
        );

        let (boxes, masks) = self.forward(&input)?;
        let rows = to_vec(&boxes)?;
        if rows.len() % 6 != 0 {
            return Err(anyhow!("detector returned {} values, not rows of 6", rows.len()));
        }

        let name = |class: u32| self.labels.get(class as usize).map(|l| l.to_string());
        let mut findings = vec![];

        if let Some(masks) = masks {
            let (mh, mw) = mask_size(&masks.size(), rows.len() / 6)?;
            let probabilities = to_vec(&masks)?;
            let plane = (mh * mw) as usize;
            for (row, mask) in rows.chunks(6).zip(probabilities.chunks(plane)) {
                let pixels = mask
                    .iter()
                    .map(|p| (p.clamp(0.0, 1.0) * 255.0).round() as u8)
                    .collect();
                let mask = GrayImage::from_raw(mw, mh, pixels)
                    .ok_or_else(|| anyhow!("mask does not match its shape"))?;
                findings.push(Finding {
                    class_id: row[5] as u32,
                    class_name: name(row[5] as u32),
                    confidence: row[4],
                    region: Some(Region::Mask(mask)),
                });
            }
        }

        for row in rows.chunks(6) {
            findings.push(Finding {
                class_id: row[5] as u32,
                class_name: name(row[5] as u32),
                confidence: row[4],
                region: Some(Region::BBox([
                    row[0] * scale_x,
                    row[1] * scale_y,
                    row[2] * scale_x,
                    row[3] * scale_y,
                ])),
            });
        }

        Ok(Prediction { findings })
    }

    fn engine(&self) -> &str {
        "torch"
    }
}

pub struct TorchClassifier {
    module: Mutex<CModule>,
}

impl Backend for TorchClassifier {
    fn infer(&self, image: &RgbImage) -> Result<Prediction> {
        let module = self
            .module
            .lock()
            .map_err(|_| anyhow!("model lock poisoned"))?;
        let logits = no_grad(|| module.forward_ts(&[to_tensor(image)]))?;
        let probabilities = to_vec(&logits.softmax(-1, Some(Kind::Float)))?;

        let findings = probabilities
            .into_iter()
            .enumerate()
            .map(|(class, p)| Finding {
                class_id: class as u32,
                class_name: None,
                confidence: p,
                region: None,
            })
            .collect();
        Ok(Prediction { findings })
    }

    fn engine(&self) -> &str {
        "torch"
    }
}
