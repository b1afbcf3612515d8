use crate::{
    config::ModelConfig,
    model_service::{DetectionModel, InferenceError, RawDetection},
};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{s, Array, Axis, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

const INPUT_SIZE: u32 = 640;

fn intersection(box1: &RawDetection, box2: &RawDetection) -> f32 {
    let width = (box1.x2.min(box2.x2) - box1.x1.max(box2.x1)).max(0.0);
    let height = (box1.y2.min(box2.y2) - box1.y1.max(box2.y1)).max(0.0);
    width * height
}

fn union(box1: &RawDetection, box2: &RawDetection) -> f32 {
    ((box1.x2 - box1.x1) * (box1.y2 - box1.y1)) + ((box2.x2 - box2.x1) * (box2.y2 - box2.y1))
        - intersection(box1, box2)
}

fn iou(box1: &RawDetection, box2: &RawDetection) -> f32 {
    let union = union(box1, box2);
    if union <= 0.0 {
        return 0.0;
    }
    intersection(box1, box2) / union
}

fn preprocess(image: &DynamicImage) -> (Array<f32, Ix4>, u32, u32) {
    let (img_width, img_height) = image.dimensions();
    let img = image.resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);

    let mut input = Array::zeros((1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize));
    for pixel in img.pixels() {
        let x = pixel.0 as usize;
        let y = pixel.1 as usize;
        let [r, g, b, _] = pixel.2 .0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    (input, img_width, img_height)
}

/// Turns the raw `[1, 4 + classes, candidates]` output tensor into boxes in
/// original-image pixel coordinates, keeping the best class per candidate
/// and dropping anything below the confidence cutoff.
fn decode_candidates(
    outputs: &ndarray::ArrayD<f32>,
    img_width: u32,
    img_height: u32,
    confidence_threshold: f32,
) -> Result<Vec<RawDetection>, InferenceError> {
    if outputs.ndim() != 3 || outputs.shape()[1] <= 4 {
        return Err(InferenceError::Output(format!(
            "unexpected output tensor shape {:?}",
            outputs.shape()
        )));
    }

    let output = outputs.slice(s![0, .., ..]);
    let mut boxes = Vec::new();

    for candidate in output.axis_iter(Axis(1)) {
        let row: Vec<_> = candidate.iter().copied().collect();
        let Some((class_id, confidence)) = row
            .iter()
            .skip(4)
            .enumerate()
            .map(|(index, value)| (index, *value))
            .reduce(|accum, row| if row.1 > accum.1 { row } else { accum })
        else {
            continue;
        };

        if confidence < confidence_threshold {
            continue;
        }

        let xc = row[0] / (INPUT_SIZE as f32) * (img_width as f32);
        let yc = row[1] / (INPUT_SIZE as f32) * (img_height as f32);
        let w = row[2] / (INPUT_SIZE as f32) * (img_width as f32);
        let h = row[3] / (INPUT_SIZE as f32) * (img_height as f32);
        if w <= 0.0 || h <= 0.0 {
            continue;
        }

        boxes.push(RawDetection {
            class_id: class_id as u32,
            confidence,
            x1: xc - w / 2.,
            y1: yc - h / 2.,
            x2: xc + w / 2.,
            y2: yc + h / 2.,
        });
    }

    Ok(boxes)
}

/// Greedy non-max suppression, scoped per class: a candidate survives unless
/// an already-kept box of the same class overlaps it at or above the
/// threshold. Output is ordered by descending confidence.
fn non_max_suppression(mut boxes: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));

    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in boxes {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) >= iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

/// ONNX-backed detection service. Sessions take exclusive access to run, so
/// a pool of mutex-guarded sessions is rotated round-robin to keep
/// concurrent requests from serializing behind a single lock.
pub struct OrtDetectionService {
    sessions: Vec<Arc<Mutex<Session>>>,
    counter: AtomicUsize,
}

impl OrtDetectionService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ort::Error> {
        ort::init().commit()?;

        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_model_path())?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!("Created {} ONNX sessions", num_instances);

        Ok(Self {
            sessions,
            counter: AtomicUsize::new(0),
        })
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ndarray::ArrayD<f32>, InferenceError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|_| InferenceError::Poisoned)?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)?;
        let outputs = session.run(ort::inputs![tensor_ref])?;

        let (shape, data) = outputs["output0"].try_extract_tensor::<f32>()?;
        let array = ndarray::ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())
            .map_err(|e| InferenceError::Output(format!("invalid tensor shape: {}", e)))?;

        Ok(array)
    }
}

impl DetectionModel for OrtDetectionService {
    fn detect(
        &self,
        image: &DynamicImage,
        confidence_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Vec<RawDetection>, InferenceError> {
        let (input, img_width, img_height) = preprocess(image);
        let outputs = self.run_inference(&input)?;
        let boxes = decode_candidates(&outputs, img_width, img_height, confidence_threshold)?;
        Ok(non_max_suppression(boxes, iou_threshold))
    }
}
