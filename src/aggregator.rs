use crate::{labels::ClassLabels, model_service::RawDetection};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("No category mapping for class id {class_id}")]
pub struct UnknownClassError {
    pub class_id: u32,
}

#[derive(Debug, Serialize)]
pub struct Detection {
    pub category: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResponse {
    pub detections: Vec<Detection>,
    pub total_items: usize,
    /// Currently every detected item counts as recyclable. A per-category
    /// recyclability table is the intended follow-up.
    pub recyclable: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<String>,
}

/// Shapes raw detections into the public response. A class id the labels
/// table cannot resolve means the model and the labels file disagree, which
/// is surfaced instead of dropped.
pub fn aggregate(
    raw_detections: Vec<RawDetection>,
    labels: &ClassLabels,
    elapsed_ms: Option<f64>,
) -> Result<DetectionResponse, UnknownClassError> {
    let mut detections = Vec::with_capacity(raw_detections.len());
    for detection in raw_detections {
        let category = labels
            .resolve(detection.class_id)
            .ok_or(UnknownClassError {
                class_id: detection.class_id,
            })?;
        detections.push(Detection {
            category: category.to_string(),
            confidence: detection.confidence,
            bbox: [detection.x1, detection.y1, detection.x2, detection.y2],
        });
    }

    let total_items = detections.len();
    Ok(DetectionResponse {
        detections,
        total_items,
        recyclable: total_items,
        processing_time: elapsed_ms.map(|ms| format!("{:.2} ms", ms)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_labels() -> ClassLabels {
        ClassLabels::new(vec![
            "plastic-bottle".to_string(),
            "aluminum-can".to_string(),
        ])
    }

    fn raw(class_id: u32, confidence: f32) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            x1: 10.0,
            y1: 20.0,
            x2: 110.0,
            y2: 220.0,
        }
    }

    #[test]
    fn resolves_categories_and_counts_items() {
        let response =
            aggregate(vec![raw(0, 0.92), raw(1, 0.61)], &test_labels(), Some(12.3456)).unwrap();

        assert_eq!(response.total_items, 2);
        assert_eq!(response.recyclable, 2);
        assert_eq!(response.detections[0].category, "plastic-bottle");
        assert_eq!(response.detections[1].category, "aluminum-can");
        assert_eq!(response.detections[0].bbox, [10.0, 20.0, 110.0, 220.0]);
        assert_eq!(response.processing_time.as_deref(), Some("12.35 ms"));
    }

    #[test]
    fn empty_detections_produce_zero_totals() {
        let response = aggregate(Vec::new(), &test_labels(), None).unwrap();

        assert_eq!(response.total_items, 0);
        assert_eq!(response.recyclable, 0);
        assert!(response.detections.is_empty());
    }

    #[test]
    fn unknown_class_id_is_surfaced() {
        let err = aggregate(vec![raw(7, 0.9)], &test_labels(), None).unwrap_err();
        assert_eq!(err.class_id, 7);
    }

    #[test]
    fn processing_time_is_omitted_when_unavailable() {
        let response = aggregate(Vec::new(), &test_labels(), None).unwrap();
        let json = serde_json::to_value(&response).unwrap();

        assert!(json.get("processingTime").is_none());
        assert_eq!(json["totalItems"], 0);
        assert_eq!(json["recyclable"], 0);
    }

    #[test]
    fn recyclable_never_exceeds_total_items() {
        let response = aggregate(vec![raw(0, 0.8)], &test_labels(), Some(1.0)).unwrap();
        assert!(response.recyclable <= response.total_items);
    }
}
