//! Request counters for the toolkit

use crate::modality::Modality;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upload,
    Preprocess,
    Augment,
}

/// Global metrics collector
#[derive(Default)]
pub struct Metrics {
    pub total_requests: AtomicU64,
    pub successful_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub total_latency_ms: AtomicU64,
    pub technique_failures: AtomicU64,

    // Per-operation counters
    pub upload_count: AtomicU64,
    pub preprocess_count: AtomicU64,
    pub augment_count: AtomicU64,

    // Per-modality counters
    pub text_count: AtomicU64,
    pub image_count: AtomicU64,
    pub audio_count: AtomicU64,
    pub mesh_count: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self, op: Operation, modality: Option<Modality>, success: bool, latency_ms: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }

        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);

        let op_counter = match op {
            Operation::Upload => &self.upload_count,
            Operation::Preprocess => &self.preprocess_count,
            Operation::Augment => &self.augment_count,
        };
        op_counter.fetch_add(1, Ordering::Relaxed);

        if let Some(modality) = modality {
            let modality_counter = match modality {
                Modality::Text => &self.text_count,
                Modality::Image => &self.image_count,
                Modality::Audio => &self.audio_count,
                Modality::Mesh => &self.mesh_count,
            };
            modality_counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Techniques that failed inside otherwise successful requests
    pub fn record_technique_failures(&self, count: u64) {
        self.technique_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);
        let successful = self.successful_requests.load(Ordering::Relaxed);
        let failed = self.failed_requests.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            technique_failures: self.technique_failures.load(Ordering::Relaxed),
            error_rate: if total > 0 { failed as f64 / total as f64 } else { 0.0 },
            avg_latency_ms: if total > 0 { total_latency / total } else { 0 },
            operations: OperationMetrics {
                upload: self.upload_count.load(Ordering::Relaxed),
                preprocess: self.preprocess_count.load(Ordering::Relaxed),
                augment: self.augment_count.load(Ordering::Relaxed),
            },
            modalities: ModalityMetrics {
                text: self.text_count.load(Ordering::Relaxed),
                image: self.image_count.load(Ordering::Relaxed),
                audio: self.audio_count.load(Ordering::Relaxed),
                mesh: self.mesh_count.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub technique_failures: u64,
    pub error_rate: f64,
    pub avg_latency_ms: u64,
    pub operations: OperationMetrics,
    pub modalities: ModalityMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub upload: u64,
    pub preprocess: u64,
    pub augment: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalityMetrics {
    pub text: u64,
    pub image: u64,
    pub audio: u64,
    #[serde(rename = "3d")]
    pub mesh: u64,
}

/// Timer for tracking operation latency
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = Metrics::new();
        metrics.record_request(Operation::Upload, Some(Modality::Text), true, 10);
        metrics.record_request(Operation::Preprocess, Some(Modality::Mesh), false, 30);
        metrics.record_request(Operation::Augment, None, true, 20);
        metrics.record_technique_failures(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.avg_latency_ms, 20);
        assert_eq!(snapshot.technique_failures, 2);
        assert_eq!(snapshot.operations.preprocess, 1);
        assert_eq!(snapshot.modalities.mesh, 1);
        assert_eq!(snapshot.modalities.audio, 0);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["modalities"]["3d"], 1);
    }
}
