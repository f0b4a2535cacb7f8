//! Modality router
//!
//! The [`Toolkit`] owns the upload store and one pipeline per modality. It
//! infers the modality of uploads from their extension, parses technique
//! names into the modality's closed enum and dispatches to the pipeline.
//!
//! ## Example
//!
//! ```rust,no_run
//! use media_augment::{Lexicon, ProcessRequest, Toolkit, ToolkitConfig, UploadStore};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = UploadStore::open("uploads")?;
//! let toolkit = Toolkit::new(store, Arc::new(Lexicon::builtin()), ToolkitConfig::default());
//!
//! let upload = toolkit.upload("notes.txt", b"Hello, World!")?;
//! println!("{} -> {}", upload.filename, upload.file_type);
//!
//! let report = toolkit.preprocess("text", &ProcessRequest {
//!     filename: "notes.txt".to_string(),
//!     techniques: vec!["lowercase".to_string(), "tokenize".to_string()],
//! })?;
//! println!("{}", serde_json::to_string(&report)?);
//! # Ok(())
//! # }
//! ```

use crate::audio::{AudioConfig, AudioPipeline};
use crate::error::{MediaError, Result};
use crate::ffmpeg::is_ffmpeg_installed;
use crate::image::{ImageConfig, ImagePipeline};
use crate::lexicon::Lexicon;
use crate::mesh::{Mesh, MeshConfig, MeshPipeline};
use crate::mesh_io::write_off;
use crate::metrics::{Metrics, Operation, Timer};
use crate::modality::Modality;
use crate::pipeline::{decode_base64, Pipeline};
use crate::storage::UploadStore;
use crate::technique::{parse_techniques, Technique, TechniqueReport};
use crate::text::{TextConfig, TextPipeline};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ToolkitConfig {
    pub text: TextConfig,
    pub image: ImageConfig,
    pub audio: AudioConfig,
    pub mesh: MeshConfig,
}

impl ToolkitConfig {
    /// Seed every randomized technique from one value
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.text.seed = seed;
        self.image.seed = seed;
        self.mesh.seed = seed;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub filename: String,
    #[serde(default)]
    pub techniques: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentRequest {
    pub filename: String,
    #[serde(default)]
    pub techniques: Vec<String>,
    /// Output of an earlier technique to augment instead of the stored file
    #[serde(default)]
    pub preprocessed_result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub filename: String,
    pub file_type: Modality,
    pub preview: String,
}

/// Capability card listing every modality and its techniques
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityCard {
    pub name: String,
    pub version: String,
    pub description: String,
    pub modalities: Vec<ModalityCard>,
    /// MP3 input needs the `ffmpeg` binary
    pub mp3_decoding: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalityCard {
    pub modality: Modality,
    pub extensions: Vec<String>,
    pub preprocess: Vec<String>,
    pub augment: Vec<String>,
}

impl ModalityCard {
    fn of<P: Pipeline>() -> Self {
        let owned = |names: Vec<&str>| names.into_iter().map(String::from).collect();
        Self {
            modality: P::MODALITY,
            extensions: owned(P::MODALITY.extensions().to_vec()),
            preprocess: owned(P::Process::names()),
            augment: owned(P::Augment::names()),
        }
    }
}

pub struct Toolkit {
    store: UploadStore,
    lexicon: Arc<Lexicon>,
    metrics: Arc<Metrics>,
    text: TextPipeline,
    image: ImagePipeline,
    audio: AudioPipeline,
    mesh: MeshPipeline,
}

impl Toolkit {
    pub fn new(store: UploadStore, lexicon: Arc<Lexicon>, config: ToolkitConfig) -> Self {
        Self {
            store,
            text: TextPipeline::new(config.text, Arc::clone(&lexicon)),
            image: ImagePipeline::new(config.image),
            audio: AudioPipeline::new(config.audio),
            mesh: MeshPipeline::new(config.mesh),
            lexicon,
            metrics: Metrics::new(),
        }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn store(&self) -> &UploadStore {
        &self.store
    }

    /// Store an upload and preview it; unsupported types are not stored
    pub fn upload(&self, filename: &str, bytes: &[u8]) -> Result<UploadSummary> {
        let timer = Timer::new();
        let modality = Modality::from_filename(filename);
        let tag = modality.as_ref().ok().copied();

        let result = modality.and_then(|file_type| {
            let filename = UploadStore::sanitize(filename)?;
            let path = self.store.save(&filename, bytes)?;
            let preview = self.preview(file_type, &path)?;
            Ok(UploadSummary { filename, file_type, preview })
        });
        self.finish(Operation::Upload, tag, timer, result)
    }

    pub fn preview(&self, modality: Modality, path: &Path) -> Result<String> {
        match modality {
            Modality::Text => self.text.preview(path),
            Modality::Image => self.image.preview(path),
            Modality::Audio => self.audio.preview(path),
            Modality::Mesh => self.mesh.preview(path),
        }
    }

    pub fn preprocess(&self, file_type: &str, request: &ProcessRequest) -> Result<TechniqueReport> {
        let timer = Timer::new();
        let modality = Modality::from_name(file_type);
        let tag = modality.as_ref().ok().copied();

        let result = modality.and_then(|m| match m {
            Modality::Text => self.process_with(&self.text, request),
            Modality::Image => self.process_with(&self.image, request),
            Modality::Audio => self.process_with(&self.audio, request),
            Modality::Mesh => self.process_with(&self.mesh, request),
        });
        self.finish(Operation::Preprocess, tag, timer, result)
    }

    pub fn augment(&self, file_type: &str, request: &AugmentRequest) -> Result<TechniqueReport> {
        let timer = Timer::new();
        let modality = Modality::from_name(file_type);
        let tag = modality.as_ref().ok().copied();

        let result = modality.and_then(|m| match m {
            Modality::Text => self.augment_with(&self.text, request),
            Modality::Image => self.augment_with(&self.image, request),
            Modality::Audio => self.augment_with(&self.audio, request),
            Modality::Mesh => self.augment_with(&self.mesh, request),
        });
        self.finish(Operation::Augment, tag, timer, result)
    }

    pub fn describe(&self) -> CapabilityCard {
        CapabilityCard {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Preprocessing and augmentation for text, image, audio and 3D mesh files".to_string(),
            modalities: vec![
                ModalityCard::of::<TextPipeline>(),
                ModalityCard::of::<ImagePipeline>(),
                ModalityCard::of::<AudioPipeline>(),
                ModalityCard::of::<MeshPipeline>(),
            ],
            mp3_decoding: is_ffmpeg_installed(),
        }
    }

    fn process_with<P: Pipeline>(&self, pipeline: &P, request: &ProcessRequest) -> Result<TechniqueReport> {
        let techniques = parse_techniques::<P::Process>(&request.techniques)?;
        let path = self.store.resolve(&request.filename)?;
        debug!(modality = %P::MODALITY, file = %path.display(), ?techniques, "preprocessing");
        pipeline.process(&path, &techniques)
    }

    fn augment_with<P: Pipeline>(&self, pipeline: &P, request: &AugmentRequest) -> Result<TechniqueReport> {
        let techniques = parse_techniques::<P::Augment>(&request.techniques)?;

        match &request.preprocessed_result {
            Some(payload) => {
                let scratch = self.materialize(P::MODALITY, payload)?;
                debug!(modality = %P::MODALITY, file = %scratch.path().display(), ?techniques, "augmenting earlier result");
                pipeline.augment(scratch.path(), &techniques)
            }
            None => {
                let path = self.store.resolve(&request.filename)?;
                debug!(modality = %P::MODALITY, file = %path.display(), ?techniques, "augmenting");
                pipeline.augment(&path, &techniques)
            }
        }
    }

    /// Write a previously returned payload to a scratch file the pipeline can load
    fn materialize(&self, modality: Modality, payload: &str) -> Result<NamedTempFile> {
        match modality {
            Modality::Text => self.store.scratch("txt", percent_decoded(payload).as_bytes()),
            Modality::Image => self.store.scratch("png", &decode_payload(payload)?),
            Modality::Audio => self.store.scratch("wav", &decode_payload(payload)?),
            Modality::Mesh => {
                let mesh = Mesh::from_json(&percent_decoded(payload))
                    .map_err(|e| MediaError::InvalidPayload(format!("preprocessed_result is not a mesh: {}", e)))?;
                self.store.scratch("off", write_off(&mesh).as_bytes())
            }
        }
    }

    fn finish<T>(&self, op: Operation, modality: Option<Modality>, timer: Timer, result: Result<T>) -> Result<T>
    where
        T: ReportLike,
    {
        let latency = timer.elapsed_ms();
        self.metrics.record_request(op, modality, result.is_ok(), latency);
        match &result {
            Ok(value) => {
                let failures = value.failures();
                if failures > 0 {
                    self.metrics.record_technique_failures(failures as u64);
                }
                debug!(?op, latency_ms = latency, "request completed");
            }
            Err(e) => debug!(?op, latency_ms = latency, "request failed: {}", e),
        }
        result
    }
}

/// Responses that may carry per-technique failures
trait ReportLike {
    fn failures(&self) -> usize;
}

impl ReportLike for TechniqueReport {
    fn failures(&self) -> usize {
        self.failure_count()
    }
}

impl ReportLike for UploadSummary {
    fn failures(&self) -> usize {
        0
    }
}

fn percent_decoded(payload: &str) -> String {
    percent_decode_str(payload)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| payload.to_string())
}

fn decode_payload(payload: &str) -> Result<Vec<u8>> {
    decode_base64(payload)
        .map_err(|e| MediaError::InvalidPayload(format!("preprocessed_result is not base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode_base64;
    use crate::technique::TechniqueOutcome;

    fn toolkit(dir: &Path) -> Toolkit {
        let store = UploadStore::open(dir).unwrap();
        Toolkit::new(store, Arc::new(Lexicon::builtin()), ToolkitConfig::default().with_seed(Some(1)))
    }

    fn process(filename: &str, techniques: &[&str]) -> ProcessRequest {
        ProcessRequest {
            filename: filename.to_string(),
            techniques: techniques.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_unsupported_upload_is_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = toolkit(dir.path());

        let err = toolkit.upload("blob.bin", b"\x00\x01").unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedType(_)));
        assert_eq!(err.to_string(), "Unsupported file type");
        assert!(!dir.path().join("blob.bin").exists());
    }

    #[test]
    fn test_upload_then_preprocess_text() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = toolkit(dir.path());

        let summary = toolkit.upload("notes.txt", b"Hello, World!").unwrap();
        assert_eq!(summary.file_type, Modality::Text);
        assert_eq!(summary.preview, "Hello, World!");

        let report = toolkit
            .preprocess("text", &process("notes.txt", &["lowercase", "remove_punctuation"]))
            .unwrap();
        assert_eq!(report.output("lowercase"), Some("hello, world!"));
        assert_eq!(report.output("remove_punctuation"), Some("Hello World"));

        let snapshot = toolkit.metrics().snapshot();
        assert_eq!(snapshot.operations.upload, 1);
        assert_eq!(snapshot.operations.preprocess, 1);
        assert_eq!(snapshot.modalities.text, 2);
    }

    #[test]
    fn test_unknown_technique_rejected_before_file_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = toolkit(dir.path());

        let err = toolkit.preprocess("text", &process("missing.txt", &["uppercase"])).unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedTechnique { .. }));

        let err = toolkit.preprocess("text", &process("missing.txt", &["lowercase"])).unwrap_err();
        assert!(matches!(err, MediaError::NotFound(_)));

        let err = toolkit.preprocess("video", &process("missing.txt", &[])).unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedType(_)));
    }

    #[test]
    fn test_augment_reentry_uses_payload_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = toolkit(dir.path());

        let request = AugmentRequest {
            filename: "never-uploaded.txt".to_string(),
            techniques: vec!["insertion".to_string()],
            preprocessed_result: Some("quick%20brown%20fox".to_string()),
        };
        let report = toolkit.augment("text", &request).unwrap();
        let output = report.output("insertion").unwrap();
        assert!(output.contains("quick") && output.contains("fox"));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_augment_reentry_rejects_bad_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = toolkit(dir.path());

        let mut request = AugmentRequest {
            filename: "x.png".to_string(),
            techniques: vec!["flip".to_string()],
            preprocessed_result: Some("***not base64***".to_string()),
        };
        assert!(matches!(toolkit.augment("image", &request), Err(MediaError::InvalidPayload(_))));

        request.techniques = vec!["rotate".to_string()];
        request.preprocessed_result = Some("{\"vertices\": 3}".to_string());
        assert!(matches!(toolkit.augment("3d", &request), Err(MediaError::InvalidPayload(_))));
    }

    #[test]
    fn test_image_payload_with_failing_decode_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = toolkit(dir.path());

        let request = AugmentRequest {
            filename: "x.png".to_string(),
            techniques: vec!["flip".to_string()],
            preprocessed_result: Some(encode_base64(b"not an image")),
        };
        assert!(matches!(toolkit.augment("image", &request), Err(MediaError::Load { .. })));
    }

    #[test]
    fn test_mesh_reentry_rotates_payload() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = toolkit(dir.path());

        let payload = r#"{"vertices": [[1,0,0],[0,1,0],[0,0,1]], "faces": [[0,1,2]]}"#;
        let request = AugmentRequest {
            filename: "tri.off".to_string(),
            techniques: vec!["rotate".to_string(), "scale".to_string()],
            preprocessed_result: Some(payload.to_string()),
        };
        let report = toolkit.augment("3d", &request).unwrap();
        assert_eq!(report.len(), 2);
        for technique in ["rotate", "scale"] {
            assert!(matches!(report.get(technique), Some(TechniqueOutcome::Ok { .. })));
            let mesh = Mesh::from_json(report.output(technique).unwrap()).unwrap();
            assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        }
    }

    #[test]
    fn test_capability_card_lists_techniques() {
        let dir = tempfile::tempdir().unwrap();
        let card = toolkit(dir.path()).describe();

        assert_eq!(card.modalities.len(), 4);
        let mesh = card.modalities.iter().find(|m| m.modality == Modality::Mesh).unwrap();
        assert_eq!(mesh.preprocess, vec!["normalize", "center", "simplify"]);
        assert_eq!(mesh.augment, vec!["rotate", "scale", "noise"]);
        assert!(mesh.extensions.contains(&"off".to_string()));
    }
}
