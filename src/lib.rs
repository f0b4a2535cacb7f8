//! media_augment - preprocessing and augmentation for text, image, audio and 3D meshes
//!
//! Each modality is a [`Pipeline`] with a preview, a set of preprocessing
//! techniques and a set of augmentation techniques. The [`Toolkit`] routes
//! uploads to the right pipeline by file extension, and [`server::router`]
//! exposes it over HTTP.
//!
//! MP3 decoding shells out to the system `ffmpeg` binary (LGPL-safe, no linking).

pub mod audio;
pub mod decimate;
pub mod error;
pub mod ffmpeg;
pub mod image;
pub mod lexicon;
pub mod mesh;
pub mod mesh_io;
pub mod metrics;
pub mod modality;
pub mod pipeline;
pub mod server;
pub mod spectral;
pub mod storage;
pub mod technique;
pub mod text;
pub mod toolkit;

pub use audio::{AudioAugment, AudioClip, AudioConfig, AudioPipeline, AudioPreprocess};
pub use error::{MediaError, Result};
pub use ffmpeg::{FfmpegCommand, FfmpegError};
pub use self::image::{ImageAugment, ImageConfig, ImagePipeline, ImagePreprocess};
pub use lexicon::Lexicon;
pub use mesh::{Mesh, MeshAugment, MeshConfig, MeshPipeline, MeshPreprocess};
pub use metrics::{Metrics, MetricsSnapshot};
pub use modality::Modality;
pub use pipeline::Pipeline;
pub use storage::UploadStore;
pub use technique::{Technique, TechniqueOutcome, TechniqueReport};
pub use text::{TextAugment, TextConfig, TextPipeline, TextPreprocess};
pub use toolkit::{AugmentRequest, CapabilityCard, ProcessRequest, Toolkit, ToolkitConfig, UploadSummary};
