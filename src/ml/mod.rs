pub mod ml_model;
pub mod training;
pub mod evaluation;
pub mod inference;

pub use ml_model::{CharClassifier, ModelConfig, IMAGE_SIZE, MIN_IMAGE_SIZE, load_grayscale_image, resize_luma, model_to_bytes, model_from_bytes};
pub use training::{GlyphBatcher, GlyphBatch, TrainingHistory, train_model};
pub use evaluation::{ClassificationReport, ClassMetrics, accuracy_score, predict_classes};
pub use inference::InferenceEngine;
