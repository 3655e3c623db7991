//! ONNX-based sentence embeddings (all-MiniLM-L6-v2).
//!
//! Requires the `builtin-embeddings` feature.
//!
//! ```text
//! Text → Tokenize → ONNX Inference → Mean Pool → L2 Normalize → Embedding
//! ```
//!
//! Single texts and batches share one inference path: a single text is a
//! batch of one. Batches are padded to their longest member, not to the
//! model's maximum sequence length.
//!
//! Embedding generation is CPU-bound. Call from a blocking context.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::embedding::EmbeddingService;
use crate::error::{DocIndexError, Result};
use crate::types::{Embedding, EMBEDDING_DIMENSION};

const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";
const DEFAULT_MAX_LENGTH: usize = 256;

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// File names expected in each model directory
const MODEL_FILENAME: &str = "model.onnx";
const TOKENIZER_FILENAME: &str = "tokenizer.json";

/// ONNX Runtime embedding service.
///
/// The model and tokenizer are loaded eagerly so a missing model fails at
/// startup, not on the first document.
pub struct OnnxEmbedding {
    /// `Session::run()` needs `&mut self`; the trait hands out `&self`.
    session: Mutex<Session>,

    tokenizer: Tokenizer,

    dimension: usize,

    max_length: usize,
}

/// Token ids and attention mask for a padded batch, row-major.
struct TokenBatch {
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    rows: usize,
    seq_len: usize,
}

impl OnnxEmbedding {
    /// Loads all-MiniLM-L6-v2 (384 dimensions).
    ///
    /// With `model_path = None`, looks in the default cache directory
    /// (`~/.cache/docindex/models/all-MiniLM-L6-v2/`).
    pub fn new(model_path: Option<PathBuf>) -> Result<Self> {
        Self::with_dimension(model_path, EMBEDDING_DIMENSION)
    }

    /// Loads a model producing `dimension`-length vectors.
    ///
    /// Dimensions other than 384 need an explicit `model_path`.
    pub fn with_dimension(model_path: Option<PathBuf>, dimension: usize) -> Result<Self> {
        let model_dir = resolve_model_dir(model_path.as_deref(), dimension)?;

        info!(
            model_dir = %model_dir.display(),
            dimension,
            max_length = DEFAULT_MAX_LENGTH,
            "Loading ONNX embedding model"
        );

        let model_file = model_dir.join(MODEL_FILENAME);
        let tokenizer_file = model_dir.join(TOKENIZER_FILENAME);
        for (file, what) in [(&model_file, "Model"), (&tokenizer_file, "Tokenizer")] {
            if !file.exists() {
                return Err(DocIndexError::config(format!(
                    "{what} file not found: {}",
                    file.display()
                )));
            }
        }

        let session = create_session(&model_file)?;
        let tokenizer = load_tokenizer(&tokenizer_file, DEFAULT_MAX_LENGTH)?;

        debug!(dimension, "ONNX embedding model loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension,
            max_length: DEFAULT_MAX_LENGTH,
        })
    }

    /// Downloads all-MiniLM-L6-v2 into the default cache directory.
    ///
    /// Existing files are kept. Returns the model directory.
    pub fn download_default_model() -> Result<PathBuf> {
        let cache_dir = default_cache_dir(DEFAULT_MODEL_NAME);
        std::fs::create_dir_all(&cache_dir).map_err(|e| {
            DocIndexError::config(format!(
                "Failed to create model cache directory {}: {e}",
                cache_dir.display()
            ))
        })?;

        for (url, name) in [(MODEL_URL, MODEL_FILENAME), (TOKENIZER_URL, TOKENIZER_FILENAME)] {
            let dest = cache_dir.join(name);
            if !dest.exists() {
                info!(url, dest = %dest.display(), "Downloading model file");
                download_file(url, &dest)?;
            }
        }

        info!(dir = %cache_dir.display(), "Model files ready");
        Ok(cache_dir)
    }

    fn tokenize(&self, texts: &[&str]) -> Result<TokenBatch> {
        let encodings = texts
            .iter()
            .map(|t| self.tokenizer.encode(*t, true))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| DocIndexError::encoding(format!("Tokenization failed: {e}")))?;

        let seq_len = encodings
            .iter()
            .map(|enc| enc.get_ids().len().min(self.max_length))
            .max()
            .unwrap_or(0);

        let rows = texts.len();
        let mut input_ids = vec![0i64; rows * seq_len];
        let mut attention_mask = vec![0i64; rows * seq_len];

        for (row, enc) in encodings.iter().enumerate() {
            let ids = enc.get_ids();
            let mask = enc.get_attention_mask();
            let len = ids.len().min(self.max_length);
            for col in 0..len {
                input_ids[row * seq_len + col] = i64::from(ids[col]);
                attention_mask[row * seq_len + col] = i64::from(mask[col]);
            }
        }

        Ok(TokenBatch {
            input_ids,
            attention_mask,
            rows,
            seq_len,
        })
    }

    /// Runs the model over a padded batch and pools one vector per row.
    fn infer(&self, batch: TokenBatch) -> Result<Vec<Embedding>> {
        let shape = (batch.rows, batch.seq_len);
        let tensor = |data: Vec<i64>| -> Result<ort::value::Tensor<i64>> {
            let array = Array2::from_shape_vec(shape, data)
                .map_err(|e| DocIndexError::encoding(format!("Tensor shape error: {e}")))?;
            ort::value::Tensor::from_array(array)
                .map_err(|e| DocIndexError::encoding(format!("Tensor creation failed: {e}")))
        };

        let ids_tensor = tensor(batch.input_ids)?;
        let mask_tensor = tensor(batch.attention_mask.clone())?;
        let type_tensor = tensor(vec![0i64; batch.rows * batch.seq_len])?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| DocIndexError::encoding(format!("Session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            ])
            .map_err(|e| DocIndexError::encoding(format!("ONNX inference failed: {e}")))?;

        // [rows, seq_len, dim]
        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DocIndexError::encoding(format!("Output extraction failed: {e}")))?;

        let row_width = batch.seq_len * self.dimension;
        if data.len() != batch.rows * row_width {
            return Err(DocIndexError::encoding(format!(
                "Model output has {} values, expected {}",
                data.len(),
                batch.rows * row_width
            )));
        }

        let embeddings = (0..batch.rows)
            .map(|row| {
                let mask = &batch.attention_mask[row * batch.seq_len..(row + 1) * batch.seq_len];
                let tokens = &data[row * row_width..(row + 1) * row_width];
                let mut pooled = mean_pool(tokens, mask, self.dimension);
                l2_normalize(&mut pooled);
                pooled
            })
            .collect();

        Ok(embeddings)
    }
}

impl EmbeddingService for OnnxEmbedding {
    fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| DocIndexError::encoding("Model returned no embedding"))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if texts.iter().any(|t| t.is_empty()) {
            return Err(DocIndexError::encoding("Cannot embed empty text"));
        }

        let batch = self.tokenize(texts)?;
        self.infer(batch)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn create_session(model_path: &Path) -> Result<Session> {
    Session::builder()
        .map_err(|e| DocIndexError::config(format!("Failed to create session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| DocIndexError::config(format!("Failed to set optimization level: {e}")))?
        .commit_from_file(model_path)
        .map_err(|e| {
            DocIndexError::config(format!(
                "Failed to load ONNX model from {}: {e}",
                model_path.display()
            ))
        })
}

fn load_tokenizer(tokenizer_path: &Path, max_length: usize) -> Result<Tokenizer> {
    let mut tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
        DocIndexError::config(format!(
            "Failed to load tokenizer from {}: {e}",
            tokenizer_path.display()
        ))
    })?;

    tokenizer
        .with_truncation(Some(tokenizers::TruncationParams {
            max_length,
            strategy: tokenizers::TruncationStrategy::LongestFirst,
            ..Default::default()
        }))
        .map_err(|e| DocIndexError::config(format!("Failed to set truncation: {e}")))?;

    // Padding is done per batch in tokenize()
    tokenizer.with_padding(None);

    Ok(tokenizer)
}

fn resolve_model_dir(model_path: Option<&Path>, dimension: usize) -> Result<PathBuf> {
    match model_path {
        Some(path) if path.exists() => Ok(path.to_path_buf()),
        Some(path) => Err(DocIndexError::config(format!(
            "Model directory not found: {}",
            path.display()
        ))),
        None if dimension != EMBEDDING_DIMENSION => Err(DocIndexError::config(format!(
            "No default model for dimension {dimension}; provide a model_path"
        ))),
        None => {
            let cache_dir = default_cache_dir(DEFAULT_MODEL_NAME);
            if !cache_dir.join(MODEL_FILENAME).exists() {
                return Err(DocIndexError::config(format!(
                    "Model not found at {}. Download with OnnxEmbedding::download_default_model()",
                    cache_dir.display()
                )));
            }
            Ok(cache_dir)
        }
    }
}

/// `~/.cache/docindex/models/{name}/` on Linux, platform equivalent elsewhere.
fn default_cache_dir(model_name: &str) -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("docindex")
        .join("models")
        .join(model_name)
}

/// Attention-weighted mean over `[seq_len, dim]` token embeddings.
fn mean_pool(tokens: &[f32], attention_mask: &[i64], dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dim];
    let mut mask_sum = 0.0f32;

    for (t, &mask) in attention_mask.iter().enumerate() {
        if mask == 0 {
            continue;
        }
        mask_sum += 1.0;
        for (acc, value) in pooled.iter_mut().zip(&tokens[t * dim..(t + 1) * dim]) {
            *acc += value;
        }
    }

    if mask_sum > 0.0 {
        for val in &mut pooled {
            *val /= mask_sum;
        }
    }

    pooled
}

fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn download_file(url: &str, dest: &Path) -> Result<()> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| DocIndexError::config(format!("Download failed for {url}: {e}")))?;

    let mut reader = response.into_body().into_reader();
    let mut file = std::fs::File::create(dest).map_err(|e| {
        DocIndexError::config(format!("Failed to create file {}: {e}", dest.display()))
    })?;

    std::io::copy(&mut reader, &mut file).map_err(|e| {
        DocIndexError::config(format!("Failed to write to {}: {e}", dest.display()))
    })?;

    Ok(())
}
