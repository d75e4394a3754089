//! The vision-language embedding model.
//!
//! Picta treats `encode_image`/`encode_text` as a shared embedding space
//! owned by an external collaborator — the caller supplies image bytes
//! already decoded by whatever vision model it wants, and this module
//! only has to guarantee the two encode paths land in the same unit-norm
//! space of the configured dimension. The text side is fully implemented
//! here with a pure-Rust sentence encoder (`all-MiniLM-L6-v2` via
//! `candle` + `hf-hub`), matching the model the rest of the corpus's
//! semantic memory already uses. Image encoding is declared as a trait
//! method with no default implementation: production deployments plug
//! in their own CLIP-family model behind it.

use crate::error::{CoreError, CoreResult};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;
use tracing::info;

/// The shared embedding contract used by the indexer and search engine.
///
/// Implementors must guarantee `encode_image` and `encode_text` project
/// into the same unit-norm vector space of `dimension()` floats.
pub trait Embedder: Send + Sync {
    /// Embed already-decoded image bytes. Errors surface as
    /// `ModelUnavailable`, which is fatal for semantic search branches.
    fn encode_image(&self, bytes: &[u8]) -> CoreResult<Vec<f32>>;

    /// Embed free text into the same vector space.
    fn encode_text(&self, text: &str) -> CoreResult<Vec<f32>>;

    /// The fixed dimension `D` this embedder produces.
    fn dimension(&self) -> usize;
}

/// Text-side embedder built on a BERT-family sentence encoder. Image
/// encoding is intentionally unimplemented here; wrap a vision model
/// behind [`Embedder::encode_image`] in the caller's own type, or compose
/// one with [`TextEmbedder::encode_text`] via a shared tokenizer/model
/// pair if the two share an architecture.
pub struct TextEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
}

impl TextEmbedder {
    /// Download (or reuse the Hugging Face Hub cache for) `model_id` and
    /// load it onto CPU.
    pub fn load(model_id: &str) -> CoreResult<Self> {
        let device = Device::Cpu;
        let revision = "main";

        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, revision.to_string());
        let api = Api::new().map_err(|e| CoreError::ModelUnavailable(e.to_string()))?;
        let api_repo = api.repo(repo);

        let config_filename = api_repo
            .get("config.json")
            .map_err(|e| CoreError::ModelUnavailable(e.to_string()))?;
        let tokenizer_filename = api_repo
            .get("tokenizer.json")
            .map_err(|e| CoreError::ModelUnavailable(e.to_string()))?;
        let weights_filename = api_repo
            .get("model.safetensors")
            .map_err(|e| CoreError::ModelUnavailable(e.to_string()))?;

        let config = std::fs::read_to_string(config_filename)
            .map_err(|e| CoreError::ModelUnavailable(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&config).map_err(|e| CoreError::ModelUnavailable(e.to_string()))?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| CoreError::ModelUnavailable(e.to_string()))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)
                .map_err(|e| CoreError::ModelUnavailable(e.to_string()))?
        };
        let model = BertModel::load(vb, &config).map_err(|e| CoreError::ModelUnavailable(e.to_string()))?;

        info!(model_id, "text embedder loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            dim: config.hidden_size,
        })
    }

    fn mean_pooling(&self, embeddings: &Tensor, attention_mask: &[u32]) -> CoreResult<Tensor> {
        let map_err = |e: candle_core::Error| CoreError::ModelUnavailable(e.to_string());

        let mask = Tensor::new(attention_mask, &self.device)
            .map_err(map_err)?
            .to_dtype(DType::F32)
            .map_err(map_err)?
            .unsqueeze(0)
            .map_err(map_err)?
            .unsqueeze(2)
            .map_err(map_err)?;

        let masked = embeddings.broadcast_mul(&mask).map_err(map_err)?;
        let sum = masked.sum(1).map_err(map_err)?;
        let count = mask.sum(1).map_err(map_err)?.clamp(1f32, f32::INFINITY).map_err(map_err)?;
        let mean = sum.broadcast_div(&count).map_err(map_err)?;
        mean.squeeze(0).map_err(map_err)
    }

    fn l2_normalize(&self, tensor: &Tensor) -> CoreResult<Tensor> {
        let map_err = |e: candle_core::Error| CoreError::ModelUnavailable(e.to_string());
        let norm = tensor.sqr().map_err(map_err)?.sum_all().map_err(map_err)?.sqrt().map_err(map_err)?;
        tensor.broadcast_div(&norm).map_err(map_err)
    }
}

impl Embedder for TextEmbedder {
    fn encode_image(&self, _bytes: &[u8]) -> CoreResult<Vec<f32>> {
        Err(CoreError::ModelUnavailable(
            "image encoding requires a vision-language model; none is wired into TextEmbedder"
                .to_string(),
        ))
    }

    fn encode_text(&self, text: &str) -> CoreResult<Vec<f32>> {
        let map_err = |e: candle_core::Error| CoreError::ModelUnavailable(e.to_string());

        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| CoreError::ModelUnavailable(e.to_string()))?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device).map_err(map_err)?.unsqueeze(0).map_err(map_err)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)
            .map_err(map_err)?
            .unsqueeze(0)
            .map_err(map_err)?;

        let output = self
            .model
            .forward(&token_ids, &token_type_ids, None)
            .map_err(map_err)?;

        let pooled = self.mean_pooling(&output, tokens.get_attention_mask())?;
        let normalized = self.l2_normalize(&pooled)?;

        normalized.to_vec1::<f32>().map_err(map_err)
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
