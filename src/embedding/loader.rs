use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use hf_hub::api::sync::Api as HfApi;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Location of the files needed to run a BERT model
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub vocab: PathBuf,
    pub weights: PathBuf,
}

impl ModelFiles {
    /// `model` is either a local directory or a hugging face hub identifier
    pub fn resolve(model: &str) -> Result<ModelFiles> {
        let dir = Path::new(model);
        if dir.is_dir() {
            ModelFiles::from_dir(dir)
        } else {
            ModelFiles::from_hub(model)
        }
    }

    pub fn from_dir(dir: &Path) -> Result<ModelFiles> {
        let existing = |name: &str| {
            let path = dir.join(name);
            path.is_file().then_some(path)
        };
        let weights = existing("model.safetensors")
            .or_else(|| existing("pytorch_model.bin"))
            .ok_or_else(|| {
                anyhow!(
                    "Model weights not found in {:?}. Expected `model.safetensors` or `pytorch_model.bin`",
                    dir
                )
            })?;
        Ok(ModelFiles {
            config: existing("config.json")
                .ok_or_else(|| anyhow!("No config.json in {:?}", dir))?,
            vocab: existing("vocab.txt").ok_or_else(|| anyhow!("No vocab.txt in {:?}", dir))?,
            weights,
        })
    }

    pub fn from_hub(repo_id: &str) -> Result<ModelFiles> {
        info!("Fetching {} from the hugging face hub", repo_id);
        let api = HfApi::new()?;
        let repo = api.model(repo_id.to_string());

        let weights = match repo.get("model.safetensors") {
            Ok(safetensors) => safetensors,
            Err(_) => repo.get("pytorch_model.bin").with_context(|| {
                format!(
                    "Model weights not found in {}. Expected `model.safetensors` or `pytorch_model.bin`",
                    repo_id
                )
            })?,
        };
        Ok(ModelFiles {
            config: repo
                .get("config.json")
                .with_context(|| format!("No config.json in {}", repo_id))?,
            vocab: repo
                .get("vocab.txt")
                .with_context(|| format!("No vocab.txt in {}", repo_id))?,
            weights,
        })
    }

    pub fn var_builder(&self, device: &Device) -> Result<VarBuilder<'static>> {
        let vb = match self.weights.extension().and_then(|ext| ext.to_str()) {
            Some("safetensors") => unsafe {
                VarBuilder::from_mmaped_safetensors(&[&self.weights], DType::F32, device)?
            },
            Some("bin") => VarBuilder::from_pth(&self.weights, DType::F32, device)?,
            _ => anyhow::bail!("Unsupported weight file format: {:?}", self.weights),
        };
        Ok(vb)
    }
}

/// Select the GPU `index` if possible, otherwise run on CPU.
pub fn load_device(index: Option<usize>) -> Device {
    match index {
        None => Device::Cpu,
        Some(i) => match Device::new_cuda(i) {
            Ok(device) => device,
            Err(e) => {
                warn!("GPU {} is not available ({}), running on CPU", i, e);
                Device::Cpu
            }
        },
    }
}
