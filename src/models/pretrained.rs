//! Pretrained weight resolution and checkpoint loading.
//!
//! A [`PretrainedSource`] describes where the backbone's parameters come
//! from: nowhere (keep the initializer-determined values), the default
//! download location (optionally the self-distilled variant), or an
//! explicit local path. URLs, cache directory and network timeout live
//! in an explicit [`PretrainedConfig`] rather than module globals, and
//! the loader never retries on its own.
//!
//! Checkpoints are safetensors files mapping `<block-name>_weights` /
//! `<block-name>_offset` to arrays. Loading verifies that the name sets
//! match exactly and that every shape matches the model before any
//! parameter is assigned.

use crate::core::{ClassifierError, ClassifierResult};
use candle_core::Device;
use candle_nn::VarMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default location of the pretrained GoogLeNet checkpoint.
pub const DEFAULT_WEIGHTS_URL: &str =
    "https://paddle-imagenet-models-name.bj.bcebos.com/dygraph/GoogLeNet_pretrained.safetensors";

/// Default location of the self-distilled ("ssld") checkpoint variant.
pub const DEFAULT_DISTILLED_WEIGHTS_URL: &str =
    "https://paddle-imagenet-models-name.bj.bcebos.com/dygraph/GoogLeNet_ssld_pretrained.safetensors";

/// Where the backbone's parameters come from. Resolved once at model
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PretrainedSource {
    /// Leave parameters at their initializer-determined values.
    Absent,
    /// Fetch the default checkpoint (or its distilled variant), cache it
    /// locally and load it.
    Download {
        /// Use the self-distilled checkpoint variant.
        distilled: bool,
    },
    /// Load directly from a local checkpoint file.
    Path(PathBuf),
}

impl PretrainedSource {
    /// Interprets an untyped configuration value.
    ///
    /// Accepts exactly a boolean (`false` = absent, `true` = fetch the
    /// default URL, the distilled variant if `distilled` is set) or a
    /// string path. Any other value type is a construction-time
    /// configuration error, never deferred to forward-pass time.
    pub fn from_config_value(
        value: &serde_json::Value,
        distilled: bool,
    ) -> ClassifierResult<Self> {
        match value {
            serde_json::Value::Bool(false) => Ok(Self::Absent),
            serde_json::Value::Bool(true) => Ok(Self::Download { distilled }),
            serde_json::Value::String(path) => Ok(Self::Path(PathBuf::from(path))),
            other => Err(ClassifierError::config(format!(
                "pretrained source must be a boolean or a path string, got {other}"
            ))),
        }
    }
}

/// Configuration for pretrained weight fetching.
#[derive(Debug, Clone)]
pub struct PretrainedConfig {
    /// URL of the default checkpoint.
    pub url: String,
    /// URL of the self-distilled checkpoint variant.
    pub distilled_url: String,
    /// Directory downloaded checkpoints are cached in. `None` uses the
    /// user cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Timeout applied to the whole fetch. The fetch is the only
    /// blocking network operation in the crate.
    pub timeout: Duration,
}

impl Default for PretrainedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WEIGHTS_URL.to_string(),
            distilled_url: DEFAULT_DISTILLED_WEIGHTS_URL.to_string(),
            cache_dir: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PretrainedConfig {
    fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("googlenet")
                .join("weights")
        })
    }
}

/// Resolves a [`PretrainedSource`] into populated model parameters.
#[derive(Debug, Clone, Default)]
pub struct PretrainedLoader {
    config: PretrainedConfig,
}

impl PretrainedLoader {
    pub fn new(config: PretrainedConfig) -> Self {
        Self { config }
    }

    /// Populates `varmap` according to `source`.
    ///
    /// An absent source is a no-op: the parameters keep the values the
    /// initializers produced. Download and path sources both end in
    /// [`load_checkpoint`].
    pub fn resolve(
        &self,
        source: &PretrainedSource,
        varmap: &VarMap,
        device: &Device,
    ) -> ClassifierResult<()> {
        match source {
            PretrainedSource::Absent => {
                debug!("no pretrained source, keeping initializer values");
                Ok(())
            }
            PretrainedSource::Download { distilled } => {
                let url = if *distilled {
                    &self.config.distilled_url
                } else {
                    &self.config.url
                };
                let path = self.fetch(url)?;
                load_checkpoint(varmap, &path, device)
            }
            PretrainedSource::Path(path) => load_checkpoint(varmap, path, device),
        }
    }

    /// Downloads `url` into the cache directory, returning the cached
    /// file path. An existing cache entry is reused without touching the
    /// network.
    fn fetch(&self, url: &str) -> ClassifierResult<PathBuf> {
        let file_name = url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ClassifierError::config(format!("weight URL has no file name: {url}")))?;

        let cache_dir = self.config.cache_dir();
        let target = cache_dir.join(file_name);
        if target.exists() {
            debug!(path = %target.display(), "using cached checkpoint");
            return Ok(target);
        }

        std::fs::create_dir_all(&cache_dir)?;
        info!(url, "downloading pretrained checkpoint");

        let agent = ureq::AgentBuilder::new().timeout(self.config.timeout).build();
        let response = agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => {
                ClassifierError::download(url, format!("server returned status {code}"))
            }
            ureq::Error::Transport(t) => ClassifierError::download(url, t.to_string()),
        })?;

        // Write to a sibling temp file first so an interrupted download
        // never poisons the cache.
        let partial = cache_dir.join(format!("{file_name}.partial"));
        let mut file = std::fs::File::create(&partial)?;
        std::io::copy(&mut response.into_reader(), &mut file)?;
        std::fs::rename(&partial, &target)?;

        Ok(target)
    }
}

/// Loads a safetensors checkpoint into `varmap`, verifying an exact
/// name/shape match first.
///
/// # Errors
///
/// `NotFound` if the path does not exist, `Format` if the checkpoint's
/// parameter names do not cover the model exactly or any shape differs.
pub fn load_checkpoint(
    varmap: &VarMap,
    path: &Path,
    device: &Device,
) -> ClassifierResult<()> {
    if !path.exists() {
        return Err(ClassifierError::not_found(
            path.display().to_string(),
            "checkpoint file does not exist",
        ));
    }

    let tensors = candle_core::safetensors::load(path, device).map_err(|e| {
        ClassifierError::format(format!(
            "cannot read checkpoint {}: {e}",
            path.display()
        ))
    })?;

    let data = varmap
        .data()
        .lock()
        .map_err(|_| ClassifierError::config("model parameter map is poisoned"))?;

    let mut missing: Vec<&str> = data
        .keys()
        .filter(|name| !tensors.contains_key(*name))
        .map(String::as_str)
        .collect();
    missing.sort_unstable();
    if !missing.is_empty() {
        return Err(ClassifierError::format(format!(
            "checkpoint is missing parameters: {}",
            missing.join(", ")
        )));
    }

    let mut unexpected: Vec<&str> = tensors
        .keys()
        .filter(|name| !data.contains_key(*name))
        .map(String::as_str)
        .collect();
    unexpected.sort_unstable();
    if !unexpected.is_empty() {
        return Err(ClassifierError::format(format!(
            "checkpoint contains unknown parameters: {}",
            unexpected.join(", ")
        )));
    }

    for (name, var) in data.iter() {
        let tensor = &tensors[name];
        if tensor.dims() != var.dims() {
            return Err(ClassifierError::format(format!(
                "shape mismatch for {name}: checkpoint has {:?}, model expects {:?}",
                tensor.dims(),
                var.dims()
            )));
        }
        var.set(tensor)
            .map_err(|e| ClassifierError::format(format!("cannot assign {name}: {e}")))?;
    }

    info!(path = %path.display(), params = data.len(), "checkpoint loaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GoogLeNet, GoogLeNetConfig};
    use candle_core::{DType, Device, Tensor};
    use candle_nn::VarBuilder;
    use serde_json::json;

    fn build_model(config: &GoogLeNetConfig) -> (VarMap, GoogLeNet) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = GoogLeNet::new(config, vb).unwrap();
        (varmap, model)
    }

    #[test]
    fn source_from_bool_and_string() {
        assert_eq!(
            PretrainedSource::from_config_value(&json!(false), false).unwrap(),
            PretrainedSource::Absent
        );
        assert_eq!(
            PretrainedSource::from_config_value(&json!(true), true).unwrap(),
            PretrainedSource::Download { distilled: true }
        );
        assert_eq!(
            PretrainedSource::from_config_value(&json!("weights/model.safetensors"), false)
                .unwrap(),
            PretrainedSource::Path(PathBuf::from("weights/model.safetensors"))
        );
    }

    #[test]
    fn malformed_source_is_a_construction_error() {
        let err = PretrainedSource::from_config_value(&json!(5), false).unwrap_err();
        assert!(matches!(err, ClassifierError::Config { .. }));
    }

    #[test]
    fn missing_checkpoint_path_is_not_found() {
        let (varmap, _model) = build_model(&GoogLeNetConfig { class_num: 10 });
        let err = load_checkpoint(
            &varmap,
            Path::new("/nonexistent/model.safetensors"),
            &Device::Cpu,
        )
        .unwrap_err();
        assert!(matches!(err, ClassifierError::NotFound { .. }));
    }

    #[test]
    fn roundtrip_reproduces_identical_outputs() {
        let config = GoogLeNetConfig { class_num: 10 };
        let (varmap_a, model_a) = build_model(&config);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        varmap_a.save(&path).unwrap();

        let (varmap_b, model_b) = build_model(&config);
        load_checkpoint(&varmap_b, &path, &Device::Cpu).unwrap();

        let input = Tensor::ones((1, 3, 224, 224), DType::F32, &Device::Cpu).unwrap();
        let (main_a, aux1_a, aux2_a) = model_a.forward(&input, false).unwrap();
        let (main_b, aux1_b, aux2_b) = model_b.forward(&input, false).unwrap();

        assert_eq!(
            main_a.to_vec2::<f32>().unwrap(),
            main_b.to_vec2::<f32>().unwrap()
        );
        assert_eq!(
            aux1_a.to_vec2::<f32>().unwrap(),
            aux1_b.to_vec2::<f32>().unwrap()
        );
        assert_eq!(
            aux2_a.to_vec2::<f32>().unwrap(),
            aux2_b.to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn shape_mismatch_is_a_format_error() {
        let (varmap_small, _model_small) = build_model(&GoogLeNetConfig { class_num: 5 });
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        varmap_small.save(&path).unwrap();

        let (varmap_big, _model_big) = build_model(&GoogLeNetConfig { class_num: 10 });
        let err = load_checkpoint(&varmap_big, &path, &Device::Cpu).unwrap_err();
        assert!(matches!(err, ClassifierError::Format { .. }));
    }

    #[test]
    fn absent_source_keeps_initializer_values() {
        let config = GoogLeNetConfig { class_num: 10 };
        let (varmap, model) = build_model(&config);

        let flat = |var: &candle_core::Var| -> Vec<f32> {
            var.flatten_all().unwrap().to_vec1::<f32>().unwrap()
        };
        let vars = varmap.all_vars();
        let before: Vec<Vec<f32>> = vars.iter().map(flat).collect();
        PretrainedLoader::default()
            .resolve(&PretrainedSource::Absent, &varmap, &Device::Cpu)
            .unwrap();
        let after: Vec<Vec<f32>> = vars.iter().map(flat).collect();
        assert_eq!(before, after);

        // The model stays usable with its random initialization.
        let input = Tensor::ones((1, 3, 224, 224), DType::F32, &Device::Cpu).unwrap();
        let (main, _, _) = model.forward(&input, false).unwrap();
        assert_eq!(main.dims(), &[1, 10]);
    }
}
