//! Graph execution and the end-to-end image classifier.
//!
//! [`Predictor`] wraps a loaded, frozen network behind a named-tensor
//! interface: feed one named input, get the named outputs back in the
//! graph's declared fetch order. [`ImageClassifier`] composes the
//! preprocessing pipeline, the predictor, softmax over the main head and
//! top-k extraction into a single entry point.

use crate::core::{ClassifierError, ClassifierResult, Tensor4D};
use crate::models::{
    GoogLeNet, GoogLeNetConfig, PretrainedConfig, PretrainedLoader, PretrainedSource,
};
use crate::processors::{PreprocessConfig, PreprocessPipeline, Topk};
use candle_core::{Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use image::DynamicImage;
use std::path::Path;
use tracing::debug;

/// Name of the graph's input tensor.
pub const INPUT_NAME: &str = "image";
/// Name of the main classifier's logits.
pub const MAIN_LOGITS: &str = "out";
/// Name of the first auxiliary head's logits.
pub const AUX1_LOGITS: &str = "out1";
/// Name of the second auxiliary head's logits.
pub const AUX2_LOGITS: &str = "out2";

/// Executes a frozen network through named input/output tensors.
///
/// Parameters are read-only after loading, so a shared `Predictor` can
/// serve multiple threads; each call uses only its own input tensor and
/// transient activations.
#[derive(Debug)]
pub struct Predictor {
    model: GoogLeNet,
    device: Device,
    input_name: String,
    fetch_names: Vec<String>,
}

impl Predictor {
    pub fn new(model: GoogLeNet, device: Device) -> Self {
        Self {
            model,
            device,
            input_name: INPUT_NAME.to_string(),
            fetch_names: vec![
                MAIN_LOGITS.to_string(),
                AUX1_LOGITS.to_string(),
                AUX2_LOGITS.to_string(),
            ],
        }
    }

    /// The declared input tensor name.
    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    /// The declared output names, in fetch order.
    pub fn fetch_names(&self) -> &[String] {
        &self.fetch_names
    }

    /// Number of classes each output head predicts over.
    pub fn class_num(&self) -> usize {
        self.model.class_num()
    }

    fn to_device_tensor(&self, input: &Tensor4D) -> ClassifierResult<Tensor> {
        let dims = input.dim();
        let data: Vec<f32> = match input.as_slice() {
            Some(slice) => slice.to_vec(),
            None => input.iter().copied().collect(),
        };
        Tensor::from_vec(data, (dims.0, dims.1, dims.2, dims.3), &self.device)
            .map_err(|e| ClassifierError::tensor_op("move input batch to device", e))
    }

    /// Executes the graph once for the named input tensor and returns
    /// all declared outputs in fetch order.
    ///
    /// # Errors
    ///
    /// Returns `ClassifierError::Execution` if `input_name` is not the
    /// graph's declared input.
    pub fn run(&self, input_name: &str, input: &Tensor4D) -> ClassifierResult<Vec<(String, Tensor)>> {
        if input_name != self.input_name {
            return Err(ClassifierError::execution(format!(
                "unknown input tensor '{input_name}', the graph declares '{}'",
                self.input_name
            )));
        }

        let x = self.to_device_tensor(input)?;
        let (main, aux1, aux2) = self.model.forward(&x, false)?;
        debug!(batch = input.dim().0, "forward pass complete");

        Ok(self
            .fetch_names
            .iter()
            .cloned()
            .zip([main, aux1, aux2])
            .collect())
    }

    /// Executes the graph and returns only the requested outputs, still
    /// in the graph's declared fetch order.
    ///
    /// # Errors
    ///
    /// Returns `ClassifierError::Execution` if any requested name is not
    /// declared by the graph.
    pub fn run_fetch(
        &self,
        input_name: &str,
        input: &Tensor4D,
        fetch: &[&str],
    ) -> ClassifierResult<Vec<(String, Tensor)>> {
        for name in fetch {
            if !self.fetch_names.iter().any(|f| f == name) {
                return Err(ClassifierError::execution(format!(
                    "unknown output tensor '{name}', the graph declares [{}]",
                    self.fetch_names.join(", ")
                )));
            }
        }

        let outputs = self.run(input_name, input)?;
        Ok(outputs
            .into_iter()
            .filter(|(name, _)| fetch.iter().any(|f| f == name))
            .collect())
    }
}

/// One ranked prediction: a class index and its probability.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Class index into the score vector.
    pub class_id: usize,
    /// Probability in `[0, 1]`.
    pub score: f32,
    /// Class label, if a label mapping was configured.
    pub label: Option<String>,
}

/// End-to-end classifier: preprocess, predict, softmax, top-k.
#[derive(Debug)]
pub struct ImageClassifier {
    pipeline: PreprocessPipeline,
    predictor: Predictor,
    topk: Topk,
    k: usize,
}

impl ImageClassifier {
    pub fn builder() -> ImageClassifierBuilder {
        ImageClassifierBuilder::new()
    }

    /// The wrapped predictor.
    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    /// Classifies a single decoded image.
    pub fn classify_image(&self, img: &DynamicImage) -> ClassifierResult<Vec<Prediction>> {
        let batch = self.pipeline.process_image(img)?;
        let mut ranked = self.rank(&batch)?;
        Ok(ranked.swap_remove(0))
    }

    /// Classifies raw image bytes.
    pub fn classify_bytes(&self, bytes: &[u8]) -> ClassifierResult<Vec<Prediction>> {
        let batch = self.pipeline.process_bytes(bytes)?;
        let mut ranked = self.rank(&batch)?;
        Ok(ranked.swap_remove(0))
    }

    /// Loads and classifies an image file.
    pub fn classify_path(&self, path: &Path) -> ClassifierResult<Vec<Prediction>> {
        let img = crate::utils::load_image(path)?;
        self.classify_image(&img)
    }

    /// Classifies several images with one batched forward pass.
    pub fn classify_batch(&self, imgs: &[DynamicImage]) -> ClassifierResult<Vec<Vec<Prediction>>> {
        let batch = self.pipeline.process_batch(imgs)?;
        self.rank(&batch)
    }

    fn rank(&self, batch: &Tensor4D) -> ClassifierResult<Vec<Vec<Prediction>>> {
        let outputs = self
            .predictor
            .run_fetch(INPUT_NAME, batch, &[MAIN_LOGITS])?;
        let (_, logits) = &outputs[0];

        let probabilities = candle_nn::ops::softmax(logits, D::Minus1)
            .map_err(|e| ClassifierError::post_processing("softmax over main logits", e))?
            .to_vec2::<f32>()
            .map_err(|e| ClassifierError::post_processing("read probabilities", e))?;

        let result = self.topk.process(&probabilities, self.k)?;
        let with_labels = self.topk.has_class_names();

        Ok(result
            .indexes
            .into_iter()
            .zip(result.scores)
            .enumerate()
            .map(|(row, (ids, scores))| {
                ids.into_iter()
                    .zip(scores)
                    .enumerate()
                    .map(|(rank, (class_id, score))| Prediction {
                        class_id,
                        score,
                        label: if with_labels {
                            result
                                .class_names
                                .as_ref()
                                .map(|names| names[row][rank].clone())
                        } else {
                            None
                        },
                    })
                    .collect()
            })
            .collect())
    }
}

/// Builder for [`ImageClassifier`].
#[derive(Debug)]
pub struct ImageClassifierBuilder {
    model_config: GoogLeNetConfig,
    preprocess_config: PreprocessConfig,
    pretrained: PretrainedSource,
    pretrained_config: PretrainedConfig,
    device: Device,
    k: usize,
    class_names: Option<Vec<String>>,
}

impl ImageClassifierBuilder {
    pub fn new() -> Self {
        Self {
            model_config: GoogLeNetConfig::default(),
            preprocess_config: PreprocessConfig::default(),
            pretrained: PretrainedSource::Absent,
            pretrained_config: PretrainedConfig::default(),
            device: Device::Cpu,
            k: 5,
            class_names: None,
        }
    }

    /// Sets the number of output classes.
    pub fn class_num(mut self, class_num: usize) -> Self {
        self.model_config.class_num = class_num;
        self
    }

    /// Sets how many ranked predictions to return per image.
    pub fn topk(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Sets the compute device.
    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Sets where pretrained weights come from.
    pub fn pretrained(mut self, source: PretrainedSource) -> Self {
        self.pretrained = source;
        self
    }

    /// Overrides download URLs, cache directory or timeout.
    pub fn pretrained_config(mut self, config: PretrainedConfig) -> Self {
        self.pretrained_config = config;
        self
    }

    /// Overrides the preprocessing configuration.
    pub fn preprocess_config(mut self, config: PreprocessConfig) -> Self {
        self.preprocess_config = config;
        self
    }

    /// Provides class labels, indexed by class id.
    pub fn class_names(mut self, names: Vec<String>) -> Self {
        self.class_names = Some(names);
        self
    }

    /// Builds the classifier: constructs the backbone, resolves the
    /// pretrained source, and wires preprocessing and top-k.
    ///
    /// # Errors
    ///
    /// Construction-time errors (bad configuration, checkpoint
    /// resolution failures) are returned immediately; no partially
    /// initialized classifier is produced.
    pub fn build(self) -> ClassifierResult<ImageClassifier> {
        if self.k == 0 {
            return Err(ClassifierError::config("topk must be greater than 0"));
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, candle_core::DType::F32, &self.device);
        let model = GoogLeNet::new(&self.model_config, vb)?;

        PretrainedLoader::new(self.pretrained_config).resolve(
            &self.pretrained,
            &varmap,
            &self.device,
        )?;

        let topk = match self.class_names {
            Some(names) => Topk::from_class_names(names),
            None => Topk::default(),
        };

        Ok(ImageClassifier {
            pipeline: PreprocessPipeline::new(&self.preprocess_config)?,
            predictor: Predictor::new(model, self.device),
            topk,
            k: self.k,
        })
    }
}

impl Default for ImageClassifierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn small_classifier(k: usize) -> ImageClassifier {
        ImageClassifier::builder()
            .class_num(8)
            .topk(k)
            .build()
            .unwrap()
    }

    #[test]
    fn unknown_input_name_is_an_execution_error() {
        let classifier = small_classifier(3);
        let batch = Tensor4D::zeros((1, 3, 224, 224));
        let err = classifier
            .predictor()
            .run("pixels", &batch)
            .unwrap_err();
        assert!(matches!(err, ClassifierError::Execution { .. }));
    }

    #[test]
    fn unknown_fetch_name_is_an_execution_error() {
        let classifier = small_classifier(3);
        let batch = Tensor4D::zeros((1, 3, 224, 224));
        let err = classifier
            .predictor()
            .run_fetch(INPUT_NAME, &batch, &["out3"])
            .unwrap_err();
        assert!(matches!(err, ClassifierError::Execution { .. }));
    }

    #[test]
    fn run_returns_all_heads_in_fetch_order() {
        let classifier = small_classifier(3);
        let batch = Tensor4D::zeros((1, 3, 224, 224));
        let outputs = classifier.predictor().run(INPUT_NAME, &batch).unwrap();
        let names: Vec<&str> = outputs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec![MAIN_LOGITS, AUX1_LOGITS, AUX2_LOGITS]);
        for (_, logits) in &outputs {
            assert_eq!(logits.dims(), &[1, 8]);
        }
    }

    #[test]
    fn classify_returns_ranked_probabilities() {
        let classifier = small_classifier(3);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            300,
            280,
            image::Rgb([120, 90, 200]),
        ));
        let predictions = classifier.classify_image(&img).unwrap();

        assert_eq!(predictions.len(), 3);
        for pair in predictions.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for p in &predictions {
            assert!(p.score >= 0.0 && p.score <= 1.0);
            assert!(p.label.is_none());
        }
    }

    #[test]
    fn zero_topk_is_a_construction_error() {
        let err = ImageClassifier::builder()
            .class_num(8)
            .topk(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ClassifierError::Config { .. }));
    }
}
