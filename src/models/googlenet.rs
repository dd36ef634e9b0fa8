//! GoogLeNet (Inception v1) backbone.
//!
//! A multi-head Inception-style convolutional network: stem convolutions,
//! nine inception modules across three depth stages, and three
//! classification heads (main plus two auxiliary heads taken from
//! intermediate activations). Parameter names follow the checkpoint
//! convention `<block-name>_weights` / `<block-name>_offset`, so trained
//! checkpoints are keyed to the exact block names and branch
//! concatenation order used here.

use crate::core::{ClassifierError, ClassifierResult};
use candle_core::{Tensor, D};
use candle_nn::{Conv2d, Conv2dConfig, Init, Linear, Module, VarBuilder};

fn op(context: &'static str) -> impl FnOnce(candle_core::Error) -> ClassifierError {
    move |e| ClassifierError::tensor_op(context, e)
}

/// A convolution with fixed padding policy and no bias term.
///
/// Padding is `(kernel - 1) / 2`, so stride-1 convolutions preserve the
/// spatial size. Activation is applied by the caller, not internally.
/// The weight is registered as `<name>_weights` and initialized from a
/// bounded uniform distribution scaled by fan-in and kernel area.
#[derive(Debug, Clone)]
pub struct ConvBlock {
    conv: Conv2d,
}

impl ConvBlock {
    /// Builds a convolution block.
    ///
    /// # Errors
    ///
    /// Returns `ClassifierError::Config` if `in_channels` is not
    /// divisible by `groups`.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        name: &str,
        vb: VarBuilder,
    ) -> ClassifierResult<Self> {
        if groups == 0 || in_channels % groups != 0 {
            return Err(ClassifierError::config(format!(
                "{name}: input channels ({in_channels}) must be divisible by groups ({groups})"
            )));
        }

        let stdv = (3.0 / (kernel * kernel * in_channels) as f64).sqrt();
        let weight = vb
            .get_with_hints(
                (out_channels, in_channels / groups, kernel, kernel),
                &format!("{name}_weights"),
                Init::Uniform {
                    lo: -stdv,
                    up: stdv,
                },
            )
            .map_err(|e| ClassifierError::tensor_op("create conv weight", e))?;

        let cfg = Conv2dConfig {
            padding: (kernel - 1) / 2,
            stride,
            dilation: 1,
            groups,
            cudnn_fwd_algo: None,
        };
        Ok(Self {
            conv: Conv2d::new(weight, None, cfg),
        })
    }

    /// Convenience constructor for a stride-1, ungrouped convolution.
    pub fn unit(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        name: &str,
        vb: VarBuilder,
    ) -> ClassifierResult<Self> {
        Self::new(in_channels, out_channels, kernel, 1, 1, name, vb)
    }

    pub fn forward(&self, x: &Tensor) -> ClassifierResult<Tensor> {
        self.conv.forward(x).map_err(op("convolution"))
    }
}

/// The six branch widths (plus input channel count) that fully determine
/// one inception module's parameter shapes. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InceptionConfig {
    /// Channels entering the module.
    pub input_channels: usize,
    /// Width of the 1x1 branch.
    pub filter1: usize,
    /// Reduction width ahead of the 3x3 convolution.
    pub filter3_reduce: usize,
    /// Width of the 3x3 branch.
    pub filter3: usize,
    /// Reduction width ahead of the 5x5 convolution.
    pub filter5_reduce: usize,
    /// Width of the 5x5 branch.
    pub filter5: usize,
    /// Width of the pooled projection branch.
    pub proj: usize,
}

impl InceptionConfig {
    /// Channel count after concatenating the four branches.
    pub fn output_channels(&self) -> usize {
        self.filter1 + self.filter3 + self.filter5 + self.proj
    }
}

/// Spatial-size-preserving 3x3 stride-1 max pool.
///
/// candle's pooling has no padding parameter; replicating the border
/// first gives the same result as a padded max pool for a 3x3 stride-1
/// window, since the replicated value is always present in the clipped
/// window too.
fn max_pool_3x3_pad1(x: &Tensor) -> candle_core::Result<Tensor> {
    x.pad_with_same(2, 1, 1)?
        .pad_with_same(3, 1, 1)?
        .max_pool2d_with_stride((3, 3), (1, 1))
}

/// One inception module: four parallel branches over the same input,
/// concatenated along the channel axis.
///
/// The concatenation order {1x1, 3x3, 5x5, projection} is part of the
/// public contract because trained weights are keyed to it. A ReLU is
/// applied to the concatenated tensor before returning.
#[derive(Debug, Clone)]
pub struct Inception {
    conv1: ConvBlock,
    conv3_reduce: ConvBlock,
    conv3: ConvBlock,
    conv5_reduce: ConvBlock,
    conv5: ConvBlock,
    conv_proj: ConvBlock,
}

impl Inception {
    pub fn new(config: InceptionConfig, name: &str, vb: VarBuilder) -> ClassifierResult<Self> {
        let c = config.input_channels;
        Ok(Self {
            conv1: ConvBlock::unit(
                c,
                config.filter1,
                1,
                &format!("inception_{name}_1x1"),
                vb.clone(),
            )?,
            conv3_reduce: ConvBlock::unit(
                c,
                config.filter3_reduce,
                1,
                &format!("inception_{name}_3x3_reduce"),
                vb.clone(),
            )?,
            conv3: ConvBlock::unit(
                config.filter3_reduce,
                config.filter3,
                3,
                &format!("inception_{name}_3x3"),
                vb.clone(),
            )?,
            conv5_reduce: ConvBlock::unit(
                c,
                config.filter5_reduce,
                1,
                &format!("inception_{name}_5x5_reduce"),
                vb.clone(),
            )?,
            conv5: ConvBlock::unit(
                config.filter5_reduce,
                config.filter5,
                5,
                &format!("inception_{name}_5x5"),
                vb.clone(),
            )?,
            conv_proj: ConvBlock::unit(
                c,
                config.proj,
                1,
                &format!("inception_{name}_3x3_proj"),
                vb,
            )?,
        })
    }

    pub fn forward(&self, x: &Tensor) -> ClassifierResult<Tensor> {
        let b1 = self.conv1.forward(x)?;

        let b3 = self.conv3.forward(&self.conv3_reduce.forward(x)?)?;

        let b5 = self.conv5.forward(&self.conv5_reduce.forward(x)?)?;

        let pooled = max_pool_3x3_pad1(x).map_err(op("inception pool branch"))?;
        let proj = self.conv_proj.forward(&pooled)?;

        Tensor::cat(&[&b1, &b3, &b5, &proj], 1)
            .map_err(op("inception concat"))?
            .relu()
            .map_err(op("inception relu"))
    }
}

/// Dropout with downscale-in-infer semantics.
///
/// Inference scales the kept activations by `(1 - p)`; training masks
/// without rescaling. Checkpoints trained under this convention would
/// change outputs if the usual upscale-in-train behavior were used
/// instead.
#[derive(Debug, Clone, Copy)]
pub struct Dropout {
    p: f32,
}

impl Dropout {
    pub fn new(p: f32) -> Self {
        Self { p }
    }

    pub fn forward(&self, x: &Tensor, train: bool) -> ClassifierResult<Tensor> {
        if train {
            let mask = x
                .rand_like(0.0, 1.0)
                .map_err(op("dropout rand"))?
                .ge(self.p)
                .map_err(op("dropout mask"))?
                .to_dtype(x.dtype())
                .map_err(op("dropout mask dtype"))?;
            x.mul(&mask).map_err(op("dropout apply"))
        } else {
            x.affine((1.0 - self.p) as f64, 0.0).map_err(op("dropout scale"))
        }
    }
}

/// Configuration for the GoogLeNet backbone.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GoogLeNetConfig {
    /// Number of output classes for all three heads.
    pub class_num: usize,
}

impl Default for GoogLeNetConfig {
    fn default() -> Self {
        Self { class_num: 1000 }
    }
}

/// Builds a fully connected layer with the checkpoint naming convention
/// (`<name>_weights`, `<name>_offset`) and bounded-uniform weight init
/// scaled by the given fan.
fn fc(
    in_dim: usize,
    out_dim: usize,
    fan: usize,
    name: &str,
    vb: &VarBuilder,
) -> ClassifierResult<Linear> {
    let stdv = (3.0 / fan as f64).sqrt();
    let weight = vb
        .get_with_hints(
            (out_dim, in_dim),
            &format!("{name}_weights"),
            Init::Uniform {
                lo: -stdv,
                up: stdv,
            },
        )
        .map_err(|e| ClassifierError::tensor_op("create fc weight", e))?;
    let bias = vb
        .get_with_hints(out_dim, &format!("{name}_offset"), Init::Const(0.0))
        .map_err(|e| ClassifierError::tensor_op("create fc bias", e))?;
    Ok(Linear::new(weight, Some(bias)))
}

/// The GoogLeNet backbone with its three classification heads.
///
/// The forward pass always returns the 3-tuple
/// `(main_logits, aux1_logits, aux2_logits)`; inference callers use only
/// the main logits. Parameters are immutable after construction/load, so
/// a shared instance is safe to use from multiple threads.
#[derive(Debug, Clone)]
pub struct GoogLeNet {
    conv1: ConvBlock,
    conv2_1x1: ConvBlock,
    conv2_3x3: ConvBlock,

    ince3a: Inception,
    ince3b: Inception,
    ince4a: Inception,
    ince4b: Inception,
    ince4c: Inception,
    ince4d: Inception,
    ince4e: Inception,
    ince5a: Inception,
    ince5b: Inception,

    drop: Dropout,
    fc_out: Linear,

    conv_o1: ConvBlock,
    fc_o1: Linear,
    drop_o1: Dropout,
    out1: Linear,

    conv_o2: ConvBlock,
    fc_o2: Linear,
    drop_o2: Dropout,
    out2: Linear,

    class_num: usize,
}

/// The nine inception configurations, in network order. The widths are
/// the published Inception v1 table; trained checkpoints depend on them.
const INCEPTION_TABLE: [(&str, InceptionConfig); 9] = [
    ("3a", icfg(192, 64, 96, 128, 16, 32, 32)),
    ("3b", icfg(256, 128, 128, 192, 32, 96, 64)),
    ("4a", icfg(480, 192, 96, 208, 16, 48, 64)),
    ("4b", icfg(512, 160, 112, 224, 24, 64, 64)),
    ("4c", icfg(512, 128, 128, 256, 24, 64, 64)),
    ("4d", icfg(512, 112, 144, 288, 32, 64, 64)),
    ("4e", icfg(528, 256, 160, 320, 32, 128, 128)),
    ("5a", icfg(832, 256, 160, 320, 32, 128, 128)),
    ("5b", icfg(832, 384, 192, 384, 48, 128, 128)),
];

const fn icfg(
    input_channels: usize,
    filter1: usize,
    filter3_reduce: usize,
    filter3: usize,
    filter5_reduce: usize,
    filter5: usize,
    proj: usize,
) -> InceptionConfig {
    InceptionConfig {
        input_channels,
        filter1,
        filter3_reduce,
        filter3,
        filter5_reduce,
        filter5,
        proj,
    }
}

impl GoogLeNet {
    pub fn new(config: &GoogLeNetConfig, vb: VarBuilder) -> ClassifierResult<Self> {
        let ince = |idx: usize| -> ClassifierResult<Inception> {
            let (name, cfg) = INCEPTION_TABLE[idx];
            Inception::new(cfg, name, vb.clone())
        };

        Ok(Self {
            conv1: ConvBlock::new(3, 64, 7, 2, 1, "conv1", vb.clone())?,
            conv2_1x1: ConvBlock::unit(64, 64, 1, "conv2_1x1", vb.clone())?,
            conv2_3x3: ConvBlock::unit(64, 192, 3, "conv2_3x3", vb.clone())?,

            ince3a: ince(0)?,
            ince3b: ince(1)?,
            ince4a: ince(2)?,
            ince4b: ince(3)?,
            ince4c: ince(4)?,
            ince4d: ince(5)?,
            ince4e: ince(6)?,
            ince5a: ince(7)?,
            ince5b: ince(8)?,

            drop: Dropout::new(0.4),
            fc_out: fc(1024, config.class_num, 1024, "out", &vb)?,

            conv_o1: ConvBlock::unit(512, 128, 1, "conv_o1", vb.clone())?,
            fc_o1: fc(1152, 1024, 2048, "fc_o1", &vb)?,
            drop_o1: Dropout::new(0.7),
            out1: fc(1024, config.class_num, 1024, "out1", &vb)?,

            conv_o2: ConvBlock::unit(528, 128, 1, "conv_o2", vb.clone())?,
            fc_o2: fc(1152, 1024, 2048, "fc_o2", &vb)?,
            drop_o2: Dropout::new(0.7),
            out2: fc(1024, config.class_num, 1024, "out2", &vb)?,

            class_num: config.class_num,
        })
    }

    /// Number of classes each head predicts over.
    pub fn class_num(&self) -> usize {
        self.class_num
    }

    fn stage_pool(x: &Tensor) -> candle_core::Result<Tensor> {
        x.max_pool2d_with_stride((3, 3), (2, 2))
    }

    /// Runs the full forward pass.
    ///
    /// `x` is an NCHW tensor; for the standard 224x224 input the
    /// auxiliary heads see 13x13 activations and pool them to 3x3, the
    /// size their fully connected layers are built for. Returns
    /// `(main_logits, aux1_logits, aux2_logits)` regardless of mode;
    /// `train` only changes dropout behavior.
    pub fn forward(&self, x: &Tensor, train: bool) -> ClassifierResult<(Tensor, Tensor, Tensor)> {
        let x = self.conv1.forward(x)?;
        let x = Self::stage_pool(&x).map_err(op("stem pool"))?;
        let x = self.conv2_1x1.forward(&x)?;
        let x = self.conv2_3x3.forward(&x)?;
        let x = Self::stage_pool(&x).map_err(op("stage 2 pool"))?;

        let x = self.ince3a.forward(&x)?;
        let x = self.ince3b.forward(&x)?;
        let x = Self::stage_pool(&x).map_err(op("stage 3 pool"))?;

        // Two tap points feed the auxiliary heads.
        let tap4a = self.ince4a.forward(&x)?;
        let x = self.ince4b.forward(&tap4a)?;
        let x = self.ince4c.forward(&x)?;
        let tap4d = self.ince4d.forward(&x)?;
        let x = self.ince4e.forward(&tap4d)?;
        let x = Self::stage_pool(&x).map_err(op("stage 4 pool"))?;

        let x = self.ince5a.forward(&x)?;
        let x = self.ince5b.forward(&x)?;

        // Main head: global average pool, dropout, linear.
        let x = x
            .mean(D::Minus1)
            .and_then(|t| t.mean(D::Minus1))
            .map_err(op("global average pool"))?;
        let x = self.drop.forward(&x, train)?;
        let main = self.fc_out.forward(&x).map_err(op("main head fc"))?;

        let aux1 = self.aux_head1(&tap4a, train)?;
        let aux2 = self.aux_head2(&tap4d, train)?;

        Ok((main, aux1, aux2))
    }

    fn aux_pool(x: &Tensor) -> candle_core::Result<Tensor> {
        x.avg_pool2d_with_stride((5, 5), (3, 3))
    }

    fn aux_head1(&self, tap: &Tensor, train: bool) -> ClassifierResult<Tensor> {
        let x = Self::aux_pool(tap).map_err(op("aux1 pool"))?;
        let x = self.conv_o1.forward(&x)?;
        let x = x.flatten_from(1).map_err(op("aux1 flatten"))?;
        let x = self.fc_o1.forward(&x).map_err(op("aux1 fc"))?;
        let x = x.relu().map_err(op("aux1 relu"))?;
        let x = self.drop_o1.forward(&x, train)?;
        self.out1.forward(&x).map_err(op("aux1 out"))
    }

    // Unlike head 1, there is no activation before the final dropout.
    // This asymmetry is preserved from the trained checkpoints.
    fn aux_head2(&self, tap: &Tensor, train: bool) -> ClassifierResult<Tensor> {
        let x = Self::aux_pool(tap).map_err(op("aux2 pool"))?;
        let x = self.conv_o2.forward(&x)?;
        let x = x.flatten_from(1).map_err(op("aux2 flatten"))?;
        let x = self.fc_o2.forward(&x).map_err(op("aux2 fc"))?;
        let x = self.drop_o2.forward(&x, train)?;
        self.out2.forward(&x).map_err(op("aux2 out"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};

    fn builder() -> (VarMap, VarBuilder<'static>) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        (varmap, vb)
    }

    #[test]
    fn conv_block_rejects_bad_groups() {
        let (_varmap, vb) = builder();
        let err = ConvBlock::new(6, 8, 3, 1, 4, "bad", vb).unwrap_err();
        assert!(matches!(err, ClassifierError::Config { .. }));
    }

    #[test]
    fn inception_preserves_spatial_and_sums_channels() {
        let (_varmap, vb) = builder();
        let cfg = InceptionConfig {
            input_channels: 16,
            filter1: 4,
            filter3_reduce: 4,
            filter3: 8,
            filter5_reduce: 2,
            filter5: 4,
            proj: 4,
        };
        let module = Inception::new(cfg, "t", vb).unwrap();

        let input = Tensor::ones((1, 16, 17, 13), DType::F32, &Device::Cpu).unwrap();
        let output = module.forward(&input).unwrap();
        assert_eq!(output.dims(), &[1, cfg.output_channels(), 17, 13]);
        assert_eq!(cfg.output_channels(), 20);
    }

    #[test]
    fn dropout_scales_in_eval_mode() {
        let drop = Dropout::new(0.4);
        let x = Tensor::ones((2, 4), DType::F32, &Device::Cpu).unwrap();
        let y = drop.forward(&x, false).unwrap();
        for v in y.flatten_all().unwrap().to_vec1::<f32>().unwrap() {
            assert!((v - 0.6).abs() < 1e-6);
        }
    }

    #[test]
    fn dropout_with_zero_rate_is_identity_in_train_mode() {
        let drop = Dropout::new(0.0);
        let x = Tensor::ones((2, 4), DType::F32, &Device::Cpu).unwrap();
        let y = drop.forward(&x, true).unwrap();
        assert_eq!(
            y.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            vec![1.0; 8]
        );
    }

    #[test]
    fn zero_input_produces_finite_logits_for_all_heads() {
        let (_varmap, vb) = builder();
        let config = GoogLeNetConfig { class_num: 10 };
        let model = GoogLeNet::new(&config, vb).unwrap();

        let input = Tensor::zeros((1, 3, 224, 224), DType::F32, &Device::Cpu).unwrap();
        let (main, aux1, aux2) = model.forward(&input, false).unwrap();

        for logits in [main, aux1, aux2] {
            assert_eq!(logits.dims(), &[1, 10]);
            for v in logits.flatten_all().unwrap().to_vec1::<f32>().unwrap() {
                assert!(v.is_finite());
            }
        }
    }

    #[test]
    fn fresh_models_start_from_different_parameters() {
        let config = GoogLeNetConfig { class_num: 10 };
        let (_vm_a, vb_a) = builder();
        let model_a = GoogLeNet::new(&config, vb_a).unwrap();
        let (_vm_b, vb_b) = builder();
        let model_b = GoogLeNet::new(&config, vb_b).unwrap();

        let input = Tensor::ones((1, 3, 224, 224), DType::F32, &Device::Cpu).unwrap();
        let (main_a, _, _) = model_a.forward(&input, false).unwrap();
        let (main_b, _, _) = model_b.forward(&input, false).unwrap();

        assert_ne!(
            main_a.to_vec2::<f32>().unwrap(),
            main_b.to_vec2::<f32>().unwrap()
        );
    }
}
