//! Fixed-point export for the C game client.
//!
//! Weights and biases are stored as `int16_t` with [`QUANTIZATION_SCALE`] as the fixed
//! point. The client feeds inputs as `NNUE_SCALE` for set features, divides every
//! accumulator by `NNUE_SCALE`, and clamps the final value to `±NNUE_OUTPUT_SCALE`.
//! Normalization statistics stay in `float`.

use std::io::{self, Write};

use super::Network;

pub const QUANTIZATION_SCALE: f32 = 127.0;

const VALUES_PER_LINE: usize = 8;
const SLOPE_DENOMINATOR: i32 = 1000;

/// `clamp(round(v * 127), i16::MIN, i16::MAX)`.
#[expect(clippy::cast_possible_truncation)]
#[must_use]
pub fn quantize(value: f32) -> i16 {
    (value * QUANTIZATION_SCALE)
        .round()
        .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

#[must_use]
pub fn dequantize(value: i16) -> f32 {
    f32::from(value) / QUANTIZATION_SCALE
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedNorm {
    pub mean: Vec<f32>,
    pub var: Vec<f32>,
    pub gamma: Vec<f32>,
    pub beta: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedLayer {
    pub inputs: usize,
    pub outputs: usize,
    /// Row-major, `inputs × outputs`.
    pub weights: Vec<i16>,
    pub bias: Vec<i16>,
    pub norm: Option<QuantizedNorm>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedNetwork {
    pub output_scale: f32,
    pub pre_activation_clip: f32,
    pub negative_slope: f32,
    pub norm_epsilon: f32,
    pub layers: Vec<QuantizedLayer>,
}

impl QuantizedNetwork {
    #[must_use]
    pub fn from_network(network: &Network) -> Self {
        let config = network.config();
        let layers = network
            .layers()
            .iter()
            .map(|layer| QuantizedLayer {
                inputs: layer.inputs(),
                outputs: layer.outputs(),
                weights: layer.weights().as_slice().iter().copied().map(quantize).collect(),
                bias: layer.bias().iter().copied().map(quantize).collect(),
                norm: layer.norm().map(|norm| QuantizedNorm {
                    mean: norm.running_mean().to_vec(),
                    var: norm.running_var().to_vec(),
                    gamma: norm.gamma().to_vec(),
                    beta: norm.beta().to_vec(),
                }),
            })
            .collect();
        Self {
            output_scale: config.output_scale,
            pre_activation_clip: config.pre_activation_clip,
            negative_slope: config.activation.negative_slope(),
            norm_epsilon: config.norm_epsilon,
            layers,
        }
    }

    /// Writes a self-contained C header with `nnue_wN`, `nnue_bN` and `nnue_bnN_*` tables.
    #[expect(clippy::cast_possible_truncation)]
    pub fn write_c_header<W>(&self, w: &mut W) -> io::Result<()>
    where
        W: Write + ?Sized,
    {
        writeln!(w, "// OctaFlip value network, fixed-point export")?;
        writeln!(w, "#ifndef OCTAFLIP_NNUE_H")?;
        writeln!(w, "#define OCTAFLIP_NNUE_H")?;
        writeln!(w)?;
        writeln!(w, "#include <stdint.h>")?;
        writeln!(w)?;
        writeln!(w, "#define NNUE_SCALE {}", QUANTIZATION_SCALE as i32)?;
        writeln!(w, "#define NNUE_OUTPUT_SCALE {}", self.output_scale)?;
        writeln!(w, "#define NNUE_PRE_ACTIVATION_CLIP {:?}f", self.pre_activation_clip)?;
        writeln!(w, "#define NNUE_BN_EPSILON {:e}f", self.norm_epsilon)?;
        writeln!(
            w,
            "#define NNUE_LEAKY_SLOPE_NUM {}",
            (self.negative_slope * SLOPE_DENOMINATOR as f32).round() as i32
        )?;
        writeln!(w, "#define NNUE_LEAKY_SLOPE_DEN {SLOPE_DENOMINATOR}")?;
        writeln!(w, "#define NNUE_NUM_LAYERS {}", self.layers.len())?;
        if let Some(first) = self.layers.first() {
            writeln!(w, "#define NNUE_INPUT_SIZE {}", first.inputs)?;
        }
        for (i, layer) in self.layers.iter().enumerate() {
            writeln!(w, "#define NNUE_L{}_SIZE {}", i + 1, layer.outputs)?;
        }

        for (i, layer) in self.layers.iter().enumerate() {
            let n = i + 1;
            writeln!(w)?;
            writeln!(
                w,
                "static const int16_t nnue_w{n}[{}][{}] = {{",
                layer.inputs, layer.outputs
            )?;
            for row in layer.weights.chunks(layer.outputs.max(1)) {
                write!(w, "    {{")?;
                write_values(w, row, "        ")?;
                writeln!(w, "}},")?;
            }
            writeln!(w, "}};")?;

            writeln!(w, "static const int16_t nnue_b{n}[{}] = {{", layer.outputs)?;
            write_values(w, &layer.bias, "    ")?;
            writeln!(w, "}};")?;

            if let Some(norm) = &layer.norm {
                for (name, values) in [
                    ("mean", &norm.mean),
                    ("var", &norm.var),
                    ("gamma", &norm.gamma),
                    ("beta", &norm.beta),
                ] {
                    let literals: Vec<String> = values.iter().map(|v| format!("{v:e}f")).collect();
                    writeln!(
                        w,
                        "static const float nnue_bn{n}_{name}[{}] = {{",
                        values.len()
                    )?;
                    write_values(w, &literals, "    ")?;
                    writeln!(w, "}};")?;
                }
            }
        }
        writeln!(w)?;
        writeln!(w, "#endif // OCTAFLIP_NNUE_H")?;
        Ok(())
    }
}

/// Comma-separated values, [`VALUES_PER_LINE`] per line.
fn write_values<W, T>(w: &mut W, values: &[T], indent: &str) -> io::Result<()>
where
    W: Write + ?Sized,
    T: std::fmt::Display,
{
    writeln!(w)?;
    for chunk in values.chunks(VALUES_PER_LINE) {
        let line = chunk
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(w, "{indent}{line},")?;
    }
    Ok(())
}

impl Network {
    /// Quantized copy of the parameters; see [`QuantizedNetwork::write_c_header`].
    #[must_use]
    pub fn quantized(&self) -> QuantizedNetwork {
        QuantizedNetwork::from_network(self)
    }

    /// Largest absolute weight or bias, useful to check for quantization clipping.
    #[must_use]
    pub fn max_abs_parameter(&self) -> f32 {
        self.layers()
            .iter()
            .flat_map(|l| l.weights().as_slice().iter().chain(l.bias()))
            .fold(0.0, |acc: f32, v| acc.max(v.abs()))
    }
}
