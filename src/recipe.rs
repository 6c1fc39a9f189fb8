//! Operator specifications and JSON recipes.
//!
//! A step is written either as JSON (`{"op": "gaussian_blur", "k": 5}`) or in
//! the short text form used on the command line (`gaussian_blur:k=5`). Both go
//! through the same serde model, so missing keys take the same defaults.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{CvError, Result};
use crate::history::History;
use crate::operators::{
    AdaptiveMethod, ApproximationMode, ColorConversion, KernelShape, MorphKind, OperatorResult, RetrievalMode,
    ThresholdType, color, contours, edges, filters, gray, morphology, threshold,
};
use crate::pipeline::{Pipeline, PipelineStep};

fn default_k() -> u32 {
    5
}
fn default_iterations() -> u32 {
    1
}
fn default_thresh() -> u8 {
    125
}
fn default_max() -> u8 {
    255
}
fn default_adaptive_k() -> u32 {
    11
}
fn default_canny_t1() -> u32 {
    125
}
fn default_canny_t2() -> u32 {
    255
}
fn default_clip() -> f64 {
    40.0
}
fn default_tiles() -> u32 {
    8
}
fn default_out_max() -> i32 {
    255
}
fn default_alpha() -> f64 {
    1.0
}
fn default_r1() -> i32 {
    70
}
fn default_s1() -> i32 {
    30
}
fn default_r2() -> i32 {
    180
}
fn default_s2() -> i32 {
    220
}
fn default_gamma() -> f64 {
    1.0
}

/// One operator with its parameters. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum OperatorSpec {
    ConvertColor {
        code: ColorConversion,
    },
    Blur {
        #[serde(default = "default_k")]
        k: u32,
    },
    GaussianBlur {
        #[serde(default = "default_k")]
        k: u32,
    },
    MedianBlur {
        #[serde(default = "default_k")]
        k: u32,
    },
    Bilateral {
        #[serde(default = "default_k")]
        d: u32,
    },
    Erode {
        #[serde(default = "default_k")]
        k: u32,
        #[serde(default = "default_iterations")]
        iterations: u32,
        #[serde(default)]
        shape: KernelShape,
    },
    Dilate {
        #[serde(default = "default_k")]
        k: u32,
        #[serde(default = "default_iterations")]
        iterations: u32,
        #[serde(default)]
        shape: KernelShape,
    },
    Morphology {
        kind: MorphKind,
        #[serde(default = "default_k")]
        k: u32,
        #[serde(default = "default_iterations")]
        iterations: u32,
        #[serde(default)]
        shape: KernelShape,
    },
    Threshold {
        #[serde(rename = "type", default)]
        kind: ThresholdType,
        #[serde(default = "default_thresh")]
        thresh: u8,
        #[serde(default = "default_max")]
        max: u8,
    },
    AdaptiveThreshold {
        #[serde(default)]
        method: AdaptiveMethod,
        #[serde(rename = "type", default)]
        kind: ThresholdType,
        #[serde(default = "default_adaptive_k")]
        k: u32,
        #[serde(default = "default_max")]
        max: u8,
    },
    Otsu {
        #[serde(default = "default_max")]
        max: u8,
    },
    Triangle {
        #[serde(default = "default_max")]
        max: u8,
    },
    EqualizeHist {},
    Clahe {
        #[serde(default = "default_clip")]
        clip: f64,
        #[serde(default = "default_tiles")]
        tiles: u32,
    },
    /// Linear stretch; without `in_min`/`in_max` the image's own range is used
    LinearStretch {
        #[serde(default)]
        out_min: i32,
        #[serde(default = "default_out_max")]
        out_max: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        in_min: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        in_max: Option<i32>,
    },
    /// `preset` picks an entry of `gray::ALPHA_BETA_PRESETS` and overrides `alpha`/`beta`
    AlphaBeta {
        #[serde(default = "default_alpha")]
        alpha: f64,
        #[serde(default)]
        beta: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preset: Option<usize>,
    },
    Piecewise {
        #[serde(default = "default_r1")]
        r1: i32,
        #[serde(default = "default_s1")]
        s1: i32,
        #[serde(default = "default_r2")]
        r2: i32,
        #[serde(default = "default_s2")]
        s2: i32,
    },
    /// `preset` picks an entry of `gray::GAMMA_PRESETS` and overrides `gamma`
    Gamma {
        #[serde(default = "default_gamma")]
        gamma: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preset: Option<usize>,
    },
    Canny {
        #[serde(default = "default_canny_t1")]
        t1: u32,
        #[serde(default = "default_canny_t2")]
        t2: u32,
    },
    Sobel {},
    Laplacian {},
    Scharr {},
    Invert {},
    FindContours {
        #[serde(default)]
        retrieval: RetrievalMode,
        #[serde(default)]
        approximation: ApproximationMode,
    },
    /// Boxes around the selection's contours, drawn on operation `target`
    BoundingRects {
        #[serde(default)]
        target: usize,
    },
}

/// Every operator name with the keys it accepts, for help output
pub const OPERATORS: &[(&str, &str)] = &[
    ("convert_color", "code=RGB2GRAY|BGR2GRAY|GRAY2RGB|GRAY2BGR|RGB2BGR|BGR2RGB|RGB2HSV|BGR2HSV"),
    ("blur", "k=5"),
    ("gaussian_blur", "k=5 (odd)"),
    ("median_blur", "k=5 (odd)"),
    ("bilateral", "d=5"),
    ("erode", "k=5 iterations=1 shape=rect|cross|ellipse"),
    ("dilate", "k=5 iterations=1 shape=rect|cross|ellipse"),
    ("morphology", "kind=open|close|gradient|top_hat|black_hat k=5 iterations=1 shape=rect"),
    ("threshold", "type=binary|binary_inv|trunc|to_zero|to_zero_inv thresh=125 max=255"),
    ("adaptive_threshold", "method=mean_c|gaussian_c type=binary|binary_inv k=11 max=255"),
    ("otsu", "max=255"),
    ("triangle", "max=255"),
    ("equalize_hist", ""),
    ("clahe", "clip=40 tiles=8"),
    ("linear_stretch", "out_min=0 out_max=255 [in_min in_max]"),
    ("alpha_beta", "alpha=1 beta=0 | preset=0..5"),
    ("piecewise", "r1=70 s1=30 r2=180 s2=220"),
    ("gamma", "gamma=1 | preset=0..4"),
    ("canny", "t1=125 t2=255"),
    ("sobel", ""),
    ("laplacian", ""),
    ("scharr", ""),
    ("invert", ""),
    ("find_contours", "retrieval=external|list|c_comp|tree approximation=none|simple|tc89_l1|tc89_kcos"),
    ("bounding_rects", "target=0"),
];

impl OperatorSpec {
    pub fn op_name(&self) -> &'static str {
        match self {
            OperatorSpec::ConvertColor { .. } => "convert_color",
            OperatorSpec::Blur { .. } => "blur",
            OperatorSpec::GaussianBlur { .. } => "gaussian_blur",
            OperatorSpec::MedianBlur { .. } => "median_blur",
            OperatorSpec::Bilateral { .. } => "bilateral",
            OperatorSpec::Erode { .. } => "erode",
            OperatorSpec::Dilate { .. } => "dilate",
            OperatorSpec::Morphology { .. } => "morphology",
            OperatorSpec::Threshold { .. } => "threshold",
            OperatorSpec::AdaptiveThreshold { .. } => "adaptive_threshold",
            OperatorSpec::Otsu { .. } => "otsu",
            OperatorSpec::Triangle { .. } => "triangle",
            OperatorSpec::EqualizeHist {} => "equalize_hist",
            OperatorSpec::Clahe { .. } => "clahe",
            OperatorSpec::LinearStretch { .. } => "linear_stretch",
            OperatorSpec::AlphaBeta { .. } => "alpha_beta",
            OperatorSpec::Piecewise { .. } => "piecewise",
            OperatorSpec::Gamma { .. } => "gamma",
            OperatorSpec::Canny { .. } => "canny",
            OperatorSpec::Sobel {} => "sobel",
            OperatorSpec::Laplacian {} => "laplacian",
            OperatorSpec::Scharr {} => "scharr",
            OperatorSpec::Invert {} => "invert",
            OperatorSpec::FindContours { .. } => "find_contours",
            OperatorSpec::BoundingRects { .. } => "bounding_rects",
        }
    }

    /// Run the operator on the history's selected operation
    pub fn run(&self, history: &History) -> Result<OperatorResult> {
        let input = history.selected_input()?;
        let src = input.image();
        match *self {
            OperatorSpec::ConvertColor { code } => color::convert_color(src, code),
            OperatorSpec::Blur { k } => filters::blur(src, k),
            OperatorSpec::GaussianBlur { k } => filters::gaussian_blur(src, k),
            OperatorSpec::MedianBlur { k } => filters::median_blur(src, k),
            OperatorSpec::Bilateral { d } => filters::bilateral_filter(src, d),
            OperatorSpec::Erode { k, iterations, shape } => morphology::erode(src, shape, k, iterations),
            OperatorSpec::Dilate { k, iterations, shape } => morphology::dilate(src, shape, k, iterations),
            OperatorSpec::Morphology {
                kind,
                k,
                iterations,
                shape,
            } => morphology::morphology_ex(src, kind, shape, k, iterations),
            OperatorSpec::Threshold { kind, thresh, max } => threshold::threshold(src, kind, thresh, max),
            OperatorSpec::AdaptiveThreshold { method, kind, k, max } => {
                threshold::adaptive_threshold(src, method, kind, k, max)
            }
            OperatorSpec::Otsu { max } => threshold::otsu_threshold(src, max),
            OperatorSpec::Triangle { max } => threshold::triangle_threshold(src, max),
            OperatorSpec::EqualizeHist {} => gray::equalize_hist(src),
            OperatorSpec::Clahe { clip, tiles } => gray::clahe(src, clip, tiles),
            OperatorSpec::LinearStretch {
                out_min,
                out_max,
                in_min,
                in_max,
            } => match (in_min, in_max) {
                (Some(lo), Some(hi)) => gray::linear_gray_transform_range(src, lo, hi, out_min, out_max),
                (None, None) => gray::linear_gray_transform(src, out_min, out_max),
                _ => Err(CvError::invalid("in_min", "in_min and in_max must be given together")),
            },
            OperatorSpec::AlphaBeta { alpha, beta, preset } => {
                let (alpha, beta) = match preset {
                    Some(index) => gray::alpha_beta_preset(index)?,
                    None => (alpha, beta),
                };
                gray::linear_alpha_beta(src, alpha, beta)
            }
            OperatorSpec::Piecewise { r1, s1, r2, s2 } => gray::piecewise_linear(src, r1, s1, r2, s2),
            OperatorSpec::Gamma { gamma, preset } => {
                let gamma = match preset {
                    Some(index) => gray::gamma_preset(index)?,
                    None => gamma,
                };
                gray::gamma_transform(src, gamma)
            }
            OperatorSpec::Canny { t1, t2 } => edges::canny(src, t1, t2),
            OperatorSpec::Sobel {} => edges::sobel(src),
            OperatorSpec::Laplacian {} => edges::laplacian(src),
            OperatorSpec::Scharr {} => edges::scharr(src),
            OperatorSpec::Invert {} => edges::invert(src),
            OperatorSpec::FindContours {
                retrieval,
                approximation,
            } => contours::find_contours(src, retrieval, approximation).map(OperatorResult::from),
            OperatorSpec::BoundingRects { target } => {
                let target_op = history.get(target).ok_or(CvError::IndexOutOfRange {
                    index: target,
                    len: history.len(),
                })?;
                contours::draw_bounding_rects(target_op.image(), input.contours())
            }
        }
    }
}

impl PipelineStep for OperatorSpec {
    fn process(&self, history: &History) -> Result<OperatorResult> {
        self.run(history)
    }

    fn name(&self) -> &str {
        self.op_name()
    }
}

/// Scalar from the text form: integers, then floats, then booleans, else a string
fn parse_scalar(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

impl FromStr for OperatorSpec {
    type Err = CvError;

    /// Parse `name` or `name:key=value,key=value`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (name, args) = s.split_once(':').unwrap_or((s, ""));
        let name = name.trim();
        if !OPERATORS.iter().any(|(op, _)| *op == name) {
            return Err(CvError::UnknownOperator(name.to_string()));
        }

        let mut map = Map::new();
        map.insert("op".to_string(), Value::String(name.to_string()));
        for pair in args.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| CvError::invalid("step", format!("expected key=value, got `{pair}`")))?;
            map.insert(key.trim().to_string(), parse_scalar(value.trim()));
        }

        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

/// A list of steps loaded from a JSON file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub steps: Vec<OperatorSpec>,
    #[serde(default)]
    pub keep_going: bool,
}

impl Recipe {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let recipe = Self::from_json(&text)?;
        tracing::debug!(path = %path.as_ref().display(), steps = recipe.steps.len(), "recipe loaded");
        Ok(recipe)
    }

    /// Append the recipe's steps to `pipeline`, enabling keep-going if the recipe asks for it
    pub fn extend_pipeline(self, mut pipeline: Pipeline) -> Pipeline {
        if self.keep_going {
            pipeline = pipeline.with_keep_going(true);
        }
        for step in self.steps {
            pipeline = pipeline.add_step(Arc::new(step));
        }
        pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_form_fills_defaults() {
        let spec: OperatorSpec = "erode".parse().unwrap();
        assert_eq!(
            spec,
            OperatorSpec::Erode {
                k: 5,
                iterations: 1,
                shape: KernelShape::Rect
            }
        );
        let spec: OperatorSpec = "piecewise".parse().unwrap();
        assert_eq!(
            spec,
            OperatorSpec::Piecewise {
                r1: 70,
                s1: 30,
                r2: 180,
                s2: 220
            }
        );
    }

    #[test]
    fn text_form_parses_typed_values() {
        let spec: OperatorSpec = "threshold:type=binary_inv,thresh=90".parse().unwrap();
        assert_eq!(
            spec,
            OperatorSpec::Threshold {
                kind: ThresholdType::BinaryInv,
                thresh: 90,
                max: 255
            }
        );
        let spec: OperatorSpec = "alpha_beta:alpha=1.5,beta=-50".parse().unwrap();
        assert_eq!(
            spec,
            OperatorSpec::AlphaBeta {
                alpha: 1.5,
                beta: -50.0,
                preset: None
            }
        );
        let spec: OperatorSpec = "convert_color:code=rgb2gray".parse().unwrap();
        assert_eq!(spec, OperatorSpec::ConvertColor { code: ColorConversion::Rgb2Gray });
    }

    #[test]
    fn text_form_errors() {
        assert!(matches!("sharpen".parse::<OperatorSpec>(), Err(CvError::UnknownOperator(_))));
        assert!("blur:k".parse::<OperatorSpec>().is_err());
        assert!("threshold:max=300".parse::<OperatorSpec>().is_err());
        assert!("convert_color".parse::<OperatorSpec>().is_err());
    }

    #[test]
    fn misspelled_keys_are_rejected() {
        assert!("gaussian_blur:size=3".parse::<OperatorSpec>().is_err());
        assert!("invert:k=3".parse::<OperatorSpec>().is_err());
        assert!(Recipe::from_json(r#"{"steps": [{"op": "median_blur", "kernel": 3}]}"#).is_err());
        assert!(Recipe::from_json(r#"{"steps": [{"op": "sobel", "dx": 1}]}"#).is_err());
        assert_eq!(
            Recipe::from_json(r#"{"steps": [{"op": "sobel"}]}"#).unwrap().steps,
            vec![OperatorSpec::Sobel {}]
        );
    }

    #[test]
    fn presets_select_gray_transform_parameters() {
        let spec: OperatorSpec = "gamma:preset=4".parse().unwrap();
        assert_eq!(
            spec,
            OperatorSpec::Gamma {
                gamma: 1.0,
                preset: Some(4)
            }
        );

        let mut history = History::new();
        history.push(crate::models::Operation::new(
            "a.png",
            image::DynamicImage::ImageLuma8(image::GrayImage::from_pixel(2, 2, image::Luma([128]))),
        ));
        let out = spec.run(&history).unwrap();
        assert_eq!(out.suffix, "GammaTransform_g2.5");
        assert_eq!(out.image.as_luma8().unwrap().get_pixel(0, 0)[0], 46);

        let negative: OperatorSpec = "alpha_beta:preset=5".parse().unwrap();
        let out = negative.run(&history).unwrap();
        assert_eq!(out.suffix, "LinearAlphaBeta_a-1_b255");
        assert_eq!(out.image.as_luma8().unwrap().get_pixel(0, 0)[0], 127);

        let missing: OperatorSpec = "gamma:preset=9".parse().unwrap();
        assert!(matches!(missing.run(&history), Err(CvError::InvalidParameter { name: "preset", .. })));
    }

    #[test]
    fn every_listed_operator_has_a_spec() {
        for (name, _) in OPERATORS {
            let text = match *name {
                "convert_color" => "convert_color:code=RGB2GRAY".to_string(),
                "morphology" => "morphology:kind=open".to_string(),
                other => other.to_string(),
            };
            let spec: OperatorSpec = text.parse().unwrap();
            assert_eq!(spec.op_name(), *name);
        }
    }

    #[test]
    fn recipe_json_round_trip() {
        let recipe = Recipe::from_json(
            r#"{"steps": [
                {"op": "convert_color", "code": "RGB2GRAY"},
                {"op": "gaussian_blur", "k": 3},
                {"op": "find_contours", "retrieval": "list", "approximation": "none"}
            ], "keep_going": true}"#,
        )
        .unwrap();
        assert_eq!(recipe.steps.len(), 3);
        assert!(recipe.keep_going);
        assert_eq!(recipe.steps[1], OperatorSpec::GaussianBlur { k: 3 });

        let again = Recipe::from_json(&serde_json::to_string(&recipe).unwrap()).unwrap();
        assert_eq!(again, recipe);
        assert_eq!(recipe.extend_pipeline(Pipeline::new()).len(), 3);
    }
}
