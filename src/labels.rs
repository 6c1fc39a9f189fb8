//! Short, human readable labels for chained operation names.
//!
//! Operation names grow by appending an operator suffix for every step
//! (`photo.png_RGB2GRAY_GaussianBlur_k5`). The history listing only shows the
//! last step, rendered as `GaussianBlur (k=5)`.

/// Maximum length of a display name, in characters
pub const MAX_DISPLAY_LEN: usize = 34;

/// Operator suffixes that start a label tail
const KNOWN_KEYS: &[&str] = &[
    "PiecewiseLinearGrayTransform",
    "LinearGrayTransform",
    "LinearAlphaBeta",
    "GammaTransform",
    "MorphologyExBlackHat",
    "MorphologyExGradient",
    "MorphologyExTopHat",
    "MorphologyExClose",
    "MorphologyExOpen",
    "AdaptiveThreshold",
    "OtsuThreshold",
    "TriangleThreshold",
    "GaussianBlur",
    "MedianBlur",
    "BilateralBlur",
    "EqualizeHist",
    "CreateCLAHE",
    "FindContours",
    "DrawingBoundingRect",
    "Threshold",
    "Laplacian",
    "Scharr",
    "Sobel",
    "Canny",
    "Dilate",
    "Erode",
    "Invert",
    "Blur",
];

pub fn display_name(image_name: &str) -> String {
    if image_name.trim().is_empty() {
        return String::new();
    }

    // The step appended last is the one whose marker starts furthest right
    let latest = KNOWN_KEYS
        .iter()
        .filter_map(|key| image_name.rfind(&format!("_{key}")))
        .max();
    if let Some(index) = latest {
        let tail = &image_name[index + 1..];
        return ellipsize(&format_operation_tail(tail), MAX_DISPLAY_LEN);
    }

    // Color conversions only append the code, e.g. `_BGR2GRAY`
    if let Some(last) = image_name.rsplit('_').next() {
        if is_likely_color_conversion(last) {
            return ellipsize(&format!("ColorConvert ({last})"), MAX_DISPLAY_LEN);
        }
    }

    ellipsize(image_name, MAX_DISPLAY_LEN)
}

#[derive(Default)]
struct TailArgs<'a> {
    kernel: Option<&'a str>,
    iterations: Option<&'a str>,
    shape: Option<&'a str>,
    threshold_type: Option<&'a str>,
    threshold: Option<&'a str>,
    min: Option<&'a str>,
    max: Option<&'a str>,
    r1: Option<&'a str>,
    s1: Option<&'a str>,
    r2: Option<&'a str>,
    s2: Option<&'a str>,
    t1: Option<&'a str>,
    t2: Option<&'a str>,
    retrieval: Option<&'a str>,
    approximation: Option<&'a str>,
    adaptive_type: Option<&'a str>,
    diameter: Option<&'a str>,
    alpha: Option<&'a str>,
    beta: Option<&'a str>,
    gamma: Option<&'a str>,
}

fn value<'a>(token: &'a str, prefix: &str) -> Option<&'a str> {
    token
        .strip_prefix(prefix)
        .filter(|rest| !rest.is_empty())
}

/// Render `Erode_k3_it2_s0` as `Erode (k=3, it=2, shape=0)`
fn format_operation_tail(tail: &str) -> String {
    let parts: Vec<&str> = tail.split('_').filter(|p| !p.is_empty()).collect();
    let Some(&op) = parts.first() else {
        return tail.to_string();
    };
    let title = match op {
        "DrawingBoundingRect" => "DrawBoundingRect",
        other => other,
    };
    if parts.len() == 1 {
        return title.to_string();
    }

    let alpha_beta = op == "LinearAlphaBeta";
    let gamma = op == "GammaTransform";
    let piecewise = op == "PiecewiseLinearGrayTransform";
    let mut a = TailArgs::default();

    // Morphology shape codes `s1`/`s2` share a prefix with the piecewise points
    for &token in &parts[1..] {
        if alpha_beta && token.starts_with('a') && token.len() > 1 {
            a.alpha = value(token, "a");
        } else if alpha_beta && token.starts_with('b') && token.len() > 1 {
            a.beta = value(token, "b");
        } else if gamma && token.starts_with('g') && token.len() > 1 {
            a.gamma = value(token, "g");
        } else if let Some(v) = value(token, "k") {
            a.kernel = Some(v);
        } else if let Some(v) = value(token, "it") {
            a.iterations = Some(v);
        } else if let Some(v) = value(token, "s1").filter(|_| piecewise) {
            a.s1 = Some(v);
        } else if let Some(v) = value(token, "s2").filter(|_| piecewise) {
            a.s2 = Some(v);
        } else if let Some(v) = value(token, "s") {
            a.shape = Some(v);
        } else if let Some(v) = value(token, "th") {
            a.threshold = Some(v);
        } else if let Some(v) = value(token, "min") {
            a.min = Some(v);
        } else if let Some(v) = value(token, "max") {
            a.max = Some(v);
        } else if let Some(v) = value(token, "r1") {
            a.r1 = Some(v);
        } else if let Some(v) = value(token, "r2") {
            a.r2 = Some(v);
        } else if let Some(v) = value(token, "t1") {
            a.t1 = Some(v);
        } else if let Some(v) = value(token, "t2") {
            a.t2 = Some(v);
        } else if let Some(v) = value(token, "rm") {
            a.retrieval = Some(v);
        } else if let Some(v) = value(token, "am") {
            a.approximation = Some(v);
        } else if let Some(v) = value(token, "tt") {
            a.adaptive_type = Some(v);
        } else if let Some(v) = value(token, "d") {
            a.diameter = Some(v);
        } else if a.threshold_type.is_none() {
            a.threshold_type = Some(token);
        }
    }

    let mut args: Vec<String> = Vec::with_capacity(6);
    if op == "Threshold" {
        if let Some(t) = a.threshold_type {
            args.push(t.to_string());
        }
    }
    if let Some(v) = a.kernel {
        args.push(format!("k={v}"));
    }
    if let Some(v) = a.diameter {
        args.push(format!("d={v}"));
    }
    if let Some(v) = a.iterations {
        args.push(format!("it={v}"));
    }
    if let Some(v) = a.shape {
        args.push(format!("shape={v}"));
    }
    if let Some(v) = a.threshold {
        args.push(format!("th={v}"));
    }
    let linear = op == "LinearGrayTransform";
    if let Some(v) = a.min {
        args.push(if linear { format!("outMin={v}") } else { format!("min={v}") });
    }
    if let Some(v) = a.max {
        args.push(if linear { format!("outMax={v}") } else { format!("max={v}") });
    }
    if piecewise {
        for (key, v) in [("r1", a.r1), ("s1", a.s1), ("r2", a.r2), ("s2", a.s2)] {
            if let Some(v) = v {
                args.push(format!("{key}={v}"));
            }
        }
    }
    if let Some(v) = a.alpha {
        args.push(format!("alpha={v}"));
    }
    if let Some(v) = a.beta {
        args.push(format!("beta={v}"));
    }
    if let Some(v) = a.gamma {
        args.push(format!("gamma={v}"));
    }
    if let Some(v) = a.adaptive_type {
        args.push(format!("type={v}"));
    }
    if let Some(v) = a.t1 {
        args.push(format!("t1={v}"));
    }
    if let Some(v) = a.t2 {
        args.push(format!("t2={v}"));
    }
    if let Some(v) = a.retrieval {
        args.push(format!("rm={v}"));
    }
    if let Some(v) = a.approximation {
        args.push(format!("am={v}"));
    }

    if args.is_empty() {
        title.to_string()
    } else {
        format!("{title} ({})", args.join(", "))
    }
}

fn is_likely_color_conversion(token: &str) -> bool {
    let len = token.chars().count();
    (4..=24).contains(&len)
        && token.contains('2')
        && token.chars().all(|c| c.is_alphanumeric())
}

/// Truncate to `max_len` characters, marking the cut with `…`
pub fn ellipsize(text: &str, max_len: usize) -> String {
    if text.is_empty() || max_len == 0 {
        return String::new();
    }
    let count = text.chars().count();
    if count <= max_len {
        return text.to_string();
    }
    if max_len == 1 {
        return text.chars().take(1).collect();
    }
    let mut out: String = text.chars().take(max_len - 1).collect();
    out.push('…');
    out
}
