//! File-name heuristics.
//!
//! Best effort only. These rules fill in whatever the GGUF header did not
//! provide (or everything, when the header could not be read). They are a
//! fallback, not a contract, and are not meant to cover every naming scheme.

use regex::Regex;
use std::sync::OnceLock;

/// Everything a file name can tell us.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilenameHints {
    pub parameter_count: u64,
    pub quant_label: Option<String>,
    pub is_moe: bool,
    pub expert_count: u64,
    pub active_expert_count: u64,
}

/// Expert counts assumed for a MoE model known only by name.
pub const ASSUMED_EXPERTS: u64 = 8;
pub const ASSUMED_ACTIVE_EXPERTS: u64 = 2;

impl FilenameHints {
    pub fn from_path(path: &str) -> Self {
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path)
            .to_lowercase();

        let mut hints = Self {
            parameter_count: parse_param_count(&file_name).unwrap_or(0),
            quant_label: crate::detect_quant_label(path),
            ..Default::default()
        };

        if let Some(experts) = expert_multiplier(&file_name) {
            hints.is_moe = true;
            hints.expert_count = experts;
        }
        if file_name.contains("mixtral") || file_name.contains("moe") || active_param_marker(&file_name)
        {
            hints.is_moe = true;
        }
        if hints.is_moe {
            if hints.expert_count == 0 {
                hints.expert_count = ASSUMED_EXPERTS;
            }
            hints.active_expert_count = ASSUMED_ACTIVE_EXPERTS;
        }

        if hints.parameter_count == 0 && file_name.contains("nano") {
            hints.parameter_count = 1_000_000_000;
        }
        if file_name.contains("mxbai") && file_name.contains("large") {
            hints.parameter_count = 335_000_000;
        }
        hints
    }
}

struct ParamPattern {
    re: Regex,
    scale: f64,
}

fn param_patterns() -> &'static [ParamPattern] {
    static PATTERNS: OnceLock<Vec<ParamPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        // A size token must not be glued to a preceding letter, so the `a3b`
        // in `30b-a3b` (active parameters) is never taken as the total.
        [
            (r"(?:^|[^a-z0-9.])(\d+)x(\d+(?:\.\d+)?)b(?:[^a-z0-9]|$)", 1e9),
            (r"(?:^|[^a-z0-9.])(\d+(?:\.\d+)?)b(?:[^a-z0-9]|$)", 1e9),
            (r"(?:^|[^a-z0-9.])(\d+(?:\.\d+)?)m(?:[^a-z0-9]|$)", 1e6),
        ]
        .into_iter()
        .filter_map(|(pat, scale)| Regex::new(pat).ok().map(|re| ParamPattern { re, scale }))
        .collect()
    })
}

/// Parameter count from text such as `30b`, `3.5b`, `8x7b` or `350m`.
pub fn parse_param_count(text: &str) -> Option<u64> {
    let lower = text.to_lowercase();
    param_patterns().iter().find_map(|p| {
        let caps = p.re.captures(&lower)?;
        let mut value = caps.get(1)?.as_str().parse::<f64>().ok()?;
        if let Some(per_expert) = caps.get(2) {
            value *= per_expert.as_str().parse::<f64>().ok()?;
        }
        Some((value * p.scale) as u64)
    })
}

/// `8x7b` style names: the leading number is the expert count.
fn expert_multiplier(file_name: &str) -> Option<u64> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"(?:^|[^a-z0-9])(\d+)x\d+(?:\.\d+)?b").ok())
        .as_ref()?;
    re.captures(file_name)?.get(1)?.as_str().parse().ok()
}

/// `-a3b`, `-a22b`: active-parameter suffix used by MoE releases.
fn active_param_marker(file_name: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-_.]a\d+(?:\.\d+)?b(?:[^a-z0-9]|$)").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(file_name))
}

struct FamilyLayers {
    family: &'static str,
    sizes: &'static [(&'static [&'static str], u64)],
    default: u64,
}

/// Checked in order; first matching family, then first matching size marker.
static FAMILY_LAYERS: &[FamilyLayers] = &[
    FamilyLayers {
        family: "qwen",
        sizes: &[
            (&["30b"], 60),
            (&["13b", "14b"], 40),
            (&["7b", "8b"], 32),
            (&["4b"], 32),
            (&["1b", "nano"], 22),
        ],
        default: 32,
    },
    FamilyLayers {
        family: "gemma",
        sizes: &[
            (&["27b"], 46),
            (&["9b"], 42),
            (&["7b"], 28),
            (&["4b"], 26),
            (&["2b"], 18),
        ],
        default: 28,
    },
    FamilyLayers {
        family: "llama",
        sizes: &[
            (&["70b"], 80),
            (&["30b"], 60),
            (&["13b"], 40),
            (&["7b", "8b"], 32),
            (&["3b"], 26),
        ],
        default: 32,
    },
];

/// Upper bound (exclusive) on parameters → layer count.
static PARAM_LAYER_BRACKETS: &[(u64, u64)] = &[
    (2_000_000_000, 18),
    (5_000_000_000, 24),
    (8_000_000_000, 32),
    (15_000_000_000, 40),
    (35_000_000_000, 48),
    (70_000_000_000, 80),
];
const LARGEST_LAYER_COUNT: u64 = 96;

static NAME_LAYER_FALLBACK: &[(&[&str], u64)] = &[
    (&["30b", "27b"], 60),
    (&["13b", "14b"], 40),
    (&["7b", "8b"], 32),
    (&["3b", "4b"], 26),
    (&["1b", "nano"], 22),
];
const DEFAULT_LAYER_COUNT: u64 = 32;

pub fn default_layer_count(file_name: &str, parameter_count: u64) -> u64 {
    let lower = file_name.to_lowercase();
    let has_any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if let Some(family) = FAMILY_LAYERS.iter().find(|f| lower.contains(f.family)) {
        return family
            .sizes
            .iter()
            .find(|(markers, _)| has_any(markers))
            .map_or(family.default, |(_, layers)| *layers);
    }
    if parameter_count > 0 {
        return PARAM_LAYER_BRACKETS
            .iter()
            .find(|(bound, _)| parameter_count < *bound)
            .map_or(LARGEST_LAYER_COUNT, |(_, layers)| *layers);
    }
    NAME_LAYER_FALLBACK
        .iter()
        .find(|(markers, _)| has_any(markers))
        .map_or(DEFAULT_LAYER_COUNT, |(_, layers)| *layers)
}

static CONTEXT_MARKERS: &[(&str, u64)] = &[
    ("128k", 131_072),
    ("64k", 65_536),
    ("32k", 32_768),
    ("16k", 16_384),
    ("8k", 8_192),
    ("1m", 1_048_576),
];
static LONG_CONTEXT_FAMILIES: &[&str] = &["qwen3", "gemma-3"];
const LONG_CONTEXT: u64 = 131_072;
const DEFAULT_CONTEXT: u64 = 32_768;

pub fn default_context_length(file_name: &str) -> u64 {
    let lower = file_name.to_lowercase();
    if let Some((_, ctx)) = CONTEXT_MARKERS.iter().find(|(m, _)| lower.contains(m)) {
        return *ctx;
    }
    if LONG_CONTEXT_FAMILIES.iter().any(|f| lower.contains(f)) {
        LONG_CONTEXT
    } else {
        DEFAULT_CONTEXT
    }
}

static EMBEDDING_BRACKETS: &[(u64, u64)] = &[
    (2_000_000_000, 2048),
    (8_000_000_000, 4096),
    (35_000_000_000, 5120),
];
const LARGEST_EMBEDDING: u64 = 8192;
const DEFAULT_EMBEDDING: u64 = 4096;

pub fn default_embedding_size(parameter_count: u64) -> u64 {
    if parameter_count == 0 {
        return DEFAULT_EMBEDDING;
    }
    EMBEDDING_BRACKETS
        .iter()
        .find(|(bound, _)| parameter_count < *bound)
        .map_or(LARGEST_EMBEDDING, |(_, emb)| *emb)
}
