//! Weight quantization labels (`Q4_K_M`, `IQ3_XXS`, ...) and their size relative
//! to an 8-bit encoding.

/// Multiplier for labels missing from [`QUANT_MULTIPLIERS`].
pub const DEFAULT_QUANT_MULTIPLIER: f64 = 0.5;

/// Bytes per parameter relative to Q8_0.
pub static QUANT_MULTIPLIERS: &[(&str, f64)] = &[
    ("F32", 4.0),
    ("F16", 2.0),
    ("BF16", 2.0),
    ("Q8_0", 1.0),
    ("Q6_K", 0.75),
    ("Q5_K_M", 0.625),
    ("Q5_K_S", 0.625),
    ("Q4_K_M", 0.5),
    ("Q4_K_S", 0.5),
    ("Q4_0", 0.5),
    ("Q3_K_M", 0.375),
    ("Q3_K_S", 0.375),
    ("Q2_K", 0.25),
    ("IQ4_XS", 0.45),
    ("IQ3_XXS", 0.3125),
    ("IQ2_XXS", 0.25),
    ("IQ1_S", 0.125),
];

/// Labels recognised in file names. Longer tags win over their prefixes.
static KNOWN_TAGS: &[&str] = &[
    "F32", "F16", "BF16", "Q8_0", "Q6_K", "Q5_K_M", "Q5_K_S", "Q5_K", "Q5_0", "Q5_1",
    "Q4_K_M", "Q4_K_S", "Q4_K", "Q4_0", "Q4_1", "Q3_K_L", "Q3_K_M", "Q3_K_S", "Q3_K", "Q2_K",
    "Q2_K_S", "IQ4_XS", "IQ4_NL", "IQ3_M", "IQ3_S", "IQ3_XS", "IQ3_XXS", "IQ2_M", "IQ2_S",
    "IQ2_XS", "IQ2_XXS", "IQ1_M", "IQ1_S",
];

static TAG_SET: std::sync::OnceLock<Option<regex::RegexSet>> = std::sync::OnceLock::new();

/// Never fails: unknown or empty labels get [`DEFAULT_QUANT_MULTIPLIER`].
pub fn quant_multiplier(label: &str) -> f64 {
    let normalized = label.trim().to_ascii_uppercase().replace('-', "_");
    QUANT_MULTIPLIERS
        .iter()
        .find(|(tag, _)| *tag == normalized)
        .map_or(DEFAULT_QUANT_MULTIPLIER, |(_, mult)| *mult)
}

fn build_pat(tag: &str) -> String {
    const DELIM: &str = r"[-_\.\u{2010}-\u{2015}]";
    let body = tag
        .split('_')
        .collect::<Vec<_>>()
        .join(&format!("(?:{DELIM})+"));
    format!(r"(?i)(?:^|{DELIM}|/|\\){body}(?:$|{DELIM})")
}

/// Finds a quantization label in a file name or path, e.g.
/// `Qwen3-30B-A3B-Q4_K_M.gguf` → `Q4_K_M`.
pub fn detect_quant_label(path: &str) -> Option<String> {
    let set = TAG_SET
        .get_or_init(|| regex::RegexSet::new(KNOWN_TAGS.iter().map(|t| build_pat(t))).ok())
        .as_ref()?;
    set.matches(path)
        .iter()
        .max_by_key(|&i| KNOWN_TAGS[i].len())
        .map(|i| KNOWN_TAGS[i].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplier_lookup() {
        assert_eq!(quant_multiplier("Q4_K_M"), 0.5);
        assert_eq!(quant_multiplier("q8_0"), 1.0);
        assert_eq!(quant_multiplier("IQ3_XXS"), 0.3125);
        assert_eq!(quant_multiplier("f16"), 2.0);
    }

    #[test]
    fn unknown_label_gets_default() {
        assert_eq!(quant_multiplier("Q9_Z"), DEFAULT_QUANT_MULTIPLIER);
        assert_eq!(quant_multiplier(""), DEFAULT_QUANT_MULTIPLIER);
        assert_eq!(quant_multiplier("IQ4_NL"), 0.5);
    }

    #[test]
    fn tags_are_unique() {
        for i in 0..KNOWN_TAGS.len() {
            for j in i + 1..KNOWN_TAGS.len() {
                assert_ne!(KNOWN_TAGS[i], KNOWN_TAGS[j], "duplicate tag detected");
            }
        }
        for (tag, _) in QUANT_MULTIPLIERS {
            assert!(KNOWN_TAGS.contains(tag), "{tag} has a multiplier but is never detected");
        }
    }

    #[test]
    fn label_detection() {
        let cases = [
            ("Qwen3-30B-A3B-Q4_K_M.gguf", Some("Q4_K_M")),
            ("/models/llama-3.1-8b-instruct.q8_0.gguf", Some("Q8_0")),
            ("gemma-3-27b-it-IQ2_M.gguf", Some("IQ2_M")),
            ("mistral-7b-IQ3_XXS.gguf", Some("IQ3_XXS")),
            ("phi-4-Q4-K-S.gguf", Some("Q4_K_S")),
            ("nomic-embed-text-v1.5.f16.gguf", Some("F16")),
            ("DeepSeek-R1-UD-Q4_K_XL-00001-of-00008.gguf", Some("Q4_K")),
            ("model.gguf", None),
        ];
        for (name, expected) in cases {
            assert_eq!(detect_quant_label(name).as_deref(), expected, "{name}");
        }
    }
}
