//! Reading and writing llama-server command lines.
//!
//! Only the executable, the model path, the port and a handful of
//! user-pinned flags survive a rewrite. Every tunable flag is regenerated
//! from [`OptimizedParams`].

use crate::{
    error::{TunerError, TunerResult},
    params::{OptimizedParams, PinnedFlags, Pooling},
};
use std::fmt::Write;

pub const DEFAULT_PORT: &str = "9999";

/// Splits on whitespace, keeping single- or double-quoted runs together.
/// Line continuations (`\` at the end of a line) are dropped.
pub fn split_command(cmd: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in cmd.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token && current != "\\" {
                    tokens.push(std::mem::take(&mut current));
                }
                current.clear();
                in_token = false;
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token && current != "\\" {
        tokens.push(current);
    }
    tokens
}

/// The parts of an existing registry command that a rewrite keeps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerCommand {
    pub executable: String,
    pub model_path: String,
    /// Kept verbatim, so a `${PORT}` placeholder survives.
    pub port: String,
    pub embeddings: bool,
    pub pooling: Option<Pooling>,
    pub pinned: PinnedFlags,
}

impl ServerCommand {
    pub fn parse(model_name: &str, cmd: &str) -> TunerResult<Self> {
        let tokens = split_command(cmd);
        let mut parsed = Self {
            executable: tokens.first().cloned().unwrap_or_default(),
            port: DEFAULT_PORT.to_string(),
            ..Default::default()
        };

        let mut iter = tokens.iter().skip(1);
        while let Some(token) = iter.next() {
            // Both `--flag value` and `--flag=value`.
            let (flag, inline) = match token.split_once('=') {
                Some((flag, value)) if flag.starts_with('-') => (flag, Some(value.to_string())),
                _ => (token.as_str(), None),
            };
            let mut value = || inline.clone().or_else(|| iter.next().cloned());

            match flag {
                "-m" | "--model" => parsed.model_path = value().unwrap_or_default(),
                "--port" => {
                    if let Some(port) = value() {
                        parsed.port = port;
                    }
                }
                "--embedding" | "--embeddings" => parsed.embeddings = true,
                "--pooling" => parsed.pooling = value().and_then(|v| parse_logged(flag, &v)),
                "--tensor-split" | "-ts" => parsed.pinned.tensor_split = value(),
                "--main-gpu" | "-mg" => {
                    parsed.pinned.main_gpu = value().and_then(|v| parse_logged(flag, &v))
                }
                "--rope-scaling" => {
                    parsed.pinned.rope_scaling = value().and_then(|v| parse_logged(flag, &v))
                }
                "--rope-freq-base" => {
                    parsed.pinned.rope_freq_base = value().and_then(|v| parse_logged(flag, &v))
                }
                _ => (),
            }
        }

        if parsed.model_path.is_empty() {
            return Err(TunerError::MissingModelPath(model_name.to_string()));
        }
        Ok(parsed)
    }

    /// Copies the pinned flags and any embedding setup into tuned params.
    pub fn carry_over(&self, params: OptimizedParams) -> OptimizedParams {
        let embeddings = if params.embeddings.is_some() || self.embeddings || self.pooling.is_some()
        {
            Some(self.pooling.unwrap_or_default())
        } else {
            None
        };
        OptimizedParams {
            embeddings,
            pinned: self.pinned.clone(),
            ..params
        }
    }

    /// The full command line in the flag order llama-server users expect.
    pub fn render(&self, params: &OptimizedParams) -> String {
        let mut cmd = format!(
            "\"{}\" -m \"{}\" --port {}",
            self.executable, self.model_path, self.port
        );
        // Writing into a String cannot fail.
        let _ = write!(
            cmd,
            " --n-gpu-layers {} --threads {} --ctx-size {} --batch-size {} --ubatch-size {} --keep {} --defrag-thold {:.2}",
            params.gpu_layers.flag_value(),
            params.threads,
            params.context_size,
            params.batch_size,
            params.ubatch_size,
            params.keep,
            params.defrag_threshold,
        );

        if let Some(kv) = params.kv_cache.filter(|kv| kv.bytes_per_element() < 2.0) {
            let _ = write!(cmd, " --cache-type-k {kv} --cache-type-v {kv}");
        }
        if let Some(pooling) = params.embeddings {
            let _ = write!(cmd, " --embeddings --pooling {pooling}");
        }

        let switches = [
            (params.flash_attn, " --flash-attn on"),
            (params.cont_batching, " --cont-batching"),
            (params.mlock, " --mlock"),
            (!params.mmap, " --no-mmap"),
            (params.numa_distribute, " --numa distribute"),
            (params.no_kv_offload, " --no-kv-offload"),
        ];
        for (_, flag) in switches.iter().filter(|(on, _)| *on) {
            cmd.push_str(flag);
        }

        if let Some(mode) = params.split_mode {
            let _ = write!(cmd, " --split-mode {mode}");
        }
        let pinned = &params.pinned;
        if let Some(split) = &pinned.tensor_split {
            let _ = write!(cmd, " --tensor-split {split}");
        }
        if let Some(gpu) = pinned.main_gpu {
            let _ = write!(cmd, " --main-gpu {gpu}");
        }
        if let Some(scaling) = pinned.rope_scaling {
            let _ = write!(cmd, " --rope-scaling {scaling}");
        }
        if let Some(base) = pinned.rope_freq_base {
            let _ = write!(cmd, " --rope-freq-base {base}");
        }
        for pattern in &params.override_tensors {
            let _ = write!(cmd, " --override-tensor \"{pattern}\"");
        }
        cmd.push_str(" --jinja");
        cmd
    }
}

fn parse_logged<T: std::str::FromStr>(flag: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            crate::warn!("Ignoring unparsable {flag} value '{value}'");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{GpuLayers, KvCacheType, RopeScaling, SplitMode};

    #[test]
    fn tokenizer() {
        assert_eq!(
            split_command("\"/opt/llama cpp/llama-server\" -m '/m/a b.gguf' --port ${PORT}"),
            vec!["/opt/llama cpp/llama-server", "-m", "/m/a b.gguf", "--port", "${PORT}"]
        );
        assert_eq!(
            split_command("llama-server \\\n  -m x.gguf \\\n  --jinja\n"),
            vec!["llama-server", "-m", "x.gguf", "--jinja"]
        );
        assert_eq!(split_command("a \"\" b"), vec!["a", "", "b"]);
    }

    #[test]
    fn parses_kept_parts() {
        let cmd = ServerCommand::parse(
            "qwen",
            "/opt/llama-cuda/llama-server -m /models/qwen.gguf --port ${PORT} --ctx-size 4096 \
             --tensor-split 3,1 --main-gpu=1 --rope-scaling yarn --rope-freq-base 1000000 --pooling cls",
        )
        .unwrap();
        assert_eq!(cmd.executable, "/opt/llama-cuda/llama-server");
        assert_eq!(cmd.model_path, "/models/qwen.gguf");
        assert_eq!(cmd.port, "${PORT}");
        assert_eq!(cmd.pinned.tensor_split.as_deref(), Some("3,1"));
        assert_eq!(cmd.pinned.main_gpu, Some(1));
        assert_eq!(cmd.pinned.rope_scaling, Some(RopeScaling::Yarn));
        assert_eq!(cmd.pinned.rope_freq_base, Some(1_000_000.0));
        assert_eq!(cmd.pooling, Some(Pooling::Cls));
    }

    #[test]
    fn default_port_and_missing_model() {
        let cmd = ServerCommand::parse("a", "llama-server --model a.gguf").unwrap();
        assert_eq!(cmd.port, DEFAULT_PORT);
        assert!(matches!(
            ServerCommand::parse("b", "llama-server --port 8080"),
            Err(TunerError::MissingModelPath(name)) if name == "b"
        ));
    }

    #[test]
    fn renders_in_flag_order() {
        let cmd = ServerCommand::parse("m", "llama-server -m /m/model.gguf --port 8080").unwrap();
        let params = OptimizedParams {
            gpu_layers: GpuLayers::All,
            threads: 8,
            context_size: 16384,
            batch_size: 512,
            ubatch_size: 256,
            keep: 2048,
            defrag_threshold: 0.1,
            flash_attn: true,
            cont_batching: true,
            mmap: true,
            kv_cache: Some(KvCacheType::Q8_0),
            split_mode: Some(SplitMode::Row),
            override_tensors: vec![r"blk\.47\.ffn_.*_exps\.weight=CPU".to_string()],
            ..Default::default()
        };
        assert_eq!(
            cmd.render(&params),
            "\"llama-server\" -m \"/m/model.gguf\" --port 8080 --n-gpu-layers 9999 --threads 8 \
             --ctx-size 16384 --batch-size 512 --ubatch-size 256 --keep 2048 --defrag-thold 0.10 \
             --cache-type-k q8_0 --cache-type-v q8_0 --flash-attn on --cont-batching \
             --split-mode row --override-tensor \"blk\\.47\\.ffn_.*_exps\\.weight=CPU\" --jinja"
        );
    }

    #[test]
    fn cpu_render_has_no_cache_types() {
        let cmd = ServerCommand::parse("m", "llama-server -m m.gguf").unwrap();
        let params = OptimizedParams {
            no_kv_offload: true,
            kv_cache: None,
            ..Default::default()
        };
        let line = cmd.render(&params);
        assert!(line.contains("--n-gpu-layers 0"));
        assert!(line.contains("--no-mmap"));
        assert!(line.contains("--no-kv-offload"));
        assert!(!line.contains("--cache-type"));
        assert!(!line.contains("--flash-attn"));
        let f16 = OptimizedParams {
            kv_cache: Some(KvCacheType::F16),
            ..params
        };
        assert!(!cmd.render(&f16).contains("--cache-type"));
    }

    #[test]
    fn embedding_and_pins_carry_over() {
        let cmd = ServerCommand::parse(
            "bge",
            "llama-server -m bge.gguf --embeddings --rope-scaling linear",
        )
        .unwrap();
        let params = cmd.carry_over(OptimizedParams::default());
        assert_eq!(params.embeddings, Some(Pooling::Mean));
        let line = cmd.render(&params);
        assert!(line.contains(" --embeddings --pooling mean"));
        assert!(line.contains(" --rope-scaling linear"));
        assert!(line.ends_with(" --jinja"));
    }
}
