//! TOML configuration for the app. Every field has a default, so an
//! absent file or empty table still yields a runnable setup with the
//! scripted engines.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use confab_llm::{ModelParams, SamplingParams};
use confab_tts::VoiceSelection;
use confab_vad::VadConfig;

use crate::orchestrator::OrchestratorConfig;
use crate::session::Mode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub audio: AudioSection,
    pub vad: VadSection,
    pub orchestrator: OrchestratorSection,
    pub chat: ChatSection,
    pub llm: LlmSection,
    pub tts: TtsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AudioSection {
    /// Substring match against input device names; `None` uses the
    /// system default.
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub frame_ms: u32,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            frame_ms: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VadSection {
    pub threshold_dbfs: f32,
    pub onset_ms: u32,
    pub hangover_ms: u32,
}

impl Default for VadSection {
    fn default() -> Self {
        let d = VadConfig::default();
        Self {
            threshold_dbfs: d.threshold_dbfs,
            onset_ms: d.onset_ms,
            hangover_ms: d.hangover_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorSection {
    pub min_utterance_ms: u64,
    pub generation_timeout_ms: u64,
    pub transcription_timeout_ms: u64,
    pub cancel_timeout_ms: u64,
    pub fade_ms: u64,
    pub chunk_queue: usize,
    pub chunk_max_chars: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        let d = OrchestratorConfig::default();
        Self {
            min_utterance_ms: d.min_utterance.as_millis() as u64,
            generation_timeout_ms: d.generation_timeout.as_millis() as u64,
            transcription_timeout_ms: d.transcription_timeout.as_millis() as u64,
            cancel_timeout_ms: d.cancel_timeout.as_millis() as u64,
            fade_ms: d.fade.as_millis() as u64,
            chunk_queue: d.chunk_queue,
            chunk_max_chars: d.chunk_max_chars,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatSection {
    /// `"push_to_talk"` or `"passive"`.
    pub mode: String,
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            mode: "push_to_talk".to_string(),
            system_prompt_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSection {
    pub model_path: Option<PathBuf>,
    pub context_window: u32,
    pub gpu_layers: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repetition_penalty: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for LlmSection {
    fn default() -> Self {
        let s = SamplingParams::default();
        Self {
            model_path: None,
            context_window: 4096,
            gpu_layers: 20,
            temperature: s.temperature,
            top_p: s.top_p,
            top_k: s.top_k,
            repetition_penalty: s.repetition_penalty,
            frequency_penalty: s.frequency_penalty,
            presence_penalty: s.presence_penalty,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TtsSection {
    pub voice: VoiceSelection,
    pub speed: f32,
    pub sample_rate: u32,
}

impl Default for TtsSection {
    fn default() -> Self {
        Self {
            voice: VoiceSelection::default(),
            speed: 0.9,
            sample_rate: 24_000,
        }
    }
}

impl AppConfig {
    /// Loads from `path`, or returns the defaults when the file does
    /// not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.frame_ms == 0 {
            return Err(ConfigError::Invalid("audio.frame_ms must be > 0".into()));
        }
        if self.orchestrator.chunk_queue == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.chunk_queue must be > 0".into(),
            ));
        }
        if !(0.1..=3.0).contains(&self.tts.speed) {
            return Err(ConfigError::Invalid(
                "tts.speed must be within 0.1..=3.0".into(),
            ));
        }
        self.mode()?;
        if let VoiceSelection::Blend { ratio, .. } = &self.tts.voice {
            if !(0.0..=1.0).contains(ratio) {
                return Err(ConfigError::Invalid(
                    "tts.voice blend ratio must be within 0.0..=1.0".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn mode(&self) -> Result<Mode, ConfigError> {
        match self.chat.mode.as_str() {
            "push_to_talk" => Ok(Mode::PushToTalk),
            "passive" => Ok(Mode::Passive),
            other => Err(ConfigError::Invalid(format!(
                "chat.mode must be \"push_to_talk\" or \"passive\", got {other:?}"
            ))),
        }
    }

    /// Reads the system prompt file if one is configured.
    pub fn system_prompt(&self) -> Result<Option<String>, ConfigError> {
        let Some(path) = &self.chat.system_prompt_path else {
            return Ok(None);
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let text = text.trim().to_string();
        Ok((!text.is_empty()).then_some(text))
    }

    pub fn vad_config(&self) -> VadConfig {
        VadConfig {
            threshold_dbfs: self.vad.threshold_dbfs,
            onset_ms: self.vad.onset_ms,
            hangover_ms: self.vad.hangover_ms,
            frame_ms: self.audio.frame_ms,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let o = &self.orchestrator;
        OrchestratorConfig {
            min_utterance: Duration::from_millis(o.min_utterance_ms),
            generation_timeout: Duration::from_millis(o.generation_timeout_ms),
            transcription_timeout: Duration::from_millis(o.transcription_timeout_ms),
            cancel_timeout: Duration::from_millis(o.cancel_timeout_ms),
            fade: Duration::from_millis(o.fade_ms),
            chunk_queue: o.chunk_queue,
            chunk_max_chars: o.chunk_max_chars,
        }
    }

    pub fn sampling_params(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.llm.temperature,
            top_p: self.llm.top_p,
            top_k: self.llm.top_k,
            repetition_penalty: self.llm.repetition_penalty,
            frequency_penalty: self.llm.frequency_penalty,
            presence_penalty: self.llm.presence_penalty,
        }
    }

    pub fn model_params(&self) -> Option<ModelParams> {
        self.llm.model_path.as_ref().map(|path| ModelParams {
            model_path: path.clone(),
            context_window: self.llm.context_window,
            gpu_layers: self.llm.gpu_layers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.mode().unwrap(), Mode::PushToTalk);
    }

    #[test]
    fn parses_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [chat]
            mode = "passive"

            [vad]
            threshold_dbfs = -35.0

            [tts]
            speed = 1.1
            voice = { primary = "af_sarah", secondary = "am_adam", ratio = 0.6 }
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.mode().unwrap(), Mode::Passive);
        assert_eq!(config.vad.threshold_dbfs, -35.0);
        assert_eq!(config.audio.frame_ms, 32);
        assert!(matches!(
            config.tts.voice,
            VoiceSelection::Blend { ratio, .. } if (ratio - 0.6).abs() < f32::EPSILON
        ));
    }

    #[test]
    fn rejects_unknown_mode() {
        let config: AppConfig = toml::from_str("[chat]\nmode = \"always_on\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_blend_ratio() {
        let config: AppConfig = toml::from_str(
            "[tts]\nvoice = { primary = \"a\", secondary = \"b\", ratio = 1.5 }\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.orchestrator.chunk_queue, 2);
    }

    #[test]
    fn system_prompt_trims_and_skips_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "  be brief \n").unwrap();

        let mut config = AppConfig::default();
        config.chat.system_prompt_path = Some(path.clone());
        assert_eq!(config.system_prompt().unwrap().as_deref(), Some("be brief"));

        std::fs::write(&path, "   \n").unwrap();
        assert!(config.system_prompt().unwrap().is_none());
    }
}
