use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub console_log_level: String,
    pub logs_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub download_dir: PathBuf,
    pub gemini_api_base: String,
    pub gemini_image_model: String,
    pub gemini_request_timeout_seconds: u64,
    pub training_tick_ms: u64,
    pub training_completion_delay_ms: u64,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Invalid {} value '{}'; using {}", name, value, default);
                default
            }
        },
        Err(_) => default,
    }
}

fn normalize_api_base(value: String) -> String {
    value.trim_end_matches('/').to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let gemini_api_base = normalize_api_base(env_string(
            "GEMINI_API_BASE",
            "https://generativelanguage.googleapis.com/v1beta",
        ));
        if !gemini_api_base.starts_with("http://") && !gemini_api_base.starts_with("https://") {
            return Err(anyhow!(
                "GEMINI_API_BASE must be an http(s) URL, got '{}'",
                gemini_api_base
            ));
        }

        let training_tick_ms = env_u64("TRAINING_TICK_MS", 80);
        if training_tick_ms == 0 {
            return Err(anyhow!("TRAINING_TICK_MS must be greater than zero"));
        }

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            console_log_level: env_string("CONSOLE_LOG_LEVEL", "warn").to_lowercase(),
            logs_dir: PathBuf::from(env_string("LOGS_DIR", "logs")),
            storage_dir: PathBuf::from(env_string("NANATWIN_STORAGE_DIR", ".nanatwin")),
            download_dir: PathBuf::from(env_string("DOWNLOAD_DIR", "downloads")),
            gemini_api_base,
            gemini_image_model: env_string("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image"),
            gemini_request_timeout_seconds: env_u64("GEMINI_REQUEST_TIMEOUT_SECONDS", 120),
            training_tick_ms,
            training_completion_delay_ms: env_u64("TRAINING_COMPLETION_DELAY_MS", 1500),
        })
    }

    pub fn gemini_request_timeout(&self) -> Duration {
        Duration::from_secs(self.gemini_request_timeout_seconds.max(1))
    }

    pub fn training_tick(&self) -> Duration {
        Duration::from_millis(self.training_tick_ms)
    }

    pub fn training_completion_delay(&self) -> Duration {
        Duration::from_millis(self.training_completion_delay_ms)
    }
}

pub const CREDENTIAL_CONSENT_TEXT: &str = "Your API key is stored only on this machine and is sent only to the Google AI API when you generate images. Usage is billed to your own Google account.";

pub const HELP_TEXT: &str = r#"Commands available on every step:
  help                      Show this help
  reset | new               Start a new character (clears the session)
  key                       Forget the stored API key and enter a new one
  logs [n]                  Show the last n lines of the application log
  quit | exit               Leave NanaTwin

Step 1 - Concept:
  description <text>        Describe the character's appearance and personality
  trigger <word>            Unique trigger word used to refer to the character
  next                      Continue to the image upload

Step 2 - Upload:
  add <path> [path...]      Add reference images (5 to 15, png/jpeg/webp/heic)
  remove <id>               Remove a reference image
  list                      List the uploaded reference images
  next                      Start training

Step 4 - Prompting:
  prompt <text>             Set the main prompt
  options [field]           List style options (type, framing, camera, lens, pose, expression)
  set <field> <option id>   Choose a style option ("none" to leave it unspecified)
  generate [prompt]         Generate an image with the current settings
  gallery                   List generated images, newest first
  download <n|id> [dir]     Save a generated image to disk"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_strings_fall_back_to_the_default() {
        env::set_var("NANATWIN_TEST_BLANK_STRING", "   ");
        assert_eq!(env_string("NANATWIN_TEST_BLANK_STRING", "fallback"), "fallback");
        env::set_var("NANATWIN_TEST_PADDED_STRING", "  value ");
        assert_eq!(env_string("NANATWIN_TEST_PADDED_STRING", "fallback"), "value");
    }

    #[test]
    fn invalid_numbers_fall_back_to_the_default() {
        env::set_var("NANATWIN_TEST_BAD_NUMBER", "eighty");
        assert_eq!(env_u64("NANATWIN_TEST_BAD_NUMBER", 80), 80);
        env::set_var("NANATWIN_TEST_GOOD_NUMBER", " 25 ");
        assert_eq!(env_u64("NANATWIN_TEST_GOOD_NUMBER", 80), 25);
        assert_eq!(env_u64("NANATWIN_TEST_MISSING_NUMBER", 7), 7);
    }

    #[test]
    fn api_base_loses_trailing_slashes() {
        assert_eq!(
            normalize_api_base("https://example.test/v1beta//".to_string()),
            "https://example.test/v1beta"
        );
    }
}
