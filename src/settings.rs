//! Application settings — a plain key=value `.cfg` file in the platform
//! config directory. No serde here; the format stays hand-editable and a
//! malformed line degrades to its default instead of failing the load.

use std::path::PathBuf;

/// Default REST endpoint for the generation API.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
/// Model used for grid/panel image generation.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
/// Model used for prompt enhancement and camera captions.
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
/// Model used for asset analysis (vision + text).
pub const DEFAULT_VISION_MODEL: &str = "gemini-3-pro-preview";

#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    /// API key for the generation service. Empty = fall back to the
    /// `GEMINI_API_KEY` environment variable at request time.
    pub api_key: String,
    /// Base URL of the generation service (no trailing slash).
    pub api_base: String,
    pub image_model: String,
    pub text_model: String,
    pub vision_model: String,
    /// Read timeout for generation requests, in seconds.
    pub request_timeout_secs: u64,
    /// Ask before closing the window.
    pub confirm_on_exit: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            request_timeout_secs: 120,
            confirm_on_exit: true,
        }
    }
}

impl AppSettings {
    /// Path to the settings file.
    /// Linux:   `$XDG_CONFIG_HOME/cineboard/cineboard_settings.cfg` (or ~/.config)
    /// Windows: `%APPDATA%\CineBoard\cineboard_settings.cfg`
    /// macOS:   `~/Library/Application Support/CineBoard/cineboard_settings.cfg`
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("cineboard");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("cineboard_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            let config_dir = PathBuf::from(appdata).join("CineBoard");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("cineboard_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("CineBoard");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("cineboard_settings.cfg"));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("cineboard_settings.cfg")))
        }
    }

    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_cfg(&text),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) {
        let Some(path) = Self::settings_path() else {
            return;
        };
        if let Err(e) = std::fs::write(&path, self.to_cfg()) {
            crate::log_warn!("failed to save settings to {}: {}", path.display(), e);
        }
    }

    fn to_cfg(&self) -> String {
        let mut out = String::new();
        out.push_str("# CineBoard settings\n");
        out.push_str(&format!("api_key={}\n", self.api_key));
        out.push_str(&format!("api_base={}\n", self.api_base));
        out.push_str(&format!("image_model={}\n", self.image_model));
        out.push_str(&format!("text_model={}\n", self.text_model));
        out.push_str(&format!("vision_model={}\n", self.vision_model));
        out.push_str(&format!(
            "request_timeout_secs={}\n",
            self.request_timeout_secs
        ));
        out.push_str(&format!("confirm_on_exit={}\n", self.confirm_on_exit));
        out
    }

    fn from_cfg(text: &str) -> Self {
        let mut s = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "api_key" => s.api_key = value.to_string(),
                "api_base" => {
                    if !value.is_empty() {
                        s.api_base = value.trim_end_matches('/').to_string();
                    }
                }
                "image_model" => {
                    if !value.is_empty() {
                        s.image_model = value.to_string();
                    }
                }
                "text_model" => {
                    if !value.is_empty() {
                        s.text_model = value.to_string();
                    }
                }
                "vision_model" => {
                    if !value.is_empty() {
                        s.vision_model = value.to_string();
                    }
                }
                "request_timeout_secs" => {
                    if let Ok(v) = value.parse() {
                        s.request_timeout_secs = v;
                    }
                }
                "confirm_on_exit" => s.confirm_on_exit = value == "true",
                _ => {}
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cfg_round_trip() {
        let mut s = AppSettings::default();
        s.api_key = "abc123".to_string();
        s.request_timeout_secs = 45;
        s.confirm_on_exit = false;
        let parsed = AppSettings::from_cfg(&s.to_cfg());
        assert_eq!(parsed, s);
    }

    #[test]
    fn malformed_lines_fall_back_to_defaults() {
        let parsed = AppSettings::from_cfg("garbage\nrequest_timeout_secs=not_a_number\n# note\n");
        assert_eq!(parsed, AppSettings::default());
    }

    #[test]
    fn empty_base_url_keeps_default() {
        let parsed = AppSettings::from_cfg("api_base=\n");
        assert_eq!(parsed.api_base, DEFAULT_API_BASE);
    }
}
