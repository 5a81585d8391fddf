use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::providers::DEFAULT_MODEL;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub target_lang: String,
    pub model: String,
    pub overlay_text_color: String,
    pub overlay_fill_color: String,
    pub overlay_stroke_color: String,
    pub overlay_font_family: Option<String>,
    pub overlay_font_path: Option<String>,
    pub server_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_lang: "English".to_string(),
            model: DEFAULT_MODEL.to_string(),
            overlay_text_color: "#111111".to_string(),
            overlay_fill_color: "#ffffff".to_string(),
            overlay_stroke_color: "#d0d0d0".to_string(),
            overlay_font_family: None,
            overlay_font_path: None,
            server_addr: "127.0.0.1:11400".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    translate: Option<TranslateSettings>,
    overlay: Option<OverlaySettings>,
    server: Option<ServerSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslateSettings {
    lang: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    text_color: Option<String>,
    fill_color: Option<String>,
    stroke_color: Option<String>,
    font_family: Option<String>,
    font_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
}

/// Builtin defaults, then `./settings.toml`, `./settings.local.toml`, the same
/// two files under `~/.llm-overlay-translator`, then `extra_path`. Later files
/// override earlier ones key by key.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let builtin: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse builtin settings")?;
    settings.merge(builtin);
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(translate) = incoming.translate {
            merge_string(&mut self.target_lang, translate.lang);
            merge_string(&mut self.model, translate.model);
        }
        if let Some(overlay) = incoming.overlay {
            merge_string(&mut self.overlay_text_color, overlay.text_color);
            merge_string(&mut self.overlay_fill_color, overlay.fill_color);
            merge_string(&mut self.overlay_stroke_color, overlay.stroke_color);
            if let Some(family) = overlay.font_family.filter(|value| !value.trim().is_empty()) {
                self.overlay_font_family = Some(family);
            }
            if let Some(path) = overlay.font_path.filter(|value| !value.trim().is_empty()) {
                self.overlay_font_path = Some(path);
            }
        }
        if let Some(server) = incoming.server {
            merge_string(&mut self.server_addr, server.addr);
        }
    }
}

fn merge_string(target: &mut String, incoming: Option<String>) {
    if let Some(value) = incoming {
        if !value.trim().is_empty() {
            *target = value;
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".llm-overlay-translator"))
        }
    })
}
