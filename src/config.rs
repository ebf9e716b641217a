use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::exercise::ExerciseVariant;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub exercise: ExerciseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 起動時の種目
    #[serde(default = "default_variant")]
    pub variant: ExerciseVariant,
    /// tracing の EnvFilter（RUST_LOG があればそちらを優先）
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExerciseConfig {
    /// カール: 伸展とみなす角度（度）
    #[serde(default = "default_extended")]
    pub curl_extended: f32,
    /// カール: 収縮とみなす角度（度）
    #[serde(default = "default_curl_contracted")]
    pub curl_contracted: f32,
    /// レイズ（サイド/フロント）: 伸展角度
    #[serde(default = "default_extended")]
    pub raise_extended: f32,
    /// レイズ: 収縮角度
    #[serde(default = "default_short_contracted")]
    pub raise_contracted: f32,
    /// キックバック: 伸展角度
    #[serde(default = "default_extended")]
    pub kickback_extended: f32,
    /// キックバック: 収縮角度
    #[serde(default = "default_short_contracted")]
    pub kickback_contracted: f32,
    /// 肘が肩より前に出てよい距離（ピクセル）
    #[serde(default = "default_elbow_drift_px")]
    pub elbow_drift_px: f32,
    /// 手首が肩より上がってよい距離（ピクセル）
    #[serde(default = "default_wrist_rise_px")]
    pub wrist_rise_px: f32,
    /// キックバック: 鉛直下向きからの上腕の最小角度（度）
    #[serde(default = "default_upper_arm_min_deg")]
    pub upper_arm_min_deg: f32,
    /// 角度計算に必要な最小キーポイント数
    #[serde(default = "default_min_keypoints")]
    pub min_keypoints: usize,
    /// 全身が映っているとみなすキーポイント数
    #[serde(default = "default_full_body_keypoints")]
    pub full_body_keypoints: usize,
}

fn default_variant() -> ExerciseVariant { ExerciseVariant::LeftCurl }
fn default_log_filter() -> String { "rep_tracker=info".to_string() }
fn default_extended() -> f32 { 160.0 }
fn default_curl_contracted() -> f32 { 60.0 }
fn default_short_contracted() -> f32 { 30.0 }
fn default_elbow_drift_px() -> f32 { 30.0 }
fn default_wrist_rise_px() -> f32 { 50.0 }
fn default_upper_arm_min_deg() -> f32 { 45.0 }
fn default_min_keypoints() -> usize { 10 }
fn default_full_body_keypoints() -> usize { 17 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            variant: default_variant(),
            log_filter: default_log_filter(),
        }
    }
}

impl Default for ExerciseConfig {
    fn default() -> Self {
        Self {
            curl_extended: default_extended(),
            curl_contracted: default_curl_contracted(),
            raise_extended: default_extended(),
            raise_contracted: default_short_contracted(),
            kickback_extended: default_extended(),
            kickback_contracted: default_short_contracted(),
            elbow_drift_px: default_elbow_drift_px(),
            wrist_rise_px: default_wrist_rise_px(),
            upper_arm_min_deg: default_upper_arm_min_deg(),
            min_keypoints: default_min_keypoints(),
            full_body_keypoints: default_full_body_keypoints(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// ファイルが無ければデフォルト。存在するが読めない・不正な場合はエラー
    pub fn load_if_present<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("{} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
