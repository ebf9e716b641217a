use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::feedback::{CrossingCues, PosturalCheck};
use crate::config::ExerciseConfig;
use crate::pose::KeypointIndex;

/// 対応種目
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseVariant {
    #[serde(alias = "Left Dumbbell")]
    LeftCurl,
    #[serde(alias = "Right Dumbbell")]
    RightCurl,
    #[serde(alias = "Lateral Raises")]
    LateralRaise,
    #[serde(alias = "Front Raises")]
    FrontRaise,
    #[serde(alias = "Triceps Kickbacks")]
    TricepsKickback,
}

impl ExerciseVariant {
    pub const ALL: [ExerciseVariant; 5] = [
        Self::LeftCurl,
        Self::RightCurl,
        Self::LateralRaise,
        Self::FrontRaise,
        Self::TricepsKickback,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::LeftCurl => "left_curl",
            Self::RightCurl => "right_curl",
            Self::LateralRaise => "lateral_raise",
            Self::FrontRaise => "front_raise",
            Self::TricepsKickback => "triceps_kickback",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::LeftCurl => "Left Dumbbell",
            Self::RightCurl => "Right Dumbbell",
            Self::LateralRaise => "Lateral Raises",
            Self::FrontRaise => "Front Raises",
            Self::TricepsKickback => "Triceps Kickbacks",
        }
    }

    /// 画面に表示する手順
    pub fn instructions(&self) -> &'static [&'static str] {
        match self {
            Self::LeftCurl => &[
                "Stand straight with dumbbell in left hand",
                "Keep elbow close to your torso",
                "Curl the weight while keeping upper arm stationary",
                "Only forearms should move",
                "Slowly lower back to starting position",
            ],
            Self::RightCurl => &[
                "Stand straight with dumbbell in right hand",
                "Keep elbow close to your torso",
                "Curl the weight while keeping upper arm stationary",
                "Only forearms should move",
                "Slowly lower back to starting position",
            ],
            Self::LateralRaise => &[
                "Stand with dumbbells at sides",
                "Keep slight bend in elbows",
                "Raise arms to shoulder height",
                "Don't raise above shoulders",
                "Lower back slowly",
            ],
            Self::FrontRaise => &[
                "Stand with dumbbells in front of thighs",
                "Keep arms straight",
                "Raise arms to shoulder height",
                "Don't raise above shoulders",
                "Lower back slowly",
            ],
            Self::TricepsKickback => &[
                "Bend at waist with back straight",
                "Keep upper arm parallel to floor",
                "Extend arm backward",
                "Fully straighten elbow",
                "Return to starting position",
            ],
        }
    }
}

impl fmt::Display for ExerciseVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ExerciseVariant {
    type Err = anyhow::Error;

    /// `left_curl` / `left-curl` / `Left Dumbbell` のいずれも受け付ける
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        for variant in Self::ALL {
            if variant.key() == wanted || variant.display_name().to_ascii_lowercase() == wanted {
                return Ok(variant);
            }
        }
        bail!("unknown exercise variant: {:?}", s)
    }
}

/// レップが加算されるタイミング
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepTrigger {
    /// Up→Down（収縮）で加算
    OnContraction,
    /// Down→Up（伸展）で加算
    OnExtension,
}

/// 角度計算に使う3関節。角度の頂点は elbow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Joints {
    pub shoulder: KeypointIndex,
    pub elbow: KeypointIndex,
    pub wrist: KeypointIndex,
}

impl Joints {
    pub const LEFT_ARM: Joints = Joints {
        shoulder: KeypointIndex::LeftShoulder,
        elbow: KeypointIndex::LeftElbow,
        wrist: KeypointIndex::LeftWrist,
    };

    pub const RIGHT_ARM: Joints = Joints {
        shoulder: KeypointIndex::RightShoulder,
        elbow: KeypointIndex::RightElbow,
        wrist: KeypointIndex::RightWrist,
    };

    fn highest_index(&self) -> usize {
        (self.shoulder as usize)
            .max(self.elbow as usize)
            .max(self.wrist as usize)
    }
}

/// 種目ごとの不変設定
#[derive(Debug, Clone, PartialEq)]
pub struct VariantProfile {
    pub variant: ExerciseVariant,
    pub joints: Joints,
    /// この角度を超えたら Down→Up
    pub extended_threshold: f32,
    /// この角度を下回ったら Up→Down
    pub contracted_threshold: f32,
    pub trigger: RepTrigger,
    pub posture: PosturalCheck,
    pub cues: CrossingCues,
    pub min_keypoints: usize,
    pub full_body_keypoints: usize,
}

impl VariantProfile {
    pub fn default_for(variant: ExerciseVariant) -> Self {
        Self::build(variant, &ExerciseConfig::default())
    }

    /// 設定値を反映。閾値が [0, 180] の外、または contracted >= extended ならエラー
    pub fn from_config(variant: ExerciseVariant, config: &ExerciseConfig) -> Result<Self> {
        let profile = Self::build(variant, config);
        profile.validate()?;
        Ok(profile)
    }

    fn build(variant: ExerciseVariant, config: &ExerciseConfig) -> Self {
        use ExerciseVariant::*;

        let (joints, extended, contracted, trigger) = match variant {
            LeftCurl => (
                Joints::LEFT_ARM,
                config.curl_extended,
                config.curl_contracted,
                RepTrigger::OnContraction,
            ),
            RightCurl => (
                Joints::RIGHT_ARM,
                config.curl_extended,
                config.curl_contracted,
                RepTrigger::OnContraction,
            ),
            LateralRaise | FrontRaise => (
                Joints::LEFT_ARM,
                config.raise_extended,
                config.raise_contracted,
                RepTrigger::OnContraction,
            ),
            TricepsKickback => (
                Joints::LEFT_ARM,
                config.kickback_extended,
                config.kickback_contracted,
                RepTrigger::OnExtension,
            ),
        };

        let posture = match variant {
            LeftCurl | RightCurl => PosturalCheck::ElbowDrift {
                max_forward_px: config.elbow_drift_px,
            },
            LateralRaise | FrontRaise => PosturalCheck::WristAboveShoulder {
                max_rise_px: config.wrist_rise_px,
            },
            TricepsKickback => PosturalCheck::UpperArmDrop {
                min_angle_deg: config.upper_arm_min_deg,
            },
        };

        Self {
            variant,
            joints,
            extended_threshold: extended,
            contracted_threshold: contracted,
            trigger,
            posture,
            cues: CrossingCues::for_variant(variant),
            min_keypoints: config.min_keypoints,
            full_body_keypoints: config.full_body_keypoints,
        }
    }

    fn validate(&self) -> Result<()> {
        let range = 0.0..=180.0;
        if !range.contains(&self.extended_threshold)
            || !range.contains(&self.contracted_threshold)
        {
            bail!(
                "{}: thresholds must be within [0, 180] (extended={}, contracted={})",
                self.variant.key(),
                self.extended_threshold,
                self.contracted_threshold
            );
        }
        if self.contracted_threshold >= self.extended_threshold {
            bail!(
                "{}: contracted threshold {} must be below extended threshold {}",
                self.variant.key(),
                self.contracted_threshold,
                self.extended_threshold
            );
        }
        Ok(())
    }

    /// 角度計算に必要なキーポイント数
    pub fn required_keypoints(&self) -> usize {
        self.min_keypoints.max(self.joints.highest_index() + 1)
    }
}
