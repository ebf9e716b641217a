//! フレームごとのフォームフィードバック
//!
//! フェーズとカウンタの更新とは独立。フレームと直前に適用された閾値通過だけを読み、
//! セッションのフェーズは変えない。

use serde::Serialize;

use super::angle::keypoint_angle;
use super::session::Crossing;
use super::variant::{ExerciseVariant, Joints, VariantProfile};
use crate::pose::{Keypoint, KeypointFrame};

pub const WHOLE_BODY_NOT_VISIBLE: &str = "Make sure your whole body is visible";
pub const JOINTS_NOT_DETECTED: &str = "Shoulder, elbow or wrist not detected";
pub const NO_PERSON_DETECTED: &str = "No person detected";

/// キックバック判定で肩の真下に置く参照点までの距離（ピクセル）
const VERTICAL_REFERENCE_PX: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Good,
    Bad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Feedback {
    pub message: &'static str,
    pub severity: Severity,
}

impl Feedback {
    pub fn good(message: &'static str) -> Self {
        Self { message, severity: Severity::Good }
    }

    pub fn bad(message: &'static str) -> Self {
        Self { message, severity: Severity::Bad }
    }

    pub fn is_bad(&self) -> bool {
        self.severity == Severity::Bad
    }
}

/// 角度とは独立した姿勢チェック
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PosturalCheck {
    /// 肘が肩より max_forward_px 以上前（画像上で左）に出ている
    ElbowDrift { max_forward_px: f32 },
    /// 手首が肩より max_rise_px 以上高い
    WristAboveShoulder { max_rise_px: f32 },
    /// 上腕が鉛直下向きから min_angle_deg 未満（床と平行になっていない）
    UpperArmDrop { min_angle_deg: f32 },
}

impl PosturalCheck {
    /// 違反があれば Bad フィードバック
    pub fn evaluate(&self, frame: &KeypointFrame, joints: &Joints) -> Option<Feedback> {
        let shoulder = frame.get(joints.shoulder)?;
        let elbow = frame.get(joints.elbow)?;

        match *self {
            Self::ElbowDrift { max_forward_px } => {
                (elbow.x < shoulder.x - max_forward_px)
                    .then(|| Feedback::bad("Keep your elbow close to your body"))
            }
            Self::WristAboveShoulder { max_rise_px } => {
                let wrist = frame.get(joints.wrist)?;
                (wrist.y < shoulder.y - max_rise_px)
                    .then(|| Feedback::bad("Don't raise above shoulder level"))
            }
            Self::UpperArmDrop { min_angle_deg } => {
                let below = Keypoint::at(shoulder.x, shoulder.y + VERTICAL_REFERENCE_PX);
                // 上腕長が0なら判定しない
                let upper_arm = keypoint_angle(&below, shoulder, elbow)?;
                (upper_arm < min_angle_deg)
                    .then(|| Feedback::bad("Keep upper arm parallel to floor"))
            }
        }
    }
}

/// 閾値を跨いだフレームで出す Good メッセージ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossingCues {
    pub extension: &'static str,
    pub contraction: &'static str,
}

impl CrossingCues {
    pub fn for_variant(variant: ExerciseVariant) -> Self {
        match variant {
            ExerciseVariant::LeftCurl | ExerciseVariant::RightCurl => Self {
                extension: "Good form! Fully extend your arm",
                contraction: "Good contraction! Now lower slowly",
            },
            ExerciseVariant::LateralRaise | ExerciseVariant::FrontRaise => Self {
                extension: "Good starting position",
                contraction: "Perfect! Arms parallel to floor",
            },
            ExerciseVariant::TricepsKickback => Self {
                extension: "Good extension! Now return slowly",
                contraction: "Good starting position",
            },
        }
    }

    pub fn message(&self, crossing: Crossing) -> &'static str {
        match crossing {
            Crossing::Extension => self.extension,
            Crossing::Contraction => self.contraction,
        }
    }
}

/// 全身チェック → 姿勢チェック → 閾値通過メッセージ の順で評価
pub fn assess(
    profile: &VariantProfile,
    frame: &KeypointFrame,
    crossing: Option<Crossing>,
) -> Option<Feedback> {
    if !frame.covers(profile.full_body_keypoints) {
        return Some(Feedback::bad(WHOLE_BODY_NOT_VISIBLE));
    }
    if let Some(feedback) = profile.posture.evaluate(frame, &profile.joints) {
        return Some(feedback);
    }
    crossing.map(|c| Feedback::good(profile.cues.message(c)))
}
