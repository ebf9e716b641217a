use anyhow::Result;
use serde::Serialize;
use tracing::{debug, trace};

use super::angle::keypoint_angle;
use super::feedback::{self, Feedback, JOINTS_NOT_DETECTED, NO_PERSON_DETECTED};
use super::variant::{ExerciseVariant, RepTrigger, VariantProfile};
use crate::config::ExerciseConfig;
use crate::pose::KeypointFrame;

/// 伸展/収縮サイクル上の位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// 伸展（初期状態）
    Up,
    /// 収縮
    Down,
}

/// 1フレームで適用された閾値通過
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Crossing {
    /// Down→Up
    Extension,
    /// Up→Down
    Contraction,
}

/// 直近フレームの処理結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameStatus {
    /// まだフレームを受け取っていない
    Idle,
    Tracked { crossing: Option<Crossing> },
    NoDetection,
    InsufficientKeypoints,
    /// 肢セグメント長が0で角度が決まらない
    DegenerateGeometry,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionState {
    pub phase: Phase,
    pub rep_count: u32,
    /// 直近の有効な関節角度（度）
    pub last_angle: f32,
    pub feedback: Option<Feedback>,
    pub status: FrameStatus,
}

impl SessionState {
    pub fn initial() -> Self {
        Self {
            phase: Phase::Up,
            rep_count: 0,
            last_angle: 0.0,
            feedback: None,
            status: FrameStatus::Idle,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initial()
    }
}

/// 1フレーム分の状態更新
///
/// 検出なし・キーポイント不足・角度不定のフレームでは phase / rep_count /
/// last_angle を保持し、フィードバックだけを更新する。
pub fn step(
    profile: &VariantProfile,
    state: SessionState,
    frame: Option<&KeypointFrame>,
) -> SessionState {
    let Some(frame) = frame else {
        trace!(variant = profile.variant.key(), "no detection");
        return SessionState {
            feedback: Some(Feedback::bad(NO_PERSON_DETECTED)),
            status: FrameStatus::NoDetection,
            ..state
        };
    };

    let joints = &profile.joints;
    let points = match (
        frame.get(joints.shoulder),
        frame.get(joints.elbow),
        frame.get(joints.wrist),
    ) {
        (Some(shoulder), Some(elbow), Some(wrist))
            if frame.covers(profile.required_keypoints()) =>
        {
            Some((shoulder, elbow, wrist))
        }
        _ => None,
    };
    let Some((shoulder, elbow, wrist)) = points else {
        trace!(variant = profile.variant.key(), keypoints = frame.len(), "insufficient keypoints");
        return SessionState {
            feedback: Some(Feedback::bad(JOINTS_NOT_DETECTED)),
            status: FrameStatus::InsufficientKeypoints,
            ..state
        };
    };

    let Some(angle) = keypoint_angle(shoulder, elbow, wrist) else {
        trace!(variant = profile.variant.key(), "degenerate limb geometry");
        return SessionState {
            feedback: feedback::assess(profile, frame, None),
            status: FrameStatus::DegenerateGeometry,
            ..state
        };
    };

    // phase ごとに評価するので1フレームで起きる遷移は高々1回
    let crossing = match state.phase {
        Phase::Down if angle > profile.extended_threshold => Some(Crossing::Extension),
        Phase::Up if angle < profile.contracted_threshold => Some(Crossing::Contraction),
        _ => None,
    };

    let mut next = SessionState {
        last_angle: angle,
        feedback: feedback::assess(profile, frame, crossing),
        status: FrameStatus::Tracked { crossing },
        ..state
    };

    if let Some(crossing) = crossing {
        next.phase = match crossing {
            Crossing::Extension => Phase::Up,
            Crossing::Contraction => Phase::Down,
        };
        let completes_rep = matches!(
            (profile.trigger, crossing),
            (RepTrigger::OnContraction, Crossing::Contraction)
                | (RepTrigger::OnExtension, Crossing::Extension)
        );
        if completes_rep {
            next.rep_count = state.rep_count.saturating_add(1);
        }
        debug!(
            variant = profile.variant.key(),
            ?crossing,
            angle,
            reps = next.rep_count,
            "phase {:?} -> {:?}",
            state.phase,
            next.phase
        );
    }

    next
}

/// 1ワークアウト分のセッション
///
/// 種目は作成時に固定。種目を変えるときは新しいセッションを作る。
/// 更新は呼び出し側で直列化すること（単一ライター）。
pub struct ExerciseSession {
    profile: VariantProfile,
    state: SessionState,
}

impl ExerciseSession {
    /// 設定から作成。不正な閾値はここでエラー
    pub fn new(variant: ExerciseVariant, config: &ExerciseConfig) -> Result<Self> {
        Ok(Self::from_profile(VariantProfile::from_config(variant, config)?))
    }

    pub fn with_defaults(variant: ExerciseVariant) -> Self {
        Self::from_profile(VariantProfile::default_for(variant))
    }

    pub fn from_profile(profile: VariantProfile) -> Self {
        Self {
            profile,
            state: SessionState::initial(),
        }
    }

    /// フレームを1つ処理して最新の状態を返す
    pub fn update(&mut self, frame: Option<&KeypointFrame>) -> &SessionState {
        self.state = step(&self.profile, self.state, frame);
        &self.state
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn variant(&self) -> ExerciseVariant {
        self.profile.variant
    }

    pub fn profile(&self) -> &VariantProfile {
        &self.profile
    }

    pub fn reset(&mut self) {
        debug!(variant = self.profile.variant.key(), reps = self.state.rep_count, "session reset");
        self.state = SessionState::initial();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercise::feedback::{Severity, WHOLE_BODY_NOT_VISIBLE};
    use crate::exercise::variant::Joints;
    use crate::pose::{Keypoint, KeypointIndex};
    use proptest::prelude::*;

    const UPPER_ARM_PX: f32 = 100.0;
    const FOREARM_PX: f32 = 100.0;

    /// 肘角度 angle_deg の腕を置いた17点フレーム
    ///
    /// upper は肩→肘の単位ベクトル。前腕は肘→肩の向きを angle_deg 回転させた方向。
    fn arm_frame(joints: Joints, upper: (f32, f32), angle_deg: f32) -> KeypointFrame {
        let shoulder = (300.0, 100.0);
        let elbow = (shoulder.0 + upper.0 * UPPER_ARM_PX, shoulder.1 + upper.1 * UPPER_ARM_PX);
        let (sin, cos) = angle_deg.to_radians().sin_cos();
        let back = (-upper.0, -upper.1);
        let forearm = (back.0 * cos - back.1 * sin, back.0 * sin + back.1 * cos);
        let wrist = (elbow.0 + forearm.0 * FOREARM_PX, elbow.1 + forearm.1 * FOREARM_PX);

        let mut keypoints: Vec<Keypoint> = (0..KeypointIndex::COUNT)
            .map(|i| Keypoint::at(100.0 + i as f32, 400.0))
            .collect();
        keypoints[joints.shoulder as usize] = Keypoint::at(shoulder.0, shoulder.1);
        keypoints[joints.elbow as usize] = Keypoint::at(elbow.0, elbow.1);
        keypoints[joints.wrist as usize] = Keypoint::at(wrist.0, wrist.1);
        KeypointFrame::new(keypoints)
    }

    /// 上腕を真下に下ろした腕（カール・レイズ用）
    fn hanging_arm(variant: ExerciseVariant, angle_deg: f32) -> KeypointFrame {
        let joints = VariantProfile::default_for(variant).joints;
        arm_frame(joints, (0.0, 1.0), angle_deg)
    }

    /// 上腕を水平に構えた腕（キックバック用）
    fn horizontal_arm(angle_deg: f32) -> KeypointFrame {
        arm_frame(Joints::LEFT_ARM, (1.0, 0.0), angle_deg)
    }

    #[test]
    fn test_arm_frame_angle() {
        let frame = hanging_arm(ExerciseVariant::LeftCurl, 45.0);
        let angle = keypoint_angle(
            frame.get(KeypointIndex::LeftShoulder).unwrap(),
            frame.get(KeypointIndex::LeftElbow).unwrap(),
            frame.get(KeypointIndex::LeftWrist).unwrap(),
        )
        .unwrap();
        assert!((angle - 45.0).abs() < 0.01);
    }

    #[test]
    fn test_initial_state() {
        let session = ExerciseSession::with_defaults(ExerciseVariant::LeftCurl);
        let state = session.state();
        assert_eq!(state.phase, Phase::Up);
        assert_eq!(state.rep_count, 0);
        assert_eq!(state.last_angle, 0.0);
        assert_eq!(state.feedback, None);
        assert_eq!(state.status, FrameStatus::Idle);
    }

    #[test]
    fn test_left_curl_full_rep() {
        let mut session = ExerciseSession::with_defaults(ExerciseVariant::LeftCurl);

        let state = *session.update(Some(&hanging_arm(ExerciseVariant::LeftCurl, 170.0)));
        assert_eq!(state.phase, Phase::Up);
        assert_eq!(state.rep_count, 0);
        assert!((state.last_angle - 170.0).abs() < 0.01);
        assert_eq!(state.feedback, None);

        let state = *session.update(Some(&hanging_arm(ExerciseVariant::LeftCurl, 45.0)));
        assert_eq!(state.phase, Phase::Down);
        assert_eq!(state.rep_count, 1);
        assert_eq!(state.status, FrameStatus::Tracked { crossing: Some(Crossing::Contraction) });
        assert_eq!(state.feedback, Some(Feedback::good("Good contraction! Now lower slowly")));

        let state = *session.update(Some(&hanging_arm(ExerciseVariant::LeftCurl, 170.0)));
        assert_eq!(state.phase, Phase::Up);
        assert_eq!(state.rep_count, 1);
        assert_eq!(state.feedback, Some(Feedback::good("Good form! Fully extend your arm")));
    }

    #[test]
    fn test_right_curl_uses_right_arm() {
        let mut session = ExerciseSession::with_defaults(ExerciseVariant::RightCurl);
        // 左腕だけ曲げても数えない
        let left_bent = hanging_arm(ExerciseVariant::LeftCurl, 45.0);
        let state = *session.update(Some(&left_bent));
        assert_eq!(state.rep_count, 0);

        let state = *session.update(Some(&hanging_arm(ExerciseVariant::RightCurl, 45.0)));
        assert_eq!(state.phase, Phase::Down);
        assert_eq!(state.rep_count, 1);
    }

    #[test]
    fn test_contraction_without_extension_counts_once() {
        let mut session = ExerciseSession::with_defaults(ExerciseVariant::LeftCurl);
        for _ in 0..5 {
            session.update(Some(&hanging_arm(ExerciseVariant::LeftCurl, 40.0)));
        }
        assert_eq!(session.state().rep_count, 1);
        // 中間角度では Up に戻らない
        session.update(Some(&hanging_arm(ExerciseVariant::LeftCurl, 120.0)));
        session.update(Some(&hanging_arm(ExerciseVariant::LeftCurl, 40.0)));
        assert_eq!(session.state().rep_count, 1);
        assert_eq!(session.state().phase, Phase::Down);
    }

    #[test]
    fn test_lateral_raise_threshold() {
        let mut session = ExerciseSession::with_defaults(ExerciseVariant::LateralRaise);
        // カールの閾値(60)では数えない
        let state = *session.update(Some(&hanging_arm(ExerciseVariant::LateralRaise, 45.0)));
        assert_eq!(state.rep_count, 0);
        assert_eq!(state.phase, Phase::Up);

        let state = *session.update(Some(&hanging_arm(ExerciseVariant::LateralRaise, 20.0)));
        assert_eq!(state.rep_count, 1);
        assert_eq!(state.feedback, Some(Feedback::good("Perfect! Arms parallel to floor")));
    }

    #[test]
    fn test_triceps_kickback_inverted_polarity() {
        let mut session = ExerciseSession::with_defaults(ExerciseVariant::TricepsKickback);

        let state = *session.update(Some(&horizontal_arm(20.0)));
        assert_eq!(state.phase, Phase::Down);
        assert_eq!(state.rep_count, 0);
        assert_eq!(state.feedback, Some(Feedback::good("Good starting position")));

        let state = *session.update(Some(&horizontal_arm(170.0)));
        assert_eq!(state.phase, Phase::Up);
        assert_eq!(state.rep_count, 1);
        assert_eq!(state.feedback, Some(Feedback::good("Good extension! Now return slowly")));
    }

    #[test]
    fn test_kickback_upper_arm_warning() {
        let mut session = ExerciseSession::with_defaults(ExerciseVariant::TricepsKickback);
        let state = *session.update(Some(&hanging_arm(ExerciseVariant::TricepsKickback, 20.0)));
        // 姿勢警告が出ても遷移は進む
        assert_eq!(state.phase, Phase::Down);
        assert_eq!(state.feedback, Some(Feedback::bad("Keep upper arm parallel to floor")));
    }

    #[test]
    fn test_degraded_detection_holds_state() {
        let mut session = ExerciseSession::with_defaults(ExerciseVariant::LeftCurl);
        session.update(Some(&hanging_arm(ExerciseVariant::LeftCurl, 45.0)));
        let before = *session.state();

        let partial = hanging_arm(ExerciseVariant::LeftCurl, 170.0).truncated(5);
        let state = *session.update(Some(&partial));
        assert_eq!(state.phase, before.phase);
        assert_eq!(state.rep_count, before.rep_count);
        assert_eq!(state.last_angle, before.last_angle);
        assert_eq!(state.status, FrameStatus::InsufficientKeypoints);
        let feedback = state.feedback.unwrap();
        assert_eq!(feedback.severity, Severity::Bad);
        assert_eq!(feedback.message, JOINTS_NOT_DETECTED);
    }

    #[test]
    fn test_min_keypoints_floor() {
        // 左腕(5,7,9)は揃っているが 10 点未満
        let mut session = ExerciseSession::with_defaults(ExerciseVariant::LeftCurl);
        let frame = hanging_arm(ExerciseVariant::LeftCurl, 45.0)
            .truncated(KeypointIndex::LeftWrist as usize + 1);
        assert_eq!(frame.len(), 10);
        let state = *session.update(Some(&frame));
        assert_eq!(state.rep_count, 1);

        let mut session = ExerciseSession::with_defaults(ExerciseVariant::RightCurl);
        let frame = hanging_arm(ExerciseVariant::RightCurl, 45.0).truncated(10);
        let state = *session.update(Some(&frame));
        assert_eq!(state.status, FrameStatus::InsufficientKeypoints);
        assert_eq!(state.rep_count, 0);
    }

    #[test]
    fn test_partial_body_still_counts() {
        let mut session = ExerciseSession::with_defaults(ExerciseVariant::LeftCurl);
        let frame = hanging_arm(ExerciseVariant::LeftCurl, 45.0).truncated(12);
        let state = *session.update(Some(&frame));
        assert_eq!(state.rep_count, 1);
        assert_eq!(state.phase, Phase::Down);
        assert_eq!(state.feedback, Some(Feedback::bad(WHOLE_BODY_NOT_VISIBLE)));
    }

    #[test]
    fn test_no_detection_holds_state() {
        let mut session = ExerciseSession::with_defaults(ExerciseVariant::LeftCurl);
        session.update(Some(&hanging_arm(ExerciseVariant::LeftCurl, 45.0)));
        let state = *session.update(None);
        assert_eq!(state.phase, Phase::Down);
        assert_eq!(state.rep_count, 1);
        assert_eq!(state.status, FrameStatus::NoDetection);
        assert_eq!(state.feedback, Some(Feedback::bad(NO_PERSON_DETECTED)));
    }

    #[test]
    fn test_postural_override() {
        let mut session = ExerciseSession::with_defaults(ExerciseVariant::LeftCurl);
        let mut frame = hanging_arm(ExerciseVariant::LeftCurl, 45.0);
        // 肘と手首を肩より 40px 前に出す
        let mut keypoints = frame.keypoints().to_vec();
        for idx in [KeypointIndex::LeftElbow, KeypointIndex::LeftWrist] {
            keypoints[idx as usize].x -= 40.0;
        }
        frame = KeypointFrame::new(keypoints);

        let state = *session.update(Some(&frame));
        assert_eq!(state.phase, Phase::Down);
        assert_eq!(state.rep_count, 1);
        assert_eq!(state.feedback, Some(Feedback::bad("Keep your elbow close to your body")));
    }

    #[test]
    fn test_degenerate_geometry_skips_transition() {
        let mut session = ExerciseSession::with_defaults(ExerciseVariant::LeftCurl);
        session.update(Some(&hanging_arm(ExerciseVariant::LeftCurl, 170.0)));

        let mut keypoints = hanging_arm(ExerciseVariant::LeftCurl, 45.0).keypoints().to_vec();
        let shoulder = keypoints[KeypointIndex::LeftShoulder as usize];
        keypoints[KeypointIndex::LeftElbow as usize] = shoulder;
        let state = *session.update(Some(&KeypointFrame::new(keypoints)));

        assert_eq!(state.status, FrameStatus::DegenerateGeometry);
        assert_eq!(state.phase, Phase::Up);
        assert_eq!(state.rep_count, 0);
        assert!((state.last_angle - 170.0).abs() < 0.01);
        assert_eq!(state.feedback, None);
    }

    #[test]
    fn test_infinite_coordinate_is_degenerate() {
        let mut session = ExerciseSession::with_defaults(ExerciseVariant::LeftCurl);
        session.update(Some(&hanging_arm(ExerciseVariant::LeftCurl, 170.0)));

        let mut keypoints = hanging_arm(ExerciseVariant::LeftCurl, 45.0).keypoints().to_vec();
        keypoints[KeypointIndex::LeftShoulder as usize] = Keypoint::at(f32::INFINITY, 0.0);
        keypoints[KeypointIndex::LeftElbow as usize] = Keypoint::at(0.0, 100.0);
        keypoints[KeypointIndex::LeftWrist as usize] = Keypoint::at(0.0, 200.0);
        let state = *session.update(Some(&KeypointFrame::new(keypoints)));

        assert_eq!(state.status, FrameStatus::DegenerateGeometry);
        assert_eq!(state.phase, Phase::Up);
        assert_eq!(state.rep_count, 0);
        assert!((state.last_angle - 170.0).abs() < 0.01);
    }

    #[test]
    fn test_reset() {
        let mut session = ExerciseSession::with_defaults(ExerciseVariant::FrontRaise);
        session.update(Some(&hanging_arm(ExerciseVariant::FrontRaise, 20.0)));
        assert_eq!(session.state().rep_count, 1);

        session.reset();
        assert_eq!(*session.state(), SessionState::initial());
        session.reset();
        assert_eq!(*session.state(), SessionState::initial());
        assert_eq!(session.variant(), ExerciseVariant::FrontRaise);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ExerciseConfig {
            raise_contracted: 170.0,
            ..ExerciseConfig::default()
        };
        assert!(ExerciseSession::new(ExerciseVariant::LateralRaise, &config).is_err());
        assert!(ExerciseSession::new(ExerciseVariant::LeftCurl, &config).is_ok());
    }

    #[test]
    fn test_step_is_pure() {
        let profile = VariantProfile::default_for(ExerciseVariant::LeftCurl);
        let frame = hanging_arm(ExerciseVariant::LeftCurl, 45.0);
        let initial = SessionState::initial();
        let a = step(&profile, initial, Some(&frame));
        let b = step(&profile, initial, Some(&frame));
        assert_eq!(a, b);
        assert_eq!(initial, SessionState::initial());
    }

    fn frame_event() -> impl Strategy<Value = Option<(f32, bool)>> {
        // None = 検出なし, (角度, 全身が映っているか)
        prop::option::weighted(0.9, (0.0f32..=180.0, any::<bool>()))
    }

    proptest! {
        #[test]
        fn prop_rep_count_monotonic(
            variant_idx in 0usize..ExerciseVariant::ALL.len(),
            events in prop::collection::vec(frame_event(), 1..200),
        ) {
            let variant = ExerciseVariant::ALL[variant_idx];
            let mut session = ExerciseSession::with_defaults(variant);
            let mut prev = *session.state();
            for event in events {
                let frame = event.map(|(angle, whole)| {
                    let frame = hanging_arm(variant, angle);
                    if whole { frame } else { frame.truncated(12) }
                });
                let state = *session.update(frame.as_ref());
                prop_assert!(state.rep_count >= prev.rep_count);
                prop_assert!(state.rep_count - prev.rep_count <= 1);
                if state.rep_count != prev.rep_count {
                    prop_assert_ne!(state.phase, prev.phase);
                }
                prop_assert!((0.0..=180.0).contains(&state.last_angle));
                prev = state;
            }
        }

        #[test]
        fn prop_reset_is_idempotent(
            angles in prop::collection::vec(0.0f32..=180.0, 0..50),
        ) {
            let mut session = ExerciseSession::with_defaults(ExerciseVariant::LeftCurl);
            for angle in angles {
                session.update(Some(&hanging_arm(ExerciseVariant::LeftCurl, angle)));
            }
            session.reset();
            prop_assert_eq!(*session.state(), SessionState::initial());
        }
    }
}
