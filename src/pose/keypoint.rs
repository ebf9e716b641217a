use serde::Deserialize;

/// COCO 形式の 17 キーポイントインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;
}

/// 単一キーポイント
///
/// JSON では `[x, y]` または `[x, y, confidence]` の配列として読み込む
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "KeypointRepr")]
pub struct Keypoint {
    /// X座標（ピクセル）
    pub x: f32,
    /// Y座標（ピクセル、下が正）
    pub y: f32,
    /// 信頼度スコア (0.0〜1.0)
    pub confidence: f32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeypointRepr {
    WithConfidence(f32, f32, f32),
    Point(f32, f32),
}

impl From<KeypointRepr> for Keypoint {
    fn from(repr: KeypointRepr) -> Self {
        match repr {
            KeypointRepr::WithConfidence(x, y, confidence) => Self::new(x, y, confidence),
            KeypointRepr::Point(x, y) => Self::at(x, y),
        }
    }
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// 信頼度 1.0 のキーポイント
    pub fn at(x: f32, y: f32) -> Self {
        Self::new(x, y, 1.0)
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

/// 1フレーム分の検出結果（1人分）
///
/// 遮蔽などで 17 点に満たない場合がある。人物未検出は
/// 空のフレームではなく `Option<KeypointFrame>::None` で表す。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct KeypointFrame {
    keypoints: Vec<Keypoint>,
}

impl KeypointFrame {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// インデックスでキーポイントを取得（範囲外なら None）
    pub fn get(&self, index: KeypointIndex) -> Option<&Keypoint> {
        self.keypoints.get(index as usize)
    }

    /// count 点以上のキーポイントを含むか
    pub fn covers(&self, count: usize) -> bool {
        self.keypoints.len() >= count
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// 先頭 n 点だけを残したフレーム
    pub fn truncated(&self, n: usize) -> Self {
        Self::new(self.keypoints.iter().take(n).copied().collect())
    }
}
