//! 画像座標での関節角度と距離
//!
//! 点は `(x, y)` のピクセル座標で、y は下向きに増える。

use crate::pose::Keypoint;

/// 長さがこれ未満の肢セグメントは角度を定義できないとみなす（ピクセル）
pub const MIN_SEGMENT_PX: f32 = 1e-3;

/// `b` を頂点とする `b→a` と `b→c` の間の角度（度、0〜180）
///
/// 点の重なりは判定しない。`atan2(0, 0)` は `0` なので結果は有限だが意味がない。
/// 肢には [`joint_angle`] を使う。
pub fn angle(a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> f32 {
    let radians = f32::atan2(c.1 - b.1, c.0 - b.0) - f32::atan2(a.1 - b.1, a.0 - b.0);
    let degrees = radians.to_degrees().abs();
    if degrees > 180.0 {
        (360.0 - degrees).max(0.0)
    } else {
        degrees
    }
}

/// ユークリッド距離
pub fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    (dx * dx + dy * dy).sqrt()
}

/// 肢の角度。座標に非有限値がある、またはセグメント長がほぼ0なら None
pub fn joint_angle(a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> Option<f32> {
    if ![a.0, a.1, b.0, b.1, c.0, c.1].iter().all(|v| v.is_finite()) {
        return None;
    }
    let upper = distance(a, b);
    let lower = distance(c, b);
    if !(upper >= MIN_SEGMENT_PX && lower >= MIN_SEGMENT_PX) {
        return None;
    }
    let result = angle(a, b, c);
    result.is_finite().then_some(result)
}

/// キーポイント3点に対する [`joint_angle`]
pub fn keypoint_angle(a: &Keypoint, b: &Keypoint, c: &Keypoint) -> Option<f32> {
    joint_angle(a.position(), b.position(), c.position())
}
