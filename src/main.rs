use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use rep_tracker::config::{Config, ExerciseConfig};
use rep_tracker::exercise::{
    ExerciseSession, ExerciseVariant, FrameStatus, SessionState, VariantProfile,
};
use rep_tracker::pose::{Keypoint, KeypointFrame, KeypointIndex};

const CONFIG_PATH: &str = "config.toml";

/// 合成フレームの肩位置と肢の長さ（ピクセル）
const SYNTH_SHOULDER: (f32, f32) = (320.0, 160.0);
const SYNTH_LIMB_PX: f32 = 110.0;

struct Args {
    variant: Option<ExerciseVariant>,
    frames: Option<PathBuf>,
    json: bool,
}

/// Usage: rep-tracker [VARIANT] [FRAMES.jsonl] [--json]
fn parse_args() -> Result<Args> {
    let mut args = Args {
        variant: None,
        frames: None,
        json: false,
    };
    for arg in std::env::args().skip(1) {
        if arg == "--json" {
            args.json = true;
        } else if let Ok(variant) = arg.parse::<ExerciseVariant>() {
            args.variant = Some(variant);
        } else if Path::new(&arg).is_file() {
            args.frames = Some(PathBuf::from(arg));
        } else {
            bail!("unknown argument {:?} (expected an exercise variant or a frames file)", arg);
        }
    }
    Ok(args)
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = parse_args()?;
    // 設定ファイルが壊れている場合は起動時に失敗させる
    let config = Config::load_if_present(CONFIG_PATH)?;
    init_tracing(&config.app.log_filter);

    let variant = args.variant.unwrap_or(config.app.variant);
    let session = ExerciseSession::new(variant, &config.exercise)?;

    println!("=== Rep Tracker ({}) ===", env!("REP_TRACKER_VERSION"));
    println!("種目: {}", variant);
    println!();

    match args.frames {
        Some(path) => replay(session, &path, args.json),
        None => interactive(session, &config.exercise, args.json),
    }
}

/// JSON Lines のキーポイント列を1行ずつ流す
///
/// 各行は `null`（未検出）または `[[x, y, conf], ...]`。空行と `#` 行は無視。
fn replay(mut session: ExerciseSession, path: &Path, json: bool) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let mut frames = 0usize;
    let mut degraded = 0usize;
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let frame: Option<KeypointFrame> = serde_json::from_str(line).with_context(|| {
            format!("{}:{}: invalid keypoint frame", path.display(), line_no + 1)
        })?;

        let state = session.update(frame.as_ref());
        if !matches!(state.status, FrameStatus::Tracked { .. }) {
            degraded += 1;
        }
        print_state(frames, state, json)?;
        frames += 1;
    }

    println!();
    println!(
        "完了: {} フレーム（検出不十分 {}）, {}: {} reps",
        frames,
        degraded,
        session.variant(),
        session.state().rep_count
    );
    Ok(())
}

fn interactive(mut session: ExerciseSession, config: &ExerciseConfig, json: bool) -> Result<()> {
    println!("コマンド:");
    println!("  a deg         - 関節角度 deg の合成フレームを入力 (例: a 45)");
    println!("  p n deg       - キーポイント n 点だけの部分フレーム (例: p 5 45)");
    println!("  n             - 人物未検出フレーム");
    println!("  s             - 現在の状態を表示");
    println!("  r             - リセット");
    println!("  v name        - 種目を切り替え (例: v triceps_kickback)");
    println!("  i             - 種目の手順を表示");
    println!("  q             - 終了");
    println!();

    let mut frame_index = 0usize;
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "a" if parts.len() == 2 => {
                let Ok(angle) = parts[1].parse::<f32>() else {
                    println!("角度が不正です: {}", parts[1]);
                    continue;
                };
                let frame = synthetic_frame(session.profile(), angle);
                let state = session.update(Some(&frame));
                print_state(frame_index, state, json)?;
                frame_index += 1;
            }
            "p" if parts.len() == 3 => {
                let (Ok(n), Ok(angle)) = (parts[1].parse::<usize>(), parts[2].parse::<f32>()) else {
                    println!("引数が不正です: {} {}", parts[1], parts[2]);
                    continue;
                };
                let frame = synthetic_frame(session.profile(), angle).truncated(n);
                let state = session.update(Some(&frame));
                print_state(frame_index, state, json)?;
                frame_index += 1;
            }
            "n" => {
                let state = session.update(None);
                print_state(frame_index, state, json)?;
                frame_index += 1;
            }
            "s" => {
                print_state(frame_index, session.state(), json)?;
            }
            "r" => {
                session.reset();
                frame_index = 0;
                println!("リセットしました");
            }
            "v" if parts.len() >= 2 => {
                let name = parts[1..].join(" ");
                // 種目変更は新しいセッション
                match name
                    .parse::<ExerciseVariant>()
                    .and_then(|variant| ExerciseSession::new(variant, config))
                {
                    Ok(next) => {
                        session = next;
                        frame_index = 0;
                        println!("種目: {}", session.variant());
                    }
                    Err(e) => println!("{:#}", e),
                }
            }
            "i" => {
                println!("{}:", session.variant());
                for (i, step) in session.variant().instructions().iter().enumerate() {
                    println!("  {}. {}", i + 1, step);
                }
            }
            "q" => {
                println!("終了します");
                break;
            }
            _ => {
                println!("不明なコマンド: {}", parts[0]);
            }
        }
    }

    println!("{}: {} reps", session.variant(), session.state().rep_count);
    Ok(())
}

fn print_state(index: usize, state: &SessionState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(state)?);
        return Ok(());
    }

    let feedback = match state.feedback {
        Some(f) if f.is_bad() => format!("[NG] {}", f.message),
        Some(f) => format!("[OK] {}", f.message),
        None => String::new(),
    };
    println!(
        "#{:<5} Angle: {:>3}  Reps: {:>3}  Phase: {:<4}  {}",
        index,
        state.last_angle as i32,
        state.rep_count,
        format!("{:?}", state.phase),
        feedback
    );
    Ok(())
}

/// 指定した関節角度の腕を持つ17点フレーム
///
/// キックバックは上腕を水平に、それ以外は上腕を真下に下ろした姿勢で作る。
fn synthetic_frame(profile: &VariantProfile, angle_deg: f32) -> KeypointFrame {
    let upper = match profile.variant {
        ExerciseVariant::TricepsKickback => (1.0, 0.0),
        _ => (0.0, 1.0),
    };
    let shoulder = SYNTH_SHOULDER;
    let elbow = (shoulder.0 + upper.0 * SYNTH_LIMB_PX, shoulder.1 + upper.1 * SYNTH_LIMB_PX);
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let back = (-upper.0, -upper.1);
    let forearm = (back.0 * cos - back.1 * sin, back.0 * sin + back.1 * cos);
    let wrist = (elbow.0 + forearm.0 * SYNTH_LIMB_PX, elbow.1 + forearm.1 * SYNTH_LIMB_PX);

    // 残りの点は画面下部に並べるだけ
    let mut keypoints: Vec<Keypoint> = (0..KeypointIndex::COUNT)
        .map(|i| Keypoint::new(200.0 + 10.0 * i as f32, 440.0, 0.5))
        .collect();
    let joints = profile.joints;
    keypoints[joints.shoulder as usize] = Keypoint::at(shoulder.0, shoulder.1);
    keypoints[joints.elbow as usize] = Keypoint::at(elbow.0, elbow.1);
    keypoints[joints.wrist as usize] = Keypoint::at(wrist.0, wrist.1);
    KeypointFrame::new(keypoints)
}
