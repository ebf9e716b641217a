pub mod angle;
pub mod feedback;
pub mod session;
pub mod variant;

pub use angle::{angle, distance, joint_angle};
pub use feedback::{Feedback, PosturalCheck, Severity};
pub use session::{step, Crossing, ExerciseSession, FrameStatus, Phase, SessionState};
pub use variant::{ExerciseVariant, Joints, RepTrigger, VariantProfile};
