pub mod geometry;
pub mod hand;
pub mod phase;
pub mod trial;

pub use geometry::{in_cylinder, project_to_rim, Vec3};
pub use hand::{Chirality, HandFrame, HandMode, HandPose};
pub use phase::TrialPhase;
pub use trial::{TrialConfig, TrialOutcome};
