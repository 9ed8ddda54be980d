use serde::{Deserialize, Serialize};

use crate::geometry::Vec3;

/// Which hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Chirality {
    Left,
    #[default]
    Right,
}

impl Chirality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Hand configured to drive a trial. The numeric codes are the ones used in
/// the session table's `hand` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HandMode {
    Left = 0,
    #[default]
    Right = 1,
    Either = 2,
}

impl HandMode {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Left),
            1 => Some(Self::Right),
            2 => Some(Self::Either),
            _ => None,
        }
    }

    /// Parses the free-text `hand` cell of a session table.
    ///
    /// Empty means right. Numbers outside 0..=2 and unknown words are `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let t = text.trim().to_ascii_lowercase();
        if t.is_empty() {
            return Some(Self::Right);
        }
        if let Ok(v) = t.parse::<i64>() {
            return Self::from_code(v);
        }
        match t.as_str() {
            "left" | "l" => Some(Self::Left),
            "right" | "r" => Some(Self::Right),
            "either" | "both" | "e" | "b" => Some(Self::Either),
            _ => None,
        }
    }

    /// The hand a fixed mode is locked to.
    pub fn fixed_hand(&self) -> Option<Chirality> {
        match self {
            Self::Left => Some(Chirality::Left),
            Self::Right => Some(Chirality::Right),
            Self::Either => None,
        }
    }

    pub fn is_either(&self) -> bool {
        matches!(self, Self::Either)
    }
}

/// Joint positions of one detected hand in a device frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandPose {
    pub chirality: Chirality,
    pub index_tip: Vec3,
    pub thumb_tip: Vec3,
    /// Index metacarpophalangeal joint (knuckle).
    pub index_mcp: Vec3,
}

/// One update from the hand-tracking device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandFrame {
    /// Device clock, microseconds, monotonically increasing.
    pub timestamp_us: i64,
    #[serde(default)]
    pub hands: Vec<HandPose>,
}

impl HandFrame {
    pub fn new(timestamp_us: i64) -> Self {
        Self {
            timestamp_us,
            hands: Vec::new(),
        }
    }

    pub fn with_hand(mut self, pose: HandPose) -> Self {
        self.hands.retain(|h| h.chirality != pose.chirality);
        self.hands.push(pose);
        self
    }

    pub fn hand(&self, chirality: Chirality) -> Option<&HandPose> {
        self.hands.iter().find(|h| h.chirality == chirality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_codes_and_words() {
        assert_eq!(HandMode::parse("0"), Some(HandMode::Left));
        assert_eq!(HandMode::parse(" 2 "), Some(HandMode::Either));
        assert_eq!(HandMode::parse("R"), Some(HandMode::Right));
        assert_eq!(HandMode::parse("both"), Some(HandMode::Either));
        assert_eq!(HandMode::parse(""), Some(HandMode::Right));
        assert_eq!(HandMode::parse("3"), None);
        assert_eq!(HandMode::parse("-1"), None);
        assert_eq!(HandMode::parse("foot"), None);
    }

    #[test]
    fn frame_keeps_one_pose_per_side() {
        let pose = |c, x| HandPose {
            chirality: c,
            index_tip: Vec3::new(x, 0.0, 0.0),
            thumb_tip: Vec3::ZERO,
            index_mcp: Vec3::ZERO,
        };
        let frame = HandFrame::new(10)
            .with_hand(pose(Chirality::Left, 1.0))
            .with_hand(pose(Chirality::Left, 2.0));
        assert_eq!(frame.hands.len(), 1);
        assert_eq!(frame.hand(Chirality::Left).map(|h| h.index_tip.x), Some(2.0));
        assert!(frame.hand(Chirality::Right).is_none());
    }

    #[test]
    fn frame_deserializes_without_hands() {
        let frame: HandFrame = serde_json::from_str(r#"{"timestamp_us": 42}"#).unwrap();
        assert_eq!(frame.timestamp_us, 42);
        assert!(frame.hands.is_empty());
    }
}
