//! Maps normalised features onto pillar difficulty and lane placement.

use std::ops::Range;

use crate::{Result, StageError};

/// Lanes blocked by the hardest tier.
pub const MAX_BLOCKED_LANES: u8 = 4;

/// Fixed difficulty tiers chosen from the normalised amplitude at a beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Half-open thresholds: exactly 0.3 is medium, exactly 0.6 is hard.
    pub fn from_amplitude(amplitude: f32) -> Self {
        if amplitude < 0.3 {
            Self::Easy
        } else if amplitude < 0.6 {
            Self::Medium
        } else {
            Self::Hard
        }
    }

    pub fn lane_count(self) -> u8 {
        match self {
            Self::Easy => 2,
            Self::Medium => 3,
            Self::Hard => MAX_BLOCKED_LANES,
        }
    }

    /// Pillar width in pixels.
    pub fn width(self) -> u32 {
        match self {
            Self::Easy => 50,
            Self::Medium => 70,
            Self::Hard => 90,
        }
    }
}

/// Lane count and width of a pillar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PillarShape {
    pub lane_count: u8,
    pub width: u32,
}

/// Turns amplitude into a [`PillarShape`] that still fits the lane layout.
#[derive(Debug, Clone, Copy)]
pub struct DifficultyMapper {
    total_lanes: u8,
}

impl DifficultyMapper {
    pub fn new(total_lanes: u8) -> Result<Self> {
        if total_lanes <= MAX_BLOCKED_LANES {
            return Err(StageError::InvalidInput(
                "lane layout is too narrow for the hardest difficulty tier",
            ));
        }
        Ok(Self { total_lanes })
    }

    pub fn map(&self, amplitude: f32) -> PillarShape {
        let difficulty = Difficulty::from_amplitude(amplitude);
        PillarShape {
            lane_count: difficulty.lane_count(),
            width: difficulty.width(),
        }
    }
}

/// Chooses which edge of the lane layout a pillar grows from.
#[derive(Debug, Clone, Copy)]
pub struct LaneSelector {
    total_lanes: u8,
}

impl LaneSelector {
    pub fn new(total_lanes: u8) -> Self {
        Self { total_lanes }
    }

    /// Blocks `lane_count` lanes at the top (high indices) or bottom edge,
    /// leaving the remaining lanes as one contiguous corridor.
    pub fn blocked_lanes(&self, lane_count: u8, is_top: bool) -> Result<Range<u8>> {
        if lane_count == 0 || lane_count >= self.total_lanes {
            return Err(StageError::InvalidInput(
                "blocked lane count must leave an open corridor",
            ));
        }

        if is_top {
            Ok(self.total_lanes - lane_count..self.total_lanes)
        } else {
            Ok(0..lane_count)
        }
    }

    /// The lanes left open by a blocked range.
    pub fn corridor(&self, blocked: &Range<u8>) -> Range<u8> {
        if blocked.start == 0 {
            blocked.end..self.total_lanes
        } else {
            0..blocked.start
        }
    }
}
