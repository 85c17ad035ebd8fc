//! Proximity categories and the deduplicating category-to-display mapping.

use std::fmt;

use serde_derive::Serialize;

/// Coarse distance bucket reported by ranging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Proximity {
    Immediate,
    Near,
    Far,
    #[default]
    Unknown,
}

impl Proximity {
    /// Ordering key for "closest first" sorting; unknown sorts last.
    pub fn rank(self) -> u8 {
        match self {
            Proximity::Immediate => 0,
            Proximity::Near => 1,
            Proximity::Far => 2,
            Proximity::Unknown => 3,
        }
    }

    pub fn display(self) -> ProximityDisplay {
        let (message, color) = match self {
            Proximity::Immediate => ("Very close", Color::Green),
            Proximity::Near => ("Near", Color::Gray),
            Proximity::Far => ("Far", Color::Red),
            Proximity::Unknown => ("Out of range", Color::White),
        };
        ProximityDisplay {
            proximity: self,
            message,
            color,
        }
    }
}

impl fmt::Display for Proximity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Proximity::Immediate => "immediate",
            Proximity::Near => "near",
            Proximity::Far => "far",
            Proximity::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Green,
    Gray,
    Red,
    White,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProximityDisplay {
    pub proximity: Proximity,
    pub message: &'static str,
    pub color: Color,
}

/// Remembers the last category shown so repeated callbacks don't redraw.
#[derive(Debug, Default)]
pub struct ProximityTracker {
    last: Proximity,
}

impl ProximityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Proximity {
        self.last
    }

    /// Returns the display to apply, or `None` when the category is unchanged.
    pub fn observe(&mut self, proximity: Proximity) -> Option<ProximityDisplay> {
        if proximity == self.last {
            return None;
        }
        self.last = proximity;
        Some(proximity.display())
    }

    /// Ranging stopped: fall back to unknown.
    pub fn reset(&mut self) -> Option<ProximityDisplay> {
        self.observe(Proximity::Unknown)
    }
}
