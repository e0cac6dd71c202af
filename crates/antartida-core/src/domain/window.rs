use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::UtcDateTime;

/// A date sub-range dispatched as one provider request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: UtcDateTime,
    pub end: UtcDateTime,
}

impl DateWindow {
    pub const fn new(start: UtcDateTime, end: UtcDateTime) -> Self {
        Self { start, end }
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    /// True when `end > start`.
    pub fn is_forward(&self) -> bool {
        self.end > self.start
    }
}

impl Display for DateWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
