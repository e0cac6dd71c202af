//! Partitioning a requested range into provider-sized windows.

use time::Duration;

use crate::{DateWindow, UtcDateTime, WindowError};

/// Gap subtracted from each window end so consecutive windows do not share an endpoint.
pub const DEFAULT_BOUNDARY_OFFSET: Duration = Duration::minutes(10);

/// Default step of [`WindowPolicy::FixedSize`].
pub const DEFAULT_FIXED_STEP: Duration = Duration::days(30);

/// How boundaries are laid over a requested range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPolicy {
    /// First-of-month midnights, so windows line up across queries.
    CalendarMonth,
    /// `date_0, date_0 + step, ...`, always ending exactly at `date_f`.
    FixedSize { step: Duration },
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self::CalendarMonth
    }
}

impl WindowPolicy {
    pub fn fixed_30_days() -> Self {
        Self::FixedSize {
            step: DEFAULT_FIXED_STEP,
        }
    }

    pub fn boundaries(
        self,
        date_0: UtcDateTime,
        date_f: UtcDateTime,
    ) -> Result<Vec<UtcDateTime>, WindowError> {
        match self {
            Self::CalendarMonth => calendar_month_boundaries(date_0, date_f),
            Self::FixedSize { step } => fixed_size_boundaries(step, date_0, date_f),
        }
    }
}

/// Month starts from the month of `date_0` up to and including the first month start at or
/// after `date_f`. Strictly increasing, first element `<= date_0`, last element `>= date_f`.
pub fn calendar_month_boundaries(
    date_0: UtcDateTime,
    date_f: UtcDateTime,
) -> Result<Vec<UtcDateTime>, WindowError> {
    if date_f <= date_0 {
        return Err(WindowError::Range { date_0, date_f });
    }

    let mut boundaries = vec![date_0.month_start()];
    let mut current = date_0.month_start();
    while current < date_f {
        let next = current.next_month_start();
        if next <= current {
            break;
        }
        boundaries.push(next);
        current = next;
    }
    Ok(boundaries)
}

/// `date_0` then every `step` while still before `date_f`, then `date_f` itself.
pub fn fixed_size_boundaries(
    step: Duration,
    date_0: UtcDateTime,
    date_f: UtcDateTime,
) -> Result<Vec<UtcDateTime>, WindowError> {
    if !step.is_positive() {
        return Err(WindowError::Step);
    }

    let mut boundaries = Vec::new();
    let mut current = date_0;
    while current < date_f {
        boundaries.push(current);
        // A step past the representable range is past `date_f` as well.
        match current.checked_add(step) {
            Some(next) => current = next,
            None => break,
        }
    }
    boundaries.push(date_f);
    Ok(boundaries)
}

/// Consecutive boundary pairs as `(b[i], b[i+1] - offset)`.
pub fn windows(
    boundaries: &[UtcDateTime],
    offset: Duration,
) -> Result<Vec<DateWindow>, WindowError> {
    boundaries
        .windows(2)
        .map(|pair| {
            pair[1]
                .checked_sub(offset)
                .map(|end| DateWindow::new(pair[0], end))
                .ok_or(WindowError::OutOfRange { boundary: pair[1] })
        })
        .collect()
}
