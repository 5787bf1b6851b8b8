//! Calendar arithmetic for recurring templates.

use crate::models::Frequency;
use chrono::{Days, Months, NaiveDate};

/// Next occurrence after `date` for the given frequency.
///
/// Month based steps clamp to the last day of the target month, so
/// Jan 31 + 1 month is Feb 28/29 and Feb 29 + 1 year is Feb 28 in a
/// non-leap year. Returns `None` only when the result leaves chrono's
/// representable range.
pub fn advance(date: NaiveDate, frequency: Frequency) -> Option<NaiveDate> {
    match frequency {
        Frequency::Weekly => date.checked_add_days(Days::new(7)),
        Frequency::Monthly => date.checked_add_months(Months::new(1)),
        Frequency::Quarterly => date.checked_add_months(Months::new(3)),
        Frequency::Yearly => date.checked_add_months(Months::new(12)),
    }
}

/// Same as [`advance`] for a stored frequency string; unknown values step monthly.
pub fn advance_str(date: NaiveDate, frequency: &str) -> Option<NaiveDate> {
    advance(date, Frequency::from_string(frequency))
}
