use chrono::{Datelike, Days, NaiveDate};

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.checked_sub_days(Days::new(1))
}

/// Start and end dates of a fiscal period closing in `closing_month` of `fiscal_year`.
///
/// # Examples
/// - FY2023 closing in March: 2022-04-01 ..= 2023-03-31
/// - FY2023 closing in December: 2023-01-01 ..= 2023-12-31
pub fn fiscal_period_bounds(fiscal_year: i32, closing_month: u32) -> Option<(NaiveDate, NaiveDate)> {
    if !(1..=12).contains(&closing_month) {
        return None;
    }

    let end = last_day_of_month(fiscal_year, closing_month)?;

    let start_month = if closing_month == 12 { 1 } else { closing_month + 1 };
    let start_year = if closing_month == 12 {
        fiscal_year
    } else {
        fiscal_year - 1
    };
    let start = NaiveDate::from_ymd_opt(start_year, start_month, 1)?;

    Some((start, end))
}

/// Number of whole months covered by a period, used for sanity logging only.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let year_diff = end.year() - start.year();
    let month_diff = end.month() as i32 - start.month() as i32;
    year_diff * 12 + month_diff + 1
}

/// Rounds to a fixed number of decimals so threshold comparisons are stable.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2023, 2),
            NaiveDate::from_ymd_opt(2023, 2, 28)
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(
            last_day_of_month(2023, 12),
            NaiveDate::from_ymd_opt(2023, 12, 31)
        );
        assert_eq!(last_day_of_month(2023, 13), None);
    }

    #[test]
    fn test_fiscal_period_bounds() {
        let (start, end) = fiscal_period_bounds(2023, 3).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2022, 4, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2023, 3, 31).unwrap());
        assert_eq!(months_between(start, end), 12);

        let (start, end) = fiscal_period_bounds(2023, 12).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());

        assert!(fiscal_period_bounds(2023, 0).is_none());
    }

    #[test]
    fn test_round_to_collapses_float_noise() {
        assert_eq!(round_to(0.099999999999, 4), 0.1);
        assert_eq!(round_to(0.10000, 4), 0.1);
        assert_eq!(round_to(0.12344, 4), 0.1234);
    }
}
