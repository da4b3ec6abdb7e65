//! Upcoming-birthday window.
//!
//! A birthday is projected onto the current year, or onto the next one when
//! this year's date has already passed, and the contact is kept when the
//! projected date lies in `[today, today + horizon]` with both ends included.
//!
//! February 29 birthdays fall on February 28 in non-leap years.

use chrono::{Datelike, Duration, NaiveDate};

use crate::db::Contact;

/// Days ahead covered by the upcoming-birthdays listing
pub const DEFAULT_HORIZON_DAYS: i64 = 7;

/// Place a birthday's month and day in `year`
pub fn birthday_in_year(birthday: NaiveDate, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, birthday.month(), birthday.day()).or_else(|| {
        if birthday.month() == 2 && birthday.day() == 29 {
            NaiveDate::from_ymd_opt(year, 2, 28)
        } else {
            None
        }
    })
}

/// The first occurrence of a birthday on or after `today`
pub fn next_occurrence(birthday: NaiveDate, today: NaiveDate) -> Option<NaiveDate> {
    let this_year = birthday_in_year(birthday, today.year())?;
    if this_year >= today {
        Some(this_year)
    } else {
        birthday_in_year(birthday, today.year() + 1)
    }
}

/// Whether a birthday falls within `horizon_days` from `today`
pub fn is_upcoming(birthday: NaiveDate, today: NaiveDate, horizon_days: i64) -> bool {
    let end = today + Duration::days(horizon_days);
    match next_occurrence(birthday, today) {
        Some(date) => today <= date && date <= end,
        None => false,
    }
}

/// Contacts whose next birthday is within the window, in input order.
/// Contacts without a birthday are skipped.
pub fn upcoming(contacts: Vec<Contact>, today: NaiveDate, horizon_days: i64) -> Vec<Contact> {
    contacts
        .into_iter()
        .filter(|contact| {
            contact
                .birthday
                .map(|birthday| is_upcoming(birthday, today, horizon_days))
                .unwrap_or(false)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn contact(id: i64, birthday: Option<NaiveDate>) -> Contact {
        Contact {
            id,
            first_name: format!("First{}", id),
            last_name: format!("Last{}", id),
            email: format!("c{}@x.com", id),
            phone_number: "555-0100".to_string(),
            birthday,
            additional_info: None,
        }
    }

    /// A birthday `offset` days from `today`, born in 1985
    fn born(today: NaiveDate, offset: i64) -> NaiveDate {
        let target = today + Duration::days(offset);
        birthday_in_year(target, 1985).unwrap()
    }

    #[test]
    fn test_window_is_inclusive_on_both_ends() {
        let today = date(2025, 6, 10);
        assert!(is_upcoming(born(today, 0), today, 7));
        assert!(is_upcoming(born(today, 7), today, 7));
        assert!(!is_upcoming(born(today, 8), today, 7));
    }

    #[test]
    fn test_yesterday_is_excluded() {
        let today = date(2025, 6, 10);
        // Next occurrence is almost a year away
        assert!(!is_upcoming(born(today, -1), today, 7));
    }

    #[test]
    fn test_ann_lee_in_three_days_is_included() {
        let today = date(2025, 6, 10);
        let ann = Contact {
            id: 1,
            first_name: "Ann".to_string(),
            last_name: "Lee".to_string(),
            email: "ann@x.com".to_string(),
            phone_number: "555-0100".to_string(),
            birthday: Some(today + Duration::days(3)),
            additional_info: None,
        };

        let result = upcoming(vec![ann.clone()], today, DEFAULT_HORIZON_DAYS);
        assert_eq!(result, vec![ann]);
    }

    #[test]
    fn test_window_wraps_into_next_year() {
        let today = date(2025, 12, 29);
        assert!(is_upcoming(date(1990, 1, 2), today, 7));
        assert!(is_upcoming(date(1990, 1, 5), today, 7));
        assert!(!is_upcoming(date(1990, 1, 6), today, 7));
        assert!(is_upcoming(date(1990, 12, 31), today, 7));
    }

    #[test]
    fn test_leap_day_projects_to_feb_28_in_common_years() {
        let leap_birthday = date(2000, 2, 29);

        assert_eq!(birthday_in_year(leap_birthday, 2025), Some(date(2025, 2, 28)));
        assert_eq!(birthday_in_year(leap_birthday, 2028), Some(date(2028, 2, 29)));

        // Common year: celebrated on the 28th
        assert!(is_upcoming(leap_birthday, date(2025, 2, 28), 7));
        assert!(is_upcoming(leap_birthday, date(2025, 2, 21), 7));
        assert!(!is_upcoming(leap_birthday, date(2025, 3, 1), 7));

        // Leap year: the real date is used
        assert!(is_upcoming(leap_birthday, date(2028, 2, 29), 7));
        assert!(!is_upcoming(leap_birthday, date(2028, 2, 21), 7));
    }

    #[test]
    fn test_leap_day_after_feb_28_rolls_to_next_year() {
        // 2027-03-01: this year's Feb 28 has passed, next is 2028-02-29
        assert_eq!(
            next_occurrence(date(2000, 2, 29), date(2027, 3, 1)),
            Some(date(2028, 2, 29))
        );
    }

    #[test]
    fn test_missing_birthdays_are_skipped() {
        let today = date(2025, 6, 10);
        let contacts = vec![
            contact(1, None),
            contact(2, Some(born(today, 2))),
            contact(3, Some(born(today, 30))),
            contact(4, Some(born(today, 7))),
        ];

        let ids: Vec<i64> = upcoming(contacts, today, DEFAULT_HORIZON_DAYS)
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![2, 4]);
    }
}
