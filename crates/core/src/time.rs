use chrono::{DateTime, TimeZone, Utc};

/// Where quiz attempts and other records get their timestamps from.
///
/// Services hold a `Clock` by value; tests pin it with [`fixed_clock`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(at) => *at,
        }
    }
}

/// Submission time used by tests: 2024-05-01T09:30:00Z.
///
/// # Panics
///
/// Never in practice; the date is a valid constant.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0)
        .single()
        .expect("constant test timestamp is unambiguous")
}

#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_never_moves() {
        let clock = fixed_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2024-05-01T09:30:00+00:00");
    }

    #[test]
    fn system_clock_is_the_default() {
        assert_eq!(Clock::default(), Clock::system());
        assert!(Clock::system().now() > fixed_now());
    }
}
