//! Per-request theme context handed to every render call

use chrono::Timelike;
use serde::Serialize;

pub const THEME_COOKIE_NAME: &str = "theme";

/// Dark from 19:00 until 07:00 local time
const DARK_FROM_HOUR: u32 = 19;
const LIGHT_FROM_HOUR: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

/// What the user stored in the theme cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemePreference {
    Light,
    Dark,
    Auto,
}

impl ThemePreference {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeSource {
    UserOverride,
    TimeOfDay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThemeContext {
    pub theme: Theme,
    pub source: ThemeSource,
}

impl ThemeContext {
    /// Persisted explicit preference wins; otherwise derive from the clock
    pub fn init<T: Timelike>(preference: Option<ThemePreference>, now: &T) -> Self {
        match preference {
            Some(ThemePreference::Light) => Self {
                theme: Theme::Light,
                source: ThemeSource::UserOverride,
            },
            Some(ThemePreference::Dark) => Self {
                theme: Theme::Dark,
                source: ThemeSource::UserOverride,
            },
            Some(ThemePreference::Auto) | None => Self {
                theme: theme_for_hour(now.hour()),
                source: ThemeSource::TimeOfDay,
            },
        }
    }

    pub fn now(preference: Option<ThemePreference>) -> Self {
        Self::init(preference, &chrono::Local::now())
    }
}

fn theme_for_hour(hour: u32) -> Theme {
    if (LIGHT_FROM_HOUR..DARK_FROM_HOUR).contains(&hour) {
        Theme::Light
    } else {
        Theme::Dark
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn at(hour: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, 30, 0).unwrap()
    }

    #[test]
    fn test_time_of_day() {
        assert_eq!(ThemeContext::init(None, &at(6)).theme, Theme::Dark);
        assert_eq!(ThemeContext::init(None, &at(7)).theme, Theme::Light);
        assert_eq!(ThemeContext::init(None, &at(18)).theme, Theme::Light);
        assert_eq!(ThemeContext::init(None, &at(19)).theme, Theme::Dark);
        assert_eq!(
            ThemeContext::init(Some(ThemePreference::Auto), &at(12)).source,
            ThemeSource::TimeOfDay
        );
    }

    #[test]
    fn test_override_wins() {
        let ctx = ThemeContext::init(Some(ThemePreference::Dark), &at(12));
        assert_eq!(ctx.theme, Theme::Dark);
        assert_eq!(ctx.source, ThemeSource::UserOverride);
    }

    #[test]
    fn test_preference_parse() {
        assert_eq!(ThemePreference::parse(" Light "), Some(ThemePreference::Light));
        assert_eq!(ThemePreference::parse("sepia"), None);
    }
}
