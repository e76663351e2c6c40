//! Job schedule expressions
//!
//! Two forms are accepted:
//! - a 5-field cron expression, evaluated in UTC (`"0 */1 * * *"`)
//! - a fixed interval, `@every <duration>` or `every <duration>` (`"@every 30s"`)

use crate::common::{parse_duration, Error, Result};
use chrono::{DateTime, Utc};
use croner::Cron;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Schedule {
    Cron(Box<Cron>),
    Every(Duration),
}

impl Schedule {
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        let interval = expr
            .strip_prefix("@every")
            .or_else(|| expr.strip_prefix("every"))
            .map(str::trim);

        if let Some(interval) = interval {
            return Ok(Schedule::Every(parse_duration(interval)?));
        }

        let cron = Cron::new(expr)
            .parse()
            .map_err(|e| Error::InvalidConfig(format!("invalid schedule {:?}: {}", expr, e)))?;
        Ok(Schedule::Cron(Box::new(cron)))
    }

    /// How long to wait from `now` until the next run.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Result<Duration> {
        match self {
            Schedule::Every(interval) => Ok(*interval),
            Schedule::Cron(cron) => {
                let next = cron
                    .find_next_occurrence(&now, false)
                    .map_err(|e| Error::Internal(format!("no next occurrence: {}", e)))?;
                Ok((next - now).to_std().unwrap_or(Duration::ZERO))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_interval() {
        assert!(matches!(
            Schedule::parse("@every 30s").unwrap(),
            Schedule::Every(d) if d == Duration::from_secs(30)
        ));
        assert!(matches!(
            Schedule::parse("every 250ms").unwrap(),
            Schedule::Every(d) if d == Duration::from_millis(250)
        ));
        assert!(Schedule::parse("@every").is_err());
        assert!(Schedule::parse("@every 0s").is_err());
    }

    #[test]
    fn test_parse_cron() {
        assert!(matches!(
            Schedule::parse("0 */1 * * *").unwrap(),
            Schedule::Cron(_)
        ));
        assert!(matches!(
            Schedule::parse("* * * * *").unwrap(),
            Schedule::Cron(_)
        ));
        assert!(matches!(
            Schedule::parse("not a cron"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_cron_next_delay() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 30).unwrap();

        let hourly = Schedule::parse("0 */1 * * *").unwrap();
        assert_eq!(
            hourly.next_delay(now).unwrap(),
            Duration::from_secs(44 * 60 + 30)
        );

        let every_minute = Schedule::parse("* * * * *").unwrap();
        assert_eq!(every_minute.next_delay(now).unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_interval_next_delay() {
        let schedule = Schedule::parse("@every 5m").unwrap();
        assert_eq!(
            schedule.next_delay(Utc::now()).unwrap(),
            Duration::from_secs(300)
        );
    }
}
