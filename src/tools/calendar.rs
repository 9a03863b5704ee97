//! 日历能力
//!
//! CalendarProvider 是外部日历的窄接口（列事件 / 加事件）；InMemoryCalendar
//! 为内存实现。自然语言日期/时间解析与时间段（timeframe）到半开区间的
//! 确定性映射也在此处，解析一律以用户配置时区为准。

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 半开时间区间 [start, end)
#[derive(Debug, Clone, PartialEq)]
pub struct TimeWindow {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl TimeWindow {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        let t = t.with_timezone(&self.start.timezone());
        t >= self.start && t < self.end
    }
}

/// 当天零点（本地时区；DST 间隙取最早可用时刻）
fn midnight(date: NaiveDate, tz: Tz) -> DateTime<Tz> {
    tz.from_local_datetime(&date.and_hms_opt(0, 0, 0).expect("00:00:00 is valid"))
        .earliest()
        .unwrap_or_else(|| Utc::now().with_timezone(&tz))
}

/// timeframe 标记 → 半开区间的确定性映射
///
/// today → [零点, +1d)；tomorrow → [零点+1d, +2d)；this_week → [零点, +7d)；
/// next_week → [下周一零点, +7d)；其余（含 next / upcoming / 未识别）→ [now, +1d)。
pub fn resolve_timeframe(token: &str, now: DateTime<Tz>) -> TimeWindow {
    let tz = now.timezone();
    let today = midnight(now.date_naive(), tz);
    match token.trim().to_lowercase().as_str() {
        "today" => TimeWindow {
            start: today,
            end: midnight(now.date_naive() + Duration::days(1), tz),
        },
        "tomorrow" => TimeWindow {
            start: midnight(now.date_naive() + Duration::days(1), tz),
            end: midnight(now.date_naive() + Duration::days(2), tz),
        },
        "this_week" | "this week" => TimeWindow {
            start: today,
            end: midnight(now.date_naive() + Duration::days(7), tz),
        },
        "next_week" | "next week" => {
            let days_to_monday = 7 - now.weekday().num_days_from_monday() as i64;
            let monday = now.date_naive() + Duration::days(days_to_monday);
            TimeWindow {
                start: midnight(monday, tz),
                end: midnight(monday + Duration::days(7), tz),
            }
        }
        _ => TimeWindow {
            start: now,
            end: now + Duration::days(1),
        },
    }
}

/// 自然语言日期解析：today / tomorrow / next week / (next) 星期名 / YYYY-MM-DD
pub fn parse_natural_date(s: &str, now: DateTime<Tz>) -> Result<NaiveDate, String> {
    let lower = s.trim().to_lowercase();
    let today = now.date_naive();
    match lower.as_str() {
        "today" | "tonight" => return Ok(today),
        "tomorrow" => return Ok(today + Duration::days(1)),
        "next week" => return Ok(today + Duration::days(7)),
        _ => {}
    }

    // "next friday" / "friday"
    let day_word = lower.strip_prefix("next ").unwrap_or(&lower);
    if let Some(target) = parse_weekday(day_word) {
        let current = now.weekday().num_days_from_monday() as i64;
        let mut ahead = target.num_days_from_monday() as i64 - current;
        if ahead <= 0 {
            ahead += 7;
        }
        return Ok(today + Duration::days(ahead));
    }

    NaiveDate::parse_from_str(lower.trim(), "%Y-%m-%d")
        .map_err(|_| format!("Could not parse date: {}", s))
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// 时间解析："17:30"、"5:30 PM"、"2 PM"、"noon"、"midnight"
pub fn parse_time(s: &str) -> Result<NaiveTime, String> {
    let lower = s.trim().to_lowercase();
    match lower.as_str() {
        "noon" => return Ok(NaiveTime::from_hms_opt(12, 0, 0).unwrap()),
        "midnight" => return Ok(NaiveTime::from_hms_opt(0, 0, 0).unwrap()),
        _ => {}
    }

    let (body, pm_shift) = if let Some(b) = lower.strip_suffix("pm") {
        (b.trim().trim_end_matches('.').trim(), Some(12u32))
    } else if let Some(b) = lower.strip_suffix("am") {
        (b.trim().trim_end_matches('.').trim(), Some(0u32))
    } else {
        (lower.as_str(), None)
    };

    let (hour_s, minute_s) = match body.split_once(':') {
        Some((h, m)) => (h.trim(), m.trim()),
        None => (body, "0"),
    };
    let mut hour: u32 = hour_s
        .parse()
        .map_err(|_| format!("Could not parse time: {}", s))?;
    let minute: u32 = minute_s
        .parse()
        .map_err(|_| format!("Could not parse time: {}", s))?;

    if let Some(shift) = pm_shift {
        if hour == 12 {
            hour = 0; // 12 AM = 00, 12 PM = 12
        }
        hour += shift;
    }

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| format!("Could not parse time: {}", s))
}

/// 格式化后的日历事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub summary: String,
    /// RFC 3339
    pub start: String,
    pub end: String,
    pub location: String,
    pub description: String,
    #[serde(skip)]
    pub start_utc: Option<DateTime<Utc>>,
}

/// 日历提供方的窄接口
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// 列出区间内的事件（按开始时间升序，最多 max_results 条）
    async fn list_events(
        &self,
        window: &TimeWindow,
        max_results: usize,
    ) -> Result<Vec<CalendarEvent>, String>;

    /// 新建事件，返回创建结果
    async fn add_event(
        &self,
        summary: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        location: Option<&str>,
        description: Option<&str>,
    ) -> Result<CalendarEvent, String>;
}

/// 内存日历：事件存 UTC，查询时按窗口过滤
#[derive(Default)]
pub struct InMemoryCalendar {
    events: RwLock<Vec<CalendarEvent>>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CalendarProvider for InMemoryCalendar {
    async fn list_events(
        &self,
        window: &TimeWindow,
        max_results: usize,
    ) -> Result<Vec<CalendarEvent>, String> {
        let events = self.events.read().await;
        let mut hits: Vec<CalendarEvent> = events
            .iter()
            .filter(|e| e.start_utc.map(|t| window.contains(t)).unwrap_or(false))
            .cloned()
            .collect();
        hits.sort_by_key(|e| e.start_utc);
        hits.truncate(max_results);
        Ok(hits)
    }

    async fn add_event(
        &self,
        summary: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        location: Option<&str>,
        description: Option<&str>,
    ) -> Result<CalendarEvent, String> {
        let event = CalendarEvent {
            summary: summary.to_string(),
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
            location: location.unwrap_or("No Location").to_string(),
            description: description.unwrap_or("No Description").to_string(),
            start_utc: Some(start.with_timezone(&Utc)),
        };
        self.events.write().await.push(event.clone());
        Ok(event)
    }
}
