//! Delivery/pickup time slots for the week ahead.

use chrono::{
    Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Timelike, Utc,
};
use serde::Serialize;

pub const SCHEDULE_DAYS: i64 = 7;
pub const OPENING_HOUR: u32 = 10;
pub const LAST_SLOT_HOUR: u32 = 21;

const DAY_NAMES_AR: [&str; 7] = [
    "الأحد",
    "الإثنين",
    "الثلاثاء",
    "الأربعاء",
    "الخميس",
    "الجمعة",
    "السبت",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaySlots {
    /// `{weekday} {d}/{m}`, e.g. `الجمعة 6/3`.
    pub date: String,
    #[serde(skip)]
    pub day: NaiveDate,
    /// `HH:MM`, ascending.
    pub slots: Vec<String>,
}

pub fn day_label(date: NaiveDate) -> String {
    let name = DAY_NAMES_AR[date.weekday().num_days_from_sunday() as usize];
    format!("{name} {}/{}", date.day(), date.month())
}

/// Current wall-clock time at the shop.
pub fn local_now(utc_offset_minutes: i32) -> NaiveDateTime {
    let offset = FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
    Utc::now().with_timezone(&offset).naive_local()
}

/// Half-hour slots from 10:00 to 21:00 over the next seven days.
///
/// Today starts at the next full hour (never before opening), and no slot is
/// offered earlier than `now + min_minutes`. Days left without a slot are
/// omitted.
pub fn available_slots(now: NaiveDateTime, min_minutes: u32) -> Vec<DaySlots> {
    let earliest = now + Duration::minutes(i64::from(min_minutes));
    let today = now.date();

    (0..SCHEDULE_DAYS)
        .filter_map(|offset| {
            let day = today + Duration::days(offset);
            let start_hour = if offset == 0 {
                (now.hour() + 1).max(OPENING_HOUR)
            } else {
                OPENING_HOUR
            };

            let slots: Vec<String> = (start_hour..=LAST_SLOT_HOUR)
                .flat_map(|hour| {
                    let half = (hour < LAST_SLOT_HOUR).then_some(30);
                    std::iter::once((hour, 0)).chain(half.map(|m| (hour, m)))
                })
                .filter(|&(hour, minute)| {
                    NaiveTime::from_hms_opt(hour, minute, 0)
                        .map(|t| day.and_time(t) >= earliest)
                        .unwrap_or(false)
                })
                .map(|(hour, minute)| format!("{hour:02}:{minute:02}"))
                .collect();

            (!slots.is_empty()).then(|| DaySlots {
                date: day_label(day),
                day,
                slots,
            })
        })
        .collect()
}

/// Value stored in the order's `scheduled_time`.
pub fn selection_label(day: &DaySlots, time: &str) -> String {
    format!("{} - {time}", day.date)
}

/// Shown when no item sets a preparation time.
pub const DEFAULT_PREP_LABEL: &str = "سيتم توصيل طلبك خلال 30-60 دقيقة";

/// "وقت التحضير 1 ساعة و30 دقيقة" style hint shown above the picker.
pub fn prep_time_label(min_minutes: u32) -> String {
    if min_minutes == 0 {
        DEFAULT_PREP_LABEL.to_string()
    } else if min_minutes >= 60 {
        let hours = min_minutes / 60;
        let rest = min_minutes % 60;
        if rest > 0 {
            format!("وقت التحضير {hours} ساعة و{rest} دقيقة")
        } else {
            format!("وقت التحضير {hours} ساعة")
        }
    } else {
        format!("وقت التحضير {min_minutes} دقيقة")
    }
}
