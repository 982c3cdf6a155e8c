//! Technician availability, bookable slots and overlap checks.

use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::core::types::{AppointmentId, AvailabilityId, TechnicianId};
use crate::model::{Appointment, Availability, Store};

/// Slot and booking parameters, the `[schedule]` table of `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Length of a bookable slot inside an availability window.
    pub slot_minutes: u32,
    /// Duration assumed for appointments that do not carry one.
    pub default_duration_minutes: u32,
    /// How many days ahead slot listings look by default.
    pub horizon_days: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            slot_minutes: 60,
            default_duration_minutes: 120,
            horizon_days: 14,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("window start {start} must be before end {end}")]
    InvalidRange { start: NaiveTime, end: NaiveTime },
    #[error("recurring window needs a weekday between 0 and 6")]
    MissingWeekday,
    #[error("one-off window needs a date")]
    MissingDate,
    #[error("window duplicates availability {0}")]
    Duplicate(AvailabilityId),
    #[error("technician already has appointment {0} at that time")]
    Overlap(AppointmentId),
}

/// A bookable interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Candidate window before it gets an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWindow {
    pub technician: TechnicianId,
    pub recurring: bool,
    pub weekday: Option<u8>,
    pub date: Option<NaiveDate>,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Identity used for duplicate detection: technician, day selector, bounds.
pub(crate) type WindowKey = (TechnicianId, bool, Option<u8>, Option<NaiveDate>, NaiveTime, NaiveTime);

pub(crate) fn key_of(window: &Availability) -> WindowKey {
    (
        window.technician,
        window.recurring,
        window.recurring.then_some(window.weekday).flatten(),
        (!window.recurring).then_some(window.date).flatten(),
        window.start,
        window.end,
    )
}

pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

/// True if `window` is open on `date`.
pub fn applies_on(window: &Availability, date: NaiveDate) -> bool {
    if window.recurring {
        window.weekday == Some(weekday_index(date))
    } else {
        window.date == Some(date)
    }
}

fn appointment_end(appointment: &Appointment, default_minutes: u32) -> NaiveDateTime {
    let minutes = appointment.duration_minutes.unwrap_or(default_minutes);
    appointment.scheduled_at + Duration::minutes(i64::from(minutes))
}

fn intervals_overlap(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Active appointment of `technician` overlapping `[start, start + minutes)`.
///
/// `ignore` skips one appointment, used when moving an existing booking.
pub fn find_overlap(
    store: &Store,
    technician: TechnicianId,
    start: NaiveDateTime,
    minutes: u32,
    ignore: Option<AppointmentId>,
    cfg: &ScheduleConfig,
) -> Option<AppointmentId> {
    let end = start + Duration::minutes(i64::from(minutes));
    store
        .appointments
        .iter()
        .filter(|appt| appt.technician == technician && appt.status.is_active())
        .filter(|appt| Some(appt.id) != ignore)
        .find(|appt| {
            intervals_overlap(
                start,
                end,
                appt.scheduled_at,
                appointment_end(appt, cfg.default_duration_minutes),
            )
        })
        .map(|appt| appt.id)
}

pub fn check_booking(
    store: &Store,
    technician: TechnicianId,
    start: NaiveDateTime,
    minutes: Option<u32>,
    ignore: Option<AppointmentId>,
    cfg: &ScheduleConfig,
) -> Result<(), ScheduleError> {
    let minutes = minutes.unwrap_or(cfg.default_duration_minutes);
    match find_overlap(store, technician, start, minutes, ignore, cfg) {
        Some(existing) => Err(ScheduleError::Overlap(existing)),
        None => Ok(()),
    }
}

/// Free slots of `technician` for `days` days starting at `from`.
///
/// Slots are `slot_minutes` long, never start before `now`, and never touch
/// an active appointment. Output is sorted and free of duplicates even when
/// windows overlap.
pub fn slots(
    store: &Store,
    technician: TechnicianId,
    from: NaiveDate,
    days: u32,
    now: NaiveDateTime,
    cfg: &ScheduleConfig,
) -> Vec<Slot> {
    let step = Duration::minutes(i64::from(cfg.slot_minutes.max(1)));
    let windows: Vec<&Availability> = store
        .availability
        .iter()
        .filter(|window| window.technician == technician && window.start < window.end)
        .collect();
    let busy: Vec<(NaiveDateTime, NaiveDateTime)> = store
        .appointments
        .iter()
        .filter(|appt| appt.technician == technician && appt.status.is_active())
        .map(|appt| {
            (
                appt.scheduled_at,
                appointment_end(appt, cfg.default_duration_minutes),
            )
        })
        .collect();

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for date in from.iter_days().take(days as usize) {
        for window in windows.iter().filter(|window| applies_on(window, date)) {
            let window_end = date.and_time(window.end);
            let mut start = date.and_time(window.start);
            while start + step <= window_end {
                let end = start + step;
                let free = busy
                    .iter()
                    .all(|(b_start, b_end)| !intervals_overlap(start, end, *b_start, *b_end));
                if start >= now && free && seen.insert(start) {
                    out.push(Slot { start, end });
                }
                start = end;
            }
        }
    }
    out.sort_by_key(|slot| slot.start);
    out
}

/// Validate a window before it is stored.
pub fn validate_window(store: &Store, window: &NewWindow) -> Result<(), ScheduleError> {
    if window.start >= window.end {
        return Err(ScheduleError::InvalidRange {
            start: window.start,
            end: window.end,
        });
    }
    if window.recurring && !window.weekday.is_some_and(|day| day <= 6) {
        return Err(ScheduleError::MissingWeekday);
    }
    if !window.recurring && window.date.is_none() {
        return Err(ScheduleError::MissingDate);
    }
    let candidate = Availability {
        id: AvailabilityId(0),
        technician: window.technician,
        recurring: window.recurring,
        weekday: window.weekday,
        date: window.date,
        start: window.start,
        end: window.end,
    };
    let key = key_of(&candidate);
    if let Some(existing) = store.availability.iter().find(|w| key_of(w) == key) {
        return Err(ScheduleError::Duplicate(existing.id));
    }
    Ok(())
}

/// Remove exact duplicate windows, keeping the lowest id of each group.
///
/// Returns the removed ids in ascending order.
pub fn dedupe_availability(store: &mut Store) -> Vec<AvailabilityId> {
    let mut order: Vec<usize> = (0..store.availability.len()).collect();
    order.sort_by_key(|&index| store.availability[index].id);
    let mut seen = HashSet::new();
    let mut removed = Vec::new();
    for index in order {
        let window = &store.availability[index];
        if !seen.insert(key_of(window)) {
            removed.push(window.id);
        }
    }
    store.seed_id_counters();
    store
        .availability
        .retain(|window| !removed.contains(&window.id));
    removed
}
