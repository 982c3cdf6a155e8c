//! Technician availability windows and slot listings.

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use tracing::info;

use super::{ActionError, Actor, Ctx};
use crate::core::schedule::{NewWindow, Slot, slots, validate_window};
use crate::core::types::{AvailabilityId, TechnicianId};
use crate::model::{Availability, Store};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WindowInput {
    /// Staff must name the technician; technicians always edit their own.
    pub technician: Option<TechnicianId>,
    #[serde(default)]
    pub recurring: bool,
    pub weekday: Option<u8>,
    pub date: Option<NaiveDate>,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

fn target_technician(ctx: &Ctx<'_>, requested: Option<TechnicianId>) -> Result<TechnicianId, ActionError> {
    match ctx.actor {
        Actor::Technician { technician, .. } => match requested {
            Some(other) if other != technician => Err(ActionError::Forbidden(
                "technicians manage only their own availability".to_string(),
            )),
            _ => Ok(technician),
        },
        Actor::Owner { .. } => Err(ActionError::Forbidden(
            "owners cannot manage availability".to_string(),
        )),
        _ => requested.ok_or_else(|| ActionError::Invalid("technician is required".to_string())),
    }
}

pub fn add_availability(
    store: &mut Store,
    ctx: &Ctx<'_>,
    input: WindowInput,
) -> Result<AvailabilityId, ActionError> {
    let technician = target_technician(ctx, input.technician)?;
    if store.technician(technician).is_none() {
        return Err(ActionError::not_found("technician", technician));
    }
    let window = NewWindow {
        technician,
        recurring: input.recurring,
        weekday: input.weekday,
        date: input.date,
        start: input.start,
        end: input.end,
    };
    validate_window(store, &window)?;
    let id = store.next_availability_id();
    store.availability.push(Availability {
        id,
        technician,
        recurring: window.recurring,
        weekday: window.weekday.filter(|_| window.recurring),
        date: window.date.filter(|_| !window.recurring),
        start: window.start,
        end: window.end,
    });
    info!(availability = %id, technician = %technician, "availability added");
    Ok(id)
}

pub fn delete_availability(
    store: &mut Store,
    ctx: &Ctx<'_>,
    id: AvailabilityId,
) -> Result<(), ActionError> {
    let window = store
        .availability_window(id)
        .ok_or_else(|| ActionError::not_found("availability", id))?;
    target_technician(ctx, Some(window.technician))?;
    store.seed_id_counters();
    store.availability.retain(|window| window.id != id);
    info!(availability = %id, "availability deleted");
    Ok(())
}

/// Windows of one technician, recurring first, then by day and start.
pub fn windows_of(store: &Store, technician: TechnicianId) -> Vec<&Availability> {
    let mut found: Vec<&Availability> = store
        .availability
        .iter()
        .filter(|window| window.technician == technician)
        .collect();
    found.sort_by_key(|w| (!w.recurring, w.weekday, w.date, w.start, w.id));
    found
}

/// Free slots of a technician starting at `from`; `days` defaults to the configured horizon.
pub fn free_slots(
    store: &Store,
    ctx: &Ctx<'_>,
    technician: TechnicianId,
    from: NaiveDate,
    days: Option<u32>,
) -> Result<Vec<Slot>, ActionError> {
    if store.technician(technician).is_none() {
        return Err(ActionError::not_found("technician", technician));
    }
    let days = days.unwrap_or(ctx.cfg.schedule.horizon_days);
    Ok(slots(store, technician, from, days, ctx.now, &ctx.cfg.schedule))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schedule::ScheduleError;
    use crate::core::types::{AccountId, OwnerId};
    use crate::io::config::PostventaConfig;
    use crate::test_support::{date, fixed_now, sample_store, time};

    fn carlos() -> Actor {
        Actor::Technician {
            account: AccountId(3),
            technician: TechnicianId(1),
        }
    }

    fn weekly(weekday: u8, start: &str, end: &str) -> WindowInput {
        WindowInput {
            technician: None,
            recurring: true,
            weekday: Some(weekday),
            date: None,
            start: time(start),
            end: time(end),
        }
    }

    #[test]
    fn technician_adds_and_deletes_own_window() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), carlos());
        let id = add_availability(&mut store, &ctx, weekly(5, "09:00", "12:00")).expect("add");
        assert_eq!(windows_of(&store, TechnicianId(1)).len(), 6);
        delete_availability(&mut store, &ctx, id).expect("delete");
        assert!(store.availability_window(id).is_none());

        let again = add_availability(&mut store, &ctx, weekly(5, "09:00", "12:00")).expect("re-add");
        assert!(again > id, "{again} reuses a deleted id");
    }

    #[test]
    fn deleting_the_newest_window_retires_its_id() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), Actor::System);
        delete_availability(&mut store, &ctx, AvailabilityId(6)).expect("delete");
        let id = add_availability(
            &mut store,
            &ctx,
            WindowInput {
                technician: Some(TechnicianId(2)),
                ..weekly(5, "09:00", "12:00")
            },
        )
        .expect("add");
        assert_eq!(id, AvailabilityId(7));
    }

    #[test]
    fn duplicate_and_inverted_windows_are_rejected() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), carlos());
        assert!(matches!(
            add_availability(&mut store, &ctx, weekly(0, "09:00", "13:00")),
            Err(ActionError::Schedule(ScheduleError::Duplicate(AvailabilityId(1))))
        ));
        assert!(matches!(
            add_availability(&mut store, &ctx, weekly(5, "13:00", "09:00")),
            Err(ActionError::Schedule(ScheduleError::InvalidRange { .. }))
        ));
    }

    #[test]
    fn technician_cannot_touch_other_windows() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), carlos());
        assert!(matches!(
            delete_availability(&mut store, &ctx, AvailabilityId(6)),
            Err(ActionError::Forbidden(_))
        ));
        let owner = Actor::Owner {
            account: AccountId(2),
            owner: OwnerId(1),
        };
        let ctx = Ctx::new(&cfg, fixed_now(), owner);
        assert!(matches!(
            add_availability(&mut store, &ctx, weekly(5, "09:00", "12:00")),
            Err(ActionError::Forbidden(_))
        ));
    }

    #[test]
    fn slots_follow_the_weekly_window() {
        let store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), Actor::System);
        // Technician 2 works Mondays 14:00-18:00.
        let free = free_slots(&store, &ctx, TechnicianId(2), date("2025-03-17"), Some(1))
            .expect("slots");
        assert_eq!(free.len(), 4);
        assert_eq!(free[0].start, date("2025-03-17").and_time(time("14:00")));
    }
}
