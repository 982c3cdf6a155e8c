//! Test-only fixtures: small entity builders and a coherent sample store.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::core::password::hash_with_salt;
use crate::core::status::{AppointmentStatus, ClaimStatus, DebrisStatus, VisitStatus};
use crate::core::types::{
    AccountId, AppointmentId, AssignmentId, AssignmentMethod, AvailabilityId, ClaimId, CompanyId,
    DebrisId, DebrisKind, HistoryId, MaterialId, MaterialUsageId, OwnerId, ProjectId,
    ProjectStatus, RemovalCompanyId, Role, SpecialtyId, SurveyId, TechnicianId, UnitId, VisitId,
};
use crate::model::{
    Account, Appointment, Assignment, Availability, Claim, Company, Debris, HistoryEntry,
    Material, MaterialUsage, Owner, Project, RemovalCompany, Specialty, Store, Survey,
    Technician, Unit, Visit,
};

/// Password of every account in [`sample_store`].
pub const SAMPLE_PASSWORD: &str = "clave123";

/// Parse `YYYY-MM-DD HH:MM`.
pub fn at(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").expect("datetime literal")
}

pub fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date literal")
}

pub fn time(raw: &str) -> NaiveTime {
    NaiveTime::parse_from_str(raw, "%H:%M").expect("time literal")
}

/// Clock used by fixtures: 2025-03-15 12:00, after every sample event.
pub fn fixed_now() -> NaiveDateTime {
    at("2025-03-15 12:00")
}

pub fn sample_hash() -> String {
    hash_with_salt(SAMPLE_PASSWORD, &[1; 16])
}

pub fn account(id: u64, username: &str, role: Role) -> Account {
    Account {
        id: AccountId(id),
        username: username.to_string(),
        email: None,
        rut: None,
        role,
        staff: false,
        active: true,
        password_hash: sample_hash(),
        project: None,
        owner: None,
        technician: None,
    }
}

pub fn owner(id: u64, rut: &str, email: &str) -> Owner {
    Owner {
        id: OwnerId(id),
        rut: rut.to_string(),
        name: format!("Propietario {id}"),
        email: email.to_string(),
        phone: None,
        project: None,
        account: None,
    }
}

pub fn technician(id: u64, rut: &str) -> Technician {
    Technician {
        id: TechnicianId(id),
        rut: rut.to_string(),
        name: format!("Técnico {id}"),
        email: None,
        phone: None,
        specialty: None,
        company: None,
        active: true,
        rating: None,
        rating_count: 0,
        account: None,
    }
}

pub fn project(id: u64, company: Option<CompanyId>) -> Project {
    Project {
        id: ProjectId(id),
        code: format!("PRJ-{id:02}"),
        name: format!("Proyecto {id}"),
        address: None,
        company,
        status: ProjectStatus::Entregado,
        delivered_on: None,
    }
}

pub fn claim(id: u64, owner: u64, project: u64, status: ClaimStatus) -> Claim {
    Claim {
        id: ClaimId(id),
        folio: format!("PV-2025-{id:04}"),
        description: format!("Reclamo {id}"),
        resolution: None,
        unit: None,
        location: None,
        filed_at: at("2025-03-01 09:00"),
        assigned_at: None,
        resolved_at: None,
        closed_at: None,
        estimated_hours: None,
        status,
        priority: None,
        category: None,
        owner: OwnerId(owner),
        project: ProjectId(project),
        technician: None,
        requires_debris_removal: false,
    }
}

pub fn appointment(
    id: u64,
    claim: u64,
    technician: u64,
    scheduled: &str,
    status: AppointmentStatus,
) -> Appointment {
    Appointment {
        id: AppointmentId(id),
        claim: ClaimId(claim),
        technician: TechnicianId(technician),
        owner: OwnerId(1),
        scheduled_at: at(scheduled),
        confirmed_at: None,
        status,
        kind: None,
        reschedule_reason: None,
        reminder_sent: false,
        duration_minutes: None,
    }
}

pub fn visit(id: u64, appointment: u64, claim: u64, started: &str, closed: &str) -> Visit {
    Visit {
        id: VisitId(id),
        appointment: Some(AppointmentId(appointment)),
        claim: ClaimId(claim),
        technician: TechnicianId(1),
        started_at: at(started),
        closed_at: Some(at(closed)),
        status: VisitStatus::Completed,
        notes: None,
        duration_minutes: None,
        work_type: None,
        requires_follow_up: false,
    }
}

pub fn window_weekly(id: u64, technician: u64, weekday: u8, start: &str, end: &str) -> Availability {
    Availability {
        id: AvailabilityId(id),
        technician: TechnicianId(technician),
        recurring: true,
        weekday: Some(weekday),
        date: None,
        start: time(start),
        end: time(end),
    }
}

pub fn window_on(id: u64, technician: u64, day: &str, start: &str, end: &str) -> Availability {
    Availability {
        id: AvailabilityId(id),
        technician: TechnicianId(technician),
        recurring: false,
        weekday: None,
        date: Some(date(day)),
        start: time(start),
        end: time(end),
    }
}

fn history(id: u64, claim: u64, from: Option<ClaimStatus>, to: ClaimStatus, when: &str) -> HistoryEntry {
    HistoryEntry {
        id: HistoryId(id),
        claim: ClaimId(claim),
        actor: None,
        from,
        to,
        at: at(when),
        reason: None,
    }
}

/// A small but complete dataset.
///
/// - Project 1 of company 1, owners 1 (with account `123456785`) and 2 (no account).
/// - Technician 1 (plumbing, account `cdiaz`) and technician 2 (electrical, no account).
/// - Accounts: `supervisor` (1), owner account (2), `cdiaz` (3), `admin` (4, staff).
/// - Claim 1 resolved after two visits, claim 2 assigned to technician 2 with a
///   confirmed appointment, claim 3 freshly filed, claim 4 closed after one visit.
pub fn sample_store() -> Store {
    let mut store = Store::default();
    store.companies.push(Company {
        id: CompanyId(1),
        rut: "76.543.210-3".to_string(),
        legal_name: "Constructora Andes SpA".to_string(),
        trade_name: Some("Andes".to_string()),
        contact_email: Some("contacto@andes.cl".to_string()),
    });
    store.projects.push(Project {
        name: "Edificio Los Robles".to_string(),
        code: "ROB-01".to_string(),
        ..project(1, Some(CompanyId(1)))
    });
    store.units.push(Unit {
        id: UnitId(1),
        project: ProjectId(1),
        name: "Depto 101".to_string(),
        owner: Some(OwnerId(1)),
    });
    store.specialties.push(Specialty {
        id: SpecialtyId(1),
        name: "Gasfitería".to_string(),
    });
    store.specialties.push(Specialty {
        id: SpecialtyId(2),
        name: "Electricidad".to_string(),
    });

    store.owners.push(Owner {
        name: "Ana Pérez".to_string(),
        project: Some(ProjectId(1)),
        account: Some(AccountId(2)),
        ..owner(1, "12.345.678-5", "ana@correo.cl")
    });
    store.owners.push(Owner {
        name: "Bruno Soto".to_string(),
        project: Some(ProjectId(1)),
        ..owner(2, "11.111.111-1", "bruno@correo.cl")
    });

    store.technicians.push(Technician {
        name: "Carlos Díaz".to_string(),
        email: Some("cdiaz@andes.cl".to_string()),
        specialty: Some(SpecialtyId(1)),
        company: Some(CompanyId(1)),
        rating: Some(4.5),
        rating_count: 2,
        account: Some(AccountId(3)),
        ..technician(1, "15.555.555-6")
    });
    store.technicians.push(Technician {
        name: "Daniela Rojas".to_string(),
        email: Some("drojas@andes.cl".to_string()),
        specialty: Some(SpecialtyId(2)),
        company: Some(CompanyId(1)),
        ..technician(2, "16.666.666-K")
    });

    store.accounts.push(Account {
        email: Some("supervisor@andes.cl".to_string()),
        ..account(1, "supervisor", Role::Supervisor)
    });
    store.accounts.push(Account {
        email: Some("ana@correo.cl".to_string()),
        rut: Some("12.345.678-5".to_string()),
        owner: Some(OwnerId(1)),
        ..account(2, "123456785", Role::Owner)
    });
    store.accounts.push(Account {
        email: Some("cdiaz@andes.cl".to_string()),
        rut: Some("15.555.555-6".to_string()),
        technician: Some(TechnicianId(1)),
        ..account(3, "cdiaz", Role::Technician)
    });
    store.accounts.push(Account {
        staff: true,
        ..account(4, "admin", Role::Administrator)
    });

    store.materials.push(Material {
        id: MaterialId(1),
        code: "TUB-01".to_string(),
        name: "Tubo PVC 1/2".to_string(),
        unit_of_measure: Some("unidad".to_string()),
        unit_cost_cents: 250_000,
        stock: Some(20),
        min_stock: Some(5),
    });
    store.materials.push(Material {
        id: MaterialId(2),
        code: "SIL-01".to_string(),
        name: "Silicona".to_string(),
        unit_of_measure: Some("tubo".to_string()),
        unit_cost_cents: 450_000,
        stock: Some(10),
        min_stock: Some(2),
    });

    store.claims.push(Claim {
        unit: Some(UnitId(1)),
        filed_at: at("2025-03-03 09:00"),
        assigned_at: Some(at("2025-03-03 09:30")),
        resolved_at: Some(at("2025-03-05 12:00")),
        estimated_hours: Some(48),
        category: Some(SpecialtyId(1)),
        technician: Some(TechnicianId(1)),
        resolution: Some("Se reemplazó la llave de paso".to_string()),
        requires_debris_removal: true,
        ..claim(1, 1, 1, ClaimStatus::Resolved)
    });
    store.claims.push(Claim {
        unit: Some(UnitId(1)),
        filed_at: at("2025-03-10 10:00"),
        assigned_at: Some(at("2025-03-10 11:00")),
        category: Some(SpecialtyId(2)),
        technician: Some(TechnicianId(2)),
        ..claim(2, 1, 1, ClaimStatus::Assigned)
    });
    store.claims.push(Claim {
        filed_at: at("2025-03-12 08:00"),
        category: Some(SpecialtyId(1)),
        ..claim(3, 1, 1, ClaimStatus::Filed)
    });
    store.claims.push(Claim {
        filed_at: at("2025-02-10 09:00"),
        assigned_at: Some(at("2025-02-10 10:00")),
        resolved_at: Some(at("2025-02-14 11:00")),
        closed_at: Some(at("2025-02-15 11:00")),
        category: Some(SpecialtyId(1)),
        technician: Some(TechnicianId(1)),
        ..claim(4, 1, 1, ClaimStatus::Closed)
    });

    for (id, claim, technician, when) in [
        (1, 1, 1, "2025-03-03 09:30"),
        (2, 2, 2, "2025-03-10 11:00"),
        (3, 4, 1, "2025-02-10 10:00"),
    ] {
        store.assignments.push(Assignment {
            id: AssignmentId(id),
            claim: ClaimId(claim),
            technician: TechnicianId(technician),
            assigned_at: at(when),
            method: AssignmentMethod::Manual,
            match_score: None,
            active: true,
        });
    }

    store
        .appointments
        .push(appointment(1, 1, 1, "2025-03-04 10:00", AppointmentStatus::Completed));
    store
        .appointments
        .push(appointment(2, 1, 1, "2025-03-05 10:00", AppointmentStatus::Completed));
    store.appointments.push(Appointment {
        confirmed_at: Some(at("2025-03-10 12:00")),
        ..appointment(3, 2, 2, "2025-03-20 15:00", AppointmentStatus::Confirmed)
    });
    store
        .appointments
        .push(appointment(4, 4, 1, "2025-02-12 09:00", AppointmentStatus::Completed));

    store
        .visits
        .push(visit(1, 1, 1, "2025-03-04 10:05", "2025-03-04 11:30"));
    store
        .visits
        .push(visit(2, 2, 1, "2025-03-05 10:30", "2025-03-05 12:00"));
    store
        .visits
        .push(visit(3, 4, 4, "2025-02-12 09:10", "2025-02-14 11:00"));

    for (id, visit, material, quantity, when) in [
        (1, 1, 1, 2, "2025-03-04 11:00"),
        (2, 2, 2, 1, "2025-03-05 11:30"),
        (3, 3, 1, 1, "2025-02-12 10:00"),
    ] {
        store.material_usages.push(MaterialUsage {
            id: MaterialUsageId(id),
            visit: VisitId(visit),
            material: MaterialId(material),
            quantity,
            used_at: at(when),
            notes: None,
        });
    }

    store.removal_companies.push(RemovalCompany {
        id: RemovalCompanyId(1),
        name: "Retiros Sur".to_string(),
        phone: None,
        email: Some("contacto@retirossur.cl".to_string()),
        active: true,
    });
    store.debris.push(Debris {
        id: DebrisId(1),
        claim: ClaimId(1),
        visit: Some(VisitId(2)),
        kind: DebrisKind::Construction,
        volume_m3: 1.5,
        location: "Bodega subterráneo".to_string(),
        scheduled_on: None,
        removed_on: None,
        status: DebrisStatus::Pending,
        removal_company: None,
        cost_cents: 0,
        notes: None,
    });

    store.surveys.push(Survey {
        id: SurveyId(1),
        claim: ClaimId(1),
        visit: Some(VisitId(2)),
        score: Some(5),
        technician_score: Some(5),
        timeliness_score: Some(4),
        solution_score: Some(5),
        comments: Some("Muy buena atención".to_string()),
        answered_at: Some(at("2025-03-06 18:00")),
    });
    store.surveys.push(Survey {
        id: SurveyId(2),
        claim: ClaimId(4),
        visit: Some(VisitId(3)),
        score: Some(4),
        technician_score: Some(4),
        timeliness_score: None,
        solution_score: None,
        comments: None,
        answered_at: Some(at("2025-02-16 09:00")),
    });

    store.history.extend([
        history(1, 1, None, ClaimStatus::Filed, "2025-03-03 09:00"),
        history(2, 1, Some(ClaimStatus::Filed), ClaimStatus::Assigned, "2025-03-03 09:30"),
        history(3, 1, Some(ClaimStatus::Assigned), ClaimStatus::InProgress, "2025-03-04 11:30"),
        history(4, 1, Some(ClaimStatus::InProgress), ClaimStatus::Resolved, "2025-03-05 12:00"),
        history(5, 2, None, ClaimStatus::Filed, "2025-03-10 10:00"),
        history(6, 2, Some(ClaimStatus::Filed), ClaimStatus::Assigned, "2025-03-10 11:00"),
        history(7, 3, None, ClaimStatus::Filed, "2025-03-12 08:00"),
    ]);

    for (id, weekday) in (1..=5).zip(0..=4) {
        store
            .availability
            .push(window_weekly(id, 1, weekday, "09:00", "13:00"));
    }
    store
        .availability
        .push(window_weekly(6, 2, 0, "14:00", "18:00"));

    store
}
