//! Shared identifiers and small enums used across the domain.
//!
//! Wire values keep the Spanish vocabulary of the stored records so existing
//! data stays readable; Rust names are English.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_types {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub u64);

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl From<$name> for u64 {
                fn from(id: $name) -> u64 {
                    id.0
                }
            }
        )*
    };
}

id_types!(
    CompanyId,
    ProjectId,
    UnitId,
    SpecialtyId,
    OwnerId,
    TechnicianId,
    AccountId,
    ClaimId,
    AssignmentId,
    AppointmentId,
    VisitId,
    MaterialId,
    MaterialUsageId,
    DebrisId,
    DebrisCrewId,
    RemovalCompanyId,
    SurveyId,
    NotificationId,
    EvidenceId,
    HistoryId,
    AvailabilityId,
);

/// Role carried by an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "propietario")]
    Owner,
    #[serde(rename = "tecnico")]
    Technician,
    #[serde(rename = "supervisor")]
    Supervisor,
    #[serde(rename = "administrador")]
    Administrator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Owner => "propietario",
            Role::Technician => "tecnico",
            Role::Supervisor => "supervisor",
            Role::Administrator => "administrador",
        }
    }

    /// Supervisors and administrators see every claim of their scope and the KPIs.
    pub fn is_staff_role(self) -> bool {
        matches!(self, Role::Supervisor | Role::Administrator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-delivery phase of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Entregado,
    Garantia,
    Finalizado,
}

/// How a technician came to be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentMethod {
    Manual,
    Suggested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebrisKind {
    #[serde(rename = "construccion")]
    Construction,
    #[serde(rename = "muebles_madera")]
    FurnitureWood,
    #[serde(rename = "metales")]
    Metal,
    #[serde(rename = "plasticos_carton")]
    PlasticCardboard,
    #[serde(rename = "vidrio")]
    Glass,
    #[serde(rename = "mixto")]
    Mixed,
    #[serde(rename = "otro")]
    Other,
}

impl DebrisKind {
    /// Human label used in messages.
    pub fn label(self) -> &'static str {
        match self {
            DebrisKind::Construction => "Escombros de construcción",
            DebrisKind::FurnitureWood => "Muebles y madera",
            DebrisKind::Metal => "Metales",
            DebrisKind::PlasticCardboard => "Plásticos y cartón",
            DebrisKind::Glass => "Vidrio",
            DebrisKind::Mixed => "Mixto",
            DebrisKind::Other => "Otro",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Image,
    Video,
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Uploader {
    #[serde(rename = "cliente")]
    Owner,
    #[serde(rename = "tecnico")]
    Technician,
    #[serde(rename = "sistema")]
    System,
}

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Recipient {
    Owner(OwnerId),
    Technician(TechnicianId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
}
