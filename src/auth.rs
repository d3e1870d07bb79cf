//! Caller identity as it arrives from the (external) authentication layer.
//! Requests reach the services pre-authenticated and pre-authorized; the
//! services only re-check the role rules they own themselves, such as
//! technicians being barred from manual status edits.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    OwnerAdmin,
    OpsManager,
    ServiceAdvisor,
    Technician,
    Painter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::OwnerAdmin => "OWNER_ADMIN",
            Role::OpsManager => "OPS_MANAGER",
            Role::ServiceAdvisor => "SERVICE_ADVISOR",
            Role::Technician => "TECHNICIAN",
            Role::Painter => "PAINTER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "OWNER_ADMIN" => Some(Role::OwnerAdmin),
            "OPS_MANAGER" => Some(Role::OpsManager),
            "SERVICE_ADVISOR" => Some(Role::ServiceAdvisor),
            "TECHNICIAN" => Some(Role::Technician),
            "PAINTER" => Some(Role::Painter),
            _ => None,
        }
    }

    /// Technicians and painters log time against work orders but may not
    /// edit billing, notes, or status by hand.
    pub fn is_technician_or_painter(&self) -> bool {
        matches!(self, Role::Technician | Role::Painter)
    }
}

/// The authenticated employee performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub employee_id: Uuid,
    pub name: Option<String>,
    pub role: Role,
}

impl Actor {
    pub fn new(employee_id: Uuid, name: Option<String>, role: Role) -> Self {
        Self {
            employee_id,
            name,
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_wire_form() {
        for role in [
            Role::OwnerAdmin,
            Role::OpsManager,
            Role::ServiceAdvisor,
            Role::Technician,
            Role::Painter,
        ] {
            assert_eq!(Role::from_str(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_str("RECEPTIONIST"), None);
    }

    #[test]
    fn only_floor_roles_are_wrench_turning() {
        assert!(Role::Technician.is_technician_or_painter());
        assert!(Role::Painter.is_technician_or_painter());
        assert!(!Role::ServiceAdvisor.is_technician_or_painter());
    }
}
