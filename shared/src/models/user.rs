//! Actor roles and the task-access rule

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role carried in the actor's token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Worker,
    SiteSupervisor,
    HqStaff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Worker => "worker",
            Role::SiteSupervisor => "site_supervisor",
            Role::HqStaff => "hq_staff",
            Role::Admin => "admin",
        }
    }

    /// Manager tier may write the catalog, purchases and read reports
    pub fn is_manager(&self) -> bool {
        matches!(self, Role::SiteSupervisor | Role::HqStaff | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a task is assigned to, as seen by the access check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskAssignment {
    pub assigned_to_id: Option<Uuid>,
    pub assigned_by_id: Option<Uuid>,
    pub assignee_ids: Vec<Uuid>,
}

impl TaskAssignment {
    fn is_assignee(&self, user_id: Uuid) -> bool {
        self.assigned_to_id == Some(user_id) || self.assignee_ids.contains(&user_id)
    }

    /// Headquarters roles see every task; workers only their own; supervisors
    /// their own plus the tasks they handed out.
    pub fn is_accessible_by(&self, role: Role, user_id: Uuid) -> bool {
        match role {
            Role::Admin | Role::HqStaff => true,
            Role::Worker => self.is_assignee(user_id),
            Role::SiteSupervisor => {
                self.assigned_by_id == Some(user_id) || self.is_assignee(user_id)
            }
        }
    }
}
