use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Permission level tying a profile to a kitchen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Supervisora,
    Nutricionista,
    AuxAdm,
}

/// Things a role may do inside its kitchen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Comment,
    EditTasks,
    ManageProjects,
    ManageKitchen,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Admin,
        Role::Supervisora,
        Role::Nutricionista,
        Role::AuxAdm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Supervisora => "SUPERVISORA",
            Role::Nutricionista => "NUTRICIONISTA",
            Role::AuxAdm => "AUX_ADM",
        }
    }

    pub fn allows(&self, cap: Capability) -> bool {
        match cap {
            Capability::Read | Capability::Comment => true,
            Capability::EditTasks => !matches!(self, Role::AuxAdm),
            Capability::ManageProjects => matches!(self, Role::Admin | Role::Supervisora),
            Capability::ManageKitchen => matches!(self, Role::Admin),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown role `{s}`"))
    }
}
