use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Mcp,
    PickupPartner,
}

/// The authenticated caller. The core trusts this and never re-checks credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn mcp(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Mcp)
    }

    pub fn partner(user_id: Uuid) -> Self {
        Self::new(user_id, Role::PickupPartner)
    }
}
