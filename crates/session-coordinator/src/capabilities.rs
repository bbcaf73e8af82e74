//! Authorization model.
//!
//! Capabilities are exactly what the backend returned for the principal at
//! authentication or refresh time. Nothing here infers one capability from
//! another or from a role hierarchy.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Shape of the capability data attached to a principal.
///
/// The session machinery is generic over this so the same coordinator serves
/// realms with flag sets and realms with a single role.
pub trait CapabilityModel:
    Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync + 'static
{
    /// What a gate asks about.
    type Flag: Copy + Debug + Send + Sync + 'static;

    fn grants(&self, flag: Self::Flag) -> bool;
}

/// Named capability flags of a tenant manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Membership,
    Activities,
    Finance,
    Messaging,
    Statistics,
    Documents,
    Settings,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::Membership,
        Capability::Activities,
        Capability::Finance,
        Capability::Messaging,
        Capability::Statistics,
        Capability::Documents,
        Capability::Settings,
    ];
}

/// Closed set of boolean permission flags. Flags absent from the backend
/// payload are denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManagerCapabilities {
    pub membership: bool,
    pub activities: bool,
    pub finance: bool,
    pub messaging: bool,
    pub statistics: bool,
    pub documents: bool,
    pub settings: bool,
}

impl ManagerCapabilities {
    /// Flags currently granted, in declaration order.
    pub fn granted(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|flag| self.grants(*flag))
            .collect()
    }
}

impl CapabilityModel for ManagerCapabilities {
    type Flag = Capability;

    fn grants(&self, flag: Capability) -> bool {
        match flag {
            Capability::Membership => self.membership,
            Capability::Activities => self.activities,
            Capability::Finance => self.finance,
            Capability::Messaging => self.messaging,
            Capability::Statistics => self.statistics,
            Capability::Documents => self.documents,
            Capability::Settings => self.settings,
        }
    }
}

/// Role of a platform administrator. A gate asking for a role is granted
/// only to that exact role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    SuperAdmin,
    Support,
    Auditor,
}

impl CapabilityModel for AdminRole {
    type Flag = AdminRole;

    fn grants(&self, flag: AdminRole) -> bool {
        *self == flag
    }
}
