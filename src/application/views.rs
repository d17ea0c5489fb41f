use serde::{Deserialize, Serialize};

/// A ledger row joined with the owning member's display details, as shown in
/// the admin views and exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithMember<T> {
    #[serde(flatten)]
    pub record: T,
    pub member_name: String,
    pub member_email: String,
}
