//! Role resolution. Every protected request resolves its bearer token to an
//! identity and a role once, then hands both to the handler as a value; no
//! handler re-queries ambient session state.

use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::auth::client::Identity;
use crate::shared::schema::profiles;

/// Closed role set. Stored as text in the `profiles` relation; any other
/// stored value is a data error, never a silent default.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Privileged: may change status, add notes, delete tickets.
    Parent,
    /// Restricted: read-only access to tickets and notes.
    Enfant,
}

/// Role written when a profile is provisioned lazily for an identity that
/// has none. Intentionally not the same as [`SIGNUP_ROLE`]; the asymmetry
/// matches observed production behavior and is a policy decision pending
/// confirmation with the system owner.
pub const LAZY_PROVISION_ROLE: Role = Role::Parent;

/// Role advertised in the metadata of explicit sign-ups.
pub const SIGNUP_ROLE: Role = Role::Enfant;

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Parent => "parent",
            Role::Enfant => "enfant",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "parent" => Ok(Role::Parent),
            "enfant" => Ok(Role::Enfant),
            other => Err(format!("unrecognized role: {other}")),
        }
    }

    pub fn is_privileged(self) -> bool {
        match self {
            Role::Parent => true,
            Role::Enfant => false,
        }
    }
}

impl ToSql<Text, Pg> for Role {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for Role {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = std::str::from_utf8(bytes.as_bytes())?;
        Role::parse(value).map_err(Into::into)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = profiles)]
pub struct Profile {
    pub id: uuid::Uuid,
    pub name: String,
    pub company: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Resolve the stored role for an identity, provisioning the profile on
/// first sight. The insert is `ON CONFLICT DO NOTHING` so concurrent first
/// requests for the same identity cannot create duplicate rows; the read
/// afterwards always reports the stored role, whichever writer won.
pub fn resolve_role(conn: &mut diesel::PgConnection, identity: &Identity) -> QueryResult<Role> {
    let now = Utc::now();
    let profile = Profile {
        id: identity.id,
        name: identity.display_name(),
        company: identity
            .user_metadata
            .company
            .clone()
            .unwrap_or_else(|| "Administration".to_string()),
        role: LAZY_PROVISION_ROLE,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(profiles::table)
        .values(&profile)
        .on_conflict(profiles::id)
        .do_nothing()
        .execute(conn)?;

    profiles::table
        .filter(profiles::id.eq(identity.id))
        .select(profiles::role)
        .first::<Role>(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_text_round_trip() {
        assert_eq!(Role::parse("parent"), Ok(Role::Parent));
        assert_eq!(Role::parse("enfant"), Ok(Role::Enfant));
        assert_eq!(Role::Parent.as_str(), "parent");
        assert_eq!(Role::Enfant.as_str(), "enfant");
    }

    #[test]
    fn unknown_role_is_an_error_not_a_default() {
        assert!(Role::parse("admin").is_err());
        assert!(Role::parse("").is_err());
    }

    #[test]
    fn privilege_split() {
        assert!(Role::Parent.is_privileged());
        assert!(!Role::Enfant.is_privileged());
    }

    // Pins the provisioning asymmetry so a change to either default has to
    // be made deliberately.
    #[test]
    fn provisioning_defaults_are_asymmetric() {
        assert_eq!(LAZY_PROVISION_ROLE, Role::Parent);
        assert_eq!(SIGNUP_ROLE, Role::Enfant);
        assert_ne!(LAZY_PROVISION_ROLE, SIGNUP_ROLE);
    }
}
