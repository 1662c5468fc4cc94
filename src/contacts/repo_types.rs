use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::tags::repo::Tag;

/// Who may see a contact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "contact_visibility", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    SharedLink,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid visibility value: {0}")]
pub struct InvalidVisibility(pub String);

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::SharedLink => "shared_link",
        }
    }
}

impl FromStr for Visibility {
    type Err = InvalidVisibility;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "shared_link" => Ok(Visibility::SharedLink),
            other => Err(InvalidVisibility(other.to_string())),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum PointError {
    #[error("latitude must be within [-90, 90]")]
    LatitudeOutOfRange,
    #[error("longitude must be within [-180, 180]")]
    LongitudeOutOfRange,
}

impl Point {
    pub fn new(lat: f64, lng: f64) -> Result<Self, PointError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(PointError::LatitudeOutOfRange);
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(PointError::LongitudeOutOfRange);
        }
        Ok(Self { lat, lng })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Link {
    pub id: i64,
    pub contact_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub link: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewLink {
    #[serde(rename = "type")]
    pub kind: String,
    pub link: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// Address row as stored; the geography point is read back as two float columns.
#[derive(Debug, Clone, FromRow)]
pub struct AddressRow {
    pub id: i64,
    pub external_id: Option<String>,
    pub contact_id: i64,
    pub label: Option<String>,
    pub name: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Address {
    pub id: i64,
    pub external_id: Option<String>,
    pub contact_id: i64,
    pub label: Option<String>,
    pub name: Option<String>,
    pub location: Point,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<AddressRow> for Address {
    fn from(row: AddressRow) -> Self {
        Self {
            location: Point {
                lat: row.lat,
                lng: row.lng,
            },
            id: row.id,
            external_id: row.external_id,
            contact_id: row.contact_id,
            label: row.label,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAddress {
    pub external_id: Option<String>,
    pub label: Option<String>,
    pub name: Option<String>,
    pub location: Point,
}

/// Scalar columns of a contact.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ContactRow {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub avatar: Option<String>,
    pub activity_name: Option<String>,
    pub website: Option<String>,
    pub country_code: Option<String>,
    pub about: Option<String>,
    pub phone_number: Option<String>,
    pub phone_calling_code: Option<String>,
    pub email: Option<String>,
    pub visibility: Visibility,
    pub views_amount: i32,
    pub saves_amount: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

/// A contact with its tags, links and address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contact {
    #[serde(flatten)]
    pub row: ContactRow,
    pub tags: Vec<Tag>,
    pub social_links: Vec<Link>,
    pub address: Option<Address>,
}

impl Contact {
    pub fn id(&self) -> i64 {
        self.row.id
    }
}

/// Insert payload; `user_id` always comes from the authenticated caller.
#[derive(Debug, Clone)]
pub struct NewContact {
    pub user_id: i64,
    pub name: String,
    pub avatar: Option<String>,
    pub activity_name: Option<String>,
    pub website: Option<String>,
    pub country_code: Option<String>,
    pub about: Option<String>,
    pub phone_number: Option<String>,
    pub phone_calling_code: Option<String>,
    pub email: Option<String>,
    pub visibility: Visibility,
    pub tag_ids: Vec<i64>,
    pub links: Vec<NewLink>,
}

#[derive(Debug, Serialize)]
pub struct ContactsPage {
    pub contacts: Vec<Contact>,
    pub total_count: i64,
    pub page: i64,
    pub page_size: i64,
}
