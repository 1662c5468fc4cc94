use serde::{Deserialize, Deserializer};

use crate::contacts::repo_types::{NewLink, Point};

/// A request field that distinguishes "not sent" from "sent as null".
/// Use with `#[serde(default)]` so a missing key lands on `Absent`.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<'de, T> Deserialize<'de> for Field<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Field::Value(v),
            None => Field::Null,
        })
    }
}

impl<T> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    /// `None` leaves the column alone; `Some(None)` clears it.
    pub fn into_change(self) -> Option<Option<T>> {
        match self {
            Field::Absent => None,
            Field::Null => Some(None),
            Field::Value(v) => Some(Some(v)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagRef {
    pub id: i64,
}

/// Body of `POST /api/contacts`. Any owner id in the body is ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateContactRequest {
    pub name: String,
    pub avatar: Option<String>,
    pub activity_name: Option<String>,
    pub website: Option<String>,
    pub country_code: Option<String>,
    pub about: Option<String>,
    pub phone_number: Option<String>,
    pub phone_calling_code: Option<String>,
    pub email: Option<String>,
    pub visibility: Option<String>,
    pub tags: Vec<TagRef>,
    pub social_links: Vec<NewLink>,
}

/// Body of `PUT /api/contacts/{id}`: every field is tri-state.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateContactRequest {
    pub name: Field<String>,
    pub avatar: Field<String>,
    pub activity_name: Field<String>,
    pub website: Field<String>,
    pub country_code: Field<String>,
    pub about: Field<String>,
    pub phone_number: Field<String>,
    pub phone_calling_code: Field<String>,
    pub email: Field<String>,
    pub tags: Field<Vec<TagRef>>,
    pub social_links: Field<Vec<NewLink>>,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    #[serde(default)]
    pub visibility: String,
}

/// Body of `POST /api/contacts/{id}/address`. The contact id comes from the path only.
#[derive(Debug, Deserialize)]
pub struct CreateAddressRequest {
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub location: Point,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListContactsQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
    /// Comma separated tag ids.
    pub tag: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Kilometers.
    pub radius: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}
