use sqlx::{query_builder::Separated, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    contacts::{
        dto::{Field, UpdateContactRequest},
        repo_types::{ContactRow, NewLink},
    },
    error::AppError,
};

/// One column assignment of a partial contact update.
#[derive(Debug, Clone, PartialEq)]
pub enum ContactColumn {
    Name(String),
    Avatar(Option<String>),
    ActivityName(Option<String>),
    Website(Option<String>),
    CountryCode(Option<String>),
    About(Option<String>),
    PhoneNumber(Option<String>),
    PhoneCallingCode(Option<String>),
    Email(Option<String>),
    UpdatedAt(OffsetDateTime),
}

impl ContactColumn {
    pub fn name(&self) -> &'static str {
        match self {
            ContactColumn::Name(_) => "name",
            ContactColumn::Avatar(_) => "avatar",
            ContactColumn::ActivityName(_) => "activity_name",
            ContactColumn::Website(_) => "website",
            ContactColumn::CountryCode(_) => "country_code",
            ContactColumn::About(_) => "about",
            ContactColumn::PhoneNumber(_) => "phone_number",
            ContactColumn::PhoneCallingCode(_) => "phone_calling_code",
            ContactColumn::Email(_) => "email",
            ContactColumn::UpdatedAt(_) => "updated_at",
        }
    }

    fn push_assignment(self, set: &mut Separated<'_, 'static, Postgres, &'static str>) {
        set.push(self.name());
        set.push_unseparated(" = ");
        match self {
            ContactColumn::Name(v) => {
                set.push_bind_unseparated(v);
            }
            ContactColumn::Avatar(v)
            | ContactColumn::ActivityName(v)
            | ContactColumn::Website(v)
            | ContactColumn::CountryCode(v)
            | ContactColumn::About(v)
            | ContactColumn::PhoneNumber(v)
            | ContactColumn::PhoneCallingCode(v)
            | ContactColumn::Email(v) => {
                set.push_bind_unseparated(v);
            }
            ContactColumn::UpdatedAt(t) => {
                set.push_bind_unseparated(t);
            }
        }
    }

    /// Same assignment against an in-memory row.
    pub fn apply(&self, row: &mut ContactRow) {
        match self.clone() {
            ContactColumn::Name(v) => row.name = v,
            ContactColumn::Avatar(v) => row.avatar = v,
            ContactColumn::ActivityName(v) => row.activity_name = v,
            ContactColumn::Website(v) => row.website = v,
            ContactColumn::CountryCode(v) => row.country_code = v,
            ContactColumn::About(v) => row.about = v,
            ContactColumn::PhoneNumber(v) => row.phone_number = v,
            ContactColumn::PhoneCallingCode(v) => row.phone_calling_code = v,
            ContactColumn::Email(v) => row.email = v,
            ContactColumn::UpdatedAt(t) => row.updated_at = t,
        }
    }
}

/// Sparse contact update. `tag_ids`/`links` of `None` leave the set untouched,
/// `Some(vec![])` clears it, anything else replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactPatch {
    pub columns: Vec<ContactColumn>,
    pub tag_ids: Option<Vec<i64>>,
    pub links: Option<Vec<NewLink>>,
}

fn optional(
    columns: &mut Vec<ContactColumn>,
    field: Field<String>,
    make: fn(Option<String>) -> ContactColumn,
) {
    if let Some(change) = field.into_change() {
        columns.push(make(change));
    }
}

impl ContactPatch {
    /// Only fields present in the request become assignments; `updated_at` is always stamped.
    pub fn from_request(req: UpdateContactRequest, now: OffsetDateTime) -> Result<Self, AppError> {
        let mut columns = Vec::new();

        match req.name {
            Field::Absent => {}
            Field::Value(name) if !name.trim().is_empty() => {
                columns.push(ContactColumn::Name(name.trim().to_string()))
            }
            Field::Null | Field::Value(_) => {
                return Err(AppError::invalid_request("name cannot be empty"))
            }
        }
        optional(&mut columns, req.avatar, ContactColumn::Avatar);
        optional(&mut columns, req.activity_name, ContactColumn::ActivityName);
        optional(&mut columns, req.website, ContactColumn::Website);
        optional(&mut columns, req.country_code, ContactColumn::CountryCode);
        optional(&mut columns, req.about, ContactColumn::About);
        optional(&mut columns, req.phone_number, ContactColumn::PhoneNumber);
        optional(&mut columns, req.phone_calling_code, ContactColumn::PhoneCallingCode);
        optional(&mut columns, req.email, ContactColumn::Email);
        columns.push(ContactColumn::UpdatedAt(now));

        let tag_ids = req
            .tags
            .into_change()
            .map(|tags| dedup(tags.unwrap_or_default().into_iter().map(|t| t.id)));
        let links = req
            .social_links
            .into_change()
            .map(Option::unwrap_or_default);

        Ok(Self {
            columns,
            tag_ids,
            links,
        })
    }

    /// `UPDATE contacts SET ...` scoped to a live contact of `owner`.
    pub fn update_query(&self, id: i64, owner: i64) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("UPDATE contacts SET ");
        let mut set = qb.separated(", ");
        for column in self.columns.iter().cloned() {
            column.push_assignment(&mut set);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(" AND user_id = ")
            .push_bind(owner)
            .push(" AND deleted_at IS NULL");
        qb
    }
}

/// Keeps first occurrence order.
pub fn dedup(ids: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut out: Vec<i64> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}
