use time::OffsetDateTime;
use tracing::info;

use crate::{
    contacts::{
        dto::{CreateAddressRequest, CreateContactRequest, ListContactsQuery, PageQuery, UpdateContactRequest},
        patch::{dedup, ContactPatch},
        policy::{can_mutate, can_view},
        query::{ContactFilter, GeoFilter, Scope},
        repo_types::{Address, Contact, ContactsPage, NewAddress, NewContact, Point, Visibility},
    },
    db::StoreError,
    error::AppError,
    state::AppState,
};

fn parse_visibility(raw: &str) -> Result<Visibility, AppError> {
    raw.parse::<Visibility>()
        .map_err(|e| AppError::invalid_request("invalid visibility value").with_source(e))
}

fn not_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Maps a write failure. A foreign key hit here means an unknown tag id.
fn write_error(err: StoreError, internal: &str) -> AppError {
    match err {
        StoreError::ForeignKeyViolation(_) => {
            AppError::invalid_request("unknown tag id").with_source(err)
        }
        other => AppError::from_store(other, "contact not found", internal),
    }
}

/// Live contact owned by `caller`: `NotFound` if missing, `Forbidden` if someone else's.
async fn owned_contact(st: &AppState, caller: i64, id: i64) -> Result<Contact, AppError> {
    let contact = st
        .contacts
        .find(id)
        .await
        .map_err(|e| AppError::internal("failed to get contact").with_source(e))?
        .ok_or_else(|| AppError::not_found("contact not found"))?;
    if !can_mutate(caller, &contact.row) {
        return Err(AppError::forbidden("you do not own this contact"));
    }
    Ok(contact)
}

pub async fn create_contact(
    st: &AppState,
    caller: i64,
    req: CreateContactRequest,
) -> Result<Contact, AppError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::invalid_request("name is required"));
    }
    let visibility = match req.visibility.as_deref() {
        None => Visibility::default(),
        Some(raw) => parse_visibility(raw)?,
    };

    let new = NewContact {
        user_id: caller,
        name,
        avatar: not_blank(req.avatar),
        activity_name: not_blank(req.activity_name),
        website: not_blank(req.website),
        country_code: not_blank(req.country_code),
        about: not_blank(req.about),
        phone_number: not_blank(req.phone_number),
        phone_calling_code: not_blank(req.phone_calling_code),
        email: not_blank(req.email),
        visibility,
        tag_ids: dedup(req.tags.into_iter().map(|t| t.id)),
        links: req.social_links,
    };

    let contact = st
        .contacts
        .create(new)
        .await
        .map_err(|e| write_error(e, "failed to create contact"))?;
    info!(contact_id = contact.id(), user_id = caller, "contact created");
    Ok(contact)
}

/// Hidden contacts look exactly like missing ones to non-owners.
pub async fn get_contact(st: &AppState, viewer: Option<i64>, id: i64) -> Result<Contact, AppError> {
    st.contacts
        .find(id)
        .await
        .map_err(|e| AppError::internal("failed to get contact").with_source(e))?
        .filter(|c| can_view(viewer, &c.row))
        .ok_or_else(|| AppError::not_found("contact not found"))
}

pub async fn update_contact(
    st: &AppState,
    caller: i64,
    id: i64,
    req: UpdateContactRequest,
) -> Result<Contact, AppError> {
    let patch = ContactPatch::from_request(req, OffsetDateTime::now_utc())?;
    owned_contact(st, caller, id).await?;

    let contact = st
        .contacts
        .update(id, caller, patch)
        .await
        .map_err(|e| write_error(e, "failed to update contact"))?;
    info!(contact_id = id, user_id = caller, "contact updated");
    Ok(contact)
}

pub async fn delete_contact(st: &AppState, caller: i64, id: i64) -> Result<(), AppError> {
    st.contacts
        .soft_delete(id, caller)
        .await
        .map_err(|e| AppError::from_store(e, "contact not found", "failed to delete contact"))?;
    info!(contact_id = id, user_id = caller, "contact deleted");
    Ok(())
}

fn parse_tag_ids(raw: Option<&str>) -> Result<Vec<i64>, AppError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| AppError::invalid_request("tag must be a comma separated list of ids"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(dedup(ids))
}

/// A geo filter is requested once either coordinate is non-zero; it then needs
/// both coordinates and a positive radius.
fn geo_filter(lat: Option<f64>, lng: Option<f64>, radius: Option<f64>) -> Result<Option<GeoFilter>, AppError> {
    if lat.unwrap_or(0.0) == 0.0 && lng.unwrap_or(0.0) == 0.0 {
        return Ok(None);
    }
    let radius_km = match radius {
        Some(r) if r.is_finite() && r > 0.0 => r,
        _ => {
            return Err(AppError::invalid_request(
                "radius is required when filtering by location",
            ))
        }
    };
    let (Some(lat), Some(lng)) = (lat, lng) else {
        return Err(AppError::invalid_request(
            "lat and lng are both required when filtering by location",
        ));
    };
    let center =
        Point::new(lat, lng).map_err(|e| AppError::invalid_request(e.to_string()))?;
    Ok(Some(GeoFilter { center, radius_km }))
}

pub fn list_filter(viewer: Option<i64>, q: ListContactsQuery) -> Result<ContactFilter, AppError> {
    let mut filter = ContactFilter::new(Scope::Visible(viewer), q.page, q.page_size);
    filter.tag_ids = parse_tag_ids(q.tag.as_deref())?;
    filter.search = not_blank(q.search);
    filter.geo = geo_filter(q.lat, q.lng, q.radius)?;
    Ok(filter)
}

async fn page_of(st: &AppState, filter: ContactFilter) -> Result<ContactsPage, AppError> {
    let (contacts, total_count) = st
        .contacts
        .list(&filter)
        .await
        .map_err(|e| AppError::internal("failed to list contacts").with_source(e))?;
    Ok(ContactsPage {
        contacts,
        total_count,
        page: filter.page,
        page_size: filter.page_size,
    })
}

pub async fn list_contacts(
    st: &AppState,
    viewer: Option<i64>,
    q: ListContactsQuery,
) -> Result<ContactsPage, AppError> {
    let filter = list_filter(viewer, q)?;
    page_of(st, filter).await
}

pub async fn list_my_contacts(st: &AppState, caller: i64, q: PageQuery) -> Result<ContactsPage, AppError> {
    page_of(st, ContactFilter::new(Scope::Owner(caller), q.page, q.page_size)).await
}

pub async fn update_contact_visibility(
    st: &AppState,
    caller: i64,
    id: i64,
    raw: &str,
) -> Result<(), AppError> {
    let visibility = parse_visibility(raw)?;
    owned_contact(st, caller, id).await?;
    st.contacts
        .set_visibility(id, caller, visibility)
        .await
        .map_err(|e| AppError::from_store(e, "contact not found", "failed to update visibility"))?;
    info!(contact_id = id, %visibility, "contact visibility changed");
    Ok(())
}

pub async fn create_contact_address(
    st: &AppState,
    caller: i64,
    contact_id: i64,
    req: CreateAddressRequest,
) -> Result<Address, AppError> {
    let location = Point::new(req.location.lat, req.location.lng)
        .map_err(|e| AppError::invalid_request(e.to_string()))?;
    let contact = owned_contact(st, caller, contact_id).await?;
    if contact.address.is_some() {
        return Err(AppError::invalid_request("contact already has an address"));
    }

    let new = NewAddress {
        external_id: not_blank(req.external_id),
        label: not_blank(req.label),
        name: not_blank(req.name),
        location,
    };
    match st.contacts.create_address(contact_id, new).await {
        Ok(address) => {
            info!(contact_id, address_id = address.id, "address created");
            Ok(address)
        }
        // a concurrent request won the unique constraint
        Err(StoreError::AlreadyExists(_)) => {
            Err(AppError::invalid_request("contact already has an address"))
        }
        Err(e) => Err(AppError::from_store(e, "contact not found", "failed to create address")),
    }
}

pub async fn save_contact(st: &AppState, caller: i64, contact_id: i64) -> Result<(), AppError> {
    get_contact(st, Some(caller), contact_id).await?;
    match st.contacts.save(caller, contact_id).await {
        Ok(()) => Ok(()),
        Err(StoreError::AlreadyExists(_)) => Err(AppError::already_exists("contact already saved")),
        Err(e) => Err(AppError::from_store(e, "contact not found", "failed to save contact")),
    }
}

pub async fn delete_saved_contact(st: &AppState, caller: i64, contact_id: i64) -> Result<(), AppError> {
    st.contacts
        .unsave(caller, contact_id)
        .await
        .map_err(|e| AppError::from_store(e, "saved contact not found", "failed to delete saved contact"))
}

pub async fn list_saved_contacts(st: &AppState, caller: i64) -> Result<Vec<Contact>, AppError> {
    st.contacts
        .list_saved(caller)
        .await
        .map_err(|e| AppError::internal("failed to list saved contacts").with_source(e))
}
