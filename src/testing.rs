//! In-memory stand-ins for the stores and external collaborators.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    auth::{
        jwt::SessionKeys,
        repo::UserStore,
        repo_types::{NewUser, Otp, User},
    },
    config::{AppConfig, DbConfig, JwtConfig, MailConfig, StorageConfig},
    contacts::{
        patch::ContactPatch,
        query::{ContactFilter, Scope},
        repo::ContactStore,
        repo_types::{Address, Contact, ContactRow, Link, NewAddress, NewContact, NewLink, Point, Visibility},
    },
    db::{StoreError, StoreResult},
    mail::{MailMessage, Mailer},
    state::AppState,
    storage::StorageClient,
    tags::repo::{Tag, TagStore},
};

pub const TEST_ADMIN_KEY: &str = "test-admin-key";

pub fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        request_timeout_secs: 5,
        db: DbConfig {
            url: "postgres://localhost/touchly_test".into(),
            max_connections: 1,
            min_connections: 0,
            acquire_timeout_secs: 1,
            idle_timeout_secs: 1,
            max_lifetime_secs: 1,
        },
        jwt: JwtConfig {
            secret: "test-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_days: 30,
        },
        admin_api_key: TEST_ADMIN_KEY.into(),
        storage: StorageConfig {
            endpoint: "http://fake.local".into(),
            bucket: "fake".into(),
            access_key: "fake".into(),
            secret_key: "fake".into(),
            region: "auto".into(),
        },
        mail: MailConfig {
            api_key: "fake".into(),
            api_url: "http://fake.local".into(),
            from: "hi@touchly.test".into(),
        },
    }
}

pub struct FakeStorage;

#[async_trait]
impl StorageClient for FakeStorage {
    async fn presign_put(&self, key: &str, ttl: Duration) -> anyhow::Result<String> {
        Ok(format!("https://fake.local/{key}?expires={}", ttl.as_secs()))
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<MailMessage>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &MailMessage) -> anyhow::Result<()> {
        if self.fail.swap(false, Ordering::SeqCst) {
            anyhow::bail!("mail provider unavailable");
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
struct Users {
    users: Vec<User>,
    otps: Vec<Otp>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemUserStore {
    inner: Mutex<Users>,
}

#[async_trait]
impl UserStore for MemUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let g = self.inner.lock().unwrap();
        Ok(g.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let g = self.inner.lock().unwrap();
        Ok(g.users.iter().find(|u| u.id == id && u.is_active()).cloned())
    }

    async fn create(&self, new: &NewUser) -> StoreResult<User> {
        let mut g = self.inner.lock().unwrap();
        if g.users.iter().any(|u| u.email == new.email) {
            return Err(StoreError::AlreadyExists("users_email_key".into()));
        }
        g.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: g.next_id,
            email: new.email.clone(),
            password_hash: new.password_hash.clone(),
            created_at: now,
            updated_at: now,
            email_verified_at: new.email_verified_at,
            deleted_at: None,
        };
        g.users.push(user.clone());
        Ok(user)
    }

    async fn set_password_if_unset(&self, email: &str, password_hash: &str) -> StoreResult<()> {
        let mut g = self.inner.lock().unwrap();
        let user = g
            .users
            .iter_mut()
            .find(|u| {
                u.email == email && u.is_verified() && u.password_hash.is_none() && u.is_active()
            })
            .ok_or(StoreError::NotFound)?;
        user.password_hash = Some(password_hash.to_string());
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn create_otp(
        &self,
        user_id: i64,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<Otp> {
        let mut g = self.inner.lock().unwrap();
        let otp = Otp {
            id: g.otps.len() as i64 + 1,
            user_id,
            otp_code: code.to_string(),
            expires_at,
            is_used: false,
            created_at: OffsetDateTime::now_utc(),
        };
        g.otps.push(otp.clone());
        Ok(otp)
    }

    async fn find_otp(&self, user_id: i64, code: &str) -> StoreResult<Option<Otp>> {
        let g = self.inner.lock().unwrap();
        Ok(g
            .otps
            .iter()
            .rev()
            .find(|o| o.user_id == user_id && o.otp_code == code)
            .cloned())
    }

    async fn consume_otp(&self, otp_id: i64, user_id: i64) -> StoreResult<()> {
        let mut g = self.inner.lock().unwrap();
        let otp = g
            .otps
            .iter_mut()
            .find(|o| o.id == otp_id && !o.is_used)
            .ok_or(StoreError::NotFound)?;
        otp.is_used = true;
        if let Some(user) = g.users.iter_mut().find(|u| u.id == user_id) {
            let now = OffsetDateTime::now_utc();
            user.email_verified_at.get_or_insert(now);
            user.updated_at = now;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Tags {
    tags: Vec<Tag>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemTagStore {
    inner: Mutex<Tags>,
}

impl MemTagStore {
    fn get(&self, id: i64) -> Option<Tag> {
        let g = self.inner.lock().unwrap();
        g.tags.iter().find(|t| t.id == id).cloned()
    }
}

#[async_trait]
impl TagStore for MemTagStore {
    async fn list(&self) -> StoreResult<Vec<Tag>> {
        let mut tags = self.inner.lock().unwrap().tags.clone();
        tags.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(tags)
    }

    async fn create(&self, name: &str) -> StoreResult<Tag> {
        let mut g = self.inner.lock().unwrap();
        if g.tags.iter().any(|t| t.name == name) {
            return Err(StoreError::AlreadyExists("tags_name_key".into()));
        }
        g.next_id += 1;
        let tag = Tag {
            id: g.next_id,
            name: name.to_string(),
        };
        g.tags.push(tag.clone());
        Ok(tag)
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        let mut g = self.inner.lock().unwrap();
        let before = g.tags.len();
        g.tags.retain(|t| t.id != id);
        if g.tags.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[derive(Default)]
struct Contacts {
    rows: Vec<ContactRow>,
    tags: HashMap<i64, Vec<i64>>,
    links: HashMap<i64, Vec<Link>>,
    addresses: HashMap<i64, Address>,
    /// (user, contact, saved at)
    saved: Vec<(i64, i64, OffsetDateTime)>,
    next_id: i64,
    next_link_id: i64,
    next_address_id: i64,
}

pub struct MemContactStore {
    inner: Mutex<Contacts>,
    tags: Arc<MemTagStore>,
}

/// Great-circle distance in meters.
pub fn haversine_m(a: Point, b: Point) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_008.8;
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

impl MemContactStore {
    pub fn new(tags: Arc<MemTagStore>) -> Self {
        Self {
            inner: Mutex::new(Contacts::default()),
            tags,
        }
    }

    fn check_tags(&self, ids: &[i64]) -> StoreResult<()> {
        match ids.iter().find(|id| self.tags.get(**id).is_none()) {
            Some(id) => Err(StoreError::ForeignKeyViolation(format!("contact_tags tag {id}"))),
            None => Ok(()),
        }
    }

    fn build_links(g: &mut Contacts, contact_id: i64, links: Vec<NewLink>) -> Vec<Link> {
        links
            .into_iter()
            .map(|l| {
                g.next_link_id += 1;
                Link {
                    id: g.next_link_id,
                    contact_id,
                    kind: l.kind,
                    link: l.link,
                    label: l.label,
                }
            })
            .collect()
    }

    fn assemble(&self, g: &Contacts, row: &ContactRow) -> Contact {
        let mut tags: Vec<Tag> = g
            .tags
            .get(&row.id)
            .map(|ids| ids.iter().filter_map(|id| self.tags.get(*id)).collect())
            .unwrap_or_default();
        tags.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Contact {
            row: row.clone(),
            tags,
            social_links: g.links.get(&row.id).cloned().unwrap_or_default(),
            address: g.addresses.get(&row.id).cloned(),
        }
    }

    fn live<'a>(g: &'a mut Contacts, id: i64, owner: i64) -> StoreResult<&'a mut ContactRow> {
        g.rows
            .iter_mut()
            .find(|r| r.id == id && r.user_id == owner && r.deleted_at.is_none())
            .ok_or(StoreError::NotFound)
    }

    fn matches(&self, g: &Contacts, row: &ContactRow, filter: &ContactFilter) -> bool {
        if row.deleted_at.is_some() {
            return false;
        }
        let scoped = match filter.scope {
            Scope::Visible(viewer) => {
                row.visibility == Visibility::Public || viewer == Some(row.user_id)
            }
            Scope::Owner(owner) => row.user_id == owner,
        };
        if !scoped {
            return false;
        }
        if !filter.tag_ids.is_empty() {
            let has = g
                .tags
                .get(&row.id)
                .map(|ids| ids.iter().any(|id| filter.tag_ids.contains(id)))
                .unwrap_or(false);
            if !has {
                return false;
            }
        }
        if let Some(search) = filter.search.as_deref() {
            let needle = search.to_lowercase();
            let hit = row.name.to_lowercase().contains(&needle)
                || row
                    .activity_name
                    .as_deref()
                    .map(|a| a.to_lowercase().contains(&needle))
                    .unwrap_or(false);
            if !hit {
                return false;
            }
        }
        if let Some(geo) = filter.geo {
            match g.addresses.get(&row.id) {
                Some(a) if haversine_m(a.location, geo.center) <= geo.radius_meters() => {}
                _ => return false,
            }
        }
        true
    }
}

#[async_trait]
impl ContactStore for MemContactStore {
    async fn create(&self, new: NewContact) -> StoreResult<Contact> {
        self.check_tags(&new.tag_ids)?;
        let mut g = self.inner.lock().unwrap();
        g.next_id += 1;
        let id = g.next_id;
        let now = OffsetDateTime::now_utc();
        let row = ContactRow {
            id,
            user_id: new.user_id,
            name: new.name,
            avatar: new.avatar,
            activity_name: new.activity_name,
            website: new.website,
            country_code: new.country_code,
            about: new.about,
            phone_number: new.phone_number,
            phone_calling_code: new.phone_calling_code,
            email: new.email,
            visibility: new.visibility,
            views_amount: 0,
            saves_amount: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let links = Self::build_links(&mut g, id, new.links);
        g.links.insert(id, links);
        g.tags.insert(id, new.tag_ids);
        g.rows.push(row.clone());
        Ok(self.assemble(&g, &row))
    }

    async fn find(&self, id: i64) -> StoreResult<Option<Contact>> {
        let g = self.inner.lock().unwrap();
        Ok(g
            .rows
            .iter()
            .find(|r| r.id == id && r.deleted_at.is_none())
            .map(|r| self.assemble(&g, r)))
    }

    async fn update(&self, id: i64, owner: i64, patch: ContactPatch) -> StoreResult<Contact> {
        if let Some(ids) = &patch.tag_ids {
            self.check_tags(ids)?;
        }
        let mut g = self.inner.lock().unwrap();
        let row = Self::live(&mut g, id, owner)?;
        for column in &patch.columns {
            column.apply(row);
        }
        let row = row.clone();
        if let Some(ids) = patch.tag_ids {
            g.tags.insert(id, ids);
        }
        if let Some(links) = patch.links {
            let links = Self::build_links(&mut g, id, links);
            g.links.insert(id, links);
        }
        Ok(self.assemble(&g, &row))
    }

    async fn soft_delete(&self, id: i64, owner: i64) -> StoreResult<()> {
        let mut g = self.inner.lock().unwrap();
        let row = Self::live(&mut g, id, owner)?;
        row.deleted_at = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    async fn list(&self, filter: &ContactFilter) -> StoreResult<(Vec<Contact>, i64)> {
        let g = self.inner.lock().unwrap();
        let mut rows: Vec<&ContactRow> = g
            .rows
            .iter()
            .filter(|r| self.matches(&g, r, filter))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = rows.len() as i64;
        let page = rows
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.page_size as usize)
            .map(|r| self.assemble(&g, r))
            .collect();
        Ok((page, total))
    }

    async fn set_visibility(
        &self,
        id: i64,
        owner: i64,
        visibility: Visibility,
    ) -> StoreResult<()> {
        let mut g = self.inner.lock().unwrap();
        let row = Self::live(&mut g, id, owner)?;
        row.visibility = visibility;
        row.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn create_address(&self, contact_id: i64, address: NewAddress) -> StoreResult<Address> {
        let mut g = self.inner.lock().unwrap();
        if !g.rows.iter().any(|r| r.id == contact_id) {
            return Err(StoreError::ForeignKeyViolation("addresses_contact_id_fkey".into()));
        }
        if g.addresses.contains_key(&contact_id) {
            return Err(StoreError::AlreadyExists("addresses_contact_id_key".into()));
        }
        g.next_address_id += 1;
        let now = OffsetDateTime::now_utc();
        let address = Address {
            id: g.next_address_id,
            external_id: address.external_id,
            contact_id,
            label: address.label,
            name: address.name,
            location: address.location,
            created_at: now,
            updated_at: now,
        };
        g.addresses.insert(contact_id, address.clone());
        Ok(address)
    }

    async fn save(&self, user_id: i64, contact_id: i64) -> StoreResult<()> {
        let mut g = self.inner.lock().unwrap();
        if g.saved.iter().any(|(u, c, _)| *u == user_id && *c == contact_id) {
            return Err(StoreError::AlreadyExists("saved_contacts_pkey".into()));
        }
        let row = g
            .rows
            .iter_mut()
            .find(|r| r.id == contact_id)
            .ok_or_else(|| StoreError::ForeignKeyViolation("saved_contacts_contact_id_fkey".into()))?;
        row.saves_amount += 1;
        g.saved.push((user_id, contact_id, OffsetDateTime::now_utc()));
        Ok(())
    }

    async fn unsave(&self, user_id: i64, contact_id: i64) -> StoreResult<()> {
        let mut g = self.inner.lock().unwrap();
        let before = g.saved.len();
        g.saved.retain(|(u, c, _)| !(*u == user_id && *c == contact_id));
        if g.saved.len() == before {
            return Err(StoreError::NotFound);
        }
        if let Some(row) = g.rows.iter_mut().find(|r| r.id == contact_id) {
            row.saves_amount = (row.saves_amount - 1).max(0);
        }
        Ok(())
    }

    async fn list_saved(&self, user_id: i64) -> StoreResult<Vec<Contact>> {
        let g = self.inner.lock().unwrap();
        let mut saved: Vec<_> = g.saved.iter().filter(|(u, _, _)| *u == user_id).collect();
        saved.sort_by(|a, b| b.2.cmp(&a.2).then(b.1.cmp(&a.1)));
        Ok(saved
            .into_iter()
            .filter_map(|(_, contact_id, _)| g.rows.iter().find(|r| r.id == *contact_id))
            .filter(|r| {
                r.deleted_at.is_none()
                    && (r.visibility == Visibility::Public || r.user_id == user_id)
            })
            .map(|r| self.assemble(&g, r))
            .collect())
    }
}

/// Application state wired to fakes, with handles kept for inspection.
pub struct TestEnv {
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
}

impl TestEnv {
    pub fn new() -> Self {
        let config = Arc::new(test_config());
        let tags = Arc::new(MemTagStore::default());
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState {
            keys: SessionKeys::new(&config.jwt),
            config,
            users: Arc::new(MemUserStore::default()),
            contacts: Arc::new(MemContactStore::new(tags.clone())),
            tags,
            storage: Arc::new(FakeStorage),
            mailer: mailer.clone(),
        };
        Self { state, mailer }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_matches_known_distance() {
        // Paris to London is about 344 km
        let paris = Point { lat: 48.8566, lng: 2.3522 };
        let london = Point { lat: 51.5074, lng: -0.1278 };
        let d = haversine_m(paris, london);
        assert!((d - 343_500.0).abs() < 2_000.0, "{d}");
    }
}
