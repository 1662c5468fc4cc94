use sqlx::{Postgres, QueryBuilder};

use crate::contacts::repo_types::Point;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Columns of `ContactRow`, read through the `c` alias.
pub const CONTACT_COLUMNS: &str = "c.id, c.user_id, c.name, c.avatar, c.activity_name, c.website, \
    c.country_code, c.about, c.phone_number, c.phone_calling_code, c.email, c.visibility, \
    c.views_amount, c.saves_amount, c.created_at, c.updated_at, c.deleted_at";

/// Whose contacts a listing may include.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Public contacts, plus the viewer's own when signed in.
    Visible(Option<i64>),
    /// Every contact of this owner, any visibility.
    Owner(i64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFilter {
    pub center: Point,
    pub radius_km: f64,
}

impl GeoFilter {
    pub fn radius_meters(&self) -> f64 {
        self.radius_km * 1000.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactFilter {
    pub scope: Scope,
    /// Match contacts carrying any of these tags.
    pub tag_ids: Vec<i64>,
    /// Raw substring; escaped when turned into a pattern.
    pub search: Option<String>,
    pub geo: Option<GeoFilter>,
    pub page: i64,
    pub page_size: i64,
}

impl ContactFilter {
    pub fn new(scope: Scope, page: Option<i64>, page_size: Option<i64>) -> Self {
        let (page, page_size) = normalize_page(page, page_size);
        Self {
            scope,
            tag_ids: Vec::new(),
            search: None,
            geo: None,
            page,
            page_size,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

/// Page below 1 becomes 1, size below 1 becomes the default, size is capped.
pub fn normalize_page(page: Option<i64>, page_size: Option<i64>) -> (i64, i64) {
    let page = page.filter(|p| *p >= 1).unwrap_or(1);
    let size = page_size
        .filter(|s| *s >= 1)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);
    (page, size)
}

/// Escapes LIKE metacharacters so user input only ever matches literally.
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn push_from(qb: &mut QueryBuilder<'static, Postgres>, filter: &ContactFilter) {
    qb.push(" FROM contacts c");
    if filter.geo.is_some() {
        qb.push(" JOIN addresses a ON a.contact_id = c.id");
    }
}

/// WHERE clause shared by the count and the page query.
fn push_filters(qb: &mut QueryBuilder<'static, Postgres>, filter: &ContactFilter) {
    qb.push(" WHERE c.deleted_at IS NULL");

    match filter.scope {
        Scope::Visible(None) => {
            qb.push(" AND c.visibility = 'public'");
        }
        Scope::Visible(Some(viewer)) => {
            qb.push(" AND (c.visibility = 'public' OR c.user_id = ")
                .push_bind(viewer)
                .push(")");
        }
        Scope::Owner(owner) => {
            qb.push(" AND c.user_id = ").push_bind(owner);
        }
    }

    if !filter.tag_ids.is_empty() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM contact_tags ct WHERE ct.contact_id = c.id AND ct.tag_id = ANY(",
        )
        .push_bind(filter.tag_ids.clone())
        .push("))");
    }

    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (c.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.activity_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(geo) = filter.geo {
        qb.push(" AND ST_DWithin(a.location, ST_SetSRID(ST_MakePoint(")
            .push_bind(geo.center.lng)
            .push(", ")
            .push_bind(geo.center.lat)
            .push("), 4326)::geography, ")
            .push_bind(geo.radius_meters())
            .push(")");
    }
}

pub fn count_query(filter: &ContactFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*)");
    push_from(&mut qb, filter);
    push_filters(&mut qb, filter);
    qb
}

/// Newest first; id breaks ties so pages never overlap.
pub fn page_query(filter: &ContactFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {CONTACT_COLUMNS}"));
    push_from(&mut qb, filter);
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY c.created_at DESC, c.id DESC LIMIT ")
        .push_bind(filter.page_size)
        .push(" OFFSET ")
        .push_bind(filter.offset());
    qb
}
