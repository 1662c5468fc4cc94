use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use crate::{
    contacts::{
        patch::ContactPatch,
        query::{count_query, page_query, ContactFilter, CONTACT_COLUMNS},
        repo_types::{
            Address, AddressRow, Contact, ContactRow, Link, NewAddress, NewContact, NewLink,
            Visibility,
        },
    },
    db::{StoreError, StoreResult},
    tags::repo::Tag,
};

/// Persistence seam for contacts and everything hanging off them.
/// Every read excludes soft-deleted contacts.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Inserts the contact with its tag and link sets in one transaction.
    /// An unknown tag id is a `ForeignKeyViolation`.
    async fn create(&self, new: NewContact) -> StoreResult<Contact>;
    async fn find(&self, id: i64) -> StoreResult<Option<Contact>>;
    /// Applies the patch, replaces the sets it carries and re-reads the contact,
    /// all in one transaction. `NotFound` if no live contact of `owner` has this id.
    async fn update(&self, id: i64, owner: i64, patch: ContactPatch) -> StoreResult<Contact>;
    /// Soft delete scoped by owner; `NotFound` on zero rows.
    async fn soft_delete(&self, id: i64, owner: i64) -> StoreResult<()>;
    async fn list(&self, filter: &ContactFilter) -> StoreResult<(Vec<Contact>, i64)>;
    async fn set_visibility(&self, id: i64, owner: i64, visibility: Visibility)
        -> StoreResult<()>;
    /// `AlreadyExists` when the contact already has an address.
    async fn create_address(&self, contact_id: i64, address: NewAddress) -> StoreResult<Address>;
    /// `AlreadyExists` on a duplicate save. Bumps `saves_amount` atomically.
    async fn save(&self, user_id: i64, contact_id: i64) -> StoreResult<()>;
    /// `NotFound` if the contact was not saved.
    async fn unsave(&self, user_id: i64, contact_id: i64) -> StoreResult<()>;
    /// Saved contacts still visible to the user, newest save first.
    async fn list_saved(&self, user_id: i64) -> StoreResult<Vec<Contact>>;
}

/// The point comes back as raw doubles; text output would round the coordinates.
const ADDRESS_COLUMNS: &str = "id, external_id, contact_id, label, name, \
    ST_Y(location::geometry) AS lat, ST_X(location::geometry) AS lng, created_at, updated_at";

#[derive(Clone)]
pub struct PgContactStore {
    db: PgPool,
}

impl PgContactStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Tags, links and addresses for a batch of contacts.
#[derive(Default)]
struct Related {
    tags: HashMap<i64, Vec<Tag>>,
    links: HashMap<i64, Vec<Link>>,
    addresses: HashMap<i64, Address>,
}

impl Related {
    fn attach(&mut self, row: ContactRow) -> Contact {
        let id = row.id;
        Contact {
            tags: self.tags.remove(&id).unwrap_or_default(),
            social_links: self.links.remove(&id).unwrap_or_default(),
            address: self.addresses.remove(&id),
            row,
        }
    }
}

async fn load_related(conn: &mut PgConnection, ids: &[i64]) -> StoreResult<Related> {
    let mut related = Related::default();
    if ids.is_empty() {
        return Ok(related);
    }

    let tag_rows = sqlx::query_as::<_, (i64, i64, String)>(
        r#"
        SELECT ct.contact_id, t.id, t.name
        FROM contact_tags ct
        JOIN tags t ON t.id = ct.tag_id
        WHERE ct.contact_id = ANY($1)
        ORDER BY t.name, t.id
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;
    for (contact_id, id, name) in tag_rows {
        related
            .tags
            .entry(contact_id)
            .or_default()
            .push(Tag { id, name });
    }

    let links = sqlx::query_as::<_, Link>(
        r#"
        SELECT id, contact_id, type AS kind, link, label
        FROM social_media_links
        WHERE contact_id = ANY($1)
        ORDER BY id
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;
    for link in links {
        related.links.entry(link.contact_id).or_default().push(link);
    }

    let addresses = sqlx::query_as::<_, AddressRow>(&format!(
        "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE contact_id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;
    for row in addresses {
        related.addresses.insert(row.contact_id, Address::from(row));
    }

    Ok(related)
}

async fn assemble(conn: &mut PgConnection, rows: Vec<ContactRow>) -> StoreResult<Vec<Contact>> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut related = load_related(conn, &ids).await?;
    Ok(rows.into_iter().map(|row| related.attach(row)).collect())
}

async fn load_contact(conn: &mut PgConnection, id: i64) -> StoreResult<Option<Contact>> {
    let row = sqlx::query_as::<_, ContactRow>(&format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts c WHERE c.id = $1 AND c.deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(assemble(conn, vec![row]).await?.pop())
}

async fn replace_tags(conn: &mut PgConnection, contact_id: i64, tag_ids: &[i64]) -> StoreResult<()> {
    sqlx::query("DELETE FROM contact_tags WHERE contact_id = $1")
        .bind(contact_id)
        .execute(&mut *conn)
        .await?;
    if tag_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO contact_tags (contact_id, tag_id)
        SELECT $1, UNNEST($2::BIGINT[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(contact_id)
    .bind(tag_ids)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn replace_links(conn: &mut PgConnection, contact_id: i64, links: &[NewLink]) -> StoreResult<()> {
    sqlx::query("DELETE FROM social_media_links WHERE contact_id = $1")
        .bind(contact_id)
        .execute(&mut *conn)
        .await?;
    for link in links {
        sqlx::query(
            r#"
            INSERT INTO social_media_links (contact_id, type, link, label)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(contact_id)
        .bind(&link.kind)
        .bind(&link.link)
        .bind(&link.label)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl ContactStore for PgContactStore {
    async fn create(&self, new: NewContact) -> StoreResult<Contact> {
        let mut tx = self.db.begin().await?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO contacts (
                user_id, name, avatar, activity_name, website, country_code, about,
                phone_number, phone_calling_code, email, visibility
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(new.user_id)
        .bind(&new.name)
        .bind(&new.avatar)
        .bind(&new.activity_name)
        .bind(&new.website)
        .bind(&new.country_code)
        .bind(&new.about)
        .bind(&new.phone_number)
        .bind(&new.phone_calling_code)
        .bind(&new.email)
        .bind(new.visibility)
        .fetch_one(&mut *tx)
        .await?;

        replace_tags(&mut tx, id, &new.tag_ids).await?;
        replace_links(&mut tx, id, &new.links).await?;

        let contact = load_contact(&mut tx, id).await?.ok_or(StoreError::NotFound)?;
        tx.commit().await?;
        Ok(contact)
    }

    async fn find(&self, id: i64) -> StoreResult<Option<Contact>> {
        let mut conn = self.db.acquire().await?;
        load_contact(&mut conn, id).await
    }

    async fn update(&self, id: i64, owner: i64, patch: ContactPatch) -> StoreResult<Contact> {
        let mut tx = self.db.begin().await?;

        let res = patch.update_query(id, owner).build().execute(&mut *tx).await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        if let Some(tag_ids) = &patch.tag_ids {
            replace_tags(&mut tx, id, tag_ids).await?;
        }
        if let Some(links) = &patch.links {
            replace_links(&mut tx, id, links).await?;
        }

        let contact = load_contact(&mut tx, id).await?.ok_or(StoreError::NotFound)?;
        tx.commit().await?;
        Ok(contact)
    }

    async fn soft_delete(&self, id: i64, owner: i64) -> StoreResult<()> {
        let res = sqlx::query(
            r#"
            UPDATE contacts
            SET deleted_at = now(), updated_at = now()
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(owner)
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Count and page read one snapshot, so `total` always agrees with the rows.
    async fn list(&self, filter: &ContactFilter) -> StoreResult<(Vec<Contact>, i64)> {
        let mut tx = self.db.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let (total,): (i64,) = count_query(filter)
            .build_query_as()
            .fetch_one(&mut *tx)
            .await?;
        if total == 0 {
            tx.commit().await?;
            return Ok((Vec::new(), 0));
        }

        let rows: Vec<ContactRow> = page_query(filter)
            .build_query_as()
            .fetch_all(&mut *tx)
            .await?;
        let contacts = assemble(&mut tx, rows).await?;
        tx.commit().await?;
        Ok((contacts, total))
    }

    async fn set_visibility(
        &self,
        id: i64,
        owner: i64,
        visibility: Visibility,
    ) -> StoreResult<()> {
        let res = sqlx::query(
            r#"
            UPDATE contacts
            SET visibility = $1, updated_at = now()
            WHERE id = $2 AND user_id = $3 AND deleted_at IS NULL
            "#,
        )
        .bind(visibility)
        .bind(id)
        .bind(owner)
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn create_address(&self, contact_id: i64, address: NewAddress) -> StoreResult<Address> {
        let row = sqlx::query_as::<_, AddressRow>(&format!(
            r#"
            INSERT INTO addresses (contact_id, external_id, label, name, location)
            VALUES ($1, $2, $3, $4, ST_SetSRID(ST_MakePoint($5, $6), 4326)::geography)
            RETURNING {ADDRESS_COLUMNS}
            "#
        ))
        .bind(contact_id)
        .bind(&address.external_id)
        .bind(&address.label)
        .bind(&address.name)
        .bind(address.location.lng)
        .bind(address.location.lat)
        .fetch_one(&self.db)
        .await?;
        Ok(Address::from(row))
    }

    async fn save(&self, user_id: i64, contact_id: i64) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query("INSERT INTO saved_contacts (user_id, contact_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(contact_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE contacts SET saves_amount = saves_amount + 1 WHERE id = $1")
            .bind(contact_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn unsave(&self, user_id: i64, contact_id: i64) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        let res = sqlx::query("DELETE FROM saved_contacts WHERE user_id = $1 AND contact_id = $2")
            .bind(user_id)
            .bind(contact_id)
            .execute(&mut *tx)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        sqlx::query(
            "UPDATE contacts SET saves_amount = GREATEST(saves_amount - 1, 0) WHERE id = $1",
        )
        .bind(contact_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_saved(&self, user_id: i64) -> StoreResult<Vec<Contact>> {
        let mut conn = self.db.acquire().await?;
        let rows = sqlx::query_as::<_, ContactRow>(&format!(
            r#"
            SELECT {CONTACT_COLUMNS}
            FROM saved_contacts s
            JOIN contacts c ON c.id = s.contact_id
            WHERE s.user_id = $1
              AND c.deleted_at IS NULL
              AND (c.visibility = 'public' OR c.user_id = $1)
            ORDER BY s.created_at DESC, c.id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
        assemble(&mut conn, rows).await
    }
}
