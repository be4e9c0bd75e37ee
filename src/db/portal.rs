use futures_util::TryStreamExt;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::warn;

use crate::id::{ContentUri, RoomId};

/// GUIDs of 1:1 chats carry the `;-;` participant delimiter twice,
/// e.g. `svc;-;userA;-;userB`; group chats only carry the service prefix.
/// TODO: verify against the real identifier grammar of the remote service.
const PRIVATE_CHAT_PATTERN: &str = "%;-;%;-;%";

/// Factory and finder for [`Portal`] entities. Owns nothing but the pool
/// handle it was constructed with.
pub struct PortalQuery {
    db: SqlitePool,
}

impl PortalQuery {
    pub(crate) fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Fresh zero-valued portal bound to this gateway's pool. No query is
    /// executed; populate the fields by hand and call [`Portal::insert`].
    pub fn new_portal(&self) -> Portal {
        Portal {
            db: self.db.clone(),
            guid: String::new(),
            mxid: None,
            name: String::new(),
            avatar: String::new(),
            avatar_url: None,
            encrypted: false,
        }
    }

    /// Every portal in the table, in whatever order the store returns them.
    /// Lookup failures collapse to an empty list; use [`Self::try_get_all`]
    /// to tell them apart.
    pub async fn get_all(&self) -> Vec<Portal> {
        self.try_get_all().await.unwrap_or_else(|err| {
            warn!(error = %err, "Portal query failed");
            Vec::new()
        })
    }

    pub async fn try_get_all(&self) -> sqlx::Result<Vec<Portal>> {
        let query = sqlx::query("SELECT guid, mxid, name, avatar, avatar_url, encrypted FROM portal");
        self.fetch_all(query).await
    }

    /// The portal for the given remote-chat identifier. `None` covers both
    /// "no such row" and "lookup broke"; use [`Self::try_get_by_guid`] to
    /// tell them apart.
    pub async fn get_by_guid(&self, guid: &str) -> Option<Portal> {
        self.try_get_by_guid(guid).await.unwrap_or_else(|err| {
            warn!(guid, error = %err, "Portal lookup failed");
            None
        })
    }

    pub async fn try_get_by_guid(&self, guid: &str) -> sqlx::Result<Option<Portal>> {
        let query = sqlx::query(
            "SELECT guid, mxid, name, avatar, avatar_url, encrypted FROM portal WHERE guid = ?",
        )
        .bind(guid);
        self.fetch_optional(query).await
    }

    /// The portal for the given destination-room identifier, with the same
    /// collapsed semantics as [`Self::get_by_guid`].
    pub async fn get_by_mxid(&self, mxid: &RoomId) -> Option<Portal> {
        self.try_get_by_mxid(mxid).await.unwrap_or_else(|err| {
            warn!(mxid = %mxid, error = %err, "Portal lookup failed");
            None
        })
    }

    pub async fn try_get_by_mxid(&self, mxid: &RoomId) -> sqlx::Result<Option<Portal>> {
        let query = sqlx::query(
            "SELECT guid, mxid, name, avatar, avatar_url, encrypted FROM portal WHERE mxid = ?",
        )
        .bind(mxid.as_str());
        self.fetch_optional(query).await
    }

    /// Portals whose GUID matches the 1:1-chat pattern. Heuristic, see
    /// `PRIVATE_CHAT_PATTERN`. Collapses failures like [`Self::get_all`].
    pub async fn find_private_chats(&self) -> Vec<Portal> {
        self.try_find_private_chats().await.unwrap_or_else(|err| {
            warn!(error = %err, "Portal query failed");
            Vec::new()
        })
    }

    pub async fn try_find_private_chats(&self) -> sqlx::Result<Vec<Portal>> {
        let query = sqlx::query(
            "SELECT guid, mxid, name, avatar, avatar_url, encrypted FROM portal WHERE guid LIKE ?",
        )
        .bind(PRIVATE_CHAT_PATTERN);
        self.fetch_all(query).await
    }

    async fn fetch_all<'q>(
        &self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> sqlx::Result<Vec<Portal>> {
        let mut rows = query.fetch(&self.db);
        let mut portals = Vec::new();
        while let Some(row) = rows.try_next().await? {
            // rows that fail to scan are dropped, the rest are kept
            if let Some(portal) = self.new_portal().scan(&row) {
                portals.push(portal);
            }
        }
        Ok(portals)
    }

    async fn fetch_optional<'q>(
        &self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> sqlx::Result<Option<Portal>> {
        let row = query.fetch_optional(&self.db).await?;
        Ok(row.and_then(|row| self.new_portal().scan(&row)))
    }
}

/// One bridged chat: the remote conversation identified by `guid`, mirrored
/// into the destination room `mxid` once that room exists.
pub struct Portal {
    db: SqlitePool,

    pub guid: String,
    pub mxid: Option<RoomId>,

    pub name: String,
    pub avatar: String,
    pub avatar_url: Option<ContentUri>,
    pub encrypted: bool,
}

impl Portal {
    fn scan(mut self, row: &SqliteRow) -> Option<Self> {
        match self.try_scan(row) {
            Ok(()) => Some(self),
            Err(err) => {
                warn!(error = %err, "Portal row scan failed");
                None
            }
        }
    }

    fn try_scan(&mut self, row: &SqliteRow) -> sqlx::Result<()> {
        self.guid = row.try_get(0)?;
        let mxid: Option<String> = row.try_get(1)?;
        self.mxid = mxid.and_then(RoomId::new);
        self.name = row.try_get(2)?;
        self.avatar = row.try_get(3)?;
        let avatar_url: Option<String> = row.try_get(4)?;
        // stored text that isn't a valid mxc URI just means "no avatar"
        self.avatar_url = avatar_url.and_then(|url| url.parse().ok());
        self.encrypted = row.try_get(5)?;
        Ok(())
    }

    fn avatar_url_str(&self) -> String {
        self.avatar_url
            .as_ref()
            .map(ContentUri::to_string)
            .unwrap_or_default()
    }

    /// Writes a new row. A failure is logged and returned; ignoring the
    /// returned result reproduces plain log-and-continue behavior.
    pub async fn insert(&self) -> sqlx::Result<()> {
        let res = sqlx::query(
            "INSERT INTO portal (guid, mxid, name, avatar, avatar_url, encrypted) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&self.guid)
        .bind(self.mxid.as_ref().map(RoomId::as_str))
        .bind(&self.name)
        .bind(&self.avatar)
        .bind(self.avatar_url_str())
        .bind(self.encrypted)
        .execute(&self.db)
        .await;
        if let Err(err) = &res {
            warn!(guid = %self.guid, error = %err, "Failed to insert portal");
        }
        res.map(|_| ())
    }

    /// Overwrites the row matching this portal's GUID with the current
    /// field values. Same failure policy as [`Self::insert`].
    pub async fn update(&self) -> sqlx::Result<()> {
        let res = sqlx::query(
            "UPDATE portal SET mxid = ?, name = ?, avatar = ?, avatar_url = ?, encrypted = ? WHERE guid = ?",
        )
        .bind(self.mxid.as_ref().map(RoomId::as_str))
        .bind(&self.name)
        .bind(&self.avatar)
        .bind(self.avatar_url_str())
        .bind(self.encrypted)
        .bind(&self.guid)
        .execute(&self.db)
        .await;
        if let Err(err) = &res {
            warn!(guid = %self.guid, error = %err, "Failed to update portal");
        }
        res.map(|_| ())
    }

    /// Removes the row matching this portal's GUID. Same failure policy as
    /// [`Self::insert`].
    pub async fn delete(&self) -> sqlx::Result<()> {
        let res = sqlx::query("DELETE FROM portal WHERE guid = ?")
            .bind(&self.guid)
            .execute(&self.db)
            .await;
        if let Err(err) = &res {
            warn!(guid = %self.guid, error = %err, "Failed to delete portal");
        }
        res.map(|_| ())
    }
}
