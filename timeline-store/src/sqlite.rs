//! SQLite cache backend.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use timeline_types::{
    FeedItemRecord, FeedSource, ItemKind, ListSource, Post, PostStats, PostUri, Presentation,
    Profile, ProfileId, RecordUri, SourceId, SourceRef, ThreadedPost, Timestamp, ViewerState,
};
use tracing::{debug, info, warn};

use crate::batch::{WriteBatch, WriteCommand};
use crate::chain::order_chain;
use crate::error::StorageError;
use crate::notify::{requery, ChangeNotifier, Topic};
use crate::records::{TimelinePreference, TimelinePreferenceRecord};
use crate::TimelineStore;

/// Columns of a hydrated post. The caller appends the viewer id bind.
const POST_SELECT: &str = r#"
    SELECT p.uri, p.cid, p.text, p.indexed_at, p.reply_root, p.reply_parent,
           p.like_count, p.repost_count, p.reply_count,
           a.id AS author_id, a.handle AS author_handle,
           a.display_name AS author_display_name, a.avatar AS author_avatar,
           v.like_uri, v.repost_uri
    FROM posts p
    JOIN profiles a ON a.id = p.author_id
    LEFT JOIN post_viewer_states v ON v.post_uri = p.uri AND v.viewer_id = "#;

/// SQLite-based timeline cache.
///
/// The only writer is [`TimelineStore::apply_batch`]; reads run against the
/// pool and observe either the pre- or post-commit state of a batch.
#[derive(Clone)]
pub struct SqliteCache {
    pool: SqlitePool,
    notifier: Arc<ChangeNotifier>,
}

impl SqliteCache {
    /// Open (or create) an on-disk cache.
    ///
    /// Uses WAL mode for concurrent reads/writes.
    pub async fn new(path: &Path, max_connections: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(path.to_str().unwrap_or("timeline.db"))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let cache = Self::with_pool(pool);
        cache.run_migrations().await?;
        info!(path = %path.display(), "Opened timeline cache");
        Ok(cache)
    }

    /// Create an in-memory cache (for testing).
    ///
    /// The database lives as long as its single connection, so that
    /// connection is never recycled.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let cache = Self::with_pool(pool);
        cache.run_migrations().await?;
        Ok(cache)
    }

    fn with_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            notifier: Arc::new(ChangeNotifier::new()),
        }
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                handle TEXT NOT NULL,
                display_name TEXT,
                avatar TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                uri TEXT PRIMARY KEY,
                cid TEXT NOT NULL,
                author_id TEXT NOT NULL REFERENCES profiles(id),
                text TEXT NOT NULL,
                indexed_at INTEGER NOT NULL,
                reply_root TEXT,
                reply_parent TEXT,
                like_count INTEGER NOT NULL DEFAULT 0,
                repost_count INTEGER NOT NULL DEFAULT 0,
                reply_count INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS post_viewer_states (
                viewer_id TEXT NOT NULL,
                post_uri TEXT NOT NULL REFERENCES posts(uri),
                like_uri TEXT,
                repost_uri TEXT,
                PRIMARY KEY (viewer_id, post_uri)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS feed_sources (
                uri TEXT PRIMARY KEY,
                creator_id TEXT NOT NULL REFERENCES profiles(id),
                display_name TEXT NOT NULL,
                description TEXT,
                like_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS list_sources (
                uri TEXT PRIMARY KEY,
                creator_id TEXT NOT NULL REFERENCES profiles(id),
                name TEXT NOT NULL,
                purpose TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS timeline_items (
                viewer_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                post_uri TEXT NOT NULL REFERENCES posts(uri),
                kind TEXT NOT NULL,
                reposted_by TEXT REFERENCES profiles(id),
                reply_root TEXT,
                reply_parent TEXT,
                grandparent_author TEXT,
                sort_at INTEGER NOT NULL,
                PRIMARY KEY (viewer_id, source_id, post_uri)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS timeline_fetch_keys (
                viewer_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                last_fetched_at INTEGER NOT NULL,
                PRIMARY KEY (viewer_id, source_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS timeline_preferences (
                viewer_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                descriptor TEXT NOT NULL,
                position INTEGER NOT NULL,
                is_pinned INTEGER NOT NULL,
                presentation TEXT NOT NULL,
                PRIMARY KEY (viewer_id, source_id)
            )
            "#,
            // Keyset reads
            "CREATE INDEX IF NOT EXISTS idx_timeline_items_sort ON timeline_items(viewer_id, source_id, sort_at)",
            // Conversation reads
            "CREATE INDEX IF NOT EXISTS idx_posts_reply_root ON posts(reply_root)",
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Hydrate posts by URI, with the viewer's reactions.
    async fn load_posts(
        &self,
        viewer: &ProfileId,
        uris: &[&PostUri],
    ) -> Result<HashMap<PostUri, Post>, StorageError> {
        if uris.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(POST_SELECT);
        query.push_bind(viewer.as_str().to_owned());
        query.push(" WHERE p.deleted = 0 AND p.uri IN (");
        let mut separated = query.separated(", ");
        for uri in uris {
            separated.push_bind(uri.as_str().to_owned());
        }
        separated.push_unseparated(")");

        let rows: Vec<PostRow> = query.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(Post::from)
            .map(|post| (post.uri.clone(), post))
            .collect())
    }

    async fn load_feed_source(&self, uri: &RecordUri) -> Result<Option<FeedSource>, StorageError> {
        let row = sqlx::query_as::<_, FeedSourceRow>(
            r#"
            SELECT f.uri, f.display_name, f.description, f.like_count,
                   c.id AS creator_id, c.handle AS creator_handle,
                   c.display_name AS creator_display_name, c.avatar AS creator_avatar
            FROM feed_sources f
            JOIN profiles c ON c.id = f.creator_id
            WHERE f.uri = ?1
            "#,
        )
        .bind(uri.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedSource::from))
    }

    async fn load_list_source(&self, uri: &RecordUri) -> Result<Option<ListSource>, StorageError> {
        let row = sqlx::query_as::<_, ListSourceRow>(
            r#"
            SELECT l.uri, l.name, l.purpose,
                   c.id AS creator_id, c.handle AS creator_handle,
                   c.display_name AS creator_display_name, c.avatar AS creator_avatar
            FROM list_sources l
            JOIN profiles c ON c.id = l.creator_id
            WHERE l.uri = ?1
            "#,
        )
        .bind(uri.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ListSource::from))
    }

    fn observe<T, F, Fut>(&self, topics: &[Topic], query: F) -> BoxStream<'static, T>
    where
        T: Send + 'static,
        F: FnMut(SqliteCache) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<T, StorageError>> + Send + 'static,
    {
        let receivers = topics.iter().map(|t| self.notifier.subscribe(t)).collect();
        let cache = self.clone();
        let mut query = query;
        requery(receivers, move || query(cache.clone()))
    }
}

/// Apply one command inside an open transaction.
async fn apply_command(conn: &mut SqliteConnection, command: &WriteCommand) -> Result<(), StorageError> {
    match command {
        WriteCommand::ResetSource { viewer, source } => {
            let result = sqlx::query("DELETE FROM timeline_items WHERE viewer_id = ?1 AND source_id = ?2")
                .bind(viewer.as_str())
                .bind(source.as_str())
                .execute(&mut *conn)
                .await?;
            info!(%viewer, %source, purged = result.rows_affected(), "Reset timeline partition");
        }
        WriteCommand::ClearPreferences { viewer } => {
            sqlx::query("DELETE FROM timeline_preferences WHERE viewer_id = ?1")
                .bind(viewer.as_str())
                .execute(&mut *conn)
                .await?;
        }
        WriteCommand::UpsertProfile(profile) => {
            sqlx::query(
                r#"
                INSERT INTO profiles (id, handle, display_name, avatar)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    handle = excluded.handle,
                    display_name = excluded.display_name,
                    avatar = excluded.avatar
                "#,
            )
            .bind(profile.id.as_str())
            .bind(&profile.handle)
            .bind(&profile.display_name)
            .bind(&profile.avatar)
            .execute(&mut *conn)
            .await?;
        }
        WriteCommand::UpsertPost(post) => {
            sqlx::query(
                r#"
                INSERT INTO posts (uri, cid, author_id, text, indexed_at, reply_root, reply_parent,
                                   like_count, repost_count, reply_count)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(uri) DO UPDATE SET
                    cid = excluded.cid,
                    author_id = excluded.author_id,
                    text = excluded.text,
                    indexed_at = excluded.indexed_at,
                    reply_root = excluded.reply_root,
                    reply_parent = excluded.reply_parent,
                    like_count = excluded.like_count,
                    repost_count = excluded.repost_count,
                    reply_count = excluded.reply_count
                "#,
            )
            .bind(post.uri.as_str())
            .bind(&post.cid)
            .bind(post.author.id.as_str())
            .bind(&post.text)
            .bind(post.indexed_at.millis())
            .bind(post.reply_root.as_ref().map(PostUri::as_str))
            .bind(post.reply_parent.as_ref().map(PostUri::as_str))
            .bind(post.stats.like_count)
            .bind(post.stats.repost_count)
            .bind(post.stats.reply_count)
            .execute(&mut *conn)
            .await?;
        }
        WriteCommand::UpsertFeedSource(feed) => {
            sqlx::query(
                r#"
                INSERT INTO feed_sources (uri, creator_id, display_name, description, like_count)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(uri) DO UPDATE SET
                    creator_id = excluded.creator_id,
                    display_name = excluded.display_name,
                    description = excluded.description,
                    like_count = excluded.like_count
                "#,
            )
            .bind(feed.uri.as_str())
            .bind(feed.creator.id.as_str())
            .bind(&feed.display_name)
            .bind(&feed.description)
            .bind(feed.like_count)
            .execute(&mut *conn)
            .await?;
        }
        WriteCommand::UpsertListSource(list) => {
            sqlx::query(
                r#"
                INSERT INTO list_sources (uri, creator_id, name, purpose)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(uri) DO UPDATE SET
                    creator_id = excluded.creator_id,
                    name = excluded.name,
                    purpose = excluded.purpose
                "#,
            )
            .bind(list.uri.as_str())
            .bind(list.creator.id.as_str())
            .bind(&list.name)
            .bind(&list.purpose)
            .execute(&mut *conn)
            .await?;
        }
        WriteCommand::MarkDeleted(uri) => {
            sqlx::query("UPDATE posts SET deleted = 1 WHERE uri = ?1")
                .bind(uri.as_str())
                .execute(&mut *conn)
                .await?;
        }
        WriteCommand::UpsertViewerState {
            viewer,
            post_uri,
            state,
        } => {
            sqlx::query(
                r#"
                INSERT INTO post_viewer_states (viewer_id, post_uri, like_uri, repost_uri)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(viewer_id, post_uri) DO UPDATE SET
                    like_uri = excluded.like_uri,
                    repost_uri = excluded.repost_uri
                "#,
            )
            .bind(viewer.as_str())
            .bind(post_uri.as_str())
            .bind(&state.like_uri)
            .bind(&state.repost_uri)
            .execute(&mut *conn)
            .await?;
        }
        WriteCommand::AdjustCounts {
            post_uri,
            like_delta,
            repost_delta,
        } => {
            sqlx::query(
                r#"
                UPDATE posts SET
                    like_count = MAX(0, like_count + ?2),
                    repost_count = MAX(0, repost_count + ?3)
                WHERE uri = ?1
                "#,
            )
            .bind(post_uri.as_str())
            .bind(*like_delta)
            .bind(*repost_delta)
            .execute(&mut *conn)
            .await?;
        }
        WriteCommand::UpsertTimelineItem {
            viewer,
            source,
            row,
        } => {
            sqlx::query(
                r#"
                INSERT INTO timeline_items (viewer_id, source_id, post_uri, kind, reposted_by,
                                            reply_root, reply_parent, grandparent_author, sort_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(viewer_id, source_id, post_uri) DO UPDATE SET
                    kind = excluded.kind,
                    reposted_by = excluded.reposted_by,
                    reply_root = excluded.reply_root,
                    reply_parent = excluded.reply_parent,
                    grandparent_author = excluded.grandparent_author,
                    sort_at = excluded.sort_at
                "#,
            )
            .bind(viewer.as_str())
            .bind(source.as_str())
            .bind(row.post_uri.as_str())
            .bind(row.kind.as_str())
            .bind(row.reposted_by.as_ref().map(ProfileId::as_str))
            .bind(row.reply_root.as_ref().map(PostUri::as_str))
            .bind(row.reply_parent.as_ref().map(PostUri::as_str))
            .bind(row.grandparent_author.as_ref().map(ProfileId::as_str))
            .bind(row.sort_at.millis())
            .execute(&mut *conn)
            .await?;
        }
        WriteCommand::SetWatermark { viewer, source, at } => {
            sqlx::query(
                r#"
                INSERT INTO timeline_fetch_keys (viewer_id, source_id, last_fetched_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(viewer_id, source_id) DO UPDATE SET last_fetched_at = ?3
                "#,
            )
            .bind(viewer.as_str())
            .bind(source.as_str())
            .bind(at.millis())
            .execute(&mut *conn)
            .await?;
        }
        WriteCommand::UpsertPreference { viewer, preference } => {
            let descriptor = serde_json::to_string(&preference.source)?;
            sqlx::query(
                r#"
                INSERT INTO timeline_preferences (viewer_id, source_id, descriptor, position,
                                                  is_pinned, presentation)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(viewer_id, source_id) DO UPDATE SET
                    descriptor = excluded.descriptor,
                    position = excluded.position,
                    is_pinned = excluded.is_pinned,
                    presentation = excluded.presentation
                "#,
            )
            .bind(viewer.as_str())
            .bind(preference.source.source_id().as_str())
            .bind(descriptor)
            .bind(i64::from(preference.position))
            .bind(preference.is_pinned)
            .bind(preference.presentation.as_str())
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

#[async_trait]
impl TimelineStore for SqliteCache {
    async fn apply_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }

        let commands = batch.into_ordered();
        let mut tx = self.pool.begin().await?;
        for command in &commands {
            if let Err(e) = apply_command(&mut tx, command).await {
                warn!(error = %e, "Write batch failed, rolling back");
                return Err(e);
            }
        }
        tx.commit().await?;
        debug!(commands = commands.len(), "Committed write batch");

        let mut topics: Vec<Topic> = Vec::new();
        for topic in commands.iter().flat_map(WriteCommand::topics) {
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }
        for topic in &topics {
            self.notifier.notify(topic);
        }
        Ok(())
    }

    async fn feed_items(
        &self,
        viewer: &ProfileId,
        source: &SourceId,
        before: Timestamp,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<FeedItemRecord>, StorageError> {
        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT t.post_uri, t.kind, t.reply_root, t.reply_parent, t.grandparent_author,
                   t.sort_at,
                   r.id AS reposter_id, r.handle AS reposter_handle,
                   r.display_name AS reposter_display_name, r.avatar AS reposter_avatar
            FROM timeline_items t
            JOIN posts p ON p.uri = t.post_uri AND p.deleted = 0
            LEFT JOIN profiles r ON r.id = t.reposted_by
            WHERE t.viewer_id = ?1 AND t.source_id = ?2 AND t.sort_at < ?3
            ORDER BY t.sort_at DESC, t.post_uri DESC
            LIMIT ?4 OFFSET ?5
            "#,
        )
        .bind(viewer.as_str())
        .bind(source.as_str())
        .bind(before.millis())
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;

        let uris: Vec<PostUri> = rows
            .iter()
            .flat_map(|row| {
                [
                    Some(row.post_uri.as_str()),
                    row.reply_root.as_deref(),
                    row.reply_parent.as_deref(),
                ]
            })
            .flatten()
            .map(PostUri::new_unchecked)
            .collect();
        let refs: Vec<&PostUri> = uris.iter().collect();
        let posts = self.load_posts(viewer, &refs).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let kind = ItemKind::from_str(&row.kind).map_err(|e| StorageError::CorruptRow {
                table: "timeline_items",
                reason: e.to_string(),
            })?;
            let Some(post) = posts.get(&PostUri::new_unchecked(row.post_uri.as_str())) else {
                continue;
            };
            let lookup = |uri: &Option<String>| {
                uri.as_deref()
                    .and_then(|uri| posts.get(&PostUri::new_unchecked(uri)))
                    .cloned()
            };
            let reposted_by = match (row.reposter_id, row.reposter_handle) {
                (Some(id), Some(handle)) => Some(Profile {
                    id: ProfileId::new_unchecked(id),
                    handle,
                    display_name: row.reposter_display_name,
                    avatar: row.reposter_avatar,
                }),
                _ => None,
            };
            records.push(FeedItemRecord {
                kind,
                post: post.clone(),
                reposted_by,
                root: lookup(&row.reply_root),
                parent: lookup(&row.reply_parent),
                grandparent_author: row.grandparent_author.map(ProfileId::new_unchecked),
                sort_at: Timestamp::from_millis(row.sort_at),
            });
        }
        Ok(records)
    }

    fn observe_feed_items(
        &self,
        viewer: ProfileId,
        source: SourceId,
        before: Timestamp,
        offset: u32,
        limit: u32,
    ) -> BoxStream<'static, Vec<FeedItemRecord>> {
        let topics = [Topic::Partition(viewer.clone(), source.clone()), Topic::Content];
        self.observe(&topics, move |cache| {
            let viewer = viewer.clone();
            let source = source.clone();
            async move { cache.feed_items(&viewer, &source, before, offset, limit).await }
        })
    }

    async fn last_fetch_key(
        &self,
        viewer: &ProfileId,
        source: &SourceId,
    ) -> Result<Option<Timestamp>, StorageError> {
        let at: Option<i64> = sqlx::query_scalar(
            "SELECT last_fetched_at FROM timeline_fetch_keys WHERE viewer_id = ?1 AND source_id = ?2",
        )
        .bind(viewer.as_str())
        .bind(source.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(at.map(Timestamp::from_millis))
    }

    fn observe_last_fetch_key(
        &self,
        viewer: ProfileId,
        source: SourceId,
    ) -> BoxStream<'static, Option<Timestamp>> {
        let topics = [Topic::Partition(viewer.clone(), source.clone())];
        self.observe(&topics, move |cache| {
            let viewer = viewer.clone();
            let source = source.clone();
            async move { cache.last_fetch_key(&viewer, &source).await }
        })
    }

    async fn newest_item_key(
        &self,
        viewer: &ProfileId,
        source: &SourceId,
        before: Timestamp,
    ) -> Result<Option<PostUri>, StorageError> {
        let uri: Option<String> = sqlx::query_scalar(
            r#"
            SELECT t.post_uri
            FROM timeline_items t
            JOIN posts p ON p.uri = t.post_uri AND p.deleted = 0
            WHERE t.viewer_id = ?1 AND t.source_id = ?2 AND t.sort_at < ?3
            ORDER BY t.sort_at DESC, t.post_uri DESC
            LIMIT 1
            "#,
        )
        .bind(viewer.as_str())
        .bind(source.as_str())
        .bind(before.millis())
        .fetch_optional(&self.pool)
        .await?;

        Ok(uri.map(PostUri::new_unchecked))
    }

    async fn thread_chain(
        &self,
        viewer: &ProfileId,
        post_uri: &PostUri,
    ) -> Result<Vec<ThreadedPost>, StorageError> {
        let anchor = self.load_posts(viewer, &[post_uri]).await?;
        let Some(op) = anchor.get(post_uri) else {
            return Ok(Vec::new());
        };
        let root = op.conversation_root().clone();

        let mut query = QueryBuilder::<Sqlite>::new(POST_SELECT);
        query.push_bind(viewer.as_str().to_owned());
        query.push(" WHERE p.deleted = 0 AND (p.uri = ");
        query.push_bind(root.as_str().to_owned());
        query.push(" OR p.reply_root = ");
        query.push_bind(root.as_str().to_owned());
        query.push(" OR p.uri = ");
        query.push_bind(post_uri.as_str().to_owned());
        query.push(")");

        let rows: Vec<PostRow> = query.build_query_as().fetch_all(&self.pool).await?;
        let posts = rows.into_iter().map(Post::from).collect();
        Ok(order_chain(post_uri, posts))
    }

    fn observe_thread_chain(
        &self,
        viewer: ProfileId,
        post_uri: PostUri,
    ) -> BoxStream<'static, Vec<ThreadedPost>> {
        self.observe(&[Topic::Content], move |cache| {
            let viewer = viewer.clone();
            let post_uri = post_uri.clone();
            async move { cache.thread_chain(&viewer, &post_uri).await }
        })
    }

    async fn timeline_preferences(
        &self,
        viewer: &ProfileId,
    ) -> Result<Vec<TimelinePreferenceRecord>, StorageError> {
        let rows = sqlx::query_as::<_, PreferenceRow>(
            r#"
            SELECT source_id, descriptor, position, is_pinned, presentation
            FROM timeline_preferences
            WHERE viewer_id = ?1
            ORDER BY position ASC, source_id ASC
            "#,
        )
        .bind(viewer.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let preference = TimelinePreference::try_from(row)?;
            let source_id = preference.source.source_id();
            let (feed, list) = match &preference.source {
                SourceRef::Feed { uri } => (self.load_feed_source(uri).await?, None),
                SourceRef::List { uri } | SourceRef::StarterPack { list_uri: uri } => {
                    (None, self.load_list_source(uri).await?)
                }
                SourceRef::Following | SourceRef::Profile { .. } => (None, None),
            };
            let last_fetched_at = self.last_fetch_key(viewer, &source_id).await?;
            records.push(TimelinePreferenceRecord {
                preference,
                feed,
                list,
                last_fetched_at,
            });
        }
        Ok(records)
    }

    fn observe_timeline_preferences(
        &self,
        viewer: ProfileId,
    ) -> BoxStream<'static, Vec<TimelinePreferenceRecord>> {
        let topics = [Topic::Viewer(viewer.clone()), Topic::Content];
        self.observe(&topics, move |cache| {
            let viewer = viewer.clone();
            async move { cache.timeline_preferences(&viewer).await }
        })
    }

    async fn purge_viewer(&self, viewer: &ProfileId) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await?;
        let mut purged = 0;
        for table in [
            "timeline_items",
            "timeline_fetch_keys",
            "timeline_preferences",
            "post_viewer_states",
        ] {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE viewer_id = ?1"))
                .bind(viewer.as_str())
                .execute(&mut *tx)
                .await?;
            purged += result.rows_affected();
        }
        tx.commit().await?;

        info!(%viewer, purged, "Purged viewer data");
        self.notifier.notify_viewer(viewer);
        self.notifier.notify(&Topic::Content);
        Ok(purged)
    }
}

/// Internal row type for hydrated posts.
#[derive(sqlx::FromRow)]
struct PostRow {
    uri: String,
    cid: String,
    text: String,
    indexed_at: i64,
    reply_root: Option<String>,
    reply_parent: Option<String>,
    like_count: i64,
    repost_count: i64,
    reply_count: i64,
    author_id: String,
    author_handle: String,
    author_display_name: Option<String>,
    author_avatar: Option<String>,
    like_uri: Option<String>,
    repost_uri: Option<String>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            uri: PostUri::new_unchecked(row.uri),
            cid: row.cid,
            author: Profile {
                id: ProfileId::new_unchecked(row.author_id),
                handle: row.author_handle,
                display_name: row.author_display_name,
                avatar: row.author_avatar,
            },
            text: row.text,
            indexed_at: Timestamp::from_millis(row.indexed_at),
            reply_root: row.reply_root.map(PostUri::new_unchecked),
            reply_parent: row.reply_parent.map(PostUri::new_unchecked),
            stats: PostStats {
                like_count: row.like_count,
                repost_count: row.repost_count,
                reply_count: row.reply_count,
            },
            viewer: ViewerState {
                like_uri: row.like_uri,
                repost_uri: row.repost_uri,
            },
        }
    }
}

/// Internal row type for timeline rows joined with their reposter.
#[derive(sqlx::FromRow)]
struct ItemRow {
    post_uri: String,
    kind: String,
    reply_root: Option<String>,
    reply_parent: Option<String>,
    grandparent_author: Option<String>,
    sort_at: i64,
    reposter_id: Option<String>,
    reposter_handle: Option<String>,
    reposter_display_name: Option<String>,
    reposter_avatar: Option<String>,
}

#[derive(sqlx::FromRow)]
struct FeedSourceRow {
    uri: String,
    display_name: String,
    description: Option<String>,
    like_count: i64,
    creator_id: String,
    creator_handle: String,
    creator_display_name: Option<String>,
    creator_avatar: Option<String>,
}

impl From<FeedSourceRow> for FeedSource {
    fn from(row: FeedSourceRow) -> Self {
        FeedSource {
            uri: RecordUri::new_unchecked(row.uri),
            creator: Profile {
                id: ProfileId::new_unchecked(row.creator_id),
                handle: row.creator_handle,
                display_name: row.creator_display_name,
                avatar: row.creator_avatar,
            },
            display_name: row.display_name,
            description: row.description,
            like_count: row.like_count,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ListSourceRow {
    uri: String,
    name: String,
    purpose: String,
    creator_id: String,
    creator_handle: String,
    creator_display_name: Option<String>,
    creator_avatar: Option<String>,
}

impl From<ListSourceRow> for ListSource {
    fn from(row: ListSourceRow) -> Self {
        ListSource {
            uri: RecordUri::new_unchecked(row.uri),
            creator: Profile {
                id: ProfileId::new_unchecked(row.creator_id),
                handle: row.creator_handle,
                display_name: row.creator_display_name,
                avatar: row.creator_avatar,
            },
            name: row.name,
            purpose: row.purpose,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PreferenceRow {
    source_id: String,
    descriptor: String,
    position: i64,
    is_pinned: bool,
    presentation: String,
}

impl TryFrom<PreferenceRow> for TimelinePreference {
    type Error = StorageError;

    fn try_from(row: PreferenceRow) -> Result<Self, Self::Error> {
        let source: SourceRef = serde_json::from_str(&row.descriptor)?;
        if source.source_id().as_str() != row.source_id {
            return Err(StorageError::CorruptRow {
                table: "timeline_preferences",
                reason: format!("descriptor does not match source id {}", row.source_id),
            });
        }
        let presentation =
            Presentation::from_str(&row.presentation).map_err(|e| StorageError::CorruptRow {
                table: "timeline_preferences",
                reason: e.to_string(),
            })?;
        let position = u32::try_from(row.position).map_err(|_| StorageError::CorruptRow {
            table: "timeline_preferences",
            reason: format!("position out of range: {}", row.position),
        })?;

        Ok(TimelinePreference {
            source,
            position,
            is_pinned: row.is_pinned,
            presentation,
        })
    }
}
