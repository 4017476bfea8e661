use super::{
    ActorGuard, MessageRepository, ReviewRepository, StatusUpdate, ThreadRepository,
    TransactionRepository, UserRepository,
};
use crate::error::{AppError, Result};
use crate::models::{
    Conversation, GeoPoint, Message, Profile, Review, ScheduleUpdate, ScheduledLocation, Thread,
    Transaction, TransactionStatus, User,
};
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use uuid::Uuid;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const TRANSACTION_COLUMNS: &str = r#"
    id, creator_id, participants, service_id, request_type, status,
    happened_at, longitude, latitude, place_name, created_at
"#;

/// Postgres-backed store. Conditional updates are single `UPDATE … WHERE`
/// statements, so atomicity comes from the database.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| AppError::Database(format!("migrations: {e}")))?;

        tracing::info!(max_connections, "connected to postgres");
        Ok(Self::new(pool))
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_unread_threads WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    async fn unread_for(&self, user_ids: &[Uuid]) -> Result<Vec<(Uuid, Uuid)>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, conversation_id
            FROM user_unread_threads
            WHERE user_id = ANY($1)
            ORDER BY marked_at ASC
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok((row.try_get("user_id")?, row.try_get("conversation_id")?)))
            .collect()
    }
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    let status: String = row.try_get("status")?;
    let request_type: String = row.try_get("request_type")?;
    let longitude: Option<f64> = row.try_get("longitude")?;
    let latitude: Option<f64> = row.try_get("latitude")?;
    let place_name: Option<String> = row.try_get("place_name")?;

    let location = match (longitude, latitude) {
        (Some(longitude), Some(latitude)) => Some(ScheduledLocation {
            point: GeoPoint {
                longitude,
                latitude,
            },
            place_name: place_name.unwrap_or_default(),
        }),
        _ => None,
    };

    Ok(Transaction {
        id: row.try_get("id")?,
        creator_id: row.try_get("creator_id")?,
        participants: row.try_get("participants")?,
        service_id: row.try_get("service_id")?,
        request_type: request_type.parse()?,
        status: status.parse()?,
        happened_at: row.try_get("happened_at")?,
        location,
        created_at: row.try_get("created_at")?,
    })
}

fn message_from_row(row: &PgRow) -> Result<Message> {
    let thread_id: Option<Uuid> = row.try_get("thread_id")?;
    let transaction_id: Option<Uuid> = row.try_get("transaction_id")?;

    let conversation = match (thread_id, transaction_id) {
        (Some(id), None) => Conversation::Thread(id),
        (None, Some(id)) => Conversation::Transaction(id),
        _ => {
            return Err(AppError::Database(
                "message must belong to exactly one conversation".into(),
            ))
        }
    };

    Ok(Message {
        id: row.try_get("id")?,
        sender_id: row.try_get("sender_id")?,
        body: row.try_get("body")?,
        sent_at: row.try_get("sent_at")?,
        conversation,
    })
}

fn review_from_row(row: &PgRow) -> Result<Review> {
    Ok(Review {
        id: row.try_get("id")?,
        transaction_id: row.try_get("transaction_id")?,
        creator_id: row.try_get("creator_id")?,
        rating: row.try_get("rating")?,
        text: row.try_get("text")?,
        sent_at: row.try_get("sent_at")?,
    })
}

fn user_from_row(row: &PgRow, unread_threads: Vec<Uuid>) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        profile: Profile {
            name: row.try_get("name")?,
            picture: row.try_get("picture")?,
        },
        unread_threads,
    })
}

#[async_trait::async_trait]
impl TransactionRepository for PgStore {
    async fn insert(&self, tx: &Transaction) -> Result<()> {
        let (longitude, latitude, place_name) = match &tx.location {
            Some(loc) => (
                Some(loc.point.longitude),
                Some(loc.point.latitude),
                Some(loc.place_name.clone()),
            ),
            None => (None, None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, creator_id, participants, service_id, request_type, status,
                happened_at, longitude, latitude, place_name, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(tx.id)
        .bind(tx.creator_id)
        .bind(&tx.participants)
        .bind(tx.service_id)
        .bind(tx.request_type.as_str())
        .bind(tx.status.as_str())
        .bind(tx.happened_at)
        .bind(longitude)
        .bind(latitude)
        .bind(place_name)
        .bind(tx.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        let query = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn find_for_participant(
        &self,
        user_id: Uuid,
        statuses: &[TransactionStatus],
    ) -> Result<Vec<Transaction>> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let query = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE $1 = ANY(participants) AND status = ANY($2) \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(&statuses)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    async fn compare_and_set_status(&self, update: &StatusUpdate) -> Result<bool> {
        let expected: Vec<&str> = update.expected.iter().map(|s| s.as_str()).collect();
        let (participant, creator) = match update.guard {
            Some(ActorGuard::Participant(id)) => (Some(id), None),
            Some(ActorGuard::Creator(id)) => (None, Some(id)),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2
            WHERE id = $1
              AND status = ANY($3)
              AND ($4::uuid IS NULL OR $4 = ANY(participants))
              AND ($5::uuid IS NULL OR creator_id = $5)
            "#,
        )
        .bind(update.transaction_id)
        .bind(update.new_status.as_str())
        .bind(&expected)
        .bind(participant)
        .bind(creator)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_schedule(
        &self,
        id: Uuid,
        participant: Uuid,
        update: &ScheduleUpdate,
    ) -> Result<Option<Transaction>> {
        let (longitude, latitude, place_name) = match &update.location {
            Some(loc) => (
                Some(loc.point.longitude),
                Some(loc.point.latitude),
                Some(loc.place_name.clone()),
            ),
            None => (None, None, None),
        };

        let query = format!(
            "UPDATE transactions SET \
                happened_at = COALESCE($3, happened_at), \
                longitude = COALESCE($4, longitude), \
                latitude = COALESCE($5, latitude), \
                place_name = COALESCE($6, place_name) \
             WHERE id = $1 AND $2 = ANY(participants) \
             RETURNING {TRANSACTION_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(participant)
            .bind(update.happened_at)
            .bind(longitude)
            .bind(latitude)
            .bind(place_name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }
}

fn insert_message_query(message: &Message) -> Query<'_, Postgres, PgArguments> {
    let (thread_id, transaction_id) = match message.conversation {
        Conversation::Thread(id) => (Some(id), None),
        Conversation::Transaction(id) => (None, Some(id)),
    };

    sqlx::query(
        r#"
        INSERT INTO messages (id, sender_id, body, sent_at, thread_id, transaction_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(message.id)
    .bind(message.sender_id)
    .bind(&message.body)
    .bind(message.sent_at)
    .bind(thread_id)
    .bind(transaction_id)
}

#[async_trait::async_trait]
impl MessageRepository for PgStore {
    async fn insert(&self, message: &Message) -> Result<()> {
        insert_message_query(message).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_with_thread(&self, thread: &Thread, message: &Message) -> Result<()> {
        let mut db_tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO threads (id, participants, last_updated) VALUES ($1, $2, $3)")
            .bind(thread.id)
            .bind(&thread.participants)
            .bind(thread.last_updated)
            .execute(&mut *db_tx)
            .await?;
        insert_message_query(message).execute(&mut *db_tx).await?;

        db_tx.commit().await?;
        Ok(())
    }

    async fn list(&self, conversation: Conversation) -> Result<Vec<Message>> {
        let filter = match conversation {
            Conversation::Thread(_) => "thread_id",
            Conversation::Transaction(_) => "transaction_id",
        };
        let query = format!(
            "SELECT id, sender_id, body, sent_at, thread_id, transaction_id \
             FROM messages WHERE {filter} = $1 ORDER BY sent_at ASC, seq ASC"
        );
        let rows = sqlx::query(&query)
            .bind(conversation.id())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(message_from_row).collect()
    }
}

#[async_trait::async_trait]
impl ThreadRepository for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Thread>> {
        let row = sqlx::query("SELECT id, participants, last_updated FROM threads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Thread {
                id: row.try_get("id")?,
                participants: row.try_get("participants")?,
                last_updated: row.try_get("last_updated")?,
            })),
            None => Ok(None),
        }
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE threads SET last_updated = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("thread {id}")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReviewRepository for PgStore {
    async fn insert(&self, review: &Review) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO reviews (id, transaction_id, creator_id, rating, text, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (transaction_id, creator_id) DO NOTHING
            "#,
        )
        .bind(review.id)
        .bind(review.transaction_id)
        .bind(review.creator_id)
        .bind(review.rating)
        .bind(&review.text)
        .bind(review.sent_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_for_transaction(&self, transaction_id: Uuid) -> Result<Vec<Review>> {
        let rows = sqlx::query(
            r#"
            SELECT id, transaction_id, creator_id, rating, text, sent_at
            FROM reviews
            WHERE transaction_id = $1
            ORDER BY sent_at ASC
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(review_from_row).collect()
    }
}

#[async_trait::async_trait]
impl UserRepository for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.find_many(&[id]).await?.into_iter().next())
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT id, email, name, picture FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        let unread = self.unread_for(ids).await?;

        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                let threads = unread
                    .iter()
                    .filter(|(user_id, _)| *user_id == id)
                    .map(|(_, conversation_id)| *conversation_id)
                    .collect();
                user_from_row(row, threads)
            })
            .collect()
    }

    async fn add_unread(&self, user_id: Uuid, conversation_id: Uuid) -> Result<usize> {
        sqlx::query(
            r#"
            INSERT INTO user_unread_threads (user_id, conversation_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, conversation_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        self.unread_count(user_id).await
    }

    async fn remove_unread(&self, user_id: Uuid, conversation_id: Uuid) -> Result<usize> {
        sqlx::query(
            "DELETE FROM user_unread_threads WHERE user_id = $1 AND conversation_id = $2",
        )
        .bind(user_id)
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        self.unread_count(user_id).await
    }
}
