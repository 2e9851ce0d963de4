//! Remote copy of rating records, keyed by account id.

use futures::future::BoxFuture;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::rating::RatingRecord;
use crate::store::PersistenceError;

/// Remote rating storage for authenticated identities.
pub trait ProfileStore: Send + Sync {
    fn fetch(&self, user_id: i64) -> BoxFuture<'_, Result<Option<RatingRecord>, PersistenceError>>;

    fn upsert<'a>(
        &'a self,
        user_id: i64,
        record: &'a RatingRecord,
    ) -> BoxFuture<'a, Result<(), PersistenceError>>;
}

#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ProfileStore for PgProfileStore {
    fn fetch(&self, user_id: i64) -> BoxFuture<'_, Result<Option<RatingRecord>, PersistenceError>> {
        Box::pin(async move {
            let row: Option<(Json<RatingRecord>,)> =
                sqlx::query_as("SELECT record FROM rating_profiles WHERE user_id = $1")
                    .bind(user_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row.map(|(Json(record),)| record))
        })
    }

    fn upsert<'a>(
        &'a self,
        user_id: i64,
        record: &'a RatingRecord,
    ) -> BoxFuture<'a, Result<(), PersistenceError>> {
        Box::pin(async move {
            sqlx::query(
                r#"INSERT INTO rating_profiles (user_id, record, updated_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (user_id)
                DO UPDATE SET record = EXCLUDED.record, updated_at = NOW()"#,
            )
            .bind(user_id)
            .bind(Json(record))
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryProfiles {
        records: Mutex<HashMap<i64, RatingRecord>>,
    }

    impl MemoryProfiles {
        pub fn get(&self, user_id: i64) -> Option<RatingRecord> {
            self.records.lock().unwrap().get(&user_id).cloned()
        }

        pub fn put(&self, user_id: i64, record: RatingRecord) {
            self.records.lock().unwrap().insert(user_id, record);
        }
    }

    impl ProfileStore for MemoryProfiles {
        fn fetch(&self, user_id: i64) -> BoxFuture<'_, Result<Option<RatingRecord>, PersistenceError>> {
            let record = self.get(user_id);
            Box::pin(async move { Ok(record) })
        }

        fn upsert<'a>(
            &'a self,
            user_id: i64,
            record: &'a RatingRecord,
        ) -> BoxFuture<'a, Result<(), PersistenceError>> {
            self.put(user_id, record.clone());
            Box::pin(async { Ok(()) })
        }
    }

    /// Remote store that is always down.
    pub struct FailingProfiles;

    impl ProfileStore for FailingProfiles {
        fn fetch(&self, _user_id: i64) -> BoxFuture<'_, Result<Option<RatingRecord>, PersistenceError>> {
            Box::pin(async { Err(PersistenceError::Database(sqlx::Error::PoolTimedOut)) })
        }

        fn upsert<'a>(
            &'a self,
            _user_id: i64,
            _record: &'a RatingRecord,
        ) -> BoxFuture<'a, Result<(), PersistenceError>> {
            Box::pin(async { Err(PersistenceError::Database(sqlx::Error::PoolTimedOut)) })
        }
    }
}
