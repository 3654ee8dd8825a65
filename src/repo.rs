use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Transaction scoped to one user's passcodes.
///
/// Units of work for the same user are serialised against each other. Nothing
/// is visible to other readers until `commit`; dropping without committing
/// rolls every staged change back.
#[async_trait]
pub trait UnitOfWork: Send {
    fn user(&self) -> &User;
    /// Marks every unused, unexpired passcode used. Returns how many were superseded.
    async fn invalidate_active(&mut self, now: DateTime<Utc>) -> RepoResult<u64>;
    async fn insert_passcode(&mut self, new: NewPasscode) -> RepoResult<Passcode>;
    /// Newest passcode with this code that is unused and has `now < expires_at`.
    async fn find_active(&mut self, code: &str, now: DateTime<Utc>) -> RepoResult<Option<Passcode>>;
    /// Conditional `used = false -> true`. Only one caller ever sees `true` per passcode.
    async fn consume(&mut self, passcode_id: Id) -> RepoResult<bool>;
    /// Returns true when this call flipped the flag.
    async fn mark_verified(&mut self) -> RepoResult<bool>;
    async fn commit(self: Box<Self>) -> RepoResult<()>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, email: &str, created_at: DateTime<Utc>) -> RepoResult<User>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn set_user_active(&self, user_id: Id, active: bool) -> RepoResult<User>;
}

#[async_trait]
pub trait PasscodeRepo: Send + Sync {
    async fn begin(&self, user_id: Id) -> RepoResult<Box<dyn UnitOfWork>>;
    /// Audit view, newest first.
    async fn list_passcodes(&self, user_id: Id) -> RepoResult<Vec<Passcode>>;
}

pub trait AuthRepo: UserRepo + PasscodeRepo {}

impl<T> AuthRepo for T where T: UserRepo + PasscodeRepo {}

fn newest_first(v: &mut [Passcode]) {
    v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use dashmap::DashMap;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
    use tokio::sync::{Mutex, OwnedMutexGuard};

    #[derive(Default)]
    struct State {
        users: HashMap<Id, User>,
        by_email: HashMap<String, Id>,
        passcodes: HashMap<Id, Vec<Passcode>>, // keyed by user id
        next_id: Id,
    }

    impl State {
        fn next_id(&mut self) -> Id {
            self.next_id += 1;
            self.next_id
        }
    }

    fn read(state: &RwLock<State>) -> RepoResult<RwLockReadGuard<'_, State>> {
        state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    fn write(state: &RwLock<State>) -> RepoResult<RwLockWriteGuard<'_, State>> {
        state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    /// Process-local store. Per-user lanes stand in for row locks.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        lanes: Arc<DashMap<Id, Arc<Mutex<()>>>>,
    }

    impl InMemRepo {
        pub fn new() -> Self { Self::default() }
    }

    pub struct InMemTx {
        state: Arc<RwLock<State>>,
        _lane: OwnedMutexGuard<()>,
        user: User,
        passcodes: Vec<Passcode>, // staged copy of this user's rows
    }

    #[async_trait]
    impl UnitOfWork for InMemTx {
        fn user(&self) -> &User { &self.user }

        async fn invalidate_active(&mut self, now: DateTime<Utc>) -> RepoResult<u64> {
            let mut n = 0;
            for p in self.passcodes.iter_mut().filter(|p| p.is_valid_at(now)) {
                p.used = true;
                n += 1;
            }
            Ok(n)
        }

        async fn insert_passcode(&mut self, new: NewPasscode) -> RepoResult<Passcode> {
            // ids burnt by a rolled-back unit of work are not reused, like a sequence
            let id = write(&self.state)?.next_id();
            let p = Passcode {
                id,
                user_id: self.user.id,
                code: new.code,
                created_at: new.created_at,
                expires_at: new.expires_at,
                used: false,
            };
            self.passcodes.push(p.clone());
            Ok(p)
        }

        async fn find_active(&mut self, code: &str, now: DateTime<Utc>) -> RepoResult<Option<Passcode>> {
            Ok(self
                .passcodes
                .iter()
                .filter(|p| p.is_valid_at(now) && p.code == code)
                .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
                .cloned())
        }

        async fn consume(&mut self, passcode_id: Id) -> RepoResult<bool> {
            match self.passcodes.iter_mut().find(|p| p.id == passcode_id && !p.used) {
                Some(p) => { p.used = true; Ok(true) }
                None => Ok(false),
            }
        }

        async fn mark_verified(&mut self) -> RepoResult<bool> {
            if self.user.verified { return Ok(false); }
            self.user.verified = true;
            Ok(true)
        }

        async fn commit(self: Box<Self>) -> RepoResult<()> {
            let InMemTx { state, _lane, user, passcodes } = *self;
            let mut s = write(&state)?;
            s.passcodes.insert(user.id, passcodes);
            if let Some(u) = s.users.get_mut(&user.id) {
                u.verified |= user.verified;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, email: &str, created_at: DateTime<Utc>) -> RepoResult<User> {
            let mut s = write(&self.state)?;
            if s.by_email.contains_key(email) {
                return Err(RepoError::Conflict);
            }
            let id = s.next_id();
            let user = User { id, email: email.to_string(), active: true, verified: false, created_at };
            s.by_email.insert(user.email.clone(), id);
            s.users.insert(id, user.clone());
            Ok(user)
        }

        async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
            let s = read(&self.state)?;
            Ok(s.by_email.get(email).and_then(|id| s.users.get(id)).cloned())
        }

        async fn set_user_active(&self, user_id: Id, active: bool) -> RepoResult<User> {
            let mut s = write(&self.state)?;
            let user = s.users.get_mut(&user_id).ok_or(RepoError::NotFound)?;
            user.active = active;
            Ok(user.clone())
        }
    }

    #[async_trait]
    impl PasscodeRepo for InMemRepo {
        async fn begin(&self, user_id: Id) -> RepoResult<Box<dyn UnitOfWork>> {
            let lane = self.lanes.entry(user_id).or_default().clone();
            let guard = lane.lock_owned().await;
            let (user, passcodes) = {
                let s = read(&self.state)?;
                let user = s.users.get(&user_id).cloned().ok_or(RepoError::NotFound)?;
                (user, s.passcodes.get(&user_id).cloned().unwrap_or_default())
            };
            Ok(Box::new(InMemTx { state: self.state.clone(), _lane: guard, user, passcodes }))
        }

        async fn list_passcodes(&self, user_id: Id) -> RepoResult<Vec<Passcode>> {
            let mut v = read(&self.state)?.passcodes.get(&user_id).cloned().unwrap_or_default();
            newest_first(&mut v);
            Ok(v)
        }
    }
}

#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres, Transaction};

    const PASSCODE_COLS: &str = "id, user_id, code, created_at, expires_at, used";
    const USER_COLS: &str = "id, email, active, verified, created_at";

    fn map_err(e: sqlx::Error) -> RepoError {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => RepoError::Conflict,
            _ => RepoError::Internal(e.to_string()),
        }
    }

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
    }

    /// Holds the user row lock (`FOR UPDATE`) until commit or drop.
    pub struct PgTx {
        tx: Transaction<'static, Postgres>,
        user: User,
    }

    #[async_trait]
    impl UnitOfWork for PgTx {
        fn user(&self) -> &User { &self.user }

        async fn invalidate_active(&mut self, now: DateTime<Utc>) -> RepoResult<u64> {
            let res = sqlx::query("UPDATE passcodes SET used = TRUE WHERE user_id = $1 AND used = FALSE AND expires_at > $2")
                .bind(self.user.id)
                .bind(now)
                .execute(&mut *self.tx).await.map_err(map_err)?;
            Ok(res.rows_affected())
        }

        async fn insert_passcode(&mut self, new: NewPasscode) -> RepoResult<Passcode> {
            let sql = format!("INSERT INTO passcodes (user_id, code, created_at, expires_at) VALUES ($1,$2,$3,$4) RETURNING {PASSCODE_COLS}");
            sqlx::query_as::<_, Passcode>(&sql)
                .bind(self.user.id)
                .bind(&new.code)
                .bind(new.created_at)
                .bind(new.expires_at)
                .fetch_one(&mut *self.tx).await.map_err(map_err)
        }

        async fn find_active(&mut self, code: &str, now: DateTime<Utc>) -> RepoResult<Option<Passcode>> {
            let sql = format!(
                "SELECT {PASSCODE_COLS} FROM passcodes
                 WHERE user_id = $1 AND code = $2 AND used = FALSE AND expires_at > $3
                 ORDER BY created_at DESC, id DESC LIMIT 1"
            );
            sqlx::query_as::<_, Passcode>(&sql)
                .bind(self.user.id)
                .bind(code)
                .bind(now)
                .fetch_optional(&mut *self.tx).await.map_err(map_err)
        }

        async fn consume(&mut self, passcode_id: Id) -> RepoResult<bool> {
            let res = sqlx::query("UPDATE passcodes SET used = TRUE WHERE id = $1 AND user_id = $2 AND used = FALSE")
                .bind(passcode_id)
                .bind(self.user.id)
                .execute(&mut *self.tx).await.map_err(map_err)?;
            Ok(res.rows_affected() == 1)
        }

        async fn mark_verified(&mut self) -> RepoResult<bool> {
            let res = sqlx::query("UPDATE users SET verified = TRUE WHERE id = $1 AND verified = FALSE")
                .bind(self.user.id)
                .execute(&mut *self.tx).await.map_err(map_err)?;
            if res.rows_affected() == 1 { self.user.verified = true; }
            Ok(res.rows_affected() == 1)
        }

        async fn commit(self: Box<Self>) -> RepoResult<()> {
            self.tx.commit().await.map_err(map_err)
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, email: &str, created_at: DateTime<Utc>) -> RepoResult<User> {
            let sql = format!("INSERT INTO users (email, created_at) VALUES ($1, $2) RETURNING {USER_COLS}");
            sqlx::query_as::<_, User>(&sql)
                .bind(email)
                .bind(created_at)
                .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
            let sql = format!("SELECT {USER_COLS} FROM users WHERE email = $1");
            sqlx::query_as::<_, User>(&sql)
                .bind(email)
                .fetch_optional(&self.pool).await.map_err(map_err)
        }

        async fn set_user_active(&self, user_id: Id, active: bool) -> RepoResult<User> {
            let sql = format!("UPDATE users SET active = $2 WHERE id = $1 RETURNING {USER_COLS}");
            sqlx::query_as::<_, User>(&sql)
                .bind(user_id)
                .bind(active)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
    }

    #[async_trait]
    impl PasscodeRepo for PgRepo {
        async fn begin(&self, user_id: Id) -> RepoResult<Box<dyn UnitOfWork>> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            let sql = format!("SELECT {USER_COLS} FROM users WHERE id = $1 FOR UPDATE");
            let user = sqlx::query_as::<_, User>(&sql)
                .bind(user_id)
                .fetch_optional(&mut *tx).await.map_err(map_err)?
                .ok_or(RepoError::NotFound)?;
            Ok(Box::new(PgTx { tx, user }))
        }

        async fn list_passcodes(&self, user_id: Id) -> RepoResult<Vec<Passcode>> {
            let sql = format!("SELECT {PASSCODE_COLS} FROM passcodes WHERE user_id = $1");
            let mut v = sqlx::query_as::<_, Passcode>(&sql)
                .bind(user_id)
                .fetch_all(&self.pool).await.map_err(map_err)?;
            newest_first(&mut v);
            Ok(v)
        }
    }
}
