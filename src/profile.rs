use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    cri,
    models::{CriRecord, Role, UserProfile},
};

/// Every backend keeps exactly one profile under this key.
pub const STORAGE_KEY: &str = "neurotrack_user";

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn read(&self) -> anyhow::Result<Option<UserProfile>>;

    async fn write(&self, profile: &UserProfile) -> anyhow::Result<()>;

    async fn clear(&self) -> anyhow::Result<()>;
}

pub struct FileProfileStore {
    path: PathBuf,
}

impl FileProfileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{STORAGE_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn read(&self) -> anyhow::Result<Option<UserProfile>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };

        let profile = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt profile in {}", self.path.display()))?;
        Ok(Some(profile))
    }

    async fn write(&self, profile: &UserProfile) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let payload = serde_json::to_string_pretty(profile)?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, payload)
            .await
            .with_context(|| format!("failed to write {}", staging.display()))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", self.path.display())),
        }
    }
}

pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self { pool })
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn read(&self) -> anyhow::Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT payload FROM neurotrack.profiles WHERE storage_key = $1")
            .bind(STORAGE_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let Json(profile): Json<UserProfile> = row.try_get("payload")?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    async fn write(&self, profile: &UserProfile) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO neurotrack.profiles (storage_key, payload, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (storage_key) DO UPDATE
            SET payload = EXCLUDED.payload, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(STORAGE_KEY)
        .bind(Json(profile))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM neurotrack.profiles WHERE storage_key = $1")
            .bind(STORAGE_KEY)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub role: Role,
}

/// The signed-in user for one process, loaded from and written back to a store.
pub struct Session {
    store: Box<dyn ProfileStore>,
    user: Option<UserProfile>,
}

impl Session {
    pub async fn open(store: Box<dyn ProfileStore>) -> anyhow::Result<Self> {
        let user = store.read().await?;
        Ok(Self { store, user })
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub async fn onboard(&mut self, registration: Registration) -> anyhow::Result<&UserProfile> {
        let name = registration.name.trim();
        if name.is_empty() {
            bail!("name is required");
        }
        if registration.age == 0 {
            bail!("age must be a positive number");
        }

        let profile = UserProfile {
            name: name.to_string(),
            age: registration.age,
            gender: registration.gender,
            id: generate_user_id(registration.role),
            role: registration.role,
            cri_history: Vec::new(),
        };

        self.store.write(&profile).await?;
        info!(target: "profile", id = %profile.id, role = ?profile.role, "user onboarded");
        Ok(self.user.insert(profile))
    }

    /// Appends to the signed-in user's history. Returns false when nobody is
    /// signed in. A failed write keeps the record in memory.
    pub async fn append_record(&mut self, record: CriRecord) -> bool {
        let Some(user) = self.user.as_mut() else {
            warn!(target: "profile", "no signed-in user; assessment not recorded");
            return false;
        };

        user.cri_history.push(record);
        if let Err(err) = self.store.write(user).await {
            warn!(target: "profile", error = %err, "failed to persist CRI history");
        }
        true
    }

    pub fn current_cri(&self) -> u8 {
        self.user
            .as_ref()
            .map(|user| cri::current_cri(&user.cri_history))
            .unwrap_or(0)
    }

    pub async fn logout(&mut self) -> anyhow::Result<()> {
        self.store.clear().await?;
        self.user = None;
        Ok(())
    }
}

fn generate_user_id(role: Role) -> String {
    let bytes = Uuid::new_v4().into_bytes();
    let n = u16::from_be_bytes([bytes[0], bytes[1]]);
    match role {
        Role::Patient => format!("P-{}", 1000 + n % 9000),
        Role::Clinician => format!("ADM-{}", 100 + n % 900),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("neurotrack-test-{}", Uuid::new_v4()))
    }

    fn registration(role: Role) -> Registration {
        Registration {
            name: "Elena Rodriguez".to_string(),
            age: 68,
            gender: "Female".to_string(),
            role,
        }
    }

    #[test]
    fn ids_follow_role_prefixes() {
        for _ in 0..50 {
            let patient = generate_user_id(Role::Patient);
            let number: u32 = patient.trim_start_matches("P-").parse().unwrap();
            assert!((1000..=9999).contains(&number));

            let clinician = generate_user_id(Role::Clinician);
            let number: u32 = clinician.trim_start_matches("ADM-").parse().unwrap();
            assert!((100..=999).contains(&number));
        }
    }

    #[tokio::test]
    async fn file_store_round_trips_and_clears() {
        let dir = scratch_dir();
        let store = FileProfileStore::new(&dir);
        assert!(store.read().await.unwrap().is_none());

        let mut session = Session::open(Box::new(FileProfileStore::new(&dir))).await.unwrap();
        let id = session.onboard(registration(Role::Patient)).await.unwrap().id.clone();

        let stored = store.read().await.unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.role, Role::Patient);

        session.logout().await.unwrap();
        assert!(session.user().is_none());
        assert!(store.read().await.unwrap().is_none());
        store.clear().await.unwrap();

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn history_is_append_only_and_persisted() {
        let dir = scratch_dir();
        let mut session = Session::open(Box::new(FileProfileStore::new(&dir))).await.unwrap();
        session.onboard(registration(Role::Clinician)).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        assert!(session.append_record(CriRecord::new(30, date)).await);
        assert!(session.append_record(CriRecord::new(55, date)).await);
        assert_eq!(session.current_cri(), 55);

        let reopened = Session::open(Box::new(FileProfileStore::new(&dir))).await.unwrap();
        let scores: Vec<u8> = reopened
            .user()
            .unwrap()
            .cri_history
            .iter()
            .map(|record| record.score)
            .collect();
        assert_eq!(scores, vec![30, 55]);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn records_without_user_are_dropped() {
        let dir = scratch_dir();
        let mut session = Session::open(Box::new(FileProfileStore::new(&dir))).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        assert!(!session.append_record(CriRecord::new(30, date)).await);
        assert_eq!(session.current_cri(), 0);
    }

    #[tokio::test]
    async fn onboarding_validates_input() {
        let dir = scratch_dir();
        let mut session = Session::open(Box::new(FileProfileStore::new(&dir))).await.unwrap();

        let mut blank = registration(Role::Patient);
        blank.name = "   ".to_string();
        assert!(session.onboard(blank).await.is_err());

        let mut ageless = registration(Role::Patient);
        ageless.age = 0;
        assert!(session.onboard(ageless).await.is_err());
        assert!(session.user().is_none());
    }

    #[tokio::test]
    async fn corrupt_profile_is_reported() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let store = FileProfileStore::new(&dir);
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.read().await.is_err());
        let _ = std::fs::remove_dir_all(dir);
    }
}
