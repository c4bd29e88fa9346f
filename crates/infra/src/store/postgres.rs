//! Postgres-backed store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / other | N/A | `Storage` |
//!
//! ## Runtime
//!
//! The store traits are synchronous. Trait calls block the current worker
//! through `tokio::task::block_in_place`, so they must run on a
//! multi-threaded tokio runtime.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use tether_auth::{AccessToken, PrincipalId};
use tether_core::{
    Application, ApplicationId, ClientType, GrantType, Installation, InstallationId,
    InstallationState, TargetId, ValidationError,
};
use tether_integrations::{FindError, InstallationFinder, InstallationLookup, LookupScope};

use super::{
    ALREADY_INSTALLED, ApplicationStore, InstallCheck, InstallRequest, InstallationStore,
    StoreError, TokenStore,
};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS applications (
        id                        UUID PRIMARY KEY,
        name                      TEXT NOT NULL,
        client_id                 TEXT NOT NULL UNIQUE,
        client_type               TEXT NOT NULL,
        authorization_grant_type  TEXT NOT NULL,
        redirect_uris             TEXT NOT NULL DEFAULT '',
        allowed_scopes            TEXT NULL,
        is_approved               BOOLEAN NOT NULL DEFAULT FALSE,
        internal_integration_name TEXT NULL UNIQUE,
        local_integration_name    TEXT NULL,
        created_at                TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CHECK (internal_integration_name IS NULL OR local_integration_name IS NULL)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS installations (
        id              UUID PRIMARY KEY,
        application_id  UUID NOT NULL REFERENCES applications (id) ON DELETE CASCADE,
        target          BIGINT NOT NULL CHECK (target >= 0),
        config          JSONB NULL,
        api_client_name TEXT NULL,
        deleted_at      TIMESTAMPTZ NULL,
        created_at      TIMESTAMPTZ NOT NULL,
        updated_at      TIMESTAMPTZ NOT NULL,
        UNIQUE (application_id, target)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS access_tokens (
        token            TEXT PRIMARY KEY,
        application_id   UUID NOT NULL REFERENCES applications (id) ON DELETE CASCADE,
        user_id          UUID NULL,
        scope            TEXT NOT NULL,
        expires_at       TIMESTAMPTZ NOT NULL,
        is_internal_only BOOLEAN NOT NULL DEFAULT FALSE,
        created_at       TIMESTAMPTZ NOT NULL
    )
    "#,
];

// Application columns minus the id, which callers select as `application_id`.
macro_rules! application_fields {
    () => {
        "a.name AS app_name, a.client_id AS app_client_id, a.client_type AS app_client_type, \
         a.authorization_grant_type AS app_grant_type, a.redirect_uris AS app_redirect_uris, \
         a.allowed_scopes AS app_allowed_scopes, a.is_approved AS app_is_approved, \
         a.internal_integration_name AS app_internal_integration_name, \
         a.local_integration_name AS app_local_integration_name, a.created_at AS app_created_at"
    };
}

macro_rules! installation_fields {
    () => {
        "i.id, i.application_id, i.target, i.config, i.api_client_name, i.deleted_at, \
         i.created_at, i.updated_at"
    };
}

macro_rules! token_fields {
    () => {
        "token, application_id, user_id, scope, expires_at, is_internal_only, created_at"
    };
}

/// Postgres-backed application, installation and token store.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables when missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(application_id = %id), err)]
    pub async fn load_application(&self, id: ApplicationId) -> Result<Option<Application>, StoreError> {
        let row = sqlx::query(concat!(
            "SELECT a.id AS application_id, ",
            application_fields!(),
            " FROM applications a WHERE a.id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_application", e))?;

        row.as_ref().map(application_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    pub async fn load_internal_application(&self, name: &str) -> Result<Option<Application>, StoreError> {
        let row = sqlx::query(concat!(
            "SELECT a.id AS application_id, ",
            application_fields!(),
            " FROM applications a WHERE a.internal_integration_name = $1"
        ))
        .bind(name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_internal_application", e))?;

        row.as_ref().map(application_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    pub async fn load_internal_applications(&self) -> Result<Vec<Application>, StoreError> {
        let rows = sqlx::query(concat!(
            "SELECT a.id AS application_id, ",
            application_fields!(),
            " FROM applications a WHERE a.internal_integration_name IS NOT NULL",
            " ORDER BY a.created_at ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_internal_applications", e))?;

        rows.iter().map(application_from_row).collect()
    }

    #[instrument(skip(self, application), fields(application_id = %application.id), err)]
    pub async fn upsert_application(&self, application: &Application) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO applications (
                id,
                name,
                client_id,
                client_type,
                authorization_grant_type,
                redirect_uris,
                allowed_scopes,
                is_approved,
                internal_integration_name,
                local_integration_name,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id)
            DO UPDATE SET
                name = EXCLUDED.name,
                client_id = EXCLUDED.client_id,
                client_type = EXCLUDED.client_type,
                authorization_grant_type = EXCLUDED.authorization_grant_type,
                redirect_uris = EXCLUDED.redirect_uris,
                allowed_scopes = EXCLUDED.allowed_scopes,
                is_approved = EXCLUDED.is_approved,
                internal_integration_name = EXCLUDED.internal_integration_name,
                local_integration_name = EXCLUDED.local_integration_name
            "#,
        )
        .bind(application.id.as_uuid())
        .bind(&application.name)
        .bind(&application.client_id)
        .bind(application.client_type.as_str())
        .bind(application.authorization_grant_type.as_str())
        .bind(&application.redirect_uris)
        .bind(application.allowed_scopes.as_deref())
        .bind(application.is_approved)
        .bind(application.internal_integration_name())
        .bind(application.local_integration_name())
        .bind(application.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_application", e))?;

        Ok(())
    }

    /// The install unit: lock the application row, check exclusivity,
    /// upsert, run `check` against the other rows of the same integration,
    /// store the config it returns, commit.
    #[instrument(
        skip(self, request, check),
        fields(application_id = %request.application_id, target = %request.target),
        err
    )]
    pub async fn install_in_transaction(
        &self,
        request: InstallRequest,
        check: InstallCheck<'_>,
    ) -> Result<Installation, StoreError> {
        let target = encode_target(request.target)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let locked = sqlx::query("SELECT id FROM applications WHERE id = $1 FOR UPDATE")
            .bind(request.application_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_application", e))?;
        if locked.is_none() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::NotFound);
        }

        if request.exclusive {
            let row = sqlx::query(
                r#"
                SELECT COUNT(*) AS others
                FROM installations
                WHERE application_id = $1 AND target <> $2 AND deleted_at IS NULL
                "#,
            )
            .bind(request.application_id.as_uuid())
            .bind(target)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("count_other_installations", e))?;
            let others: i64 = row
                .try_get("others")
                .map_err(|e| StoreError::Storage(format!("failed to read others: {e}")))?;
            if others > 0 {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(ValidationError::non_field(ALREADY_INSTALLED).into());
            }
        }

        let now = Utc::now();
        let row = sqlx::query(concat!(
            r#"
            INSERT INTO installations AS i (
                id,
                application_id,
                target,
                config,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (application_id, target)
            DO UPDATE SET
                config = EXCLUDED.config,
                deleted_at = NULL,
                updated_at = EXCLUDED.updated_at
            RETURNING "#,
            installation_fields!()
        ))
        .bind(Uuid::now_v7())
        .bind(request.application_id.as_uuid())
        .bind(target)
        .bind(request.config.map(Value::Object))
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_installation", e))?;
        let mut installation = installation_from_row(&row)?;

        // Rows of applications on the same integration, read under the lock
        // taken above.
        let rows = sqlx::query(concat!(
            "SELECT ",
            installation_fields!(),
            ", ",
            application_fields!(),
            r#"
            FROM installations i
            JOIN applications a ON a.id = i.application_id
            JOIN applications me ON me.id = $1
            WHERE i.deleted_at IS NULL
                AND NOT (i.application_id = $1 AND i.target = $2)
                AND (a.local_integration_name = me.local_integration_name
                    OR a.internal_integration_name = me.internal_integration_name)
            "#
        ))
        .bind(request.application_id.as_uuid())
        .bind(target)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_sibling_installations", e))?;
        let mut existing = Vec::with_capacity(rows.len());
        for row in &rows {
            existing.push((installation_from_row(row)?, application_from_row(row)?));
        }

        let config = match check(&installation, &existing) {
            Ok(config) => config,
            Err(err) => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(err.into());
            }
        };
        if config != installation.config {
            sqlx::query("UPDATE installations SET config = $2 WHERE id = $1")
                .bind(installation.id.as_uuid())
                .bind(config.clone().map(Value::Object))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("store_cleaned_config", e))?;
            installation.config = config;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(installation)
    }

    #[instrument(skip(self), fields(application_id = %application_id, target = %target), err)]
    pub async fn load_installation(
        &self,
        application_id: ApplicationId,
        target: TargetId,
    ) -> Result<Option<Installation>, StoreError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            installation_fields!(),
            " FROM installations i WHERE i.application_id = $1 AND i.target = $2"
        ))
        .bind(application_id.as_uuid())
        .bind(encode_target(target)?)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_installation", e))?;

        row.as_ref().map(installation_from_row).transpose()
    }

    #[instrument(skip(self), fields(application_id = %application_id, target = %target), err)]
    pub async fn mark_deleted(
        &self,
        application_id: ApplicationId,
        target: TargetId,
        at: DateTime<Utc>,
    ) -> Result<Installation, StoreError> {
        let row = sqlx::query(concat!(
            "UPDATE installations AS i SET deleted_at = $3, updated_at = $3",
            " WHERE i.application_id = $1 AND i.target = $2 RETURNING ",
            installation_fields!()
        ))
        .bind(application_id.as_uuid())
        .bind(encode_target(target)?)
        .bind(at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_deleted", e))?;

        row.as_ref()
            .map(installation_from_row)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }

    /// Active installations matching `lookup`.
    ///
    /// Config containment is narrowed with `@>` in SQL and then re-checked
    /// with [`InstallationLookup::matches`], which compares values exactly.
    #[instrument(skip(self, lookup), fields(integration = lookup.scope.integration_name()), err)]
    pub async fn query_installations(
        &self,
        lookup: &InstallationLookup,
    ) -> Result<Vec<(Installation, Application)>, StoreError> {
        let local = matches!(lookup.scope, LookupScope::Local(_));
        let rows = sqlx::query(concat!(
            "SELECT ",
            installation_fields!(),
            ", ",
            application_fields!(),
            r#"
            FROM installations i
            JOIN applications a ON a.id = i.application_id
            WHERE i.deleted_at IS NULL
                AND (CASE WHEN $1 THEN a.local_integration_name ELSE a.internal_integration_name END) = $2
                AND ($3::uuid IS NULL OR i.application_id = $3)
                AND COALESCE(i.config, '{}'::jsonb) @> $4
            ORDER BY i.created_at ASC
            "#
        ))
        .bind(local)
        .bind(lookup.scope.integration_name())
        .bind(lookup.application_id.map(Uuid::from))
        .bind(Value::Object(lookup.config_equals.clone()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_installations", e))?;

        let mut found = Vec::with_capacity(rows.len());
        for row in &rows {
            let installation = installation_from_row(row)?;
            let application = application_from_row(row)?;
            if lookup.matches(&installation, &application) {
                found.push((installation, application));
            }
        }
        Ok(found)
    }

    #[instrument(skip(self, token), err)]
    pub async fn load_token(&self, token: &str) -> Result<Option<AccessToken>, StoreError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            token_fields!(),
            " FROM access_tokens WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_token", e))?;

        row.as_ref().map(token_from_row).transpose()
    }

    #[instrument(skip(self), fields(application_id = %application_id), err)]
    pub async fn load_internal_token(
        &self,
        application_id: ApplicationId,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessToken>, StoreError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            token_fields!(),
            r#"
            FROM access_tokens
            WHERE application_id = $1 AND scope = $2 AND is_internal_only AND expires_at > $3
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(application_id.as_uuid())
        .bind(scope)
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_internal_token", e))?;

        row.as_ref().map(token_from_row).transpose()
    }

    #[instrument(skip(self, token), fields(application_id = %token.application_id), err)]
    pub async fn insert_token(&self, token: &AccessToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO access_tokens (
                token,
                application_id,
                user_id,
                scope,
                expires_at,
                is_internal_only,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (token)
            DO UPDATE SET
                scope = EXCLUDED.scope,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&token.token)
        .bind(token.application_id.as_uuid())
        .bind(token.user.map(Uuid::from))
        .bind(&token.scope)
        .bind(token.expires_at)
        .bind(token.is_internal_only)
        .bind(token.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_token", e))?;

        Ok(())
    }
}

/// Run `fut` to completion from synchronous code inside a tokio runtime.
fn block_on<F: Future>(fut: F) -> Result<F::Output, StoreError> {
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::Storage(
            "PostgresStore requires async runtime (tokio). Ensure you're calling from within a tokio runtime context."
                .to_string(),
        )
    })?;
    Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
}

impl ApplicationStore for PostgresStore {
    fn get_application(&self, id: ApplicationId) -> Result<Option<Application>, StoreError> {
        block_on(self.load_application(id))?
    }

    fn find_internal_application(&self, name: &str) -> Result<Option<Application>, StoreError> {
        block_on(self.load_internal_application(name))?
    }

    fn internal_applications(&self) -> Result<Vec<Application>, StoreError> {
        block_on(self.load_internal_applications())?
    }

    fn save_application(&self, application: &Application) -> Result<(), StoreError> {
        block_on(self.upsert_application(application))?
    }
}

impl InstallationStore for PostgresStore {
    fn install(
        &self,
        request: InstallRequest,
        check: InstallCheck<'_>,
    ) -> Result<Installation, StoreError> {
        block_on(self.install_in_transaction(request, check))?
    }

    fn get_installation(
        &self,
        application_id: ApplicationId,
        target: TargetId,
    ) -> Result<Option<Installation>, StoreError> {
        block_on(self.load_installation(application_id, target))?
    }

    fn soft_delete(
        &self,
        application_id: ApplicationId,
        target: TargetId,
        at: DateTime<Utc>,
    ) -> Result<Installation, StoreError> {
        block_on(self.mark_deleted(application_id, target, at))?
    }

    fn find_installations(
        &self,
        lookup: &InstallationLookup,
    ) -> Result<Vec<(Installation, Application)>, StoreError> {
        block_on(self.query_installations(lookup))?
    }
}

impl TokenStore for PostgresStore {
    fn get_token(&self, token: &str) -> Result<Option<AccessToken>, StoreError> {
        block_on(self.load_token(token))?
    }

    fn find_internal_token(
        &self,
        application_id: ApplicationId,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessToken>, StoreError> {
        block_on(self.load_internal_token(application_id, scope, now))?
    }

    fn save_token(&self, token: &AccessToken) -> Result<(), StoreError> {
        block_on(self.insert_token(token))?
    }
}

impl InstallationFinder for PostgresStore {
    fn find_one(&self, lookup: &InstallationLookup) -> Result<(Installation, Application), FindError> {
        Ok(self.get_one(lookup)?)
    }
}

fn encode_target(target: TargetId) -> Result<i64, StoreError> {
    i64::try_from(target.get())
        .map_err(|_| StoreError::Storage(format!("target {target} does not fit in BIGINT")))
}

fn decode_target(raw: i64) -> Result<TargetId, StoreError> {
    u64::try_from(raw)
        .map(TargetId::new)
        .map_err(|_| StoreError::Storage(format!("negative target in storage: {raw}")))
}

fn parse_client_type(raw: &str) -> Result<ClientType, StoreError> {
    match raw {
        "confidential" => Ok(ClientType::Confidential),
        "public" => Ok(ClientType::Public),
        other => Err(StoreError::Storage(format!("unknown client type: {other}"))),
    }
}

fn parse_grant_type(raw: &str) -> Result<GrantType, StoreError> {
    GrantType::parse(raw).ok_or_else(|| StoreError::Storage(format!("unknown grant type: {raw}")))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Storage(format!("failed to read {name}: {e}")))
}

fn application_from_row(row: &PgRow) -> Result<Application, StoreError> {
    let mut application = Application::new(column::<String>(row, "app_name")?)
        .with_integration_names(
            column(row, "app_internal_integration_name")?,
            column(row, "app_local_integration_name")?,
        )?;
    application.id = ApplicationId::from_uuid(column(row, "application_id")?);
    application.client_id = column(row, "app_client_id")?;
    application.client_type = parse_client_type(&column::<String>(row, "app_client_type")?)?;
    application.authorization_grant_type =
        parse_grant_type(&column::<String>(row, "app_grant_type")?)?;
    application.redirect_uris = column(row, "app_redirect_uris")?;
    application.allowed_scopes = column(row, "app_allowed_scopes")?;
    application.is_approved = column(row, "app_is_approved")?;
    application.created_at = column(row, "app_created_at")?;
    Ok(application)
}

fn installation_from_row(row: &PgRow) -> Result<Installation, StoreError> {
    let config = match column::<Option<Value>>(row, "config")? {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(other) => {
            return Err(StoreError::Storage(format!(
                "installation config must be an object, found {other}"
            )));
        }
    };
    let state = match column::<Option<DateTime<Utc>>>(row, "deleted_at")? {
        None => InstallationState::Active,
        Some(deleted_at) => InstallationState::Deleted { deleted_at },
    };
    Ok(Installation {
        id: InstallationId::from_uuid(column(row, "id")?),
        application_id: ApplicationId::from_uuid(column(row, "application_id")?),
        target: decode_target(column(row, "target")?)?,
        config,
        api_client_name: column(row, "api_client_name")?,
        state,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn token_from_row(row: &PgRow) -> Result<AccessToken, StoreError> {
    Ok(AccessToken {
        token: column(row, "token")?,
        application_id: ApplicationId::from_uuid(column(row, "application_id")?),
        user: column::<Option<Uuid>>(row, "user_id")?.map(PrincipalId::from_uuid),
        scope: column(row, "scope")?,
        expires_at: column(row, "expires_at")?,
        is_internal_only: column(row, "is_internal_only")?,
        created_at: column(row, "created_at")?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::NotFound,
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_core::ConfigMap;
    use tether_core::config::from_value;
    use tether_integrations::InstallationQuery;

    #[test]
    fn targets_must_fit_in_bigint() {
        assert_eq!(encode_target(TargetId::new(7)).unwrap(), 7);
        assert!(encode_target(TargetId::new(u64::MAX)).is_err());
        assert!(decode_target(-1).is_err());
    }

    #[test]
    fn client_and_grant_types_round_trip_through_text() {
        for ct in [ClientType::Confidential, ClientType::Public] {
            assert_eq!(parse_client_type(ct.as_str()).unwrap(), ct);
        }
        assert_eq!(
            parse_grant_type(GrantType::ClientCredentials.as_str()).unwrap(),
            GrantType::ClientCredentials
        );
        assert!(parse_client_type("secret").is_err());
    }

    #[test]
    fn trait_calls_outside_a_runtime_fail_cleanly() {
        let err = block_on(async { 1 }).unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }

    // Runs only when TETHER_TEST_DATABASE_URL points at a scratch database.
    #[tokio::test(flavor = "multi_thread")]
    async fn install_lifecycle_against_postgres() {
        let Ok(url) = std::env::var("TETHER_TEST_DATABASE_URL") else {
            return;
        };
        let store = PostgresStore::connect(&url).await.unwrap();
        store.ensure_schema().await.unwrap();

        let app = Application::local("pg test", "api_client");
        store.save_application(&app).unwrap();
        let ok = |inst: &Installation,
                  _: &dyn InstallationQuery|
         -> Result<Option<ConfigMap>, ValidationError> { Ok(inst.config.clone()) };
        let config = Some(from_value(json!({"k": "v"})).unwrap());

        let first = store
            .install(
                InstallRequest {
                    application_id: app.id,
                    target: TargetId::new(1),
                    config: config.clone(),
                    exclusive: true,
                },
                &ok,
            )
            .unwrap();
        assert_eq!(first.config, config);

        let err = store
            .install(
                InstallRequest {
                    application_id: app.id,
                    target: TargetId::new(2),
                    config: None,
                    exclusive: true,
                },
                &ok,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        store.soft_delete(app.id, TargetId::new(1), Utc::now()).unwrap();
        let again = store
            .install(
                InstallRequest {
                    application_id: app.id,
                    target: TargetId::new(1),
                    config: None,
                    exclusive: true,
                },
                &ok,
            )
            .unwrap();
        assert_eq!(again.id, first.id);
        assert!(again.is_active());

        let lowered = Some(from_value(json!({"k": "lower"})).unwrap());
        let lower = |_: &Installation,
                     _: &dyn InstallationQuery|
         -> Result<Option<ConfigMap>, ValidationError> { Ok(lowered.clone()) };
        let cleaned = store
            .install(
                InstallRequest {
                    application_id: app.id,
                    target: TargetId::new(1),
                    config: config.clone(),
                    exclusive: true,
                },
                &lower,
            )
            .unwrap();
        assert_eq!(cleaned.config, lowered);
        assert_eq!(
            store.get_installation(app.id, TargetId::new(1)).unwrap().unwrap().config,
            lowered
        );
    }
}
