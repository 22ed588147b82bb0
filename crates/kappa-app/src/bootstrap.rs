use std::sync::Arc;

use kappa_access::{Permissions, hash_password};
use kappa_config::{AdminSeed, AppConfig, LogFormatSetting};
use kappa_data::{MemoryStore, NewUser, PgStore, Store};
use kappa_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, Metrics};
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};

/// Dependencies required to bootstrap the Kappa API.
///
/// The store is opened later, once logging is up, so connect and migration
/// messages are not lost.
pub(crate) struct BootstrapDependencies {
    config: AppConfig,
    telemetry: Metrics,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the environment for the binary entrypoint.
    pub(crate) fn from_env() -> AppResult<Self> {
        let config = AppConfig::from_env().map_err(|err| AppError::config("config.from_env", err))?;
        let telemetry =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        Ok(Self { config, telemetry })
    }
}

/// Entry point for the Kappa API boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, storage, or the listener fails.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;
    run_app_with(dependencies).await
}

/// Boot sequence that relies entirely on injected dependencies.
pub(crate) async fn run_app_with(dependencies: BootstrapDependencies) -> AppResult<()> {
    let BootstrapDependencies { config, telemetry } = dependencies;

    let logging = LoggingConfig {
        level: &config.log_level,
        format: log_format(config.log_format),
        ..LoggingConfig::default()
    };
    kappa_telemetry::init_logging(&logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new(config.app_name.clone());

    info!(app = %config.app_name, "Kappa API bootstrap starting");

    let store = open_store(config.database_url.as_deref()).await?;
    seed_admin(store.as_ref(), &config.admin).await?;

    let api = kappa_api::ApiServer::new(
        store,
        telemetry,
        config.rate_limits.clone(),
        config.app_name.clone(),
        &config.cors_origins,
    )
    .map_err(|err| AppError::api_server("api_server.new", err))?;

    info!(addr = %config.bind_addr, "Launching API listener");
    let serve_result = api.serve(config.bind_addr).await;
    if let Err(err) = &serve_result {
        error!(error = %err, "API server terminated");
    }
    serve_result.map_err(|err| AppError::api_server("api_server.serve", err))
}

/// Open Postgres when a URL is configured, otherwise fall back to memory.
pub(crate) async fn open_store(database_url: Option<&str>) -> AppResult<Arc<dyn Store>> {
    match database_url {
        Some(url) => {
            let store = PgStore::connect(url)
                .await
                .map_err(|err| AppError::data("store.connect", err))?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL unset; records will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Create the configured administrator with every permission unless the name is taken.
pub(crate) async fn seed_admin(store: &dyn Store, seed: &AdminSeed) -> AppResult<()> {
    if store
        .user_by_username(&seed.username)
        .await
        .map_err(|err| AppError::data("admin.lookup", err))?
        .is_some()
    {
        info!(username = %seed.username, "administrator already present");
        return Ok(());
    }

    let password_hash =
        hash_password(&seed.password).map_err(|err| AppError::access("admin.hash", err))?;
    let admin = store
        .create_user(NewUser {
            username: seed.username.clone(),
            password_hash,
            perms: Permissions::ALL,
        })
        .await
        .map_err(|err| AppError::data("admin.create", err))?;
    info!(user_id = admin.id, username = %admin.username, "administrator seeded");
    Ok(())
}

const fn log_format(setting: Option<LogFormatSetting>) -> LogFormat {
    match setting {
        Some(LogFormatSetting::Json) => LogFormat::Json,
        Some(LogFormatSetting::Pretty) => LogFormat::Pretty,
        None => LogFormat::infer(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kappa_access::verify_password;
    use std::io;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            let bytes = self.0.lock().map(|buf| buf.clone()).unwrap_or_default();
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Ok(mut inner) = self.0.lock() {
                inner.extend_from_slice(buf);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn seed() -> AdminSeed {
        AdminSeed {
            username: "root".into(),
            password: "hunter2".into(),
        }
    }

    #[tokio::test]
    async fn admin_is_seeded_once_with_every_permission() -> anyhow::Result<()> {
        let store = open_store(None).await?;
        seed_admin(store.as_ref(), &seed()).await?;
        seed_admin(store.as_ref(), &seed()).await?;

        let users = store.list_users().await?;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].perms, Permissions::ALL);
        assert!(verify_password(&users[0].password_hash, "hunter2")?);
        Ok(())
    }

    #[tokio::test]
    async fn existing_username_is_left_untouched() -> anyhow::Result<()> {
        let store = open_store(None).await?;
        store
            .create_user(NewUser {
                username: "root".into(),
                password_hash: hash_password("original")?,
                perms: Permissions::GENERAL,
            })
            .await?;

        seed_admin(store.as_ref(), &seed()).await?;
        let user = store
            .user_by_username("root")
            .await?
            .ok_or_else(|| anyhow::anyhow!("seeded user missing"))?;
        assert_eq!(user.perms, Permissions::GENERAL);
        assert!(verify_password(&user.password_hash, "original")?);
        Ok(())
    }

    #[tokio::test]
    async fn memory_fallback_warning_reaches_the_installed_subscriber() -> anyhow::Result<()> {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let store = open_store(None).await?;
        assert!(store.list_users().await?.is_empty());
        assert!(logs.text().contains("DATABASE_URL unset"));
        Ok(())
    }

    #[test]
    fn explicit_log_format_wins_over_inference() {
        assert_eq!(log_format(Some(LogFormatSetting::Json)), LogFormat::Json);
        assert_eq!(log_format(Some(LogFormatSetting::Pretty)), LogFormat::Pretty);
        assert_eq!(log_format(None), LogFormat::infer());
    }
}
