use std::path::PathBuf;

use serde::Deserialize;

const FIRESTORE_EMULATOR_HOST_VAR: &str = "FIRESTORE_EMULATOR_HOST";
const DATABASE_EMULATOR_HOST_VAR: &str = "FIREBASE_DATABASE_EMULATOR_HOST";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseBackend {
    Firestore,
    RealtimeDatabase,
    InMemory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub backend: DatabaseBackend,
    /// Service account key downloaded from the Firebase console
    pub credentials_file: PathBuf,
    /// Overrides project id from the credentials file
    pub project_id: Option<String>,
    pub collection: String,
    /// Realtime database url, e.g. `https://<project>-default-rtdb.firebaseio.com`
    pub database_url: Option<String>,
    pub emulator_host: Option<String>,
    pub page_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    pub service_name: String,
    pub jaeger_enabled: bool,
}

impl DatabaseSettings {
    /// Emulator host from settings or from the variable firebase tools export
    pub fn emulator_host(&self) -> Option<String> {
        let variable = match self.backend {
            DatabaseBackend::Firestore => FIRESTORE_EMULATOR_HOST_VAR,
            DatabaseBackend::RealtimeDatabase => DATABASE_EMULATOR_HOST_VAR,
            DatabaseBackend::InMemory => return None,
        };
        self.emulator_host
            .clone()
            .or_else(|| std::env::var(variable).ok())
            .filter(|host| !host.is_empty())
    }
}

impl Settings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.collection.trim_matches('/').is_empty() {
            anyhow::bail!("database.collection must not be empty");
        }
        if self.database.page_size == 0 {
            anyhow::bail!("database.page_size must be greater than 0");
        }
        if self.database.backend == DatabaseBackend::RealtimeDatabase
            && self.database.database_url.is_none()
        {
            anyhow::bail!("database.database_url is required for realtime_database backend");
        }
        Ok(())
    }
}

/// Builds settings from defaults, optional `settings.toml` file and `FIREBOOKS__` prefixed variables
///
/// For ex: `FIREBOOKS__DATABASE__BACKEND=in_memory` sets `Settings.database.backend`
pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from(config::Environment::with_prefix("FIREBOOKS").separator("__"))
}

fn load_settings_from(environment: config::Environment) -> anyhow::Result<Settings> {
    let settings: Settings = config::Config::builder()
        .set_default("application.host", "0.0.0.0")?
        .set_default("application.port", 8080)?
        .set_default("database.backend", "firestore")?
        .set_default("database.credentials_file", "firebaseConfig.json")?
        .set_default("database.collection", "books")?
        .set_default("database.page_size", 300)?
        .set_default("telemetry.service_name", "firebooks_service")?
        .set_default("telemetry.jaeger_enabled", false)?
        .add_source(config::File::with_name("settings").required(false))
        .add_source(environment.try_parsing(true))
        .build()?
        .try_deserialize()?;

    settings.validate()?;
    Ok(settings)
}
