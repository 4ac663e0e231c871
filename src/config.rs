use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Wallet linking posture.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// When false, connect trusts the claimed address if no signature is sent.
    pub require_signature: bool,
    /// Domain used for synthesized wallet emails: `<address>@wallet.<domain>`.
    pub email_domain: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            require_signature: false,
            email_domain: "foodprint".into(),
        }
    }
}

/// DigitalOcean Spaces (S3-compatible) credentials. Only present when all
/// four `DO_*` variables are set.
#[derive(Debug, Clone, Deserialize)]
pub struct SpacesConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub wallet: WalletConfig,
    pub spaces: Option<SpacesConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = database_url_from_env()?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "foodprint".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "foodprint-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
        };
        let wallet = WalletConfig {
            require_signature: std::env::var("WALLET_REQUIRE_SIGNATURE")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            email_domain: std::env::var("WALLET_EMAIL_DOMAIN")
                .unwrap_or_else(|_| "foodprint".into()),
        };
        let spaces = spaces_from_env();

        Ok(Self {
            database_url,
            jwt,
            wallet,
            spaces,
        })
    }
}

// DATABASE_URL wins, then DB_URL, then discrete DB_* parts.
fn database_url_from_env() -> anyhow::Result<String> {
    if let Ok(url) = std::env::var("DATABASE_URL") {
        return Ok(url);
    }
    if let Ok(url) = std::env::var("DB_URL") {
        return Ok(url);
    }
    let host = std::env::var("DB_HOST").unwrap_or_else(|_| "localhost".into());
    let port = std::env::var("DB_PORT").unwrap_or_else(|_| "5432".into());
    let user = std::env::var("DB_USER").context("DATABASE_URL, DB_URL or DB_USER must be set")?;
    let password = std::env::var("DB_PASSWORD").unwrap_or_default();
    let name = std::env::var("DB_NAME").context("DB_NAME must be set")?;
    Ok(compose_database_url(&host, &port, &user, &password, &name))
}

fn compose_database_url(host: &str, port: &str, user: &str, password: &str, name: &str) -> String {
    if password.is_empty() {
        format!("postgres://{}@{}:{}/{}", user, host, port, name)
    } else {
        format!("postgres://{}:{}@{}:{}/{}", user, password, host, port, name)
    }
}

fn spaces_from_env() -> Option<SpacesConfig> {
    let endpoint = std::env::var("DO_ENDPOINT").ok().filter(|v| !v.is_empty())?;
    let access_key = std::env::var("DO_KEY_ID").ok().filter(|v| !v.is_empty())?;
    let secret_key = std::env::var("DO_SECRET").ok().filter(|v| !v.is_empty())?;
    let bucket = std::env::var("DO_BUCKET_NAME").ok().filter(|v| !v.is_empty())?;
    Some(SpacesConfig {
        endpoint,
        bucket,
        access_key,
        secret_key,
        region: std::env::var("DO_REGION").unwrap_or_else(|_| "us-east-1".into()),
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
