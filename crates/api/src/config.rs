use std::env;
use std::str::FromStr;
use std::time::Duration;

use safarai_planner::generator::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use safarai_planner::GenerativeConfig;

const DEFAULT_ALLOWED_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://127.0.0.1:3000",
    "https://safarai.app",
    "https://www.safarai.app",
];

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub window: Duration,
    pub max_requests: usize,
}

#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub same_site: String,
}

#[derive(Debug, Clone)]
pub struct MailApiConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub frontend_origin: String,
    pub token_url: String,
    pub userinfo_url: String,
}

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind: String,
    pub database_url: Option<String>,
    pub app_name: String,
    pub public_base_url: String,
    pub session_ttl: Duration,
    pub cookie: CookieSettings,
    pub allowed_origins: Vec<String>,
    pub api_rate_limit: RateLimitSettings,
    pub auth_rate_limit: RateLimitSettings,
    pub bcrypt_cost: u32,
    pub mail_from: String,
    pub mail_api: Option<MailApiConfig>,
    pub gemini: Option<GenerativeConfig>,
    pub google_oauth: Option<GoogleOAuthConfig>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            database_url: None,
            app_name: "Safarai".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
            session_ttl: Duration::from_secs(60 * 60 * 24 * 30),
            cookie: CookieSettings {
                name: "safarai_session".to_string(),
                domain: None,
                secure: true,
                same_site: "strict".to_string(),
            },
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|origin| origin.to_string())
                .collect(),
            api_rate_limit: RateLimitSettings {
                window: Duration::from_secs(60),
                max_requests: 120,
            },
            auth_rate_limit: RateLimitSettings {
                window: Duration::from_secs(60),
                max_requests: 12,
            },
            bcrypt_cost: bcrypt::DEFAULT_COST,
            mail_from: "Safarai <no-reply@safarai.app>".to_string(),
            mail_api: None,
            gemini: None,
            google_oauth: None,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cookie = CookieSettings {
            name: env_string("SAFARAI_SESSION_COOKIE_NAME").unwrap_or(defaults.cookie.name),
            domain: env_string("SAFARAI_SESSION_COOKIE_DOMAIN"),
            secure: env_parse::<bool>("SAFARAI_COOKIE_SECURE").unwrap_or(defaults.cookie.secure),
            same_site: sanitize_same_site(
                env_string("SAFARAI_COOKIE_SAMESITE")
                    .as_deref()
                    .unwrap_or("strict"),
            ),
        };

        let allowed_origins = env_string("SAFARAI_ALLOWED_ORIGINS")
            .map(|value| parse_origin_list(&value))
            .unwrap_or(defaults.allowed_origins);

        let mail_api = match (
            env_string("SAFARAI_MAIL_API_URL"),
            env_string("SAFARAI_MAIL_API_KEY"),
        ) {
            (Some(url), Some(api_key)) => Some(MailApiConfig { url, api_key }),
            _ => None,
        };

        let gemini = env_string("SAFARAI_GEMINI_API_KEY").map(|api_key| GenerativeConfig {
            api_key,
            model: env_string("SAFARAI_GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: env_string("SAFARAI_GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        });

        let public_base_url = env_string("SAFARAI_PUBLIC_BASE_URL")
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or(defaults.public_base_url);

        let google_oauth = match (
            env_string("SAFARAI_GOOGLE_CLIENT_ID"),
            env_string("SAFARAI_GOOGLE_CLIENT_SECRET"),
            env_string("SAFARAI_GOOGLE_REDIRECT_URI"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => {
                Some(GoogleOAuthConfig {
                    client_id,
                    client_secret,
                    redirect_uri,
                    frontend_origin: env_string("SAFARAI_FRONTEND_ORIGIN")
                        .unwrap_or_else(|| public_base_url.clone()),
                    token_url: env_string("SAFARAI_GOOGLE_TOKEN_URL")
                        .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
                    userinfo_url: env_string("SAFARAI_GOOGLE_USERINFO_URL")
                        .unwrap_or_else(|| GOOGLE_USERINFO_URL.to_string()),
                })
            }
            _ => None,
        };

        Self {
            bind: env_string("SAFARAI_BIND").unwrap_or(defaults.bind),
            database_url: env_string("SAFARAI_DATABASE_URL"),
            app_name: env_string("SAFARAI_APP_NAME").unwrap_or(defaults.app_name),
            public_base_url,
            session_ttl: env_parse::<u64>("SAFARAI_SESSION_TTL_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            cookie,
            allowed_origins,
            api_rate_limit: RateLimitSettings {
                window: env_parse::<u64>("SAFARAI_API_RATE_LIMIT_WINDOW_SECONDS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.api_rate_limit.window),
                max_requests: env_parse("SAFARAI_API_RATE_LIMIT_MAX")
                    .unwrap_or(defaults.api_rate_limit.max_requests),
            },
            auth_rate_limit: RateLimitSettings {
                window: env_parse::<u64>("SAFARAI_AUTH_RATE_LIMIT_WINDOW_SECONDS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.auth_rate_limit.window),
                max_requests: env_parse("SAFARAI_AUTH_RATE_LIMIT_MAX")
                    .unwrap_or(defaults.auth_rate_limit.max_requests),
            },
            bcrypt_cost: env_parse::<u32>("SAFARAI_BCRYPT_COST")
                .filter(|cost| (4..=31).contains(cost))
                .unwrap_or(defaults.bcrypt_cost),
            mail_from: env_string("SAFARAI_MAIL_FROM").unwrap_or(defaults.mail_from),
            mail_api,
            gemini,
            google_oauth,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|value| value.parse::<T>().ok())
}

pub(crate) fn parse_origin_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}

pub(crate) fn sanitize_same_site(value: &str) -> String {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "strict" | "lax" | "none" => value,
        _ => "strict".to_string(),
    }
}
