//! Client-side cookie jar.
//!
//! Holds the access-token cookie, the locale preference cookie and any
//! cookies the backend sets. The refresh token never goes in here.

use cookie::time::{Duration, OffsetDateTime};
use cookie::Cookie;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::storage::{DurableStorage, StorageError};

const JAR_STORAGE_KEY: &str = "cookies";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attributes of a cookie the client writes itself.
#[derive(Debug, Clone)]
pub struct CookieSpec {
    pub name: String,
    pub path: String,
    pub max_age_secs: i64,
    pub same_site: SameSite,
    pub secure: bool,
}

impl CookieSpec {
    /// Access-token cookie: site-wide, one week, strict same-site.
    pub fn access_token(name: &str, max_age_secs: i64) -> Self {
        Self {
            name: name.to_string(),
            path: "/".to_string(),
            max_age_secs,
            same_site: SameSite::Strict,
            secure: false,
        }
    }

    /// Locale preference cookie.
    pub fn locale(name: &str, max_age_secs: i64) -> Self {
        Self {
            name: name.to_string(),
            path: "/".to_string(),
            max_age_secs,
            same_site: SameSite::Lax,
            secure: false,
        }
    }

    pub fn build_set_cookie(&self, value: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path={}; Max-Age={}; SameSite={}",
            self.name,
            value,
            self.path,
            self.max_age_secs,
            self.same_site.as_str()
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    pub fn build_delete_cookie(&self) -> String {
        format!("{}=; Path={}; Max-Age=0", self.name, self.path)
    }
}

/// Name/value pairs sent back as the `Cookie` header.
pub struct CookieJar {
    cookies: DashMap<String, String>,
    storage: Option<Arc<dyn DurableStorage>>,
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieJar {
    /// A jar that lives only as long as the process.
    pub fn new() -> Self {
        Self {
            cookies: DashMap::new(),
            storage: None,
        }
    }

    /// A jar mirrored into `storage`, starting from what was saved there.
    pub fn load(storage: Arc<dyn DurableStorage>) -> Self {
        let cookies = DashMap::new();
        if let Some(saved) = storage.get(JAR_STORAGE_KEY) {
            match serde_json::from_str::<BTreeMap<String, String>>(&saved) {
                Ok(map) => {
                    for (name, value) in map {
                        cookies.insert(name, value);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Ignoring unreadable cookie jar"),
            }
        }
        Self {
            cookies,
            storage: Some(storage),
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.cookies.get(name).map(|r| r.value().clone())
    }

    /// Store a cookie and return the `Set-Cookie` line describing it.
    pub fn set(&self, spec: &CookieSpec, value: &str) -> Result<String, StorageError> {
        self.cookies.insert(spec.name.clone(), value.to_string());
        self.save()?;
        Ok(spec.build_set_cookie(value))
    }

    pub fn remove(&self, spec: &CookieSpec) -> Result<String, StorageError> {
        self.cookies.remove(&spec.name);
        self.save()?;
        Ok(spec.build_delete_cookie())
    }

    /// Apply `Set-Cookie` lines from a backend response.
    pub fn absorb(&self, set_cookies: &[String]) -> Result<(), StorageError> {
        if set_cookies.is_empty() {
            return Ok(());
        }
        for line in set_cookies {
            let Some((name, value, expired)) = parse_set_cookie(line) else {
                continue;
            };
            if expired {
                self.cookies.remove(&name);
            } else {
                self.cookies.insert(name, value);
            }
        }
        self.save()
    }

    /// Render the `Cookie` request header, or `None` when empty.
    pub fn header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let sorted: BTreeMap<String, String> = self
            .cookies
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        Some(
            sorted
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn save(&self) -> Result<(), StorageError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        let map: BTreeMap<String, String> = self
            .cookies
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        storage.set(JAR_STORAGE_KEY, &serde_json::to_string(&map)?)
    }
}

/// `(name, value, expired)` of a `Set-Cookie` line.
///
/// `Max-Age` takes precedence over `Expires` (RFC 6265 5.3).
fn parse_set_cookie(line: &str) -> Option<(String, String, bool)> {
    let cookie = Cookie::parse(line).ok()?;
    if cookie.name().is_empty() {
        return None;
    }
    let expired = match cookie.max_age() {
        Some(age) => age <= Duration::ZERO,
        None => cookie
            .expires_datetime()
            .is_some_and(|at| at <= OffsetDateTime::now_utc()),
    };
    Some((cookie.name().to_string(), cookie.value().to_string(), expired))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::storage::MemoryStorage;

    #[test]
    fn test_access_cookie_attributes() {
        let spec = CookieSpec::access_token("access_token", 604800);
        let line = spec.build_set_cookie("abc");
        assert_eq!(line, "access_token=abc; Path=/; Max-Age=604800; SameSite=Strict");
        assert_eq!(spec.build_delete_cookie(), "access_token=; Path=/; Max-Age=0");
    }

    #[test]
    fn test_locale_cookie_is_one_year() {
        let line = CookieSpec::locale("NEXT_LOCALE", 31_536_000).build_set_cookie("ru");
        assert!(line.starts_with("NEXT_LOCALE=ru;"));
        assert!(line.contains("Max-Age=31536000"));
    }

    #[test]
    fn test_header_rendering_is_sorted() {
        let jar = CookieJar::new();
        assert!(jar.header().is_none());
        jar.set(&CookieSpec::locale("b", 10), "2").unwrap();
        jar.set(&CookieSpec::access_token("a", 10), "1").unwrap();
        assert_eq!(jar.header().as_deref(), Some("a=1; b=2"));
    }

    #[test]
    fn test_absorb_server_cookies() {
        let jar = CookieJar::new();
        jar.absorb(&[
            "sid=s1; Path=/; HttpOnly".to_string(),
            "theme=dark".to_string(),
            "garbage".to_string(),
        ])
        .unwrap();
        assert_eq!(jar.get("sid").as_deref(), Some("s1"));
        assert_eq!(jar.get("theme").as_deref(), Some("dark"));

        jar.absorb(&["sid=; Path=/; Max-Age=0".to_string()]).unwrap();
        assert!(jar.get("sid").is_none());
    }

    #[test]
    fn test_past_expires_removes_cookie() {
        let jar = CookieJar::new();
        jar.absorb(&["sid=s1; Path=/; HttpOnly".to_string()]).unwrap();
        jar.absorb(&["sid=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT".to_string()])
            .unwrap();
        assert!(jar.get("sid").is_none());
        assert!(jar.header().is_none());
    }

    #[test]
    fn test_future_expiry_and_padded_max_age_keep_cookie() {
        let jar = CookieJar::new();
        jar.absorb(&[
            "keep=v; Max-Age=05".to_string(),
            "theme=dark; Expires=Wed, 21 Oct 2099 07:28:00 GMT".to_string(),
        ])
        .unwrap();
        assert_eq!(jar.get("keep").as_deref(), Some("v"));
        assert_eq!(jar.get("theme").as_deref(), Some("dark"));

        jar.absorb(&["keep=; Max-Age=-1".to_string()]).unwrap();
        assert!(jar.get("keep").is_none());
    }

    #[test]
    fn test_max_age_overrides_expires() {
        let jar = CookieJar::new();
        jar.absorb(&["sid=s2; Max-Age=60; Expires=Thu, 01 Jan 1970 00:00:00 GMT".to_string()])
            .unwrap();
        assert_eq!(jar.get("sid").as_deref(), Some("s2"));
    }

    #[test]
    fn test_jar_survives_reload() {
        let storage: Arc<dyn DurableStorage> = Arc::new(MemoryStorage::new());
        let jar = CookieJar::load(storage.clone());
        jar.set(&CookieSpec::access_token("access_token", 10), "tok").unwrap();

        let reloaded = CookieJar::load(storage);
        assert_eq!(reloaded.get("access_token").as_deref(), Some("tok"));
    }
}
