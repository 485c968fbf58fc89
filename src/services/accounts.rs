//! Player and staff accounts.
//!
//! Passwords are stored as Argon2id PHC strings. The registry is persisted in
//! `accounts.bin` through the same versioned codec as world entities.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Utc};
use log::{info, warn};
use password_hash::{PasswordHasher, PasswordVerifier};
use thiserror::Error;
use tokio::fs;

use crate::config::{AccountsConfig, Argon2Config};
use crate::persist::{
    decode_layer, decode_record, encode_layer, encode_record, Decoder, GenericReader,
    GenericWriter, Layer, PersistError,
};
use crate::persist;
use crate::storage::{sync_parent, write_synced};
use crate::validation::{validate_account_name, AccountNameError, AccountNameRules};
use crate::wire_enum;

pub const MAX_PASSWORD_LENGTH: usize = 128;

/// The case-insensitive form an account name is looked up by.
pub fn account_key(name: &str) -> String {
    name.trim().to_lowercase()
}

wire_enum! {
    /// Staff rank. Ordered: every level can do what the levels below it can.
    pub enum AccessLevel {
        Player = 0,
        Counselor = 1,
        GameMaster = 2,
        Seer = 3,
        Administrator = 4,
        Owner = 5,
    }
}

impl Default for AccessLevel {
    fn default() -> Self {
        AccessLevel::Player
    }
}

impl AccessLevel {
    pub fn is_staff(self) -> bool {
        self > AccessLevel::Player
    }
}

impl PartialOrd for AccessLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AccessLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::persist::WireEnum;
        f.write_str(self.name())
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use crate::persist::WireEnum;
        let s = s.trim();
        let by_alias = match s.to_ascii_lowercase().as_str() {
            "gm" => Some(AccessLevel::GameMaster),
            "admin" => Some(AccessLevel::Administrator),
            _ => None,
        };
        by_alias
            .or_else(|| AccessLevel::parse_name(s))
            .ok_or_else(|| format!("unknown access level '{}'", s))
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("invalid account name: {0}")]
    InvalidName(#[from] AccountNameError),

    #[error("account '{0}' already exists")]
    AlreadyExists(String),

    #[error("account '{0}' not found")]
    NotFound(String),

    #[error("password must be between {min} and {max} characters")]
    BadPasswordLength { min: usize, max: usize },

    #[error("address {0} already has the maximum number of accounts")]
    TooManyForAddress(String),

    #[error("password hash failure: {0}")]
    Hash(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountComment {
    pub added_by: String,
    pub added_at: DateTime<Utc>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountTag {
    pub name: String,
    pub value: String,
}

/// One account.
///
/// - v0: `username, password_hash, access_level, created, last_login, banned,
///   login_ips, comments`
/// - v1: adds `tags` (default empty) and `email` (default none)
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub username: String,
    pub password_hash: String,
    pub access_level: AccessLevel,
    pub created: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    pub banned: bool,
    /// Addresses this account has logged in from, most recent first.
    pub login_ips: Vec<String>,
    pub comments: Vec<AccountComment>,
    pub tags: Vec<AccountTag>,
    pub email: Option<String>,
}

impl Account {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| t.value.as_str())
    }
}

impl Layer for Account {
    const NAME: &'static str = "Account";
    const VERSION: u32 = 1;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_str(&self.username);
        w.write_str(&self.password_hash);
        w.write_enum(self.access_level);
        w.write_datetime(self.created);
        w.write_datetime(self.last_login);
        w.write_bool(self.banned);
        w.write_list(&self.login_ips, |w, ip| w.write_str(ip));
        w.write_list(&self.comments, |w, c| {
            w.write_str(&c.added_by);
            w.write_datetime(c.added_at);
            w.write_str(&c.content);
        });
        w.write_list(&self.tags, |w, t| {
            w.write_str(&t.name);
            w.write_str(&t.value);
        });
        w.write_string(self.email.as_deref());
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, account_v0), (1, account_v1)]
    }
}

fn required_string(r: &mut GenericReader<'_>, field: &'static str) -> Result<String, PersistError> {
    r.read_string()?.ok_or_else(|| r.out_of_domain(field, -1))
}

fn account_v0(r: &mut GenericReader<'_>) -> Result<Account, PersistError> {
    let username = required_string(r, "username")?;
    let password_hash = required_string(r, "password_hash")?;
    let access_level = r.read_enum()?;
    let created = r.read_datetime()?;
    let last_login = r.read_datetime()?;
    let banned = r.read_bool()?;
    let login_ips = r.read_list(|r| required_string(r, "login_ip"))?;
    let comments = r.read_list(|r| {
        Ok(AccountComment {
            added_by: required_string(r, "comment author")?,
            added_at: r.read_datetime()?,
            content: required_string(r, "comment")?,
        })
    })?;
    Ok(Account {
        username,
        password_hash,
        access_level,
        created,
        last_login,
        banned,
        login_ips,
        comments,
        tags: Vec::new(),
        email: None,
    })
}

fn account_v1(r: &mut GenericReader<'_>) -> Result<Account, PersistError> {
    let mut account = account_v0(r)?;
    account.tags = r.read_list(|r| {
        Ok(AccountTag {
            name: required_string(r, "tag name")?,
            value: required_string(r, "tag value")?,
        })
    })?;
    account.email = r.read_string()?;
    Ok(account)
}

/// The `accounts.bin` record: a list of [`Account`] layers.
struct AccountFile(Vec<Account>);

impl Layer for AccountFile {
    const NAME: &'static str = "AccountFile";
    const VERSION: u32 = 0;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_list(&self.0, |w, account| encode_layer(account, w));
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, |r| Ok(AccountFile(r.read_list(decode_layer)?)))]
    }
}

pub fn build_argon2(config: Option<&Argon2Config>) -> Argon2<'static> {
    let Some(cfg) = config else {
        return Argon2::default();
    };
    let defaults = Params::default();
    let params = Params::new(
        cfg.memory_kib.unwrap_or(defaults.m_cost()),
        cfg.time_cost.unwrap_or(defaults.t_cost()),
        cfg.parallelism.unwrap_or(defaults.p_cost()),
        None,
    );
    match params {
        Ok(p) => Argon2::new(Algorithm::Argon2id, Version::V0x13, p),
        Err(e) => {
            warn!("invalid argon2 parameters ({}); using defaults", e);
            Argon2::default()
        }
    }
}

pub struct AccountRegistry {
    /// Keyed by lowercase name; names are unique regardless of case.
    accounts: BTreeMap<String, Account>,
    argon2: Argon2<'static>,
    rules: AccountNameRules,
    min_password_length: usize,
    max_accounts_per_ip: usize,
}

impl AccountRegistry {
    pub fn new(config: &AccountsConfig) -> Self {
        Self {
            accounts: BTreeMap::new(),
            argon2: build_argon2(config.argon2.as_ref()),
            rules: AccountNameRules {
                min_length: config.min_name_length,
                max_length: config.max_name_length,
                allow_spaces: config.allow_spaces,
            },
            min_password_length: config.min_password_length,
            max_accounts_per_ip: config.max_accounts_per_ip,
        }
    }

    fn hash(&self, password: &str) -> Result<String, AccountError> {
        if password.len() < self.min_password_length || password.len() > MAX_PASSWORD_LENGTH {
            return Err(AccountError::BadPasswordLength {
                min: self.min_password_length,
                max: MAX_PASSWORD_LENGTH,
            });
        }
        let salt = password_hash::SaltString::generate(&mut rand::thread_rng());
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AccountError::Hash(e.to_string()))?;
        Ok(hash.to_string())
    }

    pub fn create(&mut self, name: &str, password: &str) -> Result<&Account, AccountError> {
        let username = validate_account_name(name, &self.rules)?;
        let key = account_key(&username);
        if self.accounts.contains_key(&key) {
            return Err(AccountError::AlreadyExists(username));
        }
        let password_hash = self.hash(password)?;
        let now = persist::now();
        let account = Account {
            username,
            password_hash,
            access_level: AccessLevel::Player,
            created: now,
            last_login: now,
            banned: false,
            login_ips: Vec::new(),
            comments: Vec::new(),
            tags: Vec::new(),
            email: None,
        };
        info!("created account '{}'", account.username);
        Ok(self.accounts.entry(key).or_insert(account))
    }

    pub fn get(&self, name: &str) -> Option<&Account> {
        self.accounts.get(&account_key(name))
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut Account, AccountError> {
        self.accounts
            .get_mut(&account_key(name))
            .ok_or_else(|| AccountError::NotFound(name.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> Option<Account> {
        self.accounts.remove(&account_key(name))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// True if `password` matches. Banned accounts still verify; refusing the
    /// login is the caller's decision.
    pub fn check_password(&self, name: &str, password: &str) -> bool {
        let Some(account) = self.get(name) else {
            return false;
        };
        match password_hash::PasswordHash::new(&account.password_hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                warn!("corrupt password hash for '{}': {}", account.username, e);
                false
            }
        }
    }

    pub fn change_password(&mut self, name: &str, password: &str) -> Result<(), AccountError> {
        let hash = self.hash(password)?;
        self.get_mut(name)?.password_hash = hash;
        Ok(())
    }

    pub fn set_access_level(&mut self, name: &str, level: AccessLevel) -> Result<(), AccountError> {
        let account = self.get_mut(name)?;
        info!(
            "access level of '{}': {} -> {}",
            account.username, account.access_level, level
        );
        account.access_level = level;
        Ok(())
    }

    pub fn set_banned(&mut self, name: &str, banned: bool) -> Result<(), AccountError> {
        self.get_mut(name)?.banned = banned;
        Ok(())
    }

    /// Record a successful login from `ip`. A new address is refused when it
    /// already has the configured number of accounts.
    pub fn record_login(&mut self, name: &str, ip: &str, at: DateTime<Utc>) -> Result<(), AccountError> {
        let key = account_key(name);
        let known = self
            .accounts
            .get(&key)
            .ok_or_else(|| AccountError::NotFound(name.to_string()))?
            .login_ips
            .iter()
            .any(|i| i == ip);
        if !known
            && self.max_accounts_per_ip > 0
            && self.find_by_ip(ip).len() >= self.max_accounts_per_ip
        {
            return Err(AccountError::TooManyForAddress(ip.to_string()));
        }
        let account = self.get_mut(name)?;
        account.login_ips.retain(|i| i != ip);
        account.login_ips.insert(0, ip.to_string());
        account.last_login = persist::to_tick_precision(at);
        Ok(())
    }

    pub fn add_comment(&mut self, name: &str, added_by: &str, content: &str) -> Result<(), AccountError> {
        self.get_mut(name)?.comments.push(AccountComment {
            added_by: added_by.to_string(),
            added_at: persist::now(),
            content: content.to_string(),
        });
        Ok(())
    }

    pub fn set_tag(&mut self, name: &str, tag: &str, value: &str) -> Result<(), AccountError> {
        let account = self.get_mut(name)?;
        match account.tags.iter_mut().find(|t| t.name.eq_ignore_ascii_case(tag)) {
            Some(existing) => existing.value = value.to_string(),
            None => account.tags.push(AccountTag {
                name: tag.to_string(),
                value: value.to_string(),
            }),
        }
        Ok(())
    }

    pub fn set_email(&mut self, name: &str, email: Option<&str>) -> Result<(), AccountError> {
        self.get_mut(name)?.email = email.map(str::to_string);
        Ok(())
    }

    /// Accounts that have logged in from `ip`.
    pub fn find_by_ip(&self, ip: &str) -> Vec<&Account> {
        self.accounts
            .values()
            .filter(|a| a.login_ips.iter().any(|i| i == ip))
            .collect()
    }

    /// One page of accounts sorted by name. Pages start at 0.
    pub fn list(&self, page: usize, per_page: usize) -> Vec<&Account> {
        self.accounts
            .values()
            .skip(page.saturating_mul(per_page))
            .take(per_page)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> + '_ {
        self.accounts.values()
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_record(&AccountFile(self.accounts.values().cloned().collect()))
    }

    pub fn decode(config: &AccountsConfig, bytes: &[u8]) -> Result<Self, AccountError> {
        let AccountFile(accounts) = decode_record(bytes)?;
        let mut registry = Self::new(config);
        for account in accounts {
            let key = account_key(&account.username);
            if registry.accounts.insert(key, account).is_some() {
                warn!("duplicate account name in accounts file; keeping the later record");
            }
        }
        Ok(registry)
    }

    /// Load from `path`; a missing file is an empty registry.
    pub async fn load(path: &Path, config: &AccountsConfig) -> Result<Self, AccountError> {
        match fs::read(path).await {
            Ok(bytes) => Self::decode(config, &bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new(config)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), AccountError> {
        let tmp = path.with_extension("bin.tmp");
        write_synced(&tmp, &self.encode()).await?;
        fs::rename(&tmp, path).await?;
        sync_parent(path).await;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn fast_config() -> AccountsConfig {
    AccountsConfig {
        argon2: Some(Argon2Config {
            memory_kib: Some(1024),
            time_cost: Some(1),
            parallelism: Some(1),
        }),
        ..AccountsConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passwords_verify_and_change() {
        let mut registry = AccountRegistry::new(&fast_config());
        registry.create("Adam", "correct horse").unwrap();
        assert!(registry.check_password("adam", "correct horse"));
        assert!(!registry.check_password("adam", "wrong horse"));
        assert!(!registry.check_password("nobody", "correct horse"));

        registry.change_password("ADAM", "battery staple").unwrap();
        assert!(registry.check_password("adam", "battery staple"));
        assert!(matches!(
            registry.change_password("adam", "short"),
            Err(AccountError::BadPasswordLength { min: 8, .. })
        ));
    }

    #[test]
    fn names_are_unique_regardless_of_case() {
        let mut registry = AccountRegistry::new(&fast_config());
        registry.create("Pixie", "password1").unwrap();
        assert!(matches!(
            registry.create("pixie", "password1"),
            Err(AccountError::AlreadyExists(_))
        ));
        assert!(matches!(
            registry.create("con", "password1"),
            Err(AccountError::InvalidName(AccountNameError::Reserved))
        ));
    }

    #[test]
    fn logins_are_limited_per_address() {
        let config = AccountsConfig {
            max_accounts_per_ip: 2,
            ..fast_config()
        };
        let mut registry = AccountRegistry::new(&config);
        for name in ["one", "two", "three"] {
            registry.create(name, "password1").unwrap();
        }
        let now = Utc::now();
        registry.record_login("one", "10.0.0.5", now).unwrap();
        registry.record_login("two", "10.0.0.5", now).unwrap();
        registry.record_login("one", "10.0.0.5", now).unwrap();
        assert!(matches!(
            registry.record_login("three", "10.0.0.5", now),
            Err(AccountError::TooManyForAddress(_))
        ));
        assert_eq!(registry.find_by_ip("10.0.0.5").len(), 2);
    }

    #[test]
    fn access_levels_parse_and_order() {
        assert_eq!("gm".parse::<AccessLevel>(), Ok(AccessLevel::GameMaster));
        assert_eq!("Seer".parse::<AccessLevel>(), Ok(AccessLevel::Seer));
        assert!("king".parse::<AccessLevel>().is_err());
        assert!(AccessLevel::Administrator > AccessLevel::GameMaster);
        assert!(!AccessLevel::Player.is_staff());
    }

    #[test]
    fn listing_is_sorted_and_paged() {
        let mut registry = AccountRegistry::new(&fast_config());
        for name in ["delta", "alpha", "charlie", "bravo"] {
            registry.create(name, "password1").unwrap();
        }
        let page: Vec<_> = registry.list(1, 2).iter().map(|a| a.username.as_str()).collect();
        assert_eq!(page, vec!["charlie", "delta"]);
    }

    #[test]
    fn v0_accounts_load_without_tags_or_email() {
        let mut w = GenericWriter::new();
        w.write_i32(0); // AccountFile v0
        w.write_count(1);
        w.write_i32(0); // Account v0
        w.write_str("Old");
        w.write_str("$argon2id$v=19$m=1024,t=1,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNoaGFzaA");
        w.write_enum(AccessLevel::Seer);
        w.write_datetime(Utc::now());
        w.write_datetime(Utc::now());
        w.write_bool(true);
        w.write_count(1);
        w.write_str("192.168.1.9");
        w.write_count(0);

        let registry = AccountRegistry::decode(&fast_config(), &w.into_inner()).unwrap();
        let account = registry.get("old").unwrap();
        assert_eq!(account.access_level, AccessLevel::Seer);
        assert!(account.banned);
        assert!(account.tags.is_empty());
        assert_eq!(account.email, None);
    }

    #[test]
    fn fresh_accounts_decode_to_themselves() {
        let mut registry = AccountRegistry::new(&fast_config());
        registry.create("Adam", "password1").unwrap();
        registry
            .record_login("adam", "10.0.0.1", Utc::now())
            .unwrap();
        registry.add_comment("adam", "pix", "first night").unwrap();

        let decoded = AccountRegistry::decode(&fast_config(), &registry.encode()).unwrap();
        assert_eq!(decoded.get("adam"), registry.get("adam"));
    }

    #[tokio::test]
    async fn registry_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.bin");
        let mut registry = AccountRegistry::new(&fast_config());
        registry.create("adam", "password1").unwrap();
        registry.set_tag("adam", "Shard", "Siege").unwrap();
        registry.add_comment("adam", "pix", "helped with the boat").unwrap();
        registry.save(&path).await.unwrap();

        let loaded = AccountRegistry::load(&path, &fast_config()).await.unwrap();
        let account = loaded.get("adam").unwrap();
        assert_eq!(account.tag("shard"), Some("Siege"));
        assert_eq!(account.comments.len(), 1);
        assert!(loaded.check_password("adam", "password1"));
    }
}
