// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Authentication schema: users and sessions/cookies.
//!
//! The HTTP layer is an external collaborator; this module owns the tabular
//! state it consumes: password hashes, API keys, session tokens, and the
//! stored (not evaluated) TOTP enrollment.

use crate::json::UserConfig;
use base::time::Time;
use base::{bail_t, strutil, ErrorKind, ResultExt as _};
use ring::rand::{SecureRandom, SystemRandom};
use rusqlite::{named_params, params, Connection};
use scrypt::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Wrapper around [`scrypt::Params`].
///
/// `scrypt::Params` does not implement `PartialEq`; so for the benefit of
/// `set_test_config` error handling, keep track of whether these params are
/// the recommended production ones or the cheap test ones.
struct Params {
    actual: scrypt::Params,
    is_test: bool,
}

static PARAMS: OnceLock<Params> = OnceLock::new();

fn params() -> &'static Params {
    PARAMS.get_or_init(|| Params {
        actual: scrypt::Params::recommended(),
        is_test: false,
    })
}

/// For testing only: use fast but insecure hashes.
/// Call via `testutil::init()`.
pub(crate) fn set_test_config() {
    let test_params =
        scrypt::Params::new(8, 8, 1, scrypt::Params::RECOMMENDED_LEN).expect("test params valid");
    if let Err(existing_params) = PARAMS.set(Params {
        actual: test_params,
        is_test: true,
    }) {
        assert!(
            existing_params.is_test,
            "set_test_config must be called before any use of the parameters"
        );
    }
}

/// Role ↔ name mapping: {admin, user, viewer, api}.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[repr(i32)]
pub enum Role {
    Admin = 0,
    #[default]
    User = 1,
    Viewer = 2,
    Api = 3,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Viewer => "viewer",
            Role::Api => "api",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            "viewer" => Some(Role::Viewer),
            "api" => Some(Role::Api),
            _ => None,
        }
    }
}

impl rusqlite::types::FromSql for Role {
    fn column_result(
        value: rusqlite::types::ValueRef,
    ) -> rusqlite::types::FromSqlResult<Self> {
        match value.as_i64()? {
            0 => Ok(Role::Admin),
            1 => Ok(Role::User),
            2 => Ok(Role::Viewer),
            3 => Ok(Role::Api),
            v => Err(rusqlite::types::FromSqlError::OutOfRange(v)),
        }
    }
}

impl rusqlite::types::ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok((*self as i32).into())
    }
}

#[derive(Debug)]
pub struct User {
    pub id: i64,
    pub username: String,
    password_hash: Option<String>,
    pub password_failure_count: i64,
    pub role: Role,
    pub api_key: Option<String>,
    totp_secret: Option<String>,
    totp_enabled: bool,
    pub config: UserConfig,
    pub created: Time,
}

impl User {
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Checks if the user's password hash matches the supplied password.
    fn check_password(&self, password: &str) -> Result<bool, base::Error> {
        let Some(hash) = self.password_hash.as_ref() else {
            return Ok(false);
        };
        let hash = PasswordHash::new(hash).map_err(|e| {
            base::format_err_t!(
                DataLoss,
                "bad stored password hash for user {:?}: {}",
                self.username,
                e
            )
        })?;
        match scrypt::Scrypt.verify_password(password.as_bytes(), &hash) {
            Ok(()) => Ok(true),
            Err(scrypt::password_hash::errors::Error::Password) => Ok(false),
            Err(e) => Err(base::format_err_t!(
                Internal,
                "unable to verify password for user {:?}: {}",
                self.username,
                e
            )),
        }
    }
}

fn hash_password(password: &str) -> String {
    let salt = SaltString::generate(&mut scrypt::password_hash::rand_core::OsRng);
    let params = params();
    scrypt::Scrypt
        .hash_password_customized(password.as_bytes(), None, None, params.actual, &salt)
        .expect("scrypt hash never fails with valid params")
        .to_string()
}

/// A raw session id (not base64-encoded). Sensitive. Never stored in the
/// database; only its hash is.
#[derive(Copy, Clone)]
pub struct RawSessionId([u8; 48]);

impl RawSessionId {
    pub fn encode_base64(&self) -> String {
        base64::encode_config(self.0, base64::STANDARD_NO_PAD)
    }

    pub fn decode_base64(input: &[u8]) -> Result<Self, base::Error> {
        let mut s = RawSessionId([0u8; 48]);
        let l = base64::decode_config_slice(input, base64::STANDARD_NO_PAD, &mut s.0[..])
            .err_kind(ErrorKind::InvalidArgument)?;
        if l != 48 {
            bail_t!(InvalidArgument, "session id must be 48 bytes");
        }
        Ok(s)
    }

    pub fn hash(&self) -> SessionHash {
        let r = blake3::hash(&self.0[..]);
        let mut h = SessionHash([0u8; 24]);
        h.0.copy_from_slice(&r.as_bytes()[0..24]);
        h
    }
}

impl AsRef<[u8]> for RawSessionId {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

impl fmt::Debug for RawSessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "RawSessionId(\"{}\")", &strutil::hex(&self.0[..]))
    }
}

/// A blake3 hash of the 48-byte session id, used as the database key so the
/// id itself never touches disk.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct SessionHash(pub [u8; 24]);

impl fmt::Debug for SessionHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "SessionHash(\"{}\")", strutil::hex(&self.0[..]))
    }
}

enum IpAddrBuf {
    V4([u8; 4]),
    V6([u8; 16]),
}

impl AsRef<[u8]> for IpAddrBuf {
    fn as_ref(&self) -> &[u8] {
        match *self {
            IpAddrBuf::V4(ref s) => &s[..],
            IpAddrBuf::V6(ref s) => &s[..],
        }
    }
}

fn addr_buf(addr: Option<IpAddr>) -> Option<IpAddrBuf> {
    match addr {
        None => None,
        Some(IpAddr::V4(a)) => Some(IpAddrBuf::V4(a.octets())),
        Some(IpAddr::V6(a)) => Some(IpAddrBuf::V6(a.octets())),
    }
}

#[derive(Debug)]
pub(crate) struct State {
    users_by_id: BTreeMap<i64, User>,
    users_by_name: BTreeMap<String, i64>,
    rand: SystemRandom,
}

impl State {
    pub fn init(conn: &Connection) -> Result<Self, base::Error> {
        let mut state = State {
            users_by_id: BTreeMap::new(),
            users_by_name: BTreeMap::new(),
            rand: SystemRandom::new(),
        };
        let mut stmt = conn
            .prepare(
                r#"
                select
                    id,
                    username,
                    password_hash,
                    password_failure_count,
                    role,
                    api_key,
                    totp_secret,
                    totp_enabled,
                    config,
                    created_sec
                from
                    user
                "#,
            )
            .err_kind(ErrorKind::Internal)?;
        let mut rows = stmt.query(params![]).err_kind(ErrorKind::Internal)?;
        while let Some(row) = rows.next().err_kind(ErrorKind::Internal)? {
            let id = row.get(0).err_kind(ErrorKind::Internal)?;
            let name: String = row.get(1).err_kind(ErrorKind::Internal)?;
            state.users_by_id.insert(
                id,
                User {
                    id,
                    username: name.clone(),
                    password_hash: row.get(2).err_kind(ErrorKind::Internal)?,
                    password_failure_count: row.get(3).err_kind(ErrorKind::Internal)?,
                    role: row.get(4).err_kind(ErrorKind::Internal)?,
                    api_key: row.get(5).err_kind(ErrorKind::Internal)?,
                    totp_secret: row.get(6).err_kind(ErrorKind::Internal)?,
                    totp_enabled: row.get(7).err_kind(ErrorKind::Internal)?,
                    config: row.get(8).err_kind(ErrorKind::Internal)?,
                    created: Time(row.get(9).err_kind(ErrorKind::Internal)?),
                },
            );
            state.users_by_name.insert(name, id);
        }
        Ok(state)
    }

    /// Creates the default admin account when the user table is empty, so a
    /// fresh install is reachable. The password must be changed on first
    /// login; the web layer enforces that.
    pub fn maybe_seed_default_admin(
        &mut self,
        conn: &Connection,
        now: Time,
    ) -> Result<(), base::Error> {
        if !self.users_by_id.is_empty() {
            return Ok(());
        }
        warn!("user table is empty; creating default admin user with password \"admin\"");
        self.create_user(conn, "admin", Some("admin"), Role::Admin, now)?;
        Ok(())
    }

    pub fn users_by_id(&self) -> &BTreeMap<i64, User> {
        &self.users_by_id
    }

    pub fn create_user(
        &mut self,
        conn: &Connection,
        username: &str,
        password: Option<&str>,
        role: Role,
        now: Time,
    ) -> Result<i64, base::Error> {
        if username.is_empty() {
            bail_t!(InvalidArgument, "username must be non-empty");
        }
        if self.users_by_name.contains_key(username) {
            bail_t!(AlreadyExists, "user {:?} already exists", username);
        }
        let password_hash = password.map(hash_password);
        let mut stmt = conn
            .prepare_cached(
                r#"
                insert into user (username,  password_hash,  role,  config,  created_sec)
                          values (:username, :password_hash, :role, :config, :created_sec)
                "#,
            )
            .err_kind(ErrorKind::Internal)?;
        stmt.execute(named_params! {
            ":username": username,
            ":password_hash": &password_hash,
            ":role": role,
            ":config": UserConfig::default(),
            ":created_sec": now.0,
        })
        .err_kind(ErrorKind::Internal)?;
        let id = conn.last_insert_rowid();
        self.users_by_name.insert(username.to_owned(), id);
        self.users_by_id.insert(
            id,
            User {
                id,
                username: username.to_owned(),
                password_hash,
                password_failure_count: 0,
                role,
                api_key: None,
                totp_secret: None,
                totp_enabled: false,
                config: UserConfig::default(),
                created: now,
            },
        );
        info!(%username, role = role.as_str(), "created user");
        Ok(id)
    }

    pub fn get_user(&self, username: &str) -> Option<&User> {
        self.users_by_name.get(username).map(|id| {
            self.users_by_id
                .get(id)
                .expect("users_by_name implies users_by_id")
        })
    }

    pub fn get_user_by_api_key(&self, api_key: &str) -> Option<&User> {
        self.users_by_id
            .values()
            .find(|u| u.api_key.as_deref() == Some(api_key))
    }

    /// Verifies a password login, returning the user id. Unknown users,
    /// disabled users, and bad passwords are indistinguishable
    /// `Unauthenticated` errors; bad passwords also bump the stored failure
    /// count.
    pub fn authenticate(
        &mut self,
        conn: &Connection,
        username: &str,
        password: &str,
    ) -> Result<i64, base::Error> {
        let Some(&id) = self.users_by_name.get(username) else {
            bail_t!(Unauthenticated, "bad credentials");
        };
        let u = self
            .users_by_id
            .get_mut(&id)
            .expect("users_by_name implies users_by_id");
        if u.config.disabled {
            bail_t!(Unauthenticated, "bad credentials");
        }
        if u.check_password(password)? {
            return Ok(id);
        }
        u.password_failure_count += 1;
        let count = u.password_failure_count;
        conn.prepare_cached("update user set password_failure_count = :c where id = :id")
            .err_kind(ErrorKind::Internal)?
            .execute(named_params! {":c": count, ":id": id})
            .err_kind(ErrorKind::Internal)?;
        bail_t!(Unauthenticated, "bad credentials");
    }

    pub fn change_password(
        &mut self,
        conn: &Connection,
        username: &str,
        new_password: &str,
    ) -> Result<(), base::Error> {
        let Some(&id) = self.users_by_name.get(username) else {
            bail_t!(NotFound, "no user {:?}", username);
        };
        let hash = hash_password(new_password);
        conn.prepare_cached(
            "update user set password_hash = :hash, password_failure_count = 0 where id = :id",
        )
        .err_kind(ErrorKind::Internal)?
        .execute(named_params! {":hash": &hash, ":id": id})
        .err_kind(ErrorKind::Internal)?;
        let u = self.users_by_id.get_mut(&id).expect("consistent maps");
        u.password_hash = Some(hash);
        u.password_failure_count = 0;
        Ok(())
    }

    pub fn create_session(
        &mut self,
        conn: &Connection,
        user_id: i64,
        peer_addr: Option<IpAddr>,
        user_agent: Option<&str>,
        ttl_sec: i64,
        now: Time,
    ) -> Result<RawSessionId, base::Error> {
        if ttl_sec <= 0 {
            bail_t!(InvalidArgument, "session ttl must be positive");
        }
        let Some(u) = self.users_by_id.get(&user_id) else {
            bail_t!(NotFound, "no user {}", user_id);
        };
        if u.config.disabled {
            bail_t!(FailedPrecondition, "user {:?} is disabled", u.username);
        }
        let mut session_id = RawSessionId([0u8; 48]);
        self.rand
            .fill(&mut session_id.0)
            .expect("SystemRandom never fails");
        let hash = session_id.hash();
        let addr = addr_buf(peer_addr);
        let addr: Option<&[u8]> = addr.as_ref().map(|a| a.as_ref());
        conn.prepare_cached(
            r#"
            insert into user_session (session_hash,  user_id,  creation_sec,  expiry_sec,
                                      peer_addr,  user_agent)
                              values (:session_hash, :user_id, :creation_sec, :expiry_sec,
                                      :peer_addr, :user_agent)
            "#,
        )
        .err_kind(ErrorKind::Internal)?
        .execute(named_params! {
            ":session_hash": &hash.0[..],
            ":user_id": user_id,
            ":creation_sec": now.0,
            ":expiry_sec": now.0 + ttl_sec,
            ":peer_addr": &addr,
            ":user_agent": &user_agent,
        })
        .err_kind(ErrorKind::Internal)?;
        Ok(session_id)
    }

    /// Validates a base64 session token, returning the user id. Expired and
    /// unknown tokens are `Unauthenticated`. Bumps the use counter.
    pub fn validate_session(
        &mut self,
        conn: &Connection,
        token: &str,
        now: Time,
    ) -> Result<i64, base::Error> {
        let id = RawSessionId::decode_base64(token.as_bytes())?;
        let hash = id.hash();
        let mut stmt = conn
            .prepare_cached(
                "select user_id, expiry_sec from user_session where session_hash = :hash",
            )
            .err_kind(ErrorKind::Internal)?;
        let row = stmt
            .query_row(named_params! {":hash": &hash.0[..]}, |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    base::format_err_t!(Unauthenticated, "no such session")
                }
                e => base::Error::from(failure::Error::from(e).context(ErrorKind::Internal)),
            })?;
        let (user_id, expiry_sec) = row;
        if now.0 >= expiry_sec {
            bail_t!(Unauthenticated, "session expired");
        }
        conn.prepare_cached(
            "update user_session set use_count = use_count + 1, last_use_sec = :now \
             where session_hash = :hash",
        )
        .err_kind(ErrorKind::Internal)?
        .execute(named_params! {":now": now.0, ":hash": &hash.0[..]})
        .err_kind(ErrorKind::Internal)?;
        Ok(user_id)
    }

    pub fn delete_session(&mut self, conn: &Connection, token: &str) -> Result<(), base::Error> {
        let id = RawSessionId::decode_base64(token.as_bytes())?;
        let hash = id.hash();
        let n = conn
            .prepare_cached("delete from user_session where session_hash = :hash")
            .err_kind(ErrorKind::Internal)?
            .execute(named_params! {":hash": &hash.0[..]})
            .err_kind(ErrorKind::Internal)?;
        if n == 0 {
            bail_t!(NotFound, "no such session");
        }
        Ok(())
    }

    /// Removes expired sessions; returns how many were dropped.
    pub fn cleanup_sessions(&mut self, conn: &Connection, now: Time) -> Result<usize, base::Error> {
        conn.prepare_cached("delete from user_session where expiry_sec <= :now")
            .err_kind(ErrorKind::Internal)?
            .execute(named_params! {":now": now.0})
            .err_kind(ErrorKind::Internal)
    }

    /// Generates and stores a fresh API key for the user, returning it.
    pub fn generate_api_key(
        &mut self,
        conn: &Connection,
        user_id: i64,
    ) -> Result<String, base::Error> {
        if !self.users_by_id.contains_key(&user_id) {
            bail_t!(NotFound, "no user {}", user_id);
        }
        let mut raw = [0u8; 32];
        self.rand.fill(&mut raw).expect("SystemRandom never fails");
        let key = strutil::hex(&raw);
        conn.prepare_cached("update user set api_key = :key where id = :id")
            .err_kind(ErrorKind::Internal)?
            .execute(named_params! {":key": &key, ":id": user_id})
            .err_kind(ErrorKind::Internal)?;
        self.users_by_id
            .get_mut(&user_id)
            .expect("checked above")
            .api_key = Some(key.clone());
        Ok(key)
    }

    pub fn set_totp_secret(
        &mut self,
        conn: &Connection,
        user_id: i64,
        secret: &str,
    ) -> Result<(), base::Error> {
        if !self.users_by_id.contains_key(&user_id) {
            bail_t!(NotFound, "no user {}", user_id);
        }
        conn.prepare_cached("update user set totp_secret = :secret where id = :id")
            .err_kind(ErrorKind::Internal)?
            .execute(named_params! {":secret": secret, ":id": user_id})
            .err_kind(ErrorKind::Internal)?;
        self.users_by_id
            .get_mut(&user_id)
            .expect("checked above")
            .totp_secret = Some(secret.to_owned());
        Ok(())
    }

    pub fn enable_totp(
        &mut self,
        conn: &Connection,
        user_id: i64,
        enabled: bool,
    ) -> Result<(), base::Error> {
        let Some(u) = self.users_by_id.get_mut(&user_id) else {
            bail_t!(NotFound, "no user {}", user_id);
        };
        if enabled && u.totp_secret.is_none() {
            bail_t!(FailedPrecondition, "user {} has no TOTP secret", user_id);
        }
        conn.prepare_cached("update user set totp_enabled = :enabled where id = :id")
            .err_kind(ErrorKind::Internal)?
            .execute(named_params! {":enabled": enabled, ":id": user_id})
            .err_kind(ErrorKind::Internal)?;
        u.totp_enabled = enabled;
        Ok(())
    }

    /// Returns `(secret, enabled)`.
    pub fn get_totp_info(&self, user_id: i64) -> Result<(Option<String>, bool), base::Error> {
        let Some(u) = self.users_by_id.get(&user_id) else {
            bail_t!(NotFound, "no user {}", user_id);
        };
        Ok((u.totp_secret.clone(), u.totp_enabled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use base::clock::SimulatedClocks;

    fn test_db() -> testutil::TestDb<SimulatedClocks> {
        testutil::init();
        testutil::TestDb::new(SimulatedClocks::new(time::Timespec::new(1_000_000, 0)))
    }

    #[test]
    fn default_admin_seeded_once() {
        let db = test_db();
        let l = db.db.lock();
        let admin = l.get_user_by_username("admin").expect("admin seeded");
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.has_password());
    }

    #[test]
    fn authenticate_and_failure_count() {
        let db = test_db();
        let mut l = db.db.lock();
        let id = l
            .create_user("operator", Some("hunter2"), Role::User, Time(1_000_000))
            .unwrap();

        assert_eq!(
            l.authenticate("operator", "wrong").unwrap_err().kind(),
            ErrorKind::Unauthenticated
        );
        assert_eq!(
            l.get_user_by_username("operator")
                .unwrap()
                .password_failure_count,
            1
        );

        assert_eq!(l.authenticate("operator", "hunter2").unwrap(), id);
        assert_eq!(
            l.authenticate("nobody", "hunter2").unwrap_err().kind(),
            ErrorKind::Unauthenticated
        );

        l.change_password("operator", "correct horse").unwrap();
        assert_eq!(
            l.authenticate("operator", "hunter2").unwrap_err().kind(),
            ErrorKind::Unauthenticated
        );
        l.authenticate("operator", "correct horse").unwrap();
        assert_eq!(
            l.get_user_by_username("operator")
                .unwrap()
                .password_failure_count,
            0
        );
    }

    #[test]
    fn duplicate_username_conflicts() {
        let db = test_db();
        let mut l = db.db.lock();
        l.create_user("u", None, Role::Viewer, Time(0)).unwrap();
        assert_eq!(
            l.create_user("u", None, Role::Viewer, Time(0))
                .unwrap_err()
                .kind(),
            ErrorKind::AlreadyExists
        );
    }

    #[test]
    fn session_lifecycle() {
        let db = test_db();
        let mut l = db.db.lock();
        let uid = l
            .create_user("operator", Some("pw"), Role::User, Time(1_000_000))
            .unwrap();
        let sid = l
            .create_session(uid, None, Some("test-agent"), 3600, Time(1_000_000))
            .unwrap();
        let token = sid.encode_base64();

        assert_eq!(l.validate_session(&token, Time(1_000_100)).unwrap(), uid);

        // Expired session.
        assert_eq!(
            l.validate_session(&token, Time(1_003_600))
                .unwrap_err()
                .kind(),
            ErrorKind::Unauthenticated
        );

        // Garbage token.
        assert_eq!(
            l.validate_session("!!!", Time(1_000_100)).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );

        l.delete_session(&token).unwrap();
        assert_eq!(
            l.delete_session(&token).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn cleanup_drops_only_expired() {
        let db = test_db();
        let mut l = db.db.lock();
        let uid = l
            .create_user("operator", Some("pw"), Role::User, Time(0))
            .unwrap();
        let fresh = l.create_session(uid, None, None, 10_000, Time(0)).unwrap();
        let _stale = l.create_session(uid, None, None, 10, Time(0)).unwrap();
        assert_eq!(l.cleanup_sessions(Time(5000)).unwrap(), 1);
        l.validate_session(&fresh.encode_base64(), Time(5000)).unwrap();
    }

    #[test]
    fn api_key_round_trip() {
        let db = test_db();
        let mut l = db.db.lock();
        let uid = l.create_user("robot", None, Role::Api, Time(0)).unwrap();
        let key = l.generate_api_key(uid).unwrap();
        assert_eq!(key.len(), 64);
        assert_eq!(l.get_user_by_api_key(&key).unwrap().id, uid);
        assert!(l.get_user_by_api_key("bogus").is_none());
    }

    #[test]
    fn totp_round_trip() {
        let db = test_db();
        let mut l = db.db.lock();
        let uid = l.create_user("operator", None, Role::User, Time(0)).unwrap();

        // Enabling without a secret is a precondition failure.
        assert_eq!(
            l.enable_totp(uid, true).unwrap_err().kind(),
            ErrorKind::FailedPrecondition
        );

        l.set_totp_secret(uid, "JBSWY3DPEHPK3PXP").unwrap();
        l.enable_totp(uid, true).unwrap();
        assert_eq!(
            l.get_totp_info(uid).unwrap(),
            (Some("JBSWY3DPEHPK3PXP".to_owned()), true)
        );
    }

    #[test]
    fn role_name_mapping() {
        for (role, name) in [
            (Role::Admin, "admin"),
            (Role::User, "user"),
            (Role::Viewer, "viewer"),
            (Role::Api, "api"),
        ] {
            assert_eq!(role.as_str(), name);
            assert_eq!(Role::parse(name), Some(role));
        }
        assert_eq!(Role::parse("root"), None);
    }
}
