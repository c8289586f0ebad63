#![allow(dead_code)]

use std::path::PathBuf;

use rusqlite::{Connection, params};
use tempfile::TempDir;

use activity_attribution::{Database, Settings};

pub const TOKEN: &str = "5f1c0c9e2b7d4a3f8e6b1d0c9a8f7e6d5c4b3a29";

const PLATFORM_DDL: &str = "
    CREATE TABLE user (id INTEGER PRIMARY KEY, user_name TEXT, email TEXT);
    CREATE TABLE badge (id INTEGER PRIMARY KEY, title TEXT NOT NULL);
    CREATE TABLE user_badges (user_id INTEGER NOT NULL, badge_id INTEGER NOT NULL);
    CREATE TABLE comment (
        id INTEGER PRIMARY KEY, creator_id INTEGER NOT NULL,
        create_time TEXT NOT NULL, delete_time TEXT
    );
    CREATE TABLE delegateable (
        id INTEGER PRIMARY KEY, creator_id INTEGER NOT NULL, type TEXT NOT NULL,
        create_time TEXT NOT NULL, delete_time TEXT
    );
    CREATE TABLE vote (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL, create_time TEXT NOT NULL);
    CREATE TABLE requestlog (
        id INTEGER PRIMARY KEY, access_time TEXT, ip_address TEXT, request_url TEXT,
        cookies TEXT, user_agent TEXT, referer TEXT
    );
";

/// Platform database in a throwaway directory.
pub struct Platform {
    _dir: TempDir,
    pub path: PathBuf,
    pub conn: Connection,
}

impl Platform {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platform.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(PLATFORM_DDL).unwrap();
        Self {
            _dir: dir,
            path,
            conn,
        }
    }

    pub fn dsn(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    pub fn database(&self) -> Database {
        Database::from_descriptor(&self.dsn()).unwrap()
    }

    pub fn settings(&self) -> Settings {
        Settings::new(self.dsn())
    }

    pub fn user(&self, id: i64, name: &str, email: &str) -> &Self {
        self.conn
            .execute(
                "INSERT INTO user (id, user_name, email) VALUES (?1, ?2, ?3)",
                params![id, name, email],
            )
            .unwrap();
        self
    }

    pub fn badge(&self, id: i64, title: &str) -> &Self {
        self.conn
            .execute("INSERT INTO badge (id, title) VALUES (?1, ?2)", params![id, title])
            .unwrap();
        self
    }

    pub fn grant(&self, user_id: i64, badge_id: i64) -> &Self {
        self.conn
            .execute(
                "INSERT INTO user_badges (user_id, badge_id) VALUES (?1, ?2)",
                params![user_id, badge_id],
            )
            .unwrap();
        self
    }

    pub fn comment(&self, creator: i64, time: &str, deleted: bool) -> &Self {
        self.conn
            .execute(
                "INSERT INTO comment (creator_id, create_time, delete_time) VALUES (?1, ?2, ?3)",
                params![creator, time, deleted.then_some(time)],
            )
            .unwrap();
        self
    }

    pub fn delegateable(&self, creator: i64, kind: &str, time: &str, deleted: bool) -> &Self {
        self.conn
            .execute(
                "INSERT INTO delegateable (creator_id, type, create_time, delete_time) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![creator, kind, time, deleted.then_some(time)],
            )
            .unwrap();
        self
    }

    pub fn vote(&self, user_id: i64, time: &str) -> &Self {
        self.conn
            .execute(
                "INSERT INTO vote (user_id, create_time) VALUES (?1, ?2)",
                params![user_id, time],
            )
            .unwrap();
        self
    }

    pub fn request(
        &self,
        id: i64,
        time: &str,
        path: Option<&str>,
        cookies: Option<&str>,
        user_agent: Option<&str>,
    ) -> &Self {
        self.conn
            .execute(
                "INSERT INTO requestlog \
                 (id, access_time, ip_address, request_url, cookies, user_agent, referer) \
                 VALUES (?1, ?2, '10.0.0.1', ?3, ?4, ?5, NULL)",
                params![id, time, path, cookies, user_agent],
            )
            .unwrap();
        self
    }

    /// Request from a regular browser with only a path.
    pub fn visit(&self, id: i64, time: &str, path: &str) -> &Self {
        self.request(id, time, Some(path), None, Some(BROWSER))
    }

    pub fn attributions(&self, table: &str) -> Vec<(i64, i64)> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT request_id, user_id FROM \"{table}\" ORDER BY request_id"
            ))
            .unwrap();
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        rows
    }

    pub fn table_ddl(&self, table: &str) -> Option<String> {
        self.conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .ok()
    }
}

pub const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:29.0) Gecko/20100101 Firefox/29.0";

pub fn login_cookie(name: &str) -> String {
    format!("lang=de; adhocracy_login=\"{TOKEN}{name}!userid_type:int\"")
}
