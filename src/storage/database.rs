// src/storage/database.rs

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use crate::models::*;

use super::{with_timeout, CommentStore, FollowerStore, PostStore, RoleStore, UserStore};

const USER_COLUMNS: &str = r#"
    u.id, u.username, u.email, u.password_hash, u.is_active, u.created_at,
    r.id AS role_id, r.name AS role_name, r.level AS role_level, r.description AS role_description
"#;

const POST_COLUMNS: &str =
    "p.id, p.user_id, p.title, p.content, p.tags, p.version, p.created_at, p.updated_at";

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// 唯一约束冲突转换为 409，其余原样返回
fn map_unique_violation(e: sqlx::Error, conflict: impl FnOnce(&str) -> String) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return AppError::Conflict(conflict(db_err.message()));
        }
    }
    AppError::DatabaseError(e)
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> AppResult<Self> {
        // 确保数据库目录存在
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    AppError::InternalError(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        // 外键和 WAL 需要在每个连接上开启，放在连接参数里
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.query_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.query_timeout())
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            query_timeout: config.query_timeout(),
        })
    }

    pub async fn run_migrations(&self) -> AppResult<()> {
        self.create_tables().await?;
        self.seed_roles().await?;
        Ok(())
    }

    async fn create_tables(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS roles (
                id INTEGER PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                level INTEGER NOT NULL DEFAULT 0,
                description TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 0,
                role_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (role_id) REFERENCES roles(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_invitations (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expiry INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                version INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS followers (
                user_id INTEGER NOT NULL,
                follower_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, follower_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (follower_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // 创建索引
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_user ON posts(user_id, created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_followers_follower ON followers(follower_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn seed_roles(&self) -> AppResult<()> {
        let roles = [
            (1, "user", 1, "A user can create posts and comments"),
            (2, "moderator", 2, "A moderator can update other users posts"),
            (3, "admin", 3, "An admin can update and delete other users posts"),
        ];

        for (id, name, level, description) in roles {
            sqlx::query(
                "INSERT OR IGNORE INTO roles (id, name, level, description) VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(name)
            .bind(level)
            .bind(description)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn fetch_role(&self, name: &str) -> AppResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, name, level, description FROM roles WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    async fn fetch_post(&self, id: i64) -> AppResult<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {} FROM posts p WHERE p.id = ?",
            POST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Post::from))
    }

    /// 一次查询取回这一页帖子的全部评论，按帖子分组挂上去
    async fn attach_comments(&self, rows: Vec<FeedRow>) -> AppResult<Vec<FeedItem>> {
        let mut items: Vec<FeedItem> = rows.into_iter().map(FeedItem::from).collect();
        if items.is_empty() {
            return Ok(items);
        }

        let placeholders = vec!["?"; items.len()].join(", ");
        let sql = format!(
            "SELECT id, post_id, user_id, content, created_at FROM comments \
             WHERE post_id IN ({}) ORDER BY created_at DESC, id DESC",
            placeholders
        );
        let mut query = sqlx::query_as::<_, Comment>(&sql);
        for item in &items {
            query = query.bind(item.post.id);
        }
        let comments = query.fetch_all(&self.pool).await?;

        let mut by_post: HashMap<i64, Vec<Comment>> = HashMap::new();
        for comment in comments {
            by_post.entry(comment.post_id).or_default().push(comment);
        }
        for item in &mut items {
            item.comments = by_post.remove(&item.post.id).unwrap_or_default();
        }
        Ok(items)
    }

    async fn fetch_comment(&self, id: i64) -> AppResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(
            "SELECT id, post_id, user_id, content, created_at FROM comments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(comment)
    }
}

// ==================== 用户操作 ====================

#[async_trait]
impl UserStore for Database {
    async fn create_and_invite(
        &self,
        user: &NewUser,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<User> {
        with_timeout(self.query_timeout, async {
            let mut tx = self.pool.begin().await?;

            let role = sqlx::query_as::<_, Role>(
                "SELECT id, name, level, description FROM roles WHERE name = ?",
            )
            .bind(&user.role_name)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::RoleNotFound(user.role_name.clone()))?;

            let created_at = now();
            let id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO users (username, email, password_hash, is_active, role_id, created_at)
                VALUES (?, ?, ?, 0, ?, ?)
                RETURNING id
                "#,
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(user.password.as_hash())
            .bind(role.id)
            .bind(&created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                map_unique_violation(e, |msg| {
                    if msg.contains("users.email") {
                        "a user with that email already exists".to_string()
                    } else {
                        "a user with that username already exists".to_string()
                    }
                })
            })?;

            sqlx::query("INSERT INTO user_invitations (token, user_id, expiry) VALUES (?, ?, ?)")
                .bind(token_hash)
                .bind(id)
                .bind(expires_at.timestamp())
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            Ok(User {
                id,
                username: user.username.clone(),
                email: user.email.clone(),
                password: user.password.clone(),
                is_active: false,
                role,
                created_at,
            })
        })
        .await
    }

    async fn get_by_id(&self, id: i64) -> AppResult<Option<User>> {
        with_timeout(self.query_timeout, async {
            let row = sqlx::query_as::<_, UserRow>(&format!(
                "SELECT {} FROM users u JOIN roles r ON u.role_id = r.id WHERE u.id = ?",
                USER_COLUMNS
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(User::from))
        })
        .await
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        with_timeout(self.query_timeout, async {
            let row = sqlx::query_as::<_, UserRow>(&format!(
                "SELECT {} FROM users u JOIN roles r ON u.role_id = r.id \
                 WHERE u.email = ? AND u.is_active = 1",
                USER_COLUMNS
            ))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(User::from))
        })
        .await
    }

    async fn list(&self, query: &FeedQuery) -> AppResult<Vec<User>> {
        with_timeout(self.query_timeout, async {
            let sql = format!(
                r#"
                SELECT {columns} FROM users u JOIN roles r ON u.role_id = r.id
                WHERE (u.username LIKE '%' || ? || '%' OR u.email LIKE '%' || ? || '%')
                ORDER BY u.id {sort}
                LIMIT ? OFFSET ?
                "#,
                columns = USER_COLUMNS,
                sort = query.sort.as_sql(),
            );

            let rows = sqlx::query_as::<_, UserRow>(&sql)
                .bind(&query.search)
                .bind(&query.search)
                .bind(query.limit)
                .bind(query.offset)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(User::from).collect())
        })
        .await
    }

    async fn activate(&self, token_hash: &str) -> AppResult<i64> {
        with_timeout(self.query_timeout, async {
            let mut tx = self.pool.begin().await?;

            let user_id = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT u.id FROM users u
                JOIN user_invitations ui ON u.id = ui.user_id
                WHERE ui.token = ? AND ui.expiry > ?
                "#,
            )
            .bind(token_hash)
            .bind(Utc::now().timestamp())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("invitation not found".to_string()))?;

            sqlx::query("UPDATE users SET is_active = 1 WHERE id = ?")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query("DELETE FROM user_invitations WHERE user_id = ?")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(user_id)
        })
        .await
    }

    async fn set_role(&self, id: i64, role_name: &str) -> AppResult<()> {
        with_timeout(self.query_timeout, async {
            let role = self
                .fetch_role(role_name)
                .await?
                .ok_or_else(|| AppError::RoleNotFound(role_name.to_string()))?;

            let result = sqlx::query("UPDATE users SET role_id = ? WHERE id = ?")
                .bind(role.id)
                .bind(id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(AppError::NotFound("user not found".to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: i64) -> AppResult<()> {
        with_timeout(self.query_timeout, async {
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM user_invitations WHERE user_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            let result = sqlx::query("DELETE FROM users WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            if result.rows_affected() == 0 {
                return Err(AppError::NotFound("user not found".to_string()));
            }

            tx.commit().await?;
            Ok(())
        })
        .await
    }
}

// ==================== 角色操作 ====================

#[async_trait]
impl RoleStore for Database {
    async fn get_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        with_timeout(self.query_timeout, self.fetch_role(name)).await
    }
}

// ==================== 帖子操作 ====================

#[async_trait]
impl PostStore for Database {
    async fn create(&self, post: &NewPost) -> AppResult<Post> {
        with_timeout(self.query_timeout, async {
            let tags = serde_json::to_string(&post.tags)
                .map_err(|e| AppError::InternalError(format!("Failed to encode tags: {}", e)))?;
            let created_at = now();

            let id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO posts (user_id, title, content, tags, version, created_at, updated_at)
                VALUES (?, ?, ?, ?, 0, ?, ?)
                RETURNING id
                "#,
            )
            .bind(post.user_id)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&tags)
            .bind(&created_at)
            .bind(&created_at)
            .fetch_one(&self.pool)
            .await?;

            Ok(Post {
                id,
                user_id: post.user_id,
                title: post.title.clone(),
                content: post.content.clone(),
                tags: post.tags.clone(),
                version: 0,
                created_at: created_at.clone(),
                updated_at: created_at,
            })
        })
        .await
    }

    async fn get_by_id(&self, id: i64) -> AppResult<Option<Post>> {
        with_timeout(self.query_timeout, self.fetch_post(id)).await
    }

    async fn update(&self, post: &Post, expected_version: i64) -> AppResult<i64> {
        with_timeout(self.query_timeout, async {
            let tags = serde_json::to_string(&post.tags)
                .map_err(|e| AppError::InternalError(format!("Failed to encode tags: {}", e)))?;

            let new_version = sqlx::query_scalar::<_, i64>(
                r#"
                UPDATE posts
                SET title = ?, content = ?, tags = ?, version = version + 1, updated_at = ?
                WHERE id = ? AND version = ?
                RETURNING version
                "#,
            )
            .bind(&post.title)
            .bind(&post.content)
            .bind(&tags)
            .bind(now())
            .bind(post.id)
            .bind(expected_version)
            .fetch_optional(&self.pool)
            .await?;

            match new_version {
                Some(version) => Ok(version),
                None => {
                    // 没有行被更新：版本不匹配或记录已删除
                    let actual = sqlx::query_scalar::<_, i64>("SELECT version FROM posts WHERE id = ?")
                        .bind(post.id)
                        .fetch_optional(&self.pool)
                        .await?;
                    Err(AppError::VersionConflict {
                        expected: expected_version,
                        actual,
                    })
                }
            }
        })
        .await
    }

    async fn delete(&self, id: i64) -> AppResult<()> {
        with_timeout(self.query_timeout, async {
            let result = sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(AppError::NotFound("post not found".to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn feed(&self, user_id: i64, query: &FeedQuery) -> AppResult<Vec<FeedItem>> {
        with_timeout(self.query_timeout, async {
            // 自己的帖子 + 关注用户的帖子
            let sql = format!(
                r#"
                SELECT {columns}, u.username, COUNT(c.id) AS comments_count
                FROM posts p
                JOIN users u ON p.user_id = u.id
                LEFT JOIN comments c ON c.post_id = p.id
                WHERE (p.user_id = ? OR p.user_id IN (SELECT user_id FROM followers WHERE follower_id = ?))
                  AND (p.title LIKE '%' || ? || '%' OR p.content LIKE '%' || ? || '%')
                GROUP BY p.id
                ORDER BY p.created_at {sort}, p.id {sort}
                LIMIT ? OFFSET ?
                "#,
                columns = POST_COLUMNS,
                sort = query.sort.as_sql(),
            );

            let rows = sqlx::query_as::<_, FeedRow>(&sql)
                .bind(user_id)
                .bind(user_id)
                .bind(&query.search)
                .bind(&query.search)
                .bind(query.limit)
                .bind(query.offset)
                .fetch_all(&self.pool)
                .await?;

            self.attach_comments(rows).await
        })
        .await
    }

    async fn list_by_user(&self, user_id: i64, query: &FeedQuery) -> AppResult<Vec<FeedItem>> {
        with_timeout(self.query_timeout, async {
            let sql = format!(
                r#"
                SELECT {columns}, u.username, COUNT(c.id) AS comments_count
                FROM posts p
                JOIN users u ON p.user_id = u.id
                LEFT JOIN comments c ON c.post_id = p.id
                WHERE p.user_id = ?
                GROUP BY p.id
                ORDER BY p.created_at {sort}, p.id {sort}
                LIMIT ? OFFSET ?
                "#,
                columns = POST_COLUMNS,
                sort = query.sort.as_sql(),
            );

            let rows = sqlx::query_as::<_, FeedRow>(&sql)
                .bind(user_id)
                .bind(query.limit)
                .bind(query.offset)
                .fetch_all(&self.pool)
                .await?;

            self.attach_comments(rows).await
        })
        .await
    }
}

// ==================== 评论操作 ====================

#[async_trait]
impl CommentStore for Database {
    async fn create(&self, post_id: i64, user_id: i64, content: &str) -> AppResult<Comment> {
        with_timeout(self.query_timeout, async {
            let created_at = now();
            let id = sqlx::query_scalar::<_, i64>(
                "INSERT INTO comments (post_id, user_id, content, created_at) VALUES (?, ?, ?, ?) RETURNING id",
            )
            .bind(post_id)
            .bind(user_id)
            .bind(content)
            .bind(&created_at)
            .fetch_one(&self.pool)
            .await?;

            Ok(Comment {
                id,
                post_id,
                user_id,
                content: content.to_string(),
                created_at,
            })
        })
        .await
    }

    async fn get_by_id(&self, id: i64) -> AppResult<Option<Comment>> {
        with_timeout(self.query_timeout, self.fetch_comment(id)).await
    }

    async fn update(&self, id: i64, content: &str) -> AppResult<Comment> {
        with_timeout(self.query_timeout, async {
            let result = sqlx::query("UPDATE comments SET content = ? WHERE id = ?")
                .bind(content)
                .bind(id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(AppError::NotFound("comment not found".to_string()));
            }

            self.fetch_comment(id)
                .await?
                .ok_or_else(|| AppError::NotFound("comment not found".to_string()))
        })
        .await
    }

    async fn delete(&self, id: i64) -> AppResult<()> {
        with_timeout(self.query_timeout, async {
            let result = sqlx::query("DELETE FROM comments WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(AppError::NotFound("comment not found".to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn list_by_post(&self, post_id: i64) -> AppResult<Vec<Comment>> {
        with_timeout(self.query_timeout, async {
            let comments = sqlx::query_as::<_, Comment>(
                "SELECT id, post_id, user_id, content, created_at FROM comments \
                 WHERE post_id = ? ORDER BY created_at DESC, id DESC",
            )
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(comments)
        })
        .await
    }
}

// ==================== 关注操作 ====================

#[async_trait]
impl FollowerStore for Database {
    async fn follow(&self, follower_id: i64, user_id: i64) -> AppResult<()> {
        with_timeout(self.query_timeout, async {
            sqlx::query("INSERT INTO followers (user_id, follower_id, created_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(follower_id)
                .bind(now())
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    if let sqlx::Error::Database(db_err) = &e {
                        if db_err.is_foreign_key_violation() {
                            return AppError::NotFound("user not found".to_string());
                        }
                    }
                    map_unique_violation(e, |_| "already following this user".to_string())
                })?;
            Ok(())
        })
        .await
    }

    async fn unfollow(&self, follower_id: i64, user_id: i64) -> AppResult<()> {
        with_timeout(self.query_timeout, async {
            sqlx::query("DELETE FROM followers WHERE user_id = ? AND follower_id = ?")
                .bind(user_id)
                .bind(follower_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn followed_users(&self, follower_id: i64) -> AppResult<Vec<FollowedUser>> {
        with_timeout(self.query_timeout, async {
            let users = sqlx::query_as::<_, FollowedUser>(
                r#"
                SELECT u.id AS user_id, u.email, u.username, u.created_at
                FROM users u
                WHERE u.id IN (SELECT user_id FROM followers WHERE follower_id = ?)
                ORDER BY u.id
                "#,
            )
            .bind(follower_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(users)
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::Password;
    use tempfile::TempDir;

    /// 测试数据库；返回的 TempDir 需要保持存活
    pub(crate) async fn create_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let config = DatabaseConfig {
            path: db_path.to_string_lossy().to_string(),
            max_connections: 4,
            query_timeout_secs: 5,
        };

        let db = Database::new(&config).await.unwrap();
        db.run_migrations().await.unwrap();
        (db, temp_dir)
    }

    pub(crate) async fn create_active_user(db: &Database, name: &str, role: &str) -> User {
        let new_user = NewUser {
            username: name.to_string(),
            email: format!("{}@test.com", name),
            password: Password::hash("password123", 4).unwrap(),
            role_name: role.to_string(),
        };
        let token_hash = format!("hash-{}", name);
        let user = db
            .create_and_invite(&new_user, &token_hash, Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        db.activate(&token_hash).await.unwrap();
        UserStore::get_by_id(db, user.id).await.unwrap().unwrap()
    }

    fn new_post(user_id: i64) -> NewPost {
        NewPost {
            user_id,
            title: "Hello".to_string(),
            content: "First post".to_string(),
            tags: vec!["intro".to_string()],
        }
    }

    #[tokio::test]
    async fn test_roles_seeded() {
        let (db, _dir) = create_test_db().await;

        let admin = db.get_by_name("admin").await.unwrap().unwrap();
        let moderator = db.get_by_name("moderator").await.unwrap().unwrap();
        let user = db.get_by_name("user").await.unwrap().unwrap();
        assert!(admin.level > moderator.level);
        assert!(moderator.level > user.level);

        assert!(db.get_by_name("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_and_activate_user() {
        let (db, _dir) = create_test_db().await;

        let new_user = NewUser {
            username: "alice".to_string(),
            email: "alice@test.com".to_string(),
            password: Password::hash("password123", 4).unwrap(),
            role_name: "user".to_string(),
        };
        let user = db
            .create_and_invite(&new_user, "token-hash", Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(!user.is_active);
        assert_eq!(user.role.name, "user");

        // 未激活用户不能按邮箱查到
        assert!(db.get_by_email("alice@test.com").await.unwrap().is_none());

        assert_eq!(db.activate("token-hash").await.unwrap(), user.id);
        let found = db.get_by_email("alice@test.com").await.unwrap().unwrap();
        assert!(found.is_active);
        assert!(found.password.compare("password123"));

        // 邀请只能使用一次
        assert!(matches!(
            db.activate("token-hash").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_invitation() {
        let (db, _dir) = create_test_db().await;

        let new_user = NewUser {
            username: "late".to_string(),
            email: "late@test.com".to_string(),
            password: Password::hash("password123", 4).unwrap(),
            role_name: "user".to_string(),
        };
        db.create_and_invite(&new_user, "old", Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();

        assert!(matches!(db.activate("old").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let (db, _dir) = create_test_db().await;
        create_active_user(&db, "alice", "user").await;

        let dup = NewUser {
            username: "alice2".to_string(),
            email: "alice@test.com".to_string(),
            password: Password::hash("password123", 4).unwrap(),
            role_name: "user".to_string(),
        };
        let result = db
            .create_and_invite(&dup, "other", Utc::now() + chrono::Duration::hours(1))
            .await;
        assert!(matches!(result, Err(AppError::Conflict(msg)) if msg.contains("email")));
    }

    #[tokio::test]
    async fn test_unknown_role_on_create() {
        let (db, _dir) = create_test_db().await;

        let new_user = NewUser {
            username: "bob".to_string(),
            email: "bob@test.com".to_string(),
            password: Password::hash("password123", 4).unwrap(),
            role_name: "superuser".to_string(),
        };
        let result = db
            .create_and_invite(&new_user, "t", Utc::now() + chrono::Duration::hours(1))
            .await;
        assert!(matches!(result, Err(AppError::RoleNotFound(_))));
    }

    #[tokio::test]
    async fn test_set_role_and_delete() {
        let (db, _dir) = create_test_db().await;
        let user = create_active_user(&db, "carol", "user").await;

        db.set_role(user.id, "moderator").await.unwrap();
        let updated = UserStore::get_by_id(&db, user.id).await.unwrap().unwrap();
        assert_eq!(updated.role.name, "moderator");

        UserStore::delete(&db, user.id).await.unwrap();
        assert!(UserStore::get_by_id(&db, user.id).await.unwrap().is_none());
        assert!(matches!(
            UserStore::delete(&db, user.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_versioned_update() {
        let (db, _dir) = create_test_db().await;
        let user = create_active_user(&db, "dave", "user").await;

        let mut post = PostStore::create(&db, &new_post(user.id)).await.unwrap();
        assert_eq!(post.version, 0);

        post.title = "Edited".to_string();
        let version = PostStore::update(&db, &post, 0).await.unwrap();
        assert_eq!(version, 1);

        // 过期版本被拒绝，并报告当前版本
        let result = PostStore::update(&db, &post, 0).await;
        assert!(matches!(
            result,
            Err(AppError::VersionConflict { expected: 0, actual: Some(1) })
        ));

        let stored = PostStore::get_by_id(&db, post.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Edited");
        assert_eq!(stored.version, 1);
        assert_eq!(stored.tags, vec!["intro".to_string()]);
    }

    #[tokio::test]
    async fn test_update_deleted_post_conflicts() {
        let (db, _dir) = create_test_db().await;
        let user = create_active_user(&db, "erin", "user").await;

        let post = PostStore::create(&db, &new_post(user.id)).await.unwrap();
        PostStore::delete(&db, post.id).await.unwrap();

        let result = PostStore::update(&db, &post, 0).await;
        assert!(matches!(
            result,
            Err(AppError::VersionConflict { expected: 0, actual: None })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_updates_from_same_version() {
        let (db, _dir) = create_test_db().await;
        let user = create_active_user(&db, "frank", "user").await;

        let mut post = PostStore::create(&db, &new_post(user.id)).await.unwrap();
        for _ in 0..3 {
            let v = post.version;
            post.version = PostStore::update(&db, &post, v).await.unwrap();
        }
        assert_eq!(post.version, 3);

        let mut a = post.clone();
        a.title = "A".to_string();
        let mut b = post.clone();
        b.title = "B".to_string();

        let (ra, rb) = tokio::join!(
            PostStore::update(&db, &a, 3),
            PostStore::update(&db, &b, 3)
        );

        let results = [ra, rb];
        let successes: Vec<i64> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().copied())
            .collect();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(AppError::VersionConflict { expected: 3, .. })))
            .count();

        assert_eq!(successes, vec![4]);
        assert_eq!(conflicts, 1);

        // 第三个使用旧版本的更新同样冲突
        let result = PostStore::update(&db, &post, 3).await;
        assert!(matches!(
            result,
            Err(AppError::VersionConflict { expected: 3, actual: Some(4) })
        ));
    }

    #[tokio::test]
    async fn test_feed_includes_followed_users() {
        let (db, _dir) = create_test_db().await;
        let alice = create_active_user(&db, "alice", "user").await;
        let bob = create_active_user(&db, "bob", "user").await;
        let carol = create_active_user(&db, "carol", "user").await;

        PostStore::create(&db, &new_post(alice.id)).await.unwrap();
        let bob_post = PostStore::create(&db, &new_post(bob.id)).await.unwrap();
        PostStore::create(&db, &new_post(carol.id)).await.unwrap();
        CommentStore::create(&db, bob_post.id, alice.id, "nice").await.unwrap();

        db.follow(alice.id, bob.id).await.unwrap();

        let feed = db.feed(alice.id, &FeedQuery::default()).await.unwrap();
        let authors: Vec<i64> = feed.iter().map(|item| item.post.user_id).collect();
        assert_eq!(authors, vec![bob.id, alice.id]);
        assert_eq!(feed[0].comments_count, 1);
        assert_eq!(feed[0].comments.len(), 1);
        assert_eq!(feed[0].comments[0].content, "nice");
        assert_eq!(feed[0].comments[0].user_id, alice.id);
        assert!(feed[1].comments.is_empty());
        assert_eq!(feed[0].username, "bob");

        let followed = db.followed_users(alice.id).await.unwrap();
        assert_eq!(followed.len(), 1);
        assert_eq!(followed[0].user_id, bob.id);
    }

    #[tokio::test]
    async fn test_list_users_with_search() {
        let (db, _dir) = create_test_db().await;
        let alice = create_active_user(&db, "alice", "user").await;
        let bob = create_active_user(&db, "bob", "admin").await;
        create_active_user(&db, "carol", "user").await;

        let all = db.list(&FeedQuery::default()).await.unwrap();
        let names: Vec<&str> = all.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["carol", "bob", "alice"]);

        let query = FeedQuery {
            search: "BOB@".to_string(),
            ..Default::default()
        };
        let found = db.list(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, bob.id);
        assert_eq!(found[0].role.name, "admin");

        let page = FeedQuery {
            limit: 1,
            offset: 2,
            ..Default::default()
        };
        let page = db.list(&page).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, alice.id);
    }

    #[tokio::test]
    async fn test_follow_twice_conflicts() {
        let (db, _dir) = create_test_db().await;
        let alice = create_active_user(&db, "alice", "user").await;
        let bob = create_active_user(&db, "bob", "user").await;

        db.follow(alice.id, bob.id).await.unwrap();
        assert!(matches!(db.follow(alice.id, bob.id).await, Err(AppError::Conflict(_))));
        assert!(matches!(db.follow(alice.id, 9999).await, Err(AppError::NotFound(_))));

        db.unfollow(alice.id, bob.id).await.unwrap();
        assert!(db.followed_users(alice.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_comment_crud() {
        let (db, _dir) = create_test_db().await;
        let user = create_active_user(&db, "gina", "user").await;
        let post = PostStore::create(&db, &new_post(user.id)).await.unwrap();

        let comment = CommentStore::create(&db, post.id, user.id, "first").await.unwrap();
        let updated = CommentStore::update(&db, comment.id, "edited").await.unwrap();
        assert_eq!(updated.content, "edited");

        assert_eq!(db.list_by_post(post.id).await.unwrap().len(), 1);

        CommentStore::delete(&db, comment.id).await.unwrap();
        assert!(CommentStore::get_by_id(&db, comment.id).await.unwrap().is_none());
    }
}
