// src/models/post.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Comment;

/// 帖子：带版本号的资源，每次成功修改 version 恰好加 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Post (数据库行)，tags 以 JSON 文本存储
#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub tags: String,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            content: row.content,
            tags: serde_json::from_str(&row.tags).unwrap_or_default(),
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    /// 客户端读取时看到的版本；缺省时使用本次请求加载到的版本
    pub version: Option<i64>,
}

/// Feed 中的帖子，附带作者名、评论数和评论
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    #[serde(flatten)]
    pub post: Post,
    pub username: String,
    pub comments_count: i64,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, FromRow)]
pub struct FeedRow {
    #[sqlx(flatten)]
    pub post: PostRow,
    pub username: String,
    pub comments_count: i64,
}

impl From<FeedRow> for FeedItem {
    fn from(row: FeedRow) -> Self {
        Self {
            post: row.post.into(),
            username: row.username,
            comments_count: row.comments_count,
            comments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// 分页查询参数
#[derive(Debug, Clone, Deserialize)]
pub struct FeedQuery {
    #[serde(default = "FeedQuery::default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "FeedQuery::default_sort")]
    pub sort: SortOrder,
    #[serde(default)]
    pub search: String,
}

impl FeedQuery {
    fn default_limit() -> i64 {
        20
    }

    fn default_sort() -> SortOrder {
        SortOrder::Desc
    }
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            limit: Self::default_limit(),
            offset: 0,
            sort: Self::default_sort(),
            search: String::new(),
        }
    }
}
