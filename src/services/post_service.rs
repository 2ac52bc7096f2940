// src/services/post_service.rs

use std::sync::Arc;

use crate::auth::{roles, PermissionChecker, RequestContext};
use crate::error::{AppError, AppResult};
use crate::metrics::record_version_conflict;
use crate::models::{
    Comment, CommentRequest, CreatePostRequest, NewPost, Post, UpdatePostRequest,
};
use crate::storage::{CommentStore, PostStore};

/// 帖子服务
///
/// 修改走乐观并发：以客户端看到的 version 为条件更新，冲突直接返回给调用方，
/// 不做自动重试。
#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostStore>,
    permissions: PermissionChecker,
}

impl PostService {
    pub fn new(posts: Arc<dyn PostStore>, permissions: PermissionChecker) -> Self {
        Self { posts, permissions }
    }

    pub async fn create(&self, ctx: &RequestContext, req: CreatePostRequest) -> AppResult<Post> {
        let post = self
            .posts
            .create(&NewPost {
                user_id: ctx.principal.id,
                title: req.title,
                content: req.content,
                tags: req.tags,
            })
            .await?;

        tracing::debug!(post_id = post.id, user_id = ctx.principal.id, "Post created");
        Ok(post)
    }

    pub async fn get(&self, id: i64) -> AppResult<Post> {
        self.posts
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("post not found".to_string()))
    }

    /// 所有者或 moderator 可以修改
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: i64,
        req: UpdatePostRequest,
    ) -> AppResult<Post> {
        let mut post = self.get(id).await?;
        self.permissions
            .authorize(&ctx.principal, post.user_id, roles::MODERATOR)
            .await?;

        let expected = req.version.unwrap_or(post.version);
        if let Some(title) = req.title {
            post.title = title;
        }
        if let Some(content) = req.content {
            post.content = content;
        }

        match self.posts.update(&post, expected).await {
            Ok(version) => {
                post.version = version;
                Ok(post)
            }
            Err(e @ AppError::VersionConflict { .. }) => {
                tracing::warn!(post_id = id, user_id = ctx.principal.id, error = %e, "Post update lost a version race");
                record_version_conflict("post");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// 所有者或 admin 可以删除
    pub async fn delete(&self, ctx: &RequestContext, id: i64) -> AppResult<()> {
        let post = self.get(id).await?;
        self.permissions
            .authorize(&ctx.principal, post.user_id, roles::ADMIN)
            .await?;
        self.posts.delete(id).await
    }
}

/// 评论服务
#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn CommentStore>,
    posts: Arc<dyn PostStore>,
    permissions: PermissionChecker,
}

impl CommentService {
    pub fn new(
        comments: Arc<dyn CommentStore>,
        posts: Arc<dyn PostStore>,
        permissions: PermissionChecker,
    ) -> Self {
        Self {
            comments,
            posts,
            permissions,
        }
    }

    pub async fn create(
        &self,
        ctx: &RequestContext,
        post_id: i64,
        req: CommentRequest,
    ) -> AppResult<Comment> {
        if self.posts.get_by_id(post_id).await?.is_none() {
            return Err(AppError::NotFound("post not found".to_string()));
        }
        self.comments
            .create(post_id, ctx.principal.id, &req.content)
            .await
    }

    pub async fn get(&self, id: i64) -> AppResult<Comment> {
        self.comments
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("comment not found".to_string()))
    }

    pub async fn list_by_post(&self, post_id: i64) -> AppResult<Vec<Comment>> {
        self.comments.list_by_post(post_id).await
    }

    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: i64,
        req: CommentRequest,
    ) -> AppResult<Comment> {
        let comment = self.get(id).await?;
        self.permissions
            .authorize(&ctx.principal, comment.user_id, roles::MODERATOR)
            .await?;
        self.comments.update(id, &req.content).await
    }

    pub async fn delete(&self, ctx: &RequestContext, id: i64) -> AppResult<()> {
        let comment = self.get(id).await?;
        self.permissions
            .authorize(&ctx.principal, comment.user_id, roles::ADMIN)
            .await?;
        self.comments.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::TestServices;

    fn create_req(title: &str) -> CreatePostRequest {
        CreatePostRequest {
            title: title.to_string(),
            content: "body".to_string(),
            tags: vec!["rust".to_string()],
        }
    }

    fn edit(title: &str, version: Option<i64>) -> UpdatePostRequest {
        UpdatePostRequest {
            title: Some(title.to_string()),
            content: None,
            version,
        }
    }

    #[tokio::test]
    async fn test_owner_updates_and_version_advances() {
        let t = TestServices::new().await;
        let owner = t.context("alice", roles::USER).await;
        let posts = &t.services.posts;

        let post = posts.create(&owner, create_req("v0")).await.unwrap();
        assert_eq!(post.version, 0);

        let updated = posts.update(&owner, post.id, edit("v1", Some(0))).await.unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.title, "v1");

        // 不带 version 时以本次加载到的版本为准
        let updated = posts.update(&owner, post.id, edit("v2", None)).await.unwrap();
        assert_eq!(updated.version, 2);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let t = TestServices::new().await;
        let owner = t.context("bob", roles::USER).await;
        let posts = &t.services.posts;

        let post = posts.create(&owner, create_req("v0")).await.unwrap();
        for i in 0..3 {
            posts
                .update(&owner, post.id, edit(&format!("v{}", i + 1), Some(i)))
                .await
                .unwrap();
        }

        let won = posts.update(&owner, post.id, edit("A", Some(3))).await.unwrap();
        assert_eq!(won.version, 4);

        let lost = posts.update(&owner, post.id, edit("B", Some(3))).await;
        assert!(matches!(
            lost,
            Err(AppError::VersionConflict { expected: 3, actual: Some(4) })
        ));

        // 失败的一方不会覆盖已提交的内容
        assert_eq!(posts.get(post.id).await.unwrap().title, "A");
    }

    #[tokio::test]
    async fn test_role_gates_for_other_users_posts() {
        let t = TestServices::new().await;
        let owner = t.context("carol", roles::USER).await;
        let stranger = t.context("dave", roles::USER).await;
        let moderator = t.context("erin", roles::MODERATOR).await;
        let admin = t.context("frank", roles::ADMIN).await;
        let posts = &t.services.posts;

        let post = posts.create(&owner, create_req("mine")).await.unwrap();

        assert!(matches!(
            posts.update(&stranger, post.id, edit("x", None)).await,
            Err(AppError::Forbidden)
        ));
        assert!(posts.update(&moderator, post.id, edit("moderated", None)).await.is_ok());

        // moderator 不能删除别人的帖子，admin 可以
        assert!(matches!(
            posts.delete(&moderator, post.id).await,
            Err(AppError::Forbidden)
        ));
        posts.delete(&admin, post.id).await.unwrap();
        assert!(matches!(posts.get(post.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_comment_permissions() {
        let t = TestServices::new().await;
        let owner = t.context("gina", roles::USER).await;
        let stranger = t.context("hank", roles::USER).await;
        let moderator = t.context("ivy", roles::MODERATOR).await;
        let comments = &t.services.comments;

        let post = t.services.posts.create(&owner, create_req("p")).await.unwrap();
        let comment = comments
            .create(&owner, post.id, CommentRequest { content: "hi".to_string() })
            .await
            .unwrap();

        let edit = || CommentRequest { content: "edited".to_string() };
        assert!(matches!(
            comments.update(&stranger, comment.id, edit()).await,
            Err(AppError::Forbidden)
        ));
        assert_eq!(
            comments.update(&moderator, comment.id, edit()).await.unwrap().content,
            "edited"
        );

        assert!(matches!(
            comments.delete(&moderator, comment.id).await,
            Err(AppError::Forbidden)
        ));
        comments.delete(&owner, comment.id).await.unwrap();

        assert!(matches!(
            comments
                .create(&owner, 9999, CommentRequest { content: "x".to_string() })
                .await,
            Err(AppError::NotFound(_))
        ));
    }
}
