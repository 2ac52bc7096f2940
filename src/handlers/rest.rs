// src/handlers/rest.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::RequestContext;
use crate::error::AppResult;
use crate::models::*;
use crate::services::{ServiceContainer, Validator};

// ==================== 应用状态 ====================

#[derive(Clone)]
pub struct AppState {
    pub services: ServiceContainer,
    pub validator: Arc<Validator>,
}

/// 成功响应统一包在 `data` 字段里
#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub data: T,
}

fn data<T>(value: T) -> Json<Data<T>> {
    Json(Data { data: value })
}

#[derive(Debug, Serialize)]
pub struct PostWithComments {
    #[serde(flatten)]
    pub post: Post,
    pub comments: Vec<Comment>,
}

// ==================== 认证相关 ====================

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterUserRequest>,
) -> AppResult<(StatusCode, Json<Data<UserWithToken>>)> {
    state.validator.registration(&req)?;
    let registered = state.services.auth.register(req).await?;
    Ok((StatusCode::CREATED, data(registered)))
}

pub async fn create_token(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<(StatusCode, Json<Data<TokenResponse>>)> {
    state.validator.login(&req)?;
    let token = state.services.auth.login(req).await?;
    Ok((StatusCode::CREATED, data(TokenResponse { token })))
}

pub async fn activate_user(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<StatusCode> {
    state.services.auth.activate(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== 用户相关 ====================

pub async fn get_current_user(ctx: RequestContext) -> Json<Data<User>> {
    data(ctx.principal)
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<Data<User>>> {
    Ok(data(state.services.users.get(user_id).await?))
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<Data<Vec<User>>>> {
    state.validator.feed(&query)?;
    Ok(data(state.services.users.list(&query).await?))
}

pub async fn follow_user(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<StatusCode> {
    state.services.users.follow(&ctx, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unfollow_user(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<StatusCode> {
    state.services.users.unfollow(&ctx, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn followed_users(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> AppResult<Json<Data<Vec<FollowedUser>>>> {
    Ok(data(state.services.users.followed(&ctx).await?))
}

pub async fn get_feed(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<Data<Vec<FeedItem>>>> {
    state.validator.feed(&query)?;
    Ok(data(state.services.users.feed(&ctx, &query).await?))
}

pub async fn get_user_posts(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<Data<Vec<FeedItem>>>> {
    state.validator.feed(&query)?;
    Ok(data(state.services.users.posts(user_id, &query).await?))
}

pub async fn update_user_role(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(req): Json<UpdateRoleRequest>,
) -> AppResult<Json<Data<User>>> {
    let user = state
        .services
        .users
        .set_role(&ctx, user_id, &req.role)
        .await?;
    Ok(data(user))
}

pub async fn delete_user(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<StatusCode> {
    state.services.users.delete(&ctx, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== 帖子相关 ====================

pub async fn create_post(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<Data<Post>>)> {
    state.validator.new_post(&req)?;
    let post = state.services.posts.create(&ctx, req).await?;
    Ok((StatusCode::CREATED, data(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> AppResult<Json<Data<PostWithComments>>> {
    let post = state.services.posts.get(post_id).await?;
    let comments = state.services.comments.list_by_post(post_id).await?;
    Ok(data(PostWithComments { post, comments }))
}

pub async fn update_post(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Json(req): Json<UpdatePostRequest>,
) -> AppResult<Json<Data<Post>>> {
    state.validator.post_update(&req)?;
    Ok(data(state.services.posts.update(&ctx, post_id, req).await?))
}

pub async fn delete_post(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> AppResult<StatusCode> {
    state.services.posts.delete(&ctx, post_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== 评论相关 ====================

pub async fn create_comment(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Json(req): Json<CommentRequest>,
) -> AppResult<(StatusCode, Json<Data<Comment>>)> {
    state.validator.comment(&req)?;
    let comment = state.services.comments.create(&ctx, post_id, req).await?;
    Ok((StatusCode::CREATED, data(comment)))
}

pub async fn get_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
) -> AppResult<Json<Data<Comment>>> {
    Ok(data(state.services.comments.get(comment_id).await?))
}

pub async fn update_comment(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
    Json(req): Json<CommentRequest>,
) -> AppResult<Json<Data<Comment>>> {
    state.validator.comment(&req)?;
    Ok(data(
        state.services.comments.update(&ctx, comment_id, req).await?,
    ))
}

pub async fn delete_comment(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
) -> AppResult<StatusCode> {
    state.services.comments.delete(&ctx, comment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
