// src/models/mod.rs

pub mod comment;
pub mod post;
pub mod user;

pub use comment::{Comment, CommentRequest};
pub use post::{
    CreatePostRequest, FeedItem, FeedQuery, FeedRow, NewPost, Post, PostRow, SortOrder,
    UpdatePostRequest,
};
pub use user::{
    FollowedUser, LoginRequest, NewUser, RegisterUserRequest, Role, TokenResponse,
    UpdateRoleRequest, User, UserRow, UserWithToken,
};
