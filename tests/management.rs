mod support;

use std::sync::Arc;

use folio::application::management::{CreateGroupCommand, ManagementError, ManagementService};
use folio::application::repos::{CommentsRepo, CreateCommentParams, GroupsRepo, PostsRepo};

use support::MemoryStore;

fn service(store: &Arc<MemoryStore>) -> ManagementService {
    ManagementService::new(store.clone(), store.clone(), store.clone(), store.clone())
}

#[tokio::test]
async fn users_are_validated_and_unique() {
    let store = MemoryStore::new();
    let management = service(&store);

    let user = management.create_user("  leo  ").await.expect("create user");
    assert_eq!(user.username, "leo");

    assert!(matches!(
        management.create_user("leo").await,
        Err(ManagementError::Duplicate { entity: "user", .. })
    ));
    assert!(matches!(
        management.create_user("bad name").await,
        Err(ManagementError::Domain(_))
    ));
    assert!(matches!(
        management.delete_user("ghost").await,
        Err(ManagementError::NotFound { entity: "user", .. })
    ));
}

#[tokio::test]
async fn group_slug_is_derived_from_title_when_omitted() {
    let store = MemoryStore::new();
    let management = service(&store);

    let group = management
        .create_group(CreateGroupCommand {
            title: "Cats And Dogs".to_string(),
            slug: None,
            description: "Pets".to_string(),
        })
        .await
        .expect("create group");
    assert_eq!(group.slug, "cats-and-dogs");

    let duplicate = management
        .create_group(CreateGroupCommand {
            title: "Other".to_string(),
            slug: Some("cats-and-dogs".to_string()),
            description: String::new(),
        })
        .await;
    assert!(matches!(
        duplicate,
        Err(ManagementError::Duplicate { entity: "group", .. })
    ));

    let invalid = management
        .create_group(CreateGroupCommand {
            title: "Spaces".to_string(),
            slug: Some("has spaces".to_string()),
            description: String::new(),
        })
        .await;
    assert!(matches!(invalid, Err(ManagementError::Slug(_))));
}

#[tokio::test]
async fn deleting_a_group_keeps_its_posts() {
    let store = MemoryStore::new();
    let management = service(&store);
    let leo = store.seed_user("leo").await;
    let cats = store.seed_group("Cats", "cats").await;
    let post = store.seed_post(&leo, "Grouped", Some(&cats)).await;

    management.delete_group("cats").await.expect("delete group");

    assert!(store.find_by_slug("cats").await.expect("lookup").is_none());
    let kept = PostsRepo::find_by_id(store.as_ref(), post.id)
        .await
        .expect("lookup")
        .expect("post survives");
    assert_eq!(kept.group, None);
}

#[tokio::test]
async fn deleting_a_user_removes_their_posts_and_comments() {
    let store = MemoryStore::new();
    let management = service(&store);
    let leo = store.seed_user("leo").await;
    let mia = store.seed_user("mia").await;
    let post = store.seed_post(&leo, "Soon gone", None).await;
    store.seed_post(&mia, "Stays", None).await;
    store
        .create_comment(CreateCommentParams {
            post_id: post.id,
            author_id: mia.id,
            text: "Comment on a doomed post".to_string(),
        })
        .await
        .expect("comment");
    store.seed_follow(&mia, &leo).await;

    management.delete_user("leo").await.expect("delete user");

    assert_eq!(store.post_count().await, 1);
    assert_eq!(store.comment_count().await, 0);
    assert_eq!(store.follow_count().await, 0);
    assert!(store.list_for_post(post.id).await.expect("comments").is_empty());
}

#[tokio::test]
async fn deleting_a_post_reports_missing_ids() {
    let store = MemoryStore::new();
    let management = service(&store);
    let leo = store.seed_user("leo").await;
    let post = store.seed_post(&leo, "Delete me", None).await;

    management.delete_post(post.id).await.expect("delete post");
    assert_eq!(store.post_count().await, 0);

    assert!(matches!(
        management.delete_post(post.id).await,
        Err(ManagementError::NotFound { entity: "post", .. })
    ));
}
