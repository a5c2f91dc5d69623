mod common;

use chrono::Utc;
use microblog::db::models::{Post, User};
use microblog::db::record::Record;
use microblog::db::session::Session;
use microblog::db::unit_of_work::{ChangeKind, StagedChange, UnitOfWork};

fn post(id: i64, body: &str) -> Post {
    Post {
        id,
        body: body.to_string(),
        timestamp: Utc::now(),
        user_id: 1,
        language: String::new(),
    }
}

#[tokio::test]
async fn commit_spans_collections() {
    let env = common::TestEnv::start().await;
    let session = Session::new(env.store.clone());

    let mut uow = UnitOfWork::new();
    uow.add(&User {
        id: 1,
        username: "susan".to_string(),
        email: "susan@example.com".to_string(),
        about_me: None,
    })
    .unwrap();
    uow.add(&post(1, "hello")).unwrap();
    session.commit(uow).await.unwrap();

    assert!(session.get::<User>(1).await.unwrap().is_some());
    assert_eq!(session.get::<Post>(1).await.unwrap().unwrap().body, "hello");
}

#[tokio::test]
async fn failed_commit_leaves_nothing_behind() {
    let env = common::TestEnv::start().await;
    let session = Session::new(env.store.clone());

    let mut uow = UnitOfWork::new();
    uow.add(&post(1, "keep me")).unwrap();
    uow.add(&post(2, "and me")).unwrap();
    session.commit(uow).await.unwrap();

    // The second write upserts a document clashing with the unique id of post 2.
    let clashing = bson::to_document(&post(2, "duplicate")).unwrap();
    let changes = vec![
        StagedChange {
            collection: Post::COLLECTION,
            id: 1,
            kind: ChangeKind::Deleted,
            body: None,
        },
        StagedChange {
            collection: Post::COLLECTION,
            id: 3,
            kind: ChangeKind::Added,
            body: Some(clashing),
        },
    ];
    assert!(env.store.apply(&changes).await.is_err());

    // The delete staged before the failure was rolled back.
    assert_eq!(session.get::<Post>(1).await.unwrap().unwrap().body, "keep me");
    assert_eq!(session.get::<Post>(2).await.unwrap().unwrap().body, "and me");
    assert!(session.get::<Post>(3).await.unwrap().is_none());
}
