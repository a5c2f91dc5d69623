mod common;

use microblog::db::models::Post;
use microblog::db::session::Session;
use microblog::db::unit_of_work::UnitOfWork;

#[tokio::test]
async fn search_follows_commits() {
    let env = common::TestEnv::start().await;
    let server = env.server();

    let susan = env.create_user(&server, "susan").await;
    let alpha = env.create_post(&server, susan, "alpha").await;
    let beta_alpha = env.create_post(&server, susan, "beta alpha").await;
    let gamma = env.create_post(&server, susan, "gamma").await;

    env.wait_for_search_indexing().await;

    // The exact match outranks the longer body.
    let (ids, total) = common::search_ids(&server, "alpha").await;
    assert_eq!(ids, vec![alpha, beta_alpha]);
    assert_eq!(total, 2);

    let (ids, total) = common::search_ids(&server, "gamma").await;
    assert_eq!(ids, vec![gamma]);
    assert_eq!(total, 1);

    server.delete(&format!("/api/v1/posts/{beta_alpha}")).await;
    env.wait_for_search_indexing().await;

    let (ids, total) = common::search_ids(&server, "alpha").await;
    assert_eq!(ids, vec![alpha]);
    assert_eq!(total, 1);
}

#[tokio::test]
async fn search_follows_updates() {
    let env = common::TestEnv::start().await;
    let server = env.server();

    let susan = env.create_user(&server, "susan").await;
    let post = env.create_post(&server, susan, "original wording").await;
    env.wait_for_search_indexing().await;

    server
        .put(&format!("/api/v1/posts/{post}"))
        .json(&serde_json::json!({ "body": "revised wording" }))
        .await;
    env.wait_for_search_indexing().await;

    let (ids, _) = common::search_ids(&server, "revised").await;
    assert_eq!(ids, vec![post]);
    let (ids, total) = common::search_ids(&server, "original").await;
    assert!(ids.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn search_pages_report_exact_totals() {
    let env = common::TestEnv::start().await;
    let server = env.server();

    let susan = env.create_user(&server, "susan").await;
    for i in 0..12 {
        env.create_post(&server, susan, &format!("paged entry {i}")).await;
    }
    env.wait_for_search_indexing().await;

    let first: serde_json::Value = server
        .get("/api/v1/search")
        .add_query_param("q", "paged")
        .await
        .json();
    assert_eq!(first["items"].as_array().unwrap().len(), 10);
    assert_eq!(first["total"], 12);
    assert_eq!(first["next_page"], 2);

    let second: serde_json::Value = server
        .get("/api/v1/search")
        .add_query_param("q", "paged")
        .add_query_param("page", 2)
        .await
        .json();
    assert_eq!(second["items"].as_array().unwrap().len(), 2);
    assert_eq!(second["total"], 12);
    assert!(second["next_page"].is_null());
    assert_eq!(second["prev_page"], 1);
}

#[tokio::test]
async fn empty_query_returns_nothing() {
    let env = common::TestEnv::start().await;
    let server = env.server();

    let susan = env.create_user(&server, "susan").await;
    env.create_post(&server, susan, "something").await;
    env.wait_for_search_indexing().await;

    let (ids, total) = common::search_ids(&server, "   ").await;
    assert!(ids.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn reindex_restores_records_written_without_search() {
    let env = common::TestEnv::start().await;

    // Written straight to the store: the index never hears about them.
    let offline = Session::new(env.store.clone());
    let mut uow = UnitOfWork::new();
    for id in 1..=120 {
        uow.add(&Post {
            id,
            body: format!("archived entry {id}"),
            timestamp: chrono::Utc::now(),
            user_id: 1,
            language: String::new(),
        })
        .unwrap();
    }
    offline.commit(uow).await.unwrap();

    let server = env.server();
    let (ids, _) = common::search_ids(&server, "archived").await;
    assert!(ids.is_empty());

    let response = server.post("/api/v1/admin/reindex").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["indexed"], 120);
    env.wait_for_search_indexing().await;
    env.wait_for_search_indexing().await;

    let (ids, total) = common::search_ids(&server, "archived").await;
    assert_eq!(ids.len(), 10);
    assert_eq!(total, 120);

    // Running it again converges on the same content.
    server.post("/api/v1/admin/reindex").await;
    env.wait_for_search_indexing().await;
    let (_, total) = common::search_ids(&server, "archived").await;
    assert_eq!(total, 120);
}

#[tokio::test]
async fn search_degrades_gracefully_without_engine() {
    let env = common::TestEnv::start().await;
    let server = common::server_without_search(&env);

    let susan = env.create_user(&server, "susan").await;
    // Writes still succeed with no engine behind the index.
    let post = env.create_post(&server, susan, "alpha").await;

    let (ids, total) = common::search_ids(&server, "alpha").await;
    assert!(ids.is_empty());
    assert_eq!(total, 0);

    let response = server.get("/api/v1/posts").await;
    let page: serde_json::Value = response.json();
    assert_eq!(page["items"][0]["id"], post);
}
