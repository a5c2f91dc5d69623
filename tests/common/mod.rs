#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::meilisearch::Meilisearch;
use testcontainers_modules::mongo::Mongo;

use microblog::app::{router, AppState};
use microblog::db::models::RECORD_COLLECTIONS;
use microblog::db::store::{MongoRecordStore, RecordStore};
use microblog::email::mailer::{Email, Mailer};
use microblog::error::AppError;
use microblog::search::client::{MeilisearchIndexClient, SearchIndex};

pub const ADMIN: &str = "admin@example.com";
const PER_PAGE: u32 = 10;

/// Mailer keeping every message it is asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Email>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

/// Holds running containers and provides the Axum router for integration tests.
///
/// Containers are kept alive for as long as this struct lives. When dropped,
/// containers are stopped and cleaned up automatically.
pub struct TestEnv {
    _mongo: ContainerAsync<Mongo>,
    _meili: ContainerAsync<Meilisearch>,
    pub router: Router,
    pub state: AppState,
    pub store: Arc<dyn RecordStore>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestEnv {
    /// Spin up MongoDB and Meilisearch and build a router wired to them.
    pub async fn start() -> Self {
        let (mongo_container, meili_container) =
            tokio::join!(Mongo::repl_set().start(), Meilisearch::default().start());
        let mongo_container = mongo_container.expect("Failed to start MongoDB container");
        let meili_container = meili_container.expect("Failed to start Meilisearch container");

        // --- MongoDB ---
        let mongo_port = mongo_container
            .get_host_port_ipv4(27017)
            .await
            .expect("Failed to get MongoDB port");
        // Commits run in transactions, which need the single-node replica set.
        let mongo_uri = format!("mongodb://127.0.0.1:{}/?directConnection=true", mongo_port);
        let mongo_client = mongodb::Client::with_uri_str(&mongo_uri)
            .await
            .expect("Failed to connect to MongoDB");
        let mongo_store = MongoRecordStore::new(&mongo_client.database("microblog_test"));
        mongo_store
            .ensure_transactions()
            .await
            .expect("MongoDB does not support transactions");
        mongo_store
            .ensure_indexes(RECORD_COLLECTIONS)
            .await
            .expect("Failed to create MongoDB indexes");
        let store: Arc<dyn RecordStore> = Arc::new(mongo_store);

        // --- Meilisearch ---
        let meili_port = meili_container
            .get_host_port_ipv4(7700)
            .await
            .expect("Failed to get Meilisearch port");
        let meili_url = format!("http://127.0.0.1:{}", meili_port);
        let client = MeilisearchIndexClient::new(&meili_url, None::<String>)
            .expect("Failed to create Meilisearch client");
        let search_index = SearchIndex::new(Arc::new(client));

        // --- Build AppState ---
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(
            store.clone(),
            search_index,
            mailer.clone(),
            ADMIN,
            PER_PAGE,
        );
        state.search_index.configure(&state.registry).await;

        Self {
            _mongo: mongo_container,
            _meili: meili_container,
            router: router(state.clone()),
            state,
            store,
            mailer,
        }
    }

    /// Build an `axum_test::TestServer` from this environment's router.
    pub fn server(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .expect_success_by_default()
            .build(self.router.clone())
    }

    /// Build a `TestServer` that does NOT expect success by default (for error tests).
    pub fn server_permissive(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .build(self.router.clone())
    }

    /// Helper: create a user via the API and return its id.
    pub async fn create_user(&self, server: &axum_test::TestServer, username: &str) -> i64 {
        let response = server
            .post("/api/v1/users")
            .json(&serde_json::json!({
                "username": username,
                "email": format!("{username}@example.com"),
            }))
            .await;
        let user: serde_json::Value = response.json();
        user["id"].as_i64().expect("user id")
    }

    /// Helper: publish a post via the API and return its id.
    pub async fn create_post(&self, server: &axum_test::TestServer, user_id: i64, body: &str) -> i64 {
        let response = server
            .post("/api/v1/posts")
            .json(&serde_json::json!({ "user_id": user_id, "body": body }))
            .await;
        let post: serde_json::Value = response.json();
        post["id"].as_i64().expect("post id")
    }

    /// Helper: list the ids of one page of a user's timeline.
    pub async fn timeline_ids(&self, server: &axum_test::TestServer, user_id: i64) -> Vec<i64> {
        let page: serde_json::Value = server
            .get(&format!("/api/v1/users/{user_id}/timeline"))
            .await
            .json();
        page["items"]
            .as_array()
            .expect("items")
            .iter()
            .map(|p| p["id"].as_i64().expect("id"))
            .collect()
    }

    /// Helper: wait for Meilisearch to process pending tasks (async indexing).
    pub async fn wait_for_search_indexing(&self) {
        // Meilisearch processes tasks asynchronously. A short delay is the
        // simplest reliable approach for integration tests.
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    }
}

/// Build a `TestServer` sharing the environment's store, with search disabled
/// (for testing graceful degradation).
pub fn server_without_search(env: &TestEnv) -> axum_test::TestServer {
    let state = AppState::new(
        env.store.clone(),
        SearchIndex::disabled(),
        env.mailer.clone(),
        ADMIN,
        PER_PAGE,
    );

    axum_test::TestServer::builder()
        .expect_success_by_default()
        .build(router(state))
}

/// Search via the API and return the ids of the hits plus the reported total.
pub async fn search_ids(server: &axum_test::TestServer, q: &str) -> (Vec<i64>, u64) {
    let response = server.get("/api/v1/search").add_query_param("q", q).await;
    response.assert_status_ok();
    let page: serde_json::Value = response.json();
    let ids = page["items"]
        .as_array()
        .expect("items")
        .iter()
        .map(|p| p["id"].as_i64().expect("id"))
        .collect();
    (ids, page["total"].as_u64().expect("total"))
}
