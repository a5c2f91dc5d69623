use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::AppConfig;
use crate::db::memory::MemoryRecordStore;
use crate::db::models::{Post, RECORD_COLLECTIONS};
use crate::db::session::Session;
use crate::db::store::{MongoRecordStore, RecordStore};
use crate::email::mailer::{DisabledMailer, Mailer, SmtpMailer};
use crate::error::AppError;
use crate::search::client::{MeilisearchIndexClient, SearchIndex};
use crate::search::memory::MemoryIndexClient;
use crate::search::registry::SearchRegistry;
use crate::search::sync::IndexSynchronizer;
use crate::tasks::export::TaskWorker;
use crate::tasks::queue::{JobMeta, JobQueue, LocalJobQueue, MemoryJobMeta};

/// Shared application state available to all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session whose commits keep the search index in sync.
    pub session: Session,
    pub search_index: SearchIndex,
    pub registry: Arc<SearchRegistry>,
    pub job_queue: Arc<dyn JobQueue>,
    pub job_meta: Arc<dyn JobMeta>,
    pub posts_per_page: u32,
}

impl AppState {
    /// Wire the session, index synchronizer and local job queue together.
    pub fn new(
        store: Arc<dyn RecordStore>,
        search_index: SearchIndex,
        mailer: Arc<dyn Mailer>,
        sender: impl Into<String>,
        posts_per_page: u32,
    ) -> Self {
        let registry = Arc::new(SearchRegistry::new().register::<Post>());
        let session = Session::new(store).with_interceptor(Arc::new(IndexSynchronizer::new(
            registry.clone(),
            search_index.clone(),
        )));

        let job_meta: Arc<dyn JobMeta> = Arc::new(MemoryJobMeta::new());
        let worker = Arc::new(TaskWorker::new(session.clone(), mailer, sender));
        let job_queue: Arc<dyn JobQueue> = Arc::new(LocalJobQueue::new(worker, job_meta.clone()));

        Self {
            session,
            search_index,
            registry,
            job_queue,
            job_meta,
            posts_per_page: posts_per_page.max(1),
        }
    }
}

/// Connect the backends named in `config` and build the state on top of them.
pub async fn build_state(config: &AppConfig) -> Result<AppState, AppError> {
    let store: Arc<dyn RecordStore> = match &config.database.uri {
        Some(uri) => {
            let client = mongodb::Client::with_uri_str(uri)
                .await
                .map_err(|e| AppError::Database(format!("Failed to connect to MongoDB: {e}")))?;
            let store = MongoRecordStore::new(&client.database(&config.database.name));
            store.ensure_transactions().await?;
            store.ensure_indexes(RECORD_COLLECTIONS).await?;
            tracing::info!("Connected to MongoDB database {}", config.database.name);
            Arc::new(store)
        }
        None => {
            tracing::warn!("database.uri not set, records are kept in memory");
            Arc::new(MemoryRecordStore::new())
        }
    };

    let search_index = if config.search.in_memory {
        tracing::info!("Using the in-memory search engine");
        SearchIndex::new(Arc::new(MemoryIndexClient::new()))
    } else if let Some(url) = &config.search.url {
        let client = MeilisearchIndexClient::new(url, config.search.api_key.clone())?;
        tracing::info!("Search backed by Meilisearch at {}", url);
        SearchIndex::new(Arc::new(client))
    } else {
        tracing::info!("Search not configured, full-text search is disabled");
        SearchIndex::disabled()
    };

    let mailer: Arc<dyn Mailer> = if config.mail.server.is_some() {
        Arc::new(SmtpMailer::new(&config.mail)?)
    } else {
        Arc::new(DisabledMailer)
    };

    let state = AppState::new(
        store,
        search_index,
        mailer,
        config.mail_sender(),
        config.posts_per_page,
    );
    state.search_index.configure(&state.registry).await;

    Ok(state)
}

/// The HTTP API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/users", post(api::users::create_user_handler))
        .route(
            "/api/v1/users/{id}",
            get(api::users::get_user_handler).put(api::users::update_user_handler),
        )
        .route(
            "/api/v1/users/{id}/follow/{target}",
            post(api::follows::follow_handler).delete(api::follows::unfollow_handler),
        )
        .route("/api/v1/users/{id}/follows", get(api::follows::follow_counts_handler))
        .route("/api/v1/users/{id}/timeline", get(api::follows::timeline_handler))
        .route(
            "/api/v1/posts",
            get(api::posts::list_posts_handler).post(api::posts::create_post_handler),
        )
        .route(
            "/api/v1/posts/{id}",
            put(api::posts::update_post_handler).delete(api::posts::delete_post_handler),
        )
        .route("/api/v1/search", get(api::search::search_handler))
        .route("/api/v1/admin/reindex", post(api::search::reindex_handler))
        .route("/api/v1/users/{id}/export", post(api::tasks::export_posts_handler))
        .route("/api/v1/users/{id}/tasks", get(api::tasks::list_tasks_handler))
        .route(
            "/api/v1/users/{id}/notifications",
            get(api::tasks::notifications_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
