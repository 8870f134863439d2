use std::{process, sync::Arc, time::Duration};

use folio::{
    application::{
        auth::{AuthService, IdentityProvider},
        composer::PostComposer,
        content::ContentService,
        deploy::{DeployHook, DeployService},
        error::AppError,
        markdown::MarkdownService,
        pages::{SiteInfo, SitePages},
        prerender::Prerenderer,
        repos::{ContentRepo, ContentWriteRepo, UploadsRepo},
        storage::ObjectStore,
        uploads::UploadService,
    },
    config::{self, StorageBackend},
    infra::{
        backend::build_http_client,
        db::PostgresRepositories,
        deploy::HttpDeployHook,
        error::InfraError,
        http::{self, AdminState, AuthState, HealthCheck, HttpState, RouterState, ServedUploads},
        identity::GoTrueIdentity,
        storage::{FilesystemStore, HttpObjectStore},
        telemetry,
    },
};
use tokio::{signal, sync::watch};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Prerender(args) => run_prerender(settings, args).await,
        config::Command::SweepUploads(args) => run_sweep_uploads(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings)?;

    let router_state = RouterState {
        http: app.http_state,
        auth: app.auth_state,
        admin: app.admin_state,
    };
    serve_http(&settings, router_state).await
}

async fn run_prerender(
    settings: config::Settings,
    args: config::PrerenderArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let client = build_http_client().map_err(InfraError::from)?;
    let store = build_object_store(&settings, &client)?;
    let pages = build_site_pages(repositories, store, &settings);

    let summary = Prerenderer::new(pages, &args.out)
        .run(args.concurrency)
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    info!(
        target = "folio::prerender",
        out = %args.out.display(),
        indexes = summary.indexes,
        posts = summary.posts,
        "static site written"
    );
    Ok(())
}

async fn run_sweep_uploads(
    settings: config::Settings,
    args: config::SweepUploadsArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let client = build_http_client().map_err(InfraError::from)?;
    let store = build_object_store(&settings, &client)?;
    let uploads = build_upload_service(repositories, store, &settings);

    let hours = i64::try_from(args.older_than_hours)
        .map_err(|_| AppError::validation("--older-than-hours is out of range"))?;
    let summary = uploads
        .sweep(time::Duration::hours(hours))
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    info!(
        target = "folio::uploads",
        removed = summary.removed,
        failed = summary.failed,
        older_than_hours = args.older_than_hours,
        "upload sweep completed"
    );
    Ok(())
}

struct ApplicationContext {
    http_state: HttpState,
    auth_state: AuthState,
    admin_state: AdminState,
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_object_store(
    settings: &config::Settings,
    client: &reqwest::Client,
) -> Result<Arc<dyn ObjectStore>, AppError> {
    match settings.storage.backend {
        StorageBackend::Filesystem => {
            let store = FilesystemStore::new(
                settings.storage.directory.clone(),
                settings.storage.public_base_url.clone(),
            )
            .map_err(|err| AppError::from(InfraError::Io(err)))?;
            Ok(Arc::new(store))
        }
        StorageBackend::Http => {
            let base = settings.backend.url.clone().ok_or_else(|| {
                InfraError::configuration("backend.url is required for the http storage backend")
            })?;
            Ok(Arc::new(HttpObjectStore::new(
                client.clone(),
                base,
                settings.backend.storage_key().map(str::to_string),
            )))
        }
    }
}

fn build_site_pages(
    repositories: Arc<PostgresRepositories>,
    store: Arc<dyn ObjectStore>,
    settings: &config::Settings,
) -> SitePages {
    let content_repo: Arc<dyn ContentRepo> = repositories;
    SitePages::new(
        ContentService::new(content_repo),
        MarkdownService::new(store, settings.storage.markdown_bucket.clone()),
        SiteInfo {
            title: settings.site.title.clone(),
            description: settings.site.description.clone(),
            public_url: settings.site.public_url.to_string(),
        },
    )
}

fn build_upload_service(
    repositories: Arc<PostgresRepositories>,
    store: Arc<dyn ObjectStore>,
    settings: &config::Settings,
) -> UploadService {
    let uploads_repo: Arc<dyn UploadsRepo> = repositories;
    UploadService::new(
        store,
        uploads_repo,
        settings.storage.images_bucket.clone(),
        settings.storage.max_upload_bytes.get(),
    )
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let content_repo: Arc<dyn ContentRepo> = repositories.clone();
    let content_write_repo: Arc<dyn ContentWriteRepo> = repositories.clone();
    let uploads_repo: Arc<dyn UploadsRepo> = repositories.clone();
    let health: Arc<dyn HealthCheck> = repositories.clone();

    let client = build_http_client().map_err(InfraError::from)?;
    let store = build_object_store(settings, &client)?;

    let pages = build_site_pages(repositories.clone(), store.clone(), settings);
    let content = pages.content().clone();

    let hook: Option<Arc<dyn DeployHook>> = settings
        .deploy
        .hook_url
        .clone()
        .map(|url| Arc::new(HttpDeployHook::new(client.clone(), url)) as Arc<dyn DeployHook>);
    if hook.is_none() {
        warn!(
            target = "folio::deploy",
            "deploy.hook_url is not set; publishing will not trigger a rebuild"
        );
    }
    let deploy = DeployService::new(hook, settings.deploy.webhook_secret.clone());

    let identity_base = settings.backend.url.clone().ok_or_else(|| {
        InfraError::configuration("backend.url is required for the identity provider")
    })?;
    let identity: Arc<dyn IdentityProvider> = Arc::new(GoTrueIdentity::new(
        client,
        identity_base,
        settings.backend.anon_key.clone(),
    ));
    let auth = AuthService::new(
        identity,
        settings.auth.default_provider.clone(),
        settings.site.public_url.to_string(),
    );

    let uploads = build_upload_service(repositories, store.clone(), settings);
    let composer = PostComposer::new(
        content_repo,
        content_write_repo,
        uploads_repo,
        store.clone(),
        settings.storage.markdown_bucket.clone(),
        deploy.clone(),
    );

    let served_uploads = match settings.storage.backend {
        StorageBackend::Filesystem => Some(ServedUploads {
            store,
            bucket: settings.storage.images_bucket.clone(),
        }),
        StorageBackend::Http => None,
    };

    Ok(ApplicationContext {
        http_state: HttpState {
            pages,
            health,
            uploads: served_uploads,
        },
        auth_state: AuthState {
            service: auth,
            cookie_secure: settings.auth.cookie_secure,
        },
        admin_state: AdminState {
            site_title: settings.site.title.clone(),
            content,
            composer,
            uploads,
            deploy,
            max_upload_bytes: settings.storage.max_upload_bytes.get(),
        },
    })
}

async fn serve_http(settings: &config::Settings, state: RouterState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target = "folio::http", addr = %settings.server.addr, "listening");

    let (signalled_tx, mut signalled_rx) = watch::channel(());
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            info!(target = "folio::http", "shutdown signal received, draining connections");
            let _ = signalled_tx.send(());
        },
    );

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = drain_deadline(&mut signalled_rx, grace) => {
            warn!(
                target = "folio::http",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
        }
    }

    Ok(())
}

async fn drain_deadline(signalled: &mut watch::Receiver<()>, grace: Duration) {
    if signalled.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(grace).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(target = "folio::http", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(target = "folio::http", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
