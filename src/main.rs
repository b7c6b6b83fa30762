use std::{future::IntoFuture, process, sync::Arc};

use folio::{
    application::{
        error::AppError,
        feed::FeedService,
        follows::FollowService,
        management::{CreateGroupCommand, ManagementService},
        pagination::Paginator,
        posts::PostService,
        repos::{
            CommentsRepo, FollowsRepo, GroupsRepo, HealthRepo, PostsRepo, PostsWriteRepo,
            UsersRepo,
        },
    },
    cache::{PageCache, TtlPageCache},
    config::{self, GroupsCommand, PostsCommand, UsersCommand},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
        uploads::UploadStorage,
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
        config::Command::Users(args) => run_users(settings, args.command).await,
        config::Command::Groups(args) => run_groups(settings, args.command).await,
        config::Command::Posts(args) => run_posts(settings, args.command).await,
    }
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

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn management_service(repositories: &Arc<PostgresRepositories>) -> ManagementService {
    let users: Arc<dyn UsersRepo> = repositories.clone();
    let groups: Arc<dyn GroupsRepo> = repositories.clone();
    let posts: Arc<dyn PostsRepo> = repositories.clone();
    let writer: Arc<dyn PostsWriteRepo> = repositories.clone();
    ManagementService::new(users, groups, posts, writer)
}

fn build_http_state(
    repositories: &Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let users: Arc<dyn UsersRepo> = repositories.clone();
    let groups: Arc<dyn GroupsRepo> = repositories.clone();
    let posts: Arc<dyn PostsRepo> = repositories.clone();
    let writer: Arc<dyn PostsWriteRepo> = repositories.clone();
    let comments: Arc<dyn CommentsRepo> = repositories.clone();
    let follows: Arc<dyn FollowsRepo> = repositories.clone();
    let health: Arc<dyn HealthRepo> = repositories.clone();

    let upload_storage = Arc::new(
        UploadStorage::new(settings.uploads.directory.clone())
            .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );

    let feed = Arc::new(FeedService::new(
        posts.clone(),
        groups.clone(),
        users.clone(),
        follows.clone(),
        Paginator::new(settings.feed.page_size),
    ));
    let post_service = Arc::new(PostService::new(
        posts,
        writer,
        comments,
        groups,
        upload_storage.clone(),
    ));
    let follow_service = Arc::new(FollowService::new(users.clone(), follows));
    let cache: Arc<dyn PageCache> = Arc::new(TtlPageCache::new(
        settings.cache.max_entries,
        settings.cache.index_ttl,
    ));

    Ok(HttpState {
        feed,
        posts: post_service,
        follows: follow_service,
        users,
        health,
        cache,
        upload_storage,
        auth: Arc::new(settings.auth.clone()),
        preview_length: settings.feed.preview_length,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_http_state(&repositories, &settings)?;
    let upload_limit = usize::try_from(settings.uploads.max_request_bytes.get())
        .map_err(|_| AppError::validation("uploads.max_request_bytes does not fit in memory"))?;
    let router = http::build_router(state, upload_limit);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "folio::serve",
        addr = %settings.server.addr,
        "listening"
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        },
    );
    let grace = settings.server.graceful_shutdown;
    let deadline = async move {
        if shutdown_rx.wait_for(|stopping| *stopping).await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server.into_future() => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = deadline => {
            warn!(
                target = "folio::serve",
                grace_seconds = grace.as_secs(),
                "in-flight requests did not finish before the shutdown deadline"
            );
        }
    }

    info!(target = "folio::serve", "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(target = "folio::serve", error = %err, "failed to listen for Ctrl-C");
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
                error!(target = "folio::serve", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!(target = "folio::serve", "received Ctrl-C, shutting down"),
        () = terminate => info!(target = "folio::serve", "received SIGTERM, shutting down"),
    }
}

async fn run_users(settings: config::Settings, command: UsersCommand) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let management = management_service(&repositories);

    match command {
        UsersCommand::Create { username } => {
            let user = management.create_user(&username).await?;
            println!("created user {} (id {})", user.username, user.id);
        }
        UsersCommand::Delete { username } => {
            management.delete_user(&username).await?;
            println!("deleted user {username}");
        }
    }
    Ok(())
}

async fn run_groups(settings: config::Settings, command: GroupsCommand) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let management = management_service(&repositories);

    match command {
        GroupsCommand::Create {
            title,
            slug,
            description,
        } => {
            let group = management
                .create_group(CreateGroupCommand {
                    title,
                    slug,
                    description,
                })
                .await?;
            println!("created group {} (/group/{}/)", group.title, group.slug);
        }
        GroupsCommand::Delete { slug } => {
            management.delete_group(&slug).await?;
            println!("deleted group {slug}");
        }
    }
    Ok(())
}

async fn run_posts(settings: config::Settings, command: PostsCommand) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let management = management_service(&repositories);

    match command {
        PostsCommand::Delete { id } => {
            management.delete_post(id).await?;
            println!("deleted post {id}");
        }
    }
    Ok(())
}
