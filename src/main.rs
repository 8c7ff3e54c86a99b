//! pixhost - multi-tenant image hosting.
//!
//! This binary runs the HTTP server and the administrative commands.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixhost::{
    config::{
        BlobArgs, BlobBackend, Cli, Command, ServeConfig, SweepConfig, TiersConfig, UserAction,
        UserConfig,
    },
    create_router, create_s3_client,
    tier::load_tiers_file,
    AppState, BlobStore, DerivativeGenerator, ImageService, LinkManager, LocalBlobStore,
    RecordStore, RouterConfig, S3BlobStore, StorageError, SystemClock, TierRegistry, TokenAuth,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(config) => run_serve(config).await,
        Command::Sweep(config) => run_sweep(config).await,
        Command::Tiers(config) => run_tiers(config),
        Command::User(config) => run_user(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let zone = match config.zone() {
        Ok(zone) => zone,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("pixhost v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Database: {}", config.database.display());
    info!("  Public URL: {}", config.public_url());
    info!("  Time zone: {}", zone);
    info!(
        "  Derivation: JPEG quality {}, timeout {}s",
        config.jpeg_quality, config.derivation_timeout
    );

    let Some(store) = open_store(&config.database) else {
        return ExitCode::FAILURE;
    };

    match store.list_tiers() {
        Ok(tiers) if tiers.is_empty() => {
            warn!("  No tiers defined; every user gets the minimal policy");
            warn!("  Seed the reference tiers with: pixhost tiers --defaults");
        }
        Ok(tiers) => info!("  Tiers: {}", tiers.len()),
        Err(e) => {
            error!("Failed to read tiers: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let blobs = match build_blob_store(&config.blobs).await {
        Ok(blobs) => blobs,
        Err(e) => {
            error!("Failed to open blob storage: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("  Blob storage: {}", blobs.describe());

    let generator = DerivativeGenerator::new()
        .with_jpeg_quality(config.jpeg_quality)
        .with_timeout(Duration::from_secs(config.derivation_timeout));

    let state = AppState::new(
        store,
        blobs,
        generator,
        Arc::new(SystemClock),
        zone,
        TokenAuth::new(config.auth_secret_or_empty()),
    )
    .with_public_url(config.public_url())
    .with_cache_max_age(config.cache_max_age);

    if config.sweep_interval_secs > 0 {
        let links = state.links.clone();
        tokio::spawn(links.run_sweep_loop(Duration::from_secs(config.sweep_interval_secs)));
    } else {
        warn!("  In-process sweep disabled; run `pixhost sweep` periodically");
    }

    let router = create_router(state, build_router_config(&config));

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new().with_max_upload_bytes(config.max_upload_bytes);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Sweep Command
// =============================================================================

async fn run_sweep(config: SweepConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let zone = match config.zone() {
        Ok(zone) => zone,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(store) = open_store(&config.database) else {
        return ExitCode::FAILURE;
    };
    let blobs = match build_blob_store(&config.blobs).await {
        Ok(blobs) => blobs,
        Err(e) => {
            error!("Failed to open blob storage: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let links = LinkManager::new(
        store,
        blobs,
        DerivativeGenerator::new(),
        Arc::new(SystemClock),
        zone,
    );

    match links.sweep_now().await {
        Ok(deleted) => {
            println!("Deleted {} expired link(s)", deleted);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Sweep failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Tiers Command
// =============================================================================

fn run_tiers(config: TiersConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let Some(store) = open_store(&config.database) else {
        return ExitCode::FAILURE;
    };
    let registry = TierRegistry::new(store);

    if config.defaults {
        match registry.seed_defaults() {
            Ok(count) => println!("✓ Seeded {} default tier(s)", count),
            Err(e) => {
                eprintln!("✗ Failed to seed default tiers: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    if let Some(ref path) = config.file {
        let tiers = match load_tiers_file(path) {
            Ok(tiers) => tiers,
            Err(e) => {
                eprintln!("✗ {}", e);
                return ExitCode::FAILURE;
            }
        };
        for tier in &tiers {
            if let Err(e) = registry.upsert_tier(tier) {
                eprintln!("✗ Tier '{}': {}", tier.title, e);
                return ExitCode::FAILURE;
            }
        }
        println!("✓ Loaded {} tier(s) from {}", tiers.len(), path.display());
    }

    if let Some(ref title) = config.delete {
        match registry.delete_tier(title) {
            Ok(true) => println!("✓ Deleted tier '{}'", title),
            Ok(false) => {
                eprintln!("✗ No tier named '{}'", title);
                return ExitCode::FAILURE;
            }
            Err(e) => {
                eprintln!("✗ Failed to delete tier '{}': {}", title, e);
                return ExitCode::FAILURE;
            }
        }
    }

    if config.list {
        let tiers = match registry.list_tiers() {
            Ok(tiers) => tiers,
            Err(e) => {
                eprintln!("✗ Failed to list tiers: {}", e);
                return ExitCode::FAILURE;
            }
        };
        if tiers.is_empty() {
            println!("(no tiers defined)");
        }
        for tier in &tiers {
            match serde_json::to_string(tier) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("✗ Tier '{}': {}", tier.title, e),
            }
        }
    }

    ExitCode::SUCCESS
}

// =============================================================================
// User Command
// =============================================================================

async fn run_user(config: UserConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let Some(store) = open_store(&config.database) else {
        return ExitCode::FAILURE;
    };

    match config.action {
        UserAction::Create { email, name, tier } => {
            match store.find_user_by_email(&email) {
                Ok(Some(existing)) => {
                    eprintln!("✗ User {} already uses <{}>", existing.id, existing.email);
                    return ExitCode::FAILURE;
                }
                Ok(None) => {}
                Err(e) => {
                    eprintln!("✗ {}", e);
                    return ExitCode::FAILURE;
                }
            }
            match store.create_user(&email, &name, tier.as_deref(), Utc::now().fixed_offset()) {
                Ok(user) => {
                    println!("✓ Created user {} <{}>", user.id, user.email);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("✗ Failed to create user: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        UserAction::SetTier { id, tier } => {
            if let Some(ref title) = tier {
                match store.get_tier(title) {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        eprintln!("✗ No tier named '{}'", title);
                        return ExitCode::FAILURE;
                    }
                    Err(e) => {
                        eprintln!("✗ {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            }
            match store.set_user_tier(id, tier.as_deref()) {
                Ok(true) => {
                    println!("✓ User {} tier: {}", id, tier.as_deref().unwrap_or("(none)"));
                    ExitCode::SUCCESS
                }
                Ok(false) => {
                    eprintln!("✗ No user with id {}", id);
                    ExitCode::FAILURE
                }
                Err(e) => {
                    eprintln!("✗ Failed to update user {}: {}", id, e);
                    ExitCode::FAILURE
                }
            }
        }
        UserAction::Delete { id } => {
            init_logging(false);
            let blobs = match build_blob_store(&config.blobs).await {
                Ok(blobs) => blobs,
                Err(e) => {
                    eprintln!("✗ Failed to open blob storage: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            let images = ImageService::new(
                store,
                blobs,
                DerivativeGenerator::new(),
                Arc::new(SystemClock),
                pixhost::clock::utc_offset(),
            );
            match images.delete_user(id).await {
                Ok(()) => {
                    println!("✓ Deleted user {}", id);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("✗ Failed to delete user {}: {}", id, e);
                    ExitCode::FAILURE
                }
            }
        }
        UserAction::List => match store.list_users() {
            Ok(users) => {
                if users.is_empty() {
                    println!("(no users)");
                }
                for user in users {
                    println!(
                        "{}\t{}\t{}\t{}",
                        user.id,
                        user.email,
                        user.tier.as_deref().unwrap_or("-"),
                        user.name
                    );
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("✗ Failed to list users: {}", e);
                ExitCode::FAILURE
            }
        },
        UserAction::Token { id, ttl } => {
            match store.get_user(id) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    eprintln!("✗ No user with id {}", id);
                    return ExitCode::FAILURE;
                }
                Err(e) => {
                    eprintln!("✗ {}", e);
                    return ExitCode::FAILURE;
                }
            }
            let auth = TokenAuth::new(config.auth_secret.as_deref().unwrap_or(""));
            println!("{}", auth.issue(id, Duration::from_secs(ttl)));
            ExitCode::SUCCESS
        }
    }
}

// =============================================================================
// Shared
// =============================================================================

fn open_store(path: &Path) -> Option<Arc<RecordStore>> {
    match RecordStore::open(path) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            error!("Failed to open database {}: {}", path.display(), e);
            eprintln!("Failed to open database {}: {}", path.display(), e);
            None
        }
    }
}

/// Open the blob store selected on the command line.
async fn build_blob_store(args: &BlobArgs) -> Result<Arc<dyn BlobStore>, StorageError> {
    match args.backend() {
        Some(BlobBackend::Local(dir)) => Ok(Arc::new(LocalBlobStore::new(dir).await?)),
        Some(BlobBackend::S3 {
            bucket,
            endpoint,
            region,
            prefix,
        }) => {
            if let Some(ref endpoint) = endpoint {
                info!("  S3 endpoint: {}", endpoint);
            }
            let client = create_s3_client(endpoint.as_deref(), &region).await;
            Ok(Arc::new(S3BlobStore::new(client, bucket, prefix)))
        }
        None => Err(StorageError::Io("no blob storage configured".to_string())),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "pixhost=debug,tower_http=debug"
    } else {
        "pixhost=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
