use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use campus_backend::{
    AppState,
    config::{Config, StoreBackend},
    governor::RequestGovernor,
    router::build_router,
    store::{KeyValueStore, MemoryStore, RedisStore},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'campus_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    // 限流计数器与列表缓存共用的存储
    let store: Arc<dyn KeyValueStore> = match config.store_backend {
        StoreBackend::Redis => {
            let redis_client = redis::Client::open(config.redis_url.clone())
                .expect("Failed to create Redis client");
            let store = RedisStore::connect(&redis_client, config.store_timeout())
                .await
                .expect("Failed to connect to Redis");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-process store, rate limits are not shared across instances");
            Arc::new(MemoryStore::new())
        }
    };

    let governor = Arc::new(RequestGovernor::from_config(store.clone(), &config));

    // 设置应用状态
    let state = AppState {
        pool,
        config: config.clone(),
        store,
        governor,
    };

    let app = build_router(state);

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
