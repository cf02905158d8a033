use anyhow::{Context, Result};
use cache::{CacheAside, KeyValueCache, LeaseStore, MappingStore, MemoryCache, RedisCache};
use cart::{CartService, CartStore, CheckoutLease};
use catalog::{CatalogService, CatalogStore, MemoryCatalogStore, PostgresCatalogStore};
use common::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use common::{AppConfig, Deadline};
use orders::{
    MemoryOrderStore, MemoryUserStore, OrderService, OrderStore, PostgresOrderStore,
    PostgresUserStore, RepositorySlot, UserService, UserStore,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;

/// Backend handles shared by every service
struct Backends {
    catalog: Arc<dyn CatalogStore>,
    orders: Arc<dyn OrderStore>,
    users: Arc<dyn UserStore>,
    cache: Arc<dyn KeyValueCache>,
    carts: Arc<dyn MappingStore>,
    leases: Arc<dyn LeaseStore>,
}

/// Every service, wired once at startup.
///
/// The Postgres pool and the Redis connection are created here and shared by
/// `Arc`; nothing below this opens its own client.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub catalog: CatalogService,
    pub orders: OrderService,
    pub users: UserService,
    pub carts: CartService,
    pub cache_circuit_breaker: Arc<CircuitBreaker>,
    redis: Option<RedisCache>,
}

impl AppState {
    /// Connect to Postgres and Redis and build the services on top
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        info!(
            host = %config.database.host,
            database = %config.database.database,
            "Connecting to database"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(config.request_timeout())
            .connect(&config.database.url())
            .await
            .context("failed to connect to Postgres")?;

        info!("Connecting to Redis");
        let redis = RedisCache::new(&config.redis.url)
            .await
            .context("failed to connect to Redis")?;

        let redis_handle = Arc::new(redis.clone());
        let backends = Backends {
            catalog: Arc::new(PostgresCatalogStore::new(pool.clone())),
            orders: Arc::new(PostgresOrderStore::new(pool.clone())),
            users: Arc::new(PostgresUserStore::new(pool)),
            cache: redis_handle.clone(),
            carts: redis_handle.clone(),
            leases: redis_handle,
        };

        let mut state = Self::build(config, backends);
        state.redis = Some(redis);
        Ok(state)
    }

    /// Same services over in-process stores, for tests and local runs
    pub fn in_memory(config: &AppConfig) -> Self {
        let cache = MemoryCache::new();
        let users = MemoryUserStore::new();
        let cache_handle = Arc::new(cache);

        Self::build(
            config,
            Backends {
                catalog: Arc::new(MemoryCatalogStore::new()),
                orders: Arc::new(MemoryOrderStore::with_users(users.clone())),
                users: Arc::new(users),
                cache: cache_handle.clone(),
                carts: cache_handle.clone(),
                leases: cache_handle,
            },
        )
    }

    fn build(config: &AppConfig, backends: Backends) -> Self {
        let ttl = &config.cache_ttl;

        info!("Initializing circuit breaker for cache");
        let cache_circuit_breaker = Arc::new(CircuitBreaker::new(
            "cache",
            CircuitBreakerConfig::default(),
        ));
        let cache = CacheAside::new(backends.cache, cache_circuit_breaker.clone(), "product");

        let catalog = CatalogService::new(backends.catalog, cache.clone(), ttl);
        let orders = OrderService::new(
            RepositorySlot::filled("order", backends.orders),
            cache.with_type("order"),
            ttl,
        );
        let users = UserService::new(
            RepositorySlot::filled("user", backends.users),
            cache.with_type("user"),
            ttl,
        );
        let carts = CartService::new(
            CartStore::new(backends.carts, ttl.cart()),
            CheckoutLease::new(backends.leases, ttl.checkout_lease()),
            catalog.clone(),
            orders.clone(),
        );

        Self {
            config: Arc::new(config.clone()),
            catalog,
            orders,
            users,
            carts,
            cache_circuit_breaker,
            redis: None,
        }
    }

    /// Deadline for one request, from the configured timeout
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.config.request_timeout())
    }

    /// Round-trip to Redis when connected; in-memory state is always ready
    pub async fn ping(&self) -> Result<()> {
        if let Some(redis) = &self.redis {
            redis
                .ping(self.deadline())
                .await
                .context("Redis did not answer ping")?;
        }
        Ok(())
    }
}
