use anyhow::Result;
use redis::{AsyncCommands, Client, SetExpiry, SetOptions};

#[derive(Clone)]
pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let cache = Self::new(redis_url)?;
        cache.ping().await?;
        Ok(cache)
    }

    /// Open a client without touching the server; connections are made lazily.
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    /// Take `key` for `ttl_seconds` unless someone else holds it.
    /// Returns whether this caller now owns the lease.
    pub async fn try_acquire_lease(&self, key: &str, holder: &str, ttl_seconds: u64) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let options = SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(SetExpiry::EX(ttl_seconds as usize));
        let acquired: Option<String> = conn.set_options(key, holder, options).await?;
        Ok(acquired.is_some())
    }
}
