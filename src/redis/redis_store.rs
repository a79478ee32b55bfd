use redis::{AsyncCommands, Script};

use crate::{
    AdmissionMode, Evaluation, LeakygateError, Limit, RateStore, TIME_EPSILON,
    common::validate_key,
    redis::{KeyPrefix, RedisConnectionPool},
};

/// Configuration for [`RedisStore`].
///
/// # Requirements
///
/// - **Redis version:** >= 5.0 (scripts replicated by effect, `TIME` inside scripts)
/// - **Runtime:** Tokio or Smol (via `redis-tokio` or `redis-smol` features)
///
/// # Examples
///
/// ```ignore
/// use leakygate::redis::{KeyPrefix, RedisConnectionPool, RedisStoreOptions};
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
///
/// let options = RedisStoreOptions {
///     client: RedisConnectionPool::from_client(client, 4).await?,
///     prefix: Some(KeyPrefix::try_from("myapp")?), // Keys: myapp:<key>
/// };
/// ```
#[derive(Clone, Debug)]
pub struct RedisStoreOptions {
    /// Connections used to reach Redis.
    ///
    /// Build one from a `redis::Client` with [`RedisConnectionPool::from_client`],
    /// or wrap an existing `ConnectionManager` with `.into()`.
    pub client: RedisConnectionPool,

    /// Optional namespace for all keys: `<prefix>:<key>`.
    ///
    /// If `None`, defaults to `RATE_LIMIT`.
    pub prefix: Option<KeyPrefix>,
}

/// Distributed TAT store backed by Redis.
///
/// Every decision runs as one Lua script: `GET` the TAT, run the GCRA arithmetic,
/// `SET key tat EX ttl` on admission. Redis executes scripts one at a time, so
/// concurrent callers on any number of machines see a serial order per key. `now`
/// comes from the server's `TIME`, so caller clock skew does not affect decisions.
///
/// TATs are stored as decimal seconds since 2017-01-01 with nanosecond digits
/// and expire once the bucket would be empty again.
///
/// # Failure semantics
///
/// - Connection errors and timeouts surface as [`LeakygateError::RedisError`]. The
///   script may already have committed; treat the outcome as unknown.
/// - A stored value that is not a number surfaces as
///   [`LeakygateError::MalformedTat`]; it is never treated as an empty bucket.
/// - Nothing is retried.
///
/// # Examples
///
/// ```ignore
/// use leakygate::{Limit, RateLimiter};
/// use leakygate::redis::{RedisConnectionPool, RedisStore, RedisStoreOptions};
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let rl = RateLimiter::new(RedisStore::new(RedisStoreOptions {
///     client: RedisConnectionPool::default_from_client(client).await?,
///     prefix: None,
/// }));
///
/// let decision = rl.allow("user_123", &Limit::per_minute(60)?).await?;
/// if !decision.is_allowed() {
///     /* send 429, retry after decision.retry_after */
/// }
/// ```
#[derive(Debug)]
pub struct RedisStore {
    client: RedisConnectionPool,
    prefix: KeyPrefix,
    allow_n_script: Script,
    allow_at_most_script: Script,
}

impl RedisStore {
    /// Create a store. Scripts are hashed once here and sent by `EVALSHA`, falling
    /// back to `EVAL` when the server does not know them yet.
    pub fn new(options: RedisStoreOptions) -> Self {
        Self {
            client: options.client,
            prefix: options.prefix.unwrap_or_default(),
            allow_n_script: Script::new(ALLOW_N_SCRIPT),
            allow_at_most_script: Script::new(ALLOW_AT_MOST_SCRIPT),
        }
    }

    /// The namespace applied to every key.
    pub fn prefix(&self) -> &KeyPrefix {
        &self.prefix
    }

    fn script(&self, mode: AdmissionMode) -> &Script {
        match mode {
            AdmissionMode::Exact => &self.allow_n_script,
            AdmissionMode::AtMost => &self.allow_at_most_script,
        }
    }
}

impl RateStore for RedisStore {
    async fn evaluate(
        &self,
        key: &str,
        limit: &Limit,
        cost: u64,
        mode: AdmissionMode,
    ) -> Result<Evaluation, LeakygateError> {
        validate_key(key)?;

        let full_key = self.prefix.key(key);
        let mut connection_manager = self.client.get();

        let (status, allowed, remaining, retry_after, reset_after): (
            String,
            u64,
            u64,
            String,
            String,
        ) = self
            .script(mode)
            .key(&full_key)
            .arg(limit.burst())
            .arg(limit.rate())
            .arg(limit.period().as_secs_f64())
            .arg(cost)
            .arg(TIME_EPSILON)
            .invoke_async(&mut connection_manager)
            .await?;

        match status.as_str() {
            "allowed" => Ok(Evaluation {
                allowed,
                remaining,
                retry_after: decode_retry_after(&retry_after)?,
                reset_after: decode_seconds(&reset_after)?,
            }),
            "denied" => {
                let Some(retry_after) = decode_retry_after(&retry_after)? else {
                    return Err(LeakygateError::UnexpectedReply(
                        "denied without retry-after".to_string(),
                    ));
                };

                Ok(Evaluation {
                    allowed: 0,
                    remaining: 0,
                    retry_after: Some(retry_after),
                    reset_after: decode_seconds(&reset_after)?,
                })
            }
            "malformed" => {
                // The script hands back the raw stored value in the last slot.
                tracing::error!(key = %full_key, value = %reset_after, "Malformed TAT stored for rate limit key");
                Err(LeakygateError::MalformedTat {
                    key: full_key,
                    value: reset_after,
                })
            }
            _ => {
                tracing::error!(key = %full_key, status = %status, "Unexpected result from rate limit script");
                Err(LeakygateError::UnexpectedReply(format!(
                    "unexpected status from rate limit script: {status}"
                )))
            }
        }
    } // end method evaluate

    async fn reset(&self, key: &str) -> Result<(), LeakygateError> {
        validate_key(key)?;

        let mut connection_manager = self.client.get();
        let _: u64 = connection_manager.del(self.prefix.key(key)).await?;

        Ok(())
    } // end method reset
}

fn decode_seconds(raw: &str) -> Result<f64, LeakygateError> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(LeakygateError::UnexpectedReply(format!(
            "expected seconds, got {raw:?}"
        ))),
    }
}

/// `-1` is the wire value for "no retry needed".
fn decode_retry_after(raw: &str) -> Result<Option<f64>, LeakygateError> {
    let value = decode_seconds(raw)?;
    if value == -1f64 {
        Ok(None)
    } else {
        Ok(Some(value))
    }
}

// Both scripts share this prologue. Reply layout:
//   {status, allowed, remaining, retry_after, reset_after}
// with status one of "allowed", "denied", "malformed". For "malformed" the last
// slot carries the raw stored value.
macro_rules! gcra_script {
    ($body:literal) => {
        concat!(
            r#"
            redis.replicate_commands()

            local rate_limit_key = KEYS[1]
            local burst = tonumber(ARGV[1])
            local rate = tonumber(ARGV[2])
            local period = tonumber(ARGV[3])
            local cost = tonumber(ARGV[4])
            local epsilon = tonumber(ARGV[5])

            local emission_interval = period / rate
            local burst_offset = emission_interval * burst
            local tolerance = math.min(epsilon, emission_interval / 2)

            local jan_1_2017 = 1483228800
            local time_array = redis.call("TIME")
            local now = (tonumber(time_array[1]) - jan_1_2017) + (tonumber(time_array[2]) / 1000000)

            local tat = now
            local raw_tat = redis.call("GET", rate_limit_key)
            if raw_tat then
                tat = tonumber(raw_tat)
                if tat == nil or tat ~= tat or tat == math.huge or tat == -math.huge then
                    return {"malformed", 0, 0, "-1", raw_tat}
                end
            end

            tat = math.max(tat, now)
            local debt = tat - now

            local function whole_permits(diff)
                return math.max(math.floor((diff + tolerance) / emission_interval), 0)
            end

            if cost == 0 then
                return {"allowed", 0, whole_permits(burst_offset - debt), "-1", tostring(debt)}
            end
            "#,
            $body
        )
    };
}

const ALLOW_N_SCRIPT: &str = gcra_script!(
    r#"
            local increment = emission_interval * cost
            local new_debt = debt + increment
            local diff = burst_offset - new_debt

            if diff < -tolerance then
                return {"denied", 0, 0, tostring(-diff), tostring(debt)}
            end

            local new_tat = tat + increment
            local reset_after = new_debt
            if reset_after > 0 then
                redis.call("SET", rate_limit_key, string.format("%.9f", new_tat), "EX", math.max(math.ceil(reset_after), 1))
            end

            return {"allowed", cost, whole_permits(diff), "-1", tostring(reset_after)}
    "#
);

const ALLOW_AT_MOST_SCRIPT: &str = gcra_script!(
    r#"
            local diff = burst_offset - debt

            if diff < emission_interval - tolerance then
                return {"denied", 0, 0, tostring(emission_interval - diff), tostring(debt)}
            end

            local available = math.max(whole_permits(diff), 1)
            local allowed = math.min(cost, available)

            local increment = emission_interval * allowed
            local new_tat = tat + increment
            local reset_after = debt + increment
            if reset_after > 0 then
                redis.call("SET", rate_limit_key, string.format("%.9f", new_tat), "EX", math.max(math.ceil(reset_after), 1))
            end

            return {"allowed", allowed, available - allowed, "-1", tostring(reset_after)}
    "#
);
