//! The atomic script catalogue.
//!
//! One Lua script per (algorithm, operation) pair. Every script reads the
//! clock with `redis.call('TIME')` so all decisions are ordered against the
//! store's clock, and each runs as a single atomic unit. Mutating scripts
//! return the admission tuple `{allowed, retry_after, retries_left, limit}`;
//! read-only scripts return a single integer.
//!
//! Hashes are computed from the source once at first use rather than baked
//! at build time, so the source and its hash cannot drift apart.

use std::sync::LazyLock;

/// A named script plus the SHA-1 the store will know it by.
#[derive(Debug)]
pub struct AtomicScript {
    name: &'static str,
    source: &'static str,
    hash: String,
}

impl AtomicScript {
    fn new(name: &'static str, source: &'static str) -> Self {
        let hash = redis::Script::new(source).get_hash().to_string();
        Self { name, source, hash }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    /// Lowercase hex SHA-1 of the source.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

// ---------------------------------------------------------------------------
// Sliding window: ZSET of admitted timestamps at `sliding:<key>`.
// ---------------------------------------------------------------------------

// keys: <sliding:key>
// args: <rate> <window>
// returns: {allowed, retry_after, retries_left, limit}
const SLIDING_ATTEMPT_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local rate = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local cap = math.floor(rate * window)
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
local used = redis.call('ZCARD', KEYS[1])
if used >= cap then
  local retry = 1
  local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
  if oldest[2] then
    retry = math.max(1, tonumber(oldest[2]) + window - now)
  end
  return {0, retry, 0, cap}
end
redis.call('ZADD', KEYS[1], now, time[1] .. ':' .. time[2])
redis.call('EXPIRE', KEYS[1], window)
return {1, 0, cap - used - 1, cap}
"#;

// keys: <sliding:key>
// args: <window>
const SLIDING_ATTEMPTS_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local window = tonumber(ARGV[1])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
return redis.call('ZCARD', KEYS[1])
"#;

// keys: <sliding:key>
// args: <rate> <window>
const SLIDING_REMAINING_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local rate = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local cap = math.floor(rate * window)
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
local used = redis.call('ZCARD', KEYS[1])
if used >= cap then
  return 0
end
return cap - used
"#;

// keys: <sliding:key>
// args: <rate> <window>
const SLIDING_AVAILABLE_IN_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local rate = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local cap = math.floor(rate * window)
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
local used = redis.call('ZCARD', KEYS[1])
if used < cap then
  return 0
end
local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
if oldest[2] then
  return math.max(1, tonumber(oldest[2]) + window - now)
end
return 1
"#;

// keys: <sliding:key>
const SLIDING_RESET_LUA: &str = r#"
local removed = redis.call('ZCARD', KEYS[1])
redis.call('DEL', KEYS[1])
return removed
"#;

// ---------------------------------------------------------------------------
// Fixed window: INCR counter at `fixed:<key>:<slot>`; the base key holds the
// latest slot so reset can find the live counter without a scan.
// ---------------------------------------------------------------------------

// keys: <fixed:key>
// args: <burst> <window>
// returns: {allowed, retry_after, retries_left, limit}
const FIXED_ATTEMPT_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local burst = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local slot = math.floor(now / window)
local counter = KEYS[1] .. ':' .. slot
local used = redis.call('INCR', counter)
if used == 1 then
  redis.call('EXPIRE', counter, window)
end
redis.call('SET', KEYS[1], slot, 'EX', window)
if used > burst then
  local retry = (slot + 1) * window - now
  return {0, math.max(1, retry), 0, burst}
end
return {1, 0, burst - used, burst}
"#;

// keys: <fixed:key>
// args: <window>
const FIXED_ATTEMPTS_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local window = tonumber(ARGV[1])
local slot = math.floor(now / window)
return tonumber(redis.call('GET', KEYS[1] .. ':' .. slot)) or 0
"#;

// keys: <fixed:key>
// args: <burst> <window>
const FIXED_REMAINING_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local burst = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local slot = math.floor(now / window)
local used = tonumber(redis.call('GET', KEYS[1] .. ':' .. slot)) or 0
if used >= burst then
  return 0
end
return burst - used
"#;

// keys: <fixed:key>
// args: <burst> <window>
const FIXED_AVAILABLE_IN_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local burst = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local slot = math.floor(now / window)
local used = tonumber(redis.call('GET', KEYS[1] .. ':' .. slot)) or 0
if used < burst then
  return 0
end
return math.max(1, (slot + 1) * window - now)
"#;

// keys: <fixed:key>
const FIXED_RESET_LUA: &str = r#"
local removed = 0
local slot = redis.call('GET', KEYS[1])
if slot then
  removed = redis.call('DEL', KEYS[1] .. ':' .. slot)
  redis.call('DEL', KEYS[1])
end
return removed
"#;

// ---------------------------------------------------------------------------
// Leaky bucket: HASH {level, last_leak} at `leaky:<key>`. Drains one unit
// every ceil(1/rate) seconds. A denied attempt leaves the state untouched.
// ---------------------------------------------------------------------------

// keys: <leaky:key>
// args: <burst> <rate> <window>
// returns: {allowed, retry_after, retries_left, limit}
const LEAKY_ATTEMPT_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local burst = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local window = tonumber(ARGV[3])
local interval = math.ceil(1 / rate)
local state = redis.call('HMGET', KEYS[1], 'level', 'last_leak')
local level = tonumber(state[1]) or 0
local last_leak = tonumber(state[2]) or now
local leaked = math.floor((now - last_leak) / interval)
if leaked > 0 then
  level = math.max(0, level - leaked)
end
if level < burst then
  level = level + 1
  redis.call('HSET', KEYS[1], 'level', level, 'last_leak', now)
  redis.call('EXPIRE', KEYS[1], math.max(window, interval * burst))
  return {1, 0, burst - level, burst}
end
local retry = math.ceil((level - burst + 1) * interval - (now - last_leak))
return {0, math.max(1, retry), 0, burst}
"#;

// keys: <leaky:key>
const LEAKY_ATTEMPTS_LUA: &str = r#"
return tonumber(redis.call('HGET', KEYS[1], 'level')) or 0
"#;

// keys: <leaky:key>
// args: <burst> <rate>
const LEAKY_REMAINING_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local burst = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local interval = math.ceil(1 / rate)
local state = redis.call('HMGET', KEYS[1], 'level', 'last_leak')
local level = tonumber(state[1]) or 0
local last_leak = tonumber(state[2]) or now
level = math.max(0, level - math.floor((now - last_leak) / interval))
if level >= burst then
  return 0
end
return burst - level
"#;

// keys: <leaky:key>
// args: <burst> <rate>
const LEAKY_AVAILABLE_IN_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local burst = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local interval = math.ceil(1 / rate)
local state = redis.call('HMGET', KEYS[1], 'level', 'last_leak')
local level = tonumber(state[1]) or 0
local last_leak = tonumber(state[2]) or now
level = math.max(0, level - math.floor((now - last_leak) / interval))
if level < burst then
  return 0
end
return math.max(1, math.ceil((level - burst + 1) * interval - (now - last_leak)))
"#;

// keys: <leaky:key>
const LEAKY_RESET_LUA: &str = r#"
return redis.call('DEL', KEYS[1])
"#;

// ---------------------------------------------------------------------------
// Token bucket: HASH {tokens, last_refill, max_tokens, attempts} at
// `token:<key>`. Refill only after min_refill = max(1, 2/rate) seconds so
// tight call loops cannot push the observed burst past the declared one.
// ---------------------------------------------------------------------------

// keys: <token:key>
// args: <burst> <rate> <window>
// returns: {allowed, retry_after, retries_left, limit}
const TOKEN_ATTEMPT_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local burst = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local window = tonumber(ARGV[3])
local state = redis.call('HMGET', KEYS[1], 'tokens', 'last_refill')
local tokens = tonumber(state[1])
local last_refill = tonumber(state[2]) or now
if tokens == nil then
  tokens = burst
end
local min_refill = math.max(1, 2 / rate)
local elapsed = now - last_refill
if elapsed >= min_refill then
  local refill = math.floor(elapsed * rate)
  if refill > 0 then
    tokens = math.min(burst, tokens + refill)
    last_refill = now
  end
end
local allowed = 0
local retry = 0
if tokens >= 1 then
  tokens = tokens - 1
  allowed = 1
else
  retry = math.ceil(math.max(1 / rate, min_refill - elapsed))
end
redis.call('HSET', KEYS[1], 'tokens', tokens, 'last_refill', last_refill, 'max_tokens', burst)
redis.call('HINCRBY', KEYS[1], 'attempts', 1)
redis.call('EXPIRE', KEYS[1], window)
return {allowed, retry, math.floor(tokens), burst}
"#;

// keys: <token:key>
const TOKEN_ATTEMPTS_LUA: &str = r#"
return tonumber(redis.call('HGET', KEYS[1], 'attempts')) or 0
"#;

// keys: <token:key>
// args: <burst> <rate>
const TOKEN_REMAINING_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local burst = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local state = redis.call('HMGET', KEYS[1], 'tokens', 'last_refill')
local tokens = tonumber(state[1])
local last_refill = tonumber(state[2]) or now
if tokens == nil then
  return burst
end
local min_refill = math.max(1, 2 / rate)
local elapsed = now - last_refill
if elapsed >= min_refill then
  tokens = math.min(burst, tokens + math.floor(elapsed * rate))
end
return math.floor(tokens)
"#;

// keys: <token:key>
// args: <burst> <rate>
const TOKEN_AVAILABLE_IN_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local burst = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local state = redis.call('HMGET', KEYS[1], 'tokens', 'last_refill')
local tokens = tonumber(state[1])
local last_refill = tonumber(state[2]) or now
if tokens == nil then
  return 0
end
local min_refill = math.max(1, 2 / rate)
local elapsed = now - last_refill
if elapsed >= min_refill then
  tokens = math.min(burst, tokens + math.floor(elapsed * rate))
end
if tokens >= 1 then
  return 0
end
return math.ceil(math.max(1 / rate, min_refill - elapsed))
"#;

// keys: <token:key>
const TOKEN_RESET_LUA: &str = r#"
return redis.call('DEL', KEYS[1])
"#;

// ---------------------------------------------------------------------------
// GCRA: a single fractional TAT (epoch seconds, microsecond resolution)
// stored as a string at `gcra:<key>`. Denied attempts leave the TAT alone.
// ---------------------------------------------------------------------------

// keys: <gcra:key>
// args: <rate> <period>
// returns: {allowed, retry_after, retries_left, limit}
const GCRA_ATTEMPT_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1]) + tonumber(time[2]) / 1000000
local rate = tonumber(ARGV[1])
local period = tonumber(ARGV[2])
local limit = math.floor(rate * period)
if limit < 1 then
  return {0, period, 0, 0}
end
local separation = period / limit
local tat = tonumber(redis.call('GET', KEYS[1])) or now
if tat < now then
  tat = now
end
if tat - now <= period - separation then
  local new_tat = tat + separation
  redis.call('SET', KEYS[1], string.format('%.6f', new_tat), 'EX', math.ceil(period * 2))
  local left = math.max(0, limit - math.floor((new_tat - now) / separation) - 1)
  return {1, 0, left, limit}
end
return {0, math.max(1, math.ceil(tat - now - period + separation)), 0, limit}
"#;

// keys: <gcra:key>
// returns: seconds of accumulated schedule debt (0 when conformant)
const GCRA_ATTEMPTS_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1]) + tonumber(time[2]) / 1000000
local tat = tonumber(redis.call('GET', KEYS[1]))
if tat == nil or tat <= now then
  return 0
end
return math.ceil(tat - now)
"#;

// keys: <gcra:key>
// args: <rate> <period>
const GCRA_REMAINING_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1]) + tonumber(time[2]) / 1000000
local rate = tonumber(ARGV[1])
local period = tonumber(ARGV[2])
local limit = math.floor(rate * period)
if limit < 1 then
  return 0
end
local separation = period / limit
local tat = tonumber(redis.call('GET', KEYS[1])) or now
if tat < now then
  tat = now
end
local used = math.ceil((tat - now) / separation)
if used >= limit then
  return 0
end
return limit - used
"#;

// keys: <gcra:key>
// args: <rate> <period>
const GCRA_AVAILABLE_IN_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1]) + tonumber(time[2]) / 1000000
local rate = tonumber(ARGV[1])
local period = tonumber(ARGV[2])
local limit = math.floor(rate * period)
if limit < 1 then
  return period
end
local separation = period / limit
local tat = tonumber(redis.call('GET', KEYS[1])) or now
if tat < now then
  tat = now
end
if tat - now <= period - separation then
  return 0
end
return math.max(1, math.ceil(tat - now - period + separation))
"#;

// keys: <gcra:key>
const GCRA_RESET_LUA: &str = r#"
return redis.call('DEL', KEYS[1])
"#;

// ---------------------------------------------------------------------------
// Concurrency gate: ZSET at `gate:<key>` mapping acquisition second to
// request id. Leases older than `timeout` are evicted on every access.
// Release is a bare ZREM issued by the caller; it needs no clock.
// ---------------------------------------------------------------------------

// keys: <gate:key>
// args: <request_id> <max> <timeout>
// returns: {acquired, current_in_flight}
const GATE_TRY_ACQUIRE_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local id = ARGV[1]
local max = tonumber(ARGV[2])
local timeout = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - timeout)
if redis.call('ZSCORE', KEYS[1], id) then
  return {0, redis.call('ZCARD', KEYS[1])}
end
local held = redis.call('ZCARD', KEYS[1])
if held >= max then
  return {0, held}
end
redis.call('ZADD', KEYS[1], now, id)
redis.call('EXPIRE', KEYS[1], timeout * 2)
return {1, held + 1}
"#;

// keys: <gate:key>
// args: <timeout>
const GATE_CURRENT_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local timeout = tonumber(ARGV[1])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - timeout)
return redis.call('ZCARD', KEYS[1])
"#;

// keys: <gate:key>
// args: <timeout>
// returns: number of abandoned leases evicted
const GATE_CLEANUP_LUA: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1])
local timeout = tonumber(ARGV[1])
return redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - timeout)
"#;

macro_rules! scripts {
    ($($static_name:ident => ($name:literal, $src:ident)),+ $(,)?) => {
        $(
            pub static $static_name: LazyLock<AtomicScript> =
                LazyLock::new(|| AtomicScript::new($name, $src));
        )+

        /// Every script in the catalogue, for preloading and integrity checks.
        pub fn catalogue() -> Vec<&'static AtomicScript> {
            vec![$(&*$static_name),+]
        }
    };
}

scripts! {
    SLIDING_ATTEMPT => ("sliding.attempt", SLIDING_ATTEMPT_LUA),
    SLIDING_ATTEMPTS => ("sliding.attempts", SLIDING_ATTEMPTS_LUA),
    SLIDING_REMAINING => ("sliding.remaining", SLIDING_REMAINING_LUA),
    SLIDING_AVAILABLE_IN => ("sliding.available_in", SLIDING_AVAILABLE_IN_LUA),
    SLIDING_RESET => ("sliding.reset", SLIDING_RESET_LUA),
    FIXED_ATTEMPT => ("fixed.attempt", FIXED_ATTEMPT_LUA),
    FIXED_ATTEMPTS => ("fixed.attempts", FIXED_ATTEMPTS_LUA),
    FIXED_REMAINING => ("fixed.remaining", FIXED_REMAINING_LUA),
    FIXED_AVAILABLE_IN => ("fixed.available_in", FIXED_AVAILABLE_IN_LUA),
    FIXED_RESET => ("fixed.reset", FIXED_RESET_LUA),
    LEAKY_ATTEMPT => ("leaky.attempt", LEAKY_ATTEMPT_LUA),
    LEAKY_ATTEMPTS => ("leaky.attempts", LEAKY_ATTEMPTS_LUA),
    LEAKY_REMAINING => ("leaky.remaining", LEAKY_REMAINING_LUA),
    LEAKY_AVAILABLE_IN => ("leaky.available_in", LEAKY_AVAILABLE_IN_LUA),
    LEAKY_RESET => ("leaky.reset", LEAKY_RESET_LUA),
    TOKEN_ATTEMPT => ("token.attempt", TOKEN_ATTEMPT_LUA),
    TOKEN_ATTEMPTS => ("token.attempts", TOKEN_ATTEMPTS_LUA),
    TOKEN_REMAINING => ("token.remaining", TOKEN_REMAINING_LUA),
    TOKEN_AVAILABLE_IN => ("token.available_in", TOKEN_AVAILABLE_IN_LUA),
    TOKEN_RESET => ("token.reset", TOKEN_RESET_LUA),
    GCRA_ATTEMPT => ("gcra.attempt", GCRA_ATTEMPT_LUA),
    GCRA_ATTEMPTS => ("gcra.attempts", GCRA_ATTEMPTS_LUA),
    GCRA_REMAINING => ("gcra.remaining", GCRA_REMAINING_LUA),
    GCRA_AVAILABLE_IN => ("gcra.available_in", GCRA_AVAILABLE_IN_LUA),
    GCRA_RESET => ("gcra.reset", GCRA_RESET_LUA),
    GATE_TRY_ACQUIRE => ("gate.try_acquire", GATE_TRY_ACQUIRE_LUA),
    GATE_CURRENT => ("gate.current", GATE_CURRENT_LUA),
    GATE_CLEANUP => ("gate.cleanup", GATE_CLEANUP_LUA),
}
