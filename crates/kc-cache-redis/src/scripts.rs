//! Lua scripts that mutate an entry and publish its change event atomically.
//!
//! Running write and `PUBLISH` in one script means the event kind is exact
//! (created vs. modified) and no event is emitted for a no-op remove.
//! Events are encoded as `{"kind": ..., "key": ...}` with the unprefixed key.

/// `KEYS[1]` entry key; `ARGV`: payload, channel, key. Returns 1 if the key
/// existed before.
pub const PUT: &str = r"
local existed = redis.call('EXISTS', KEYS[1])
redis.call('SET', KEYS[1], ARGV[1])
local kind = 'created'
if existed == 1 then kind = 'modified' end
redis.call('PUBLISH', ARGV[2], cjson.encode({kind = kind, key = ARGV[3]}))
return existed
";

/// `KEYS[1]` entry key; `ARGV`: channel, key. Returns the number of deleted
/// entries.
pub const REMOVE: &str = r"
local removed = redis.call('DEL', KEYS[1])
if removed == 1 then
  redis.call('PUBLISH', ARGV[1], cjson.encode({kind = 'removed', key = ARGV[2]}))
end
return removed
";

/// `KEYS[1]` entry key; `ARGV`: payload, expected version, channel, key.
/// Returns 1 if the stored document's `version` matched and was replaced.
pub const REPLACE_IF_VERSION: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then return 0 end
local ok, doc = pcall(cjson.decode, current)
if not ok or type(doc) ~= 'table' or doc['version'] ~= ARGV[2] then return 0 end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('PUBLISH', ARGV[3], cjson.encode({kind = 'modified', key = ARGV[4]}))
return 1
";
