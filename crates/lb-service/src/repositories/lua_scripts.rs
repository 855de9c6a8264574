//! Lua scripts for atomic registry mutations.
//!
//! Redis runs each script without interleaving other commands, so the
//! existence check, meeting write and load change below cannot be split by
//! a concurrent placement from another gateway instance.

/// Lua script recording a meeting placement.
///
/// Arguments:
/// - KEYS[1]: Meeting key (`lb:meeting:{id}`)
/// - KEYS[2]: Server key (`lb:server:{id}`)
/// - ARGV[1]: Server id
/// - ARGV[2]: Moderator password
/// - ARGV[3]: Creation time (RFC 3339)
/// - ARGV[4]: Load increment
/// - ARGV[5]: Server load observed when the server was selected
///
/// Returns `{status, server_id}`:
/// - `{1, ARGV[1]}`: Placed (meeting written, load raised)
/// - `{0, owner}`: Meeting already exists on `owner`, nothing changed
/// - `{-1, ""}`: Server record missing
/// - `{-2, ""}`: Server load changed since selection, nothing changed
pub const RECORD_PLACEMENT: &str = r#"
local owner = redis.call('HGET', KEYS[1], 'server_id')
if owner then
    return {0, owner}
end

if redis.call('EXISTS', KEYS[2]) == 0 then
    return {-1, ''}
end

local load = tonumber(redis.call('HGET', KEYS[2], 'load') or '0')
if load ~= tonumber(ARGV[5]) then
    return {-2, ''}
end

redis.call('HSET', KEYS[1], 'server_id', ARGV[1], 'moderator_pw', ARGV[2], 'created_at', ARGV[3])
redis.call('HINCRBY', KEYS[2], 'load', ARGV[4])
return {1, ARGV[1]}
"#;

/// Lua script reverting a placement whose backend create failed.
///
/// Arguments:
/// - KEYS[1]: Meeting key (`lb:meeting:{id}`)
/// - KEYS[2]: Server key (`lb:server:{id}`)
/// - ARGV[1]: Server id the meeting was placed on
/// - ARGV[2]: Load increment to subtract
///
/// Returns:
/// - 1: Reverted
/// - 0: Meeting missing or owned by another server, nothing changed
pub const REVERT_PLACEMENT: &str = r#"
local owner = redis.call('HGET', KEYS[1], 'server_id')
if owner ~= ARGV[1] then
    return 0
end

redis.call('DEL', KEYS[1])
if redis.call('EXISTS', KEYS[2]) == 1 then
    redis.call('HINCRBY', KEYS[2], 'load', -tonumber(ARGV[2]))
end
return 1
"#;

/// Lua script setting a server's online flag only if the server exists.
///
/// Arguments:
/// - KEYS[1]: Server key (`lb:server:{id}`)
/// - ARGV[1]: `true` or `false`
///
/// Returns 1 if updated, 0 if the server is unknown.
pub const SET_ONLINE: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('HSET', KEYS[1], 'online', ARGV[1])
return 1
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_placement_checks_existing_meeting_first() {
        let existing = RECORD_PLACEMENT.find("HGET").unwrap_or(usize::MAX);
        let increment = RECORD_PLACEMENT.find("HINCRBY").unwrap_or(0);
        assert!(existing < increment);
        assert!(RECORD_PLACEMENT.contains("return {0, owner}"));
    }

    #[test]
    fn test_record_placement_writes_meeting_and_load() {
        assert!(RECORD_PLACEMENT.contains("'server_id', ARGV[1]"));
        assert!(RECORD_PLACEMENT.contains("HINCRBY', KEYS[2], 'load', ARGV[4]"));
    }

    #[test]
    fn test_record_placement_checks_expected_load_before_writing() {
        let check = RECORD_PLACEMENT.find("tonumber(ARGV[5])").unwrap_or(usize::MAX);
        let write = RECORD_PLACEMENT.find("HSET").unwrap_or(0);
        assert!(check < write);
        assert!(RECORD_PLACEMENT.contains("return {-2, ''}"));
    }

    #[test]
    fn test_revert_placement_is_owner_guarded() {
        assert!(REVERT_PLACEMENT.contains("owner ~= ARGV[1]"));
        assert!(REVERT_PLACEMENT.contains("-tonumber(ARGV[2])"));
    }

    #[test]
    fn test_set_online_ignores_unknown_servers() {
        assert!(SET_ONLINE.contains("EXISTS"));
        assert!(SET_ONLINE.contains("'online', ARGV[1]"));
    }
}
