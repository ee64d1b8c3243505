/// Longest accepted guest name, in bytes.
pub const MAX_GUEST_NAME_LEN: usize = 256;

/// Longest accepted unit identifier, in bytes.
pub const MAX_UNIT_ID_LEN: usize = 128;

/// Longest single stay. Extensions are separate stays and each obeys this.
pub const MAX_NIGHTS: i64 = 365;

/// Upper bound on chain walks, so a corrupted link cycle cannot spin forever.
pub const MAX_CHAIN_LEN: usize = 10_000;

/// Capacity of the WAL writer's command channel.
pub const WAL_CHANNEL_CAPACITY: usize = 4096;

/// Largest WAL payload accepted on replay. A longer length prefix is treated
/// as a corrupt tail.
pub const MAX_WAL_FRAME_LEN: usize = 1 << 20;
