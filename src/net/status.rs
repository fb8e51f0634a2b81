//! Status codes carried in response packets. Values are wire-visible and
//! must never be renumbered.

/* Login results */
pub const STATUS_LOGIN_OK: u8 = 0;
pub const STATUS_LOGIN_INVALID_USER: u8 = 1;
pub const STATUS_LOGIN_WRONG_PASSWORD: u8 = 2;
pub const STATUS_LOGIN_VERSION_MISMATCH: u8 = 3;

/* Register results */
pub const STATUS_REGISTER_OK: u8 = 0;
pub const STATUS_REGISTER_INVALID_NAME: u8 = 1;
pub const STATUS_REGISTER_NAME_TOO_SHORT: u8 = 2;
pub const STATUS_REGISTER_NAME_TOO_LONG: u8 = 3;
pub const STATUS_REGISTER_PASSWORD_TOO_SHORT: u8 = 4;
pub const STATUS_REGISTER_PASSWORD_TOO_LONG: u8 = 5;
pub const STATUS_REGISTER_NAME_IS_TAKEN: u8 = 6;
pub const STATUS_REGISTER_VERSION_MISMATCH: u8 = 7;

/* Room join results */
pub const STATUS_ROOMJOIN_OK: u8 = 0;
pub const STATUS_ROOMJOIN_FAILED_CAPACITY: u8 = 1;
pub const STATUS_ROOMJOIN_NO_SPECTATORS: u8 = 2;
pub const STATUS_ROOMJOIN_FAILED_NO_SUCH_ROOM: u8 = 3;
pub const STATUS_ROOMJOIN_FAILED_ALREADY_IN_ROOM: u8 = 4;

/* Room create results */
pub const STATUS_ROOMCREATE_OK: u8 = 0;
pub const STATUS_ROOMCREATE_SERVER_LIMIT: u8 = 1;
pub const STATUS_ROOMCREATE_INVALID_PARAMETERS: u8 = 2;

/* Player exit / kick reasons */
pub const STATUS_PLAYEREXIT_LEAVE: u8 = 0;
pub const STATUS_PLAYEREXIT_KICKED_AFK: u8 = 1;
pub const STATUS_PLAYEREXIT_KICKED_SUSPICIOUS: u8 = 2;
pub const STATUS_PLAYEREXIT_CONNECTION_ERROR: u8 = 3;
pub const STATUS_PLAYEREXIT_REPEATED_LOGIN: u8 = 4;

/* Session restore results */
pub const STATUS_SESSIONREST_OK: u8 = 0;
pub const STATUS_SESSIONREST_FAILED_NOTFOUND: u8 = 1;
