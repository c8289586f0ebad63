/// Primary key of a row in the request log.
/// Example: `1048576`
pub type RequestId = i64;
/// Primary key of a platform user.
/// Example: `42`
pub type UserId = i64;
/// Login name or email used to look up a user.
/// Examples: `jdoe`, `jdoe@example.org`
pub type UserKey = String;
/// Human-readable badge title.
/// Examples: `Professor/in`, `Mittelbau`
pub type BadgeTitle = String;
/// SQL table identifier after allow-list validation.
/// Example: `analysis_request_user`
pub type TableName = String;
/// Seconds since the Unix epoch, UTC.
/// Example: `1398938400`
pub type EpochSeconds = i64;
