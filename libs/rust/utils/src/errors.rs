//env
pub const ETHEREUM_NODE_URL_NOT_SET: &str = "ETHEREUM_NODE_URL not set!";
pub const SUBMITTER_PRIVATE_KEY_NOT_SET: &str = "SUBMITTER_PRIVATE_KEY not set!";
pub const DAO_ADDRESS_NOT_SET: &str = "dao.address not configured!";

//polls
pub const POLL_CACHE_READ_FAILED: &str = "Failed to read poll cache";

//chain
pub const PROVIDER_CONNECTION_FAILED: &str = "Failed to connect to chain provider";
pub const SIGNER_PARSE_FAILED: &str = "Failed to parse signer key";

//forum
pub const FORUM_TOPIC_FAILED: &str = "Failed to create forum topic";

//server
pub const SERVER_BIND_FAILED: &str = "Failed to bind HTTP listener";
