// Structured logging field definitions
// This module centralizes all field names used in tracing logs

#![allow(dead_code)]

// Connection & Network fields
pub const ADDR: &str = "addr";
pub const FRAME_SIZE: &str = "frame_size";
pub const ATTEMPT: &str = "attempt";
pub const BACKOFF_MS: &str = "backoff_ms";
pub const LINK_STATUS: &str = "link_status";

// Session fields
pub const SESSION_ID: &str = "session_id";
pub const PHASE: &str = "phase";
pub const LOCAL_COLOR: &str = "local_color";
pub const OPPONENT_COLOR: &str = "opponent_color";
pub const WINNER: &str = "winner";

// Fighter fields
pub const SIDE: &str = "side";
pub const CONDITION: &str = "condition";
pub const GENERATION: &str = "generation";

// Message fields
pub const MESSAGE_TYPE: &str = "message_type";

// Operation fields
pub const OPERATION: &str = "operation";
pub const ERROR: &str = "error";

// Queue fields
pub const QUEUE_SIZE: &str = "queue_size";
pub const DELAY_MS: &str = "delay_ms";

// Startup fields
pub const CONFIG_SOURCE: &str = "config_source";
