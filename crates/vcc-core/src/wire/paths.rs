//! Request and event paths understood by VCC nodes

// ACD agent login and readiness
pub const ACD_LOGIN: &str = "/acd/login";
pub const ACD_LOGOUT: &str = "/acd/logout";
pub const ACD_READY: &str = "/acd/ready";
pub const ACD_NOT_READY: &str = "/acd/notReady";
pub const ACD_STATE: &str = "/acd/state";

// Supervisor-driven dynamic queue membership
pub const QUEUE_ACD_LOG_ON: &str = "/acd/queue/logOn";
pub const QUEUE_ACD_LOG_OFF: &str = "/acd/queue/logOff";
pub const DYNAMIC_ACD_SUBSCRIBE: &str = "/acd/dynamic/subscribe";

// Ring groups
pub const RG_LOGIN: &str = "/rg/login";
pub const RG_LOGOUT: &str = "/rg/logout";
pub const RG_STATE: &str = "/rg/state";

// Calls
pub const CALLS: &str = "/calls";
pub const CALL_ANSWER: &str = "/call/answer";
pub const CALL_HOLD: &str = "/call/hold";
pub const CALL_UNHOLD: &str = "/call/unhold";
pub const CALL_PARK: &str = "/call/park";
pub const CALL_UNPARK: &str = "/call/unpark";
pub const CALL_TRANSFER: &str = "/call/transfer";
pub const CALL_MUTE: &str = "/call/mute";
pub const CALL_DEAFEN: &str = "/call/deafen";

// Conferences
pub const CONFERENCE_ACQUIRE: &str = "/conference/acquire";
pub const CONFERENCE_INVITE: &str = "/conference/invite";
pub const CONFERENCE_JOIN: &str = "/conference/join";
pub const CONFERENCE_LOCK: &str = "/conference/lock";
pub const CONFERENCE_UNLOCK: &str = "/conference/unlock";
pub const CONFERENCE_REMOVE: &str = "/conference/remove";

// NENA i3 queue and service state
pub const NENA_QUEUE_STATE: &str = "/nena/queueState";
pub const NENA_QUEUE_STATE_OVERRIDE: &str = "/nena/queueState/override";
pub const NENA_SERVICE_STATE: &str = "/nena/serviceState";
pub const NENA_SERVICE_STATE_OVERRIDE: &str = "/nena/serviceState/override";

// Listen & Join
pub const LISTEN_JOIN_SUBSCRIBE: &str = "/listenJoin/subscribe";
pub const LISTEN_JOIN_UNSUBSCRIBE: &str = "/listenJoin/unsubscribe";

// Unsolicited event paths
pub const EV_SHARED_LINE_CONNECT: &str = "sharedLineConnect";
pub const EV_SHARED_LINE_DISCONNECT: &str = "sharedLineDisconnect";
pub const EV_SHARED_LINE_HOLD: &str = "sharedLineHold";
pub const EV_SHARED_LINE_RELEASE: &str = "sharedLineRelease";
pub const EV_PARK: &str = "park";
pub const EV_UNPARK: &str = "unpark";
pub const EV_PARK_TIMEOUT: &str = "parkTimeout";
pub const EV_ABANDONED: &str = "abandoned";
pub const EV_NODE_STATE_CHANGE: &str = "nodeStateChange";
pub const EV_NODE_STATES: &str = "nodeStates";
pub const EV_ACD_STATUS: &str = "acdStatus";
pub const EV_RG_STATUS: &str = "rgStatus";
pub const EV_DYNAMIC_ACD_STATUS: &str = "dynamicACDStatus";
pub const EV_LISTEN_JOIN_TERMINATED: &str = "listenJoinTerminated";
pub const EV_NENA_QUEUE_STATE: &str = "nenaQueueState";
pub const EV_NENA_SERVICE_STATE: &str = "nenaServiceState";

// Control paths
pub const CTRL_PING: &str = "ping";
pub const CTRL_PONG: &str = "pong";
