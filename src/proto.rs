//! Wire-adjacent but transport-agnostic types shared between the planner,
//! controller and probe pool: the error taxonomy (§7) and the
//! request/response shapes that travel through the channels (§4.5.1).
//!
//! None of this module touches wire bytes; that is `probe`'s job via
//! `hickory-proto`.

use std::net::IpAddr;
use std::sync::Arc;

use crate::domain::DomainState;

/// Stable integer ordinals, matching `spec.md` §7 exactly so the CSV
/// `error` column can simply write `error as i32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorType {
    NoErr = 0,
    NoAuth = 1,
    NoAdd = 2,
    NoEdns = 3,
    NoEcs = 4,
    WrongFam = 5,
    ScopeOob = 6,
    NoAns = 7,
    NoRec = 8,
    InternalErr = 9,
    WrongParam = 10,
    TruncatedNoTcp = 11,
}

impl ErrorType {
    /// A permanent error sets `permError` and retires the domain on the
    /// planner's next invocation; a transient one only increments
    /// `tempErrors`. `NoEcs` stays transient and `NoEdns` stays permanent
    /// even though both indicate the absence of ECS support - the original
    /// implementation's asymmetry, preserved without judgment.
    pub fn is_permanent(self) -> bool {
        matches!(
            self,
            ErrorType::NoAuth
                | ErrorType::NoAdd
                | ErrorType::NoEdns
                | ErrorType::WrongFam
                | ErrorType::ScopeOob
                | ErrorType::WrongParam
                | ErrorType::InternalErr
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::NoErr => "",
            ErrorType::NoAuth => "not authoritative",
            ErrorType::NoAdd => "no additional records",
            ErrorType::NoEdns => "no EDNS OPT record",
            ErrorType::NoEcs => "no ECS option in response",
            ErrorType::WrongFam => "ECS family mismatch",
            ErrorType::ScopeOob => "ECS scope out of bounds",
            ErrorType::NoAns => "no answer records",
            ErrorType::NoRec => "no matching record",
            ErrorType::InternalErr => "internal transport error",
            ErrorType::WrongParam => "ECS address mismatch",
            ErrorType::TruncatedNoTcp => "truncated response, TCP fallback failed",
        }
    }
}

/// The address family on the wire (ECS family codes, RFC 7871): 1 = IPv4,
/// 2 = IPv6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4 = 1,
    V6 = 2,
}

/// Parameters for a single ECS probe, produced by the planner and consumed
/// by a probe worker.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub ip_address_client: IpAddr,
    pub source_prefix_length: u8,
    pub family: Family,
    pub domain: Arc<str>,
    pub nameserver_ip: IpAddr,
}

/// A batch of probes for list mode, executed sequentially by one worker so
/// their responses arrive together as a single `QueryResponseList`.
#[derive(Debug, Clone)]
pub struct QueryRequestList {
    pub requests: Vec<QueryRequest>,
}

/// The relevant outcome of one completed DNS exchange.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub request: QueryRequest,
    pub scope_prefix_length: u8,
    pub error: ErrorType,
    pub error_detail: String,
    pub nsid: Option<String>,
    pub answers: Vec<String>,
    pub cnames: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct QueryResponseList {
    pub responses: Vec<QueryResponse>,
}

/// What a planner invocation hands back to the controller.
pub enum PlannerOutput {
    DomainScanFinished(Box<DomainState>),
    WaitingForMoreResults(Box<DomainState>),
    QueryRequest(Box<DomainState>, QueryRequest),
    QueryRequestList(Box<DomainState>, QueryRequestList),
}

/// What the controller hands to a planner: a domain's state plus at most
/// one (trie mode) or several (list mode) prior responses.
pub struct PlannerInput {
    pub domain_state: Box<DomainState>,
    pub last_scans: Vec<QueryResponse>,
}
