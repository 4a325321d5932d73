//! DNS probe protocol (§4.5.1): builds one ECS-carrying query, exchanges it
//! over UDP with TCP fallback, and validates the response into a typed
//! [`QueryResponse`].
//!
//! Message construction and parsing is delegated entirely to
//! `hickory-proto`; this module only ever touches the typed `Message`/`Edns`
//! shapes, never raw wire bytes directly (besides handing them to a UDP or
//! TCP socket).

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query};
use hickory_proto::rr::rdata::opt::{ClientSubnet, EdnsOption};
use hickory_proto::rr::{Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, UdpSocket};
use tokio::time;

use crate::proto::{ErrorType, Family, QueryRequest, QueryResponse};

/// EDNS0 NSID option code (RFC 5001).
const NSID_OPTION_CODE: u16 = 3;

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub retries: u32,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub local_v4_source: Option<IpAddr>,
    pub local_v6_source: Option<IpAddr>,
    /// Whether a recursive resolver was explicitly configured; when set,
    /// RecursionDesired is requested and the `!Authoritative` validation
    /// check is skipped, matching the original's `resolver != ""` gate.
    pub resolver_configured: bool,
}

fn build_message(request: &QueryRequest) -> Result<Vec<u8>, hickory_proto::error::ProtoError> {
    let qtype = match request.family {
        Family::V4 => RecordType::A,
        Family::V6 => RecordType::AAAA,
    };
    let name = Name::from_ascii(format!("{}.", request.domain))?;

    let mut message = Message::new();
    message.set_id(rand::random());
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(false);
    message.add_query(Query::query(name, qtype));

    let mut edns = Edns::new();
    edns.set_max_payload(4096);
    edns.options_mut().insert(EdnsOption::Unknown(NSID_OPTION_CODE, Vec::new()));
    edns.options_mut().insert(EdnsOption::Subnet(ClientSubnet::new(
        request.ip_address_client,
        request.source_prefix_length,
        0,
    )));
    message.set_edns(edns);

    message.to_bytes()
}

pub fn configure_recursion_desired(request_bytes: &mut Vec<u8>, resolver_configured: bool) -> Result<(), hickory_proto::error::ProtoError> {
    if !resolver_configured {
        return Ok(());
    }
    let mut message = Message::from_bytes(request_bytes)?;
    message.set_recursion_desired(true);
    *request_bytes = message.to_bytes()?;
    Ok(())
}

async fn exchange_udp(local: Option<IpAddr>, target: SocketAddr, query_bytes: &[u8], config: &ProbeConfig) -> std::io::Result<Vec<u8>> {
    let bind_addr: SocketAddr = match local {
        Some(addr) => SocketAddr::new(addr, 0),
        None if target.is_ipv4() => "0.0.0.0:0".parse().unwrap(),
        None => "[::]:0".parse().unwrap(),
    };
    let socket = time::timeout(config.dial_timeout, UdpSocket::bind(bind_addr)).await??;
    socket.connect(target).await?;
    time::timeout(config.write_timeout, socket.send(query_bytes)).await??;
    let mut buf = vec![0u8; 4096];
    let len = time::timeout(config.read_timeout, socket.recv(&mut buf)).await??;
    buf.truncate(len);
    Ok(buf)
}

async fn exchange_tcp(local: Option<IpAddr>, target: SocketAddr, query_bytes: &[u8], config: &ProbeConfig) -> std::io::Result<Vec<u8>> {
    let bind_addr: SocketAddr = match local {
        Some(addr) => SocketAddr::new(addr, 0),
        None if target.is_ipv4() => "0.0.0.0:0".parse().unwrap(),
        None => "[::]:0".parse().unwrap(),
    };
    let socket = if target.is_ipv4() { TcpSocket::new_v4() } else { TcpSocket::new_v6() }?;
    socket.bind(bind_addr)?;
    let mut stream = time::timeout(config.dial_timeout, socket.connect(target)).await??;

    let len_prefix = (query_bytes.len() as u16).to_be_bytes();
    time::timeout(config.write_timeout, async {
        stream.write_all(&len_prefix).await?;
        stream.write_all(query_bytes).await
    })
    .await??;

    let mut len_buf = [0u8; 2];
    time::timeout(config.read_timeout, stream.read_exact(&mut len_buf)).await??;
    let resp_len = u16::from_be_bytes(len_buf) as usize;
    let mut resp = vec![0u8; resp_len];
    time::timeout(config.read_timeout, stream.read_exact(&mut resp)).await??;
    Ok(resp)
}

/// Execute one ECS probe end to end: build the query, exchange it (UDP with
/// TCP fallback on truncation or transport failure), and validate the
/// response per the ordered checks of §4.5.1.
pub async fn perform_query(request: QueryRequest, config: &ProbeConfig) -> QueryResponse {
    let target = SocketAddr::new(request.nameserver_ip, 53);
    let local = match request.family {
        Family::V4 => config.local_v4_source,
        Family::V6 => config.local_v6_source,
    };

    let mut query_bytes = match build_message(&request) {
        Ok(bytes) => bytes,
        Err(e) => return error_response(request, ErrorType::InternalErr, e.to_string()),
    };
    if let Err(e) = configure_recursion_desired(&mut query_bytes, config.resolver_configured) {
        return error_response(request, ErrorType::InternalErr, e.to_string());
    }

    let mut use_tcp = false;
    let mut last_err: Option<String> = None;
    let mut raw_response: Option<Vec<u8>> = None;

    let attempts = config.retries.max(1) + 1;
    for attempt in 0..attempts {
        let result = if use_tcp {
            exchange_tcp(local, target, &query_bytes, config).await
        } else {
            exchange_udp(local, target, &query_bytes, config).await
        };
        match result {
            Ok(bytes) => {
                raw_response = Some(bytes);
                break;
            }
            Err(e) => {
                last_err = Some(e.to_string());
                if attempt > 0 {
                    use_tcp = true;
                }
            }
        }
    }

    let raw_response = match raw_response {
        Some(bytes) => bytes,
        None => {
            return error_response(request, ErrorType::InternalErr, last_err.unwrap_or_default());
        }
    };

    let message = match Message::from_bytes(&raw_response) {
        Ok(m) => m,
        Err(e) => return error_response(request, ErrorType::InternalErr, e.to_string()),
    };

    let message = if message.truncated() {
        let mut tcp_response = None;
        let mut tcp_err = None;
        for _ in 0..config.retries.max(1) {
            match exchange_tcp(local, target, &query_bytes, config).await {
                Ok(bytes) => {
                    tcp_response = Some(bytes);
                    break;
                }
                Err(e) => tcp_err = Some(e.to_string()),
            }
        }
        match tcp_response {
            Some(bytes) => match Message::from_bytes(&bytes) {
                Ok(m) => m,
                Err(e) => return error_response(request, ErrorType::TruncatedNoTcp, e.to_string()),
            },
            None => return error_response(request, ErrorType::TruncatedNoTcp, tcp_err.unwrap_or_default()),
        }
    } else {
        message
    };

    validate_response(request, message, config)
}

fn error_response(request: QueryRequest, error: ErrorType, detail: String) -> QueryResponse {
    QueryResponse {
        request,
        scope_prefix_length: 255,
        error,
        error_detail: detail,
        nsid: None,
        answers: Vec::new(),
        cnames: Vec::new(),
    }
}

fn validate_response(request: QueryRequest, message: Message, config: &ProbeConfig) -> QueryResponse {
    if !message.authoritative() && !config.resolver_configured {
        return error_response(request, ErrorType::NoAuth, String::new());
    }

    let edns = match message.edns() {
        Some(e) => e,
        None => return error_response(request, ErrorType::NoEdns, String::new()),
    };

    let mut nsid = None;
    let mut subnet = None;
    for (code, option) in edns.options().iter() {
        match option {
            EdnsOption::Subnet(cs) => subnet = Some(cs.clone()),
            EdnsOption::Unknown(c, data) if *c == NSID_OPTION_CODE => {
                nsid = Some(hex_encode(data));
            }
            _ => {
                let _ = code;
            }
        }
    }

    let subnet = match subnet {
        Some(cs) => cs,
        None => return error_response(request, ErrorType::NoEcs, String::new()),
    };

    let expected_family = match request.family {
        Family::V4 => 1u16,
        Family::V6 => 2u16,
    };
    let actual_family = if subnet.addr.is_ipv4() { 1u16 } else { 2u16 };
    if actual_family != expected_family {
        return error_response(request, ErrorType::WrongFam, format!("{:?}", subnet));
    }

    let max_source = if expected_family == 1 { 32 } else { 128 };
    if subnet.source_prefix > max_source {
        return error_response(request, ErrorType::ScopeOob, format!("{:?}", subnet));
    }

    if subnet.addr != request.ip_address_client {
        return error_response(request, ErrorType::WrongParam, format!("{:?}", subnet));
    }

    let mut answers = Vec::new();
    let mut cnames = Vec::new();
    for record in message.answers() {
        match record.data() {
            Some(RData::A(a)) => answers.push(a.0.to_string()),
            Some(RData::AAAA(aaaa)) => answers.push(aaaa.0.to_string()),
            Some(RData::CNAME(cname)) => cnames.push(cname.0.to_string()),
            _ => {}
        }
    }

    QueryResponse {
        request,
        scope_prefix_length: subnet.scope_prefix,
        error: ErrorType::NoErr,
        error_detail: String::new(),
        nsid,
        answers,
        cnames,
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
