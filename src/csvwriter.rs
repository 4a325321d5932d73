//! Result persistence (§6): a single `ecsresults.csv` with one row per
//! completed probe, guarded by a mutex for line-granular appends.

use std::fs::File;
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::proto::{Family, QueryResponse};

const HEADER: &str = "domain,ns,family,clientAddress,sourcePrefixLength,scopePrefixLength,error,errStr,nsid,answers,cnames,timestamp";

pub struct CsvWriter {
    file: Mutex<Option<File>>,
}

impl CsvWriter {
    /// `None` puts the writer in `-disable-store` mode: rows are accepted
    /// and silently dropped rather than threaded through an `Option` at
    /// every call site.
    pub fn create(path: Option<&Path>) -> std::io::Result<Self> {
        let file = match path {
            Some(path) => {
                let mut f = File::create(path)?;
                writeln!(f, "{}", HEADER)?;
                Some(f)
            }
            None => None,
        };
        Ok(CsvWriter { file: Mutex::new(file) })
    }

    pub fn write_response(&self, domain: &str, response: &QueryResponse) {
        let mut guard = self.file.lock().expect("csv writer mutex poisoned");
        let file = match guard.as_mut() {
            Some(f) => f,
            None => return,
        };
        let line = format_row(domain, response);
        if let Err(e) = writeln!(file, "{}", line) {
            warn!(error = %e, "failed to append CSV row");
        }
    }
}

fn quoted_list(items: &[String]) -> String {
    if items.is_empty() {
        return String::new();
    }
    let inner = items.iter().map(|s| format!("'{}'", s)).collect::<Vec<_>>().join(",");
    format!("\"[{}]\"", inner)
}

fn format_row(domain: &str, response: &QueryResponse) -> String {
    let family = match response.request.family {
        Family::V4 => 1,
        Family::V6 => 2,
    };
    let client: IpAddr = response.request.ip_address_client;
    let err_str = if response.error_detail.is_empty() {
        String::new()
    } else {
        format!("\"{}\"", response.error_detail)
    };
    let nsid = response.nsid.as_deref().unwrap_or("[]");
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs();

    format!(
        "{domain},{ns},{family},{client},{source_len},{scope_len},{error},{err_str},{nsid},{answers},{cnames},{timestamp}",
        domain = domain,
        ns = response.request.nameserver_ip,
        family = family,
        client = client,
        source_len = response.request.source_prefix_length,
        scope_len = response.scope_prefix_length,
        error = response.error as i32,
        err_str = err_str,
        nsid = nsid,
        answers = quoted_list(&response.answers),
        cnames = quoted_list(&response.cnames),
        timestamp = timestamp,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{ErrorType, QueryRequest};
    use std::sync::Arc;

    fn sample_response() -> QueryResponse {
        QueryResponse {
            request: QueryRequest {
                ip_address_client: "198.51.100.0".parse().unwrap(),
                source_prefix_length: 24,
                family: Family::V4,
                domain: Arc::from("example.test"),
                nameserver_ip: "192.0.2.53".parse().unwrap(),
            },
            scope_prefix_length: 24,
            error: ErrorType::NoErr,
            error_detail: String::new(),
            nsid: Some("deadbeef".to_string()),
            answers: vec!["198.51.100.7".to_string()],
            cnames: vec![],
        }
    }

    #[test]
    fn formats_row_with_quoted_answers_and_empty_cnames() {
        let row = format_row("example.test", &sample_response());
        assert!(row.starts_with("example.test,192.0.2.53,1,198.51.100.0,24,24,0,,deadbeef,"));
        assert!(row.contains("\"['198.51.100.7']\",,")); // empty cnames column between two commas
    }

    #[test]
    fn disabled_store_accepts_and_drops_rows() {
        let writer = CsvWriter::create(None).unwrap();
        writer.write_response("example.test", &sample_response());
    }
}
