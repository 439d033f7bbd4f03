use std::time::Duration;

use scsync_core::{check_range, Commit, CommitSource};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::codec::{commit_key, decode_commit, parse_count, CommitLayout};
use crate::error::{DaemonError, DaemonResult};

const GET_SC: &str = "DERO.GetSC";

/// Reads contract storage keys as strings, in request order.
pub trait StorageReader {
    fn get_sc(&self, scid: &str, keys: &[String]) -> DaemonResult<Vec<String>>;
}

#[derive(Debug, Serialize)]
struct RpcRequest<P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: P,
}

#[derive(Debug, Serialize)]
struct GetScParams<'a> {
    scid: &'a str,
    code: bool,
    variables: bool,
    keysstring: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct GetScResult {
    #[serde(default)]
    valuesstring: Vec<String>,
}

/// JSON-RPC over HTTP to a daemon's `/json_rpc` endpoint.
pub struct HttpRpc {
    url: Url,
    http: reqwest::blocking::Client,
}

impl HttpRpc {
    /// `endpoint` is `host:port` or a full `http(s)://` URL.
    pub fn new(endpoint: &str, timeout: Duration) -> DaemonResult<Self> {
        let url = rpc_url(endpoint)?;
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { url, http })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Normalize a daemon endpoint into its JSON-RPC URL.
pub fn rpc_url(endpoint: &str) -> DaemonResult<Url> {
    let invalid = |message: String| DaemonError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        message,
    };

    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(invalid("endpoint is empty".into()));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let full = if with_scheme.ends_with("/json_rpc") {
        with_scheme
    } else {
        format!("{with_scheme}/json_rpc")
    };

    let url = Url::parse(&full).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme '{}'", other))),
    }
}

impl StorageReader for HttpRpc {
    fn get_sc(&self, scid: &str, keys: &[String]) -> DaemonResult<Vec<String>> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: GET_SC,
            params: GetScParams {
                scid,
                code: false,
                variables: false,
                keysstring: keys,
            },
        };

        let resp = self.http.post(self.url.clone()).json(&request).send()?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body = resp.text().unwrap_or_default();
            return Err(DaemonError::Status { status, body });
        }

        let body: RpcResponse<GetScResult> = resp.json()?;
        if let Some(err) = body.error {
            return Err(DaemonError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        let result = body
            .result
            .ok_or_else(|| DaemonError::Protocol("response has neither result nor error".into()))?;

        if result.valuesstring.len() != keys.len() {
            return Err(DaemonError::Protocol(format!(
                "requested {} keys, got {} values",
                keys.len(),
                result.valuesstring.len()
            )));
        }
        Ok(result.valuesstring)
    }
}

/// Commit source backed by contract storage on a daemon.
pub struct DaemonClient<R = HttpRpc> {
    reader: R,
    layout: CommitLayout,
}

impl DaemonClient<HttpRpc> {
    pub fn connect(endpoint: &str, timeout: Duration, layout: CommitLayout) -> DaemonResult<Self> {
        Ok(Self::new(HttpRpc::new(endpoint, timeout)?, layout))
    }
}

impl<R: StorageReader> DaemonClient<R> {
    pub fn new(reader: R, layout: CommitLayout) -> Self {
        Self { reader, layout }
    }

    pub fn layout(&self) -> CommitLayout {
        self.layout
    }

    /// Total commits in a contract's log.
    pub fn commit_count(&self, scid: &str) -> DaemonResult<u64> {
        let keys = [self.layout.counter_key().to_string()];
        let values = self.reader.get_sc(scid, &keys)?;
        let raw = values
            .first()
            .ok_or_else(|| DaemonError::Protocol("empty valuesstring".into()))?;
        parse_count(raw)
    }

    /// Commits `[start, end)` plus the counter, read in one call.
    fn read_range(&self, scid: &str, start: u64, end: u64) -> scsync_core::Result<Vec<Commit>> {
        let mut keys = vec![self.layout.counter_key().to_string()];
        keys.extend((start..end).map(commit_key));

        let values = self.reader.get_sc(scid, &keys)?;
        let (count, raw_commits) = values
            .split_first()
            .ok_or_else(|| DaemonError::Protocol("empty valuesstring".into()))?;

        check_range(start, end, parse_count(count)?)?;

        let commits = (start..end)
            .zip(raw_commits)
            .map(|(index, raw)| decode_commit(self.layout, index, raw))
            .collect::<DaemonResult<Vec<_>>>()?;

        debug!(scid, start, end, commits = commits.len(), "Fetched commits");
        Ok(commits)
    }
}

impl<R: StorageReader> CommitSource for DaemonClient<R> {
    fn count(&self, stream: &str) -> scsync_core::Result<u64> {
        Ok(self.commit_count(stream)?)
    }

    fn fetch(&self, stream: &str, start: u64, end: u64) -> scsync_core::Result<Vec<Commit>> {
        if start > end {
            return Err(scsync_core::Error::InvalidRange {
                start,
                end,
                count: 0,
            });
        }
        self.read_range(stream, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::Mutex;

    /// Contract storage held in memory, keyed by (scid, key).
    #[derive(Default)]
    struct FakeStorage {
        values: HashMap<(String, String), String>,
        requests: Mutex<Vec<Vec<String>>>,
    }

    impl FakeStorage {
        fn put(&mut self, scid: &str, key: &str, value: impl Into<String>) {
            self.values
                .insert((scid.to_string(), key.to_string()), value.into());
        }
    }

    impl StorageReader for FakeStorage {
        fn get_sc(&self, scid: &str, keys: &[String]) -> DaemonResult<Vec<String>> {
            self.requests.lock().unwrap().push(keys.to_vec());
            Ok(keys
                .iter()
                .map(|k| {
                    self.values
                        .get(&(scid.to_string(), k.clone()))
                        .cloned()
                        .unwrap_or_else(|| format!("NOT AVAILABLE err: key '{}' not found", k))
                })
                .collect())
        }
    }

    fn v1(record: &str) -> String {
        hex::encode(record)
    }

    fn storage() -> FakeStorage {
        let mut s = FakeStorage::default();
        s.put("sc", "commit_count", "3");
        s.put("sc", "commit_0", v1("S::state_name_deto1a::alice"));
        s.put("sc", "commit_1", v1("S::state_name_deto1b::bob"));
        s.put("sc", "commit_2", v1("D::state_name_deto1a::"));
        s
    }

    #[test]
    fn test_count_and_fetch() {
        let client = DaemonClient::new(storage(), CommitLayout::V1);

        assert_eq!(client.count("sc").unwrap(), 3);
        assert_eq!(client.count("unknown").unwrap(), 0);

        let commits = client.fetch("sc", 1, 3).unwrap();
        assert_eq!(
            commits,
            vec![
                Commit::set(1, "state_name_deto1b", "bob"),
                Commit::delete(2, "state_name_deto1a"),
            ]
        );
    }

    #[test]
    fn test_fetch_requests_counter_with_commits() {
        let client = DaemonClient::new(storage(), CommitLayout::V1);
        client.fetch("sc", 0, 2).unwrap();

        let requests = client.reader.requests.lock().unwrap();
        assert_eq!(
            requests[0],
            vec!["commit_count", "commit_0", "commit_1"]
        );
    }

    #[test]
    fn test_fetch_past_count_is_invalid_range() {
        let client = DaemonClient::new(storage(), CommitLayout::V1);
        assert!(matches!(
            client.fetch("sc", 2, 5),
            Err(scsync_core::Error::InvalidRange { count: 3, .. })
        ));
        assert!(matches!(
            client.fetch("sc", 2, 1),
            Err(scsync_core::Error::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_bad_record_is_decode_error() {
        let mut s = storage();
        s.put("sc", "commit_1", "not hex");
        let client = DaemonClient::new(s, CommitLayout::V1);

        assert!(matches!(
            client.fetch("sc", 0, 3),
            Err(scsync_core::Error::Decode { index: 1, .. })
        ));
    }

    #[test]
    fn test_malformed_counter_fails_once() {
        let mut s = storage();
        s.put("sc", "commit_count", "abc");
        let client = DaemonClient::new(s, CommitLayout::V1);

        let err = scsync_core::RetryPolicy::immediate(3)
            .run("count", || client.count("sc"))
            .unwrap_err();
        assert!(matches!(err, scsync_core::Error::Source(_)));
        assert_eq!(client.reader.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_rpc_url_normalization() {
        assert_eq!(
            rpc_url("127.0.0.1:20000").unwrap().as_str(),
            "http://127.0.0.1:20000/json_rpc"
        );
        assert_eq!(
            rpc_url("https://node.example.com/").unwrap().as_str(),
            "https://node.example.com/json_rpc"
        );
        assert_eq!(
            rpc_url("http://localhost:10102/json_rpc").unwrap().as_str(),
            "http://localhost:10102/json_rpc"
        );
        assert!(rpc_url("").is_err());
        assert!(rpc_url("ftp://node").is_err());
    }

    /// Serve one HTTP request with a fixed JSON body, returning the request body.
    fn serve_once(response: &'static str) -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);

            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(v) = lower.strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
            }

            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).unwrap();

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response.len(),
                response
            )
            .unwrap();

            String::from_utf8(body).unwrap()
        });

        (addr, handle)
    }

    #[test]
    fn test_http_rpc_round_trip() {
        let (addr, server) =
            serve_once(r#"{"jsonrpc":"2.0","id":1,"result":{"valuesstring":["42"],"status":"OK"}}"#);

        let client = DaemonClient::connect(&addr, Duration::from_secs(5), CommitLayout::V2).unwrap();
        assert_eq!(client.count("abcd").unwrap(), 42);

        let request: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
        assert_eq!(request["method"], "DERO.GetSC");
        assert_eq!(request["params"]["scid"], "abcd");
        assert_eq!(request["params"]["keysstring"][0], "commit_ctr");
        assert_eq!(request["params"]["code"], false);
    }

    #[test]
    fn test_http_rpc_error_is_transient() {
        let (addr, server) =
            serve_once(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32098,"message":"no such SC"}}"#);

        let client = DaemonClient::connect(&addr, Duration::from_secs(5), CommitLayout::V1).unwrap();
        let err = client.count("abcd").unwrap_err();
        server.join().unwrap();

        assert!(err.is_retryable());
    }
}
